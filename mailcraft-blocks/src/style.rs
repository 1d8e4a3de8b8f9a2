use serde::{Deserialize, Serialize};

use crate::compiler::markup::Attrs;

/// Whether a box property is set once for all sides or per side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideControl {
    #[default]
    All,
    Separate,
}

/// Padding in pixels, in "all sides" or "per side" mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Spacing {
    pub control: SideControl,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<u32>,
}

impl Spacing {
    pub fn all(px: u32) -> Self {
        Self {
            all: Some(px),
            ..Self::default()
        }
    }

    pub fn separate(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            control: SideControl::Separate,
            all: None,
            top: Some(top),
            right: Some(right),
            bottom: Some(bottom),
            left: Some(left),
        }
    }

    /// Writes `{prefix}` or `{prefix}-{side}` attributes. Unset sides are skipped.
    pub fn apply(&self, prefix: &str, attrs: &mut Attrs) {
        match self.control {
            SideControl::All => {
                attrs.set(prefix, self.all.map(px));
            }
            SideControl::Separate => {
                for (side, value) in self.sides() {
                    attrs.set(&format!("{prefix}-{side}"), value.map(px));
                }
            }
        }
    }

    /// CSS shorthand (`top right bottom left`), unset sides count as zero.
    pub fn to_css(&self) -> Option<String> {
        match self.control {
            SideControl::All => self.all.map(px),
            SideControl::Separate => {
                if self.sides().iter().all(|(_, v)| v.is_none()) {
                    return None;
                }
                let values: Vec<String> = self
                    .sides()
                    .iter()
                    .map(|(_, v)| px(v.unwrap_or(0)))
                    .collect();
                Some(values.join(" "))
            }
        }
    }

    fn sides(&self) -> [(&'static str, Option<u32>); 4] {
        [
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
            ("left", self.left),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
    Double,
    None,
}

impl BorderStyle {
    pub fn as_css(self) -> &'static str {
        match self {
            BorderStyle::Solid => "solid",
            BorderStyle::Dashed => "dashed",
            BorderStyle::Dotted => "dotted",
            BorderStyle::Double => "double",
            BorderStyle::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorderSide {
    pub width: u32,
    #[serde(default)]
    pub style: BorderStyle,
    pub color: String,
}

impl BorderSide {
    pub fn to_css(&self) -> String {
        format!("{} {} {}", px(self.width), self.style.as_css(), self.color)
    }
}

/// Border settings, in "all sides" or "per side" mode, plus a corner radius.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Border {
    pub control: SideControl,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all: Option<BorderSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<BorderSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<BorderSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<BorderSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<BorderSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<u32>,
}

impl Border {
    pub fn apply(&self, attrs: &mut Attrs) {
        match self.control {
            SideControl::All => attrs.set("border", self.all.as_ref().map(BorderSide::to_css)),
            SideControl::Separate => {
                for (side, value) in [
                    ("top", &self.top),
                    ("right", &self.right),
                    ("bottom", &self.bottom),
                    ("left", &self.left),
                ] {
                    attrs.set(
                        &format!("border-{side}"),
                        value.as_ref().map(BorderSide::to_css),
                    );
                }
            }
        }
        attrs.set("border-radius", self.radius.map(px));
    }

    pub fn colors(&self) -> impl Iterator<Item = &str> {
        [&self.all, &self.top, &self.right, &self.bottom, &self.left]
            .into_iter()
            .flatten()
            .map(|side| side.color.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
    Justify,
}

impl Align {
    pub fn as_css(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
            Align::Justify => "justify",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

impl VerticalAlign {
    pub fn as_css(self) -> &'static str {
        match self {
            VerticalAlign::Top => "top",
            VerticalAlign::Middle => "middle",
            VerticalAlign::Bottom => "bottom",
        }
    }
}

pub fn px(value: u32) -> String {
    format!("{value}px")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_sides_padding_emits_single_attribute() {
        let mut attrs = Attrs::new();
        Spacing::all(12).apply("padding", &mut attrs);
        assert_eq!(attrs.get("padding"), Some("12px"));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn separate_padding_skips_unset_sides() {
        let mut attrs = Attrs::new();
        let spacing = Spacing {
            control: SideControl::Separate,
            top: Some(4),
            left: Some(8),
            ..Spacing::default()
        };
        spacing.apply("padding", &mut attrs);
        assert_eq!(attrs.get("padding-top"), Some("4px"));
        assert_eq!(attrs.get("padding-left"), Some("8px"));
        assert_eq!(attrs.get("padding-right"), None);
        assert_eq!(attrs.get("padding"), None);
    }

    #[test]
    fn separate_padding_css_shorthand_fills_zeros() {
        let spacing = Spacing {
            control: SideControl::Separate,
            top: Some(4),
            ..Spacing::default()
        };
        assert_eq!(spacing.to_css().as_deref(), Some("4px 0px 0px 0px"));
        assert_eq!(Spacing::default().to_css(), None);
    }

    #[test]
    fn border_all_and_radius() {
        let mut attrs = Attrs::new();
        let border = Border {
            all: Some(BorderSide {
                width: 1,
                style: BorderStyle::Dashed,
                color: "#cccccc".into(),
            }),
            radius: Some(6),
            ..Border::default()
        };
        border.apply(&mut attrs);
        assert_eq!(attrs.get("border"), Some("1px dashed #cccccc"));
        assert_eq!(attrs.get("border-radius"), Some("6px"));
    }
}

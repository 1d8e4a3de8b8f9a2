use serde::{Deserialize, Serialize};

use crate::style::Align;

/// One line (paragraph) of rich text. Compiles to one block-level tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RichLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    pub runs: Vec<TextRun>,
}

impl RichLine {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            align: None,
            runs: vec![TextRun::plain(text)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|run| run.text.is_empty())
    }

    /// Concatenated text of every run, without styling.
    pub fn text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }
}

/// A styled span of text inside a line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextRun {
    pub text: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub underline: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub strikethrough: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyperlink: Option<Hyperlink>,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn linked(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hyperlink: Some(Hyperlink {
                url: url.into(),
                disable_tracking: false,
            }),
            ..Self::default()
        }
    }

    /// Inline CSS declarations for this run's styling, in a fixed order.
    pub fn css_declarations(&self) -> Vec<String> {
        let mut css = Vec::new();
        if self.bold {
            css.push("font-weight: bold".to_string());
        }
        if self.italic {
            css.push("font-style: italic".to_string());
        }
        match (self.underline, self.strikethrough) {
            (true, true) => css.push("text-decoration: underline line-through".to_string()),
            (true, false) => css.push("text-decoration: underline".to_string()),
            (false, true) => css.push("text-decoration: line-through".to_string()),
            (false, false) => {}
        }
        if let Some(color) = &self.color {
            css.push(format!("color: {color}"));
        }
        if let Some(bg) = &self.background_color {
            css.push(format!("background-color: {bg}"));
        }
        if let Some(size) = self.font_size {
            css.push(format!("font-size: {size}px"));
        }
        if let Some(family) = &self.font_family {
            css.push(format!("font-family: {family}"));
        }
        css
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hyperlink {
    pub url: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_tracking: bool,
}

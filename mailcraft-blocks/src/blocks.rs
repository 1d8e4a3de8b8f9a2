use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::error::{BlockError, BlockResult};
use crate::rich_text::RichLine;
use crate::style::{Align, Border, BorderStyle, Spacing, VerticalAlign};

/// Opaque block identifier. Stable across moves, regenerated on clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed column layouts of a section. The name encodes the column spans on a
/// 24-unit grid (`columns168` is a 16 + 8 split).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnLayout {
    OneColumn,
    Columns1212,
    Columns888,
    Columns6666,
    Columns168,
    Columns816,
    Columns204,
    Columns420,
}

impl ColumnLayout {
    pub const ALL: [ColumnLayout; 8] = [
        ColumnLayout::OneColumn,
        ColumnLayout::Columns1212,
        ColumnLayout::Columns888,
        ColumnLayout::Columns6666,
        ColumnLayout::Columns168,
        ColumnLayout::Columns816,
        ColumnLayout::Columns204,
        ColumnLayout::Columns420,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnLayout::OneColumn => "oneColumn",
            ColumnLayout::Columns1212 => "columns1212",
            ColumnLayout::Columns888 => "columns888",
            ColumnLayout::Columns6666 => "columns6666",
            ColumnLayout::Columns168 => "columns168",
            ColumnLayout::Columns816 => "columns816",
            ColumnLayout::Columns204 => "columns204",
            ColumnLayout::Columns420 => "columns420",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|layout| layout.as_str() == s)
    }

    pub fn column_count(self) -> usize {
        match self {
            ColumnLayout::OneColumn => 1,
            ColumnLayout::Columns1212
            | ColumnLayout::Columns168
            | ColumnLayout::Columns816
            | ColumnLayout::Columns204
            | ColumnLayout::Columns420 => 2,
            ColumnLayout::Columns888 => 3,
            ColumnLayout::Columns6666 => 4,
        }
    }

    /// Fixed width ratios for unequal layouts; `None` for equal-width ones.
    fn ratios(self) -> Option<&'static [&'static str]> {
        match self {
            ColumnLayout::Columns168 => Some(&["66.66%", "33.33%"]),
            ColumnLayout::Columns816 => Some(&["33.33%", "66.66%"]),
            ColumnLayout::Columns204 => Some(&["83.33%", "16.66%"]),
            ColumnLayout::Columns420 => Some(&["16.66%", "83.33%"]),
            _ => None,
        }
    }

    /// Width of the column at `index` when the section holds `child_count` columns.
    pub fn column_width(self, index: usize, child_count: usize) -> Option<String> {
        if let Some(ratios) = self.ratios() {
            return ratios.get(index).map(|w| w.to_string());
        }
        if child_count == 0 || index >= child_count {
            return None;
        }
        Some(format!("{}%", format_percent(100.0 / child_count as f64)))
    }
}

fn format_percent(value: f64) -> String {
    let rounded = (value * 100.0).floor() / 100.0;
    let s = format!("{rounded:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Discriminator selecting a block's definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Root,
    Section(ColumnLayout),
    Column,
    Text,
    Heading,
    Image,
    Button,
    Divider,
    OpenTracking,
    Liquid,
    /// A kind with no built-in payload: custom definitions and kinds this
    /// build does not know about.
    Other(String),
}

impl BlockKind {
    pub fn as_str(&self) -> &str {
        match self {
            BlockKind::Root => "root",
            BlockKind::Section(layout) => layout.as_str(),
            BlockKind::Column => "column",
            BlockKind::Text => "text",
            BlockKind::Heading => "heading",
            BlockKind::Image => "image",
            BlockKind::Button => "button",
            BlockKind::Divider => "divider",
            BlockKind::OpenTracking => "openTracking",
            BlockKind::Liquid => "liquid",
            BlockKind::Other(kind) => kind,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "root" => BlockKind::Root,
            "column" => BlockKind::Column,
            "text" => BlockKind::Text,
            "heading" => BlockKind::Heading,
            "image" => BlockKind::Image,
            "button" => BlockKind::Button,
            "divider" => BlockKind::Divider,
            "openTracking" => BlockKind::OpenTracking,
            "liquid" => BlockKind::Liquid,
            other => match ColumnLayout::parse(other) {
                Some(layout) => BlockKind::Section(layout),
                None => BlockKind::Other(other.to_string()),
            },
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, BlockKind::Section(_))
    }

    /// Leaf kinds never own children.
    pub fn is_leaf(&self) -> bool {
        !matches!(
            self,
            BlockKind::Root | BlockKind::Section(_) | BlockKind::Column
        )
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BlockKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(BlockKind::parse(&s))
    }
}

/// Body-level settings carried by the root block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RootData {
    pub width: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_text: Option<String>,
}

impl Default for RootData {
    fn default() -> Self {
        Self {
            width: 600,
            background_color: None,
            font_family: None,
            font_size: None,
            text_color: None,
            link_color: None,
            line_height: None,
            preview_text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionData {
    pub padding: Spacing,
    pub border: Border,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    pub full_width: bool,
    /// When false, columns stay side by side on small screens.
    pub stack_on_mobile: bool,
}

impl Default for SectionData {
    fn default() -> Self {
        Self {
            padding: Spacing::default(),
            border: Border::default(),
            background_color: None,
            background_image: None,
            full_width: false,
            stack_on_mobile: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnData {
    pub padding: Spacing,
    pub border: Border,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_align: Option<VerticalAlign>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    pub padding: Spacing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<String>,
    pub content: Vec<RichLine>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingLevel {
    #[default]
    H1,
    H2,
    H3,
}

impl HeadingLevel {
    pub fn tag(self) -> &'static str {
        match self {
            HeadingLevel::H1 => "h1",
            HeadingLevel::H2 => "h2",
            HeadingLevel::H3 => "h3",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeadingData {
    pub level: HeadingLevel,
    #[serde(flatten)]
    pub text: TextData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageData {
    pub src: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    pub padding: Spacing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_radius: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    pub full_width_on_mobile: bool,
    pub disable_tracking: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ButtonData {
    pub text: String,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<u16>,
    pub border: Border,
    pub inner_padding: Spacing,
    pub padding: Spacing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    pub disable_tracking: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DividerData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_width: Option<u32>,
    pub border_style: BorderStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    pub padding: Spacing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiquidData {
    pub source: String,
}

/// Kind-specific payload of a block. The variant fixes the block's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockData {
    Root(RootData),
    Section {
        layout: ColumnLayout,
        data: SectionData,
    },
    Column(ColumnData),
    Text(TextData),
    Heading(HeadingData),
    Image(ImageData),
    Button(ButtonData),
    Divider(DividerData),
    OpenTracking,
    Liquid(LiquidData),
    Other {
        kind: String,
        data: serde_json::Value,
    },
}

impl BlockData {
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockData::Root(_) => BlockKind::Root,
            BlockData::Section { layout, .. } => BlockKind::Section(*layout),
            BlockData::Column(_) => BlockKind::Column,
            BlockData::Text(_) => BlockKind::Text,
            BlockData::Heading(_) => BlockKind::Heading,
            BlockData::Image(_) => BlockKind::Image,
            BlockData::Button(_) => BlockKind::Button,
            BlockData::Divider(_) => BlockKind::Divider,
            BlockData::OpenTracking => BlockKind::OpenTracking,
            BlockData::Liquid(_) => BlockKind::Liquid,
            BlockData::Other { kind, .. } => BlockKind::Other(kind.clone()),
        }
    }

    /// Decode the persisted `data` object for a block of `kind`.
    ///
    /// Kinds without a built-in payload keep their data verbatim.
    pub fn from_json(kind: &str, data: serde_json::Value) -> BlockResult<Self> {
        let data = match data {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        let wrap = |err: serde_json::Error| BlockError::InvalidData {
            kind: kind.to_string(),
            reason: err.to_string(),
        };
        Ok(match BlockKind::parse(kind) {
            BlockKind::Root => BlockData::Root(serde_json::from_value(data).map_err(wrap)?),
            BlockKind::Section(layout) => BlockData::Section {
                layout,
                data: serde_json::from_value(data).map_err(wrap)?,
            },
            BlockKind::Column => BlockData::Column(serde_json::from_value(data).map_err(wrap)?),
            BlockKind::Text => BlockData::Text(serde_json::from_value(data).map_err(wrap)?),
            BlockKind::Heading => BlockData::Heading(serde_json::from_value(data).map_err(wrap)?),
            BlockKind::Image => BlockData::Image(serde_json::from_value(data).map_err(wrap)?),
            BlockKind::Button => BlockData::Button(serde_json::from_value(data).map_err(wrap)?),
            BlockKind::Divider => BlockData::Divider(serde_json::from_value(data).map_err(wrap)?),
            BlockKind::OpenTracking => BlockData::OpenTracking,
            BlockKind::Liquid => BlockData::Liquid(serde_json::from_value(data).map_err(wrap)?),
            BlockKind::Other(kind) => BlockData::Other { kind, data },
        })
    }

    /// Encode the payload as the persisted `data` object.
    pub fn to_json(&self) -> serde_json::Value {
        let encoded = match self {
            BlockData::Root(d) => serde_json::to_value(d),
            BlockData::Section { data, .. } => serde_json::to_value(data),
            BlockData::Column(d) => serde_json::to_value(d),
            BlockData::Text(d) => serde_json::to_value(d),
            BlockData::Heading(d) => serde_json::to_value(d),
            BlockData::Image(d) => serde_json::to_value(d),
            BlockData::Button(d) => serde_json::to_value(d),
            BlockData::Divider(d) => serde_json::to_value(d),
            BlockData::OpenTracking => Ok(serde_json::Value::Object(Default::default())),
            BlockData::Liquid(d) => serde_json::to_value(d),
            BlockData::Other { data, .. } => Ok(data.clone()),
        };
        // Payload structs hold only strings, numbers, bools and string-keyed maps.
        encoded.unwrap_or(serde_json::Value::Null)
    }

    /// Every colour-valued style field, as `(property, value)` pairs.
    pub fn colors(&self) -> Vec<(&'static str, &str)> {
        fn push<'a>(out: &mut Vec<(&'static str, &'a str)>, name: &'static str, value: &'a Option<String>) {
            if let Some(v) = value {
                out.push((name, v.as_str()));
            }
        }

        let mut out = Vec::new();
        match self {
            BlockData::Root(d) => {
                push(&mut out, "backgroundColor", &d.background_color);
                push(&mut out, "textColor", &d.text_color);
                push(&mut out, "linkColor", &d.link_color);
            }
            BlockData::Section { data, .. } => {
                push(&mut out, "backgroundColor", &data.background_color);
                for c in data.border.colors() {
                    out.push(("border", c));
                }
            }
            BlockData::Column(d) => {
                push(&mut out, "backgroundColor", &d.background_color);
                for c in d.border.colors() {
                    out.push(("border", c));
                }
            }
            BlockData::Text(d) | BlockData::Heading(HeadingData { text: d, .. }) => {
                push(&mut out, "backgroundColor", &d.background_color);
                for run in d.content.iter().flat_map(|line| &line.runs) {
                    if let Some(c) = &run.color {
                        out.push(("color", c.as_str()));
                    }
                    if let Some(c) = &run.background_color {
                        out.push(("backgroundColor", c.as_str()));
                    }
                }
            }
            BlockData::Image(d) => push(&mut out, "backgroundColor", &d.background_color),
            BlockData::Button(d) => {
                push(&mut out, "backgroundColor", &d.background_color);
                push(&mut out, "textColor", &d.text_color);
                for c in d.border.colors() {
                    out.push(("border", c));
                }
            }
            BlockData::Divider(d) => {
                push(&mut out, "borderColor", &d.border_color);
                push(&mut out, "backgroundColor", &d.background_color);
            }
            BlockData::OpenTracking | BlockData::Liquid(_) | BlockData::Other { .. } => {}
        }
        out
    }
}

/// A block as stored in the tree arena: identity plus payload. Position is
/// held by the tree, never by the block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub data: BlockData,
}

impl Block {
    pub fn new(data: BlockData) -> Self {
        Self {
            id: BlockId::generate(),
            data,
        }
    }

    pub fn with_id(id: BlockId, data: BlockData) -> Self {
        Self { id, data }
    }

    pub fn kind(&self) -> BlockKind {
        self.data.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_strings_round_trip() {
        for kind in [
            "root",
            "oneColumn",
            "columns168",
            "column",
            "text",
            "openTracking",
            "liquid",
        ] {
            assert_eq!(BlockKind::parse(kind).as_str(), kind);
        }
        assert_eq!(
            BlockKind::parse("carousel"),
            BlockKind::Other("carousel".into())
        );
    }

    #[test]
    fn unequal_layouts_use_fixed_ratios() {
        assert_eq!(
            ColumnLayout::Columns168.column_width(0, 2).as_deref(),
            Some("66.66%")
        );
        assert_eq!(
            ColumnLayout::Columns168.column_width(1, 2).as_deref(),
            Some("33.33%")
        );
        assert_eq!(ColumnLayout::Columns168.column_width(2, 2), None);
    }

    #[test]
    fn equal_layouts_divide_evenly() {
        assert_eq!(ColumnLayout::OneColumn.column_width(0, 1).as_deref(), Some("100%"));
        assert_eq!(ColumnLayout::Columns1212.column_width(1, 2).as_deref(), Some("50%"));
        assert_eq!(ColumnLayout::Columns888.column_width(2, 3).as_deref(), Some("33.33%"));
        assert_eq!(ColumnLayout::Columns6666.column_width(0, 4).as_deref(), Some("25%"));
    }

    #[test]
    fn decode_button_payload() {
        let data = BlockData::from_json(
            "button",
            json!({"text": "Go", "href": "https://example.com", "disableTracking": true}),
        )
        .unwrap();
        match data {
            BlockData::Button(b) => {
                assert_eq!(b.text, "Go");
                assert!(b.disable_tracking);
            }
            other => panic!("expected button, got {:?}", other),
        }
    }

    #[test]
    fn unknown_kind_keeps_data() {
        let raw = json!({"slides": [1, 2, 3]});
        let data = BlockData::from_json("carousel", raw.clone()).unwrap();
        assert_eq!(data.kind(), BlockKind::Other("carousel".into()));
        assert_eq!(data.to_json(), raw);
    }

    #[test]
    fn heading_flattens_text_fields() {
        let data = BlockData::from_json(
            "heading",
            json!({"level": "h2", "content": [{"runs": [{"text": "Title"}]}]}),
        )
        .unwrap();
        let BlockData::Heading(h) = data else {
            panic!("expected heading");
        };
        assert_eq!(h.level, HeadingLevel::H2);
        assert_eq!(h.text.content[0].text(), "Title");
    }

    #[test]
    fn invalid_payload_is_reported() {
        let err = BlockData::from_json("image", json!({"width": "wide"})).unwrap_err();
        assert!(matches!(err, BlockError::InvalidData { .. }));
    }
}

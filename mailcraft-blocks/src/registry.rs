//! Block definition registry.
//!
//! One immutable [`BlockDefinition`] per kind, built once from the built-in
//! catalogue plus any custom definitions. Custom entries replace built-ins
//! that share their kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::blocks::{
    Block, BlockData, BlockKind, ButtonData, ColumnData, ColumnLayout, DividerData, HeadingData,
    ImageData, LiquidData, RootData, SectionData, TextData,
};
use crate::document::{BlockDocument, SavedBlock, Subtree};
use crate::error::{BlockError, BlockResult};
use crate::rich_text::RichLine;
use crate::style::Spacing;

/// The group a block belongs to when dragged; containers accept one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropGroup {
    Sections,
    Columns,
    Content,
}

/// How a kind contributes to compiled markup.
#[derive(Debug, Clone, PartialEq)]
pub enum Emit {
    /// Handled by the compiler's own emission for the kind.
    Builtin,
    /// A Liquid template producing MJML. The block's data is bound as `block`.
    Template { source: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockDefinition {
    pub kind: BlockKind,
    pub label: String,
    pub icon: Option<String>,
    /// Group this block is dragged as; `None` for blocks that never move.
    pub group: Option<DropGroup>,
    /// Group accepted as children, for containers.
    pub accepts: Option<DropGroup>,
    pub is_draggable: bool,
    pub is_deletable: bool,
    pub is_cloneable: bool,
    pub contains_draggables: bool,
    pub default_data: BlockData,
    pub emit: Emit,
}

impl BlockDefinition {
    fn builtin(kind: BlockKind, label: &str, icon: &str, default_data: BlockData) -> Self {
        let (group, accepts) = match &kind {
            BlockKind::Root => (None, Some(DropGroup::Sections)),
            BlockKind::Section(_) => (Some(DropGroup::Sections), Some(DropGroup::Columns)),
            BlockKind::Column => (None, Some(DropGroup::Content)),
            _ => (Some(DropGroup::Content), None),
        };
        let fixed = matches!(kind, BlockKind::Root | BlockKind::Column);
        Self {
            kind,
            label: label.to_string(),
            icon: Some(icon.to_string()),
            group,
            accepts,
            is_draggable: !fixed,
            is_deletable: !fixed,
            is_cloneable: !fixed,
            contains_draggables: accepts.is_some(),
            default_data,
            emit: Emit::Builtin,
        }
    }
}

/// A custom definition as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomBlockConfig {
    pub kind: String,
    pub label: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// MJML Liquid template.
    pub template: String,
    #[serde(default)]
    pub default_data: serde_json::Value,
    #[serde(default = "default_true")]
    pub draggable: bool,
    #[serde(default = "default_true")]
    pub deletable: bool,
    #[serde(default = "default_true")]
    pub cloneable: bool,
}

fn default_true() -> bool {
    true
}

impl CustomBlockConfig {
    pub fn into_definition(self) -> BlockResult<BlockDefinition> {
        let kind = BlockKind::parse(&self.kind);
        if !kind.is_leaf() {
            return Err(BlockError::ConfigError(format!(
                "custom block '{}' must be a content kind",
                self.kind
            )));
        }
        let default_data = BlockData::from_json(&self.kind, self.default_data)?;
        Ok(BlockDefinition {
            kind,
            label: self.label,
            icon: self.icon,
            group: Some(DropGroup::Content),
            accepts: None,
            is_draggable: self.draggable,
            is_deletable: self.deletable,
            is_cloneable: self.cloneable,
            contains_draggables: false,
            default_data,
            emit: Emit::Template {
                source: self.template,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    definitions: BTreeMap<String, BlockDefinition>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Registry {
    /// The built-in catalogue.
    pub fn builtin() -> Self {
        let mut definitions = BTreeMap::new();
        for def in builtin_definitions() {
            definitions.insert(def.kind.as_str().to_string(), def);
        }
        Self { definitions }
    }

    /// Built-ins with `custom` merged on top.
    pub fn with_custom(custom: Vec<BlockDefinition>) -> Self {
        let mut registry = Self::builtin();
        for def in custom {
            registry
                .definitions
                .insert(def.kind.as_str().to_string(), def);
        }
        registry
    }

    pub fn from_config(custom: Vec<CustomBlockConfig>) -> BlockResult<Self> {
        let defs = custom
            .into_iter()
            .map(CustomBlockConfig::into_definition)
            .collect::<BlockResult<Vec<_>>>()?;
        Ok(Self::with_custom(defs))
    }

    pub fn get(&self, kind: &BlockKind) -> Option<&BlockDefinition> {
        self.definitions.get(kind.as_str())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &BlockDefinition> {
        self.definitions.values()
    }

    /// Definitions offered in the insert menu for `group`, sorted by kind.
    pub fn menu(&self, group: DropGroup) -> Vec<&BlockDefinition> {
        self.definitions
            .values()
            .filter(|def| def.group == Some(group))
            .collect()
    }

    /// Kinds without a definition behave like ordinary content blocks.
    pub fn is_deletable(&self, kind: &BlockKind) -> bool {
        match self.get(kind) {
            Some(def) => def.is_deletable,
            None => kind.is_leaf(),
        }
    }

    pub fn is_draggable(&self, kind: &BlockKind) -> bool {
        match self.get(kind) {
            Some(def) => def.is_draggable,
            None => kind.is_leaf(),
        }
    }

    pub fn is_cloneable(&self, kind: &BlockKind) -> bool {
        match self.get(kind) {
            Some(def) => def.is_cloneable,
            None => kind.is_leaf(),
        }
    }

    /// A fresh block of `kind` with the definition's default payload and new
    /// ids. Sections come with their columns.
    pub fn instantiate(&self, kind: &BlockKind) -> BlockResult<Subtree> {
        let def = self.get(kind).ok_or_else(|| BlockError::UnknownKind {
            kind: kind.to_string(),
        })?;
        let block = Block::new(def.default_data.clone());
        let children = match kind {
            BlockKind::Section(layout) => (0..layout.column_count())
                .map(|_| self.instantiate(&BlockKind::Column))
                .collect::<BlockResult<Vec<_>>>()?,
            _ => Vec::new(),
        };
        Ok(Subtree::new(block, children))
    }

    /// Decode a saved block and give every block in it a new id.
    pub fn instantiate_saved(&self, saved: &SavedBlock) -> BlockResult<Subtree> {
        let doc = BlockDocument::from_json(&saved.content)?;
        let mut subtree = Subtree::from_document(&doc)?;
        subtree.regenerate_ids();
        Ok(subtree)
    }
}

fn builtin_definitions() -> Vec<BlockDefinition> {
    let mut defs = vec![
        BlockDefinition::builtin(
            BlockKind::Root,
            "Email",
            "mail",
            BlockData::Root(RootData {
                background_color: Some("#f5f5f5".into()),
                font_family: Some("Arial, Helvetica, sans-serif".into()),
                font_size: Some(14),
                text_color: Some("#1f2937".into()),
                link_color: Some("#2563eb".into()),
                ..RootData::default()
            }),
        ),
        BlockDefinition::builtin(
            BlockKind::Column,
            "Column",
            "column",
            BlockData::Column(ColumnData::default()),
        ),
        BlockDefinition::builtin(
            BlockKind::Text,
            "Text",
            "text",
            BlockData::Text(TextData {
                padding: Spacing::all(10),
                content: vec![RichLine::plain("Write something here")],
                ..TextData::default()
            }),
        ),
        BlockDefinition::builtin(
            BlockKind::Heading,
            "Heading",
            "heading",
            BlockData::Heading(HeadingData {
                text: TextData {
                    padding: Spacing::all(10),
                    content: vec![RichLine::plain("Heading")],
                    ..TextData::default()
                },
                ..HeadingData::default()
            }),
        ),
        BlockDefinition::builtin(
            BlockKind::Image,
            "Image",
            "image",
            BlockData::Image(ImageData {
                src: "https://placehold.co/600x200".into(),
                alt: Some("Image".into()),
                padding: Spacing::all(10),
                ..ImageData::default()
            }),
        ),
        BlockDefinition::builtin(
            BlockKind::Button,
            "Button",
            "button",
            BlockData::Button(ButtonData {
                text: "Click me".into(),
                href: "https://example.com".into(),
                background_color: Some("#2563eb".into()),
                text_color: Some("#ffffff".into()),
                inner_padding: Spacing::separate(10, 25, 10, 25),
                padding: Spacing::all(10),
                ..ButtonData::default()
            }),
        ),
        BlockDefinition::builtin(
            BlockKind::Divider,
            "Divider",
            "divider",
            BlockData::Divider(DividerData {
                border_color: Some("#e5e7eb".into()),
                border_width: Some(1),
                padding: Spacing::all(10),
                ..DividerData::default()
            }),
        ),
        BlockDefinition::builtin(
            BlockKind::OpenTracking,
            "Open tracking",
            "eye",
            BlockData::OpenTracking,
        ),
        BlockDefinition::builtin(
            BlockKind::Liquid,
            "Liquid",
            "code",
            BlockData::Liquid(LiquidData {
                source: "<mj-text>{{ contact.first_name | default: \"Hello\" }}</mj-text>".into(),
            }),
        ),
    ];
    for layout in ColumnLayout::ALL {
        defs.push(BlockDefinition::builtin(
            BlockKind::Section(layout),
            layout_label(layout),
            "columns",
            BlockData::Section {
                layout,
                data: SectionData {
                    padding: Spacing::all(20),
                    ..SectionData::default()
                },
            },
        ));
    }
    defs
}

fn layout_label(layout: ColumnLayout) -> &'static str {
    match layout {
        ColumnLayout::OneColumn => "1 column",
        ColumnLayout::Columns1212 => "2 columns (50/50)",
        ColumnLayout::Columns888 => "3 columns",
        ColumnLayout::Columns6666 => "4 columns",
        ColumnLayout::Columns168 => "2 columns (66/33)",
        ColumnLayout::Columns816 => "2 columns (33/66)",
        ColumnLayout::Columns204 => "2 columns (83/17)",
        ColumnLayout::Columns420 => "2 columns (17/83)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_cover_every_kind() {
        let registry = Registry::builtin();
        for kind in ["root", "column", "text", "heading", "image", "button", "divider", "openTracking", "liquid"] {
            assert!(registry.get(&BlockKind::parse(kind)).is_some(), "{kind}");
        }
        for layout in ColumnLayout::ALL {
            assert!(registry.get(&BlockKind::Section(layout)).is_some());
        }
    }

    #[test]
    fn root_and_column_are_fixed() {
        let registry = Registry::builtin();
        for kind in [BlockKind::Root, BlockKind::Column] {
            assert!(!registry.is_deletable(&kind));
            assert!(!registry.is_draggable(&kind));
            assert!(!registry.is_cloneable(&kind));
        }
        assert!(registry.is_cloneable(&BlockKind::Section(ColumnLayout::Columns1212)));
        assert!(registry.is_deletable(&BlockKind::Button));
        assert!(registry.is_deletable(&BlockKind::Other("carousel".into())));
    }

    #[test]
    fn section_instantiates_with_columns() {
        let registry = Registry::builtin();
        let section = registry
            .instantiate(&BlockKind::Section(ColumnLayout::Columns888))
            .unwrap();
        assert_eq!(section.children.len(), 3);
        assert!(section.children.iter().all(|c| c.kind() == BlockKind::Column));
    }

    #[test]
    fn default_payload_is_copied_per_instance() {
        let registry = Registry::builtin();
        let mut a = registry.instantiate(&BlockKind::Button).unwrap();
        let b = registry.instantiate(&BlockKind::Button).unwrap();
        assert_ne!(a.block.id, b.block.id);
        if let BlockData::Button(data) = &mut a.block.data {
            data.text = "Changed".into();
        }
        let def = registry.get(&BlockKind::Button).unwrap();
        assert_eq!(b.block.data, def.default_data);
        assert_ne!(a.block.data, def.default_data);
    }

    #[test]
    fn custom_definition_wins() {
        let registry = Registry::from_config(vec![
            CustomBlockConfig {
                kind: "divider".into(),
                label: "Fancy divider".into(),
                icon: None,
                template: "<mj-divider border-color=\"red\" />".into(),
                default_data: json!({}),
                draggable: true,
                deletable: false,
                cloneable: true,
            },
            CustomBlockConfig {
                kind: "quote".into(),
                label: "Quote".into(),
                icon: None,
                template: "<mj-text>{{ block.text }}</mj-text>".into(),
                default_data: json!({"text": "Be kind"}),
                draggable: true,
                deletable: true,
                cloneable: true,
            },
        ])
        .unwrap();
        let divider = registry.get(&BlockKind::Divider).unwrap();
        assert_eq!(divider.label, "Fancy divider");
        assert!(!registry.is_deletable(&BlockKind::Divider));

        let quote = registry.instantiate(&BlockKind::Other("quote".into())).unwrap();
        assert_eq!(quote.block.data.to_json(), json!({"text": "Be kind"}));
        assert!(registry
            .menu(DropGroup::Content)
            .iter()
            .any(|d| d.label == "Quote"));
    }

    #[test]
    fn custom_container_kinds_are_rejected() {
        let err = Registry::from_config(vec![CustomBlockConfig {
            kind: "column".into(),
            label: "Column".into(),
            icon: None,
            template: String::new(),
            default_data: json!({}),
            draggable: true,
            deletable: true,
            cloneable: true,
        }])
        .unwrap_err();
        assert!(matches!(err, BlockError::ConfigError(_)));
    }

    #[test]
    fn saved_block_gets_fresh_ids() {
        let registry = Registry::builtin();
        let original = registry
            .instantiate(&BlockKind::Section(ColumnLayout::Columns1212))
            .unwrap();
        let saved = SavedBlock::from_subtree("Two columns", &original).unwrap();
        let copy = registry.instantiate_saved(&saved).unwrap();
        assert_eq!(copy.children.len(), 2);
        let before = original.ids();
        assert!(copy.ids().iter().all(|id| !before.contains(id)));
    }

    #[test]
    fn unknown_kind_cannot_be_instantiated() {
        let err = Registry::builtin()
            .instantiate(&BlockKind::Other("carousel".into()))
            .unwrap_err();
        assert!(matches!(err, BlockError::UnknownKind { .. }));
    }
}

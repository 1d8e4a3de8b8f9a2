use serde::{Deserialize, Serialize};

use crate::blocks::{Block, BlockData, BlockId, BlockKind};
use crate::error::BlockResult;

/// Persisted form of a block and its descendants: `{id, kind, data, children}`.
///
/// A `path` field, if present in stored JSON, is ignored. Paths are always
/// recomputed from the loaded shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDocument {
    pub id: BlockId,
    pub kind: BlockKind,
    #[serde(default = "empty_object")]
    pub data: serde_json::Value,
    #[serde(default)]
    pub children: Vec<BlockDocument>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl BlockDocument {
    pub fn from_json(json: &str) -> BlockResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> BlockResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> BlockResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// An owned block subtree, decoded into typed payloads.
///
/// This is the unit that moves in and out of a tree: inserted blocks, clones,
/// saved blocks and whole documents all pass through it.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtree {
    pub block: Block,
    pub children: Vec<Subtree>,
}

impl Subtree {
    pub fn leaf(block: Block) -> Self {
        Self {
            block,
            children: Vec::new(),
        }
    }

    pub fn new(block: Block, children: Vec<Subtree>) -> Self {
        Self { block, children }
    }

    pub fn kind(&self) -> BlockKind {
        self.block.kind()
    }

    pub fn from_document(doc: &BlockDocument) -> BlockResult<Self> {
        let data = BlockData::from_json(doc.kind.as_str(), doc.data.clone())?;
        let children = doc
            .children
            .iter()
            .map(Subtree::from_document)
            .collect::<BlockResult<Vec<_>>>()?;
        Ok(Self {
            block: Block::with_id(doc.id.clone(), data),
            children,
        })
    }

    pub fn to_document(&self) -> BlockDocument {
        BlockDocument {
            id: self.block.id.clone(),
            kind: self.block.kind(),
            data: self.block.data.to_json(),
            children: self.children.iter().map(Subtree::to_document).collect(),
        }
    }

    /// Assigns a fresh id to this block and every descendant.
    pub fn regenerate_ids(&mut self) {
        self.block.id = BlockId::generate();
        for child in &mut self.children {
            child.regenerate_ids();
        }
    }

    /// Ids of this block and all descendants, pre-order.
    pub fn ids(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        self.collect_ids(&mut out);
        out
    }

    fn collect_ids(&self, out: &mut Vec<BlockId>) {
        out.push(self.block.id.clone());
        for child in &self.children {
            child.collect_ids(out);
        }
    }

    /// Number of levels, counting this block as one.
    pub fn height(&self) -> usize {
        1 + self.children.iter().map(Subtree::height).max().unwrap_or(0)
    }
}

/// A user-saved block: a named snapshot of a subtree, stored as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedBlock {
    pub id: String,
    pub name: String,
    /// Serialized [`BlockDocument`].
    pub content: String,
}

impl SavedBlock {
    pub fn from_subtree(name: impl Into<String>, subtree: &Subtree) -> BlockResult<Self> {
        Ok(Self {
            id: BlockId::generate().to_string(),
            name: name.into(),
            content: subtree.to_document().to_json()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_path_field_is_ignored() {
        let json = json!({
            "id": "b1",
            "kind": "divider",
            "path": "children[9].children[9]",
            "data": {}
        })
        .to_string();
        let doc = BlockDocument::from_json(&json).unwrap();
        assert_eq!(doc.id.as_str(), "b1");
        assert!(!doc.to_json().unwrap().contains("path"));
    }

    #[test]
    fn missing_data_and_children_default() {
        let doc = BlockDocument::from_json(r#"{"id":"x","kind":"openTracking"}"#).unwrap();
        assert!(doc.children.is_empty());
        let subtree = Subtree::from_document(&doc).unwrap();
        assert_eq!(subtree.kind(), BlockKind::OpenTracking);
    }

    #[test]
    fn regenerate_ids_touches_every_block() {
        let doc = BlockDocument::from_json(
            &json!({
                "id": "s", "kind": "oneColumn", "data": {},
                "children": [{"id": "c", "kind": "column", "data": {},
                    "children": [{"id": "t", "kind": "divider", "data": {}}]}]
            })
            .to_string(),
        )
        .unwrap();
        let mut subtree = Subtree::from_document(&doc).unwrap();
        let before = subtree.ids();
        subtree.regenerate_ids();
        let after = subtree.ids();
        assert_eq!(after.len(), 3);
        assert!(after.iter().all(|id| !before.contains(id)));
        assert_eq!(subtree.height(), 3);
    }
}

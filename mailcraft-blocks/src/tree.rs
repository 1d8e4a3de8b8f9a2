//! Arena-backed block tree.
//!
//! Blocks live in a slot vector and refer to each other by slot index.
//! Children are ordered index lists; a block's [`BlockPath`] is derived on
//! demand by walking parent links, so no path can go stale after a mutation.

use std::collections::HashMap;

use crate::blocks::{Block, BlockData, BlockId, BlockKind, RootData};
use crate::document::{BlockDocument, Subtree};
use crate::error::{BlockError, BlockResult};
use crate::path::BlockPath;
use crate::validator::{validate_document, MAX_NESTING_DEPTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeIdx(usize);

#[derive(Debug, Clone)]
struct Slot {
    block: Block,
    parent: Option<NodeIdx>,
    children: Vec<NodeIdx>,
}

#[derive(Debug, Clone)]
pub struct BlockTree {
    slots: Vec<Option<Slot>>,
    free: Vec<NodeIdx>,
    root: NodeIdx,
    index: HashMap<BlockId, NodeIdx>,
}

impl BlockTree {
    /// An empty document: a root block with no sections.
    pub fn new(root: RootData) -> Self {
        let block = Block::new(BlockData::Root(root));
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeIdx(0),
            index: HashMap::new(),
        };
        tree.root = tree.alloc(block, None);
        tree
    }

    /// Build a tree from a validated document subtree.
    pub fn from_subtree(root: Subtree, max_depth: usize) -> BlockResult<Self> {
        validate_document(&root, max_depth)?;
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeIdx(0),
            index: HashMap::new(),
        };
        tree.root = tree.attach(root, None);
        Ok(tree)
    }

    pub fn from_document(doc: &BlockDocument) -> BlockResult<Self> {
        Self::from_subtree(Subtree::from_document(doc)?, MAX_NESTING_DEPTH)
    }

    pub fn from_json(json: &str) -> BlockResult<Self> {
        Self::from_document(&BlockDocument::from_json(json)?)
    }

    pub fn to_document(&self) -> BlockDocument {
        self.to_subtree().to_document()
    }

    pub fn to_json(&self) -> BlockResult<String> {
        self.to_document().to_json()
    }

    /// Owned copy of the whole tree.
    pub fn to_subtree(&self) -> Subtree {
        self.subtree_at(self.root)
    }

    // ─── Reads ────────────────────────────────────────────────────────────

    pub fn root(&self) -> &Block {
        &self.slot(self.root).block
    }

    pub fn root_data(&self) -> &RootData {
        match &self.root().data {
            BlockData::Root(data) => data,
            // The root slot is created from, and only replaced by, root payloads.
            _ => unreachable!("root slot holds a non-root block"),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot(self.root).children.is_empty()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &BlockId) -> Option<&Block> {
        self.index.get(id).map(|&idx| &self.slot(idx).block)
    }

    pub fn resolve(&self, path: &BlockPath) -> BlockResult<&Block> {
        let idx = self.resolve_idx(path)?;
        Ok(&self.slot(idx).block)
    }

    /// Owned copy of the block at `path` and everything below it.
    pub fn subtree(&self, path: &BlockPath) -> BlockResult<Subtree> {
        Ok(self.subtree_at(self.resolve_idx(path)?))
    }

    /// Current path of a block, computed from parent links.
    pub fn path_of(&self, id: &BlockId) -> Option<BlockPath> {
        let mut idx = *self.index.get(id)?;
        let mut indices = Vec::new();
        while let Some(parent) = self.slot(idx).parent {
            let position = self
                .slot(parent)
                .children
                .iter()
                .position(|&c| c == idx)?;
            indices.push(position);
            idx = parent;
        }
        indices.reverse();
        Some(BlockPath::from_indices(indices))
    }

    pub fn parent(&self, id: &BlockId) -> Option<&Block> {
        let idx = *self.index.get(id)?;
        self.slot(idx).parent.map(|p| &self.slot(p).block)
    }

    pub fn children(&self, id: &BlockId) -> Vec<&Block> {
        match self.index.get(id) {
            Some(&idx) => self
                .slot(idx)
                .children
                .iter()
                .map(|&c| &self.slot(c).block)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn children_at(&self, path: &BlockPath) -> BlockResult<Vec<&Block>> {
        let idx = self.resolve_idx(path)?;
        Ok(self
            .slot(idx)
            .children
            .iter()
            .map(|&c| &self.slot(c).block)
            .collect())
    }

    /// Blocks from the root down to `id`, inclusive.
    pub fn ancestors(&self, id: &BlockId) -> Vec<&Block> {
        let mut chain = Vec::new();
        let mut current = self.index.get(id).copied();
        while let Some(idx) = current {
            let slot = self.slot(idx);
            chain.push(&slot.block);
            current = slot.parent;
        }
        chain.reverse();
        chain
    }

    /// Pre-order walk yielding every block with its freshly derived path.
    pub fn walk(&self) -> Vec<(BlockPath, &Block)> {
        let mut out = Vec::with_capacity(self.len());
        self.walk_from(self.root, BlockPath::root(), &mut out);
        out
    }

    fn walk_from<'a>(&'a self, idx: NodeIdx, path: BlockPath, out: &mut Vec<(BlockPath, &'a Block)>) {
        let slot = self.slot(idx);
        out.push((path.clone(), &slot.block));
        for (i, &child) in slot.children.iter().enumerate() {
            self.walk_from(child, path.child(i), out);
        }
    }

    /// Read-only traversal handle for compilers and renderers.
    pub fn root_node(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            idx: self.root,
        }
    }

    // ─── Crate-internal edits (callers keep the tree valid) ────────────────

    pub(crate) fn resolve_idx(&self, path: &BlockPath) -> BlockResult<NodeIdx> {
        let mut idx = self.root;
        for &i in path.indices() {
            idx = *self
                .slot(idx)
                .children
                .get(i)
                .ok_or_else(|| BlockError::PathNotFound { path: path.clone() })?;
        }
        Ok(idx)
    }

    pub(crate) fn kind_at(&self, idx: NodeIdx) -> BlockKind {
        self.slot(idx).block.kind()
    }

    pub(crate) fn child_count(&self, idx: NodeIdx) -> usize {
        self.slot(idx).children.len()
    }

    pub(crate) fn subtree_at(&self, idx: NodeIdx) -> Subtree {
        let slot = self.slot(idx);
        Subtree {
            block: slot.block.clone(),
            children: slot.children.iter().map(|&c| self.subtree_at(c)).collect(),
        }
    }

    pub(crate) fn insert(&mut self, parent: NodeIdx, index: usize, subtree: Subtree) -> BlockResult<NodeIdx> {
        let len = self.child_count(parent);
        if index > len {
            return Err(BlockError::IndexOutOfBounds { index, len });
        }
        let idx = self.attach(subtree, Some(parent));
        self.slot_mut(parent).children.insert(index, idx);
        Ok(idx)
    }

    /// Detach the block at `idx` with all descendants and return them.
    pub(crate) fn remove(&mut self, idx: NodeIdx) -> Subtree {
        if let Some(parent) = self.slot(idx).parent {
            self.slot_mut(parent).children.retain(|&c| c != idx);
        }
        self.release(idx)
    }

    pub(crate) fn set_data(&mut self, idx: NodeIdx, data: BlockData) {
        self.slot_mut(idx).block.data = data;
    }

    /// Replace the whole tree's content with `root`.
    pub(crate) fn replace_root(&mut self, root: Subtree) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.root = self.attach(root, None);
    }

    fn attach(&mut self, subtree: Subtree, parent: Option<NodeIdx>) -> NodeIdx {
        let Subtree { block, children } = subtree;
        let idx = self.alloc(block, parent);
        let child_indices: Vec<NodeIdx> = children
            .into_iter()
            .map(|child| self.attach(child, Some(idx)))
            .collect();
        self.slot_mut(idx).children = child_indices;
        idx
    }

    fn release(&mut self, idx: NodeIdx) -> Subtree {
        let slot = self.slots[idx.0].take();
        self.free.push(idx);
        match slot {
            Some(slot) => {
                self.index.remove(&slot.block.id);
                let children = slot.children.iter().map(|&c| self.release(c)).collect();
                Subtree {
                    block: slot.block,
                    children,
                }
            }
            None => unreachable!("released an empty slot"),
        }
    }

    fn alloc(&mut self, block: Block, parent: Option<NodeIdx>) -> NodeIdx {
        let id = block.id.clone();
        let slot = Slot {
            block,
            parent,
            children: Vec::new(),
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx.0] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                NodeIdx(self.slots.len() - 1)
            }
        };
        self.index.insert(id, idx);
        idx
    }

    fn slot(&self, idx: NodeIdx) -> &Slot {
        match &self.slots[idx.0] {
            Some(slot) => slot,
            None => unreachable!("dangling node index"),
        }
    }

    fn slot_mut(&mut self, idx: NodeIdx) -> &mut Slot {
        match &mut self.slots[idx.0] {
            Some(slot) => slot,
            None => unreachable!("dangling node index"),
        }
    }
}

/// Structural equality: same blocks in the same shape, regardless of how the
/// arena happens to lay them out.
impl PartialEq for BlockTree {
    fn eq(&self, other: &Self) -> bool {
        self.to_subtree() == other.to_subtree()
    }
}

/// Borrowed view of one block and its position in a tree.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a BlockTree,
    idx: NodeIdx,
}

impl<'a> NodeRef<'a> {
    pub fn block(&self) -> &'a Block {
        &self.tree.slot(self.idx).block
    }

    pub fn kind(&self) -> BlockKind {
        self.block().kind()
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        tree.slot(self.idx)
            .children
            .iter()
            .map(move |&idx| NodeRef { tree, idx })
    }

    pub fn child_count(&self) -> usize {
        self.tree.child_count(self.idx)
    }
}

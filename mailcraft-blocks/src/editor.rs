//! An editing session: the current tree, its history, and the selection.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::blocks::{Block, BlockId, BlockKind};
use crate::compiler::{compile, CompileOptions, CompileOutput};
use crate::config::EditorConfig;
use crate::document::{SavedBlock, Subtree};
use crate::error::BlockResult;
use crate::history::EditHistory;
use crate::mutation::{Mutation, Update};
use crate::path::BlockPath;
use crate::registry::Registry;
use crate::tree::BlockTree;
use crate::tracking::LinkParams;

pub struct Editor {
    registry: Arc<Registry>,
    history: EditHistory,
    selection: Option<BlockId>,
    max_depth: usize,
    link_params: Option<LinkParams>,
}

impl Editor {
    /// Start a session on `tree`, building the registry from `config`.
    pub fn new(tree: BlockTree, config: &EditorConfig) -> BlockResult<Self> {
        let registry = Arc::new(config.registry()?);
        Ok(Self::with_registry(tree, registry, config))
    }

    pub fn with_registry(tree: BlockTree, registry: Arc<Registry>, config: &EditorConfig) -> Self {
        Self {
            registry,
            history: EditHistory::new(tree, config.history.clone()),
            selection: None,
            max_depth: config.max_depth,
            link_params: config.link_params.clone(),
        }
    }

    pub fn tree(&self) -> &Arc<BlockTree> {
        self.history.current()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    /// Apply `mutation` to the current tree and commit the result. On error
    /// nothing changes.
    pub fn apply(&mut self, mutation: Mutation) -> BlockResult<&Arc<BlockTree>> {
        let next = match mutation.apply(self.tree(), &self.registry, self.max_depth) {
            Ok(next) => next,
            Err(err) => {
                info!(mutation = mutation.name(), error = %err, "mutation rejected");
                return Err(err);
            }
        };
        self.history.commit(next);
        debug!(
            mutation = mutation.name(),
            entries = self.history.len(),
            blocks = self.tree().len(),
            "committed snapshot"
        );
        self.refresh_selection();
        Ok(self.history.current())
    }

    pub fn update_tree(&mut self, path: &BlockPath, update: Update) -> BlockResult<&Arc<BlockTree>> {
        self.apply(Mutation::Update {
            path: path.clone(),
            update,
        })
    }

    pub fn move_node(
        &mut self,
        source: &BlockPath,
        destination: &BlockPath,
        index: Option<usize>,
    ) -> BlockResult<&Arc<BlockTree>> {
        self.apply(Mutation::Move {
            source: source.clone(),
            destination: destination.clone(),
            index,
        })
    }

    pub fn delete_node(&mut self, path: &BlockPath) -> BlockResult<&Arc<BlockTree>> {
        self.apply(Mutation::Delete { path: path.clone() })
    }

    pub fn clone_node(&mut self, path: &BlockPath) -> BlockResult<&Arc<BlockTree>> {
        self.apply(Mutation::Clone { path: path.clone() })
    }

    pub fn insert_node(
        &mut self,
        container: &BlockPath,
        index: Option<usize>,
        node: Subtree,
    ) -> BlockResult<&Arc<BlockTree>> {
        self.apply(Mutation::Insert {
            container: container.clone(),
            index,
            node,
        })
    }

    pub fn insert_block(
        &mut self,
        container: &BlockPath,
        index: Option<usize>,
        kind: BlockKind,
    ) -> BlockResult<&Arc<BlockTree>> {
        self.apply(Mutation::InsertBlock {
            container: container.clone(),
            index,
            kind,
        })
    }

    /// Snapshot the subtree at `path` as a named saved block.
    pub fn save_block(&self, path: &BlockPath, name: &str) -> BlockResult<SavedBlock> {
        let subtree = self.tree().subtree(path)?;
        SavedBlock::from_subtree(name, &subtree)
    }

    /// Insert a fresh copy of a saved block.
    pub fn insert_saved(
        &mut self,
        container: &BlockPath,
        index: Option<usize>,
        saved: &SavedBlock,
    ) -> BlockResult<&Arc<BlockTree>> {
        let node = self.registry.instantiate_saved(saved)?;
        self.insert_node(container, index, node)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> &Arc<BlockTree> {
        self.history.undo();
        self.refresh_selection();
        self.history.current()
    }

    pub fn redo(&mut self) -> &Arc<BlockTree> {
        self.history.redo();
        self.refresh_selection();
        self.history.current()
    }

    /// Focus a block. Selection is UI state only: the tree and history are
    /// untouched. Returns false (and clears the selection) for unknown ids.
    pub fn select_node(&mut self, id: Option<BlockId>) -> bool {
        self.selection = id.filter(|id| self.tree().contains(id));
        self.selection.is_some()
    }

    pub fn selected(&self) -> Option<&Block> {
        self.selection.as_ref().and_then(|id| self.tree().get(id))
    }

    pub fn selected_path(&self) -> Option<BlockPath> {
        self.selection.as_ref().and_then(|id| self.tree().path_of(id))
    }

    /// `(id, kind)` of every block from the root down to the selection.
    pub fn breadcrumb(&self) -> Vec<(BlockId, BlockKind)> {
        match &self.selection {
            Some(id) => self
                .tree()
                .ancestors(id)
                .into_iter()
                .map(|b| (b.id.clone(), b.kind()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Compile the current snapshot with this session's link parameters.
    pub fn compile(&self, sample_data: Option<Value>) -> CompileOutput {
        let options = CompileOptions {
            sample_data,
            link_params: self.link_params.clone(),
            ..CompileOptions::default()
        };
        compile(self.tree(), &self.registry, options)
    }

    fn refresh_selection(&mut self) {
        if let Some(id) = &self.selection {
            if !self.history.current().contains(id) {
                debug!(block = %id, "selected block no longer exists");
                self.selection = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockData, ColumnLayout};
    use crate::error::BlockError;
    use serde_json::json;

    fn editor() -> Editor {
        let json = json!({
            "id": "root", "kind": "root", "data": {},
            "children": [{"id": "s", "kind": "oneColumn", "data": {}, "children": [
                {"id": "c", "kind": "column", "data": {}, "children": [
                    {"id": "h", "kind": "heading", "data": {}},
                    {"id": "b", "kind": "button", "data": {"text": "Go", "href": "https://x.io"}}
                ]}
            ]}]
        });
        let tree = BlockTree::from_json(&json.to_string()).unwrap();
        Editor::new(tree, &EditorConfig::default()).unwrap()
    }

    fn p(s: &str) -> BlockPath {
        s.parse().unwrap()
    }

    #[test]
    fn rejected_mutation_leaves_history_alone() {
        let mut ed = editor();
        let err = ed.delete_node(&p("children[0].children[0]")).unwrap_err();
        assert!(matches!(err, BlockError::NotDeletable { .. }));
        assert_eq!(ed.history().len(), 1);
    }

    #[test]
    fn breadcrumb_runs_root_to_selection() {
        let mut ed = editor();
        assert!(ed.select_node(Some(BlockId::new("b"))));
        let kinds: Vec<String> = ed.breadcrumb().into_iter().map(|(_, k)| k.to_string()).collect();
        assert_eq!(kinds, vec!["root", "oneColumn", "column", "button"]);
        assert_eq!(ed.selected_path(), Some(p("children[0].children[0].children[1]")));
    }

    #[test]
    fn selecting_does_not_touch_history() {
        let mut ed = editor();
        ed.select_node(Some(BlockId::new("h")));
        assert_eq!(ed.history().len(), 1);
        assert!(!ed.select_node(Some(BlockId::new("missing"))));
        assert!(ed.selected().is_none());
    }

    #[test]
    fn selection_follows_moves_and_clears_on_delete() {
        let mut ed = editor();
        ed.select_node(Some(BlockId::new("b")));
        ed.move_node(&p("children[0].children[0].children[1]"), &p("children[0].children[0]"), Some(0))
            .unwrap();
        assert_eq!(ed.selected_path(), Some(p("children[0].children[0].children[0]")));

        ed.delete_node(&p("children[0].children[0].children[0]")).unwrap();
        assert!(ed.selected().is_none());
        ed.undo();
        assert!(ed.selected().is_none());
    }

    #[test]
    fn undo_redo_through_session() {
        let mut ed = editor();
        let initial = Arc::clone(ed.tree());
        ed.insert_block(&BlockPath::root(), None, BlockKind::Section(ColumnLayout::Columns1212))
            .unwrap();
        ed.clone_node(&p("children[0].children[0].children[1]")).unwrap();
        assert_eq!(ed.tree().len(), initial.len() + 4);
        ed.undo();
        ed.undo();
        assert_eq!(**ed.tree(), *initial);
        ed.redo();
        ed.redo();
        assert_eq!(ed.tree().len(), initial.len() + 4);
    }

    #[test]
    fn save_and_reinsert_block() {
        let mut ed = editor();
        let saved = ed.save_block(&p("children[0]"), "Hero").unwrap();
        ed.insert_saved(&BlockPath::root(), None, &saved).unwrap();
        let tree = ed.tree();
        let copy = tree.resolve(&p("children[1].children[0].children[1]")).unwrap();
        assert!(matches!(copy.data, BlockData::Button(_)));
        assert_ne!(copy.id.as_str(), "b");
    }

    #[test]
    fn compile_uses_session_link_params() {
        let config = EditorConfig {
            link_params: Some(LinkParams {
                campaign: Some("launch".into()),
                ..LinkParams::default()
            }),
            ..EditorConfig::default()
        };
        let ed = Editor::new(editor().tree().as_ref().clone(), &config).unwrap();
        let out = ed.compile(None);
        assert!(out.mjml.contains("utm_campaign=launch"));
    }
}

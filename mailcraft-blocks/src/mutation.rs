//! Path-addressed edits over a [`BlockTree`].
//!
//! Every operation takes the current snapshot and returns a new one; the
//! input tree is never touched. Failed operations return an error and no tree.

use std::collections::HashSet;

use crate::blocks::{BlockData, BlockId, BlockKind};
use crate::document::Subtree;
use crate::error::{BlockError, BlockResult};
use crate::path::BlockPath;
use crate::registry::Registry;
use crate::tree::BlockTree;
use crate::validator::{validate_placement, validate_subtree};

/// Replacement content for [`update_tree`].
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Replace the block and everything below it.
    Node(Subtree),
    /// Replace only the block's payload, keeping id and children.
    Data(BlockData),
}

/// A single edit, as recorded by the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Update {
        path: BlockPath,
        update: Update,
    },
    Move {
        source: BlockPath,
        destination: BlockPath,
        index: Option<usize>,
    },
    Delete {
        path: BlockPath,
    },
    Clone {
        path: BlockPath,
    },
    Insert {
        container: BlockPath,
        index: Option<usize>,
        node: Subtree,
    },
    InsertBlock {
        container: BlockPath,
        index: Option<usize>,
        kind: BlockKind,
    },
}

impl Mutation {
    pub fn apply(&self, tree: &BlockTree, registry: &Registry, max_depth: usize) -> BlockResult<BlockTree> {
        match self {
            Mutation::Update { path, update } => update_tree(tree, path, update.clone(), max_depth),
            Mutation::Move {
                source,
                destination,
                index,
            } => move_node(tree, registry, source, destination, *index, max_depth),
            Mutation::Delete { path } => delete_node(tree, registry, path),
            Mutation::Clone { path } => clone_node(tree, registry, path),
            Mutation::Insert {
                container,
                index,
                node,
            } => insert_node(tree, container, *index, node.clone(), max_depth),
            Mutation::InsertBlock {
                container,
                index,
                kind,
            } => insert_block(tree, registry, container, *index, kind, max_depth),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Update { .. } => "update",
            Mutation::Move { .. } => "move",
            Mutation::Delete { .. } => "delete",
            Mutation::Clone { .. } => "clone",
            Mutation::Insert { .. } => "insert",
            Mutation::InsertBlock { .. } => "insert_block",
        }
    }
}

/// Replace the block (or just its payload) at `path`. An empty path replaces
/// the whole document.
pub fn update_tree(
    tree: &BlockTree,
    path: &BlockPath,
    update: Update,
    max_depth: usize,
) -> BlockResult<BlockTree> {
    let idx = tree.resolve_idx(path)?;
    let replacement = match update {
        Update::Node(node) => node,
        Update::Data(data) => {
            let mut current = tree.subtree_at(idx);
            current.block.data = data;
            current
        }
    };

    let Some((parent_path, index)) = path.split_last() else {
        return BlockTree::from_subtree(replacement, max_depth);
    };

    let parent = tree.resolve_idx(&parent_path)?;
    validate_subtree(&replacement, &tree.kind_at(parent), parent_path.depth(), max_depth)?;
    let replaced = tree.subtree_at(idx);
    ensure_fresh_ids(tree, &replacement, Some(&replaced))?;

    let mut next = tree.clone();
    next.remove(idx);
    next.insert(parent, index, replacement)?;
    Ok(next)
}

/// Move the block at `source` into the container at `destination`, at
/// `index` among its children after removal (`None` appends). Moving within
/// the same container reorders.
///
/// The root cannot move; asking to move it leaves the tree unchanged.
pub fn move_node(
    tree: &BlockTree,
    registry: &Registry,
    source: &BlockPath,
    destination: &BlockPath,
    index: Option<usize>,
    max_depth: usize,
) -> BlockResult<BlockTree> {
    if source.is_root() {
        return Ok(tree.clone());
    }
    let src = tree.resolve_idx(source)?;
    let kind = tree.kind_at(src);
    if !registry.is_draggable(&kind) {
        return Err(BlockError::NotDraggable { kind });
    }
    if destination.starts_with(source) {
        return Err(BlockError::MoveIntoSelf);
    }
    let dest = tree.resolve_idx(destination)?;
    let dest_kind = tree.kind_at(dest);
    validate_placement(&dest_kind, &kind)?;
    let moving = tree.subtree_at(src);
    validate_subtree(&moving, &dest_kind, destination.depth(), max_depth)?;

    // Node indices survive removal, so the destination stays valid even when
    // the source sat before it in document order.
    let mut next = tree.clone();
    let subtree = next.remove(src);
    let position = index.unwrap_or_else(|| next.child_count(dest));
    next.insert(dest, position, subtree)?;
    Ok(next)
}

/// Remove the block at `path` with all its descendants.
pub fn delete_node(tree: &BlockTree, registry: &Registry, path: &BlockPath) -> BlockResult<BlockTree> {
    let idx = tree.resolve_idx(path)?;
    let kind = tree.kind_at(idx);
    if path.is_root() || !registry.is_deletable(&kind) {
        return Err(BlockError::NotDeletable { kind });
    }
    let mut next = tree.clone();
    next.remove(idx);
    Ok(next)
}

/// Deep-copy the block at `path`, give the copy fresh ids, and insert it
/// right after the original.
pub fn clone_node(tree: &BlockTree, registry: &Registry, path: &BlockPath) -> BlockResult<BlockTree> {
    let idx = tree.resolve_idx(path)?;
    let kind = tree.kind_at(idx);
    let Some((parent_path, index)) = path.split_last() else {
        return Err(BlockError::NotCloneable { kind });
    };
    if !registry.is_cloneable(&kind) {
        return Err(BlockError::NotCloneable { kind });
    }
    let mut copy = tree.subtree_at(idx);
    copy.regenerate_ids();

    let parent = tree.resolve_idx(&parent_path)?;
    let mut next = tree.clone();
    next.insert(parent, index + 1, copy)?;
    Ok(next)
}

/// Insert an existing subtree into the container at `container`.
pub fn insert_node(
    tree: &BlockTree,
    container: &BlockPath,
    index: Option<usize>,
    node: Subtree,
    max_depth: usize,
) -> BlockResult<BlockTree> {
    let parent = tree.resolve_idx(container)?;
    validate_subtree(&node, &tree.kind_at(parent), container.depth(), max_depth)?;
    ensure_fresh_ids(tree, &node, None)?;
    let mut next = tree.clone();
    let position = index.unwrap_or_else(|| next.child_count(parent));
    next.insert(parent, position, node)?;
    Ok(next)
}

/// Instantiate `kind` from the registry and insert it.
pub fn insert_block(
    tree: &BlockTree,
    registry: &Registry,
    container: &BlockPath,
    index: Option<usize>,
    kind: &BlockKind,
    max_depth: usize,
) -> BlockResult<BlockTree> {
    let node = registry.instantiate(kind)?;
    insert_node(tree, container, index, node, max_depth)
}

/// Ids of `incoming` must not clash with the tree, except with the subtree
/// being replaced.
fn ensure_fresh_ids(tree: &BlockTree, incoming: &Subtree, replaced: Option<&Subtree>) -> BlockResult<()> {
    let released: HashSet<BlockId> = replaced.map(|s| s.ids().into_iter().collect()).unwrap_or_default();
    for id in incoming.ids() {
        if tree.contains(&id) && !released.contains(&id) {
            return Err(BlockError::DuplicateId { id });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Block, ButtonData, ColumnLayout};
    use crate::validator::MAX_NESTING_DEPTH;
    use serde_json::json;

    fn tree() -> BlockTree {
        let json = json!({
            "id": "root", "kind": "root", "data": {},
            "children": [
                {"id": "s1", "kind": "oneColumn", "data": {}, "children": [
                    {"id": "c1", "kind": "column", "data": {}, "children": [
                        {"id": "h1", "kind": "heading", "data": {}},
                        {"id": "b1", "kind": "button", "data": {"text": "Go", "href": "https://x.io"}}
                    ]}
                ]},
                {"id": "s2", "kind": "columns1212", "data": {}, "children": [
                    {"id": "c2", "kind": "column", "data": {}},
                    {"id": "c3", "kind": "column", "data": {}, "children": [
                        {"id": "d1", "kind": "divider", "data": {}}
                    ]}
                ]}
            ]
        });
        BlockTree::from_json(&json.to_string()).unwrap()
    }

    fn p(s: &str) -> BlockPath {
        s.parse().unwrap()
    }

    fn ids_at(tree: &BlockTree, path: &str) -> Vec<String> {
        tree.children_at(&p(path))
            .unwrap()
            .iter()
            .map(|b| b.id.to_string())
            .collect()
    }

    #[test]
    fn reorder_within_container() {
        let t = tree();
        let next = move_node(
            &t,
            &Registry::builtin(),
            &p("children[0].children[0].children[1]"),
            &p("children[0].children[0]"),
            Some(0),
            MAX_NESTING_DEPTH,
        )
        .unwrap();
        assert_eq!(ids_at(&next, "children[0].children[0]"), vec!["b1", "h1"]);
        // input untouched
        assert_eq!(ids_at(&t, "children[0].children[0]"), vec!["h1", "b1"]);
    }

    #[test]
    fn move_across_containers_appends() {
        let next = move_node(
            &tree(),
            &Registry::builtin(),
            &p("children[0].children[0].children[0]"),
            &p("children[1].children[1]"),
            None,
            MAX_NESTING_DEPTH,
        )
        .unwrap();
        assert_eq!(ids_at(&next, "children[1].children[1]"), vec!["d1", "h1"]);
        assert_eq!(
            next.path_of(&BlockId::new("b1")).unwrap(),
            p("children[0].children[0].children[0]")
        );
    }

    #[test]
    fn move_section_before_itself_reorders_root() {
        let next = move_node(
            &tree(),
            &Registry::builtin(),
            &p("children[1]"),
            &BlockPath::root(),
            Some(0),
            MAX_NESTING_DEPTH,
        )
        .unwrap();
        assert_eq!(ids_at(&next, ""), vec!["s2", "s1"]);
    }

    #[test]
    fn move_root_is_a_no_op() {
        let t = tree();
        let next = move_node(
            &t,
            &Registry::builtin(),
            &BlockPath::root(),
            &p("children[0]"),
            Some(0),
            MAX_NESTING_DEPTH,
        )
        .unwrap();
        assert_eq!(next, t);
    }

    #[test]
    fn move_rejects_wrong_drop_group() {
        let err = move_node(
            &tree(),
            &Registry::builtin(),
            &p("children[0].children[0].children[0]"),
            &BlockPath::root(),
            Some(0),
            MAX_NESTING_DEPTH,
        )
        .unwrap_err();
        assert!(matches!(err, BlockError::NotAllowedHere { .. }));
    }

    #[test]
    fn move_rejects_columns() {
        let err = move_node(
            &tree(),
            &Registry::builtin(),
            &p("children[1].children[0]"),
            &p("children[0]"),
            Some(0),
            MAX_NESTING_DEPTH,
        )
        .unwrap_err();
        assert!(matches!(err, BlockError::NotDraggable { kind: BlockKind::Column }));
    }

    #[test]
    fn move_into_own_descendant_fails() {
        let err = move_node(
            &tree(),
            &Registry::builtin(),
            &p("children[0]"),
            &p("children[0].children[0]"),
            None,
            MAX_NESTING_DEPTH,
        )
        .unwrap_err();
        assert_eq!(err, BlockError::MoveIntoSelf);
    }

    #[test]
    fn move_index_past_end_fails() {
        let err = move_node(
            &tree(),
            &Registry::builtin(),
            &p("children[0].children[0].children[0]"),
            &p("children[1].children[0]"),
            Some(3),
            MAX_NESTING_DEPTH,
        )
        .unwrap_err();
        assert!(matches!(err, BlockError::IndexOutOfBounds { index: 3, len: 0 }));
    }

    #[test]
    fn delete_removes_subtree() {
        let next = delete_node(&tree(), &Registry::builtin(), &p("children[1]")).unwrap();
        assert_eq!(ids_at(&next, ""), vec!["s1"]);
        assert!(!next.contains(&BlockId::new("d1")));
    }

    #[test]
    fn delete_guards_fixed_kinds() {
        let registry = Registry::builtin();
        let t = tree();
        assert_eq!(
            delete_node(&t, &registry, &BlockPath::root()).unwrap_err(),
            BlockError::NotDeletable { kind: BlockKind::Root }
        );
        assert_eq!(
            delete_node(&t, &registry, &p("children[0].children[0]")).unwrap_err(),
            BlockError::NotDeletable { kind: BlockKind::Column }
        );
    }

    #[test]
    fn clone_inserts_copy_after_original() {
        let t = tree();
        let next = clone_node(&t, &Registry::builtin(), &p("children[0].children[0].children[1]")).unwrap();
        let column = next.children_at(&p("children[0].children[0]")).unwrap();
        assert_eq!(column.len(), 3);
        assert_eq!(column[1].id.as_str(), "b1");
        assert_ne!(column[2].id.as_str(), "b1");
        assert_eq!(column[1].data, column[2].data);
    }

    #[test]
    fn clone_section_copies_columns_with_new_ids() {
        let next = clone_node(&tree(), &Registry::builtin(), &p("children[1]")).unwrap();
        assert_eq!(next.len(), tree().len() + 4);
        let copy = next.resolve(&p("children[2].children[1].children[0]")).unwrap();
        assert_eq!(copy.kind(), BlockKind::Divider);
        assert_ne!(copy.id.as_str(), "d1");
    }

    #[test]
    fn clone_follows_registry_flag() {
        let registry = Registry::from_config(vec![crate::registry::CustomBlockConfig {
            kind: "divider".into(),
            label: "Rule".into(),
            icon: None,
            template: "<mj-divider />".into(),
            default_data: json!({}),
            draggable: true,
            deletable: true,
            cloneable: false,
        }])
        .unwrap();
        let divider = p("children[1].children[1].children[0]");
        assert_eq!(
            clone_node(&tree(), &registry, &divider).unwrap_err(),
            BlockError::NotCloneable { kind: BlockKind::Divider }
        );
        assert!(clone_node(&tree(), &Registry::builtin(), &divider).is_ok());
    }

    #[test]
    fn clone_rejects_root_and_columns() {
        assert!(matches!(
            clone_node(&tree(), &Registry::builtin(), &BlockPath::root()),
            Err(BlockError::NotCloneable { .. })
        ));
        assert!(matches!(
            clone_node(&tree(), &Registry::builtin(), &p("children[0].children[0]")),
            Err(BlockError::NotCloneable { .. })
        ));
    }

    #[test]
    fn update_data_keeps_id_and_children() {
        let t = tree();
        let data = BlockData::Button(ButtonData {
            text: "Buy".into(),
            href: "https://shop.io".into(),
            ..ButtonData::default()
        });
        let path = p("children[0].children[0].children[1]");
        let next = update_tree(&t, &path, Update::Data(data.clone()), MAX_NESTING_DEPTH).unwrap();
        let block = next.resolve(&path).unwrap();
        assert_eq!(block.id.as_str(), "b1");
        assert_eq!(block.data, data);
    }

    #[test]
    fn update_node_rejects_colliding_ids() {
        let node = Subtree::leaf(Block::with_id(BlockId::new("h1"), BlockData::OpenTracking));
        let err = update_tree(
            &tree(),
            &p("children[1].children[1].children[0]"),
            Update::Node(node),
            MAX_NESTING_DEPTH,
        )
        .unwrap_err();
        assert!(matches!(err, BlockError::DuplicateId { .. }));
    }

    #[test]
    fn update_root_replaces_document() {
        let replacement = BlockTree::new(Default::default()).to_subtree();
        let next = update_tree(&tree(), &BlockPath::root(), Update::Node(replacement), MAX_NESTING_DEPTH).unwrap();
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn update_rejects_kind_change_that_breaks_layout() {
        let data = BlockData::Section {
            layout: ColumnLayout::Columns888,
            data: Default::default(),
        };
        let err = update_tree(&tree(), &p("children[1]"), Update::Data(data), MAX_NESTING_DEPTH).unwrap_err();
        assert!(matches!(err, BlockError::ColumnCountMismatch { .. }));
    }

    #[test]
    fn insert_block_instantiates_section_with_columns() {
        let next = insert_block(
            &tree(),
            &Registry::builtin(),
            &BlockPath::root(),
            Some(1),
            &BlockKind::Section(ColumnLayout::Columns6666),
            MAX_NESTING_DEPTH,
        )
        .unwrap();
        assert_eq!(next.children_at(&p("children[1]")).unwrap().len(), 4);
        assert_eq!(ids_at(&next, "")[2], "s2");
    }

    #[test]
    fn insert_enforces_drop_groups() {
        let err = insert_block(
            &tree(),
            &Registry::builtin(),
            &p("children[0]"),
            None,
            &BlockKind::Text,
            MAX_NESTING_DEPTH,
        )
        .unwrap_err();
        assert!(matches!(err, BlockError::NotAllowedHere { .. }));
    }

    #[test]
    fn unknown_path_is_reported() {
        let err = delete_node(&tree(), &Registry::builtin(), &p("children[7]")).unwrap_err();
        assert!(matches!(err, BlockError::PathNotFound { .. }));
    }
}

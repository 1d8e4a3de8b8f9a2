//! Linear undo/redo history of whole-tree snapshots.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::tree::BlockTree;

/// What happens to entries after the cursor when a new snapshot is committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedoPolicy {
    /// Drop them; the new snapshot becomes the last entry.
    #[default]
    Discard,
    /// Keep them and append the new snapshot at the very end. Entries between
    /// the old cursor and the end become unreachable through undo/redo order.
    Preserve,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct HistoryConfig {
    pub redo_policy: RedoPolicy,
    /// Oldest entries are dropped beyond this many. `None` keeps everything.
    pub max_entries: Option<usize>,
}

/// Snapshots are shared: undo and redo hand out the same `Arc` that was
/// committed, so stepping through history never copies a tree.
#[derive(Debug, Clone)]
pub struct EditHistory {
    entries: Vec<Arc<BlockTree>>,
    cursor: usize,
    config: HistoryConfig,
}

impl EditHistory {
    pub fn new(initial: BlockTree, config: HistoryConfig) -> Self {
        Self {
            entries: vec![Arc::new(initial)],
            cursor: 0,
            config,
        }
    }

    pub fn current(&self) -> &Arc<BlockTree> {
        &self.entries[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Append a snapshot and move the cursor onto it.
    pub fn commit(&mut self, tree: BlockTree) -> &Arc<BlockTree> {
        if self.config.redo_policy == RedoPolicy::Discard {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(Arc::new(tree));
        if let Some(max) = self.config.max_entries {
            let max = max.max(1);
            if self.entries.len() > max {
                let excess = self.entries.len() - max;
                self.entries.drain(..excess);
            }
        }
        self.cursor = self.entries.len() - 1;
        self.current()
    }

    /// Step back one entry. Stays put at the first entry.
    pub fn undo(&mut self) -> &Arc<BlockTree> {
        self.cursor = self.cursor.saturating_sub(1);
        self.current()
    }

    /// Step forward one entry. Stays put at the last entry.
    pub fn redo(&mut self) -> &Arc<BlockTree> {
        if self.can_redo() {
            self.cursor += 1;
        }
        self.current()
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blocks::{BlockId, BlockKind};
use crate::path::BlockPath;

pub type BlockResult<T> = Result<T, BlockError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    #[error("No block at path '{path}'")]
    PathNotFound { path: BlockPath },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Block '{kind}' cannot be deleted")]
    NotDeletable { kind: BlockKind },

    #[error("Block '{kind}' cannot be duplicated")]
    NotCloneable { kind: BlockKind },

    #[error("Block '{kind}' cannot be moved")]
    NotDraggable { kind: BlockKind },

    #[error("Block '{child}' cannot be placed inside '{parent}'")]
    NotAllowedHere { parent: BlockKind, child: BlockKind },

    #[error("Cannot move a block into itself or one of its descendants")]
    MoveIntoSelf,

    #[error("Insertion index {index} is out of bounds for a container with {len} children")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Layout '{kind}' requires exactly {expected} columns, found {found}")]
    ColumnCountMismatch {
        kind: BlockKind,
        expected: usize,
        found: usize,
    },

    #[error("Block '{kind}' cannot have children")]
    LeafHasChildren { kind: BlockKind },

    #[error("Document root must be a 'root' block, found '{found}'")]
    InvalidRoot { found: BlockKind },

    #[error("A 'root' block may only appear at the top of the document")]
    NestedRoot,

    #[error("Duplicate id '{id}': block ids must be unique within the document")]
    DuplicateId { id: BlockId },

    #[error("Maximum nesting depth ({max_depth}) exceeded")]
    MaxNestingDepthExceeded { max_depth: usize },

    #[error("Invalid color value '{value}' in '{property}'")]
    InvalidColor { property: String, value: String },

    #[error("Unknown block kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("Invalid data for block '{kind}': {reason}")]
    InvalidData { kind: String, reason: String },

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for BlockError {
    fn from(err: serde_json::Error) -> Self {
        BlockError::DeserializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for BlockError {
    fn from(err: serde_yaml::Error) -> Self {
        BlockError::ConfigError(err.to_string())
    }
}

/// A diagnostic produced while compiling a tree to markup.
///
/// Only `fatal` errors make the markup unusable for HTML generation; every other
/// entry has already been replaced by an inline comment in the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
    #[serde(default)]
    pub fatal: bool,
}

impl CompileError {
    pub fn block(block_id: &BlockId, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            tag_name: None,
            block_id: Some(block_id.clone()),
            fatal: false,
        }
    }

    /// A non-fatal diagnostic not tied to any block.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            tag_name: None,
            block_id: None,
            fatal: false,
        }
    }

    pub fn envelope(message: impl Into<String>, line: Option<usize>, tag_name: Option<&str>) -> Self {
        Self {
            message: message.into(),
            line,
            tag_name: tag_name.map(str::to_string),
            block_id: None,
            fatal: true,
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, &self.tag_name) {
            (Some(line), Some(tag)) => write!(f, "line {line} <{tag}>: {}", self.message),
            (Some(line), None) => write!(f, "line {line}: {}", self.message),
            (None, Some(tag)) => write!(f, "<{tag}>: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

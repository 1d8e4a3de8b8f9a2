//! # Mailcraft block engine
//!
//! The document model and compiler behind the visual email editor.
//!
//! ## Features
//! - Block tree with positional path addressing and stable ids
//! - Copy-on-write mutations (update, move, delete, clone, insert) with
//!   placement rules enforced on every edit
//! - Snapshot undo/redo history
//! - Block definition registry with config-driven custom blocks
//! - MJML compiler with link tracking and Liquid sample-data rendering
//!
//! ## Example
//! ```ignore
//! use mailcraft_blocks::{BlockPath, BlockTree, EditorConfig, Editor};
//!
//! let tree = BlockTree::from_json(&std::fs::read_to_string("email.json")?)?;
//! let mut editor = Editor::new(tree, &EditorConfig::default())?;
//! editor.clone_node(&"children[0].children[0].children[0]".parse()?)?;
//! let output = editor.compile(None);
//! println!("{}", output.mjml);
//! ```

pub mod blocks;
pub mod compiler;
pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod history;
pub mod liquid;
pub mod mutation;
pub mod path;
pub mod registry;
pub mod rich_text;
pub mod style;
pub mod tracking;
pub mod tree;
pub mod validator;

// --- Core types ---
pub use blocks::{Block, BlockData, BlockId, BlockKind, ColumnLayout};
pub use document::{BlockDocument, SavedBlock, Subtree};
pub use error::{BlockError, BlockResult, CompileError};
pub use path::BlockPath;
pub use tree::{BlockTree, NodeRef};

// --- Editing ---
pub use config::EditorConfig;
pub use editor::Editor;
pub use history::{EditHistory, HistoryConfig, RedoPolicy};
pub use mutation::{Mutation, Update};
pub use registry::{BlockDefinition, CustomBlockConfig, DropGroup, Emit, Registry};

// --- Compilation ---
pub use compiler::{compile, CompileOptions, CompileOutput, Compiler};
pub use tracking::LinkParams;

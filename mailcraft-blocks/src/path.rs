//! Path addressing for blocks.
//!
//! A path is the chain of child indices from the root to a block, written as
//! `children[0].children[2]`. The root's path is the empty string. Paths are
//! derived from the current tree shape and are never stored on a block.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::BlockError;

fn segment_re() -> &'static Regex {
    static SEGMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    SEGMENT_REGEX.get_or_init(|| Regex::new(r"^children\[(\d+)\]$").unwrap())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPath(Vec<usize>);

impl BlockPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_indices(indices: impl Into<Vec<usize>>) -> Self {
        Self(indices.into())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Path of the child at `index` below this one.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Splits into (parent path, index in parent). `None` for the root.
    pub fn split_last(&self) -> Option<(BlockPath, usize)> {
        let (&last, rest) = self.0.split_last()?;
        Some((Self(rest.to_vec()), last))
    }

    pub fn parent(&self) -> Option<BlockPath> {
        self.split_last().map(|(parent, _)| parent)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// True when `self` equals `other` or lies below it.
    pub fn starts_with(&self, other: &BlockPath) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl fmt::Display for BlockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "children[{index}]")?;
        }
        Ok(())
    }
}

impl FromStr for BlockPath {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut indices = Vec::new();
        for segment in trimmed.split('.') {
            let caps = segment_re()
                .captures(segment)
                .ok_or_else(|| BlockError::InvalidPath {
                    path: s.to_string(),
                    reason: format!("unexpected segment '{segment}', expected 'children[N]'"),
                })?;
            let index = caps[1].parse::<usize>().map_err(|_| BlockError::InvalidPath {
                path: s.to_string(),
                reason: format!("index in '{segment}' is out of range"),
            })?;
            indices.push(index);
        }
        Ok(Self(indices))
    }
}

impl Serialize for BlockPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

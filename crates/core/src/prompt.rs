//! The structured prompt sent to the completion API.

use crate::message::Role;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a document held by the remote file store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHandle(String);

impl FileHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One piece of a block's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    FileRef(FileHandle),
}

/// A role-tagged unit of prompt input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Block {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn file_refs(&self) -> impl Iterator<Item = &FileHandle> {
        self.parts.iter().filter_map(|p| match p {
            Part::FileRef(handle) => Some(handle),
            Part::Text(_) => None,
        })
    }
}

/// Ordered prompt blocks, system block first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptInput {
    pub blocks: Vec<Block>,
}

impl PromptInput {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every file reference in the prompt, in block order.
    pub fn file_refs(&self) -> Vec<&FileHandle> {
        self.blocks.iter().flat_map(Block::file_refs).collect()
    }
}

//! Backing sources for trees.
//!
//! The crawler and hydration manager only see the [`TreeSource`] capability:
//! list a directory, read a file. [`FsSource`] serves a directory on disk,
//! [`MemorySource`] an in-memory hierarchy.

mod fs;
mod memory;

pub use fs::{FsSource, SourceFilter};
pub use memory::MemorySource;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SourceError;
use crate::id::VirtualPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// One directory entry as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

impl SourceEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size: Some(size),
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Folder,
            size: None,
        }
    }
}

/// Directory listing and file reads for one tree.
///
/// Paths are relative to the tree root. `list_dir` returns entries in the
/// order the crawler must preserve.
#[async_trait]
pub trait TreeSource: Send + Sync {
    async fn list_dir(&self, path: &VirtualPath) -> Result<Vec<SourceEntry>, SourceError>;

    async fn read_file(&self, path: &VirtualPath) -> Result<Vec<u8>, SourceError>;

    /// Human-readable location, used in logs.
    fn describe(&self) -> String;
}

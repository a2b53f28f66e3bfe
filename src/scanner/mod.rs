//! Scanner module for search-root traversal and file classification.
//!
//! This module provides functionality for:
//! - Normalizing raw search paths into non-overlapping absolute roots
//! - Walking those roots without following symbolic links
//! - Classifying every entry (regular, ignored, symlink, fifo, socket, ...)
//! - Building size buckets and the directory tree skeleton
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`path_utils`]: Search-path normalization and common-root discovery
//! - [`catalog`]: Directory traversal and file cataloging
//! - [`tree`]: Owned directory tree mirroring the searched hierarchy
//!
//! # Example
//!
//! ```no_run
//! use finddup::scanner::{CatalogConfig, FileCatalog};
//! use std::path::PathBuf;
//!
//! let catalog = FileCatalog::new(CatalogConfig::default())
//!     .scan(&[PathBuf::from("/home/user/Photos")])
//!     .unwrap();
//!
//! for (size, members) in &catalog.buckets {
//!     println!("{} bytes: {} candidates", size, members.len());
//! }
//! ```

pub mod catalog;
pub mod path_utils;
pub mod tree;

use std::fmt;
use std::fs::Metadata;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::Serialize;

use crate::duplicates::ContentId;

// Re-export main types
pub use catalog::{Catalog, CatalogConfig, FileCatalog};
pub use path_utils::{normalize_search_paths, SearchRoots};
pub use tree::{DirNode, FileLeaf, LeafState, TreeNode};

/// Basenames that never take part in content comparison.
///
/// Both `" Icon\r"` and `"Icon\r"` are listed on purpose; they are
/// distinct names and both occur in the wild.
pub const DEFAULT_IGNORE_NAMES: [&str; 5] =
    [".picasa.ini", ".DS_Store", "Thumbs.db", " Icon\r", "Icon\r"];

/// Size of one allocation block as reported by `st_blocks`.
pub const BLOCK_SIZE: u64 = 512;

/// A regular, readable file discovered during cataloging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Allocated size in 512-byte blocks
    pub blocks: u64,
    /// Modification time captured when the file was cataloged
    pub modified: SystemTime,
    /// Content identity, set once the resolver has classified the file
    pub content_id: Option<ContentId>,
}

impl FileRecord {
    /// Create a new, unresolved record.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, blocks: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            blocks,
            modified,
            content_id: None,
        }
    }

    /// Build a record from a no-follow stat result.
    #[must_use]
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self::new(path, metadata.len(), block_count(metadata), modified)
    }
}

/// Why an entry was left out of equivalence computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnprocessedReason {
    /// Basename is in the ignore set
    Ignored,
    /// Symbolic link (never followed)
    Symlink,
    /// Named pipe
    Fifo,
    /// Unix domain socket
    Socket,
    /// Block or character device
    Device,
    /// Could not be stat'ed, listed, opened, or read
    Unreadable,
    /// Modified while the run was in progress
    Changed,
}

impl UnprocessedReason {
    /// Whether this reason makes the containing directories unknown.
    ///
    /// Ignored and special entries are simply left out of the tree; only
    /// entries whose content could not be established poison ancestors.
    #[must_use]
    pub fn poisons_ancestors(self) -> bool {
        matches!(self, Self::Unreadable | Self::Changed)
    }
}

impl fmt::Display for UnprocessedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ignored => "ignored",
            Self::Symlink => "symlink",
            Self::Fifo => "fifo",
            Self::Socket => "socket",
            Self::Device => "device",
            Self::Unreadable => "unreadable",
            Self::Changed => "changed",
        };
        f.write_str(name)
    }
}

/// An entry excluded from the tree and from equivalence computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnprocessedRecord {
    /// Path of the entry
    pub path: PathBuf,
    /// Classification tag
    pub reason: UnprocessedReason,
    /// Optional error text (for unreadable entries)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl UnprocessedRecord {
    /// Create a record without detail text.
    #[must_use]
    pub fn new(path: PathBuf, reason: UnprocessedReason) -> Self {
        Self {
            path,
            reason,
            detail: None,
        }
    }

    /// Create an `unreadable` record carrying the error message.
    #[must_use]
    pub fn unreadable(path: PathBuf, error: &std::io::Error) -> Self {
        Self {
            path,
            reason: UnprocessedReason::Unreadable,
            detail: Some(error.to_string()),
        }
    }
}

/// Allocated blocks for a stat result.
#[cfg(unix)]
#[must_use]
pub fn block_count(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.blocks()
}

/// Allocated blocks for a stat result.
#[cfg(not(unix))]
#[must_use]
pub fn block_count(metadata: &Metadata) -> u64 {
    metadata.len().div_ceil(BLOCK_SIZE)
}

/// Errors that can occur while cataloging search roots.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The scan was interrupted by a shutdown request.
    #[error("Scan interrupted")]
    Interrupted,

    /// An I/O error occurred while accessing a search root.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

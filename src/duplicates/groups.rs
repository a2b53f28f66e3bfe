//! Content identities, signatures and duplicate groups.
//!
//! # Overview
//!
//! Byte-identical content is named by a [`ContentId`]. Ids are handed out
//! by a [`ContentIdAllocator`] owned by the pipeline, never by global
//! state, so two runs over the same tree allocate the same ids.
//!
//! Files and directories are compared through their [`Signature`]: a
//! file's signature is its content id, a directory's is the sorted list of
//! its children's signatures. The sentinel signature `"-1"` marks anything
//! whose content could not be established.
//!
//! # Example
//!
//! ```
//! use finddup::duplicates::{ContentIdAllocator, Signature};
//!
//! let mut ids = ContentIdAllocator::new();
//! let a = ids.allocate();
//! let b = ids.allocate();
//! assert_ne!(a, b);
//!
//! let dir = Signature::directory(vec![Signature::from(b), Signature::from(a)]);
//! assert_eq!(dir.as_str(), "[0,1]");
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::scanner::BLOCK_SIZE;

/// Name of one equivalence class of byte-identical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic allocator for [`ContentId`]s.
#[derive(Debug, Default)]
pub struct ContentIdAllocator {
    next: u64,
}

impl ContentIdAllocator {
    /// Create an allocator starting at id 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next unused id.
    pub fn allocate(&mut self) -> ContentId {
        let id = ContentId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.next
    }
}

/// Canonical identity string of a file or directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(String);

impl Signature {
    const SENTINEL: &'static str = "-1";

    /// The "unknown" marker.
    #[must_use]
    pub fn sentinel() -> Self {
        Self(Self::SENTINEL.to_string())
    }

    /// Whether this is the "unknown" marker.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.0 == Self::SENTINEL
    }

    /// Signature of a directory from its children's signatures.
    ///
    /// The sentinel wins over everything. Otherwise children are sorted
    /// lexicographically so the result ignores names and listing order.
    #[must_use]
    pub fn directory(mut children: Vec<Signature>) -> Self {
        if children.iter().any(Signature::is_sentinel) {
            return Self::sentinel();
        }
        children.sort_unstable();
        let joined = children
            .iter()
            .map(Signature::as_str)
            .collect::<Vec<_>>()
            .join(",");
        Self(format!("[{joined}]"))
    }

    /// The signature text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ContentId> for Signature {
    fn from(id: ContentId) -> Self {
        Self(id.0.to_string())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a group holds files or directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Byte-identical regular files
    File,
    /// Directories with equal signatures
    Directory,
}

/// A set of paths with identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Allocated blocks of one member
    pub blocks: u64,
    /// Member paths, sorted
    pub members: Vec<PathBuf>,
    /// File or directory group
    pub kind: GroupKind,
}

impl DuplicateGroup {
    /// Create a group; members are sorted.
    #[must_use]
    pub fn new(blocks: u64, mut members: Vec<PathBuf>, kind: GroupKind) -> Self {
        members.sort();
        Self {
            blocks,
            members,
            kind,
        }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Allocated size of one member in bytes.
    #[must_use]
    pub fn allocated_bytes(&self) -> u64 {
        self.blocks * BLOCK_SIZE
    }

    /// Space held by all copies but one.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.allocated_bytes() * (self.members.len().saturating_sub(1) as u64)
    }
}

/// File-level result of resolving every bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileClassification {
    /// Files with no byte-identical peer
    pub unique: BTreeSet<PathBuf>,
    /// Sets of byte-identical files
    pub duplicates: Vec<DuplicateGroup>,
}

impl FileClassification {
    /// Drop `path` from whichever class holds it.
    ///
    /// A duplicate group left with a single member dissolves and that
    /// member becomes unique. Returns `false` if `path` was not classified.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        if self.unique.remove(path) {
            return true;
        }

        let Some(index) = self
            .duplicates
            .iter()
            .position(|g| g.members.iter().any(|m| m == path))
        else {
            return false;
        };

        let group = &mut self.duplicates[index];
        group.members.retain(|m| m != path);
        if group.members.len() < 2 {
            let group = self.duplicates.remove(index);
            self.unique.extend(group.members);
        }
        true
    }

    /// Number of classified files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.unique.len() + self.duplicates.iter().map(DuplicateGroup::len).sum::<usize>()
    }
}

/// Sort groups for presentation: largest first, then by first member.
pub fn sort_groups(groups: &mut [DuplicateGroup]) {
    groups.sort_by(|a, b| {
        b.blocks
            .cmp(&a.blocks)
            .then_with(|| a.members.cmp(&b.members))
    });
}

//! Owned directory tree mirroring the searched hierarchy.
//!
//! Each search root that is a directory gets one [`DirNode`]. Directories
//! own their children, keyed by entry name, so the tree needs no back
//! references: symbolic links are never followed and the hierarchy is
//! acyclic.
//!
//! Only regular files (and entries whose content could not be
//! established) appear as leaves. Ignored names and special files are
//! kept out of the tree; their block counts are folded into
//! [`DirNode::untracked_blocks`] of the parent so size tallies stay
//! complete. Readable directories that end up holding no leaf at all are
//! removed by [`DirNode::prune_untracked_dirs`] before signing, the same
//! way.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::duplicates::{ContentId, Signature};

/// Resolution state of a file leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafState {
    /// Cataloged, not yet resolved
    Pending,
    /// Content identity established
    Resolved(ContentId),
    /// Content could not be established (unreadable or changed)
    Unresolved,
}

/// A file inside a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLeaf {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Allocated size in blocks (0 when unknown)
    pub blocks: u64,
    /// Resolution state
    pub state: LeafState,
}

impl FileLeaf {
    /// Signature of this leaf: the content id, or the sentinel.
    #[must_use]
    pub fn signature(&self) -> Signature {
        match self.state {
            LeafState::Resolved(id) => Signature::from(id),
            LeafState::Pending | LeafState::Unresolved => Signature::sentinel(),
        }
    }
}

/// A child entry of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    /// A regular file
    File(FileLeaf),
    /// A subdirectory
    Dir(DirNode),
}

/// A directory in the tree skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirNode {
    /// Absolute path to the directory
    pub path: PathBuf,
    /// Children keyed by entry name
    pub children: BTreeMap<OsString, TreeNode>,
    /// Blocks of children kept out of the tree (ignored names, symlinks)
    pub untracked_blocks: u64,
    /// False when the directory listing itself failed
    pub readable: bool,
    /// Canonical signature, set once by the fingerprinter
    pub signature: Option<Signature>,
    /// Aggregate block total, set together with the signature
    pub total_blocks: u64,
}

impl DirNode {
    /// Create an empty directory node.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            children: BTreeMap::new(),
            untracked_blocks: 0,
            readable: true,
            signature: None,
            total_blocks: 0,
        }
    }

    /// Whether `path` lies inside (or is) this directory.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }

    /// Get the directory node at `path`, creating missing directories on the way.
    ///
    /// Returns `None` if `path` is outside this tree or a file sits where a
    /// directory is expected.
    pub fn ensure_dir(&mut self, path: &Path) -> Option<&mut DirNode> {
        let relative = path.strip_prefix(&self.path).ok()?.to_path_buf();
        let mut current = self;
        for component in relative.components() {
            let Component::Normal(name) = component else {
                return None;
            };
            let child_path = current.path.join(name);
            let node = current
                .children
                .entry(name.to_os_string())
                .or_insert_with(|| TreeNode::Dir(DirNode::new(child_path)));
            current = match node {
                TreeNode::Dir(dir) => dir,
                TreeNode::File(_) => return None,
            };
        }
        Some(current)
    }

    /// Insert a file leaf under its parent directory.
    ///
    /// Returns `false` if the leaf does not belong to this tree.
    pub fn insert_file(&mut self, leaf: FileLeaf) -> bool {
        let Some(name) = leaf.path.file_name().map(|n| n.to_os_string()) else {
            return false;
        };
        let Some(parent) = leaf.path.parent().map(Path::to_path_buf) else {
            return false;
        };
        match self.ensure_dir(&parent) {
            Some(dir) => {
                dir.children.insert(name, TreeNode::File(leaf));
                true
            }
            None => false,
        }
    }

    /// Add blocks of an untracked entry to its parent's tally.
    pub fn add_untracked_blocks(&mut self, entry: &Path, blocks: u64) {
        if let Some(parent) = entry.parent() {
            if let Some(dir) = self.ensure_dir(parent) {
                dir.untracked_blocks += blocks;
            }
        }
    }

    /// Mark a directory as unreadable. Returns `true` if it was readable before.
    pub fn mark_unreadable(&mut self, path: &Path) -> bool {
        match self.ensure_dir(path) {
            Some(dir) => std::mem::replace(&mut dir.readable, false),
            None => false,
        }
    }

    /// Find the file leaf at `path`.
    pub fn leaf_mut(&mut self, path: &Path) -> Option<&mut FileLeaf> {
        let name = path.file_name()?;
        let parent = self.find_dir_mut(path.parent()?)?;
        match parent.children.get_mut(name) {
            Some(TreeNode::File(leaf)) => Some(leaf),
            _ => None,
        }
    }

    /// Find an existing directory without creating anything.
    fn find_dir_mut(&mut self, path: &Path) -> Option<&mut DirNode> {
        let relative = path.strip_prefix(&self.path).ok()?.to_path_buf();
        let mut current = self;
        for component in relative.components() {
            current = match current.children.get_mut(component.as_os_str()) {
                Some(TreeNode::Dir(dir)) => dir,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set the resolution state of the leaf at `path`. Returns `false` if absent.
    pub fn set_leaf_state(&mut self, path: &Path, state: LeafState) -> bool {
        match self.leaf_mut(path) {
            Some(leaf) => {
                leaf.state = state;
                true
            }
            None => false,
        }
    }

    /// Drop readable subdirectories that hold no file leaf, folding their
    /// untracked blocks into the parent's tally. Unreadable directories
    /// are kept, so they still poison their ancestors.
    ///
    /// Returns `true` if this directory is itself readable and left empty.
    pub fn prune_untracked_dirs(&mut self) -> bool {
        let mut folded = 0;
        self.children.retain(|_, child| match child {
            TreeNode::File(_) => true,
            TreeNode::Dir(dir) => {
                if dir.prune_untracked_dirs() {
                    folded += dir.untracked_blocks;
                    false
                } else {
                    true
                }
            }
        });
        self.untracked_blocks += folded;
        self.readable && self.children.is_empty()
    }

    /// Number of directories in this tree, including this one.
    #[must_use]
    pub fn dir_count(&self) -> usize {
        1 + self
            .children
            .values()
            .map(|child| match child {
                TreeNode::Dir(dir) => dir.dir_count(),
                TreeNode::File(_) => 0,
            })
            .sum::<usize>()
    }
}

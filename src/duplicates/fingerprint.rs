//! Bottom-up directory fingerprinting.
//!
//! Every directory under a search root that holds at least one file is
//! signed in post-order from its children's signatures (see
//! [`Signature::directory`]). Directories with nothing but ignored or
//! special entries are left out and count only toward their parent's
//! block total. Search roots are always signed. Directories are
//! then grouped by signature:
//!
//! - the sentinel group is the set of unknown directories
//! - any other signature shared by two or more directories is a duplicate
//!   group
//! - the rest are unique
//!
//! Block totals include children whose signature is the sentinel and the
//! untracked blocks of ignored entries and symlinks.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;

use super::{DuplicateGroup, GroupKind, Signature};
use crate::scanner::{DirNode, TreeNode};

/// Directory-level classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryReport {
    /// Sets of directories with equal signatures
    pub duplicates: Vec<DuplicateGroup>,
    /// Directories whose signature no other directory shares
    pub unique: BTreeSet<PathBuf>,
    /// Directories containing something unresolved
    pub unknown: BTreeSet<PathBuf>,
}

/// Signs directory trees and groups them by signature.
#[derive(Debug, Default)]
pub struct DirectoryFingerprinter {
    by_signature: BTreeMap<Signature, Vec<(PathBuf, u64)>>,
}

impl DirectoryFingerprinter {
    /// Create an empty fingerprinter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign every directory of `tree`, storing signature and block total
    /// on each node, and register them for grouping.
    pub fn sign_tree(&mut self, tree: &mut DirNode) -> Signature {
        tree.prune_untracked_dirs();
        self.sign(tree).0
    }

    fn sign(&mut self, dir: &mut DirNode) -> (Signature, u64) {
        let mut signatures = Vec::with_capacity(dir.children.len());
        let mut blocks = dir.untracked_blocks;

        for child in dir.children.values_mut() {
            let (signature, child_blocks) = match child {
                TreeNode::File(leaf) => (leaf.signature(), leaf.blocks),
                TreeNode::Dir(sub) => self.sign(sub),
            };
            signatures.push(signature);
            blocks += child_blocks;
        }

        let signature = if dir.readable {
            Signature::directory(signatures)
        } else {
            Signature::sentinel()
        };

        log::trace!("Signed {} as {}", dir.path.display(), signature);
        dir.signature = Some(signature.clone());
        dir.total_blocks = blocks;
        self.by_signature
            .entry(signature.clone())
            .or_default()
            .push((dir.path.clone(), blocks));

        (signature, blocks)
    }

    /// Group all signed directories.
    #[must_use]
    pub fn finish(mut self) -> DirectoryReport {
        let mut report = DirectoryReport::default();

        if let Some(unknown) = self.by_signature.remove(&Signature::sentinel()) {
            report.unknown = unknown.into_iter().map(|(path, _)| path).collect();
        }

        for (_, mut dirs) in self.by_signature {
            if dirs.len() == 1 {
                if let Some((path, _)) = dirs.pop() {
                    report.unique.insert(path);
                }
                continue;
            }
            let blocks = dirs[0].1;
            let members = dirs.into_iter().map(|(path, _)| path).collect();
            report
                .duplicates
                .push(DuplicateGroup::new(blocks, members, GroupKind::Directory));
        }

        log::debug!(
            "Directories: {} duplicate groups, {} unique, {} unknown",
            report.duplicates.len(),
            report.unique.len(),
            report.unknown.len()
        );

        report
    }

    /// Sign all trees and group them.
    #[must_use]
    pub fn fingerprint(trees: &mut [DirNode]) -> DirectoryReport {
        let mut fingerprinter = Self::new();
        for tree in trees.iter_mut() {
            fingerprinter.sign_tree(tree);
        }
        fingerprinter.finish()
    }
}

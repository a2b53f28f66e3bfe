//! File catalog: walks search roots and classifies every entry.
//!
//! # Overview
//!
//! This module provides the [`FileCatalog`] struct for traversing search
//! roots and collecting what the rest of the pipeline needs:
//!
//! - size buckets of regular files (the coarse pre-filter)
//! - one [`FileRecord`] per regular file (size, blocks, mtime)
//! - a [`DirNode`] tree skeleton per directory root
//! - the list of entries left out of comparison, with a reason
//!
//! Symbolic links are never followed. Every entry is stat'ed with
//! no-follow semantics and classified in this order: stat failure,
//! ignored basename, symlink, fifo, socket, device, regular file.
//!
//! # Example
//!
//! ```no_run
//! use finddup::scanner::{CatalogConfig, FileCatalog};
//! use std::path::PathBuf;
//!
//! let catalog = FileCatalog::new(CatalogConfig::default())
//!     .scan(&[PathBuf::from(".")])
//!     .unwrap();
//! println!("{} regular files cataloged", catalog.records.len());
//! ```

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use super::{
    block_count, DirNode, FileLeaf, FileRecord, LeafState, ScanError, UnprocessedReason,
    UnprocessedRecord, DEFAULT_IGNORE_NAMES,
};
use crate::progress::ProgressCallback;

/// Configuration for cataloging.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Exact basenames excluded from comparison.
    pub ignore_names: HashSet<OsString>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::with_ignore_names(DEFAULT_IGNORE_NAMES)
    }
}

impl CatalogConfig {
    /// Create a configuration with a custom ignore set.
    #[must_use]
    pub fn with_ignore_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            ignore_names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a basename is in the ignore set.
    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.ignore_names.contains(name))
    }
}

/// Result of cataloging all search roots.
#[derive(Debug, Default)]
pub struct Catalog {
    /// Every regular file, keyed by path
    pub records: BTreeMap<PathBuf, FileRecord>,
    /// Byte size to member paths (in walk order)
    pub buckets: BTreeMap<u64, Vec<PathBuf>>,
    /// One tree per directory search root
    pub trees: Vec<DirNode>,
    /// Entries excluded from comparison
    pub unprocessed: Vec<UnprocessedRecord>,
}

impl Catalog {
    /// Number of size buckets with more than one member.
    #[must_use]
    pub fn ambiguous_buckets(&self) -> usize {
        self.buckets.values().filter(|m| m.len() > 1).count()
    }

    /// The tree containing `path`, if any.
    pub fn tree_for_mut(&mut self, path: &Path) -> Option<&mut DirNode> {
        self.trees.iter_mut().find(|tree| tree.contains(path))
    }

    /// Record a file that dropped out after cataloging.
    ///
    /// When the reason leaves its content unknown, the file's tree leaf is
    /// reset to unresolved and its content id is cleared.
    pub fn record_unprocessed(&mut self, record: UnprocessedRecord) {
        if record.reason.poisons_ancestors() {
            if let Some(entry) = self.records.get_mut(&record.path) {
                entry.content_id = None;
            }
            if let Some(tree) = self.tree_for_mut(&record.path) {
                tree.set_leaf_state(&record.path, LeafState::Unresolved);
            }
        }
        self.unprocessed.push(record);
    }
}

/// How a single non-directory entry was classified.
#[derive(Debug)]
enum EntryClass {
    Regular(FileRecord),
    Untracked {
        reason: UnprocessedReason,
        blocks: Option<u64>,
    },
    Unreadable(io::Error),
}

/// Catalog builder for one run.
pub struct FileCatalog {
    config: CatalogConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FileCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCatalog")
            .field("config", &self.config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl FileCatalog {
    /// Create a new catalog builder.
    #[must_use]
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            config,
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Catalog every search root.
    ///
    /// Roots are expected to be absolute and mutually non-overlapping (see
    /// [`crate::scanner::normalize_search_paths`]). A root that is a
    /// directory gets a tree; any other root is cataloged as a loose entry.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`] if a root does not exist,
    /// [`ScanError::Io`] if a root cannot be stat'ed, and
    /// [`ScanError::Interrupted`] on shutdown. Failures below a root are
    /// recorded as unreadable entries instead.
    pub fn scan(&self, roots: &[PathBuf]) -> Result<Catalog, ScanError> {
        let mut catalog = Catalog::default();
        let mut seen = 0usize;

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start("cataloging", 0);
        }

        for root in roots {
            if self.is_shutdown_requested() {
                return Err(ScanError::Interrupted);
            }

            let metadata = fs::symlink_metadata(root).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ScanError::NotFound(root.clone()),
                _ => ScanError::Io {
                    path: root.clone(),
                    source: e,
                },
            })?;

            log::info!("Cataloging {}", root.display());
            if metadata.is_dir() {
                let tree = self.walk_root(root, &mut catalog, &mut seen)?;
                catalog.trees.push(tree);
            } else {
                self.record_entry(root, None, &mut catalog);
                seen += 1;
            }
        }

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end("cataloging");
        }

        log::info!(
            "Cataloged {} regular files in {} size buckets ({} ambiguous), {} unprocessed entries",
            catalog.records.len(),
            catalog.buckets.len(),
            catalog.ambiguous_buckets(),
            catalog.unprocessed.len()
        );

        Ok(catalog)
    }

    /// Walk one directory root, filling `catalog` and returning its tree.
    fn walk_root(
        &self,
        root: &Path,
        catalog: &mut Catalog,
        seen: &mut usize,
    ) -> Result<DirNode, ScanError> {
        let mut tree = DirNode::new(root.to_path_buf());

        let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();

        for result in walker {
            if self.is_shutdown_requested() {
                log::debug!("Catalog: Shutdown requested, stopping walk");
                return Err(ScanError::Interrupted);
            }

            match result {
                Ok(entry) => {
                    if entry.depth() == 0 {
                        continue;
                    }
                    let path = entry.path();
                    if entry.file_type().is_dir() {
                        tree.ensure_dir(path);
                        continue;
                    }

                    self.record_entry(path, Some(&mut tree), catalog);
                    *seen += 1;
                    if let Some(ref callback) = self.progress_callback {
                        callback.on_progress(*seen, path.to_string_lossy().as_ref());
                    }
                }
                Err(e) => {
                    let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("directory walk failed"));
                    self.record_walk_error(path, source, &mut tree, catalog);
                }
            }
        }

        Ok(tree)
    }

    /// Record a traversal failure as an unreadable directory or file.
    fn record_walk_error(
        &self,
        path: PathBuf,
        error: io::Error,
        tree: &mut DirNode,
        catalog: &mut Catalog,
    ) {
        log::warn!("Cannot read {}: {}", path.display(), error);
        let is_dir = fs::symlink_metadata(&path).is_ok_and(|m| m.is_dir());
        if is_dir {
            if !tree.mark_unreadable(&path) {
                return;
            }
        } else {
            tree.insert_file(FileLeaf {
                path: path.clone(),
                blocks: 0,
                state: LeafState::Unresolved,
            });
        }
        catalog
            .unprocessed
            .push(UnprocessedRecord::unreadable(path, &error));
    }

    /// Classify one non-directory entry and record it.
    fn record_entry(&self, path: &Path, tree: Option<&mut DirNode>, catalog: &mut Catalog) {
        match self.classify(path) {
            EntryClass::Regular(record) => {
                log::trace!("Cataloged {} ({} bytes)", path.display(), record.size);
                if let Some(tree) = tree {
                    tree.insert_file(FileLeaf {
                        path: path.to_path_buf(),
                        blocks: record.blocks,
                        state: LeafState::Pending,
                    });
                }
                catalog
                    .buckets
                    .entry(record.size)
                    .or_default()
                    .push(path.to_path_buf());
                catalog.records.insert(path.to_path_buf(), record);
            }
            EntryClass::Untracked { reason, blocks } => {
                log::debug!("Skipping {} ({})", path.display(), reason);
                if let (Some(tree), Some(blocks)) = (tree, blocks) {
                    tree.add_untracked_blocks(path, blocks);
                }
                catalog
                    .unprocessed
                    .push(UnprocessedRecord::new(path.to_path_buf(), reason));
            }
            EntryClass::Unreadable(error) => {
                log::warn!("Cannot stat {}: {}", path.display(), error);
                if let Some(tree) = tree {
                    tree.insert_file(FileLeaf {
                        path: path.to_path_buf(),
                        blocks: 0,
                        state: LeafState::Unresolved,
                    });
                }
                catalog
                    .unprocessed
                    .push(UnprocessedRecord::unreadable(path.to_path_buf(), &error));
            }
        }
    }

    fn classify(&self, path: &Path) -> EntryClass {
        let metadata = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) => return EntryClass::Unreadable(e),
        };

        let blocks = block_count(&metadata);
        if self.config.is_ignored(path) {
            return EntryClass::Untracked {
                reason: UnprocessedReason::Ignored,
                blocks: Some(blocks),
            };
        }
        if metadata.file_type().is_symlink() {
            return EntryClass::Untracked {
                reason: UnprocessedReason::Symlink,
                blocks: Some(blocks),
            };
        }
        if let Some(reason) = special_file_reason(&metadata) {
            return EntryClass::Untracked {
                reason,
                blocks: None,
            };
        }

        EntryClass::Regular(FileRecord::from_metadata(path.to_path_buf(), &metadata))
    }
}

/// Reason tag for fifos, sockets and devices.
#[cfg(unix)]
fn special_file_reason(metadata: &Metadata) -> Option<UnprocessedReason> {
    use std::os::unix::fs::FileTypeExt;

    let file_type = metadata.file_type();
    if file_type.is_fifo() {
        Some(UnprocessedReason::Fifo)
    } else if file_type.is_socket() {
        Some(UnprocessedReason::Socket)
    } else if file_type.is_block_device() || file_type.is_char_device() {
        Some(UnprocessedReason::Device)
    } else {
        None
    }
}

/// Reason tag for special files; anything that is not a regular file.
#[cfg(not(unix))]
fn special_file_reason(metadata: &Metadata) -> Option<UnprocessedReason> {
    if metadata.is_file() {
        None
    } else {
        Some(UnprocessedReason::Device)
    }
}

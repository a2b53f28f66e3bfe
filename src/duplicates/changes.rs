//! Post-resolution change detection.
//!
//! Resolution can take a long time on large trees. Before directories are
//! fingerprinted, every resolved file is stat'ed again; a file whose
//! modification time or length no longer matches the catalog is pulled
//! out of its classification and its tree leaf is reset, so its ancestors
//! end up unknown.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use super::FileClassification;
use crate::progress::ProgressCallback;
use crate::scanner::{Catalog, FileRecord, ScanError, UnprocessedReason, UnprocessedRecord};

/// Compare a record against a fresh no-follow stat.
///
/// Returns `None` if the file is unchanged, a `changed` record if its
/// mtime, length or type differ, and an `unreadable` record if it can no
/// longer be stat'ed.
#[must_use]
pub fn check_file(record: &FileRecord) -> Option<UnprocessedRecord> {
    let metadata = match fs::symlink_metadata(&record.path) {
        Ok(m) => m,
        Err(e) => return Some(UnprocessedRecord::unreadable(record.path.clone(), &e)),
    };

    let detail = if !metadata.is_file() {
        "no longer a regular file"
    } else if metadata.len() != record.size {
        "size changed during scan"
    } else if metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH) != record.modified {
        "modified during scan"
    } else {
        return None;
    };

    Some(UnprocessedRecord {
        path: record.path.clone(),
        reason: UnprocessedReason::Changed,
        detail: Some(detail.to_string()),
    })
}

/// Re-stats resolved files and invalidates the ones that changed.
pub struct ChangeDetector {
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeDetector {
    /// Create a detector.
    #[must_use]
    pub fn new() -> Self {
        Self {
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

    /// Find resolved files that changed since they were cataloged.
    ///
    /// Files that never got a content id were already reported by the
    /// catalog or the resolver and are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Interrupted`] on shutdown.
    pub fn detect(&self, catalog: &Catalog) -> Result<Vec<UnprocessedRecord>, ScanError> {
        let resolved: Vec<&FileRecord> = catalog
            .records
            .values()
            .filter(|r| r.content_id.is_some())
            .collect();

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start("verifying", resolved.len());
        }

        let mut invalid = Vec::new();
        for (idx, record) in resolved.into_iter().enumerate() {
            if self.is_shutdown_requested() {
                return Err(ScanError::Interrupted);
            }
            if let Some(ref callback) = self.progress_callback {
                callback.on_progress(idx + 1, record.path.to_string_lossy().as_ref());
            }
            if let Some(found) = check_file(record) {
                log::debug!(
                    "Invalidating {} ({})",
                    found.path.display(),
                    found.detail.as_deref().unwrap_or("unknown")
                );
                invalid.push(found);
            }
        }

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end("verifying");
        }

        Ok(invalid)
    }

    /// Apply invalidations to the classification and the catalog.
    ///
    /// Each file is dropped from its class, loses its content id, has its
    /// tree leaf reset to unresolved and is added to the unprocessed list.
    pub fn apply(
        &self,
        invalid: Vec<UnprocessedRecord>,
        files: &mut FileClassification,
        catalog: &mut Catalog,
    ) {
        for record in invalid {
            files.invalidate(&record.path);
            catalog.record_unprocessed(record);
        }
    }

    /// Detect and apply in one step. Returns the number of invalidated files.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Interrupted`] on shutdown.
    pub fn run(
        &self,
        files: &mut FileClassification,
        catalog: &mut Catalog,
    ) -> Result<usize, ScanError> {
        let invalid = self.detect(catalog)?;
        let count = invalid.len();
        if count > 0 {
            log::info!("{} files changed during the scan", count);
        }
        self.apply(invalid, files, catalog);
        Ok(count)
    }
}

//! Duplicate finder: wires the catalog, resolver, change detector and
//! fingerprinter into one pipeline.
//!
//! # Overview
//!
//! 1. **Catalog** - walk the search roots, bucket regular files by size
//! 2. **Compare** - resolve every bucket on a bounded rayon pool
//! 3. **Allocate** - hand out content ids in bucket-size order
//! 4. **Verify** - re-stat resolved files, invalidate the changed ones
//! 5. **Fingerprint** - sign directories bottom-up and group them
//!
//! Buckets share no state, so step 2 is the only parallel step. Content
//! ids are allocated after the parallel merge, which keeps them identical
//! from run to run regardless of completion order.
//!
//! # Example
//!
//! ```no_run
//! use finddup::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::new(FinderConfig::default().with_io_threads(4));
//! let analysis = finder.analyze_paths(&[PathBuf::from("/data")]).unwrap();
//!
//! println!("{} duplicate file sets", analysis.files.duplicates.len());
//! println!("{} duplicate directory sets", analysis.directories.duplicates.len());
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use rayon::prelude::*;
use serde::Serialize;

use super::{
    sort_groups, BucketOutcome, ChangeDetector, ContentIdAllocator, DirectoryFingerprinter,
    DirectoryReport, DuplicateGroup, DuplicateResolver, FileClassification, GroupKind,
    ResolveError, ResolverConfig,
};
use crate::progress::ProgressCallback;
use crate::scanner::{
    normalize_search_paths, Catalog, CatalogConfig, FileCatalog, LeafState, ScanError,
    SearchRoots, UnprocessedRecord,
};

/// Configuration for the whole pipeline.
#[derive(Clone)]
pub struct FinderConfig {
    /// Global comparison limits, split across workers
    pub resolver: ResolverConfig,
    /// Number of buckets resolved at once.
    /// Default is 4 to prevent disk thrashing.
    pub io_threads: usize,
    /// Catalog settings (ignore set)
    pub catalog: CatalogConfig,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("resolver", &self.resolver)
            .field("io_threads", &self.io_threads)
            .field("catalog", &self.catalog)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            io_threads: 4,
            catalog: CatalogConfig::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Set the number of bucket workers.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the total memory budget for chunk buffers.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.resolver = self.resolver.with_memory_budget(bytes);
        self
    }

    /// Set the total open-handle ceiling.
    #[must_use]
    pub fn with_max_open_files(mut self, count: usize) -> Self {
        self.resolver = self.resolver.with_max_open_files(count);
        self
    }

    /// Set first, minimum and maximum chunk sizes.
    #[must_use]
    pub fn with_chunk_sizes(mut self, first: usize, min: usize, max: usize) -> Self {
        self.resolver = self.resolver.with_chunk_sizes(first, min, max);
        self
    }

    /// Set the catalog configuration.
    #[must_use]
    pub fn with_catalog_config(mut self, config: CatalogConfig) -> Self {
        self.catalog = config;
        self
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

    /// Number of bucket workers actually started.
    ///
    /// Every worker needs at least one handle, so there are never more
    /// workers than the open-handle ceiling allows.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.io_threads
            .max(1)
            .min(self.resolver.max_open_files.max(1))
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Summary statistics from one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Regular files cataloged
    pub files_cataloged: usize,
    /// Directories under the search roots
    pub directories: usize,
    /// Distinct file sizes
    pub size_buckets: usize,
    /// Buckets with more than one member (the ones actually read)
    pub buckets_compared: usize,
    /// Bytes read while comparing
    pub bytes_read: u64,
    /// Files opened while comparing
    pub file_opens: u64,
    /// Most files one worker held open at the same time
    pub peak_open_files: usize,
    /// Longest chain of passes over a single bucket
    pub max_passes: u32,
    /// Content ids allocated
    pub content_ids: u64,
    /// Files invalidated by the change detector
    pub invalidated: usize,
    /// Entries left out of comparison
    pub unprocessed: usize,
    /// Space held by redundant file copies
    pub reclaimable_bytes: u64,
    /// Duration of the entire run
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
}

fn serialize_duration<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl ScanSummary {
    /// Format reclaimable space as human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_bytes).to_string()
    }

    /// Format bytes read as human-readable string.
    #[must_use]
    pub fn bytes_read_display(&self) -> String {
        ByteSize::b(self.bytes_read).to_string()
    }
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The scan was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Scan interrupted by user")]
    Interrupted,

    /// A search path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The memory budget is too small for a bucket.
    #[error(transparent)]
    BudgetExceeded(ResolveError),

    /// A search root could not be cataloged.
    #[error(transparent)]
    Scan(ScanError),

    /// An I/O error occurred while preparing the search paths.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bucket worker pool could not be built.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl From<ScanError> for FinderError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Interrupted => Self::Interrupted,
            ScanError::NotFound(path) => Self::PathNotFound(path),
            other => Self::Scan(other),
        }
    }
}

impl From<ResolveError> for FinderError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Interrupted => Self::Interrupted,
            other => Self::BudgetExceeded(other),
        }
    }
}

/// Final classification of one run.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// The normalized search roots
    pub roots: SearchRoots,
    /// File-level classification
    pub files: FileClassification,
    /// Directory-level classification
    pub directories: DirectoryReport,
    /// Entries left out of comparison, sorted by reason then path
    pub unprocessed: Vec<UnprocessedRecord>,
    /// Run statistics
    pub summary: ScanSummary,
}

impl Analysis {
    /// File and directory duplicate groups, largest first.
    #[must_use]
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        let mut groups: Vec<DuplicateGroup> = self
            .files
            .duplicates
            .iter()
            .chain(&self.directories.duplicates)
            .cloned()
            .collect();
        sort_groups(&mut groups);
        groups
    }

    /// Unique files and directories, alphabetical.
    ///
    /// Directories are returned with `true` in the second position.
    #[must_use]
    pub fn unique_paths(&self) -> Vec<(&Path, bool)> {
        let mut paths: Vec<(&Path, bool)> = self
            .files
            .unique
            .iter()
            .map(|p| (p.as_path(), false))
            .chain(self.directories.unique.iter().map(|p| (p.as_path(), true)))
            .collect();
        paths.sort();
        paths
    }
}

/// Duplicate finder that orchestrates the pipeline.
#[derive(Debug)]
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// Normalize raw search paths and analyze them.
    ///
    /// # Errors
    ///
    /// See [`DuplicateFinder::analyze`]. Additionally fails with
    /// [`FinderError::PathNotFound`] before any work if a path is missing.
    pub fn analyze_paths(&self, paths: &[PathBuf]) -> Result<Analysis, FinderError> {
        for path in paths {
            if std::fs::symlink_metadata(path).is_err() {
                return Err(FinderError::PathNotFound(path.clone()));
            }
        }
        let roots = normalize_search_paths(paths)?;
        self.analyze(roots)
    }

    /// Run the full pipeline over already normalized roots.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if:
    /// - a search root does not exist
    /// - the memory budget is too small for some bucket
    /// - the run is interrupted by shutdown signal
    pub fn analyze(&self, roots: SearchRoots) -> Result<Analysis, FinderError> {
        let start_time = Instant::now();
        let mut summary = ScanSummary::default();

        let mut catalog_builder = FileCatalog::new(self.config.catalog.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            catalog_builder = catalog_builder.with_shutdown_flag(flag.clone());
        }
        if let Some(ref callback) = self.config.progress_callback {
            catalog_builder = catalog_builder.with_progress_callback(callback.clone());
        }
        let mut catalog = catalog_builder.scan(&roots.paths)?;

        summary.files_cataloged = catalog.records.len();
        summary.directories = catalog.trees.iter().map(|t| t.dir_count()).sum();
        summary.size_buckets = catalog.buckets.len();
        summary.buckets_compared = catalog.ambiguous_buckets();

        let outcomes = self.resolve_buckets(std::mem::take(&mut catalog.buckets))?;
        let mut files = assign_content_ids(outcomes, &mut catalog, &mut summary);

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        let mut detector = ChangeDetector::new();
        if let Some(ref flag) = self.config.shutdown_flag {
            detector = detector.with_shutdown_flag(flag.clone());
        }
        if let Some(ref callback) = self.config.progress_callback {
            detector = detector.with_progress_callback(callback.clone());
        }
        summary.invalidated = detector.run(&mut files, &mut catalog)?;

        let directories = DirectoryFingerprinter::fingerprint(&mut catalog.trees);

        let mut unprocessed = std::mem::take(&mut catalog.unprocessed);
        unprocessed.sort_by(|a, b| a.reason.cmp(&b.reason).then_with(|| a.path.cmp(&b.path)));
        summary.unprocessed = unprocessed.len();

        sort_groups(&mut files.duplicates);
        summary.reclaimable_bytes = files
            .duplicates
            .iter()
            .map(DuplicateGroup::reclaimable_bytes)
            .sum();
        summary.duration = start_time.elapsed();

        log::info!(
            "Analysis complete: {} duplicate file sets, {} duplicate directory sets, {} unknown directories in {:.2}s",
            files.duplicates.len(),
            directories.duplicates.len(),
            directories.unknown.len(),
            summary.duration.as_secs_f64()
        );

        Ok(Analysis {
            roots,
            files,
            directories,
            unprocessed,
            summary,
        })
    }

    /// Resolve every bucket on a bounded pool; results come back in
    /// ascending bucket-size order.
    fn resolve_buckets(
        &self,
        buckets: std::collections::BTreeMap<u64, Vec<PathBuf>>,
    ) -> Result<Vec<BucketOutcome>, FinderError> {
        let io_threads = self.config.worker_count();
        if io_threads < self.config.io_threads {
            log::debug!(
                "Limiting bucket workers to {} (open-file ceiling {})",
                io_threads,
                self.config.resolver.max_open_files
            );
        }
        let mut resolver =
            DuplicateResolver::new(self.config.resolver.clone().per_worker(io_threads));
        if let Some(ref flag) = self.config.shutdown_flag {
            resolver = resolver.with_shutdown_flag(flag.clone());
        }

        let buckets: Vec<(u64, Vec<PathBuf>)> = buckets.into_iter().collect();
        let ambiguous = buckets.iter().filter(|(_, m)| m.len() > 1).count();

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start("comparing", ambiguous);
        }
        log::info!(
            "Comparing {} ambiguous size buckets on {} workers",
            ambiguous,
            io_threads
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(io_threads)
            .build()
            .map_err(|e| FinderError::ThreadPool(e.to_string()))?;

        let done = AtomicUsize::new(0);
        let outcomes: Result<Vec<BucketOutcome>, ResolveError> = pool.install(|| {
            buckets
                .into_par_iter()
                .map(|(size, members)| {
                    let ambiguous = members.len() > 1;
                    let label = members
                        .first()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let outcome = resolver.resolve(size, members);
                    if ambiguous {
                        let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(ref callback) = self.config.progress_callback {
                            callback.on_progress(current, &label);
                        }
                    }
                    outcome
                })
                .collect()
        });

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end("comparing");
        }

        Ok(outcomes?)
    }
}

/// Merge bucket outcomes: allocate ids in order and record them on the
/// catalog records and tree leaves.
fn assign_content_ids(
    outcomes: Vec<BucketOutcome>,
    catalog: &mut Catalog,
    summary: &mut ScanSummary,
) -> FileClassification {
    let mut ids = ContentIdAllocator::new();
    let mut files = FileClassification::default();

    for outcome in outcomes {
        summary.bytes_read += outcome.bytes_read;
        summary.file_opens += outcome.opens;
        summary.peak_open_files = summary.peak_open_files.max(outcome.peak_open_files);
        summary.max_passes = summary.max_passes.max(outcome.passes);

        for path in outcome.unique {
            let id = ids.allocate();
            mark_resolved(catalog, &path, LeafState::Resolved(id));
            files.unique.insert(path);
        }

        for members in outcome.duplicates {
            let id = ids.allocate();
            let blocks = members
                .first()
                .and_then(|p| catalog.records.get(p))
                .map_or(0, |r| r.blocks);
            for path in &members {
                mark_resolved(catalog, path, LeafState::Resolved(id));
            }
            files
                .duplicates
                .push(DuplicateGroup::new(blocks, members, GroupKind::File));
        }

        for record in outcome.unreadable {
            catalog.record_unprocessed(record);
        }
    }

    summary.content_ids = ids.allocated();
    log::debug!(
        "Allocated {} content ids for {} files",
        summary.content_ids,
        files.file_count()
    );
    files
}

fn mark_resolved(catalog: &mut Catalog, path: &Path, state: LeafState) {
    if let (LeafState::Resolved(id), Some(record)) = (state, catalog.records.get_mut(path)) {
        record.content_id = Some(id);
    }
    if let Some(tree) = catalog.tree_for_mut(path) {
        tree.set_leaf_state(path, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::UnprocessedReason;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn analyze(dir: &TempDir) -> Analysis {
        DuplicateFinder::with_defaults()
            .analyze_paths(&[dir.path().to_path_buf()])
            .unwrap()
    }

    #[test]
    fn test_finder_config_builder() {
        let config = FinderConfig::default()
            .with_io_threads(0)
            .with_memory_budget(4096)
            .with_max_open_files(16);
        assert_eq!(config.io_threads, 1);
        assert_eq!(config.resolver.memory_budget, 4096);
        assert_eq!(config.resolver.max_open_files, 16);
    }

    #[test]
    fn test_workers_limited_by_open_file_ceiling() {
        let config = FinderConfig::default()
            .with_io_threads(8)
            .with_max_open_files(3);
        assert_eq!(config.worker_count(), 3);

        let config = FinderConfig::default().with_io_threads(4);
        assert_eq!(config.worker_count(), 4);
    }

    #[test]
    fn test_peak_open_files_within_ceiling() {
        let dir = TempDir::new().unwrap();
        for size in [300usize, 400, 500] {
            for i in 0..4 {
                fs::write(dir.path().join(format!("s{size}_{i}")), vec![b'k'; size]).unwrap();
            }
        }

        let finder = DuplicateFinder::new(
            FinderConfig::default()
                .with_io_threads(8)
                .with_max_open_files(2)
                .with_chunk_sizes(64, 1, 64),
        );
        let analysis = finder.analyze_paths(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(analysis.files.duplicates.len(), 3);
        assert_eq!(analysis.summary.peak_open_files, 1);
    }

    #[test]
    fn test_empty_directory_tree() {
        let dir = TempDir::new().unwrap();
        let analysis = analyze(&dir);

        assert!(analysis.files.duplicates.is_empty());
        assert!(analysis.files.unique.is_empty());
        assert_eq!(analysis.directories.unique.len(), 1);
        assert_eq!(analysis.summary.files_cataloged, 0);
    }

    #[test]
    fn test_hello_roots_are_duplicate_directories() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("A");
        let b = dir.path().join("B");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        fs::write(a.join("fileX"), b"hello").unwrap();
        fs::write(b.join("fileY"), b"hello").unwrap();

        let analysis = DuplicateFinder::with_defaults()
            .analyze_paths(&[a.clone(), b.clone()])
            .unwrap();

        assert_eq!(analysis.files.duplicates.len(), 1);
        assert_eq!(
            analysis.files.duplicates[0].members,
            vec![a.join("fileX"), b.join("fileY")]
        );
        assert_eq!(analysis.directories.duplicates.len(), 1);
        assert_eq!(analysis.directories.duplicates[0].members, vec![a, b]);
        assert_eq!(analysis.summary.content_ids, 1);
    }

    #[test]
    fn test_unique_sizes_never_opened() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("one"), b"1").unwrap();
        fs::write(dir.path().join("two"), b"22").unwrap();

        let analysis = analyze(&dir);

        assert_eq!(analysis.files.unique.len(), 2);
        assert_eq!(analysis.summary.file_opens, 0);
        assert_eq!(analysis.summary.bytes_read, 0);
        assert_eq!(analysis.summary.buckets_compared, 0);
    }

    #[test]
    fn test_ignored_entries_do_not_break_directory_match() {
        let dir = TempDir::new().unwrap();
        let c = dir.path().join("C");
        let d = dir.path().join("D");
        fs::create_dir(&c).unwrap();
        fs::create_dir(&d).unwrap();
        fs::write(c.join("a.txt"), b"same content").unwrap();
        fs::write(d.join("b.txt"), b"same content").unwrap();
        fs::write(c.join(".DS_Store"), b"junk").unwrap();

        let analysis = analyze(&dir);

        let dir_groups = &analysis.directories.duplicates;
        assert_eq!(dir_groups.len(), 1);
        assert_eq!(dir_groups[0].members, vec![c, d]);
        assert_eq!(analysis.unprocessed.len(), 1);
        assert_eq!(analysis.unprocessed[0].reason, UnprocessedReason::Ignored);
    }

    #[test]
    fn test_missing_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let result = DuplicateFinder::with_defaults().analyze_paths(&[missing.clone()]);

        match result {
            Err(FinderError::PathNotFound(p)) => assert_eq!(p, missing),
            other => panic!("expected PathNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_budget_exceeded_is_fatal() {
        let dir = TempDir::new().unwrap();
        for i in 0..4 {
            fs::write(dir.path().join(format!("f{i}")), b"abcdef").unwrap();
        }

        let finder = DuplicateFinder::new(
            FinderConfig::default()
                .with_io_threads(1)
                .with_memory_budget(8),
        );
        let result = finder.analyze_paths(&[dir.path().to_path_buf()]);

        assert!(matches!(result, Err(FinderError::BudgetExceeded(_))));
    }

    #[test]
    fn test_interrupted_before_start() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f"), b"x").unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        let finder = DuplicateFinder::new(FinderConfig::default().with_shutdown_flag(flag));
        let result = finder.analyze_paths(&[dir.path().to_path_buf()]);

        assert!(matches!(result, Err(FinderError::Interrupted)));
    }

    struct PhaseRecorder {
        phases: Mutex<Vec<String>>,
    }

    impl ProgressCallback for PhaseRecorder {
        fn on_phase_start(&self, phase: &str, _total: usize) {
            self.phases.lock().unwrap().push(phase.to_string());
        }
        fn on_progress(&self, _current: usize, _path: &str) {}
        fn on_phase_end(&self, _phase: &str) {}
    }

    #[test]
    fn test_progress_phases_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), b"dup").unwrap();
        fs::write(dir.path().join("b"), b"dup").unwrap();

        let recorder = Arc::new(PhaseRecorder {
            phases: Mutex::new(Vec::new()),
        });
        let finder =
            DuplicateFinder::new(FinderConfig::default().with_progress_callback(recorder.clone()));
        finder.analyze_paths(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(
            *recorder.phases.lock().unwrap(),
            vec!["cataloging", "comparing", "verifying"]
        );
    }

    #[test]
    fn test_content_ids_deterministic() {
        let dir = TempDir::new().unwrap();
        for (name, body) in [("a", "xx"), ("b", "yy"), ("c", "xx"), ("d", "zzz")] {
            fs::write(dir.path().join(name), body).unwrap();
        }

        let first = analyze(&dir);
        let second = analyze(&dir);

        assert_eq!(first.files, second.files);
        assert_eq!(first.directories, second.directories);
        assert_eq!(first.summary.content_ids, 3);
    }
}

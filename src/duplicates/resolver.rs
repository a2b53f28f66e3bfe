//! Progressive, memory-bounded byte comparison of one size bucket.
//!
//! # Overview
//!
//! Files of equal length are compared directly, chunk by chunk, instead of
//! being hashed. Each pass reads the next chunk of every member of every
//! pending comparison group and splits the group by the bytes just read:
//!
//! 1. The first pass reads a small chunk (256 bytes by default), which is
//!    enough to tell most non-duplicates apart.
//! 2. A sub-group of one is unique.
//! 3. A larger sub-group whose members hit end-of-file is a duplicate set.
//! 4. Anything else is carried into the next pass at a larger offset.
//!
//! The chunk size of every later pass is `memory_budget / cardinality` of
//! the largest pending group, clamped to `max_chunk_size`. When that falls
//! below `min_chunk_size` the run fails with
//! [`ResolveError::BudgetExceeded`].
//!
//! # Handles
//!
//! A group small enough to fit under the open-handle ceiling keeps its
//! members open across passes and reads them sequentially. Larger groups
//! reopen and seek every member on every pass, holding one handle at a
//! time; when every slot is taken by held handles, one of them is closed
//! first. Handles are owned by the group; whatever way `resolve` returns,
//! they are closed on drop.
//!
//! # Example
//!
//! ```no_run
//! use finddup::duplicates::{DuplicateResolver, ResolverConfig};
//! use std::path::PathBuf;
//!
//! let resolver = DuplicateResolver::new(ResolverConfig::default());
//! let outcome = resolver
//!     .resolve(5, vec![PathBuf::from("/a/x"), PathBuf::from("/b/y")])
//!     .unwrap();
//! println!("{} duplicate sets", outcome.duplicates.len());
//! ```

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::scanner::UnprocessedRecord;

/// Default chunk size of the first pass.
pub const DEFAULT_FIRST_CHUNK: usize = 256;

/// Default smallest chunk a later pass may use.
pub const DEFAULT_MIN_CHUNK: usize = 5;

/// Default largest chunk a later pass may use.
pub const DEFAULT_MAX_CHUNK: usize = 1024 * 1024;

/// Limits for resolving one bucket.
///
/// These are per-worker limits: when several buckets are resolved at once,
/// the caller divides the global budget between workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Bytes of chunk buffers one pass may hold
    pub memory_budget: u64,
    /// Handles that may be open at the same time
    pub max_open_files: usize,
    /// Chunk size of the first pass
    pub first_chunk_size: usize,
    /// Smallest viable chunk of a later pass
    pub min_chunk_size: usize,
    /// Largest chunk of a later pass
    pub max_chunk_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            memory_budget: 1024 * 1024 * 1024,
            max_open_files: 128,
            first_chunk_size: DEFAULT_FIRST_CHUNK,
            min_chunk_size: DEFAULT_MIN_CHUNK,
            max_chunk_size: DEFAULT_MAX_CHUNK,
        }
    }
}

impl ResolverConfig {
    /// Set the memory budget.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Set the open-handle ceiling (at least 1).
    #[must_use]
    pub fn with_max_open_files(mut self, count: usize) -> Self {
        self.max_open_files = count.max(1);
        self
    }

    /// Set the chunk sizes; the minimum is at least 1 byte.
    #[must_use]
    pub fn with_chunk_sizes(mut self, first: usize, min: usize, max: usize) -> Self {
        self.min_chunk_size = min.max(1);
        self.first_chunk_size = first.max(self.min_chunk_size);
        self.max_chunk_size = max.max(self.min_chunk_size);
        self
    }

    /// Split global limits evenly across `workers` concurrent resolvers.
    #[must_use]
    pub fn per_worker(mut self, workers: usize) -> Self {
        let workers = workers.max(1);
        self.memory_budget = (self.memory_budget / workers as u64).max(1);
        self.max_open_files = (self.max_open_files / workers).max(1);
        self
    }
}

/// Fatal conditions while resolving a bucket.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The memory budget cannot give every pending member a minimal chunk.
    #[error(
        "Comparison budget exceeded: {cardinality} files of {size} bytes need at least \
         {min_chunk} bytes each, but the budget allows only {chunk}"
    )]
    BudgetExceeded {
        /// Byte size of the bucket
        size: u64,
        /// Cardinality of the largest pending group
        cardinality: usize,
        /// Chunk the budget allows
        chunk: usize,
        /// Configured minimum chunk
        min_chunk: usize,
    },

    /// Shutdown was requested between group reads.
    #[error("Comparison interrupted")]
    Interrupted,
}

/// Classification of one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketOutcome {
    /// Byte size shared by all members
    pub size: u64,
    /// Members with no byte-identical peer
    pub unique: Vec<PathBuf>,
    /// Sets of byte-identical members, in discovery order
    pub duplicates: Vec<Vec<PathBuf>>,
    /// Members that could not be opened or read
    pub unreadable: Vec<UnprocessedRecord>,
    /// Bytes read from disk
    pub bytes_read: u64,
    /// Number of `open` calls
    pub opens: u64,
    /// Most handles open at the same time
    pub peak_open_files: usize,
    /// Number of comparison passes
    pub passes: u32,
}

/// Chunk size for the next pass, or `None` if the budget cannot give each
/// of `cardinality` members at least `min_chunk` bytes.
#[must_use]
pub fn next_chunk_size(
    memory_budget: u64,
    cardinality: usize,
    min_chunk: usize,
    max_chunk: usize,
) -> Option<usize> {
    let per_member = memory_budget / cardinality.max(1) as u64;
    let chunk = usize::try_from(per_member)
        .unwrap_or(usize::MAX)
        .min(max_chunk);
    (chunk >= min_chunk).then_some(chunk)
}

/// Split items by exact equality of their bytes.
///
/// The first item not yet placed becomes the pivot; every later item with
/// the same bytes joins it. Sub-groups come out in pivot order with members
/// in input order. Each sub-group carries the length of its bytes.
pub fn partition_by_content<T>(items: Vec<(T, Vec<u8>)>) -> Vec<(Vec<T>, usize)> {
    let mut groups = Vec::new();
    let mut rest = items;

    while !rest.is_empty() {
        let mut iter = rest.into_iter();
        let Some((pivot, pivot_bytes)) = iter.next() else {
            break;
        };
        let (same, others): (Vec<_>, Vec<_>) = iter.partition(|(_, bytes)| *bytes == pivot_bytes);

        let mut members = Vec::with_capacity(same.len() + 1);
        members.push(pivot);
        members.extend(same.into_iter().map(|(item, _)| item));
        groups.push((members, pivot_bytes.len()));

        rest = others;
    }

    groups
}

/// Open-handle bookkeeping for one bucket.
#[derive(Debug, Default)]
struct HandleCount {
    opens: u64,
    live: usize,
    peak: usize,
}

impl HandleCount {
    fn opened(&mut self) {
        self.opens += 1;
        self.live += 1;
        self.peak = self.peak.max(self.live);
    }

    fn closed(&mut self) {
        self.live = self.live.saturating_sub(1);
    }
}

/// One bucket member with its optional held handle.
#[derive(Debug)]
struct Member {
    path: PathBuf,
    handle: Option<File>,
}

impl Member {
    fn new(path: PathBuf) -> Self {
        Self { path, handle: None }
    }

    /// Read up to `chunk` bytes at `offset`.
    ///
    /// A held handle is always positioned at `offset` because every earlier
    /// read consumed a full chunk. With `hold` unset the handle is closed
    /// before returning.
    fn read_chunk(
        &mut self,
        offset: u64,
        chunk: usize,
        hold: bool,
        handles: &mut HandleCount,
    ) -> io::Result<Vec<u8>> {
        let (mut file, fresh) = match self.handle.take() {
            Some(file) => (file, false),
            None => {
                let file = File::open(&self.path)?;
                handles.opened();
                (file, true)
            }
        };

        let result = read_at(&mut file, fresh.then_some(offset), chunk);
        if hold && result.is_ok() {
            self.handle = Some(file);
        } else {
            drop(file);
            handles.closed();
        }
        result
    }

    /// Close the held handle. Returns `false` if none was held.
    fn release(&mut self, handles: &mut HandleCount) -> bool {
        match self.handle.take() {
            Some(file) => {
                drop(file);
                handles.closed();
                true
            }
            None => false,
        }
    }
}

fn read_at(file: &mut File, seek_to: Option<u64>, chunk: usize) -> io::Result<Vec<u8>> {
    if let Some(offset) = seek_to.filter(|&offset| offset > 0) {
        file.seek(SeekFrom::Start(offset))?;
    }
    let mut buf = Vec::with_capacity(chunk);
    file.by_ref().take(chunk as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// A subset of a bucket still being disambiguated.
#[derive(Debug)]
struct ComparisonGroup {
    members: Vec<Member>,
    offset: u64,
}

impl ComparisonGroup {
    fn held(&self) -> usize {
        self.members.iter().filter(|m| m.handle.is_some()).count()
    }

    fn release_all(&mut self, handles: &mut HandleCount) {
        for member in &mut self.members {
            member.release(handles);
        }
    }
}

/// Close one held handle of any of `groups`. Returns how many were closed.
fn release_one<'a>(
    groups: impl Iterator<Item = &'a mut ComparisonGroup>,
    handles: &mut HandleCount,
) -> usize {
    for group in groups {
        if let Some(member) = group.members.iter_mut().find(|m| m.handle.is_some()) {
            member.release(handles);
            return 1;
        }
    }
    0
}

/// Resolves size buckets into unique files and duplicate sets.
#[derive(Debug, Clone, Default)]
pub struct DuplicateResolver {
    config: ResolverConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl DuplicateResolver {
    /// Create a resolver with the given limits.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// The limits in use.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Resolve one size bucket.
    ///
    /// A bucket of one member is unique without any I/O. Read failures
    /// move a member to [`BucketOutcome::unreadable`] and the rest of its
    /// group carries on.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::BudgetExceeded`] when the memory budget is
    /// too small for the largest pending group, and
    /// [`ResolveError::Interrupted`] on shutdown. All open handles are
    /// closed in both cases.
    pub fn resolve(&self, size: u64, members: Vec<PathBuf>) -> Result<BucketOutcome, ResolveError> {
        let mut outcome = BucketOutcome {
            size,
            ..Default::default()
        };

        if members.len() <= 1 {
            outcome.unique = members;
            return Ok(outcome);
        }

        let cardinality = members.len();
        let mut chunk = next_chunk_size(
            self.config.memory_budget,
            cardinality,
            self.config.min_chunk_size,
            self.config.first_chunk_size,
        )
        .ok_or_else(|| self.budget_error(size, cardinality))?;

        let mut pending = vec![ComparisonGroup {
            members: members.into_iter().map(Member::new).collect(),
            offset: 0,
        }];
        let mut held_total = 0usize;
        let mut handles = HandleCount::default();

        while !pending.is_empty() {
            outcome.passes += 1;
            log::trace!(
                "Bucket {} bytes: pass {} with {} groups, chunk {}",
                size,
                outcome.passes,
                pending.len(),
                chunk
            );

            let mut next: Vec<ComparisonGroup> = Vec::new();
            let mut queue = VecDeque::from(pending);
            while let Some(mut group) = queue.pop_front() {
                if self.is_shutdown_requested() {
                    log::debug!("Resolver: Shutdown requested, abandoning bucket {}", size);
                    return Err(ResolveError::Interrupted);
                }

                held_total -= group.held();
                let free = self.config.max_open_files.saturating_sub(held_total);
                let hold = group.members.len() <= free;
                if !hold {
                    group.release_all(&mut handles);
                    // Reopen mode still needs one slot
                    if free == 0 {
                        held_total -=
                            release_one(next.iter_mut().chain(queue.iter_mut()), &mut handles);
                    }
                }

                for sub in self.compare_pass(group, chunk, hold, size, &mut handles, &mut outcome)
                {
                    held_total += sub.held();
                    next.push(sub);
                }
            }
            pending = next;

            if let Some(largest) = pending.iter().map(|g| g.members.len()).max() {
                chunk = next_chunk_size(
                    self.config.memory_budget,
                    largest,
                    self.config.min_chunk_size,
                    self.config.max_chunk_size,
                )
                .ok_or_else(|| self.budget_error(size, largest))?;
            }
        }

        outcome.opens = handles.opens;
        outcome.peak_open_files = handles.peak;

        log::debug!(
            "Bucket {} bytes: {} unique, {} duplicate sets, {} unreadable after {} passes",
            size,
            outcome.unique.len(),
            outcome.duplicates.len(),
            outcome.unreadable.len(),
            outcome.passes
        );

        Ok(outcome)
    }

    /// Read one chunk from every member and split the group.
    ///
    /// Final sub-groups go straight into `outcome`; ambiguous ones are
    /// returned for the next pass.
    fn compare_pass(
        &self,
        group: ComparisonGroup,
        chunk: usize,
        hold: bool,
        size: u64,
        handles: &mut HandleCount,
        outcome: &mut BucketOutcome,
    ) -> Vec<ComparisonGroup> {
        let offset = group.offset;
        let mut read = Vec::with_capacity(group.members.len());

        for mut member in group.members {
            match member.read_chunk(offset, chunk, hold, handles) {
                Ok(bytes) => {
                    outcome.bytes_read += bytes.len() as u64;
                    read.push((member, bytes));
                }
                Err(e) => {
                    log::warn!("Cannot read {}: {}", member.path.display(), e);
                    outcome
                        .unreadable
                        .push(UnprocessedRecord::unreadable(member.path, &e));
                }
            }
        }

        let mut carried = Vec::new();
        for (mut members, bytes_read) in partition_by_content(read) {
            let finished = members.len() == 1
                || bytes_read < chunk
                || offset + bytes_read as u64 >= size;
            if finished {
                for member in &mut members {
                    member.release(handles);
                }
            }

            if members.len() == 1 {
                outcome.unique.extend(members.into_iter().map(|m| m.path));
            } else if finished {
                outcome
                    .duplicates
                    .push(members.into_iter().map(|m| m.path).collect());
            } else {
                carried.push(ComparisonGroup {
                    members,
                    offset: offset + chunk as u64,
                });
            }
        }
        carried
    }

    fn budget_error(&self, size: u64, cardinality: usize) -> ResolveError {
        let chunk = self.config.memory_budget / cardinality.max(1) as u64;
        ResolveError::BudgetExceeded {
            size,
            cardinality,
            chunk: usize::try_from(chunk).unwrap_or(usize::MAX),
            min_chunk: self.config.min_chunk_size,
        }
    }
}

//! Content-equivalence engine.
//!
//! This module provides functionality for:
//! - Progressive byte comparison of same-size files ([`resolver`])
//! - Post-resolution change detection ([`changes`])
//! - Bottom-up directory fingerprinting ([`fingerprint`])
//! - Content ids, signatures and duplicate groups ([`groups`])
//! - The end-to-end pipeline ([`finder`])

pub mod changes;
pub mod finder;
pub mod fingerprint;
pub mod groups;
pub mod resolver;

pub use changes::{check_file, ChangeDetector};
pub use finder::{Analysis, DuplicateFinder, FinderConfig, FinderError, ScanSummary};
pub use fingerprint::{DirectoryFingerprinter, DirectoryReport};
pub use groups::{
    sort_groups, ContentId, ContentIdAllocator, DuplicateGroup, FileClassification, GroupKind,
    Signature,
};
pub use resolver::{
    next_chunk_size, partition_by_content, BucketOutcome, DuplicateResolver, ResolveError,
    ResolverConfig,
};

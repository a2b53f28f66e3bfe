//! JSON report for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "root": "/home/user",
//!   "search_paths": ["/home/user/Photos", "/home/user/backup"],
//!   "duplicates": [
//!     {
//!       "kind": "directory",
//!       "blocks": 16,
//!       "bytes": 8192,
//!       "members": ["/home/user/Photos", "/home/user/backup/Photos"]
//!     }
//!   ],
//!   "unique": [{ "path": "/home/user/todo.txt", "kind": "file" }],
//!   "unprocessed": [
//!     { "path": "/home/user/latest", "reason": "symlink", "detail": null }
//!   ],
//!   "unknown_dirs": [],
//!   "summary": { "files_cataloged": 3, "bytes_read": 8192, "...": "..." },
//!   "exit_code": 0,
//!   "exit_code_name": "FD000"
//! }
//! ```
//!
//! All paths are absolute. Sizes are allocated space: `blocks` units of
//! 512 bytes, and the same in `bytes`.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::duplicates::{Analysis, DuplicateGroup, GroupKind, ScanSummary};
use crate::error::ExitCode;
use crate::scanner::{UnprocessedReason, UnprocessedRecord};

/// A duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// `file` or `directory`
    pub kind: GroupKind,
    /// Allocated blocks of one member
    pub blocks: u64,
    /// Allocated bytes of one member
    pub bytes: u64,
    /// Absolute member paths, sorted
    pub members: Vec<String>,
}

impl From<&DuplicateGroup> for JsonDuplicateGroup {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            kind: group.kind,
            blocks: group.blocks,
            bytes: group.allocated_bytes(),
            members: group.members.iter().map(|p| path_string(p)).collect(),
        }
    }
}

/// A unique file or directory.
#[derive(Debug, Clone, Serialize)]
pub struct JsonUnique {
    /// Absolute path
    pub path: String,
    /// `file` or `directory`
    pub kind: GroupKind,
}

/// An entry left out of comparison.
#[derive(Debug, Clone, Serialize)]
pub struct JsonUnprocessed {
    /// Absolute path
    pub path: String,
    /// Why it was left out
    pub reason: UnprocessedReason,
    /// Error or change detail, if any
    pub detail: Option<String>,
}

impl From<&UnprocessedRecord> for JsonUnprocessed {
    fn from(record: &UnprocessedRecord) -> Self {
        Self {
            path: path_string(&record.path),
            reason: record.reason,
            detail: record.detail.clone(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Common ancestor of all search paths
    pub root: String,
    /// Normalized search paths
    pub search_paths: Vec<String>,
    /// File and directory duplicate groups, largest first
    pub duplicates: Vec<JsonDuplicateGroup>,
    /// Unique files and directories, alphabetical
    pub unique: Vec<JsonUnique>,
    /// Entries left out of comparison
    pub unprocessed: Vec<JsonUnprocessed>,
    /// Directories whose content could not be fully established
    pub unknown_dirs: Vec<String>,
    /// Run statistics
    pub summary: ScanSummary,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "FD000")
    pub exit_code_name: String,
}

impl JsonOutput {
    /// Create a JSON report from a finished analysis.
    #[must_use]
    pub fn new(analysis: &Analysis, exit_code: ExitCode) -> Self {
        Self {
            root: path_string(&analysis.roots.common_root),
            search_paths: analysis.roots.paths.iter().map(|p| path_string(p)).collect(),
            duplicates: analysis
                .duplicate_groups()
                .iter()
                .map(JsonDuplicateGroup::from)
                .collect(),
            unique: analysis
                .unique_paths()
                .into_iter()
                .map(|(path, is_dir)| JsonUnique {
                    path: path_string(path),
                    kind: if is_dir {
                        GroupKind::Directory
                    } else {
                        GroupKind::File
                    },
                })
                .collect(),
            unprocessed: analysis
                .unprocessed
                .iter()
                .map(JsonUnprocessed::from)
                .collect(),
            unknown_dirs: analysis
                .directories
                .unknown
                .iter()
                .map(|p| path_string(p))
                .collect(),
            summary: analysis.summary.clone(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer.
    ///
    /// # Arguments
    ///
    /// * `writer` - The writer to output to (e.g., stdout)
    /// * `pretty` - Whether to pretty-print the output
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}

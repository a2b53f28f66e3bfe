//! Plain-text report.
//!
//! Layout:
//!
//! ```text
//! All file paths referenced from:
//! /home/user
//!
//! Duplicate Files/Directories:
//! Duplicate set (8 KiB each)
//!   Photos/
//!   backup/Photos/
//! Duplicate set (4 KiB each)
//!   notes.txt
//!   old/notes.txt
//!
//!
//! Unique Files/Directories:
//! todo.txt
//!
//!
//! Unprocessed Files
//!
//! Symbolic Links (ignored)
//!   /home/user/latest
//!
//! Unknown Dirs
//! /home/user/locked
//! ```
//!
//! Duplicate and unique paths are shown relative to the common root
//! (absolute when the root is `/`); directories carry a trailing
//! separator. Unprocessed entries and unknown directories are shown as
//! absolute paths.

use std::io::{self, Write};
use std::path::{Path, MAIN_SEPARATOR};

use bytesize::ByteSize;

use crate::duplicates::{Analysis, GroupKind};
use crate::scanner::path_utils::display_relative;
use crate::scanner::UnprocessedReason;

/// Unprocessed sub-sections in report order.
const UNPROCESSED_SECTIONS: [(UnprocessedReason, &str); 7] = [
    (UnprocessedReason::Unreadable, "Unreadable Files (ignored)"),
    (UnprocessedReason::Socket, "Sockets (ignored)"),
    (UnprocessedReason::Fifo, "FIFOs (ignored)"),
    (UnprocessedReason::Device, "Devices (ignored)"),
    (UnprocessedReason::Symlink, "Symbolic Links (ignored)"),
    (UnprocessedReason::Ignored, "Ignored Files"),
    (UnprocessedReason::Changed, "Changed Files (ignored)"),
];

/// Text report over a finished analysis.
#[derive(Debug)]
pub struct TextReport<'a> {
    analysis: &'a Analysis,
}

impl<'a> TextReport<'a> {
    /// Create a report for `analysis`.
    #[must_use]
    pub fn new(analysis: &'a Analysis) -> Self {
        Self { analysis }
    }

    /// Write the full report.
    ///
    /// # Errors
    ///
    /// Returns any error from `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.write_header(writer)?;
        self.write_duplicates(writer)?;
        self.write_uniques(writer)?;
        self.write_unprocessed(writer)?;
        self.write_unknown(writer)?;
        writer.flush()
    }

    /// Render the report into a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be written.
    pub fn render(&self) -> io::Result<String> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn root(&self) -> &Path {
        &self.analysis.roots.common_root
    }

    fn display(&self, path: &Path, is_dir: bool) -> String {
        let mut shown = display_relative(path, self.root());
        if is_dir && !shown.ends_with(MAIN_SEPARATOR) {
            shown.push(MAIN_SEPARATOR);
        }
        shown
    }

    fn write_header<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let root = self.root();
        if root.parent().is_some() {
            writeln!(writer, "All file paths referenced from:")?;
            writeln!(writer, "{}", root.display())?;
        }
        Ok(())
    }

    fn write_duplicates<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer)?;
        writeln!(writer, "Duplicate Files/Directories:")?;
        for group in self.analysis.duplicate_groups() {
            writeln!(
                writer,
                "Duplicate set ({} each)",
                ByteSize::b(group.allocated_bytes())
            )?;
            let is_dir = group.kind == GroupKind::Directory;
            for member in &group.members {
                writeln!(writer, "  {}", self.display(member, is_dir))?;
            }
        }
        Ok(())
    }

    fn write_uniques<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer)?;
        writeln!(writer)?;
        writeln!(writer, "Unique Files/Directories:")?;
        for (path, is_dir) in self.analysis.unique_paths() {
            writeln!(writer, "{}", self.display(path, is_dir))?;
        }
        Ok(())
    }

    fn write_unprocessed<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer)?;
        writeln!(writer)?;
        writeln!(writer, "Unprocessed Files")?;

        for (reason, title) in UNPROCESSED_SECTIONS {
            let mut records = self
                .analysis
                .unprocessed
                .iter()
                .filter(|r| r.reason == reason)
                .peekable();
            if records.peek().is_none() {
                continue;
            }
            writeln!(writer)?;
            writeln!(writer, "{title}")?;
            for record in records {
                writeln!(writer, "  {}", record.path.display())?;
                if let Some(ref detail) = record.detail {
                    writeln!(writer, "      {detail}")?;
                }
            }
        }
        Ok(())
    }

    fn write_unknown<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let unknown = &self.analysis.directories.unknown;
        if unknown.is_empty() {
            return Ok(());
        }
        writeln!(writer)?;
        writeln!(writer, "Unknown Dirs")?;
        for dir in unknown {
            writeln!(writer, "{}", dir.display())?;
        }
        Ok(())
    }
}

//! Command-line interface definitions for finddup.
//!
//! The CLI is a single command: one or more search paths plus options
//! that tune verbosity, output format and comparison limits. Limits given
//! here override the configuration file and `FINDDUP_*` environment
//! variables.
//!
//! # Example
//!
//! ```bash
//! # Report duplicates under two trees
//! finddup ~/Photos /mnt/backup/Photos
//!
//! # JSON output for scripting
//! finddup --output json ~/Downloads
//!
//! # Tighter limits on a small machine
//! finddup --memory-budget 64MiB --max-open-files 32 --io-threads 1 /data
//!
//! # Verbose mode for debugging
//! finddup -vv ~/Downloads
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Find duplicate files and directories by content, not by name.
///
/// Files are grouped by size and then compared byte for byte, a little
/// more of each file per pass. Directories whose contents are identical
/// are reported as duplicate directories.
#[derive(Debug, Parser)]
#[command(name = "finddup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Files or directories to search
    #[arg(value_name = "SEARCHPATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors and the report
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Configuration file (default: platform config dir)
    #[arg(long, value_name = "PATH", env = "FINDDUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Total bytes of comparison buffers (e.g., 512MiB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub memory_budget: Option<u64>,

    /// Maximum number of files held open at once
    #[arg(long, value_name = "N", value_parser = parse_positive)]
    pub max_open_files: Option<usize>,

    /// Number of size buckets compared in parallel
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N", value_parser = parse_positive)]
    pub io_threads: Option<usize>,

    /// Do not draw progress bars
    #[arg(long)]
    pub no_progress: bool,
}

impl Cli {
    /// Whether progress bars should be drawn for this invocation.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        !(self.quiet || self.no_progress || self.output == OutputFormat::Json)
    }
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text report
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use finddup::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("512MiB").unwrap(), 536_870_912);
/// assert_eq!(parse_size("1GiB").unwrap(), 1_073_741_824);
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    if !num.is_finite() || num < 0.0 {
        return Err("Size must be a non-negative number".to_string());
    }

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}

/// Parse a count that must be at least 1.
///
/// # Errors
///
/// Returns an error for non-numeric input or zero.
pub fn parse_positive(s: &str) -> Result<usize, String> {
    let n: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: '{s}'"))?;
    if n == 0 {
        return Err("Value must be at least 1".to_string());
    }
    Ok(n)
}

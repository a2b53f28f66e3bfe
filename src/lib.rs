//! finddup - duplicate files and directories by content
//!
//! Search roots are cataloged, regular files are bucketed by size, and
//! same-size files are compared byte for byte in growing chunks until
//! every bucket splits into identical groups. Directories are then
//! fingerprinted bottom-up from their children, so whole trees with the
//! same contents are reported as duplicates regardless of names.
//!
//! The library entry point is [`duplicates::DuplicateFinder`]; [`run_app`]
//! is the command-line front end built on it.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::duplicates::DuplicateFinder;
use crate::error::ExitCode;
use crate::output::{JsonOutput, TextReport};
use crate::progress::Progress;

/// Run finddup for parsed command-line arguments.
///
/// Writes the report to stdout and returns the exit code for a completed
/// run.
///
/// # Errors
///
/// Returns an error if configuration is invalid, a search path is
/// missing, the memory budget is too small, the run is interrupted, or
/// the report cannot be written. Use [`ExitCode::from_error`] to map it.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let start = Instant::now();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_cli_overrides(&cli);
    config.validate()?;
    log::debug!("Effective configuration: {config:?}");

    let handler = signal::install_handler()?;
    let mut finder_config = config.finder_config().with_shutdown_flag(handler.get_flag());
    if cli.show_progress() {
        finder_config = finder_config.with_progress_callback(Arc::new(Progress::new(false)));
    }

    let analysis = DuplicateFinder::new(finder_config).analyze_paths(&cli.paths)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.output {
        OutputFormat::Text => TextReport::new(&analysis)
            .write_to(&mut out)
            .context("Failed to write report")?,
        OutputFormat::Json => JsonOutput::new(&analysis, ExitCode::Success)
            .write_to(&mut out, true)
            .context("Failed to write JSON report")?,
    }
    out.flush()?;

    log::info!(
        "Compared {} in {} buckets, {} reclaimable",
        analysis.summary.bytes_read_display(),
        analysis.summary.buckets_compared,
        analysis.summary.reclaimable_display()
    );
    log::info!("Elapsed time: {:.2}s", start.elapsed().as_secs_f64());

    Ok(ExitCode::Success)
}

//! Report formatters.
//!
//! - [`text`]: the human-readable report
//! - [`json`]: the same classification for automation and scripting
//!
//! # Example
//!
//! ```no_run
//! use finddup::duplicates::DuplicateFinder;
//! use finddup::output::TextReport;
//! use std::path::PathBuf;
//!
//! let analysis = DuplicateFinder::with_defaults()
//!     .analyze_paths(&[PathBuf::from(".")])
//!     .unwrap();
//!
//! TextReport::new(&analysis)
//!     .write_to(&mut std::io::stdout().lock())
//!     .unwrap();
//! ```

pub mod json;
pub mod text;

pub use json::{JsonOutput, JsonOutputError};
pub use text::TextReport;

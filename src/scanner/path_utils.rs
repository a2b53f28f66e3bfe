//! Search-path normalization utilities.
//!
//! Raw search paths from the command line may be relative, repeated, or
//! nested inside one another. The catalog assumes mutually
//! non-overlapping roots, so this module:
//!
//! - makes every path absolute and lexically clean (`.` and `..` folded)
//! - removes exact duplicates
//! - removes any root contained in another root
//! - finds the lowest common ancestor used to shorten report paths
//!
//! Symbolic links are not resolved: a root that is itself a symlink is
//! cataloged as a symlink, never followed.
//!
//! # Example
//!
//! ```
//! use finddup::scanner::path_utils::normalize_search_paths;
//! use std::path::PathBuf;
//!
//! let roots = normalize_search_paths(&[
//!     PathBuf::from("/data/photos"),
//!     PathBuf::from("/data/photos/2019"),
//!     PathBuf::from("/data/backup/"),
//! ])
//! .unwrap();
//!
//! assert_eq!(roots.paths, vec![PathBuf::from("/data/backup"), PathBuf::from("/data/photos")]);
//! assert_eq!(roots.common_root, PathBuf::from("/data"));
//! ```

use std::io;
use std::path::{Component, Path, PathBuf};

/// Normalized, non-overlapping search roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoots {
    /// Absolute roots, sorted, none nested in another
    pub paths: Vec<PathBuf>,
    /// Lowest common ancestor directory of all roots
    pub common_root: PathBuf,
}

/// Normalize raw search paths.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined while
/// making a relative path absolute.
pub fn normalize_search_paths(raw: &[PathBuf]) -> io::Result<SearchRoots> {
    let mut absolute = raw
        .iter()
        .map(|p| std::path::absolute(p).map(|abs| normalize_lexically(&abs)))
        .collect::<io::Result<Vec<_>>>()?;

    absolute.sort();
    absolute.dedup();

    // Sorted order puts every ancestor before its descendants
    let mut paths: Vec<PathBuf> = Vec::with_capacity(absolute.len());
    for path in absolute {
        if paths.iter().any(|kept| path.starts_with(kept)) {
            log::debug!("Dropping nested search path: {}", path.display());
            continue;
        }
        paths.push(path);
    }

    let common_root = common_ancestor(&paths);
    Ok(SearchRoots { paths, common_root })
}

/// Fold `.` and `..` components without touching the filesystem.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Lowest common ancestor directory of `paths`.
///
/// A single root that is a file yields its parent directory.
#[must_use]
pub fn common_ancestor(paths: &[PathBuf]) -> PathBuf {
    let Some(first) = paths.first() else {
        return PathBuf::new();
    };

    let mut common: Vec<Component<'_>> = first.components().collect();
    for path in &paths[1..] {
        let shared = common
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        common.truncate(shared);
    }

    let mut root: PathBuf = common.iter().collect();
    if paths.len() == 1 && !root.is_dir() {
        if let Some(parent) = root.parent() {
            root = parent.to_path_buf();
        }
    }
    root
}

/// Render `path` relative to `root` for display.
///
/// Paths outside `root`, or a `root` of `/`, are shown unchanged.
#[must_use]
pub fn display_relative(path: &Path, root: &Path) -> String {
    if root.parent().is_none() {
        return path.display().to_string();
    }
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

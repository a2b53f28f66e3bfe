use filetime::{set_file_mtime, FileTime};
use finddup::duplicates::{Analysis, DuplicateFinder, FinderConfig, GroupKind};
use finddup::progress::ProgressCallback;
use finddup::scanner::UnprocessedReason;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

fn analyze(root: &Path) -> Analysis {
    DuplicateFinder::with_defaults()
        .analyze_paths(&[root.to_path_buf()])
        .unwrap()
}

/// Runs an action on each file when the named phase starts.
///
/// `"comparing"` fires after cataloging and before any byte is read;
/// `"verifying"` fires after resolution and before the re-stat.
struct AtPhaseStart<F: Fn(&Path) + Send + Sync> {
    phase: &'static str,
    paths: Vec<PathBuf>,
    action: F,
}

impl<F: Fn(&Path) + Send + Sync> ProgressCallback for AtPhaseStart<F> {
    fn on_phase_start(&self, phase: &str, _total: usize) {
        if phase == self.phase {
            for path in &self.paths {
                (self.action)(path);
            }
        }
    }
    fn on_progress(&self, _current: usize, _path: &str) {}
    fn on_phase_end(&self, _phase: &str) {}
}

#[test]
fn test_same_bytes_different_names() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("A");
    let b = dir.path().join("B");
    fs::create_dir(&a).unwrap();
    fs::create_dir(&b).unwrap();
    fs::write(a.join("fileX"), "hello").unwrap();
    fs::write(b.join("fileY"), "hello").unwrap();

    let analysis = DuplicateFinder::with_defaults()
        .analyze_paths(&[a.clone(), b.clone()])
        .unwrap();

    let groups = analysis.duplicate_groups();
    let file_group = groups.iter().find(|g| g.kind == GroupKind::File).unwrap();
    assert_eq!(file_group.members, vec![a.join("fileX"), b.join("fileY")]);

    let dir_group = groups
        .iter()
        .find(|g| g.kind == GroupKind::Directory)
        .unwrap();
    assert_eq!(dir_group.members, vec![a, b]);
    assert!(analysis.files.unique.is_empty());
    assert!(analysis.directories.unknown.is_empty());
}

#[test]
fn test_early_difference_resolved_in_first_pass() {
    let dir = tempdir().unwrap();
    let mut one = vec![b'x'; 4096];
    let mut two = one.clone();
    one[10] = b'1';
    two[10] = b'2';
    fs::write(dir.path().join("one.bin"), &one).unwrap();
    fs::write(dir.path().join("two.bin"), &two).unwrap();

    let analysis = analyze(dir.path());

    assert_eq!(analysis.files.unique.len(), 2);
    assert!(analysis.files.duplicates.is_empty());
    assert_eq!(analysis.summary.max_passes, 1);
    // Only the first 256-byte chunk of each file.
    assert_eq!(analysis.summary.bytes_read, 512);
}

#[test]
fn test_late_difference_needs_more_passes() {
    let dir = tempdir().unwrap();
    let mut one = vec![b'x'; 100_000];
    let mut two = one.clone();
    one[99_999] = b'1';
    two[99_999] = b'2';
    fs::write(dir.path().join("one.bin"), &one).unwrap();
    fs::write(dir.path().join("two.bin"), &two).unwrap();

    let analysis = analyze(dir.path());

    assert_eq!(analysis.files.unique.len(), 2);
    assert!(analysis.summary.max_passes >= 2);
    assert_eq!(analysis.summary.bytes_read, 200_000);
}

#[test]
fn test_ignored_file_does_not_break_directory_match() {
    let dir = tempdir().unwrap();
    let c = dir.path().join("C");
    let d = dir.path().join("D");
    fs::create_dir(&c).unwrap();
    fs::create_dir(&d).unwrap();
    fs::write(c.join("photo.jpg"), "pixels").unwrap();
    fs::write(d.join("photo.jpg"), "pixels").unwrap();
    fs::write(c.join(".DS_Store"), "finder junk").unwrap();

    let analysis = analyze(dir.path());

    assert_eq!(analysis.directories.duplicates.len(), 1);
    assert_eq!(analysis.directories.duplicates[0].members, vec![c.clone(), d]);
    assert!(analysis
        .unprocessed
        .iter()
        .any(|r| r.path == c.join(".DS_Store") && r.reason == UnprocessedReason::Ignored));
}

#[test]
fn test_modified_file_is_invalidated() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    let touched = sub.join("a.txt");
    let other = dir.path().join("b.txt");
    fs::write(&touched, "same").unwrap();
    fs::write(&other, "same").unwrap();

    let callback = Arc::new(AtPhaseStart {
        phase: "verifying",
        paths: vec![touched.clone()],
        action: |path: &Path| {
            set_file_mtime(path, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        },
    });
    let finder = DuplicateFinder::new(FinderConfig::default().with_progress_callback(callback));
    let analysis = finder.analyze_paths(&[dir.path().to_path_buf()]).unwrap();

    // The group dissolved; the untouched copy is now unique.
    assert!(analysis.files.duplicates.is_empty());
    assert!(analysis.files.unique.contains(&other));
    assert!(!analysis.files.unique.contains(&touched));

    let changed: Vec<_> = analysis
        .unprocessed
        .iter()
        .filter(|r| r.reason == UnprocessedReason::Changed)
        .collect();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].path, touched);

    assert!(analysis.directories.unknown.contains(&sub));
    assert!(analysis.directories.unknown.contains(dir.path()));
    assert_eq!(analysis.summary.invalidated, 1);
}

#[test]
fn test_vanished_file_poisons_ancestors() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("outer").join("P");
    let q = dir.path().join("Q");
    fs::create_dir_all(&p).unwrap();
    fs::create_dir(&q).unwrap();
    for base in [&p, &q] {
        fs::write(base.join("x"), "xxxx").unwrap();
        fs::write(base.join("y"), "yyyyyy").unwrap();
    }

    let gone = p.join("x");
    let callback = Arc::new(AtPhaseStart {
        phase: "verifying",
        paths: vec![gone.clone()],
        action: |path: &Path| fs::remove_file(path).unwrap(),
    });
    let finder = DuplicateFinder::new(FinderConfig::default().with_progress_callback(callback));
    let analysis = finder.analyze_paths(&[dir.path().to_path_buf()]).unwrap();

    assert!(analysis.directories.duplicates.is_empty());
    assert!(analysis.directories.unknown.contains(&p));
    assert!(analysis.directories.unknown.contains(&dir.path().join("outer")));
    assert!(analysis.directories.unknown.contains(dir.path()));
    assert!(analysis.directories.unique.contains(&q));
    assert!(analysis
        .unprocessed
        .iter()
        .any(|r| r.path == gone && r.reason == UnprocessedReason::Unreadable));
}

#[test]
fn test_read_failure_during_comparison_poisons_ancestors() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    let gone = sub.join("gone.txt");
    let sibling = sub.join("kept.txt");
    fs::write(&gone, "twin").unwrap();
    fs::write(&sibling, "twin").unwrap();
    let elsewhere = dir.path().join("Q");
    fs::create_dir(&elsewhere).unwrap();
    fs::write(elsewhere.join("solo"), "something longer").unwrap();

    let callback = Arc::new(AtPhaseStart {
        phase: "comparing",
        paths: vec![gone.clone()],
        action: |path: &Path| fs::remove_file(path).unwrap(),
    });
    let finder = DuplicateFinder::new(FinderConfig::default().with_progress_callback(callback));
    let analysis = finder.analyze_paths(&[dir.path().to_path_buf()]).unwrap();

    assert!(analysis
        .unprocessed
        .iter()
        .any(|r| r.path == gone && r.reason == UnprocessedReason::Unreadable));
    assert!(analysis.files.unique.contains(&sibling));
    assert!(analysis.files.duplicates.is_empty());
    assert!(analysis.directories.unknown.contains(&sub));
    assert!(analysis.directories.unknown.contains(dir.path()));
    assert!(analysis.directories.unique.contains(&elsewhere));
    // Resolution failures are not counted as invalidations.
    assert_eq!(analysis.summary.invalidated, 0);
}

#[test]
fn test_unique_sizes_open_nothing() {
    let dir = tempdir().unwrap();
    for (i, len) in [1usize, 10, 100, 1000].iter().enumerate() {
        fs::write(dir.path().join(format!("f{i}")), vec![b'z'; *len]).unwrap();
    }

    let analysis = analyze(dir.path());

    assert_eq!(analysis.files.unique.len(), 4);
    assert_eq!(analysis.summary.file_opens, 0);
    assert_eq!(analysis.summary.size_buckets, 4);
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("1"), "one").unwrap();
    fs::write(dir.path().join("a").join("2"), "one").unwrap();
    fs::write(dir.path().join("3"), "three").unwrap();
    fs::write(dir.path().join("4"), "four!").unwrap();

    let first = analyze(dir.path());
    let second = analyze(dir.path());

    assert_eq!(first.files, second.files);
    assert_eq!(first.directories, second.directories);
    assert_eq!(first.unprocessed, second.unprocessed);
    assert_eq!(first.summary.content_ids, second.summary.content_ids);
}

#[test]
fn test_identical_trees_nested() {
    let dir = tempdir().unwrap();
    for top in ["left", "right"] {
        let deep = dir.path().join(top).join("docs").join("2024");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("report.txt"), "quarterly numbers").unwrap();
        fs::write(dir.path().join(top).join("readme"), "read me").unwrap();
    }

    let analysis = analyze(dir.path());

    let dir_groups = &analysis.directories.duplicates;
    assert!(dir_groups
        .iter()
        .any(|g| g.members == vec![dir.path().join("left"), dir.path().join("right")]));
    assert!(dir_groups.iter().any(|g| g.members
        == vec![
            dir.path().join("left").join("docs"),
            dir.path().join("right").join("docs")
        ]));
}

#[test]
fn test_tight_handle_ceiling_still_resolves() {
    let dir = tempdir().unwrap();
    let body = vec![b'q'; 3000];
    for i in 0..5 {
        File::create(dir.path().join(format!("copy{i}")))
            .unwrap()
            .write_all(&body)
            .unwrap();
    }
    let mut odd = body.clone();
    odd[2999] = b'!';
    fs::write(dir.path().join("odd"), &odd).unwrap();

    let finder = DuplicateFinder::new(
        FinderConfig::default()
            .with_io_threads(1)
            .with_max_open_files(2)
            .with_chunk_sizes(16, 1, 64),
    );
    let analysis = finder.analyze_paths(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(analysis.files.duplicates.len(), 1);
    assert_eq!(analysis.files.duplicates[0].len(), 5);
    assert!(analysis.files.unique.contains(&dir.path().join("odd")));
    assert!(analysis.summary.max_passes > 1);
}

#[test]
fn test_parallel_workers_match_serial() {
    let dir = tempdir().unwrap();
    for i in 0..40 {
        let body = format!("content-{}", i % 7).repeat(i % 5 + 1);
        fs::write(dir.path().join(format!("f{i:02}")), body).unwrap();
    }

    let serial = DuplicateFinder::new(FinderConfig::default().with_io_threads(1))
        .analyze_paths(&[dir.path().to_path_buf()])
        .unwrap();
    let parallel = DuplicateFinder::new(FinderConfig::default().with_io_threads(8))
        .analyze_paths(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(serial.files, parallel.files);
    assert_eq!(serial.directories, parallel.directories);
}

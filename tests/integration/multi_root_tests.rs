use finddup::duplicates::{DuplicateFinder, GroupKind};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_loose_file_roots_are_compared() {
    let dir = tempdir().unwrap();
    let left = dir.path().join("left");
    let right = dir.path().join("right");
    fs::create_dir(&left).unwrap();
    fs::create_dir(&right).unwrap();
    let a = left.join("a.dat");
    let b = right.join("b.dat");
    fs::write(&a, "identical bytes").unwrap();
    fs::write(&b, "identical bytes").unwrap();

    let analysis = DuplicateFinder::with_defaults()
        .analyze_paths(&[a.clone(), b.clone()])
        .unwrap();

    assert_eq!(analysis.files.duplicates.len(), 1);
    assert_eq!(analysis.files.duplicates[0].members, vec![a, b]);
    // Loose files belong to no directory tree.
    assert!(analysis.directories.duplicates.is_empty());
    assert!(analysis.directories.unique.is_empty());
    assert_eq!(analysis.roots.common_root, dir.path());
}

#[test]
fn test_single_loose_file_root() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("only.txt");
    fs::write(&file, "alone").unwrap();

    let analysis = DuplicateFinder::with_defaults()
        .analyze_paths(&[file.clone()])
        .unwrap();

    assert!(analysis.files.unique.contains(&file));
    assert_eq!(analysis.roots.common_root, dir.path());
}

#[test]
fn test_nested_and_repeated_roots_are_collapsed() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("f1"), "abc").unwrap();
    fs::write(dir.path().join("f2"), "abc").unwrap();

    let analysis = DuplicateFinder::with_defaults()
        .analyze_paths(&[
            dir.path().to_path_buf(),
            sub.clone(),
            dir.path().join("sub").join("..").join("sub"),
            dir.path().to_path_buf(),
        ])
        .unwrap();

    assert_eq!(analysis.roots.paths, vec![dir.path().to_path_buf()]);
    assert_eq!(analysis.summary.files_cataloged, 2);
    assert_eq!(analysis.files.duplicates.len(), 1);
}

#[test]
fn test_sibling_roots_share_common_root() {
    let dir = tempdir().unwrap();
    let photos = dir.path().join("home").join("photos");
    let backup = dir.path().join("mnt").join("backup");
    fs::create_dir_all(&photos).unwrap();
    fs::create_dir_all(&backup).unwrap();
    fs::write(photos.join("img.raw"), "raw sensor data").unwrap();
    fs::write(backup.join("img-copy.raw"), "raw sensor data").unwrap();

    let analysis = DuplicateFinder::with_defaults()
        .analyze_paths(&[photos.clone(), backup.clone()])
        .unwrap();

    assert_eq!(analysis.roots.common_root, dir.path());
    let groups = analysis.duplicate_groups();
    assert!(groups
        .iter()
        .any(|g| g.kind == GroupKind::Directory && g.members == vec![photos.clone(), backup.clone()]));
}

#[test]
fn test_root_directory_contents_compared_across_roots() {
    let dir = tempdir().unwrap();
    let one = dir.path().join("one");
    let two = dir.path().join("two");
    fs::create_dir_all(one.join("inner")).unwrap();
    fs::create_dir_all(&two).unwrap();
    fs::write(one.join("inner").join("x"), "payload").unwrap();
    fs::write(two.join("y"), "payload").unwrap();

    let analysis = DuplicateFinder::with_defaults()
        .analyze_paths(&[one.clone(), two.clone()])
        .unwrap();

    // one/inner and two hold the same single file.
    assert!(analysis
        .directories
        .duplicates
        .iter()
        .any(|g| g.members == vec![one.join("inner"), two.clone()]));
    assert!(analysis.directories.unique.contains(&one));
}

use finddup::duplicates::DuplicateFinder;
use finddup::error::ExitCode;
use finddup::output::{JsonOutput, TextReport};
use std::fs;
use std::path::MAIN_SEPARATOR;
use tempfile::tempdir;

#[test]
fn test_text_report_end_to_end() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("A");
    let b = dir.path().join("B");
    fs::create_dir(&a).unwrap();
    fs::create_dir(&b).unwrap();
    fs::write(a.join("fileX"), "hello").unwrap();
    fs::write(b.join("fileY"), "hello").unwrap();
    fs::write(dir.path().join("lonely.txt"), "nobody else").unwrap();
    fs::write(dir.path().join("Thumbs.db"), "cache").unwrap();

    let analysis = DuplicateFinder::with_defaults()
        .analyze_paths(&[dir.path().to_path_buf()])
        .unwrap();
    let text = TextReport::new(&analysis).render().unwrap();
    let sep = MAIN_SEPARATOR;

    assert!(text.starts_with(&format!(
        "All file paths referenced from:\n{}\n",
        dir.path().display()
    )));
    assert!(text.contains(&format!("  A{sep}\n  B{sep}\n")));
    assert!(text.contains(&format!("  A{sep}fileX\n  B{sep}fileY\n")));
    assert!(text.contains("Unique Files/Directories:\n"));
    assert!(text.contains("lonely.txt\n"));
    assert!(text.contains(&format!(
        "Ignored Files\n  {}\n",
        dir.path().join("Thumbs.db").display()
    )));
    assert!(!text.contains("Unknown Dirs"));
}

#[test]
fn test_duplicate_sets_sorted_by_size() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("big1"), vec![b'b'; 20_000]).unwrap();
    fs::write(dir.path().join("big2"), vec![b'b'; 20_000]).unwrap();
    fs::write(dir.path().join("small1"), "s").unwrap();
    fs::write(dir.path().join("small2"), "s").unwrap();

    let analysis = DuplicateFinder::with_defaults()
        .analyze_paths(&[dir.path().to_path_buf()])
        .unwrap();
    let text = TextReport::new(&analysis).render().unwrap();

    let big = text.find("  big1\n").unwrap();
    let small = text.find("  small1\n").unwrap();
    assert!(big < small);
}

#[test]
fn test_json_report_end_to_end() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("one"), "same").unwrap();
    fs::write(dir.path().join("two"), "same").unwrap();

    let analysis = DuplicateFinder::with_defaults()
        .analyze_paths(&[dir.path().to_path_buf()])
        .unwrap();
    let output = JsonOutput::new(&analysis, ExitCode::Success);

    let mut buffer = Vec::new();
    output.write_to(&mut buffer, true).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

    let members = value["duplicates"][0]["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(
        members[0].as_str().unwrap(),
        dir.path().join("one").to_string_lossy()
    );
    assert_eq!(value["duplicates"][0]["kind"], "file");
    assert_eq!(value["summary"]["files_cataloged"], 2);
    assert_eq!(value["summary"]["buckets_compared"], 1);
    assert_eq!(value["exit_code_name"], "FD000");
}

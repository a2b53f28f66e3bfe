use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use finddup::config::{Config, ConfigError};
use finddup::duplicates::DuplicateFinder;
use finddup::scanner::UnprocessedReason;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.io_threads, 4);
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("FINDDUP_ENVTEST_IO_THREADS", "16");
    std::env::set_var("FINDDUP_ENVTEST_MEMORY_BUDGET", "4096");

    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("FINDDUP_ENVTEST_"));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.io_threads, 16);
    assert_eq!(config.memory_budget, 4096);

    std::env::remove_var("FINDDUP_ENVTEST_IO_THREADS");
    std::env::remove_var("FINDDUP_ENVTEST_MEMORY_BUDGET");
}

#[test]
fn test_env_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "max_open_files = 10\nio_threads = 3\n").unwrap();
    std::env::set_var("FINDDUP_LAYERTEST_IO_THREADS", "5");

    let config = Config::from_figment(
        &Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("FINDDUP_LAYERTEST_")),
    )
    .unwrap();

    assert_eq!(config.max_open_files, 10);
    assert_eq!(config.io_threads, 5);

    std::env::remove_var("FINDDUP_LAYERTEST_IO_THREADS");
}

#[test]
fn test_explicit_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("finddup.toml");
    fs::write(
        &path,
        "memory_budget = 1048576\nfirst_chunk_size = 64\nmin_chunk_size = 8\nmax_chunk_size = 4096\n",
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.memory_budget, 1_048_576);
    assert_eq!(config.first_chunk_size, 64);
    assert_eq!(config.min_chunk_size, 8);
    assert_eq!(config.max_chunk_size, 4096);
}

#[test]
fn test_invalid_chunk_sizes_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("finddup.toml");
    fs::write(&path, "min_chunk_size = 100\nmax_chunk_size = 10\n").unwrap();

    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_custom_ignore_names_reach_the_catalog() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("desktop.ini"), "[.ShellClassInfo]").unwrap();
    fs::write(dir.path().join(".DS_Store"), "finder").unwrap();

    let config = Config {
        ignore_names: vec!["desktop.ini".to_string()],
        ..Config::default()
    };
    let analysis = DuplicateFinder::new(config.finder_config())
        .analyze_paths(&[dir.path().to_path_buf()])
        .unwrap();

    let ignored: Vec<_> = analysis
        .unprocessed
        .iter()
        .filter(|r| r.reason == UnprocessedReason::Ignored)
        .map(|r| r.path.clone())
        .collect();
    assert_eq!(ignored, vec![dir.path().join("desktop.ini")]);
    assert!(analysis.files.unique.contains(&dir.path().join(".DS_Store")));
}

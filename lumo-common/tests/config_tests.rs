//! Configuration loading tests

use lumo_common::config::CatalogConfig;
use serial_test::serial;
use std::io::Write;

#[test]
#[serial]
fn loads_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        r#"
        parallel = true
        max_workers = 4
        upstream_timeout_seconds = 9
        publisher_managed_partners = ["edu", "corp"]
        "#
    )
    .unwrap();

    let config = CatalogConfig::load(Some(&path)).unwrap();
    assert!(config.parallel);
    assert_eq!(config.max_workers, 4);
    assert_eq!(config.upstream_timeout_seconds, 9);
    assert!(config.publisher_managed_partners.contains("edu"));
    assert!(config.publisher_managed_partners.contains("corp"));
    // Unspecified keys keep their defaults
    assert_eq!(config.retry_max_attempts, 5);
    assert!(config.sweep_orphans);
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let config = CatalogConfig::load(Some(&path)).unwrap();
    assert!(!config.parallel);
    assert_eq!(config.max_workers, 7);
}

#[test]
#[serial]
fn environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.toml");
    std::fs::write(&path, "max_workers = 4\n").unwrap();

    std::env::set_var("LUMO_MAX_WORKERS", "11");
    let config = CatalogConfig::load(Some(&path)).unwrap();
    std::env::remove_var("LUMO_MAX_WORKERS");

    assert_eq!(config.max_workers, 11);
}

#[test]
#[serial]
fn invalid_threshold_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.toml");
    std::fs::write(&path, "change_threshold_fraction = 1.5\n").unwrap();

    assert!(CatalogConfig::load(Some(&path)).is_err());
}

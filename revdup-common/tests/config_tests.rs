//! Configuration loading and root folder resolution
//!
//! Uses serial_test: tests touching REVDUP_ROOT run sequentially.

use revdup_common::config::{
    init_project_settings, load_project_settings, resolve_root_folder, save_project_settings, ProjectSettings,
    SameSourcePolicy, ROOT_ENV_VAR, SETTINGS_FILE,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_env_var_used_without_cli_arg() {
    env::set_var(ROOT_ENV_VAR, "/tmp/revdup-env-root");
    let root = resolve_root_folder(None, ROOT_ENV_VAR);
    env::remove_var(ROOT_ENV_VAR);

    assert_eq!(root, PathBuf::from("/tmp/revdup-env-root"));
}

#[test]
#[serial]
fn test_cli_arg_overrides_env_var() {
    env::set_var(ROOT_ENV_VAR, "/tmp/revdup-env-root");
    let root = resolve_root_folder(Some("/tmp/revdup-cli-root"), ROOT_ENV_VAR);
    env::remove_var(ROOT_ENV_VAR);

    assert_eq!(root, PathBuf::from("/tmp/revdup-cli-root"));
}

#[test]
#[serial]
fn test_default_root_is_not_empty() {
    env::remove_var(ROOT_ENV_VAR);
    let root = resolve_root_folder(None, ROOT_ENV_VAR);
    assert!(!root.as_os_str().is_empty());
}

#[test]
fn test_missing_settings_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = load_project_settings(dir.path()).unwrap();
    assert_eq!(settings, ProjectSettings::default());
}

#[test]
fn test_settings_round_trip_through_toml() {
    let dir = TempDir::new().unwrap();
    let mut settings = ProjectSettings::default();
    settings.dedupe.same_source_policy = SameSourcePolicy::Warn;
    settings.dedupe.preferred_masterdata_sources = vec!["crossref".to_string()];
    settings.dedupe.merge_threshold = 0.85;

    save_project_settings(dir.path(), &settings).unwrap();
    let loaded = load_project_settings(dir.path()).unwrap();

    assert_eq!(loaded, settings);
}

#[test]
fn test_invalid_settings_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(SETTINGS_FILE),
        "[dedupe]\nnon_dup_threshold = 0.99\ndup_threshold = 0.5\n",
    )
    .unwrap();

    let err = load_project_settings(dir.path()).unwrap_err();
    assert!(matches!(err, revdup_common::Error::Config(_)));
}

#[test]
fn test_init_writes_defaults_once() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("review");

    assert!(init_project_settings(&root).unwrap());
    assert!(root.join(SETTINGS_FILE).exists());
    assert_eq!(load_project_settings(&root).unwrap(), ProjectSettings::default());

    let mut edited = ProjectSettings::default();
    edited.dedupe.merge_threshold = 0.9;
    save_project_settings(&root, &edited).unwrap();
    assert!(!init_project_settings(&root).unwrap());
    assert_eq!(load_project_settings(&root).unwrap(), edited);
}

//! Integration tests for layered configuration loading

use crate::integration::test_utils::with_env;
use tabsum::config::{ConfigLoader, SummaryLength, SummaryStyle};
use tabsum::error::PipelineError;
use tempfile::TempDir;

fn write(path: &std::path::Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn test_defaults_without_any_files() {
    let temp_dir = TempDir::new().unwrap();
    let config = with_env(temp_dir.path(), &[], || {
        ConfigLoader::load(&temp_dir.path().join("workspace")).unwrap()
    });

    assert_eq!(config.service.endpoint, "http://localhost:11434");
    assert_eq!(config.summarizer.chunk_size, 4000);
    assert_eq!(config.summarizer.merge_threshold, 5);
    assert_eq!(config.summarizer.style, SummaryStyle::Tldr);
    assert_eq!(config.summarizer.chunk_timeout_ms, None);
    assert_eq!(config.query.relevance_token, "YES");
}

#[test]
fn test_workspace_files_override_global() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write(
        &temp_dir.path().join("tabsum").join("config.toml"),
        r#"
[service]
model = "global-model"

[summarizer]
chunk_size = 1000
"#,
    );
    write(
        &workspace.join("config").join("config.toml"),
        r#"
[summarizer]
chunk_size = 2000
style = "key-points"
"#,
    );
    write(
        &workspace.join("config").join("staging.toml"),
        r#"
[summarizer]
length = "long"
"#,
    );

    let config = with_env(temp_dir.path(), &[("TABSUM_ENV", "staging")], || {
        ConfigLoader::load(&workspace).unwrap()
    });

    assert_eq!(config.service.model, "global-model");
    assert_eq!(config.summarizer.chunk_size, 2000);
    assert_eq!(config.summarizer.style, SummaryStyle::KeyPoints);
    assert_eq!(config.summarizer.length, SummaryLength::Long);
}

#[test]
fn test_environment_overrides_files() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write(
        &workspace.join("config").join("config.toml"),
        "[summarizer]\nmerge_threshold = 8\n",
    );

    let config = with_env(
        temp_dir.path(),
        &[("TABSUM__SUMMARIZER__MERGE_THRESHOLD", "3")],
        || ConfigLoader::load(&workspace).unwrap(),
    );

    assert_eq!(config.summarizer.merge_threshold, 3);
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("tabsum.toml");
    write(
        &file,
        r#"
[service]
endpoint = "http://gpu-box:11434"
max_download_rounds = 1

[summarizer]
chunk_timeout_ms = 30000
streaming = true

[storage]
cache_path = "/tmp/tabsum-test-cache"
"#,
    );

    let config = with_env(temp_dir.path(), &[], || ConfigLoader::load_from_file(&file).unwrap());

    assert_eq!(config.service.endpoint, "http://gpu-box:11434");
    assert_eq!(config.service.max_download_rounds, 1);
    assert_eq!(config.summarizer.chunk_timeout_ms, Some(30000));
    assert!(config.summarizer.streaming);
    assert_eq!(
        config.storage.cache_path,
        std::path::PathBuf::from("/tmp/tabsum-test-cache")
    );
}

#[test]
fn test_invalid_values_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("tabsum.toml");
    write(&file, "[summarizer]\nchunk_size = 0\n\n[query]\nrelevance_token = \"\"\n");

    let result = with_env(temp_dir.path(), &[], || ConfigLoader::load_from_file(&file));

    match result {
        Err(PipelineError::ConfigError(message)) => {
            assert!(message.contains("chunk_size"));
            assert!(message.contains("relevance_token"));
        }
        other => panic!("expected validation error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = ConfigLoader::load_from_file(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(PipelineError::ConfigError(_))));
}

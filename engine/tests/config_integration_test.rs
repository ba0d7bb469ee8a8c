//! Integration tests for configuration loading

use std::fs;
use tempfile::TempDir;

use bindery_engine::config::Config;
use sdk::errors::EngineError;

fn write_config(temp: &TempDir, body: &str) -> std::path::PathBuf {
    let path = temp.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_full_config_file() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().display();
    let path = write_config(
        &temp,
        &format!(
            r#"
[core]
log_level = "debug"
data_dir = "{root}/data"

[llm]
base_url = "http://localhost:9999/v1"
api_key_env = "BINDERY_TEST_KEY"
fast_model = "fast-1"
standard_model = "standard-1"
deep_model = "deep-1"
max_output_tokens = 8000
reasoning_budget_tokens = 4000
timeout_secs = 60

[agent]
max_iterations = 4

[jobs]
program = "/usr/bin/python3"
base_args = ["run.py", "--quiet"]
working_dir = "{root}/work"
model_dir = "{root}/models"
upload_dir = "{root}/uploads"
output_dir = "{root}/outputs"
timeout_secs = 120
exit_grace_secs = 5
artifact_prefix = "binder"

[registry]
base_url = "http://localhost:8888/download"
timeout_secs = 5
"#
        ),
    );

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.llm.standard_model, "standard-1");
    assert_eq!(config.llm.reasoning_budget_tokens, 4000);
    assert_eq!(config.agent.max_iterations, 4);
    assert_eq!(config.jobs.base_args, vec!["run.py", "--quiet"]);
    assert_eq!(config.jobs.artifact_prefix, "binder");
    assert_eq!(config.registry.timeout_secs, 5);

    // directories the engine writes to are created on load
    assert!(temp.path().join("data").is_dir());
    assert!(temp.path().join("uploads").is_dir());
    assert!(temp.path().join("outputs").is_dir());
    assert_eq!(config.database_path(), temp.path().join("data").join("bindery.db"));
}

#[test]
fn test_partial_config_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().display();
    let path = write_config(
        &temp,
        &format!(
            r#"
[core]
data_dir = "{root}/data"

[jobs]
upload_dir = "{root}/uploads"
output_dir = "{root}/outputs"
"#
        ),
    );

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.llm.fast_model, "claude-haiku-4-5-20251001");
    assert_eq!(config.llm.max_output_tokens, 16000);
    assert_eq!(config.agent.max_iterations, 15);
    assert_eq!(config.jobs.timeout_secs, 600);
    assert_eq!(config.jobs.artifact_prefix, "design");
}

#[test]
fn test_invalid_values_are_rejected() {
    let temp = TempDir::new().unwrap();

    let cases = [
        "[agent]\nmax_iterations = 0",
        "[core]\nlog_level = \"loud\"",
        "[llm]\nmax_output_tokens = 1000\nreasoning_budget_tokens = 1000",
        "[llm]\nstandard_model = \"  \"",
        "[jobs]\ntimeout_secs = 0",
    ];

    for case in cases {
        let path = write_config(&temp, case);
        let result = Config::load_from_path(&path);
        assert!(
            matches!(result, Err(EngineError::Config(_))),
            "accepted invalid config: {}",
            case
        );
    }
}

#[test]
fn test_missing_and_malformed_files() {
    let temp = TempDir::new().unwrap();

    let missing = Config::load_from_path(&temp.path().join("absent.toml"));
    assert!(matches!(missing, Err(EngineError::Config(_))));

    let path = write_config(&temp, "[core\nlog_level = ");
    let malformed = Config::load_from_path(&path);
    assert!(matches!(malformed, Err(EngineError::Config(_))));
}

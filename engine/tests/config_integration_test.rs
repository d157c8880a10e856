//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be properly loaded,
//! validated, and processed with path expansion and canonicalization.

use forge_engine::config::{BusyPolicy, Config};
use sdk::errors::EngineError;
use tempfile::TempDir;

fn config_toml(temp: &TempDir, extra: &str) -> String {
    format!(
        r#"
[core]
workspace = '{}'
log_level = "debug"
data_dir = '{}'

[llm]
default_provider = "gemini"
max_tokens = 2048

[llm.gemini]
base_url = "http://localhost:9999/v1beta"
model = "gemini-1.5-flash"
{}
"#,
        temp.path().join("workspace").display(),
        temp.path().join("data").display(),
        extra
    )
}

#[test]
fn test_config_toml_parsing() {
    let temp = TempDir::new().unwrap();
    let config = Config::from_toml_str(&config_toml(
        &temp,
        r#"
[agent]
max_iterations = 4
busy_policy = "reject"
parallel_tools = true

[workspace]
category_order = [" Research ", "", "ideas"]

[memory]
max_results = 5

[memory.weights]
lexical = 0.6
"#,
    ))
    .unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.llm.default_provider, "gemini");
    assert_eq!(config.llm.max_tokens, 2048);
    assert_eq!(config.llm.gemini.model, "gemini-1.5-flash");
    assert_eq!(
        config.llm.anthropic.base_url,
        "https://api.anthropic.com/v1"
    );

    assert_eq!(config.agent.max_iterations, 4);
    assert_eq!(config.agent.llm_timeout_secs, 120);
    assert_eq!(config.agent.busy_policy, BusyPolicy::Reject);
    assert!(config.agent.parallel_tools);

    assert_eq!(config.workspace.category_order, vec!["research", "ideas"]);

    assert_eq!(config.memory.max_results, 5);
    assert_eq!(config.memory.weights.lexical, 0.6);
    assert_eq!(config.memory.weights.importance, 0.3);
    assert!(config.memory.capture_on_edit);
}

#[test]
fn test_defaults_when_sections_missing() {
    let temp = TempDir::new().unwrap();
    let config = Config::from_toml_str(&config_toml(&temp, "")).unwrap();

    assert_eq!(config.agent.max_iterations, 10);
    assert_eq!(config.agent.busy_policy, BusyPolicy::Queue);
    assert_eq!(config.memory.max_results, 15);
    assert_eq!(config.memory.recency_scale_days, 30.0);
    assert_eq!(config.memory.entity_match_increment, 0.5);
    assert_eq!(config.workspace.category_order[0], "inbox");
}

#[test]
fn test_paths_are_created_and_canonical() {
    let temp = TempDir::new().unwrap();
    let config = Config::from_toml_str(&config_toml(&temp, "")).unwrap();

    assert!(config.core.workspace.is_dir());
    assert!(config.core.workspace.is_absolute());
    assert!(config.core.data_dir.is_dir());
    assert_eq!(
        config.database_path(),
        config.core.data_dir.join("forge.db")
    );
}

#[test]
fn test_invalid_values_are_rejected() {
    let temp = TempDir::new().unwrap();

    let cases = [
        "[agent]\nmax_iterations = 0\n",
        "[agent]\nllm_timeout_secs = 0\n",
        "[memory]\nmax_results = 0\n",
        "[memory]\nrecency_scale_days = 0.0\n",
        "[memory]\nentity_match_increment = 1.5\n",
        "[memory.weights]\nentity = -0.1\n",
    ];

    for extra in cases {
        let result = Config::from_toml_str(&config_toml(&temp, extra));
        assert!(
            matches!(result, Err(EngineError::Config(_))),
            "expected rejection for {:?}",
            extra
        );
    }
}

#[test]
fn test_unknown_provider_is_rejected() {
    let temp = TempDir::new().unwrap();
    let toml = config_toml(&temp, "").replace("\"gemini\"\nmax_tokens", "\"ollama\"\nmax_tokens");

    let err = Config::from_toml_str(&toml).unwrap_err();
    assert!(err.to_string().contains("ollama"));
}

#[test]
fn test_load_or_create_writes_portable_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.toml");

    let config = Config::load_or_create_at(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.llm.default_provider, "anthropic");

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("~/forge-workspace"));

    let reloaded = Config::load_or_create_at(&path).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_for_directories() {
    let temp = TempDir::new().unwrap();
    let config =
        Config::for_directories(&temp.path().join("ws"), &temp.path().join("data")).unwrap();

    assert!(config.core.workspace.ends_with("ws"));
    assert!(config.core.data_dir.exists());
}

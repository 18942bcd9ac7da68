//! Exercises `ApiConfig::load()`'s `.env` file behavior from a real temp
//! directory, the way the teacher's own test suite layers `tempfile` on top
//! of `dotenvy`. Changes the process's current directory, so every test here
//! is `#[serial]`: run in parallel, two of these would stomp on each other's
//! `cwd` and env vars.

use serial_test::serial;
use std::io::Write;
use voxcore::config::{ApiConfig, ConfigError};

fn with_temp_cwd(dotenv_contents: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    let mut env_file = std::fs::File::create(dir.path().join(".env")).expect("create .env");
    env_file
        .write_all(dotenv_contents.as_bytes())
        .expect("write .env");
    dir
}

#[test]
#[serial]
fn loads_api_key_from_dotenv_file_in_cwd() {
    std::env::remove_var("REMOTE_AI_API_KEY");
    let dir = with_temp_cwd("REMOTE_AI_API_KEY=sk-test-from-dotenv\n");
    let original_cwd = std::env::current_dir().expect("read cwd");
    std::env::set_current_dir(dir.path()).expect("chdir into temp dir");

    let result = ApiConfig::load();

    std::env::set_current_dir(original_cwd).expect("restore cwd");
    std::env::remove_var("REMOTE_AI_API_KEY");

    let config = result.expect("config should load from .env");
    assert_eq!(config.remote_api_key(), "sk-test-from-dotenv");
}

#[test]
#[serial]
fn missing_env_var_and_missing_dotenv_file_is_reported() {
    std::env::remove_var("REMOTE_AI_API_KEY");
    let dir = tempfile::tempdir().expect("create temp dir");
    let original_cwd = std::env::current_dir().expect("read cwd");
    std::env::set_current_dir(dir.path()).expect("chdir into temp dir");

    let result = ApiConfig::load();

    std::env::set_current_dir(original_cwd).expect("restore cwd");

    match result {
        Err(ConfigError::MissingEnvVar(var)) => assert_eq!(var, "REMOTE_AI_API_KEY"),
        other => panic!("expected MissingEnvVar, got {other:?}"),
    }
}

#[test]
#[serial]
fn process_env_var_takes_precedence_over_absent_dotenv() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let original_cwd = std::env::current_dir().expect("read cwd");
    std::env::set_current_dir(dir.path()).expect("chdir into temp dir");
    std::env::set_var("REMOTE_AI_API_KEY", "sk-test-from-process-env");

    let result = ApiConfig::load();

    std::env::set_current_dir(original_cwd).expect("restore cwd");
    std::env::remove_var("REMOTE_AI_API_KEY");

    let config = result.expect("config should load from process env");
    assert_eq!(config.remote_api_key(), "sk-test-from-process-env");
}

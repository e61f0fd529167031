use figment::providers::Serialized;
use scanguard::cache::DisabledCache;
use scanguard::config::{ConfigError, Settings, ENV_PREFIX};
use scanguard::progress::NoOpProgress;
use scanguard::resilience::{ClassifyError, ErrorAction, ErrorPolicy};
use scanguard::signal::CancellationToken;
use std::fs;
use std::io;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = figment::Figment::from(Serialized::defaults(Settings::default()));
    let settings: Settings = figment.extract().unwrap();
    assert_eq!(settings.io_threads, 4);
    assert!(settings.retry.enabled);
    assert!(settings.breaker.stop_on_open);
    assert!(settings.cache.enabled);
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("SCANGUARD_IO_THREADS", "16");
    // Use double underscore for nesting
    std::env::set_var("SCANGUARD_RETRY__MAX_RETRIES", "9");
    std::env::set_var("SCANGUARD_BREAKER__ENABLED", "false");

    use figment::{providers::Env, Figment};
    let figment = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let settings: Settings = figment.extract().unwrap();

    assert_eq!(settings.io_threads, 16);
    assert_eq!(settings.retry.max_retries, 9);
    assert!(!settings.breaker.enabled);
    assert!(settings.build_breaker().is_none());

    // Clean up
    std::env::remove_var("SCANGUARD_IO_THREADS");
    std::env::remove_var("SCANGUARD_RETRY__MAX_RETRIES");
    std::env::remove_var("SCANGUARD_BREAKER__ENABLED");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
io_threads = 8

[retry]
max_retries = 1
retry_delay_ms = 20

[breaker]
failure_threshold = 2
stop_on_open = false

[cache]
enabled = false
"#;
    fs::write(&config_path, toml_content).unwrap();

    let settings = Settings::load_isolated(Some(&config_path)).unwrap();

    assert_eq!(settings.io_threads, 8);
    assert_eq!(settings.retry.max_retries, 1);
    assert_eq!(settings.retry.retry_delay_ms, 20);
    assert_eq!(settings.breaker.failure_threshold, 2);
    assert!(!settings.breaker.stop_on_open);
    // Unset fields keep their defaults
    assert!(settings.breaker.enabled);
    assert_eq!(settings.breaker.open_timeout_ms, 30_000);
    assert!(!settings.cache.enabled);
}

#[test]
fn test_config_save_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let mut settings = Settings::default();
    settings.io_threads = 2;
    settings.retry.enabled = false;
    settings.save(&config_path).unwrap();

    let saved_content = fs::read_to_string(&config_path).unwrap();
    assert!(saved_content.contains("io_threads = 2"));
    assert!(saved_content.contains("[retry]"));
    assert!(saved_content.contains("enabled = false"));
}

#[test]
fn test_config_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "invalid = toml").unwrap();

    let err = Settings::load_isolated(Some(&config_path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_config_wrong_type() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = \"many\"").unwrap();

    assert!(Settings::load_isolated(Some(&config_path)).is_err());
}

#[test]
fn test_config_out_of_range_rejected_on_load() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[retry]\nretry_delay_ms = 0\n").unwrap();

    let err = Settings::load_isolated(Some(&config_path)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("retry_delay_ms"));
}

#[test]
fn test_disabled_retry_builds_no_retry_policy() {
    let mut settings = Settings::default();
    settings.retry.enabled = false;

    let policy = settings.build_policy();
    let err = io::Error::new(io::ErrorKind::TimedOut, "slow share");
    assert_eq!(err.error_kind(), scanguard::resilience::ErrorKind::Timeout);
    assert!(!policy.should_retry(&err, 1));
    assert_eq!(policy.handle_error(&err, "read", 1).action(), ErrorAction::Skip);
}

#[test]
fn test_batch_config_wiring() {
    let mut settings = Settings::default();
    settings.io_threads = 3;
    settings.breaker.stop_on_open = false;

    let config = settings.batch_config(
        Arc::new(DisabledCache),
        CancellationToken::new(),
        Arc::new(NoOpProgress),
    );

    assert_eq!(config.io_threads, 3);
    assert!(!config.stop_on_open_circuit);
    assert!(!config.cache.is_enabled());
    let breaker = config.breaker.as_ref().unwrap();
    assert_eq!(breaker.name(), "analysis");
    assert_eq!(breaker.failure_threshold(), 5);
}

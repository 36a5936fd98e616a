// Config loading and validation tests

use safetytwin_agent::config::AppConfig;
use std::path::Path;

const VALID_CONFIG: &str = r#"
[agent]
interval_secs = 30
shutdown_grace_ms = 250
stats_log_interval_secs = 60

[delivery]
endpoint = "https://collector.example:8443/api/v1/update_state"
timeout_secs = 5
max_retries = 2
backoff_base_ms = 200

[retention]
state_dir = "/tmp/states"
capacity = 20

[sources]
docker = false

[classifier]
extra_keywords = ["diffusion"]
extra_patterns = ["^triton"]

[logging]
verbose = true
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.agent.interval_secs, 30);
    assert_eq!(config.agent.shutdown_grace().as_millis(), 250);
    assert_eq!(
        config.delivery.endpoint,
        "https://collector.example:8443/api/v1/update_state"
    );
    assert_eq!(config.delivery.max_retries, 2);
    assert_eq!(config.delivery.backoff_base().as_millis(), 200);
    assert_eq!(config.retention.state_dir, Path::new("/tmp/states"));
    assert_eq!(config.retention.capacity, 20);
    assert!(!config.sources.docker);
    assert!(config.sources.systemd);
    assert_eq!(config.classifier.extra_keywords, vec!["diffusion"]);
    assert!(config.logging.verbose);
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = AppConfig::load_from_str("").expect("defaults");
    assert_eq!(config.agent.interval_secs, 10);
    assert_eq!(config.agent.shutdown_grace_ms, 500);
    assert_eq!(
        config.delivery.endpoint,
        "http://localhost:5678/api/v1/update_state"
    );
    assert_eq!(config.delivery.timeout_secs, 10);
    assert_eq!(config.delivery.max_retries, 3);
    assert_eq!(config.delivery.backoff_base_ms, 1000);
    assert_eq!(
        config.retention.state_dir,
        Path::new("/var/lib/safetytwin/states")
    );
    assert_eq!(config.retention.capacity, 10);
    let s = &config.sources;
    assert!(s.hardware && s.processes && s.services && s.gpu && s.systemd && s.docker);
    assert!(!config.logging.verbose);
}

#[test]
fn test_config_validation_rejects_interval_zero() {
    let bad = VALID_CONFIG.replace("interval_secs = 30", "interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("agent.interval_secs"));
}

#[test]
fn test_config_validation_rejects_oversized_intervals() {
    let bad = VALID_CONFIG.replace("interval_secs = 30", "interval_secs = 86401");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("agent.interval_secs"));

    let bad = VALID_CONFIG.replace(
        "stats_log_interval_secs = 60",
        "stats_log_interval_secs = 9223372036854775807",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("agent.stats_log_interval_secs"));

    let bad = VALID_CONFIG.replace("shutdown_grace_ms = 250", "shutdown_grace_ms = 3600000");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("agent.shutdown_grace_ms"));

    let edge = VALID_CONFIG
        .replace("interval_secs = 30", "interval_secs = 86400")
        .replace("stats_log_interval_secs = 60", "stats_log_interval_secs = 604800");
    assert!(AppConfig::load_from_str(&edge).is_ok());
}

#[test]
fn test_config_validation_rejects_bad_endpoint() {
    let bad = VALID_CONFIG.replace(
        "https://collector.example:8443/api/v1/update_state",
        "not a url",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("delivery.endpoint"));

    let bad = VALID_CONFIG.replace("https://collector.example:8443", "ftp://collector.example");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("http or https"));
}

#[test]
fn test_config_validation_rejects_timeout_zero() {
    let bad = VALID_CONFIG.replace("timeout_secs = 5", "timeout_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("delivery.timeout_secs"));
}

#[test]
fn test_config_validation_rejects_too_many_retries() {
    let bad = VALID_CONFIG.replace("max_retries = 2", "max_retries = 17");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("delivery.max_retries"));
}

#[test]
fn test_config_validation_rejects_capacity_zero() {
    let bad = VALID_CONFIG.replace("capacity = 20", "capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("retention.capacity"));
}

#[test]
fn test_config_validation_rejects_empty_state_dir() {
    let bad = VALID_CONFIG.replace("state_dir = \"/tmp/states\"", "state_dir = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("retention.state_dir"));
}

#[test]
fn test_config_validation_rejects_invalid_pattern() {
    let bad = VALID_CONFIG.replace("\"^triton\"", "\"(unclosed\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("classifier.extra_patterns"));
}

#[test]
fn test_config_rejects_wrong_types() {
    let bad = VALID_CONFIG.replace("verbose = true", "verbose = \"yes\"");
    assert!(AppConfig::load_from_str(&bad).is_err());
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = AppConfig::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("nope.toml"));
}

#[test]
fn test_load_reads_explicit_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("agent.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.retention.capacity, 20);
}

//! Integration tests for the logging setup

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}

#[test]
fn test_credentials_are_redacted() {
    assert_eq!(redact_if_sensitive("client_secret", "s3cr3t"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("access_token", "eyJ..."), "[REDACTED]");
    assert_eq!(redact_if_sensitive("refresh_token", "r-1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("authorization", "Bearer abc"), "[REDACTED]");
}

#[test]
fn test_metadata_passes_through() {
    assert_eq!(redact_if_sensitive("tenant_id", "acme"), "acme");
    assert_eq!(redact_if_sensitive("status", "503"), "503");
}

// Only one global subscriber can be installed per process, so both outcomes
// are exercised in a single test.
#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Debug);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());
}

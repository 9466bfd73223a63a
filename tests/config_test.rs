//! Configuration tests
//!
//! Loading from JSON files and `DUAL_MODE_PROXY_*` environment variables.

use std::env;
use std::fs;

use serial_test::serial;

use dual_mode_proxy::config::{ClientCertMode, ProxyConfig, ENV_PREFIX};
use dual_mode_proxy::protocol::SniffPolicy;

fn env_key(name: &str) -> String {
    format!("{}_{}", ENV_PREFIX, name)
}

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("config.json");
    fs::write(&path, content).expect("Failed to write test config file");
    (dir, path)
}

/// Test configuration from file
#[test]
#[serial]
fn test_file_config() {
    let (_dir, path) = write_config(
        r#"{
            "server_ports": "8080 8443:ssl:allow-plain",
            "target": "127.0.0.1:8000",
            "log_level": "debug",
            "client_cert_mode": "Optional",
            "buffer_size": 16384,
            "classification_timeout_ms": 250,
            "sniff_policy": "strict"
        }"#,
    );

    let config = ProxyConfig::load(Some(&path)).expect("Failed to load config from file");

    assert_eq!(config.server_ports, "8080 8443:ssl:allow-plain");
    assert_eq!(config.target, "127.0.0.1:8000");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.client_cert_mode, ClientCertMode::Optional);
    assert_eq!(config.buffer_size, 16384);
    assert_eq!(config.classification_timeout_ms, 250);
    assert_eq!(config.sniff_policy, SniffPolicy::Strict);

    // Keys missing from the file keep their defaults
    assert_eq!(config.idle_timeout, 30);
    assert_eq!(config.classification_max_bytes, 8);

    let ports = config.ports().unwrap();
    assert_eq!(ports.len(), 2);
    assert!(!ports[0].ssl);
    assert!(ports[1].ssl && ports[1].allow_plain);

    // Both loaders agree on a plain JSON file
    assert_eq!(ProxyConfig::from_file(&path).unwrap(), config);
}

#[test]
#[serial]
fn test_unknown_key_is_rejected() {
    let (_dir, path) = write_config(r#"{ "listen": "0.0.0.0:8443" }"#);

    assert!(ProxyConfig::load(Some(&path)).is_err());
    assert!(ProxyConfig::from_file(&path).is_err());
}

#[test]
#[serial]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ProxyConfig::load(Some(&dir.path().join("missing.json"))).is_err());
}

/// Environment variables override the file
#[test]
#[serial]
fn test_env_overrides_file() {
    let (_dir, path) = write_config(
        r#"{
            "server_ports": "8443:ssl",
            "target": "127.0.0.1:8000",
            "idle_timeout": 10
        }"#,
    );

    env::set_var(env_key("SERVER_PORTS"), "9443:ssl:allow-plain");
    env::set_var(env_key("IDLE_TIMEOUT"), "5");
    env::set_var(env_key("SNIFF_POLICY"), "STRICT");

    let result = ProxyConfig::load(Some(&path));

    env::remove_var(env_key("SERVER_PORTS"));
    env::remove_var(env_key("IDLE_TIMEOUT"));
    env::remove_var(env_key("SNIFF_POLICY"));

    let config = result.expect("Failed to load config");
    assert_eq!(config.server_ports, "9443:ssl:allow-plain");
    assert_eq!(config.idle_timeout, 5);
    assert_eq!(config.sniff_policy, SniffPolicy::Strict);
    assert_eq!(config.target, "127.0.0.1:8000");
}

#[test]
#[serial]
fn test_env_without_file() {
    env::set_var(env_key("TARGET"), "10.0.0.5:9000");
    env::set_var(env_key("CLIENT_CERT_MODE"), "required");

    let result = ProxyConfig::load(None);

    env::remove_var(env_key("TARGET"));
    env::remove_var(env_key("CLIENT_CERT_MODE"));

    let config = result.expect("Failed to load config");
    assert_eq!(config.target, "10.0.0.5:9000");
    assert_eq!(config.client_cert_mode, ClientCertMode::Required);
    assert_eq!(config.server_ports, "8443:ssl:allow-plain");
}

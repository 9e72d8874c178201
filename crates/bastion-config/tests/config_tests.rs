// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Bastion configuration system.

use std::io::Write;

use bastion_config::diagnostic::ConfigError;
use bastion_config::{
    load_and_validate_path, load_and_validate_str, load_config_from_path, load_config_from_str,
    LogFormat, OverflowPolicy,
};
use serial_test::serial;

const FULL: &str = r#"
[bridge]
log_level = "debug"
log_format = "json"

[appservice]
id = "bastion-test"
homeserver_url = "https://matrix.example.org"
server_name = "example.org"
as_token = "as-secret"
hs_token = "hs-secret"
listen_address = "127.0.0.1"
listen_port = 29999
max_transactions_per_second = 5
overflow_capacity = 10
on_overflow = "reject"

[plugins]
plugin_dir = "/tmp/bastion-plugins"
auto_discover = false

[[plugins.load]]
library_path = "/tmp/bastion-plugins/echo"

[lockdown]
state_file = "/tmp/bastion-lockdown.json"
"#;

fn write_toml(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn full_document_deserializes() {
    let config = load_and_validate_str(FULL).expect("valid config");
    assert_eq!(config.bridge.log_level, "debug");
    assert_eq!(config.bridge.log_format, LogFormat::Json);
    assert_eq!(config.appservice.id, "bastion-test");
    assert_eq!(config.appservice.server_name, "example.org");
    assert_eq!(config.appservice.listen_port, 29999);
    assert_eq!(config.appservice.max_transactions_per_second, 5);
    assert_eq!(config.appservice.overflow_capacity, 10);
    assert_eq!(config.appservice.on_overflow, OverflowPolicy::Reject);
    assert!(!config.plugins.auto_discover);
    assert_eq!(config.plugins.load.len(), 1);
    assert_eq!(
        config.lockdown.state_file.to_str(),
        Some("/tmp/bastion-lockdown.json")
    );
}

#[test]
fn empty_document_yields_defaults() {
    let config = load_config_from_str("").unwrap();
    assert_eq!(config.appservice.listen_address, "0.0.0.0");
    assert_eq!(config.appservice.listen_port, 9999);
    assert!(config.appservice.homeserver_url.is_empty());
    assert!(config.plugins.load.is_empty());
}

#[test]
fn partial_section_keeps_other_defaults() {
    let config = load_config_from_str("[appservice]\nlisten_port = 8008\n").unwrap();
    assert_eq!(config.appservice.listen_port, 8008);
    assert_eq!(config.appservice.max_transactions_per_second, 100);
    assert_eq!(config.appservice.sender_localpart, "_bridge");
}

#[test]
fn unknown_key_is_reported_with_suggestion() {
    let errors = load_and_validate_str("[appservice]\nlisten_prot = 1\n").unwrap_err();
    assert!(!errors.is_empty());
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, suggestion: Some(s), .. }
                if key == "listen_prot" && s == "listen_port"
        )
    });
    assert!(found, "expected listen_port suggestion, got: {errors:?}");
}

#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[telemetry]\nenabled = true\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownKey { key, .. } if key == "telemetry"))
    );
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[appservice]\nlisten_port = \"high\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_))),
        "got: {errors:?}"
    );
}

#[test]
fn validation_errors_surface_through_load() {
    let errors = load_and_validate_str(
        "[appservice]\nhomeserver_url = \"https://matrix.example.org\"\n",
    )
    .unwrap_err();
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
    assert_eq!(errors.len(), 2);
}

#[test]
fn diagnostics_render_with_codes() {
    use miette::Diagnostic;

    let errors = load_and_validate_str("[lockdown]\nstate_fil = \"x\"\n").unwrap_err();
    let code = errors[0].code().map(|c| c.to_string());
    assert_eq!(code.as_deref(), Some("bastion::config::unknown_key"));
}

#[test]
#[serial]
fn file_is_loaded_from_explicit_path() {
    let file = write_toml(FULL);
    let config = load_and_validate_path(file.path()).expect("valid file");
    assert_eq!(config.appservice.hs_token, "hs-secret");
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let file = write_toml(FULL);
    // SAFETY: serialized with other env-touching tests.
    unsafe {
        std::env::set_var("BASTION_APPSERVICE_HS_TOKEN", "from-env");
        std::env::set_var("BASTION_APPSERVICE_LISTEN_PORT", "31000");
    }
    let result = load_config_from_path(file.path());
    unsafe {
        std::env::remove_var("BASTION_APPSERVICE_HS_TOKEN");
        std::env::remove_var("BASTION_APPSERVICE_LISTEN_PORT");
    }

    let config = result.unwrap();
    assert_eq!(config.appservice.hs_token, "from-env");
    assert_eq!(config.appservice.listen_port, 31000);
    assert_eq!(config.appservice.as_token, "as-secret");
}

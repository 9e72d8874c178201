// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Bastion bridge.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Bastion configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BastionConfig {
    /// Process-wide settings (logging).
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Homeserver application-service settings for the protocol gateway.
    #[serde(default)]
    pub appservice: AppServiceConfig,

    /// Plugin discovery and load list.
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Lockdown state persistence.
    #[serde(default)]
    pub lockdown: LockdownConfig,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// What the gateway does when the event stream has no room left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Divert to the bounded drop-oldest recent-events buffer and acknowledge.
    #[default]
    Buffer,
    /// Answer 503 so the homeserver retries the transaction later.
    Reject,
}

/// Application-service settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppServiceConfig {
    /// Registration identifier reported on `/health`.
    #[serde(default = "default_appservice_id")]
    pub id: String,

    /// Homeserver base URL. Empty disables `serve`.
    #[serde(default)]
    pub homeserver_url: String,

    /// Server name used when composing ghost user IDs.
    #[serde(default)]
    pub server_name: String,

    /// Token the bridge presents to the homeserver.
    #[serde(default)]
    pub as_token: String,

    /// Token the homeserver presents to the bridge.
    #[serde(default)]
    pub hs_token: String,

    /// Localpart of the bridge bot account.
    #[serde(default = "default_sender_localpart")]
    pub sender_localpart: String,

    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Soft limit on accepted transactions per one-second window.
    #[serde(default = "default_max_transactions_per_second")]
    pub max_transactions_per_second: u32,

    /// Capacity of the bounded event stream to dispatch.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Capacity of the drop-oldest overflow buffer.
    #[serde(default = "default_overflow_capacity")]
    pub overflow_capacity: usize,

    #[serde(default)]
    pub on_overflow: OverflowPolicy,

    /// Upper bound on graceful HTTP drain at shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl std::fmt::Debug for AppServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |s: &String| if s.is_empty() { "" } else { "[redacted]" };
        f.debug_struct("AppServiceConfig")
            .field("id", &self.id)
            .field("homeserver_url", &self.homeserver_url)
            .field("server_name", &self.server_name)
            .field("as_token", &redact(&self.as_token))
            .field("hs_token", &redact(&self.hs_token))
            .field("sender_localpart", &self.sender_localpart)
            .field("listen_address", &self.listen_address)
            .field("listen_port", &self.listen_port)
            .field("max_transactions_per_second", &self.max_transactions_per_second)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .field("overflow_capacity", &self.overflow_capacity)
            .field("on_overflow", &self.on_overflow)
            .field("shutdown_timeout_secs", &self.shutdown_timeout_secs)
            .finish()
    }
}

impl Default for AppServiceConfig {
    fn default() -> Self {
        Self {
            id: default_appservice_id(),
            homeserver_url: String::new(),
            server_name: String::new(),
            as_token: String::new(),
            hs_token: String::new(),
            sender_localpart: default_sender_localpart(),
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            max_transactions_per_second: default_max_transactions_per_second(),
            event_channel_capacity: default_event_channel_capacity(),
            overflow_capacity: default_overflow_capacity(),
            on_overflow: OverflowPolicy::default(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_appservice_id() -> String {
    "bastion".to_string()
}

fn default_sender_localpart() -> String {
    "_bridge".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    9999
}

fn default_max_transactions_per_second() -> u32 {
    100
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_overflow_capacity() -> usize {
    100
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

/// Plugin discovery and load settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PluginsConfig {
    /// Directory walked for metadata descriptors.
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,

    /// Walk `plugin_dir` at startup and log what is found.
    #[serde(default = "default_auto_discover")]
    pub auto_discover: bool,

    /// Glob patterns matched against descriptor file names.
    #[serde(default = "default_search_patterns")]
    pub search_patterns: Vec<String>,

    /// Plugins to load, initialize, and start at startup.
    #[serde(default)]
    pub load: Vec<PluginLoadConfig>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            auto_discover: default_auto_discover(),
            search_patterns: default_search_patterns(),
            load: Vec::new(),
        }
    }
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("/var/lib/bastion/plugins")
}

fn default_auto_discover() -> bool {
    true
}

fn default_search_patterns() -> Vec<String> {
    vec!["*.json".to_string()]
}

/// One `[[plugins.load]]` entry.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PluginLoadConfig {
    /// Plugin executable (out-of-process) or built-in registry key.
    pub library_path: PathBuf,

    /// Sidecar metadata descriptor.
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,

    #[serde(default = "default_plugin_enabled")]
    pub enabled: bool,

    /// Plugin-specific settings passed through at initialize time.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,

    /// Credentials injected at initialize time.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

impl std::fmt::Debug for PluginLoadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoadConfig")
            .field("library_path", &self.library_path)
            .field("metadata_path", &self.metadata_path)
            .field("enabled", &self.enabled)
            .field("config", &self.config)
            .field(
                "credentials",
                &self.credentials.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn default_plugin_enabled() -> bool {
    true
}

/// Lockdown persistence settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockdownConfig {
    /// Durable state file; the single source of truth for the security mode.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for LockdownConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

fn default_state_file() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("bastion").join("lockdown.json"))
        .unwrap_or_else(|| PathBuf::from("./bastion-lockdown.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_expectations() {
        let config = BastionConfig::default();
        assert_eq!(config.appservice.listen_port, 9999);
        assert_eq!(config.appservice.max_transactions_per_second, 100);
        assert_eq!(config.appservice.overflow_capacity, 100);
        assert_eq!(config.appservice.event_channel_capacity, 1000);
        assert_eq!(config.appservice.on_overflow, OverflowPolicy::Buffer);
        assert_eq!(config.appservice.shutdown_timeout_secs, 10);
        assert_eq!(config.appservice.sender_localpart, "_bridge");
        assert_eq!(config.bridge.log_format, LogFormat::Pretty);
    }

    #[test]
    fn appservice_debug_redacts_tokens() {
        let mut config = AppServiceConfig::default();
        config.hs_token = "hs-secret".into();
        config.as_token = "as-secret".into();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hs-secret"));
        assert!(!debug.contains("as-secret"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn plugin_load_entry_parses_nested_config() {
        let toml_str = r#"
[[plugins.load]]
library_path = "/opt/plugins/slack-adapter"
metadata_path = "/opt/plugins/slack-adapter.json"

[plugins.load.config]
workspace = "acme"
retries = 3

[plugins.load.credentials]
bot_token = "xoxb-1"
"#;
        let config: BastionConfig = toml::from_str(toml_str).unwrap();
        let entry = &config.plugins.load[0];
        assert!(entry.enabled);
        assert_eq!(entry.config["workspace"], "acme");
        assert_eq!(entry.config["retries"], 3);
        assert!(!format!("{entry:?}").contains("xoxb-1"));
    }

    #[test]
    fn overflow_policy_parses_lowercase() {
        let config: BastionConfig = toml::from_str(
            r#"
[appservice]
on_overflow = "reject"
"#,
        )
        .unwrap();
        assert_eq!(config.appservice.on_overflow, OverflowPolicy::Reject);
    }
}

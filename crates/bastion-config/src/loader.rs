// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./bastion.toml` > `~/.config/bastion/bastion.toml` > `/etc/bastion/bastion.toml`
//! with environment variable overrides via `BASTION_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::BastionConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/bastion/bastion.toml";
pub(crate) const LOCAL_CONFIG: &str = "bastion.toml";

/// Sections whose keys may be overridden from the environment.
const ENV_SECTIONS: &[&str] = &["bridge", "appservice", "plugins", "lockdown"];

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("bastion/bastion.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/bastion/bastion.toml` (system-wide)
/// 3. `~/.config/bastion/bastion.toml` (user XDG config)
/// 4. `./bastion.toml` (local directory)
/// 5. `BASTION_*` environment variables
pub fn load_config() -> Result<BastionConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<BastionConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BastionConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BastionConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BastionConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(BastionConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider mapping `BASTION_<SECTION>_<KEY>` to `section.key`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `BASTION_APPSERVICE_HS_TOKEN` maps to `appservice.hs_token`, never
/// `appservice.hs.token`.
fn env_provider() -> Env {
    Env::prefixed("BASTION_").map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("appservice_hs_token"), "appservice.hs_token");
        assert_eq!(
            map_env_key("appservice_max_transactions_per_second"),
            "appservice.max_transactions_per_second"
        );
        assert_eq!(map_env_key("bridge_log_level"), "bridge.log_level");
        assert_eq!(map_env_key("lockdown_state_file"), "lockdown.state_file");
    }

    #[test]
    fn unknown_sections_pass_through() {
        assert_eq!(map_env_key("mystery_key"), "mystery_key");
    }
}

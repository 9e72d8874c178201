// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as parseable listen addresses, non-zero capacities, and unique plugin paths.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::BastionConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BastionConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let appservice = &config.appservice;

    let addr = appservice.listen_address.trim();
    if addr.is_empty() {
        errors.push(validation("appservice.listen_address must not be empty"));
    } else if addr.parse::<std::net::IpAddr>().is_err()
        && !addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        errors.push(validation(format!(
            "appservice.listen_address `{addr}` is not a valid IP address or hostname"
        )));
    }

    if appservice.max_transactions_per_second == 0 {
        errors.push(validation(
            "appservice.max_transactions_per_second must be at least 1",
        ));
    }

    if appservice.event_channel_capacity == 0 {
        errors.push(validation("appservice.event_channel_capacity must be at least 1"));
    }

    if appservice.overflow_capacity == 0 {
        errors.push(validation("appservice.overflow_capacity must be at least 1"));
    }

    if appservice.shutdown_timeout_secs == 0 {
        errors.push(validation("appservice.shutdown_timeout_secs must be at least 1"));
    }

    // A configured homeserver needs both tokens and a server name.
    if !appservice.homeserver_url.trim().is_empty() {
        if appservice.as_token.is_empty() || appservice.hs_token.is_empty() {
            errors.push(validation(
                "appservice.as_token and appservice.hs_token are required when homeserver_url is set",
            ));
        }
        if appservice.server_name.trim().is_empty() {
            errors.push(validation(
                "appservice.server_name is required when homeserver_url is set",
            ));
        }
    }

    let mut seen_paths = HashSet::new();
    for (i, entry) in config.plugins.load.iter().enumerate() {
        if entry.library_path.as_os_str().is_empty() {
            errors.push(validation(format!(
                "plugins.load[{i}].library_path must not be empty"
            )));
            continue;
        }
        if !seen_paths.insert(&entry.library_path) {
            errors.push(validation(format!(
                "duplicate plugin library_path `{}` in [[plugins.load]]",
                entry.library_path.display()
            )));
        }
    }

    if config.lockdown.state_file.as_os_str().is_empty() {
        errors.push(validation("lockdown.state_file must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

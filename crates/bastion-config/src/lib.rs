// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Bastion bridge.
//!
//! TOML with `deny_unknown_fields`, layered over the XDG file hierarchy and
//! `BASTION_*` environment overrides, validated after extraction and reported
//! through miette diagnostics.
//!
//! ```no_run
//! use bastion_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("listening on port {}", config.appservice.listen_port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AppServiceConfig, BastionConfig, BridgeConfig, LockdownConfig, LogFormat, OverflowPolicy,
    PluginLoadConfig, PluginsConfig,
};

/// Load from the XDG hierarchy plus environment, then validate.
pub fn load_and_validate() -> Result<BastionConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &hierarchy_sources(),
        )),
    }
}

/// Load a single explicit file (plus environment), then validate.
pub fn load_and_validate_path(path: &Path) -> Result<BastionConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = read_source(path).into_iter().collect::<Vec<_>>();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load an inline TOML document, then validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<BastionConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = [("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

fn read_source(path: &Path) -> Option<(String, String)> {
    std::fs::read_to_string(path)
        .ok()
        .map(|content| (path.display().to_string(), content))
}

fn hierarchy_sources() -> Vec<(String, String)> {
    let local = std::env::current_dir()
        .map(|d| d.join(loader::LOCAL_CONFIG))
        .unwrap_or_else(|_| loader::LOCAL_CONFIG.into());

    [
        local,
        loader::user_config_path(),
        Path::new(loader::SYSTEM_CONFIG).to_path_buf(),
    ]
    .iter()
    .filter_map(|p| read_source(p))
    .collect()
}

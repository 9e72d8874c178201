// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The contract every loaded plugin instance satisfies.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bastion_core::{BastionError, PlatformAdapter};
use serde::{Deserialize, Serialize};

use crate::manifest::PluginMetadata;

/// Runtime configuration for one plugin. Never persisted by the manager.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Executable (out-of-process loader) or registry key (built-in loader).
    pub library_path: PathBuf,
    /// Sidecar metadata descriptor. When absent the plugin describes itself.
    pub metadata_path: Option<PathBuf>,
    pub enabled: bool,
    /// Plugin-specific settings, validated by the plugin against its schema.
    pub config: HashMap<String, serde_json::Value>,
    /// Secrets injected from the keystore.
    pub credentials: HashMap<String, String>,
}

impl std::fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginConfig")
            .field("library_path", &self.library_path)
            .field("metadata_path", &self.metadata_path)
            .field("enabled", &self.enabled)
            .field("config", &self.config)
            .field("credentials", &format!("[{} redacted]", self.credentials.len()))
            .finish()
    }
}

/// A loaded plugin instance.
///
/// Hooks are driven by [`crate::PluginManager`], which enforces ordering;
/// implementations do not need to track lifecycle state themselves.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Identification the plugin reports about itself.
    fn metadata(&self) -> PluginMetadata;

    async fn initialize(&self, config: &PluginConfig) -> Result<(), BastionError>;

    async fn start(&self) -> Result<(), BastionError>;

    async fn stop(&self) -> Result<(), BastionError>;

    async fn health_check(&self) -> Result<(), BastionError>;

    /// The adapter view, for plugins that implement the adapter extension.
    fn adapter(&self) -> Option<Arc<dyn PlatformAdapter>> {
        None
    }

    /// Release whatever backs this instance. Called once, on unload.
    async fn release(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_is_object_safe() {
        fn _assert_dyn(_: &dyn Plugin) {}
    }

    #[test]
    fn config_debug_redacts_credentials() {
        let mut config = PluginConfig {
            library_path: "/opt/plugins/slack".into(),
            enabled: true,
            ..Default::default()
        };
        config
            .credentials
            .insert("bot_token".into(), "xoxb-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("xoxb-secret"));
        assert!(debug.contains("1 redacted"));
    }
}

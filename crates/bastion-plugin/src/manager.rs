// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin lifecycle manager.
//!
//! Drives each plugin through
//! `Loaded -> Initialized -> Running`, with `Error` on a failed hook and
//! `Disabled` as an administrative rest state. Records are keyed by
//! [`PluginMetadata::name`]; a secondary index by library path rejects
//! loading the same library twice.
//!
//! Every state-changing operation holds the write lock for its whole
//! duration, including the plugin hook, so preconditions cannot be
//! invalidated mid-operation. Listings and health checks take the read lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bastion_core::{BastionError, PlatformAdapter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tokio::sync::RwLock;

use crate::manifest::{self, DiscoveredPlugin, PluginMetadata};
use crate::plugin::{Plugin, PluginConfig};
use crate::registry::PluginLoader;

/// The plugin API version this bridge implements. Plugins must match exactly.
pub const PLUGIN_API_VERSION: &str = "1.0.0";

/// Lifecycle state of one plugin record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PluginState {
    Unloaded,
    Loaded,
    Initialized,
    Running,
    Error,
    Disabled,
}

/// A value snapshot of a plugin record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    pub metadata: PluginMetadata,
    pub state: PluginState,
    pub library_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub load_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

struct PluginRecord {
    info: PluginInfo,
    config: PluginConfig,
    instance: Arc<dyn Plugin>,
}

impl PluginRecord {
    fn fail(&mut self, operation: &'static str, err: &BastionError) {
        self.info.state = PluginState::Error;
        self.info.last_error = Some(err.to_string());
        record_outcome(operation, "error");
        tracing::error!(
            plugin = %self.info.metadata.name,
            operation,
            error = %err,
            "plugin hook failed"
        );
    }

    fn precondition(&self, operation: &'static str) -> BastionError {
        BastionError::PluginStatePrecondition {
            name: self.info.metadata.name.clone(),
            operation,
            state: self.info.state.to_string(),
        }
    }
}

/// Directory-discovery settings. Mirrors `[plugins]` from `bastion-config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    pub plugin_dir: PathBuf,
    pub auto_discover: bool,
    pub search_patterns: Vec<String>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from("/var/lib/bastion/plugins"),
            auto_discover: true,
            search_patterns: vec!["*.json".to_string()],
        }
    }
}

#[derive(Default)]
struct Records {
    plugins: HashMap<String, PluginRecord>,
    by_path: HashMap<PathBuf, String>,
}

impl Records {
    fn get_mut(&mut self, name: &str) -> Result<&mut PluginRecord, BastionError> {
        self.plugins
            .get_mut(name)
            .ok_or_else(|| BastionError::PluginNotFound(name.to_string()))
    }
}

/// Owns every plugin record. All mutation goes through its methods.
pub struct PluginManager {
    settings: ManagerSettings,
    loader: Arc<dyn PluginLoader>,
    records: RwLock<Records>,
}

fn record_outcome(operation: &'static str, outcome: &'static str) {
    metrics::counter!(
        "bastion_plugin_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "bastion_plugin_operations_total",
        "Plugin lifecycle operations by operation and outcome"
    );
}

impl PluginManager {
    pub fn new(settings: ManagerSettings, loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            settings,
            loader,
            records: RwLock::new(Records::default()),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Enumerate descriptors under the plugin directory. Best-effort; see
    /// [`manifest::discover_plugins`].
    pub fn discover(&self) -> Vec<DiscoveredPlugin> {
        manifest::discover_plugins(&self.settings.plugin_dir, &self.settings.search_patterns)
    }

    /// Load a plugin and store it in state `Loaded`. Returns its name.
    ///
    /// Checks run in order: library path already loaded, library missing,
    /// descriptor invalid, API version mismatch, then the loader's own
    /// contract check. Nothing is stored unless every check passes.
    pub async fn load(&self, config: PluginConfig) -> Result<String, BastionError> {
        let mut records = self.records.write().await;
        let path = config.library_path.clone();

        if records.by_path.contains_key(&path) {
            record_outcome("load", "error");
            return Err(BastionError::PluginAlreadyLoaded(path.display().to_string()));
        }
        if !self.loader.library_exists(&path) {
            record_outcome("load", "error");
            return Err(BastionError::PluginLibraryMissing { path });
        }

        let descriptor = match &config.metadata_path {
            Some(metadata_path) => {
                let metadata = manifest::load_metadata(metadata_path).inspect_err(|_| {
                    record_outcome("load", "error");
                })?;
                check_api_version(&metadata)?;
                Some(metadata)
            }
            None => None,
        };

        let instance = self
            .loader
            .load(&config, descriptor.as_ref())
            .await
            .inspect_err(|_| record_outcome("load", "error"))?;

        let metadata = match descriptor {
            Some(metadata) => metadata,
            None => {
                let reported = instance.metadata();
                if let Err(e) = validate_reported(&reported, &path) {
                    instance.release().await;
                    return Err(e);
                }
                reported
            }
        };

        let name = metadata.name.clone();
        if records.plugins.contains_key(&name) {
            instance.release().await;
            record_outcome("load", "error");
            return Err(BastionError::PluginAlreadyLoaded(name));
        }

        tracing::info!(
            plugin = %name,
            version = %metadata.version,
            path = %path.display(),
            "plugin loaded"
        );
        records.by_path.insert(path.clone(), name.clone());
        records.plugins.insert(
            name.clone(),
            PluginRecord {
                info: PluginInfo {
                    metadata,
                    state: PluginState::Loaded,
                    library_path: path,
                    last_error: None,
                    load_time: Utc::now(),
                    start_time: None,
                },
                config,
                instance,
            },
        );
        record_outcome("load", "ok");
        Ok(name)
    }

    /// Run the plugin's initialize hook with `config`.
    ///
    /// Allowed from `Loaded`, `Initialized`, or `Error`. On failure the
    /// record moves to `Error` and the error is also returned.
    pub async fn initialize(&self, name: &str, config: PluginConfig) -> Result<(), BastionError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(name)?;
        if !matches!(
            record.info.state,
            PluginState::Loaded | PluginState::Initialized | PluginState::Error
        ) {
            return Err(record.precondition("initialize"));
        }

        if let Err(e) = record.instance.initialize(&config).await {
            record.fail("initialize", &e);
            return Err(e);
        }
        record.info.state = PluginState::Initialized;
        record.info.last_error = None;
        record.config = config;
        record_outcome("initialize", "ok");
        tracing::info!(plugin = %name, "plugin initialized");
        Ok(())
    }

    /// Initialize with the configuration the plugin was loaded with.
    pub async fn initialize_with_load_config(&self, name: &str) -> Result<(), BastionError> {
        let config = {
            let records = self.records.read().await;
            records
                .plugins
                .get(name)
                .map(|r| r.config.clone())
                .ok_or_else(|| BastionError::PluginNotFound(name.to_string()))?
        };
        self.initialize(name, config).await
    }

    /// Start an `Initialized` plugin. Every declared dependency must be
    /// loaded and `Running`.
    pub async fn start(&self, name: &str) -> Result<(), BastionError> {
        let mut records = self.records.write().await;

        let record = records
            .plugins
            .get(name)
            .ok_or_else(|| BastionError::PluginNotFound(name.to_string()))?;
        if record.info.state != PluginState::Initialized {
            return Err(record.precondition("start"));
        }
        let missing: Vec<String> = record
            .info
            .metadata
            .dependencies
            .iter()
            .filter(|dep| {
                records
                    .plugins
                    .get(dep.as_str())
                    .is_none_or(|d| d.info.state != PluginState::Running)
            })
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(BastionError::PluginStatePrecondition {
                name: name.to_string(),
                operation: "start",
                state: format!(
                    "{} (dependencies not running: {})",
                    PluginState::Initialized,
                    missing.join(", ")
                ),
            });
        }

        let record = records.get_mut(name)?;
        if let Err(e) = record.instance.start().await {
            record.fail("start", &e);
            return Err(e);
        }
        record.info.state = PluginState::Running;
        record.info.start_time = Some(Utc::now());
        record.info.last_error = None;
        record_outcome("start", "ok");
        tracing::info!(plugin = %name, "plugin started");
        Ok(())
    }

    /// Stop a `Running` plugin, returning it to `Initialized`.
    pub async fn stop(&self, name: &str) -> Result<(), BastionError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(name)?;
        if record.info.state != PluginState::Running {
            return Err(record.precondition("stop"));
        }

        if let Err(e) = record.instance.stop().await {
            record.fail("stop", &e);
            return Err(e);
        }
        record.info.state = PluginState::Initialized;
        record.info.start_time = None;
        record_outcome("stop", "ok");
        tracing::info!(plugin = %name, "plugin stopped");
        Ok(())
    }

    /// Remove a plugin. A running plugin is stopped first; a failed stop is
    /// logged and does not block removal.
    pub async fn unload(&self, name: &str) -> Result<(), BastionError> {
        let mut records = self.records.write().await;
        let record = records
            .plugins
            .remove(name)
            .ok_or_else(|| BastionError::PluginNotFound(name.to_string()))?;
        records.by_path.remove(&record.info.library_path);

        if record.info.state == PluginState::Running {
            if let Err(e) = record.instance.stop().await {
                tracing::warn!(plugin = %name, error = %e, "stop failed during unload");
            }
        }
        record.instance.release().await;
        record_outcome("unload", "ok");
        tracing::info!(plugin = %name, "plugin unloaded");
        Ok(())
    }

    /// Move a plugin to `Disabled`, stopping it first if it is running.
    pub async fn disable(&self, name: &str) -> Result<(), BastionError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(name)?;
        if record.info.state == PluginState::Disabled {
            return Ok(());
        }
        if record.info.state == PluginState::Running {
            if let Err(e) = record.instance.stop().await {
                tracing::warn!(plugin = %name, error = %e, "stop failed while disabling");
                record.info.last_error = Some(e.to_string());
            }
            record.info.start_time = None;
        }
        record.info.state = PluginState::Disabled;
        record_outcome("disable", "ok");
        tracing::info!(plugin = %name, "plugin disabled");
        Ok(())
    }

    /// Return a `Disabled` plugin to `Loaded`. It must be initialized again.
    pub async fn enable(&self, name: &str) -> Result<(), BastionError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(name)?;
        if record.info.state != PluginState::Disabled {
            return Err(record.precondition("enable"));
        }
        record.info.state = PluginState::Loaded;
        record_outcome("enable", "ok");
        tracing::info!(plugin = %name, "plugin enabled");
        Ok(())
    }

    pub async fn get_plugin(&self, name: &str) -> Result<PluginInfo, BastionError> {
        self.records
            .read()
            .await
            .plugins
            .get(name)
            .map(|r| r.info.clone())
            .ok_or_else(|| BastionError::PluginNotFound(name.to_string()))
    }

    /// Snapshots of every record, sorted by name.
    pub async fn list_plugins(&self) -> Vec<PluginInfo> {
        let records = self.records.read().await;
        let mut list: Vec<PluginInfo> = records.plugins.values().map(|r| r.info.clone()).collect();
        list.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        list
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.plugins.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.plugins.is_empty()
    }

    /// Name of the plugin loaded from `library_path`, if any.
    pub async fn name_for_path(&self, library_path: &Path) -> Option<String> {
        self.records.read().await.by_path.get(library_path).cloned()
    }

    /// The adapter view of a plugin.
    pub async fn get_adapter(&self, name: &str) -> Result<Arc<dyn PlatformAdapter>, BastionError> {
        let records = self.records.read().await;
        let record = records
            .plugins
            .get(name)
            .ok_or_else(|| BastionError::PluginNotFound(name.to_string()))?;
        record
            .instance
            .adapter()
            .ok_or_else(|| BastionError::NotAdapterPlugin(name.to_string()))
    }

    /// Adapters of every `Running` plugin that has one, sorted by name.
    pub async fn running_adapters(&self) -> Vec<(String, Arc<dyn PlatformAdapter>)> {
        let records = self.records.read().await;
        let mut adapters: Vec<(String, Arc<dyn PlatformAdapter>)> = records
            .plugins
            .iter()
            .filter(|(_, r)| r.info.state == PluginState::Running)
            .filter_map(|(name, r)| r.instance.adapter().map(|a| (name.clone(), a)))
            .collect();
        adapters.sort_by(|a, b| a.0.cmp(&b.0));
        adapters
    }

    /// Health of every `Running` plugin. Plugins in other states are absent
    /// from the result.
    pub async fn health_check(&self) -> HashMap<String, Result<(), BastionError>> {
        let records = self.records.read().await;
        let mut results = HashMap::new();
        for (name, record) in &records.plugins {
            if record.info.state != PluginState::Running {
                continue;
            }
            let result = record.instance.health_check().await;
            if let Err(e) = &result {
                tracing::warn!(plugin = %name, error = %e, "plugin health check failed");
            }
            results.insert(name.clone(), result);
        }
        results
    }

    /// Stop every running plugin, then unload everything. Errors are logged.
    pub async fn shutdown(&self) {
        let names: Vec<String> = self
            .list_plugins()
            .await
            .into_iter()
            .map(|info| info.metadata.name)
            .collect();
        for name in names {
            if let Err(e) = self.unload(&name).await {
                tracing::warn!(plugin = %name, error = %e, "unload failed during shutdown");
            }
        }
    }
}

fn check_api_version(metadata: &PluginMetadata) -> Result<(), BastionError> {
    if metadata.api_version != PLUGIN_API_VERSION {
        record_outcome("load", "error");
        return Err(BastionError::PluginVersionMismatch {
            plugin: metadata.api_version.clone(),
            bridge: PLUGIN_API_VERSION.to_string(),
        });
    }
    Ok(())
}

fn validate_reported(metadata: &PluginMetadata, path: &Path) -> Result<(), BastionError> {
    metadata.validate().map_err(|message| {
        record_outcome("load", "error");
        BastionError::InvalidMetadata {
            path: path.to_path_buf(),
            message,
        }
    })?;
    check_api_version(metadata)
}

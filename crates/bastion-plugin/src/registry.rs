// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loader seam and the compile-time plugin registry.
//!
//! [`PluginLoader`] turns a [`PluginConfig`] into a live [`Plugin`]. Two
//! implementations exist: [`PluginRegistry`] for plugins compiled into the
//! binary, and [`crate::process::ProcessLoader`] for external executables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bastion_core::BastionError;

use crate::manifest::PluginMetadata;
use crate::plugin::{Plugin, PluginConfig};

/// Produces plugin instances for [`crate::PluginManager::load`].
#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// Whether `library_path` names something this loader can open.
    ///
    /// The manager checks this before reading metadata, so a missing
    /// library is reported ahead of descriptor problems.
    fn library_exists(&self, library_path: &Path) -> bool {
        library_path.exists()
    }

    /// Open the plugin. `metadata` is the validated descriptor, if the
    /// configuration named one.
    ///
    /// Must fail with [`BastionError::PluginSymbolInvalid`] when the target
    /// does not satisfy the plugin contract.
    async fn load(
        &self,
        config: &PluginConfig,
        metadata: Option<&PluginMetadata>,
    ) -> Result<Arc<dyn Plugin>, BastionError>;
}

/// Factory trait for creating plugin instances from configuration.
pub trait PluginFactory: Send + Sync {
    fn create(&self, config: &PluginConfig) -> Result<Arc<dyn Plugin>, BastionError>;
}

impl<F> PluginFactory for F
where
    F: Fn(&PluginConfig) -> Result<Arc<dyn Plugin>, BastionError> + Send + Sync,
{
    fn create(&self, config: &PluginConfig) -> Result<Arc<dyn Plugin>, BastionError> {
        self(config)
    }
}

/// Registry of compiled-in plugins, keyed by the library path a
/// configuration uses to select them (e.g. `builtin:slack`).
pub struct PluginRegistry {
    factories: HashMap<PathBuf, Box<dyn PluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory. A later registration under the same key replaces
    /// the earlier one.
    pub fn register(&mut self, library_path: impl Into<PathBuf>, factory: impl PluginFactory + 'static) {
        self.factories.insert(library_path.into(), Box::new(factory));
    }

    pub fn contains(&self, library_path: &Path) -> bool {
        self.factories.contains_key(library_path)
    }

    /// Registered keys, sorted.
    pub fn list_all(&self) -> Vec<&Path> {
        let mut keys: Vec<&Path> = self.factories.keys().map(PathBuf::as_path).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("factories", &self.list_all())
            .finish()
    }
}

#[async_trait]
impl PluginLoader for PluginRegistry {
    fn library_exists(&self, library_path: &Path) -> bool {
        self.contains(library_path)
    }

    async fn load(
        &self,
        config: &PluginConfig,
        _metadata: Option<&PluginMetadata>,
    ) -> Result<Arc<dyn Plugin>, BastionError> {
        let factory =
            self.factories
                .get(&config.library_path)
                .ok_or_else(|| BastionError::PluginSymbolInvalid {
                    path: config.library_path.clone(),
                    reason: "no factory registered".to_string(),
                })?;
        factory.create(config)
    }
}

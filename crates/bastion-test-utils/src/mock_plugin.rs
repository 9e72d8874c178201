// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock plugin with injectable hook failures and call capture.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use bastion_core::{BastionError, CapabilitySet, PlatformAdapter};
use bastion_plugin::{
    Plugin, PluginConfig, PluginFactory, PluginMetadata, PluginType, PLUGIN_API_VERSION,
};

use crate::mock_adapter::MockAdapter;

/// Lifecycle hooks a [`MockPlugin`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Initialize,
    Start,
    Stop,
    Health,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::Initialize => "initialize",
            Hook::Start => "start",
            Hook::Stop => "stop",
            Hook::Health => "health",
        }
    }
}

/// Metadata for a test plugin with the current API version.
pub fn descriptor(name: &str, plugin_type: PluginType) -> PluginMetadata {
    PluginMetadata {
        name: name.to_string(),
        version: "0.1.0".to_string(),
        api_version: PLUGIN_API_VERSION.to_string(),
        plugin_type,
        description: format!("Test plugin {name}"),
        author: "tests".to_string(),
        license: "MIT".to_string(),
        platform: None,
        capabilities: None,
        dependencies: Vec::new(),
        config_schema: None,
    }
}

/// Write `metadata` as a JSON descriptor named `<name>.json` under `dir`.
pub fn write_descriptor(dir: &Path, metadata: &PluginMetadata) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("{}.json", metadata.name));
    std::fs::write(&path, serde_json::to_vec_pretty(metadata)?)?;
    Ok(path)
}

/// A mock plugin for testing.
pub struct MockPlugin {
    metadata: PluginMetadata,
    adapter: Option<Arc<MockAdapter>>,
    failures: Mutex<HashMap<Hook, String>>,
    calls: Mutex<Vec<Hook>>,
    last_config: Mutex<Option<PluginConfig>>,
    released: AtomicBool,
}

impl MockPlugin {
    /// A middleware plugin with no adapter.
    pub fn new(name: &str) -> Self {
        Self::with_metadata(descriptor(name, PluginType::Middleware))
    }

    /// An adapter plugin backed by a [`MockAdapter`] for `platform`.
    pub fn adapter(name: &str, platform: &str) -> Self {
        let mut metadata = descriptor(name, PluginType::Adapter);
        metadata.platform = Some(platform.to_string());
        metadata.capabilities = Some(CapabilitySet {
            read: true,
            write: true,
            ..Default::default()
        });
        let mut plugin = Self::with_metadata(metadata);
        plugin.adapter = Some(Arc::new(MockAdapter::new(platform)));
        plugin
    }

    pub fn with_metadata(metadata: PluginMetadata) -> Self {
        Self {
            metadata,
            adapter: None,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            last_config: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.metadata.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Make `hook` fail with `message` from now on.
    pub async fn fail_on(&self, hook: Hook, message: &str) {
        self.failures.lock().await.insert(hook, message.to_string());
    }

    /// Let `hook` succeed again.
    pub async fn clear_failure(&self, hook: Hook) {
        self.failures.lock().await.remove(&hook);
    }

    /// Hooks called so far, in order.
    pub async fn calls(&self) -> Vec<Hook> {
        self.calls.lock().await.clone()
    }

    /// Configuration passed to the most recent `initialize`.
    pub async fn last_config(&self) -> Option<PluginConfig> {
        self.last_config.lock().await.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn mock_adapter(&self) -> Option<Arc<MockAdapter>> {
        self.adapter.clone()
    }

    /// A registry factory that hands out this same instance on every load.
    pub fn factory(self: &Arc<Self>) -> impl PluginFactory + 'static {
        let plugin = Arc::clone(self);
        move |_: &PluginConfig| -> Result<Arc<dyn Plugin>, BastionError> {
            Ok(Arc::clone(&plugin) as Arc<dyn Plugin>)
        }
    }

    async fn hook(&self, hook: Hook) -> Result<(), BastionError> {
        self.calls.lock().await.push(hook);
        match self.failures.lock().await.get(&hook) {
            Some(message) => Err(BastionError::Plugin {
                name: self.metadata.name.clone(),
                operation: hook.as_str(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), BastionError> {
        self.hook(Hook::Initialize).await?;
        *self.last_config.lock().await = Some(config.clone());
        Ok(())
    }

    async fn start(&self) -> Result<(), BastionError> {
        self.hook(Hook::Start).await
    }

    async fn stop(&self) -> Result<(), BastionError> {
        self.hook(Hook::Stop).await
    }

    async fn health_check(&self) -> Result<(), BastionError> {
        self.hook(Hook::Health).await
    }

    fn adapter(&self) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapter
            .as_ref()
            .map(|a| Arc::clone(a) as Arc<dyn PlatformAdapter>)
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Out-of-process plugins.
//!
//! The library path names an executable. [`ProcessLoader`] spawns it with
//! piped stdio and speaks the [`crate::rpc`] protocol over stdin/stdout;
//! stderr is inherited so plugin logs land next to ours.
//!
//! The first request is `describe`. The reply must carry
//! `symbol = "Plugin"` and list `"plugin"` in `interfaces`; `"adapter"` in
//! `interfaces` additionally exposes [`RemoteAdapter`]. It may include the
//! plugin's own metadata, which is used when no descriptor was configured.
//!
//! | hook / operation          | method               |
//! |---------------------------|----------------------|
//! | `Plugin::initialize`      | `initialize`         |
//! | `Plugin::start`           | `start`              |
//! | `Plugin::stop`            | `stop`               |
//! | `Plugin::health_check`    | `health`             |
//! | `PlatformAdapter::initialize` | `adapter_initialize` |
//! | `PlatformAdapter::start`  | `adapter_start`      |
//! | `PlatformAdapter::shutdown` | `adapter_shutdown` |
//! | `send_message`            | `send_message`       |
//! | `receive_event`           | `receive_event`      |
//! | `health_check`            | `health_check`       |
//! | `metrics`                 | `metrics`            |

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bastion_core::{
    AdapterConfig, AdapterHealth, AdapterMetrics, BastionError, CapabilitySet, ExternalEvent,
    Message, PlatformAdapter, SendResult, Target,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::manifest::PluginMetadata;
use crate::plugin::{Plugin, PluginConfig};
use crate::registry::PluginLoader;
use crate::rpc::RpcClient;

/// The entry point every plugin must report in its `describe` reply.
pub const PLUGIN_SYMBOL: &str = "Plugin";

const PLUGIN_INTERFACE: &str = "plugin";
const ADAPTER_INTERFACE: &str = "adapter";

/// Reply to the `describe` handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Describe {
    pub symbol: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub metadata: Option<PluginMetadata>,
}

/// Spawns plugin executables.
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    call_timeout: Duration,
}

impl ProcessLoader {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }
}

impl Default for ProcessLoader {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl PluginLoader for ProcessLoader {
    async fn load(
        &self,
        config: &PluginConfig,
        metadata: Option<&PluginMetadata>,
    ) -> Result<Arc<dyn Plugin>, BastionError> {
        let path = &config.library_path;
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BastionError::PluginSymbolInvalid {
                path: path.clone(),
                reason: format!("failed to spawn: {e}"),
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill().await;
            return Err(BastionError::Internal("plugin stdio was not piped".into()));
        };
        tracing::debug!(path = %path.display(), pid = ?child.id(), "spawned plugin process");

        let rpc = RpcClient::new(stdout, stdin, self.call_timeout);
        match ProcessPlugin::handshake(rpc, path, metadata.cloned()).await {
            Ok(plugin) => {
                *plugin.child.lock().await = Some(child);
                Ok(Arc::new(plugin))
            }
            Err(e) => {
                let _ = child.kill().await;
                Err(e)
            }
        }
    }
}

/// A plugin running in a child process.
pub struct ProcessPlugin {
    metadata: PluginMetadata,
    rpc: Arc<RpcClient>,
    adapter: Option<Arc<RemoteAdapter>>,
    child: Mutex<Option<Child>>,
}

impl ProcessPlugin {
    /// Run the `describe` handshake over an established channel.
    ///
    /// `metadata` takes precedence over what the plugin reports about itself.
    pub async fn handshake(
        rpc: RpcClient,
        path: &Path,
        metadata: Option<PluginMetadata>,
    ) -> Result<Self, BastionError> {
        let invalid = |reason: String| BastionError::PluginSymbolInvalid {
            path: path.to_path_buf(),
            reason,
        };

        let describe: Describe = rpc
            .call("describe", json!({}))
            .await
            .map_err(|e| invalid(format!("describe failed: {e}")))?;
        if describe.symbol != PLUGIN_SYMBOL {
            return Err(invalid(format!(
                "does not export '{PLUGIN_SYMBOL}' (got '{}')",
                describe.symbol
            )));
        }
        if !describe.interfaces.iter().any(|i| i == PLUGIN_INTERFACE) {
            return Err(invalid(format!(
                "does not implement the '{PLUGIN_INTERFACE}' interface"
            )));
        }
        let metadata = metadata
            .or(describe.metadata)
            .ok_or_else(|| invalid("no descriptor configured and none reported".into()))?;

        let rpc = Arc::new(rpc);
        let adapter = describe
            .interfaces
            .iter()
            .any(|i| i == ADAPTER_INTERFACE)
            .then(|| Arc::new(RemoteAdapter::new(&metadata, Arc::clone(&rpc))));

        Ok(Self {
            metadata,
            rpc,
            adapter,
            child: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Plugin for ProcessPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), BastionError> {
        self.rpc.call("initialize", config).await
    }

    async fn start(&self) -> Result<(), BastionError> {
        self.rpc.call("start", json!({})).await
    }

    async fn stop(&self) -> Result<(), BastionError> {
        self.rpc.call("stop", json!({})).await
    }

    async fn health_check(&self) -> Result<(), BastionError> {
        self.rpc.call("health", json!({})).await
    }

    fn adapter(&self) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapter
            .as_ref()
            .map(|a| Arc::clone(a) as Arc<dyn PlatformAdapter>)
    }

    async fn release(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(plugin = %self.metadata.name, error = %e, "failed to kill plugin process");
            } else {
                tracing::debug!(plugin = %self.metadata.name, "plugin process killed");
            }
        }
    }
}

/// Adapter operations forwarded to a plugin process.
pub struct RemoteAdapter {
    platform: String,
    capabilities: CapabilitySet,
    version: semver::Version,
    rpc: Arc<RpcClient>,
}

impl RemoteAdapter {
    fn new(metadata: &PluginMetadata, rpc: Arc<RpcClient>) -> Self {
        Self {
            platform: metadata
                .platform
                .clone()
                .unwrap_or_else(|| metadata.name.clone()),
            capabilities: metadata.capabilities.unwrap_or_default(),
            version: metadata.semver(),
            rpc,
        }
    }
}

#[async_trait]
impl PlatformAdapter for RemoteAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn version(&self) -> semver::Version {
        self.version.clone()
    }

    async fn initialize(&self, config: AdapterConfig) -> Result<(), BastionError> {
        self.rpc.call("adapter_initialize", config).await
    }

    async fn start(&self) -> Result<(), BastionError> {
        self.rpc.call("adapter_start", json!({})).await
    }

    async fn shutdown(&self) -> Result<(), BastionError> {
        self.rpc.call("adapter_shutdown", json!({})).await
    }

    async fn send_message(
        &self,
        target: &Target,
        message: &Message,
    ) -> Result<SendResult, BastionError> {
        self.rpc
            .call("send_message", json!({ "target": target, "message": message }))
            .await
    }

    async fn receive_event(&self, event: ExternalEvent) -> Result<(), BastionError> {
        self.rpc.call("receive_event", event).await
    }

    async fn health_check(&self) -> Result<AdapterHealth, BastionError> {
        self.rpc.call("health_check", json!({})).await
    }

    async fn metrics(&self) -> Result<AdapterMetrics, BastionError> {
        self.rpc.call("metrics", json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn slack_metadata() -> Value {
        json!({
            "name": "slack-adapter",
            "version": "0.3.1",
            "api_version": "1.0.0",
            "type": "adapter",
            "platform": "slack",
            "capabilities": {"read": true, "write": true}
        })
    }

    /// Fake plugin process: answers `describe` with `describe`, echoes
    /// `send_message` into a `SendResult`, and answers everything else with null.
    fn fake_plugin(describe: Value) -> (RpcClient, tokio::task::JoinHandle<Vec<String>>) {
        let (client_io, server_io) = tokio::io::duplex(8192);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let mut methods = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let method = request["method"].as_str().unwrap().to_string();
                let reply = match method.as_str() {
                    "describe" => json!({"id": request["id"], "result": describe}),
                    "send_message" => json!({"id": request["id"], "result": {
                        "message_id": format!("slack-{}", request["params"]["message"]["id"].as_str().unwrap()),
                        "delivered": true,
                        "timestamp": "2026-01-01T00:00:00Z"
                    }}),
                    "health" => json!({"id": request["id"], "error": {"code": "network_error", "message": "socket down"}}),
                    _ => json!({"id": request["id"], "result": null}),
                };
                methods.push(method);
                server_write.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
            }
            methods
        });
        (
            RpcClient::new(client_read, client_write, Duration::from_secs(5)),
            server,
        )
    }

    #[tokio::test]
    async fn handshake_accepts_adapter_plugin() {
        let (rpc, _server) = fake_plugin(json!({
            "symbol": "Plugin",
            "interfaces": ["plugin", "adapter"],
            "metadata": slack_metadata()
        }));
        let plugin = ProcessPlugin::handshake(rpc, Path::new("/opt/slack"), None)
            .await
            .unwrap();
        assert_eq!(plugin.metadata().name, "slack-adapter");

        let adapter = plugin.adapter().expect("adapter interface");
        assert_eq!(adapter.platform(), "slack");
        assert!(adapter.capabilities().write);
        assert_eq!(adapter.version(), semver::Version::new(0, 3, 1));
    }

    #[tokio::test]
    async fn handshake_rejects_wrong_symbol() {
        let (rpc, _server) = fake_plugin(json!({
            "symbol": "Main",
            "interfaces": ["plugin"],
            "metadata": slack_metadata()
        }));
        let err = ProcessPlugin::handshake(rpc, Path::new("/opt/slack"), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BastionError::PluginSymbolInvalid { .. }));
        assert!(err.to_string().contains("'Plugin'"));
    }

    #[tokio::test]
    async fn handshake_rejects_missing_plugin_interface() {
        let (rpc, _server) = fake_plugin(json!({
            "symbol": "Plugin",
            "interfaces": ["adapter"],
            "metadata": slack_metadata()
        }));
        let err = ProcessPlugin::handshake(rpc, Path::new("/opt/slack"), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BastionError::PluginSymbolInvalid { .. }));
    }

    #[tokio::test]
    async fn handshake_requires_some_metadata() {
        let (rpc, _server) = fake_plugin(json!({"symbol": "Plugin", "interfaces": ["plugin"]}));
        let err = ProcessPlugin::handshake(rpc, Path::new("/opt/x"), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BastionError::PluginSymbolInvalid { .. }));
    }

    #[tokio::test]
    async fn configured_descriptor_wins_over_reported_metadata() {
        let (rpc, _server) = fake_plugin(json!({
            "symbol": "Plugin",
            "interfaces": ["plugin"],
            "metadata": slack_metadata()
        }));
        let mut configured: PluginMetadata = serde_json::from_value(slack_metadata()).unwrap();
        configured.name = "slack-configured".into();

        let plugin = ProcessPlugin::handshake(rpc, Path::new("/opt/slack"), Some(configured))
            .await
            .unwrap();
        assert_eq!(plugin.metadata().name, "slack-configured");
        assert!(plugin.adapter().is_none());
    }

    #[tokio::test]
    async fn hooks_and_adapter_calls_are_forwarded() {
        let (rpc, server) = fake_plugin(json!({
            "symbol": "Plugin",
            "interfaces": ["plugin", "adapter"],
            "metadata": slack_metadata()
        }));
        let plugin = ProcessPlugin::handshake(rpc, Path::new("/opt/slack"), None)
            .await
            .unwrap();
        plugin.initialize(&PluginConfig::default()).await.unwrap();
        plugin.start().await.unwrap();

        let adapter = plugin.adapter().unwrap();
        let message = Message {
            id: "m1".into(),
            content: "hello".into(),
            message_type: Default::default(),
            attachments: Vec::new(),
            reply_to: None,
            metadata: Default::default(),
            timestamp: chrono::Utc::now(),
            signature: String::new(),
        };
        let result = adapter
            .send_message(&Target::default(), &message)
            .await
            .unwrap();
        assert_eq!(result.message_id, "slack-m1");
        assert!(result.delivered);

        let health = plugin.health_check().await.unwrap_err();
        assert!(matches!(health, BastionError::Adapter(ref e) if e.message == "socket down"));

        plugin.stop().await.unwrap();
        drop(adapter);
        drop(plugin);
        let methods = server.await.unwrap();
        assert_eq!(
            methods,
            vec!["describe", "initialize", "start", "send_message", "health", "stop"]
        );
    }
}

// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `bastion serve` command implementation.
//!
//! Opens the lockdown state, brings up the configured plugins, binds the
//! application service, and forwards homeserver events to running adapters
//! until SIGINT or SIGTERM.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bastion_config::{
    AppServiceConfig, BastionConfig, LogFormat, OverflowPolicy, PluginLoadConfig, PluginsConfig,
};
use bastion_core::{AdapterConfig, BastionError, CommunicationPolicy, PlatformAdapter};
use bastion_gateway::{AppService, AppServiceSettings, OverflowMode};
use bastion_lockdown::LockdownManager;
use bastion_plugin::{ManagerSettings, PluginConfig, PluginManager, ProcessLoader};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::shutdown;

/// How often diverted overflow events are retried.
const OVERFLOW_RECOVERY_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the `bastion serve` command.
pub async fn run_serve(config: BastionConfig) -> Result<(), BastionError> {
    init_tracing(&config.bridge.log_level, config.bridge.log_format);
    bastion_plugin::describe_metrics();

    info!(id = %config.appservice.id, "starting bastion serve");

    let lockdown = Arc::new(LockdownManager::open(&config.lockdown.state_file)?);
    info!(
        mode = %lockdown.mode(),
        state_file = %config.lockdown.state_file.display(),
        "lockdown state loaded"
    );

    let plugins = Arc::new(PluginManager::new(
        manager_settings(&config.plugins),
        Arc::new(ProcessLoader::default()),
    ));
    if config.plugins.auto_discover {
        for found in plugins.discover() {
            info!(
                plugin = %found.metadata.name,
                descriptor = %found.descriptor_path.display(),
                "plugin descriptor discovered"
            );
        }
    }
    bring_up_plugins(&plugins, &config.plugins.load).await;

    let appservice = AppService::new(appservice_settings(&config.appservice))?
        .with_policy(Arc::clone(&lockdown) as Arc<dyn CommunicationPolicy>);
    if let Err(e) = appservice.start().await {
        shutdown_plugins(&plugins).await;
        return Err(e);
    }

    let cancel = shutdown::install_signal_handler();
    let dispatcher = Dispatcher::new(
        Arc::clone(&lockdown) as Arc<dyn CommunicationPolicy>,
        Arc::clone(&plugins),
    );
    let mut recovery = tokio::time::interval(OVERFLOW_RECOVERY_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = appservice.next_event() => match event {
                Some(event) => {
                    dispatcher.dispatch(&event).await;
                }
                None => {
                    info!("event stream closed");
                    break;
                }
            },
            _ = recovery.tick() => {
                let diverted = appservice.drain_overflow();
                if !diverted.is_empty() {
                    info!(count = diverted.len(), "replaying diverted events");
                    for event in &diverted {
                        dispatcher.dispatch(event).await;
                    }
                }
            }
        }
    }

    info!("shutting down");
    if let Err(e) = appservice.stop().await {
        warn!(error = %e, "appservice did not stop cleanly");
    }
    let drained = drain_remaining(&appservice, &dispatcher).await;
    if drained > 0 {
        info!(count = drained, "dispatched events acknowledged before shutdown");
    }
    shutdown_plugins(&plugins).await;
    info!("bastion serve stopped");
    Ok(())
}

/// Dispatch what is left on the stopped stream, then the overflow buffer.
///
/// Must run after [`AppService::stop`], which closes the stream.
async fn drain_remaining(appservice: &AppService, dispatcher: &Dispatcher) -> usize {
    let mut count = 0;
    while let Some(event) = appservice.next_event().await {
        dispatcher.dispatch(&event).await;
        count += 1;
    }
    for event in appservice.drain_overflow() {
        dispatcher.dispatch(&event).await;
        count += 1;
    }
    count
}

/// Load every configured plugin; initialize and start the enabled ones.
///
/// Failures are logged per plugin and never abort startup.
async fn bring_up_plugins(plugins: &PluginManager, entries: &[PluginLoadConfig]) {
    for entry in entries {
        let path = entry.library_path.display();
        let name = match plugins.load(plugin_config(entry)).await {
            Ok(name) => name,
            Err(e) => {
                warn!(library = %path, error = %e, "plugin failed to load");
                continue;
            }
        };
        if !entry.enabled {
            if let Err(e) = plugins.disable(&name).await {
                warn!(plugin = %name, error = %e, "could not disable plugin");
            }
            continue;
        }
        if let Err(e) = plugins.initialize_with_load_config(&name).await {
            warn!(plugin = %name, error = %e, "plugin failed to initialize");
            continue;
        }
        if let Err(e) = plugins.start(&name).await {
            warn!(plugin = %name, error = %e, "plugin failed to start");
            continue;
        }
        if let Ok(adapter) = plugins.get_adapter(&name).await {
            if let Err(e) = start_adapter(adapter.as_ref(), entry).await {
                warn!(plugin = %name, error = %e, "adapter failed to start");
            }
        }
    }
    info!(count = plugins.len().await, "plugins loaded");
}

async fn start_adapter(
    adapter: &dyn PlatformAdapter,
    entry: &PluginLoadConfig,
) -> Result<(), BastionError> {
    adapter
        .initialize(adapter_config(adapter.platform(), entry))
        .await?;
    adapter.start().await?;
    debug!(platform = adapter.platform(), "adapter started");
    Ok(())
}

async fn shutdown_plugins(plugins: &PluginManager) {
    for (name, adapter) in plugins.running_adapters().await {
        if let Err(e) = adapter.shutdown().await {
            warn!(plugin = %name, error = %e, "adapter shutdown failed");
        }
    }
    plugins.shutdown().await;
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins; otherwise `bastion=<level>,warn`.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bastion={log_level},warn")));

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(false)
            .init(),
    }
}

pub fn appservice_settings(config: &AppServiceConfig) -> AppServiceSettings {
    AppServiceSettings {
        id: config.id.clone(),
        homeserver_url: config.homeserver_url.clone(),
        server_name: config.server_name.clone(),
        as_token: config.as_token.clone(),
        hs_token: config.hs_token.clone(),
        sender_localpart: config.sender_localpart.clone(),
        listen_address: config.listen_address.clone(),
        listen_port: config.listen_port,
        max_transactions_per_second: config.max_transactions_per_second,
        event_channel_capacity: config.event_channel_capacity,
        overflow_capacity: config.overflow_capacity,
        on_overflow: match config.on_overflow {
            OverflowPolicy::Buffer => OverflowMode::Buffer,
            OverflowPolicy::Reject => OverflowMode::Reject,
        },
        shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
    }
}

pub fn manager_settings(config: &PluginsConfig) -> ManagerSettings {
    ManagerSettings {
        plugin_dir: config.plugin_dir.clone(),
        auto_discover: config.auto_discover,
        search_patterns: config.search_patterns.clone(),
    }
}

pub fn plugin_config(entry: &PluginLoadConfig) -> PluginConfig {
    PluginConfig {
        library_path: entry.library_path.clone(),
        metadata_path: entry.metadata_path.clone(),
        enabled: entry.enabled,
        config: entry.config.clone(),
        credentials: entry.credentials.clone(),
    }
}

/// Adapter settings are flat strings; JSON scalars keep their text form.
pub fn adapter_config(platform: &str, entry: &PluginLoadConfig) -> AdapterConfig {
    let settings: HashMap<String, String> = entry
        .config
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect();
    AdapterConfig {
        platform: platform.to_string(),
        enabled: entry.enabled,
        credentials: entry.credentials.clone(),
        settings,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use bastion_core::traits::policy::AllowAll;
    use bastion_plugin::PluginRegistry;
    use bastion_test_utils::MockPlugin;
    use serde_json::json;
    use tower::ServiceExt;

    fn config() -> BastionConfig {
        bastion_config::load_and_validate_str(
            r#"
[appservice]
homeserver_url = "https://matrix.example.org"
server_name = "example.org"
as_token = "as-secret"
hs_token = "hs-secret"
listen_port = 9999
on_overflow = "reject"
shutdown_timeout_secs = 3

[[plugins.load]]
library_path = "/opt/bastion/slack"
config = { workspace = "acme", retries = 3 }
credentials = { token = "xoxb" }
"#,
        )
        .unwrap()
    }

    #[test]
    fn appservice_settings_mirror_config() {
        let settings = appservice_settings(&config().appservice);
        assert_eq!(settings.homeserver_url, "https://matrix.example.org");
        assert_eq!(settings.on_overflow, OverflowMode::Reject);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(settings.bridge_user_id(), "@_bridge:example.org");
    }

    #[test]
    fn plugin_entry_carries_config_and_credentials() {
        let config = config();
        let entry = &config.plugins.load[0];
        let plugin = plugin_config(entry);
        assert!(plugin.enabled);
        assert_eq!(plugin.config["workspace"], json!("acme"));
        assert_eq!(plugin.credentials["token"], "xoxb");
    }

    #[test]
    fn adapter_settings_are_flattened_to_strings() {
        let config = config();
        let adapter = adapter_config("slack", &config.plugins.load[0]);
        assert_eq!(adapter.platform, "slack");
        assert_eq!(adapter.settings["workspace"], "acme");
        assert_eq!(adapter.settings["retries"], "3");
        assert_eq!(adapter.credentials["token"], "xoxb");
    }

    #[tokio::test]
    async fn acknowledged_events_are_dispatched_after_stop() {
        let slack = Arc::new(MockPlugin::adapter("slack-adapter", "slack"));
        let mut registry = PluginRegistry::new();
        registry.register("builtin:slack-adapter", slack.factory());
        let plugins = Arc::new(PluginManager::new(
            ManagerSettings::default(),
            Arc::new(registry),
        ));
        let name = plugins
            .load(PluginConfig {
                library_path: PathBuf::from("builtin:slack-adapter"),
                enabled: true,
                ..Default::default()
            })
            .await
            .unwrap();
        plugins.initialize_with_load_config(&name).await.unwrap();
        plugins.start(&name).await.unwrap();

        let mut settings = appservice_settings(&config().appservice);
        settings.on_overflow = OverflowMode::Buffer;
        settings.event_channel_capacity = 1;
        settings.overflow_capacity = 4;
        let appservice = AppService::new(settings).unwrap();

        let events: Vec<_> = (1..=3)
            .map(|i| {
                json!({
                    "type": "m.room.message",
                    "room_id": "!room:example.org",
                    "sender": "@alice:example.org",
                    "content": { "msgtype": "m.text", "body": format!("msg {i}") },
                    "event_id": format!("$ev{i}"),
                    "origin_server_ts": 1_700_000_000_000i64
                })
            })
            .collect();
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/transactions/txn-1")
            .header("authorization", "Bearer hs-secret")
            .body(Body::from(json!({ "events": events }).to_string()))
            .unwrap();
        let response = appservice.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(appservice.recent_overflow().len(), 2);

        appservice.stop().await.unwrap();
        let dispatcher = Dispatcher::new(Arc::new(AllowAll), Arc::clone(&plugins));
        assert_eq!(drain_remaining(&appservice, &dispatcher).await, 3);

        let sent = slack.mock_adapter().unwrap().sent_messages().await;
        let bodies: Vec<_> = sent.iter().map(|(_, m)| m.content.as_str()).collect();
        assert_eq!(bodies, vec!["msg 1", "msg 2", "msg 3"]);
        assert!(appservice.recent_overflow().is_empty());

        plugins.shutdown().await;
    }
}

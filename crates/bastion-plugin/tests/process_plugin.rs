// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Out-of-process loading against a real child process.
//!
//! Kept to a single test in its own binary: the script is written and then
//! executed, and a concurrent fork elsewhere in the same process could hold
//! the file open for writing.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use bastion_core::BastionError;
use bastion_plugin::{
    ManagerSettings, PluginConfig, PluginManager, PluginState, ProcessLoader,
};

/// Answers `describe` (always request 1), then replies `null` to every
/// later request, echoing its id.
const ECHO_PLUGIN: &str = r#"#!/bin/sh
read -r line
echo '{"id":1,"result":{"symbol":"Plugin","interfaces":["plugin","adapter"],"metadata":{"name":"echo-adapter","version":"0.1.0","api_version":"1.0.0","type":"adapter","platform":"echo"}}}'
while read -r line; do
  id=$(printf '%s' "$line" | sed 's/^{"id":\([0-9]*\).*/\1/')
  echo "{\"id\":$id,\"result\":null}"
done
"#;

const WRONG_SYMBOL_PLUGIN: &str = r#"#!/bin/sh
read -r line
echo '{"id":1,"result":{"symbol":"Main","interfaces":["plugin"]}}'
"#;

fn write_script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn process_plugin_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let echo = write_script(dir.path(), "echo-plugin", ECHO_PLUGIN);
    let wrong = write_script(dir.path(), "wrong-plugin", WRONG_SYMBOL_PLUGIN);

    let manager = PluginManager::new(
        ManagerSettings {
            plugin_dir: dir.path().to_path_buf(),
            ..Default::default()
        },
        Arc::new(ProcessLoader::new(Duration::from_secs(10))),
    );

    // Wrong entry point is reported and nothing is stored.
    let err = manager
        .load(PluginConfig {
            library_path: wrong,
            enabled: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BastionError::PluginSymbolInvalid { .. }));
    assert!(manager.is_empty().await);

    // Missing executable.
    let err = manager
        .load(PluginConfig {
            library_path: dir.path().join("absent"),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BastionError::PluginLibraryMissing { .. }));

    let config = PluginConfig {
        library_path: echo,
        enabled: true,
        ..Default::default()
    };
    let name = manager.load(config.clone()).await.unwrap();
    assert_eq!(name, "echo-adapter");

    manager.initialize(&name, config).await.unwrap();
    manager.start(&name).await.unwrap();
    assert_eq!(
        manager.get_plugin(&name).await.unwrap().state,
        PluginState::Running
    );

    let adapter = manager.get_adapter(&name).await.unwrap();
    assert_eq!(adapter.platform(), "echo");

    let health = manager.health_check().await;
    assert!(health[&name].is_ok());

    manager.unload(&name).await.unwrap();
    assert!(manager.is_empty().await);

    // The process is gone, so the retained adapter handle now fails.
    let err = adapter.metrics().await.unwrap_err();
    assert!(matches!(err, BastionError::Adapter(_)));
}

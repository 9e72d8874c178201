// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `bastion plugins discover` command implementation.

use std::io::IsTerminal;

use bastion_config::BastionConfig;
use bastion_core::BastionError;
use bastion_plugin::{discover_plugins, DiscoveredPlugin};
use colored::Colorize;
use serde::Serialize;

/// One row of `--json` output.
#[derive(Debug, Serialize)]
pub struct DiscoveredEntry {
    pub name: String,
    pub version: String,
    pub api_version: String,
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub platform: Option<String>,
    pub descriptor: String,
}

impl From<&DiscoveredPlugin> for DiscoveredEntry {
    fn from(found: &DiscoveredPlugin) -> Self {
        Self {
            name: found.metadata.name.clone(),
            version: found.metadata.version.clone(),
            api_version: found.metadata.api_version.clone(),
            plugin_type: found.metadata.plugin_type.to_string(),
            platform: found.metadata.platform.clone(),
            descriptor: found.descriptor_path.display().to_string(),
        }
    }
}

pub fn run_discover(config: &BastionConfig, json: bool) -> Result<(), BastionError> {
    let found = discover_plugins(&config.plugins.plugin_dir, &config.plugins.search_patterns);
    let entries: Vec<DiscoveredEntry> = found.iter().map(DiscoveredEntry::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!(
            "no plugin descriptors under {}",
            config.plugins.plugin_dir.display()
        );
        return Ok(());
    }
    let color = std::io::stdout().is_terminal();
    for entry in &entries {
        let name = if color {
            entry.name.bold().to_string()
        } else {
            entry.name.clone()
        };
        println!(
            "{name} {} ({}, api {}) {}",
            entry.version, entry.plugin_type, entry.api_version, entry.descriptor
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_plugin::PluginType;
    use bastion_test_utils::{descriptor, write_descriptor};

    #[test]
    fn entries_flatten_descriptor_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = descriptor("slack-adapter", PluginType::Adapter);
        meta.platform = Some("slack".to_string());
        write_descriptor(dir.path(), &meta).unwrap();

        let found = discover_plugins(dir.path(), &["*.json".to_string()]);
        let entry = DiscoveredEntry::from(&found[0]);
        assert_eq!(entry.name, "slack-adapter");
        assert_eq!(entry.plugin_type, "adapter");
        assert_eq!(entry.platform.as_deref(), Some("slack"));
        assert!(entry.descriptor.ends_with("slack-adapter.json"));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "adapter");
    }
}

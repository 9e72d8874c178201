// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin metadata descriptors and directory discovery.
//!
//! A descriptor is a JSON sidecar file next to the plugin executable:
//!
//! ```json
//! {
//!   "name": "slack-adapter",
//!   "version": "0.3.1",
//!   "api_version": "1.0.0",
//!   "type": "adapter",
//!   "platform": "slack",
//!   "capabilities": {"read": true, "write": true}
//! }
//! ```

use std::path::{Path, PathBuf};

use bastion_core::{BastionError, CapabilitySet};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What a plugin provides to the bridge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PluginType {
    /// Platform adapter (Slack, Discord, ...).
    Adapter,
    /// Message middleware.
    Middleware,
    /// Notification handler.
    Notifier,
}

/// Identification and capability info for a plugin. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique plugin name, e.g. `"slack-adapter"`. Records are keyed by it.
    pub name: String,
    /// Plugin version (semver).
    pub version: String,
    /// Plugin API version the plugin was built against.
    pub api_version: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<CapabilitySet>,
    /// Names of plugins that must be running before this one starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// JSON Schema for the plugin's `config` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<serde_json::Value>,
}

/// Intermediate deserialization struct so missing required fields get a
/// field-specific message instead of a serde error.
#[derive(Debug, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    api_version: String,
    #[serde(rename = "type", default)]
    plugin_type: Option<PluginType>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    license: String,
    platform: Option<String>,
    capabilities: Option<CapabilitySet>,
    #[serde(default)]
    dependencies: Vec<String>,
    config_schema: Option<serde_json::Value>,
}

impl PluginMetadata {
    /// Check the required fields. Returns the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("missing required field: name".to_string());
        }
        if self.version.is_empty() {
            return Err("missing required field: version".to_string());
        }
        Ok(())
    }

    /// Adapter version as semver, `0.0.0` if it does not parse.
    pub fn semver(&self) -> semver::Version {
        semver::Version::parse(&self.version).unwrap_or_else(|_| semver::Version::new(0, 0, 0))
    }
}

/// Parse a descriptor from JSON. `path` is only used in error messages.
pub fn parse_metadata(json: &str, path: &Path) -> Result<PluginMetadata, BastionError> {
    let invalid = |message: String| BastionError::InvalidMetadata {
        path: path.to_path_buf(),
        message,
    };

    let file: MetadataFile =
        serde_json::from_str(json).map_err(|e| invalid(format!("failed to parse metadata: {e}")))?;
    let Some(plugin_type) = file.plugin_type else {
        // name and version are checked first so the message matches field order.
        if file.name.is_empty() {
            return Err(invalid("missing required field: name".into()));
        }
        if file.version.is_empty() {
            return Err(invalid("missing required field: version".into()));
        }
        return Err(invalid("missing required field: type".into()));
    };

    let metadata = PluginMetadata {
        name: file.name,
        version: file.version,
        api_version: file.api_version,
        plugin_type,
        description: file.description,
        author: file.author,
        license: file.license,
        platform: file.platform,
        capabilities: file.capabilities,
        dependencies: file.dependencies,
        config_schema: file.config_schema,
    };
    metadata.validate().map_err(invalid)?;
    Ok(metadata)
}

/// Read and parse a descriptor file.
pub fn load_metadata(path: &Path) -> Result<PluginMetadata, BastionError> {
    let json = std::fs::read_to_string(path).map_err(|e| BastionError::InvalidMetadata {
        path: path.to_path_buf(),
        message: format!("failed to read metadata file: {e}"),
    })?;
    parse_metadata(&json, path)
}

/// A descriptor found during discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPlugin {
    pub descriptor_path: PathBuf,
    pub metadata: PluginMetadata,
}

/// Walk `dir` recursively for files whose name matches one of `patterns`
/// and parse each as a descriptor.
///
/// Best-effort: unreadable directories and malformed descriptors are skipped
/// with a debug log. A missing `dir` yields an empty list. Results are sorted
/// by descriptor path.
pub fn discover_plugins(dir: &Path, patterns: &[String]) -> Vec<DiscoveredPlugin> {
    let patterns: Vec<glob::Pattern> = patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(pattern = %p, error = %e, "ignoring invalid search pattern");
                None
            }
        })
        .collect();

    let mut found = Vec::new();
    if dir.is_dir() {
        walk(dir, &patterns, &mut found);
    }
    found.sort_by(|a, b| a.descriptor_path.cmp(&b.descriptor_path));
    found
}

fn walk(dir: &Path, patterns: &[glob::Pattern], found: &mut Vec<DiscoveredPlugin>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk(&path, patterns, found);
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| patterns.iter().any(|p| p.matches(name)));
        if !matches {
            continue;
        }
        match load_metadata(&path) {
            Ok(metadata) => found.push(DiscoveredPlugin {
                descriptor_path: path,
                metadata,
            }),
            Err(e) => tracing::debug!(error = %e, "skipping descriptor"),
        }
    }
}

// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin lifecycle manager, descriptor discovery, and plugin loaders.
//!
//! Platform adapters are plugins. The [`PluginManager`] loads them through a
//! [`PluginLoader`], checks their metadata against [`PLUGIN_API_VERSION`],
//! and drives each one through a strict lifecycle before exposing its
//! adapter to the rest of the bridge.

pub mod manager;
pub mod manifest;
pub mod plugin;
pub mod process;
pub mod registry;
pub mod rpc;

pub use manager::{
    describe_metrics, ManagerSettings, PluginInfo, PluginManager, PluginState, PLUGIN_API_VERSION,
};
pub use manifest::{
    discover_plugins, load_metadata, parse_metadata, DiscoveredPlugin, PluginMetadata, PluginType,
};
pub use plugin::{Plugin, PluginConfig};
pub use process::{ProcessLoader, ProcessPlugin, RemoteAdapter};
pub use registry::{PluginFactory, PluginLoader, PluginRegistry};

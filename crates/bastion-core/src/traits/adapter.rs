// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The stable contract every platform adapter (Slack, Discord, Teams, ...) satisfies.

use async_trait::async_trait;

use crate::error::BastionError;
use crate::types::{
    AdapterConfig, AdapterHealth, AdapterMetrics, CapabilitySet, ExternalEvent, Message,
    SendResult, Target,
};

/// A platform adapter reachable through the plugin manager.
///
/// Adapters own the platform wire format. Policy decisions and encryption
/// never cross this boundary; failures come back as
/// [`BastionError::Adapter`] carrying a classified [`crate::AdapterError`].
#[async_trait]
pub trait PlatformAdapter: Send + Sync + 'static {
    /// Platform identifier, e.g. `"slack"`.
    fn platform(&self) -> &str;

    /// Feature flags this adapter supports.
    fn capabilities(&self) -> CapabilitySet;

    /// Adapter version, used for compatibility reporting.
    fn version(&self) -> semver::Version;

    /// Applies configuration and injected credentials.
    async fn initialize(&self, config: AdapterConfig) -> Result<(), BastionError>;

    /// Begins platform I/O.
    async fn start(&self) -> Result<(), BastionError>;

    /// Stops platform I/O and releases resources.
    async fn shutdown(&self) -> Result<(), BastionError>;

    /// Delivers a message to the platform.
    async fn send_message(
        &self,
        target: &Target,
        message: &Message,
    ) -> Result<SendResult, BastionError>;

    /// Handles an event pushed by the platform.
    async fn receive_event(&self, event: ExternalEvent) -> Result<(), BastionError>;

    async fn health_check(&self) -> Result<AdapterHealth, BastionError>;

    async fn metrics(&self) -> Result<AdapterMetrics, BastionError>;
}

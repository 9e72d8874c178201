// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock platform adapter for deterministic testing.
//!
//! `MockAdapter` implements `PlatformAdapter`, captures every outbound
//! message and inbound event, and can be told to fail sends with a
//! classified adapter error.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use bastion_core::{
    AdapterConfig, AdapterError, AdapterHealth, AdapterMetrics, BastionError, CapabilitySet,
    ExternalEvent, Message, PlatformAdapter, SendResult, Target,
};

/// A mock platform adapter for testing.
pub struct MockAdapter {
    platform: String,
    capabilities: CapabilitySet,
    sent: Mutex<Vec<(Target, Message)>>,
    received: Mutex<Vec<ExternalEvent>>,
    calls: Mutex<Vec<&'static str>>,
    send_failure: Mutex<Option<AdapterError>>,
}

impl MockAdapter {
    /// Create an adapter for `platform` with read and write capabilities.
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            capabilities: CapabilitySet {
                read: true,
                write: true,
                ..Default::default()
            },
            sent: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            send_failure: Mutex::new(None),
        }
    }

    /// Make every following `send_message` fail with `error`; `None` clears it.
    pub async fn fail_sends(&self, error: Option<AdapterError>) {
        *self.send_failure.lock().await = error;
    }

    /// Every `(target, message)` passed to `send_message`, in order.
    pub async fn sent_messages(&self) -> Vec<(Target, Message)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn received_events(&self) -> Vec<ExternalEvent> {
        self.received.lock().await.clone()
    }

    /// Names of the contract methods called so far, in order.
    pub async fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: &'static str) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn initialize(&self, _config: AdapterConfig) -> Result<(), BastionError> {
        self.record("initialize").await;
        Ok(())
    }

    async fn start(&self) -> Result<(), BastionError> {
        self.record("start").await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BastionError> {
        self.record("shutdown").await;
        Ok(())
    }

    async fn send_message(
        &self,
        target: &Target,
        message: &Message,
    ) -> Result<SendResult, BastionError> {
        self.record("send_message").await;
        if let Some(error) = self.send_failure.lock().await.clone() {
            return Err(error.into());
        }
        self.sent.lock().await.push((target.clone(), message.clone()));
        Ok(SendResult {
            message_id: format!("mock-{}", uuid::Uuid::new_v4()),
            delivered: true,
            timestamp: Utc::now(),
            error: None,
            metadata: Default::default(),
        })
    }

    async fn receive_event(&self, event: ExternalEvent) -> Result<(), BastionError> {
        self.record("receive_event").await;
        self.received.lock().await.push(event);
        Ok(())
    }

    async fn health_check(&self) -> Result<AdapterHealth, BastionError> {
        self.record("health_check").await;
        Ok(AdapterHealth {
            connected: true,
            ..Default::default()
        })
    }

    async fn metrics(&self) -> Result<AdapterMetrics, BastionError> {
        self.record("metrics").await;
        let sent = self.sent.lock().await.len() as u64;
        let received = self.received.lock().await.len() as u64;
        Ok(AdapterMetrics {
            messages_sent: sent,
            messages_received: received,
            ..Default::default()
        })
    }
}

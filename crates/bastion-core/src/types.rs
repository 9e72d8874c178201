// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types: homeserver events and the platform adapter contract.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// --- Homeserver push protocol ---

/// A single event delivered by the homeserver.
///
/// Immutable once received; `event_id` is unique within one homeserver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub room_id: String,
    pub sender: String,
    pub content: serde_json::Map<String, serde_json::Value>,
    pub event_id: String,
    pub origin_server_ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<serde_json::Map<String, serde_json::Value>>,
}

/// An ordered batch of events delivered by one `PUT /transactions/{id}` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Profile returned for identity queries. Empty means "exists, no metadata".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "displayname", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

// --- Adapter contract ---

/// Fixed set of feature flags a platform adapter may support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySet {
    pub read: bool,
    pub write: bool,
    pub media: bool,
    pub reactions: bool,
    pub threads: bool,
    pub edit: bool,
    pub delete: bool,
    pub typing: bool,
    pub read_receipts: bool,
}

/// Destination of an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Target {
    pub platform: String,
    pub room_id: String,
    pub channel: String,
    pub user_id: String,
    pub thread_id: String,
    pub metadata: HashMap<String, String>,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Media,
}

/// A file attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    pub mime_type: String,
    pub size: u64,
    pub filename: String,
}

/// Message content handed to an adapter (already scrubbed upstream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    /// Hex HMAC-SHA256 over `content`, see [`crate::signing`].
    #[serde(default)]
    pub signature: String,
}

/// Outcome of a send operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    pub message_id: String,
    pub delivered: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::error::AdapterError>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// An event arriving from an external platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub platform: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub signature: String,
}

/// Per-adapter outbound rate limit settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub backoff_on_limit: bool,
}

/// Configuration handed to an adapter at initialize time. Never persisted here.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub platform: String,
    pub enabled: bool,
    pub credentials: HashMap<String, String>,
    pub settings: HashMap<String, String>,
    pub rate_limits: RateLimitConfig,
    pub webhook_url: Option<String>,
    pub default_target: Option<String>,
}

impl std::fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("platform", &self.platform)
            .field("enabled", &self.enabled)
            .field("credentials", &format!("[{} redacted]", self.credentials.len()))
            .field("settings", &self.settings)
            .field("rate_limits", &self.rate_limits)
            .field("webhook_url", &self.webhook_url)
            .field("default_target", &self.default_target)
            .finish()
    }
}

/// Health snapshot reported by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterHealth {
    pub connected: bool,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_message: Option<DateTime<Utc>>,
    /// Error percentage over the last hour.
    pub error_rate: f64,
    pub latency_ms: u64,
    pub queue_depth: u32,
    pub error: Option<String>,
}

/// Counters reported by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_failed: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_deserializes_full_shape() {
        let json = r#"{
            "type": "m.room.message",
            "room_id": "!room:example.org",
            "sender": "@alice:example.org",
            "content": {"body": "hi", "msgtype": "m.text"},
            "event_id": "$abc",
            "origin_server_ts": 1700000000000,
            "state_key": "",
            "unsigned": {"age": 12}
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "m.room.message");
        assert_eq!(event.sender, "@alice:example.org");
        assert_eq!(event.content["body"], "hi");
        assert_eq!(event.state_key.as_deref(), Some(""));
        assert!(event.unsigned.is_some());
    }

    #[test]
    fn event_serialization_omits_absent_optionals() {
        let event = Event {
            event_type: "m.room.message".into(),
            event_id: "$1".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"m.room.message\""));
        assert!(!json.contains("state_key"));
        assert!(!json.contains("unsigned"));
    }

    #[test]
    fn transaction_without_events_is_empty() {
        let txn: Transaction = serde_json::from_str("{}").unwrap();
        assert!(txn.events.is_empty());
    }

    #[test]
    fn empty_profile_serializes_to_empty_object() {
        let json = serde_json::to_string(&UserProfile::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn capability_set_defaults_missing_flags() {
        let caps: CapabilitySet = serde_json::from_str(r#"{"read": true, "threads": true}"#).unwrap();
        assert!(caps.read);
        assert!(caps.threads);
        assert!(!caps.write);
        assert!(!caps.read_receipts);
    }

    #[test]
    fn adapter_config_debug_redacts_credentials() {
        let mut config = AdapterConfig::default();
        config
            .credentials
            .insert("bot_token".into(), "xoxb-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("xoxb-secret"));
        assert!(debug.contains("redacted"));
    }
}

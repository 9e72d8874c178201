// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fan-out of homeserver events to running adapter plugins.
//!
//! Nothing leaves the device until the communication policy permits
//! bridging. Only room messages with a body (or media) are forwarded;
//! everything else is logged at debug and skipped.

use std::collections::HashMap;
use std::sync::Arc;

use bastion_core::signing::validate_message;
use bastion_core::types::{Attachment, MessageType};
use bastion_core::{CommunicationPolicy, Event, Message, Target};
use bastion_plugin::PluginManager;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

const ROOM_MESSAGE: &str = "m.room.message";

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The policy does not permit bridging yet.
    Blocked,
    /// Not a forwardable message.
    Skipped,
    /// Handed to every running adapter.
    Forwarded { delivered: usize, failed: usize },
}

pub struct Dispatcher {
    policy: Arc<dyn CommunicationPolicy>,
    plugins: Arc<PluginManager>,
}

impl Dispatcher {
    pub fn new(policy: Arc<dyn CommunicationPolicy>, plugins: Arc<PluginManager>) -> Self {
        Self { policy, plugins }
    }

    pub async fn dispatch(&self, event: &Event) -> DispatchOutcome {
        if !self.policy.bridging_permitted() {
            debug!(event_id = %event.event_id, "bridging not permitted, event held back");
            record("blocked");
            return DispatchOutcome::Blocked;
        }
        let Some(message) = event_to_message(event) else {
            debug!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                "event is not a forwardable message"
            );
            record("skipped");
            return DispatchOutcome::Skipped;
        };

        let mut delivered = 0;
        let mut failed = 0;
        for (plugin, adapter) in self.plugins.running_adapters().await {
            let target = target_for(adapter.platform(), event);
            match adapter.send_message(&target, &message).await {
                Ok(result) if result.delivered => delivered += 1,
                Ok(result) => {
                    failed += 1;
                    warn!(
                        plugin = %plugin,
                        event_id = %event.event_id,
                        error = ?result.error,
                        "adapter did not deliver message"
                    );
                }
                Err(e) => {
                    failed += 1;
                    warn!(plugin = %plugin, event_id = %event.event_id, error = %e, "send failed");
                }
            }
        }
        record("forwarded");
        DispatchOutcome::Forwarded { delivered, failed }
    }
}

fn record(outcome: &'static str) {
    metrics::counter!("bastion_dispatch_total", "outcome" => outcome).increment(1);
}

/// Convert a room message event into the adapter-facing message shape.
///
/// Returns `None` for other event types and for messages that carry
/// neither a body nor an attachment.
pub fn event_to_message(event: &Event) -> Option<Message> {
    if event.event_type != ROOM_MESSAGE {
        return None;
    }
    let content = &event.content;
    let body = str_field(content.get("body")).unwrap_or_default();
    let message_type = match str_field(content.get("msgtype")).as_deref() {
        Some("m.image") => MessageType::Image,
        Some("m.file") => MessageType::File,
        Some("m.video" | "m.audio") => MessageType::Media,
        _ => MessageType::Text,
    };

    let attachments = match (message_type, str_field(content.get("url"))) {
        (MessageType::Text, _) | (_, None) => Vec::new(),
        (_, Some(url)) => {
            let info = content.get("info");
            vec![Attachment {
                id: event.event_id.clone(),
                url,
                mime_type: str_field(info.and_then(|i| i.get("mimetype"))).unwrap_or_default(),
                size: info
                    .and_then(|i| i.get("size"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                filename: body.clone(),
            }]
        }
    };
    // Media bodies are file names, not text.
    let text = if attachments.is_empty() { body } else { String::new() };

    let reply_to = content
        .get("m.relates_to")
        .and_then(|r| r.get("m.in_reply_to"))
        .and_then(|r| r.get("event_id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let metadata = HashMap::from([
        ("room_id".to_string(), event.room_id.clone()),
        ("sender".to_string(), event.sender.clone()),
    ]);

    let timestamp =
        DateTime::from_timestamp_millis(event.origin_server_ts).unwrap_or_else(Utc::now);
    let message = Message {
        id: event.event_id.clone(),
        content: text,
        message_type,
        attachments,
        reply_to,
        metadata,
        timestamp,
        signature: String::new(),
    };
    validate_message(&message).ok().map(|()| message)
}

/// Target for `platform`: the room rides along so the adapter can map it.
pub fn target_for(platform: &str, event: &Event) -> Target {
    Target {
        platform: platform.to_string(),
        room_id: event.room_id.clone(),
        metadata: HashMap::from([("sender".to_string(), event.sender.clone())]),
        ..Default::default()
    }
}

fn str_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

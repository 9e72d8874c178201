// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Security-posture gate consulted before opening transports or bridging traffic.

/// Answers whether a transport or bridging operation is currently permitted.
///
/// Implemented by the lockdown state machine; the gateway and the dispatch
/// loop only see this trait.
pub trait CommunicationPolicy: Send + Sync {
    /// Whether the named transport (`"unix"`, `"tcp"`, ...) may be used.
    fn is_communication_allowed(&self, transport: &str) -> bool;

    /// Whether events may be relayed to external platforms.
    fn bridging_permitted(&self) -> bool;
}

/// A policy that permits everything. Used when no lockdown state is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CommunicationPolicy for AllowAll {
    fn is_communication_allowed(&self, _transport: &str) -> bool {
        true
    }

    fn bridging_permitted(&self) -> bool {
        true
    }
}

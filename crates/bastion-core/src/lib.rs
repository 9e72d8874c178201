// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Bastion bridge.
//!
//! This crate provides the error taxonomy, the homeserver event model, and the
//! platform adapter contract shared by the gateway, plugin manager, and
//! lockdown state machine.

pub mod error;
pub mod signing;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{AdapterError, BastionError, ErrorCode};
pub use types::{
    AdapterConfig, AdapterHealth, AdapterMetrics, CapabilitySet, Event, ExternalEvent, Message,
    SendResult, Target, Transaction, UserProfile,
};

pub use traits::{CommunicationPolicy, PlatformAdapter};

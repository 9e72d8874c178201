// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams shared between the gateway, plugin manager, and lockdown machine.
//!
//! Async traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod policy;

pub use adapter::PlatformAdapter;
pub use policy::CommunicationPolicy;

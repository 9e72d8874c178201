// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Bastion integration tests.
//!
//! Provides mock plugins and adapters for fast, deterministic tests without
//! external processes or platforms.
//!
//! # Components
//!
//! - [`MockAdapter`] - Platform adapter that captures sent messages and received events
//! - [`MockPlugin`] - Plugin with injectable hook failures and call capture

pub mod mock_adapter;
pub mod mock_plugin;

pub use mock_adapter::MockAdapter;
pub use mock_plugin::{descriptor, write_descriptor, Hook, MockPlugin};

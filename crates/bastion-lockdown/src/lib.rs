// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Security lockdown state machine for the Bastion bridge.
//!
//! The device starts in [`Mode::Lockdown`] and moves forward through
//! provisioning until [`Mode::Operational`]. The current posture lives in a
//! JSON state file that is rewritten on every change, and it decides which
//! transports the rest of the bridge may use.

pub mod manager;
pub mod mode;
mod persist;
pub mod state;

pub use manager::LockdownManager;
pub use mode::Mode;
pub use state::{LOCAL_TRANSPORT, LockdownState, LockdownStatus};

// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Security modes and the directed graph of legal transitions between them.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Provisioning stage of the device, in forward order.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    /// First boot: no network, single device.
    #[default]
    Lockdown,
    /// An administrator is claiming the device.
    Bonding,
    /// Security settings are being applied.
    Configuring,
    /// Final hardening.
    Hardening,
    /// Fully provisioned.
    Operational,
}

impl Mode {
    /// Whether the graph has an edge `self -> target`.
    ///
    /// `Bonding -> Lockdown` is the only backward edge. Nothing leaves
    /// `Operational`.
    pub fn can_transition_to(self, target: Mode) -> bool {
        matches!(
            (self, target),
            (Mode::Lockdown, Mode::Bonding)
                | (Mode::Bonding, Mode::Configuring)
                | (Mode::Bonding, Mode::Lockdown)
                | (Mode::Configuring, Mode::Hardening)
                | (Mode::Hardening, Mode::Operational)
        )
    }

    /// Modes reachable in one step.
    pub fn successors(self) -> &'static [Mode] {
        match self {
            Mode::Lockdown => &[Mode::Bonding],
            Mode::Bonding => &[Mode::Configuring, Mode::Lockdown],
            Mode::Configuring => &[Mode::Hardening],
            Mode::Hardening => &[Mode::Operational],
            Mode::Operational => &[],
        }
    }
}

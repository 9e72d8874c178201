// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mode::Mode;

/// Transport that is permitted in every mode.
pub const LOCAL_TRANSPORT: &str = "unix";

/// The persisted security posture.
///
/// This is the on-disk format; unknown fields from newer writers are ignored
/// and missing ones fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockdownState {
    pub mode: Mode,

    pub admin_established: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_claimed_at: Option<DateTime<Utc>>,

    pub single_device_mode: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authorized_devices: Vec<String>,

    /// Transports explicitly enabled. Ordered so the file is stable.
    #[serde(rename = "allowed_communication")]
    pub allowed_communications: BTreeSet<String>,

    pub setup_complete: bool,
    pub security_configured: bool,
    pub keystore_initialized: bool,
    pub secrets_injected: bool,
    pub hardening_complete: bool,

    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operational_at: Option<DateTime<Utc>>,
}

impl Default for LockdownState {
    fn default() -> Self {
        Self {
            mode: Mode::Lockdown,
            admin_established: false,
            admin_id: None,
            admin_device_id: None,
            admin_claimed_at: None,
            single_device_mode: true,
            authorized_devices: Vec::new(),
            allowed_communications: BTreeSet::from([LOCAL_TRANSPORT.to_string()]),
            setup_complete: false,
            security_configured: false,
            keystore_initialized: false,
            secrets_injected: false,
            hardening_complete: false,
            started_at: Utc::now(),
            configured_at: None,
            operational_at: None,
        }
    }
}

impl LockdownState {
    /// Apply the side effects of entering `target`.
    pub(crate) fn enter(&mut self, target: Mode) {
        self.mode = target;
        match target {
            Mode::Configuring => {
                self.configured_at.get_or_insert_with(Utc::now);
            }
            Mode::Operational => {
                self.setup_complete = true;
                self.single_device_mode = false;
                self.operational_at.get_or_insert_with(Utc::now);
            }
            _ => {}
        }
    }

    /// Every unmet prerequisite for going operational, in checklist order.
    pub fn operational_gaps(&self) -> Vec<String> {
        [
            (self.admin_established, "admin not established"),
            (self.security_configured, "security not configured"),
            (self.keystore_initialized, "keystore not initialized"),
            (self.hardening_complete, "hardening not complete"),
        ]
        .into_iter()
        .filter(|(done, _)| !done)
        .map(|(_, gap)| gap.to_string())
        .collect()
    }
}

/// Human-facing summary returned by `LockdownManager::status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockdownStatus {
    pub mode: Mode,
    pub admin_established: bool,
    pub single_device_mode: bool,
    pub allowed_communication: Vec<String>,
    pub setup_complete: bool,
    pub security_configured: bool,
    pub keystore_initialized: bool,
    pub secrets_injected: bool,
    pub hardening_complete: bool,
    pub started_at: DateTime<Utc>,
    pub configured_at: Option<DateTime<Utc>>,
    pub operational_at: Option<DateTime<Utc>>,
    /// Modes reachable from the current one.
    pub next: Vec<Mode>,
}

impl From<&LockdownState> for LockdownStatus {
    fn from(state: &LockdownState) -> Self {
        Self {
            mode: state.mode,
            admin_established: state.admin_established,
            single_device_mode: state.single_device_mode,
            allowed_communication: state.allowed_communications.iter().cloned().collect(),
            setup_complete: state.setup_complete,
            security_configured: state.security_configured,
            keystore_initialized: state.keystore_initialized,
            secrets_injected: state.secrets_injected,
            hardening_complete: state.hardening_complete,
            started_at: state.started_at,
            configured_at: state.configured_at,
            operational_at: state.operational_at,
            next: state.mode.successors().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_locked_down_with_unix_only() {
        let state = LockdownState::default();
        assert_eq!(state.mode, Mode::Lockdown);
        assert!(state.single_device_mode);
        assert!(!state.admin_established);
        assert_eq!(
            state.allowed_communications.iter().collect::<Vec<_>>(),
            vec!["unix"]
        );
    }

    #[test]
    fn entering_operational_completes_setup() {
        let mut state = LockdownState::default();
        state.enter(Mode::Operational);
        assert!(state.setup_complete);
        assert!(!state.single_device_mode);
        assert!(state.operational_at.is_some());
    }

    #[test]
    fn configured_at_is_stamped_once() {
        let mut state = LockdownState::default();
        state.enter(Mode::Configuring);
        let first = state.configured_at;
        state.enter(Mode::Configuring);
        assert_eq!(state.configured_at, first);
    }

    #[test]
    fn gaps_list_every_missing_prerequisite() {
        let mut state = LockdownState::default();
        assert_eq!(state.operational_gaps().len(), 4);
        state.admin_established = true;
        state.keystore_initialized = true;
        assert_eq!(
            state.operational_gaps(),
            vec!["security not configured", "hardening not complete"]
        );
    }

    #[test]
    fn minimal_file_fills_defaults() {
        let state: LockdownState =
            serde_json::from_str(r#"{"mode":"bonding","allowed_communication":["unix","tcp"]}"#)
                .unwrap();
        assert_eq!(state.mode, Mode::Bonding);
        assert!(state.allowed_communications.contains("tcp"));
        assert!(state.single_device_mode);
    }
}

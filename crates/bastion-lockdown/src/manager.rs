// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The lockdown manager: owner of the security posture.
//!
//! Every mutation builds the next state on a copy, persists it, and only then
//! publishes it, all while the write lock is held. A failed write leaves both
//! memory and disk on the previous state.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use bastion_core::{BastionError, CommunicationPolicy};
use chrono::Utc;
use tracing::{info, warn};

use crate::mode::Mode;
use crate::persist;
use crate::state::{LOCAL_TRANSPORT, LockdownState, LockdownStatus};

pub struct LockdownManager {
    state: RwLock<LockdownState>,
    state_file: Option<PathBuf>,
}

impl LockdownManager {
    /// Open the state file, starting from the default posture when absent.
    ///
    /// A missing file is not written until the first mutation.
    pub fn open(state_file: impl Into<PathBuf>) -> Result<Self, BastionError> {
        let state_file = state_file.into();
        let state = match persist::load(&state_file)? {
            Some(state) => state,
            None => {
                info!(path = %state_file.display(), "no lockdown state on disk, starting in lockdown");
                LockdownState::default()
            }
        };
        Ok(Self {
            state: RwLock::new(state),
            state_file: Some(state_file),
        })
    }

    /// A manager that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(LockdownState::default()),
            state_file: None,
        }
    }

    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, LockdownState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to a copy of the state, persist it, then publish it.
    fn mutate<F>(&self, f: F) -> Result<(), BastionError>
    where
        F: FnOnce(&mut LockdownState) -> Result<bool, BastionError>,
    {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        if !f(&mut next)? {
            return Ok(());
        }
        if let Some(path) = &self.state_file {
            persist::save(path, &next)?;
        }
        *guard = next;
        Ok(())
    }

    /// A copy of the full state.
    pub fn get_state(&self) -> LockdownState {
        self.read().clone()
    }

    pub fn mode(&self) -> Mode {
        self.read().mode
    }

    pub fn status(&self) -> LockdownStatus {
        LockdownStatus::from(&*self.read())
    }

    /// Whether the graph permits moving from the current mode to `target`.
    pub fn can_transition(&self, target: Mode) -> Result<(), BastionError> {
        let current = self.read().mode;
        check_edge(current, target)
    }

    /// Move to `target` and persist before returning.
    ///
    /// Only checks the edge. Callers wanting setup prerequisites enforced
    /// call [`check_ready_for_transition`](Self::check_ready_for_transition) first.
    pub fn transition(&self, target: Mode) -> Result<(), BastionError> {
        let mut from = Mode::default();
        self.mutate(|state| {
            from = state.mode;
            check_edge(state.mode, target)?;
            state.enter(target);
            Ok(true)
        })?;
        info!(from = %from, to = %target, "lockdown mode changed");
        Ok(())
    }

    /// Setup prerequisites for entering `target`, independent of the edge check.
    pub fn check_ready_for_transition(&self, target: Mode) -> Result<(), BastionError> {
        let state = self.read();
        let gap = match target {
            Mode::Bonding if state.mode != Mode::Lockdown => {
                Some("bonding can only be entered from lockdown")
            }
            Mode::Configuring if !state.admin_established => {
                Some("admin must be established before configuration")
            }
            Mode::Hardening if !state.security_configured => {
                Some("security must be configured before hardening")
            }
            Mode::Operational => {
                let gaps: Vec<String> = [
                    (state.keystore_initialized, "keystore must be initialized"),
                    (state.hardening_complete, "hardening must be complete"),
                ]
                .into_iter()
                .filter(|(done, _)| !done)
                .map(|(_, gap)| gap.to_string())
                .collect();
                if gaps.is_empty() {
                    None
                } else {
                    return Err(BastionError::AggregatedValidationFailure(gaps));
                }
            }
            _ => None,
        };
        match gap {
            Some(gap) => Err(BastionError::AggregatedValidationFailure(vec![
                gap.to_string(),
            ])),
            None => Ok(()),
        }
    }

    /// Report every unmet prerequisite for going operational at once.
    pub fn validate_for_operational(&self) -> Result<(), BastionError> {
        let gaps = self.read().operational_gaps();
        if gaps.is_empty() {
            Ok(())
        } else {
            Err(BastionError::AggregatedValidationFailure(gaps))
        }
    }

    /// Record the administrator who claimed the device.
    pub fn establish_admin(&self, admin_id: &str, device_id: &str) -> Result<(), BastionError> {
        self.mutate(|state| {
            if state.admin_established {
                return Err(BastionError::AdminAlreadyEstablished);
            }
            state.admin_established = true;
            state.admin_id = Some(admin_id.to_string());
            state.admin_device_id = Some(device_id.to_string());
            state.admin_claimed_at = Some(Utc::now());
            state.authorized_devices = vec![device_id.to_string()];
            Ok(true)
        })?;
        info!(admin_id, device_id, "administrator established");
        Ok(())
    }

    /// Add a device to the authorized list. Requires an administrator.
    pub fn authorize_device(&self, device_id: &str) -> Result<(), BastionError> {
        self.mutate(|state| {
            if !state.admin_established {
                return Err(BastionError::AdminNotEstablished);
            }
            if state.authorized_devices.iter().any(|d| d == device_id) {
                return Ok(false);
            }
            state.authorized_devices.push(device_id.to_string());
            Ok(true)
        })
    }

    pub fn set_security_configured(&self) -> Result<(), BastionError> {
        self.set_flag(|s| &mut s.security_configured)
    }

    pub fn set_keystore_initialized(&self) -> Result<(), BastionError> {
        self.set_flag(|s| &mut s.keystore_initialized)
    }

    pub fn set_secrets_injected(&self) -> Result<(), BastionError> {
        self.set_flag(|s| &mut s.secrets_injected)
    }

    pub fn set_hardening_complete(&self) -> Result<(), BastionError> {
        self.set_flag(|s| &mut s.hardening_complete)
    }

    fn set_flag(&self, field: fn(&mut LockdownState) -> &mut bool) -> Result<(), BastionError> {
        self.mutate(|state| {
            let flag = field(state);
            let changed = !*flag;
            *flag = true;
            Ok(changed)
        })
    }

    pub fn is_admin_established(&self) -> bool {
        self.read().admin_established
    }

    pub fn is_setup_complete(&self) -> bool {
        self.read().setup_complete
    }

    pub fn is_single_device_mode(&self) -> bool {
        self.read().single_device_mode
    }

    pub fn get_allowed_communication(&self) -> Vec<String> {
        self.read().allowed_communications.iter().cloned().collect()
    }

    /// `unix` is allowed in every mode; anything else must be enabled.
    pub fn is_communication_allowed(&self, transport: &str) -> bool {
        transport == LOCAL_TRANSPORT || self.read().allowed_communications.contains(transport)
    }

    /// Enable a transport. Enabling one that is already present is a no-op.
    pub fn add_allowed_communication(&self, transport: &str) -> Result<(), BastionError> {
        let transport = transport.trim();
        if transport.is_empty() {
            return Err(BastionError::Internal(
                "transport name must not be empty".into(),
            ));
        }
        self.mutate(|state| Ok(state.allowed_communications.insert(transport.to_string())))?;
        if transport != LOCAL_TRANSPORT && self.mode() != Mode::Operational {
            warn!(transport, mode = %self.mode(), "network transport enabled before operational");
        }
        Ok(())
    }
}

fn check_edge(from: Mode, to: Mode) -> Result<(), BastionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(BastionError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

impl CommunicationPolicy for LockdownManager {
    fn is_communication_allowed(&self, transport: &str) -> bool {
        LockdownManager::is_communication_allowed(self, transport)
    }

    /// Traffic only crosses to external platforms once fully provisioned.
    fn bridging_permitted(&self) -> bool {
        self.mode() == Mode::Operational
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn manager_in(mode: Mode) -> LockdownManager {
        let manager = LockdownManager::in_memory();
        manager.state.write().unwrap().mode = mode;
        manager
    }

    #[test]
    fn forward_path_reaches_operational() {
        let m = LockdownManager::in_memory();
        for target in [
            Mode::Bonding,
            Mode::Configuring,
            Mode::Hardening,
            Mode::Operational,
        ] {
            m.transition(target).unwrap();
        }
        assert_eq!(m.mode(), Mode::Operational);
        assert!(m.is_setup_complete());
        assert!(!m.is_single_device_mode());
    }

    #[test]
    fn every_pair_matches_the_edge_list() {
        for from in Mode::iter() {
            for to in Mode::iter() {
                let m = manager_in(from);
                let result = m.transition(to);
                if from.can_transition_to(to) {
                    assert!(result.is_ok(), "{from} -> {to} should succeed");
                    assert_eq!(m.mode(), to);
                } else {
                    assert!(
                        matches!(result, Err(BastionError::InvalidTransition { .. })),
                        "{from} -> {to} should be rejected"
                    );
                    assert_eq!(m.mode(), from);
                }
            }
        }
    }

    #[test]
    fn retreat_only_from_bonding() {
        let m = LockdownManager::in_memory();
        m.transition(Mode::Bonding).unwrap();
        m.transition(Mode::Lockdown).unwrap();
        m.transition(Mode::Bonding).unwrap();
        m.transition(Mode::Configuring).unwrap();
        let err = m.transition(Mode::Lockdown).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid transition from configuring to lockdown"
        );
    }

    #[test]
    fn operational_validation_lists_all_gaps() {
        let m = LockdownManager::in_memory();
        match m.validate_for_operational() {
            Err(BastionError::AggregatedValidationFailure(gaps)) => assert_eq!(gaps.len(), 4),
            other => panic!("expected aggregated failure, got {other:?}"),
        }

        m.establish_admin("admin-1", "device-1").unwrap();
        m.set_security_configured().unwrap();
        m.set_keystore_initialized().unwrap();
        m.set_hardening_complete().unwrap();
        assert!(m.validate_for_operational().is_ok());
    }

    #[test]
    fn readiness_checks_follow_setup_progress() {
        let m = LockdownManager::in_memory();
        assert!(m.check_ready_for_transition(Mode::Bonding).is_ok());
        assert!(m.check_ready_for_transition(Mode::Configuring).is_err());
        m.establish_admin("admin-1", "device-1").unwrap();
        assert!(m.check_ready_for_transition(Mode::Configuring).is_ok());

        match m.check_ready_for_transition(Mode::Operational) {
            Err(BastionError::AggregatedValidationFailure(gaps)) => assert_eq!(gaps.len(), 2),
            other => panic!("expected two gaps, got {other:?}"),
        }
    }

    #[test]
    fn admin_can_only_be_claimed_once() {
        let m = LockdownManager::in_memory();
        m.establish_admin("admin-1", "device-1").unwrap();
        assert!(matches!(
            m.establish_admin("admin-2", "device-2"),
            Err(BastionError::AdminAlreadyEstablished)
        ));
        assert_eq!(m.get_state().admin_id.as_deref(), Some("admin-1"));
    }

    #[test]
    fn devices_need_an_admin() {
        let m = LockdownManager::in_memory();
        assert!(matches!(
            m.authorize_device("device-9"),
            Err(BastionError::AdminNotEstablished)
        ));
        m.establish_admin("admin-1", "device-1").unwrap();
        m.authorize_device("device-9").unwrap();
        m.authorize_device("device-9").unwrap();
        assert_eq!(m.get_state().authorized_devices, vec!["device-1", "device-9"]);
    }

    #[test]
    fn unix_always_allowed_tcp_needs_enablement() {
        let m = LockdownManager::in_memory();
        assert!(m.is_communication_allowed("unix"));
        assert!(!m.is_communication_allowed("tcp"));
        m.add_allowed_communication("tcp").unwrap();
        m.add_allowed_communication("tcp").unwrap();
        assert!(m.is_communication_allowed("tcp"));
        assert_eq!(m.get_allowed_communication(), vec!["tcp", "unix"]);
    }

    #[test]
    fn get_state_is_a_copy() {
        let m = LockdownManager::in_memory();
        let mut copy = m.get_state();
        copy.mode = Mode::Operational;
        copy.allowed_communications.insert("tcp".into());
        assert_eq!(m.mode(), Mode::Lockdown);
        assert!(!m.is_communication_allowed("tcp"));
    }

    #[test]
    fn bridging_is_gated_on_operational() {
        let m = manager_in(Mode::Hardening);
        let policy: &dyn CommunicationPolicy = &m;
        assert!(!policy.bridging_permitted());
        m.transition(Mode::Operational).unwrap();
        assert!(policy.bridging_permitted());
    }

    #[test]
    fn status_reports_next_modes() {
        let m = manager_in(Mode::Bonding);
        let status = m.status();
        assert_eq!(status.mode, Mode::Bonding);
        assert_eq!(status.next, vec![Mode::Configuring, Mode::Lockdown]);
    }
}

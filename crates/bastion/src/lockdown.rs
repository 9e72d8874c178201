// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `bastion lockdown` command implementations.
//!
//! Every command opens the state file named by `[lockdown] state_file`,
//! applies one change, and relies on the manager to persist it before
//! returning.

use std::io::IsTerminal;

use bastion_config::BastionConfig;
use bastion_core::BastionError;
use bastion_lockdown::{LockdownManager, LockdownStatus, Mode};
use clap::ValueEnum;
use colored::Colorize;

/// Setup steps an operator can mark as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SetupStep {
    Security,
    Keystore,
    Secrets,
    Hardening,
}

fn open(config: &BastionConfig) -> Result<LockdownManager, BastionError> {
    LockdownManager::open(&config.lockdown.state_file)
}

/// Run `bastion lockdown status`.
pub fn run_status(config: &BastionConfig, json: bool, plain: bool) -> Result<(), BastionError> {
    let status = open(config)?.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    let color = !plain && std::io::stdout().is_terminal();
    print!("{}", render_status(&status, color));
    Ok(())
}

/// Human-readable status block.
pub fn render_status(status: &LockdownStatus, color: bool) -> String {
    let mode = status.mode.to_string();
    let mode = if !color {
        mode
    } else if status.mode == Mode::Operational {
        mode.green().bold().to_string()
    } else {
        mode.yellow().bold().to_string()
    };
    let check = |done: bool| match (done, color) {
        (true, true) => "yes".green().to_string(),
        (false, true) => "no".red().to_string(),
        (true, false) => "yes".to_string(),
        (false, false) => "no".to_string(),
    };
    let next = if status.next.is_empty() {
        "-".to_string()
    } else {
        status
            .next
            .iter()
            .map(Mode::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut out = String::new();
    out.push_str(&format!("mode:                 {mode}\n"));
    out.push_str(&format!("next:                 {next}\n"));
    out.push_str(&format!(
        "admin established:    {}\n",
        check(status.admin_established)
    ));
    out.push_str(&format!(
        "security configured:  {}\n",
        check(status.security_configured)
    ));
    out.push_str(&format!(
        "keystore initialized: {}\n",
        check(status.keystore_initialized)
    ));
    out.push_str(&format!(
        "secrets injected:     {}\n",
        check(status.secrets_injected)
    ));
    out.push_str(&format!(
        "hardening complete:   {}\n",
        check(status.hardening_complete)
    ));
    out.push_str(&format!(
        "transports:           {}\n",
        status.allowed_communication.join(", ")
    ));
    out
}

/// Run `bastion lockdown transition <mode>`.
///
/// Setup prerequisites are checked first unless `force` is set; the
/// transition graph is always enforced.
pub fn run_transition(config: &BastionConfig, target: Mode, force: bool) -> Result<(), BastionError> {
    let manager = open(config)?;
    transition(&manager, target, force)?;
    println!("lockdown mode: {}", manager.mode());
    Ok(())
}

pub fn transition(manager: &LockdownManager, target: Mode, force: bool) -> Result<(), BastionError> {
    manager.can_transition(target)?;
    if !force {
        manager.check_ready_for_transition(target)?;
        if target == Mode::Operational {
            manager.validate_for_operational()?;
        }
    }
    manager.transition(target)
}

pub fn run_establish_admin(
    config: &BastionConfig,
    admin_id: &str,
    device_id: &str,
) -> Result<(), BastionError> {
    open(config)?.establish_admin(admin_id, device_id)?;
    println!("administrator {admin_id} established on device {device_id}");
    Ok(())
}

pub fn run_authorize_device(config: &BastionConfig, device_id: &str) -> Result<(), BastionError> {
    open(config)?.authorize_device(device_id)?;
    println!("device {device_id} authorized");
    Ok(())
}

pub fn run_complete(config: &BastionConfig, step: SetupStep) -> Result<(), BastionError> {
    complete(&open(config)?, step)?;
    println!("setup step {step:?} recorded");
    Ok(())
}

pub fn complete(manager: &LockdownManager, step: SetupStep) -> Result<(), BastionError> {
    match step {
        SetupStep::Security => manager.set_security_configured(),
        SetupStep::Keystore => manager.set_keystore_initialized(),
        SetupStep::Secrets => manager.set_secrets_injected(),
        SetupStep::Hardening => manager.set_hardening_complete(),
    }
}

pub fn run_allow(config: &BastionConfig, transport: &str) -> Result<(), BastionError> {
    let manager = open(config)?;
    manager.add_allowed_communication(transport)?;
    println!(
        "allowed transports: {}",
        manager.get_allowed_communication().join(", ")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_to_hardening(manager: &LockdownManager) {
        transition(manager, Mode::Bonding, false).unwrap();
        manager.establish_admin("@admin:example.org", "DEVICE1").unwrap();
        transition(manager, Mode::Configuring, false).unwrap();
        complete(manager, SetupStep::Security).unwrap();
        transition(manager, Mode::Hardening, false).unwrap();
    }

    #[test]
    fn readiness_is_checked_unless_forced() {
        let manager = LockdownManager::in_memory();
        transition(&manager, Mode::Bonding, false).unwrap();

        let err = transition(&manager, Mode::Configuring, false).unwrap_err();
        assert!(matches!(err, BastionError::AggregatedValidationFailure(_)));
        assert_eq!(manager.mode(), Mode::Bonding);

        transition(&manager, Mode::Configuring, true).unwrap();
        assert_eq!(manager.mode(), Mode::Configuring);
    }

    #[test]
    fn force_never_skips_the_graph() {
        let manager = LockdownManager::in_memory();
        let err = transition(&manager, Mode::Operational, true).unwrap_err();
        assert!(matches!(err, BastionError::InvalidTransition { .. }));
        assert_eq!(manager.mode(), Mode::Lockdown);
    }

    #[test]
    fn operational_requires_every_setup_step() {
        let manager = LockdownManager::in_memory();
        walk_to_hardening(&manager);
        complete(&manager, SetupStep::Hardening).unwrap();

        // Keystore is still missing.
        let err = transition(&manager, Mode::Operational, false).unwrap_err();
        assert!(matches!(err, BastionError::AggregatedValidationFailure(_)));
        assert_eq!(manager.mode(), Mode::Hardening);

        complete(&manager, SetupStep::Keystore).unwrap();
        transition(&manager, Mode::Operational, false).unwrap();
        assert!(manager.is_setup_complete());
    }

    #[test]
    fn plain_status_has_no_escape_codes() {
        let manager = LockdownManager::in_memory();
        let text = render_status(&manager.status(), false);
        assert!(text.contains("mode:                 lockdown"));
        assert!(text.contains("next:                 bonding"));
        assert!(text.contains("admin established:    no"));
        assert!(!text.contains('\u{1b}'));
    }
}

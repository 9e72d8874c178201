// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bastion - zero-trust bridge between a homeserver and external platforms.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod dispatch;
mod lockdown;
mod plugins;
mod serve;
mod shutdown;

use std::path::PathBuf;

use bastion_config::BastionConfig;
use bastion_lockdown::Mode;
use clap::{Parser, Subcommand};

/// Bastion - zero-trust bridge between a homeserver and external platforms.
#[derive(Parser, Debug)]
#[command(name = "bastion", version, about, long_about = None)]
struct Cli {
    /// Load this file instead of the standard configuration hierarchy.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the application service and configured plugins.
    Serve,
    /// Inspect or advance the lockdown state machine.
    Lockdown {
        #[command(subcommand)]
        action: LockdownCommand,
    },
    /// Inspect plugin descriptors.
    Plugins {
        #[command(subcommand)]
        action: PluginsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LockdownCommand {
    /// Show the current mode and setup progress.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Move to another mode.
    Transition {
        /// Target mode (lockdown, bonding, configuring, hardening, operational).
        mode: Mode,
        /// Only check the transition graph, not setup prerequisites.
        #[arg(long)]
        force: bool,
    },
    /// Record the administrator that claims this device.
    EstablishAdmin { admin_id: String, device_id: String },
    /// Add a device to the authorized list.
    AuthorizeDevice { device_id: String },
    /// Mark a setup step as done.
    Complete { step: lockdown::SetupStep },
    /// Enable a communication transport.
    Allow { transport: String },
}

#[derive(Subcommand, Debug)]
enum PluginsCommand {
    /// List descriptors found under the plugin directory.
    Discover {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> BastionConfig {
    let result = match path {
        Some(path) => bastion_config::load_and_validate_path(path),
        None => bastion_config::load_and_validate(),
    };
    match result {
        Ok(config) => config,
        Err(errors) => {
            bastion_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Lockdown { action } => match action {
            LockdownCommand::Status { json, plain } => lockdown::run_status(&config, json, plain),
            LockdownCommand::Transition { mode, force } => {
                lockdown::run_transition(&config, mode, force)
            }
            LockdownCommand::EstablishAdmin {
                admin_id,
                device_id,
            } => lockdown::run_establish_admin(&config, &admin_id, &device_id),
            LockdownCommand::AuthorizeDevice { device_id } => {
                lockdown::run_authorize_device(&config, &device_id)
            }
            LockdownCommand::Complete { step } => lockdown::run_complete(&config, step),
            LockdownCommand::Allow { transport } => lockdown::run_allow(&config, &transport),
        },
        Commands::Plugins { action } => match action {
            PluginsCommand::Discover { json } => plugins::run_discover(&config, json),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AGW - a single-authority agent gateway.
//!
//! Binary entry point: `serve` runs the gateway, `doctor` audits the
//! effective configuration, `config` prints it.

mod doctor;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// AGW - a single-authority agent gateway.
#[derive(Parser, Debug)]
#[command(name = "agw", version, about, long_about = None)]
struct Cli {
    /// Path to a config file (defaults to the XDG hierarchy + AGW_* env).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server.
    Serve,
    /// Audit the effective configuration and policy.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration.
    Config,
}

fn load(config_path: Option<&PathBuf>) -> agw_config::AgwConfig {
    let result = match config_path {
        Some(path) => agw_config::load_config_from_path(path),
        None => agw_config::load_config(),
    };
    match result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: invalid configuration: {e}");
            std::process::exit(2);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref());

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Doctor { plain } => doctor::run_doctor(&config, plain),
        Commands::Config => {
            match serde_json::to_string_pretty(&config) {
                Ok(json) => {
                    println!("{json}");
                    Ok(())
                }
                Err(e) => Err(agw_core::AgwError::Internal(e.to_string())),
            }
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `agw doctor` command implementation.
//!
//! Runs the security posture audit against the effective configuration
//! and prints findings with severity markers.

use std::io::IsTerminal;

use colored::Colorize;

use agw_config::AgwConfig;
use agw_core::AgwError;
use agw_gateway::audit::run_audit;
use agw_gateway::discover_plugins;

/// Runs the `agw doctor` command. With `--plain`, disables colored output.
pub fn run_doctor(config: &AgwConfig, plain: bool) -> Result<(), AgwError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let policy = config.initial_policy();
    let plugins = discover_plugins(&config.server.plugin_dir);
    let findings = run_audit(config, &policy, &plugins);

    println!();
    println!("  agw doctor");
    println!("  {}", "-".repeat(60));

    if findings.is_empty() {
        println!("    no findings");
        println!();
        return Ok(());
    }

    let mut critical_or_high = 0;
    for finding in &findings {
        if finding.severity == "critical" || finding.severity == "high" {
            critical_or_high += 1;
        }
        let line = format!(
            "    [{:<8}] {:<26} {}",
            finding.severity.to_uppercase(),
            finding.code,
            finding.message
        );
        if use_color {
            match finding.severity.as_str() {
                "critical" | "high" => println!("{}", line.red()),
                "medium" => println!("{}", line.yellow()),
                _ => println!("{line}"),
            }
        } else {
            println!("{line}");
        }
    }

    println!();
    println!(
        "  {} finding(s), {} critical/high",
        findings.len(),
        critical_or_high
    );
    println!();

    Ok(())
}

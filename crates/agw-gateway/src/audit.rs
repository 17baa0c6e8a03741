// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Security posture audit, served by `req:doctor.audit` and the doctor CLI.

use serde::{Deserialize, Serialize};

use agw_config::AgwConfig;
use agw_core::Policy;

use crate::plugins::LoadedPlugin;

/// One audit finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// "critical", "high", "medium", or "low".
    pub severity: String,
    pub code: String,
    pub message: String,
}

impl Finding {
    fn new(severity: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: severity.to_string(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Audits the effective configuration, policy, and loaded plugins.
pub fn run_audit(
    config: &AgwConfig,
    policy: &Policy,
    loaded_plugins: &[LoadedPlugin],
) -> Vec<Finding> {
    let mut findings = Vec::new();

    if config.server.host == "0.0.0.0" && config.security.require_client_auth {
        findings.push(Finding::new(
            "high",
            "gateway_exposed",
            "host is 0.0.0.0; ensure firewall, TLS termination, and auth are in place",
        ));
    }
    if config.security.require_client_auth && config.security.api_keys.is_empty() {
        findings.push(Finding::new(
            "critical",
            "no_client_api_keys",
            "client auth is required but no API keys are configured; every client is rejected",
        ));
    }
    if policy.channel_allowlist.is_empty() {
        findings.push(Finding::new(
            "high",
            "allowlist_empty",
            "deny-by-default means all inbound is blocked; configure the channel allowlist if unintended",
        ));
    }
    if !policy.require_approval_for_write {
        findings.push(Finding::new(
            "high",
            "write_tools_no_approval",
            "write tools can execute without human approval; recommended ON",
        ));
    }
    if !config.log.json {
        findings.push(Finding::new(
            "medium",
            "non_json_logs",
            "prefer JSON logs for always-on operation",
        ));
    }
    if !loaded_plugins.is_empty() {
        findings.push(Finding::new(
            "low",
            "plugins_unsigned",
            "plugins are local code; consider signing or allowlisting plugin hashes",
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn codes(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.code.as_str()).collect()
    }

    fn plugin(name: &str) -> LoadedPlugin {
        LoadedPlugin {
            name: name.to_string(),
            path: PathBuf::from(format!("./plugins/{name}/plugin.toml")),
        }
    }

    #[test]
    fn default_config_flags_missing_keys_and_empty_allowlist() {
        let config = AgwConfig::default();
        let policy = Policy::default();
        let findings = run_audit(&config, &policy, &[]);
        let codes = codes(&findings);
        assert!(codes.contains(&"no_client_api_keys"));
        assert!(codes.contains(&"allowlist_empty"));
        assert!(!codes.contains(&"gateway_exposed"), "default host is loopback");
        assert!(!codes.contains(&"plugins_unsigned"), "no plugins loaded");
    }

    #[test]
    fn exposed_host_with_auth_required_is_flagged() {
        let mut config = AgwConfig::default();
        config.server.host = "0.0.0.0".to_string();
        let findings = run_audit(&config, &Policy::default(), &[]);
        assert!(codes(&findings).contains(&"gateway_exposed"));
    }

    #[test]
    fn exposed_host_without_auth_is_not_flagged() {
        let mut config = AgwConfig::default();
        config.server.host = "0.0.0.0".to_string();
        config.security.require_client_auth = false;
        let findings = run_audit(&config, &Policy::default(), &[]);
        assert!(!codes(&findings).contains(&"gateway_exposed"));
    }

    #[test]
    fn disabled_write_approvals_are_flagged() {
        let config = AgwConfig::default();
        let mut policy = Policy::default();
        policy.require_approval_for_write = false;
        let findings = run_audit(&config, &policy, &[]);
        assert!(codes(&findings).contains(&"write_tools_no_approval"));
    }

    #[test]
    fn loaded_plugins_are_flagged_low() {
        let config = AgwConfig::default();
        let findings = run_audit(&config, &Policy::default(), &[plugin("weather")]);
        let unsigned = findings
            .iter()
            .find(|f| f.code == "plugins_unsigned")
            .expect("plugins_unsigned finding");
        assert_eq!(unsigned.severity, "low");
    }

    #[test]
    fn hardened_setup_yields_no_high_findings() {
        let mut config = AgwConfig::default();
        config.security.api_keys.push("k1".into());
        let mut policy = Policy::default();
        policy
            .channel_allowlist
            .insert("webchat-1".into(), std::collections::BTreeSet::from(["alice".to_string()]));
        let findings = run_audit(&config, &policy, &[]);
        assert!(
            findings.iter().all(|f| f.severity != "critical" && f.severity != "high"),
            "unexpected findings: {findings:?}"
        );
    }
}

// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for layered config loading.

use agw_config::{load_config_from_str, AgwConfig};
use agw_core::types::ChatPolicy;

#[test]
fn empty_config_yields_defaults() {
    let config = load_config_from_str("").unwrap();

    assert_eq!(config.server.instance_id, "agw-1");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8787);
    assert_eq!(config.run.max_steps, 20);
    assert_eq!(config.run.timeout_s, 300);
    assert_eq!(config.run.tool_timeout_s, 30);
    assert_eq!(config.run.approval_timeout_s, 300);
    assert_eq!(config.run.llm_timeout_s, 60);
    assert_eq!(config.run.max_context_messages, 50);
    assert!(config.security.require_client_auth);
    assert!(config.security.require_approval_for_write);
    assert!((config.security.rate_limit_rps - 2.0).abs() < f64::EPSILON);
    assert_eq!(config.security.rate_limit_burst, 6);
    assert_eq!(config.llm.provider, "mock");
    assert_eq!(config.llm.circuit_threshold, 5);
}

#[test]
fn toml_overrides_defaults() {
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [run]
        max_steps = 2
        timeout_s = 45

        [security]
        api_keys = ["k1", "k2"]
        rate_limit_burst = 3
    "#;
    let config = load_config_from_str(toml).unwrap();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.run.max_steps, 2);
    assert_eq!(config.run.timeout_s, 45);
    assert_eq!(config.security.api_keys, vec!["k1", "k2"]);
    assert_eq!(config.security.rate_limit_burst, 3);
    // Unset sections keep defaults.
    assert_eq!(config.run.tool_timeout_s, 30);
}

#[test]
fn unknown_keys_are_rejected() {
    let toml = r#"
        [server]
        hostt = "typo"
    "#;
    let result = load_config_from_str(toml);
    assert!(result.is_err(), "unknown key should be rejected");
}

#[test]
fn allowlists_parse_into_policy() {
    let toml = r#"
        [security.channel_allowlist]
        "webchat-1" = ["alice", "bob"]

        [security.tool_allowlist]
        "core.echo" = true
        "email.send" = false
    "#;
    let config = load_config_from_str(toml).unwrap();
    let policy = config.initial_policy();

    assert!(policy.is_allowed_sender("webchat-1", "alice"));
    assert!(!policy.is_allowed_sender("webchat-1", "mallory"));
    assert!(policy.is_tool_allowed("core.echo"));
    assert!(!policy.is_tool_allowed("email.send"));
    assert!(!policy.is_tool_allowed("never.mentioned"));
}

#[test]
fn chat_policies_parse_from_strings() {
    let toml = r#"
        [security]
        dm_policy = "deny"
        group_policy = "allow"
    "#;
    let config = load_config_from_str(toml).unwrap();
    assert_eq!(config.security.dm_policy, ChatPolicy::Deny);
    assert_eq!(config.security.group_policy, ChatPolicy::Allow);
}

#[test]
fn config_round_trips_through_serde() {
    let config = AgwConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: AgwConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.server.port, config.server.port);
    assert_eq!(parsed.run.max_steps, config.run.max_steps);
}

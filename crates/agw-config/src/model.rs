// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the agent gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use agw_core::types::ChatPolicy;

/// Top-level gateway configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgwConfig {
    /// Server identity, network binding, and data layout.
    #[serde(default)]
    pub server: ServerConfig,

    /// Control-plane authentication and security policy defaults.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Agent run budgets and timeouts.
    #[serde(default)]
    pub run: RunConfig,

    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Server identity and network configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Unique instance id for lock ownership and tracing.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory for the lock file and the SQLite database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory scanned for tool plugins at startup.
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            plugin_dir: default_plugin_dir(),
        }
    }
}

fn default_instance_id() -> String {
    "agw-1".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_database_path() -> String {
    "./data/agw.sqlite".to_string()
}

fn default_plugin_dir() -> String {
    "./plugins".to_string()
}

/// Control-plane auth, rate limits, and policy defaults.
///
/// Deny-by-default: empty allowlists block everything; client auth is
/// required unless explicitly disabled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Static API keys accepted from control-plane clients.
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Reject unauthenticated clients. Disable only for local testing.
    #[serde(default = "default_true")]
    pub require_client_auth: bool,

    /// Write tools require human approval before execution.
    #[serde(default = "default_true")]
    pub require_approval_for_write: bool,

    /// Token refill rate per principal (tokens/second).
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: f64,

    /// Token bucket capacity per principal.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,

    /// channel_id -> permitted sender ids.
    #[serde(default)]
    pub channel_allowlist: BTreeMap<String, BTreeSet<String>>,

    /// tool name -> allowed flag.
    #[serde(default)]
    pub tool_allowlist: BTreeMap<String, bool>,

    /// Admission default for direct chats.
    #[serde(default = "default_dm_policy")]
    pub dm_policy: ChatPolicy,

    /// Admission default for group chats.
    #[serde(default = "default_group_policy")]
    pub group_policy: ChatPolicy,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            require_client_auth: true,
            require_approval_for_write: true,
            rate_limit_rps: default_rate_limit_rps(),
            rate_limit_burst: default_rate_limit_burst(),
            channel_allowlist: BTreeMap::new(),
            tool_allowlist: BTreeMap::new(),
            dm_policy: default_dm_policy(),
            group_policy: default_group_policy(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rate_limit_rps() -> f64 {
    2.0
}

fn default_rate_limit_burst() -> u32 {
    6
}

fn default_dm_policy() -> ChatPolicy {
    ChatPolicy::Allow
}

fn default_group_policy() -> ChatPolicy {
    ChatPolicy::Deny
}

/// Agent run budgets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Maximum LLM plan calls per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Whole-run wall-clock budget in seconds.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,

    /// Per-tool-invocation budget in seconds.
    #[serde(default = "default_tool_timeout_s")]
    pub tool_timeout_s: u64,

    /// Approval rendezvous budget in seconds.
    #[serde(default = "default_approval_timeout_s")]
    pub approval_timeout_s: u64,

    /// Single LLM call budget in seconds.
    #[serde(default = "default_llm_timeout_s")]
    pub llm_timeout_s: u64,

    /// Chat history window loaded into the run context.
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout_s: default_timeout_s(),
            tool_timeout_s: default_tool_timeout_s(),
            approval_timeout_s: default_approval_timeout_s(),
            llm_timeout_s: default_llm_timeout_s(),
            max_context_messages: default_max_context_messages(),
        }
    }
}

fn default_max_steps() -> u32 {
    20
}

fn default_timeout_s() -> u64 {
    300
}

fn default_tool_timeout_s() -> u64 {
    30
}

fn default_approval_timeout_s() -> u64 {
    300
}

fn default_llm_timeout_s() -> u64 {
    60
}

fn default_max_context_messages() -> u32 {
    50
}

/// LLM provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Planner backend: "mock" is the only compiled-in provider.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Provider API key. `None` requires an environment variable for
    /// non-mock providers.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_circuit_threshold")]
    pub circuit_threshold: u32,

    /// Seconds the circuit stays open before probing again.
    #[serde(default = "default_circuit_cooldown_s")]
    pub circuit_cooldown_s: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            circuit_threshold: default_circuit_threshold(),
            circuit_cooldown_s: default_circuit_cooldown_s(),
        }
    }
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_circuit_threshold() -> u32 {
    5
}

fn default_circuit_cooldown_s() -> u64 {
    30
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable output.
    #[serde(default = "default_json_logs")]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json_logs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logs() -> bool {
    true
}

impl AgwConfig {
    /// Builds the initial policy from the security section. A persisted
    /// policy, when present, takes precedence over this at startup.
    pub fn initial_policy(&self) -> agw_core::Policy {
        agw_core::Policy {
            channel_allowlist: self.security.channel_allowlist.clone(),
            tool_allowlist: self.security.tool_allowlist.clone(),
            require_approval_for_write: self.security.require_approval_for_write,
            dm_policy: self.security.dm_policy,
            group_policy: self.security.group_policy,
        }
    }
}

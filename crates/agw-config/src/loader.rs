// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./agw.toml` > `~/.config/agw/agw.toml` >
//! `/etc/agw/agw.toml` with environment variable overrides via the `AGW_`
//! prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::AgwConfig;

/// Load configuration from the standard XDG hierarchy with env overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/agw/agw.toml` (system-wide)
/// 3. `~/.config/agw/agw.toml` (user XDG config)
/// 4. `./agw.toml` (local directory)
/// 5. `AGW_*` environment variables
pub fn load_config() -> Result<AgwConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AgwConfig::default()))
        .merge(Toml::file("/etc/agw/agw.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("agw/agw.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("agw.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from inline TOML only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<AgwConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AgwConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AgwConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AgwConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `AGW_SECURITY_RATE_LIMIT_RPS` must map
/// to `security.rate_limit_rps`, not `security.rate.limit.rps`.
fn env_provider() -> Env {
    Env::prefixed("AGW_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("security_", "security.", 1)
            .replacen("run_", "run.", 1)
            .replacen("llm_", "llm.", 1)
            .replacen("log_", "log.", 1);
        mapped.into()
    })
}

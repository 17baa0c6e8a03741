// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration for the agent gateway.
//!
//! TOML files merged over compiled defaults, with `AGW_*` environment
//! variable overrides on top.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::AgwConfig;

// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Security primitives for the agent gateway: rate limiting, policy
//! evaluation, inbound sanitization, and client-key authentication.
//!
//! Everything here is deny-by-default. The gateway core composes these
//! pieces; no component in this crate performs I/O.

pub mod auth;
pub mod policy;
pub mod rate_limit;
pub mod sanitize;

pub use auth::{ClientKeyVerifier, ANONYMOUS_PRINCIPAL};
pub use policy::{InboundDecision, PolicyEngine, ToolDecision};
pub use rate_limit::{AdmitDecision, RateLimiter};
pub use sanitize::sanitize_text;

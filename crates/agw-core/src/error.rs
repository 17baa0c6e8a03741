// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the agent gateway.

use thiserror::Error;

/// The primary error type used across the gateway workspace.
///
/// Every variant maps onto one of the wire error kinds exposed to
/// control-plane clients via [`AgwError::kind`].
#[derive(Debug, Error)]
pub enum AgwError {
    /// Client key missing or invalid.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Request admission denied by the rate limiter.
    #[error("rate limited, retry after {retry_after_s:.3}s")]
    RateLimited { retry_after_s: f64 },

    /// Malformed frame, unknown request type, or missing fields.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Action blocked by the policy engine.
    #[error("policy denied: {reason}")]
    PolicyDenied { reason: String },

    /// Tool requested by a plan is not present in the registry.
    #[error("tool missing: {0}")]
    ToolMissing(String),

    /// LLM provider unavailable (circuit open or retries exhausted).
    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgwError {
    /// Wire error kind string carried in `error.kind` of control-plane
    /// responses. Storage, config and timeout failures are never exposed
    /// in detail and collapse to `internal`.
    pub fn kind(&self) -> &'static str {
        match self {
            AgwError::Unauthenticated(_) => "unauthenticated",
            AgwError::RateLimited { .. } => "rate_limited",
            AgwError::InvalidRequest(_) => "invalid_request",
            AgwError::NotFound(_) => "not_found",
            AgwError::PolicyDenied { .. } => "policy_denied",
            AgwError::ToolMissing(_) => "tool_missing",
            AgwError::LlmUnavailable(_) => "llm_unavailable",
            AgwError::Config(_)
            | AgwError::Storage { .. }
            | AgwError::Timeout { .. }
            | AgwError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_kinds_match_protocol_catalog() {
        assert_eq!(AgwError::Unauthenticated("k".into()).kind(), "unauthenticated");
        assert_eq!(
            AgwError::RateLimited { retry_after_s: 0.5 }.kind(),
            "rate_limited"
        );
        assert_eq!(AgwError::InvalidRequest("x".into()).kind(), "invalid_request");
        assert_eq!(AgwError::NotFound("run".into()).kind(), "not_found");
        assert_eq!(
            AgwError::PolicyDenied { reason: "r".into() }.kind(),
            "policy_denied"
        );
        assert_eq!(AgwError::ToolMissing("t".into()).kind(), "tool_missing");
        assert_eq!(AgwError::LlmUnavailable("e".into()).kind(), "llm_unavailable");
        assert_eq!(AgwError::Internal("boom".into()).kind(), "internal");
    }

    #[test]
    fn storage_errors_collapse_to_internal() {
        let err = AgwError::Storage {
            source: Box::new(std::io::Error::other("disk full")),
        };
        assert_eq!(err.kind(), "internal");
    }

    #[test]
    fn display_includes_retry_hint() {
        let err = AgwError::RateLimited { retry_after_s: 1.25 };
        assert!(err.to_string().contains("1.250"));
    }
}

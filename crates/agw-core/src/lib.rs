// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the AGW agent gateway.
//!
//! This crate provides the domain model, event model, error type, and the
//! seam traits (storage repository, channel transport) used throughout the
//! workspace. It contains no I/O of its own.

pub mod error;
pub mod event;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::AgwError;
pub use event::{Event, EventType};
pub use traits::{ChannelTransport, InboundEnvelope, Repository};
pub use types::{
    AgentRun, Channel, ChannelKind, ChannelStatus, Chat, ChatPolicy, Direction, Message,
    PendingApproval, Policy, Principal, RunError, RunStatus, ToolPermission,
};

/// Generates a prefixed identifier, e.g. `run_1f2a9c0b3d4e`.
pub fn gen_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_id_has_prefix_and_length() {
        let id = gen_id("run");
        assert!(id.starts_with("run_"));
        assert_eq!(id.len(), "run_".len() + 12);
    }

    #[test]
    fn gen_id_is_unique_across_calls() {
        let a = gen_id("msg");
        let b = gen_id("msg");
        assert_ne!(a, b);
    }
}

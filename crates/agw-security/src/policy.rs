// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deny-by-default policy evaluation for tools and inbound messages.

use std::sync::{Arc, RwLock};

use agw_core::{ChatPolicy, Policy, ToolPermission};

/// Outcome of a tool policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDecision {
    Allow,
    ApprovalRequired,
    Deny { reason: String },
}

/// Outcome of an inbound message evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundDecision {
    Allow,
    Deny { reason: String },
}

/// Policy engine over a shared, mutable [`Policy`].
///
/// The gateway core holds the same `Arc` and is the only writer (via
/// `config.set`); evaluation reads a short-lived snapshot.
pub struct PolicyEngine {
    policy: Arc<RwLock<Policy>>,
}

impl PolicyEngine {
    pub fn new(policy: Arc<RwLock<Policy>>) -> Self {
        Self { policy }
    }

    /// Evaluates a (tool, permission) pair against the current policy.
    ///
    /// Order: allowlist membership, registry presence, write-approval gate.
    /// `permission` is `None` when the registry has no spec for the name.
    pub fn evaluate_tool(
        &self,
        tool_name: &str,
        permission: Option<ToolPermission>,
    ) -> ToolDecision {
        let policy = self.policy.read().expect("policy lock poisoned");

        if !policy.is_tool_allowed(tool_name) {
            return ToolDecision::Deny {
                reason: "tool_not_allowlisted".to_string(),
            };
        }
        let Some(permission) = permission else {
            return ToolDecision::Deny {
                reason: "tool_missing".to_string(),
            };
        };
        if permission == ToolPermission::Write && policy.require_approval_for_write {
            return ToolDecision::ApprovalRequired;
        }
        ToolDecision::Allow
    }

    /// Evaluates an inbound message against the channel allowlist and the
    /// dm/group admission defaults. `channel_known` reflects the gateway's
    /// channel table.
    pub fn evaluate_inbound(
        &self,
        channel_known: bool,
        channel_id: &str,
        sender_id: &str,
        is_dm: bool,
        is_group: bool,
    ) -> InboundDecision {
        if !channel_known {
            return InboundDecision::Deny {
                reason: "channel_unknown".to_string(),
            };
        }

        let policy = self.policy.read().expect("policy lock poisoned");
        if !policy.is_allowed_sender(channel_id, sender_id) {
            return InboundDecision::Deny {
                reason: "sender_not_allowlisted".to_string(),
            };
        }
        if is_dm && policy.dm_policy != ChatPolicy::Allow {
            return InboundDecision::Deny {
                reason: "dm_blocked".to_string(),
            };
        }
        if is_group && policy.group_policy != ChatPolicy::Allow {
            return InboundDecision::Deny {
                reason: "group_blocked".to_string(),
            };
        }
        InboundDecision::Allow
    }

    /// Snapshot of the current policy.
    pub fn snapshot(&self) -> Policy {
        self.policy.read().expect("policy lock poisoned").clone()
    }
}

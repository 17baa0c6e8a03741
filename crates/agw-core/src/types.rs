// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the gateway workspace.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported channel transports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Webchat,
    Telegram,
    WhatsappBusiness,
}

/// Channel operational status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Offline,
    Connecting,
    Online,
    Degraded,
}

/// A logical inbound source, created at startup from configuration.
///
/// Status is mutated exclusively through the gateway's status-update
/// entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub kind: ChannelKind,
    pub status: ChannelStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A conversation anchored to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: String,
    /// Must reference an existing channel.
    pub channel_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Message direction relative to the gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// An atomic utterance. Immutable after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    pub channel_id: String,
    pub direction: Direction,
    pub sender_id: String,
    /// Sanitized text content.
    pub text: String,
    pub ts: DateTime<Utc>,
}

/// An authenticated control-plane client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: String,
    pub roles: BTreeSet<String>,
    pub api_key_hash: String,
}

/// Tool permission classes. `Write` implies approval-required by default.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ToolPermission {
    Read,
    Write,
}

/// Direct/group chat admission defaults.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChatPolicy {
    Allow,
    Deny,
}

/// Security and access-control policy.
///
/// Deny-by-default: an empty sender set for a channel means all inbound
/// from that channel is blocked, and tools execute only when explicitly
/// allowlisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// channel_id -> permitted sender ids. Empty set denies all.
    #[serde(default)]
    pub channel_allowlist: BTreeMap<String, BTreeSet<String>>,
    /// tool name -> allowed flag.
    #[serde(default)]
    pub tool_allowlist: BTreeMap<String, bool>,
    #[serde(default = "default_true")]
    pub require_approval_for_write: bool,
    #[serde(default = "default_dm_policy")]
    pub dm_policy: ChatPolicy,
    #[serde(default = "default_group_policy")]
    pub group_policy: ChatPolicy,
}

fn default_true() -> bool {
    true
}

fn default_dm_policy() -> ChatPolicy {
    ChatPolicy::Allow
}

fn default_group_policy() -> ChatPolicy {
    ChatPolicy::Deny
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            channel_allowlist: BTreeMap::new(),
            tool_allowlist: BTreeMap::new(),
            require_approval_for_write: true,
            dm_policy: default_dm_policy(),
            group_policy: default_group_policy(),
        }
    }
}

impl Policy {
    pub fn is_allowed_sender(&self, channel_id: &str, sender_id: &str) -> bool {
        self.channel_allowlist
            .get(channel_id)
            .is_some_and(|senders| senders.contains(sender_id))
    }

    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        self.tool_allowlist.get(tool_name).copied().unwrap_or(false)
    }
}

/// Agent run status. Terminal statuses carry `ended_at`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Planning,
    AwaitingApproval,
    ToolExec,
    Completed,
    Failed,
    Canceled,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Canceled | RunStatus::TimedOut
        )
    }
}

/// Terminal error classification for a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// One of: approval_timeout, step_limit, run_timeout, canceled,
    /// tool_failed, llm_unavailable, internal.
    pub kind: String,
    pub message: String,
}

/// The central entity: one invocation of the agent loop bound to a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub run_id: String,
    pub chat_id: String,
    pub channel_id: String,
    pub requested_by: String,
    pub status: RunStatus,
    /// LLM plan calls consumed so far. Never exceeds `max_steps`.
    pub step: u32,
    pub max_steps: u32,
    /// Absolute wall-clock deadline for the whole run.
    pub deadline: DateTime<Utc>,
    pub output_text: Option<String>,
    pub summary: Option<String>,
    pub error: Option<RunError>,
    pub created_at: DateTime<Utc>,
    /// Set iff `status` is terminal.
    pub ended_at: Option<DateTime<Utc>>,
}

impl AgentRun {
    /// Creates a fresh run in `Pending` with the given budgets.
    pub fn new(
        run_id: String,
        chat_id: String,
        channel_id: String,
        requested_by: String,
        max_steps: u32,
        timeout: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            chat_id,
            channel_id,
            requested_by,
            status: RunStatus::Pending,
            step: 0,
            max_steps,
            deadline: now
                + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(300)),
            output_text: None,
            summary: None,
            error: None,
            created_at: now,
            ended_at: None,
        }
    }
}

/// A pending human approval for one write-tool invocation within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub run_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
    pub requested_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn run_status_terminal_partition() {
        let terminal = [
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Canceled,
            RunStatus::TimedOut,
        ];
        let live = [
            RunStatus::Pending,
            RunStatus::Planning,
            RunStatus::AwaitingApproval,
            RunStatus::ToolExec,
        ];
        for s in terminal {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
        for s in live {
            assert!(!s.is_terminal(), "{s} should not be terminal");
        }
    }

    #[test]
    fn status_display_round_trips() {
        for s in [
            RunStatus::Pending,
            RunStatus::AwaitingApproval,
            RunStatus::ToolExec,
            RunStatus::TimedOut,
        ] {
            let parsed = RunStatus::from_str(&s.to_string()).expect("should parse back");
            assert_eq!(s, parsed);
        }
        assert_eq!(RunStatus::AwaitingApproval.to_string(), "awaiting_approval");
    }

    #[test]
    fn policy_denies_by_default() {
        let policy = Policy::default();
        assert!(!policy.is_allowed_sender("webchat-1", "alice"));
        assert!(!policy.is_tool_allowed("core.echo"));
        assert!(policy.require_approval_for_write);
        assert_eq!(policy.group_policy, ChatPolicy::Deny);
    }

    #[test]
    fn policy_empty_sender_set_denies_all() {
        let mut policy = Policy::default();
        policy
            .channel_allowlist
            .insert("webchat-1".into(), BTreeSet::new());
        assert!(!policy.is_allowed_sender("webchat-1", "alice"));
    }

    #[test]
    fn policy_allowlisted_sender_passes() {
        let mut policy = Policy::default();
        policy
            .channel_allowlist
            .insert("webchat-1".into(), BTreeSet::from(["alice".to_string()]));
        assert!(policy.is_allowed_sender("webchat-1", "alice"));
        assert!(!policy.is_allowed_sender("webchat-1", "bob"));
    }

    #[test]
    fn new_run_starts_pending_with_deadline() {
        let run = AgentRun::new(
            "run_1".into(),
            "c1".into(),
            "wc".into(),
            "op".into(),
            20,
            std::time::Duration::from_secs(300),
        );
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.step, 0);
        assert!(run.ended_at.is_none());
        assert!(run.deadline > run.created_at);
    }

    #[test]
    fn tool_permission_serializes_snake_case() {
        let json = serde_json::to_string(&ToolPermission::Write).unwrap();
        assert_eq!(json, r#""write""#);
    }
}

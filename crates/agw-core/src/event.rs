// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event model for the in-process bus and the persisted event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Event types observable on the bus and over the control plane.
///
/// The wire form uses dotted names (`run.progress`); `Display`/`FromStr`
/// and serde all agree on that spelling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum EventType {
    #[strum(serialize = "channel.status")]
    #[serde(rename = "channel.status")]
    ChannelStatus,
    #[strum(serialize = "message.inbound")]
    #[serde(rename = "message.inbound")]
    MessageInbound,
    #[strum(serialize = "run.progress")]
    #[serde(rename = "run.progress")]
    RunProgress,
    #[strum(serialize = "run.tool_call")]
    #[serde(rename = "run.tool_call")]
    RunToolCall,
    #[strum(serialize = "run.output")]
    #[serde(rename = "run.output")]
    RunOutput,
    #[strum(serialize = "run.completed")]
    #[serde(rename = "run.completed")]
    RunCompleted,
    #[strum(serialize = "security.blocked")]
    #[serde(rename = "security.blocked")]
    SecurityBlocked,
    #[strum(serialize = "approval.required")]
    #[serde(rename = "approval.required")]
    ApprovalRequired,
}

/// Immutable record appended to the per-process monotonic sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Strictly increasing, gap-free across the process lifetime.
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub payload: serde_json::Value,
}

impl Event {
    /// True when this event matches an optional type-prefix and run filter.
    pub fn matches(&self, type_prefix: Option<&str>, run_id: Option<&str>) -> bool {
        if let Some(prefix) = type_prefix {
            if !self.event_type.to_string().starts_with(prefix) {
                return false;
            }
        }
        if let Some(rid) = run_id {
            if self.run_id.as_deref() != Some(rid) {
                return false;
            }
        }
        true
    }
}

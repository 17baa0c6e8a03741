// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control-plane wire protocol.
//!
//! Frames are JSON envelopes `{type, id, ts, payload}`. `type` carries the
//! prefix `req:` (client to server), `res:` (response), or `evt:` (server
//! push). Responses additionally carry `ok` and, on failure, `error`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use agw_core::{AgwError, Event};

/// Wire error object carried by failed responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsError {
    pub kind: String,
    pub message: String,
}

impl From<&AgwError> for WsError {
    fn from(e: &AgwError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: match e.kind() {
                // Never leak internals to clients.
                "internal" => "internal error".to_string(),
                _ => e.to_string(),
            },
        }
    }
}

/// The JSON frame envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub id: String,
    pub ts: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WsError>,
}

impl WsEnvelope {
    /// Successful response correlated to a request.
    pub fn response(req_type: &str, id: &str, payload: serde_json::Value) -> Self {
        Self {
            frame_type: res_type(req_type),
            id: id.to_string(),
            ts: now_ts(),
            payload,
            ok: Some(true),
            error: None,
        }
    }

    /// Failed response correlated to a request.
    pub fn error_response(req_type: &str, id: &str, error: &AgwError) -> Self {
        Self {
            frame_type: res_type(req_type),
            id: id.to_string(),
            ts: now_ts(),
            payload: serde_json::json!({}),
            ok: Some(false),
            error: Some(WsError::from(error)),
        }
    }

    /// Server-push event frame. The payload carries `seq` and `run_id`
    /// alongside the event's own fields.
    pub fn event(event: &Event) -> Self {
        let mut payload = event.payload.clone();
        if !payload.is_object() {
            payload = serde_json::json!({});
        }
        payload["seq"] = serde_json::json!(event.seq);
        if let Some(run_id) = &event.run_id {
            payload["run_id"] = serde_json::json!(run_id);
        }
        if let Some(channel_id) = &event.channel_id {
            payload["channel_id"] = serde_json::json!(channel_id);
        }
        Self {
            frame_type: format!("evt:{}", event.event_type),
            id: format!("evt_{}", event.seq),
            ts: event.ts.to_rfc3339(),
            payload,
            ok: None,
            error: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn res_type(req_type: &str) -> String {
    match req_type.split_once(':') {
        Some(("req", method)) => format!("res:{method}"),
        _ => "res:error".to_string(),
    }
}

fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

// --- Request payloads ---

#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload {
    #[serde(default)]
    pub client_key: Option<String>,
    /// Replay persisted events with `seq` greater than this before
    /// streaming live.
    #[serde(default)]
    pub after_seq: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatListPayload {
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessagesPayload {
    pub chat_id: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentRunPayload {
    pub chat_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub requested_by: Option<String>,
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunsTailPayload {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub after_seq: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunIdPayload {
    pub run_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSetPayload {
    #[serde(default)]
    pub allowlist: Option<std::collections::BTreeMap<String, std::collections::BTreeSet<String>>>,
    #[serde(default)]
    pub tool_allow: Option<std::collections::BTreeMap<String, bool>>,
    #[serde(default)]
    pub dm_policy: Option<agw_core::ChatPolicy>,
    #[serde(default)]
    pub group_policy: Option<agw_core::ChatPolicy>,
    #[serde(default)]
    pub require_approval_for_write: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agw_core::EventType;

    #[test]
    fn response_type_maps_req_to_res() {
        let frame = WsEnvelope::response("req:channels.list", "abc", serde_json::json!({}));
        assert_eq!(frame.frame_type, "res:channels.list");
        assert_eq!(frame.id, "abc");
        assert_eq!(frame.ok, Some(true));
        assert!(frame.error.is_none());
    }

    #[test]
    fn error_response_carries_kind() {
        let err = AgwError::NotFound("run run_1".into());
        let frame = WsEnvelope::error_response("req:approval.grant", "id1", &err);
        assert_eq!(frame.ok, Some(false));
        assert_eq!(frame.error.as_ref().unwrap().kind, "not_found");
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = AgwError::Internal("secret stack trace".into());
        let frame = WsEnvelope::error_response("req:agent.run", "id1", &err);
        let wire = frame.to_json();
        assert!(!wire.contains("secret stack trace"));
        assert!(wire.contains("internal"));
    }

    #[test]
    fn event_frame_includes_seq_and_run_id() {
        let event = Event {
            seq: 7,
            event_type: EventType::RunOutput,
            ts: Utc::now(),
            run_id: Some("run_1".into()),
            channel_id: None,
            payload: serde_json::json!({"text": "hello"}),
        };
        let frame = WsEnvelope::event(&event);
        assert_eq!(frame.frame_type, "evt:run.output");
        assert_eq!(frame.id, "evt_7");
        assert_eq!(frame.payload["seq"], 7);
        assert_eq!(frame.payload["run_id"], "run_1");
        assert_eq!(frame.payload["text"], "hello");
    }

    #[test]
    fn envelope_round_trips() {
        let json = r#"{"type":"req:hello","id":"1","ts":"2026-01-01T00:00:00Z","payload":{"client_key":"k"}}"#;
        let envelope: WsEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.frame_type, "req:hello");
        let payload: HelloPayload = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(payload.client_key.as_deref(), Some("k"));
        assert!(payload.after_seq.is_none());
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let json = r#"{"type":"req:channels.list","id":"2","ts":"2026-01-01T00:00:00Z"}"#;
        let envelope: WsEnvelope = serde_json::from_str(json).unwrap();
        assert!(envelope.payload.is_null());
    }
}

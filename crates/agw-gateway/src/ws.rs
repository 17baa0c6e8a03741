// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket control plane: request/response RPC plus server-push events.
//!
//! Connection lifecycle: the first frame must be `req:hello` carrying a
//! client key. After a successful handshake the socket is subscribed to
//! the event bus; retroactive events are replayed when `after_seq` is
//! given, using a watermark latch so replay and live stream never overlap.
//! Requests are served concurrently and responses correlate by `id`; the
//! server may interleave events between responses. Binary frames close the
//! socket with code 1003.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use agw_bus::SubscriptionFilter;
use agw_core::AgwError;

use crate::core::PolicyDiff;
use crate::proto::{
    AgentRunPayload, ChatListPayload, ChatMessagesPayload, ConfigSetPayload, HelloPayload,
    RunIdPayload, RunsTailPayload, WsEnvelope,
};
use crate::server::AppState;

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(20);
const PING_TIMEOUT: Duration = Duration::from_secs(60);
const OUTBOUND_QUEUE: usize = 256;

/// WebSocket close code for unsupported data (binary frames).
const CLOSE_UNSUPPORTED: u16 = 1003;

/// Per-connection run filter. Empty set means all events; `runs.tail`
/// narrows the live stream to the tailed runs.
type RunFilter = Arc<Mutex<HashSet<String>>>;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    metrics::gauge!("agw_ws_connections").increment(1.0);
    serve_socket(socket, state).await;
    metrics::gauge!("agw_ws_connections").decrement(1.0);
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // --- hello handshake ---
    let hello = match tokio::time::timeout(HELLO_TIMEOUT, ws_rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            let raw: &str = &text;
            match serde_json::from_str::<WsEnvelope>(raw) {
                Ok(envelope) if envelope.frame_type == "req:hello" => envelope,
                Ok(envelope) => {
                    let err = AgwError::InvalidRequest("first frame must be req:hello".into());
                    let frame = WsEnvelope::error_response(&envelope.frame_type, &envelope.id, &err);
                    let _ = ws_tx.send(Message::Text(frame.to_json().into())).await;
                    return;
                }
                Err(e) => {
                    let err = AgwError::InvalidRequest(format!("malformed frame: {e}"));
                    let frame = WsEnvelope::error_response("req:hello", "", &err);
                    let _ = ws_tx.send(Message::Text(frame.to_json().into())).await;
                    return;
                }
            }
        }
        Ok(Some(Ok(Message::Binary(_)))) => {
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_UNSUPPORTED,
                    reason: "text frames only".into(),
                })))
                .await;
            return;
        }
        _ => return,
    };

    let payload: HelloPayload =
        serde_json::from_value(hello.payload.clone()).unwrap_or(HelloPayload {
            client_key: None,
            after_seq: None,
        });

    let Some(principal) = state.verifier.verify(payload.client_key.as_deref()) else {
        let err = AgwError::Unauthenticated("invalid client key".into());
        let frame = WsEnvelope::error_response("req:hello", &hello.id, &err);
        let _ = ws_tx.send(Message::Text(frame.to_json().into())).await;
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    };

    // Connection admission uses its own bucket space so request-level
    // budgets stay intact for authenticated clients.
    let admit = state
        .gateway
        .rate_limiter()
        .admit(&format!("hello:{principal}"), 1.0);
    if !admit.allowed {
        let err = AgwError::RateLimited {
            retry_after_s: admit.retry_after_s,
        };
        let frame = WsEnvelope::error_response("req:hello", &hello.id, &err);
        let _ = ws_tx.send(Message::Text(frame.to_json().into())).await;
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    // Latch: subscribe first, then replay persisted events up to the
    // watermark; the live pump only forwards events past it.
    let watermark = state.gateway.bus_watermark();
    let mut sub = state.gateway.subscribe(SubscriptionFilter::all());
    metrics::gauge!("agw_subscribers").increment(1.0);

    let welcome = WsEnvelope::response(
        "req:hello",
        &hello.id,
        serde_json::json!({
            "server": "agw",
            "version": env!("CARGO_PKG_VERSION"),
            "instance_id": state.gateway.instance_id(),
            "features": ["rpc_ws", "event_stream", "approvals", "deny_by_default", "sqlite"],
        }),
    );
    if ws_tx
        .send(Message::Text(welcome.to_json().into()))
        .await
        .is_err()
    {
        metrics::gauge!("agw_subscribers").decrement(1.0);
        return;
    }

    if let Some(after_seq) = payload.after_seq {
        match state.gateway.tail_events(None, Some(after_seq)).await {
            Ok(events) => {
                for event in events.iter().filter(|e| e.seq <= watermark) {
                    let frame = WsEnvelope::event(event);
                    if ws_tx
                        .send(Message::Text(frame.to_json().into()))
                        .await
                        .is_err()
                    {
                        metrics::gauge!("agw_subscribers").decrement(1.0);
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "event replay failed"),
        }
    }

    debug!(principal = principal.as_str(), "control-plane client connected");

    // --- steady state: writer, pump, ping, reader ---
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    let run_filter: RunFilter = Arc::new(Mutex::new(HashSet::new()));
    let last_pong = Arc::new(Mutex::new(Instant::now()));

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if ws_tx.send(message).await.is_err() || is_close {
                break;
            }
        }
    });

    let pump_filter = run_filter.clone();
    let pump_tx = out_tx.clone();
    let pump = tokio::spawn(async move {
        while let Some(event) = sub.recv().await {
            if event.seq <= watermark {
                continue;
            }
            {
                let filter = pump_filter.lock().expect("run filter lock poisoned");
                if !filter.is_empty()
                    && !event
                        .run_id
                        .as_deref()
                        .is_some_and(|rid| filter.contains(rid))
                {
                    continue;
                }
            }
            let frame = WsEnvelope::event(&event);
            if pump_tx
                .send(Message::Text(frame.to_json().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let ping_tx = out_tx.clone();
    let ping_pong = last_pong.clone();
    let pinger = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PING_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let stale = ping_pong
                .lock()
                .expect("pong lock poisoned")
                .elapsed()
                > PING_TIMEOUT;
            if stale {
                let _ = ping_tx.send(Message::Close(None)).await;
                break;
            }
            if ping_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => {
                let raw: &str = &text;
                match serde_json::from_str::<WsEnvelope>(raw) {
                    Ok(envelope) => {
                        let state = state.clone();
                        let out_tx = out_tx.clone();
                        let run_filter = run_filter.clone();
                        let principal = principal.clone();
                        tokio::spawn(async move {
                            let frame =
                                handle_request(&state, envelope, &run_filter, &principal).await;
                            let _ = out_tx.send(Message::Text(frame.to_json().into())).await;
                        });
                    }
                    Err(e) => {
                        let err = AgwError::InvalidRequest(format!("malformed frame: {e}"));
                        let frame = WsEnvelope::error_response("req:error", "", &err);
                        if out_tx
                            .send(Message::Text(frame.to_json().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
            Message::Binary(_) => {
                let _ = out_tx
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_UNSUPPORTED,
                        reason: "text frames only".into(),
                    })))
                    .await;
                break;
            }
            Message::Pong(_) => {
                *last_pong.lock().expect("pong lock poisoned") = Instant::now();
            }
            Message::Close(_) => break,
            // Pings are answered by the protocol layer.
            Message::Ping(_) => {}
        }
    }

    pump.abort();
    pinger.abort();
    drop(out_tx);
    let _ = writer.await;
    metrics::gauge!("agw_subscribers").decrement(1.0);
    debug!(principal = principal.as_str(), "control-plane client disconnected");
}

/// Serves one request frame. Never panics; failures become error
/// responses with a typed kind.
async fn handle_request(
    state: &AppState,
    envelope: WsEnvelope,
    run_filter: &RunFilter,
    principal: &str,
) -> WsEnvelope {
    let method = envelope.frame_type.clone();
    metrics::counter!("agw_rpc_requests_total", "method" => method.clone()).increment(1);

    // Per-request admission, separate from connection admission.
    if method != "req:hello" {
        let admit = state.gateway.rate_limiter().admit(principal, 1.0);
        if !admit.allowed {
            let err = AgwError::RateLimited {
                retry_after_s: admit.retry_after_s,
            };
            metrics::counter!(
                "agw_rpc_errors_total",
                "method" => method.clone(),
                "kind" => "rate_limited"
            )
            .increment(1);
            return WsEnvelope::error_response(&method, &envelope.id, &err);
        }
    }

    match dispatch(state, &envelope, run_filter, principal).await {
        Ok(payload) => WsEnvelope::response(&method, &envelope.id, payload),
        Err(e) => {
            metrics::counter!(
                "agw_rpc_errors_total",
                "method" => method.clone(),
                "kind" => e.kind().to_string()
            )
            .increment(1);
            debug!(method = method.as_str(), kind = e.kind(), "request failed");
            WsEnvelope::error_response(&method, &envelope.id, &e)
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    envelope: &WsEnvelope,
) -> Result<T, AgwError> {
    serde_json::from_value(envelope.payload.clone())
        .map_err(|e| AgwError::InvalidRequest(format!("bad payload: {e}")))
}

async fn dispatch(
    state: &AppState,
    envelope: &WsEnvelope,
    run_filter: &RunFilter,
    principal: &str,
) -> Result<serde_json::Value, AgwError> {
    let gateway = &state.gateway;

    match envelope.frame_type.as_str() {
        "req:hello" => Ok(serde_json::json!({
            "server": "agw",
            "version": env!("CARGO_PKG_VERSION"),
            "instance_id": gateway.instance_id(),
            "features": ["rpc_ws", "event_stream", "approvals", "deny_by_default", "sqlite"],
        })),

        "req:channels.list" => {
            let channels = gateway.list_channels().await?;
            Ok(serde_json::json!({
                "channels": channels
                    .iter()
                    .map(|c| serde_json::json!({
                        "id": c.channel_id,
                        "kind": c.kind.to_string(),
                        "status": c.status.to_string(),
                        "last_seen": c.last_seen,
                    }))
                    .collect::<Vec<_>>(),
            }))
        }

        "req:chat.list" => {
            let payload: ChatListPayload = parse_payload(envelope)?;
            let chats = gateway.list_chats(payload.channel_id.as_deref()).await?;
            Ok(serde_json::json!({"chats": chats}))
        }

        "req:chat.messages" => {
            let payload: ChatMessagesPayload = parse_payload(envelope)?;
            let messages = gateway
                .list_messages(&payload.chat_id, payload.limit)
                .await?;
            Ok(serde_json::json!({"messages": messages}))
        }

        "req:agent.run" => {
            let payload: AgentRunPayload = parse_payload(envelope)?;
            if !gateway.channel_known(&payload.channel_id) {
                return Err(AgwError::NotFound(format!(
                    "channel {}",
                    payload.channel_id
                )));
            }
            let requested_by = payload
                .requested_by
                .unwrap_or_else(|| principal.to_string());
            let run = gateway
                .clone()
                .start_run(
                    &payload.chat_id,
                    &payload.channel_id,
                    &requested_by,
                    &payload.prompt,
                )
                .await?;
            Ok(serde_json::json!({"run_id": run.run_id, "run": run}))
        }

        "req:runs.tail" => {
            let payload: RunsTailPayload = parse_payload(envelope)?;
            if let Some(run_id) = &payload.run_id {
                run_filter
                    .lock()
                    .expect("run filter lock poisoned")
                    .insert(run_id.clone());
            }
            let events = gateway
                .tail_events(payload.run_id.as_deref(), payload.after_seq)
                .await?;
            Ok(serde_json::json!({"events": events}))
        }

        "req:runs.cancel" => {
            let payload: RunIdPayload = parse_payload(envelope)?;
            let canceled = gateway.cancel_run(&payload.run_id);
            Ok(serde_json::json!({"canceled": canceled}))
        }

        "req:config.get" => {
            let (policy, tools) = gateway.get_config().await;
            Ok(serde_json::json!({"policy": policy, "tools": tools}))
        }

        "req:config.set" => {
            let payload: ConfigSetPayload = parse_payload(envelope)?;
            gateway
                .set_config(PolicyDiff {
                    channel_allowlist: payload.allowlist,
                    tool_allowlist: payload.tool_allow,
                    dm_policy: payload.dm_policy,
                    group_policy: payload.group_policy,
                    require_approval_for_write: payload.require_approval_for_write,
                })
                .await?;
            Ok(serde_json::json!({"applied": true}))
        }

        "req:approval.grant" => {
            let payload: RunIdPayload = parse_payload(envelope)?;
            gateway.grant_approval(&payload.run_id, principal)?;
            Ok(serde_json::json!({"granted": true}))
        }

        "req:approval.deny" => {
            let payload: RunIdPayload = parse_payload(envelope)?;
            gateway.deny_approval(
                &payload.run_id,
                payload.reason.as_deref().unwrap_or("denied"),
            )?;
            Ok(serde_json::json!({"denied": true}))
        }

        "req:doctor.audit" => Ok(serde_json::json!({"findings": gateway.audit()})),

        other => Err(AgwError::InvalidRequest(format!(
            "unknown request type: {other}"
        ))),
    }
}

// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway core: the single authority.
//!
//! Owns the run table, the channel table, the policy, and the repository.
//! Every persisted mutation and every event emission funnels through this
//! type; the orchestrator and the control plane only hold handles to it.
//! Event persistence and bus publication happen under one critical section
//! so subscribers always observe sequence order.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agw_agent::{ApprovalBroker, DriverBudgets, RunAuthority, RunDriver};
use agw_bus::{EventBus, Subscription, SubscriptionFilter};
use agw_config::AgwConfig;
use agw_core::{
    gen_id, AgentRun, AgwError, Channel, ChannelKind, ChannelStatus, Chat, Direction, Event,
    EventType, InboundEnvelope, Message, Policy, Repository,
};
use agw_llm::{PlanMessage, Planner};
use agw_security::{sanitize_text, InboundDecision, PolicyEngine, RateLimiter};
use agw_tools::{ToolRegistry, ToolSpec};

use crate::audit::{self, Finding};
use crate::plugins::{self, LoadedPlugin};

/// Grace period for draining orchestrators on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Replay window for `runs.tail`.
const TAIL_LIMIT: u32 = 200;

/// Hard cap on `chat.messages` replies.
const MESSAGES_LIMIT_CAP: u32 = 500;

/// Partial policy update applied by `config.set`. Unset fields keep their
/// current values; the merged result is persisted.
#[derive(Debug, Clone, Default)]
pub struct PolicyDiff {
    pub channel_allowlist: Option<BTreeMap<String, std::collections::BTreeSet<String>>>,
    pub tool_allowlist: Option<BTreeMap<String, bool>>,
    pub dm_policy: Option<agw_core::ChatPolicy>,
    pub group_policy: Option<agw_core::ChatPolicy>,
    pub require_approval_for_write: Option<bool>,
}

struct RunTask {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// The single-authority gateway core.
pub struct Gateway {
    config: AgwConfig,
    repo: Arc<dyn Repository>,
    bus: EventBus,
    policy: Arc<StdRwLock<Policy>>,
    policy_engine: Arc<PolicyEngine>,
    rate_limiter: Arc<RateLimiter>,
    tools: Arc<RwLock<ToolRegistry>>,
    approvals: ApprovalBroker,
    planner: Arc<dyn Planner>,
    channel_meta: DashMap<String, Channel>,
    run_tasks: Arc<DashMap<String, RunTask>>,
    emit_lock: tokio::sync::Mutex<()>,
    lock_file: StdRwLock<Option<std::path::PathBuf>>,
    loaded_plugins: StdRwLock<Vec<LoadedPlugin>>,
}

impl Gateway {
    pub fn new(
        config: AgwConfig,
        repo: Arc<dyn Repository>,
        planner: Arc<dyn Planner>,
        tools: ToolRegistry,
    ) -> Self {
        let policy = Arc::new(StdRwLock::new(config.initial_policy()));
        let policy_engine = Arc::new(PolicyEngine::new(policy.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.security.rate_limit_rps,
            config.security.rate_limit_burst,
        ));

        Self {
            config,
            repo,
            bus: EventBus::new(),
            policy,
            policy_engine,
            rate_limiter,
            tools: Arc::new(RwLock::new(tools)),
            approvals: ApprovalBroker::new(),
            planner,
            channel_meta: DashMap::new(),
            run_tasks: Arc::new(DashMap::new()),
            emit_lock: tokio::sync::Mutex::new(()),
            lock_file: StdRwLock::new(None),
            loaded_plugins: StdRwLock::new(Vec::new()),
        }
    }

    /// Starts the gateway: acquires the instance lock, restores the bus
    /// sequence from the event log, loads the persisted policy, and seeds
    /// the channel table.
    pub async fn start(&self) -> Result<(), AgwError> {
        std::fs::create_dir_all(&self.config.server.data_dir).map_err(|e| {
            AgwError::Config(format!(
                "cannot create data dir {}: {e}",
                self.config.server.data_dir
            ))
        })?;
        self.acquire_lock()?;

        let watermark = self.repo.max_seq().await?;
        self.bus.restore_seq(watermark);
        debug!(watermark, "bus sequence restored");

        // A persisted policy (from a prior config.set) wins over the
        // config-file policy.
        if let Some(persisted) = self.repo.load_policy().await? {
            *self.policy.write().expect("policy lock poisoned") = persisted;
            info!("persisted policy loaded");
        }

        let discovered = plugins::discover_plugins(&self.config.server.plugin_dir);
        if !discovered.is_empty() {
            info!(count = discovered.len(), "plugins loaded");
        }
        *self
            .loaded_plugins
            .write()
            .expect("plugins lock poisoned") = discovered;

        self.ensure_channel("webchat-1", ChannelKind::Webchat).await?;

        info!(
            instance_id = self.config.server.instance_id.as_str(),
            "gateway started"
        );
        Ok(())
    }

    /// Signals cancel to all running orchestrators, waits up to the grace
    /// period, then force-aborts stragglers and closes storage.
    pub async fn shutdown(&self) {
        let run_ids: Vec<String> = self.run_tasks.iter().map(|e| e.key().clone()).collect();
        for run_id in &run_ids {
            if let Some(task) = self.run_tasks.get(run_id) {
                task.cancel.cancel();
            }
        }
        if !run_ids.is_empty() {
            info!(count = run_ids.len(), "draining running orchestrators");
        }

        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        for run_id in run_ids {
            if let Some((_, mut task)) = self.run_tasks.remove(&run_id) {
                match tokio::time::timeout_at(deadline, &mut task.handle).await {
                    Ok(_) => {}
                    Err(_) => {
                        warn!(run_id = run_id.as_str(), "grace period over, aborting run task");
                        task.handle.abort();
                    }
                }
            }
        }

        if let Err(e) = self.repo.close().await {
            warn!(error = %e, "storage close failed");
        }
        self.release_lock();
        info!("gateway stopped");
    }

    fn acquire_lock(&self) -> Result<(), AgwError> {
        let path = std::path::Path::new(&self.config.server.data_dir).join("gateway.lock");
        if path.exists() {
            return Err(AgwError::Config(format!(
                "instance lock exists at {}; another gateway may be running",
                path.display()
            )));
        }
        std::fs::write(&path, &self.config.server.instance_id).map_err(|e| {
            AgwError::Config(format!("cannot write lock file: {e}"))
        })?;
        *self.lock_file.write().expect("lock file lock poisoned") = Some(path);
        Ok(())
    }

    fn release_lock(&self) {
        if let Some(path) = self
            .lock_file
            .write()
            .expect("lock file lock poisoned")
            .take()
        {
            let _ = std::fs::remove_file(path);
        }
    }

    async fn ensure_channel(&self, channel_id: &str, kind: ChannelKind) -> Result<(), AgwError> {
        let channel = Channel {
            channel_id: channel_id.to_string(),
            kind,
            status: ChannelStatus::Offline,
            last_seen: None,
        };
        self.repo.upsert_channel(&channel).await?;
        self.channel_meta.insert(channel_id.to_string(), channel);
        Ok(())
    }

    /// Single status-update entry point for channel adapters.
    pub async fn update_channel_status(
        &self,
        channel_id: &str,
        status: ChannelStatus,
    ) -> Result<(), AgwError> {
        let updated = {
            let mut entry = self
                .channel_meta
                .get_mut(channel_id)
                .ok_or_else(|| AgwError::NotFound(format!("channel {channel_id}")))?;
            entry.status = status;
            entry.last_seen = Some(Utc::now());
            entry.clone()
        };
        self.repo.upsert_channel(&updated).await?;
        self.emit(
            None,
            Some(channel_id.to_string()),
            EventType::ChannelStatus,
            serde_json::json!({"channel_id": channel_id, "status": status.to_string()}),
        )
        .await?;
        Ok(())
    }

    /// Persists the event and publishes it on the bus under one critical
    /// section, preserving sequence order for subscribers.
    pub async fn emit(
        &self,
        run_id: Option<String>,
        channel_id: Option<String>,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<Event, AgwError> {
        let _guard = self.emit_lock.lock().await;
        let event = self.bus.stamp(event_type, run_id, channel_id, payload);
        self.repo.add_event(&event).await?;
        self.bus.broadcast(event.clone());
        Ok(event)
    }

    /// Sanitizes, policy-checks, rate-limits, persists, and fans out one
    /// inbound channel message. Returns `None` when the message was
    /// blocked (a `security.blocked` event is emitted instead).
    pub async fn ingest_inbound(
        &self,
        envelope: InboundEnvelope,
    ) -> Result<Option<Message>, AgwError> {
        let (cleaned, issues) = sanitize_text(&envelope.text);
        if !issues.is_empty() {
            debug!(
                channel_id = envelope.channel_id.as_str(),
                issues = ?issues,
                "inbound text sanitized"
            );
        }

        let channel_known = self.channel_meta.contains_key(&envelope.channel_id);
        let decision = self.policy_engine.evaluate_inbound(
            channel_known,
            &envelope.channel_id,
            &envelope.sender_id,
            envelope.is_dm,
            envelope.is_group,
        );
        let deny_reason = match decision {
            InboundDecision::Allow => {
                let admit = self.rate_limiter.admit_channel(&envelope.channel_id);
                if admit.allowed {
                    None
                } else {
                    Some("rate_limited".to_string())
                }
            }
            InboundDecision::Deny { reason } => Some(reason),
        };

        if let Some(reason) = deny_reason {
            metrics::counter!("agw_blocked_total", "reason" => reason.clone()).increment(1);
            warn!(
                channel_id = envelope.channel_id.as_str(),
                sender_id = envelope.sender_id.as_str(),
                reason = reason.as_str(),
                "inbound message blocked"
            );
            self.emit(
                None,
                Some(envelope.channel_id.clone()),
                EventType::SecurityBlocked,
                serde_json::json!({
                    "reason": reason,
                    "channel_id": envelope.channel_id,
                    "sender_id": envelope.sender_id,
                }),
            )
            .await?;
            return Ok(None);
        }

        let message = Message {
            message_id: gen_id("msg"),
            chat_id: envelope.chat_id.clone(),
            channel_id: envelope.channel_id.clone(),
            direction: Direction::Inbound,
            sender_id: envelope.sender_id.clone(),
            text: cleaned,
            ts: Utc::now(),
        };

        self.repo
            .upsert_chat(&Chat {
                chat_id: envelope.chat_id.clone(),
                channel_id: envelope.channel_id.clone(),
                title: None,
                created_at: Utc::now(),
            })
            .await?;
        self.repo.add_message(&message).await?;

        metrics::counter!(
            "agw_inbound_messages_total",
            "channel" => envelope.channel_id.clone()
        )
        .increment(1);

        self.emit(
            None,
            Some(envelope.channel_id.clone()),
            EventType::MessageInbound,
            serde_json::json!({"message": message}),
        )
        .await?;

        Ok(Some(message))
    }

    /// Persists a pending run, spawns its orchestrator task, and returns
    /// immediately.
    pub async fn start_run(
        self: Arc<Self>,
        chat_id: &str,
        channel_id: &str,
        requested_by: &str,
        prompt: &str,
    ) -> Result<AgentRun, AgwError> {
        let run = AgentRun::new(
            gen_id("run"),
            chat_id.to_string(),
            channel_id.to_string(),
            requested_by.to_string(),
            self.config.run.max_steps,
            Duration::from_secs(self.config.run.timeout_s),
        );
        self.repo.upsert_run(&run).await?;

        // Bounded history plus the explicit prompt.
        let history = self
            .repo
            .list_messages(chat_id, self.config.run.max_context_messages)
            .await?;
        let mut context: Vec<PlanMessage> = history
            .iter()
            .map(|m| match m.direction {
                Direction::Inbound => PlanMessage::user(m.text.as_str()),
                Direction::Outbound => PlanMessage::assistant(m.text.as_str()),
            })
            .collect();
        context.push(PlanMessage::user(prompt));

        let driver = RunDriver::new(
            self.clone() as Arc<dyn RunAuthority>,
            self.planner.clone(),
            self.tools.clone(),
            self.policy_engine.clone(),
            self.approvals.clone(),
            DriverBudgets {
                tool_timeout: Duration::from_secs(self.config.run.tool_timeout_s),
                approval_timeout: Duration::from_secs(self.config.run.approval_timeout_s),
            },
        );

        let cancel = CancellationToken::new();
        let run_id = run.run_id.clone();
        let run_for_task = run.clone();
        let tasks = self.run_tasks.clone();
        let task_run_id = run_id.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let finished = driver.drive(run_for_task, context, task_cancel).await;
            debug!(
                run_id = finished.run_id.as_str(),
                status = %finished.status,
                "orchestrator task finished"
            );
            tasks.remove(&task_run_id);
        });
        self.run_tasks.insert(run_id.clone(), RunTask { cancel, handle });
        // The task removes itself on completion; if it already finished
        // before the insert, clear the stale entry now.
        let finished = self
            .run_tasks
            .get(&run_id)
            .map(|task| task.handle.is_finished())
            .unwrap_or(false);
        if finished {
            self.run_tasks.remove(&run_id);
        }

        Ok(run)
    }

    /// Cancels a running orchestrator. Returns false when the run is not
    /// live (finished or unknown).
    pub fn cancel_run(&self, run_id: &str) -> bool {
        match self.run_tasks.get(run_id) {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn grant_approval(&self, run_id: &str, by_principal: &str) -> Result<(), AgwError> {
        self.approvals.grant(run_id, by_principal)
    }

    pub fn deny_approval(&self, run_id: &str, reason: &str) -> Result<(), AgwError> {
        self.approvals.deny(run_id, reason)
    }

    pub async fn tail_events(
        &self,
        run_id: Option<&str>,
        after_seq: Option<u64>,
    ) -> Result<Vec<Event>, AgwError> {
        self.repo.tail_events(run_id, after_seq, TAIL_LIMIT).await
    }

    pub async fn list_channels(&self) -> Result<Vec<Channel>, AgwError> {
        self.repo.list_channels().await
    }

    pub async fn list_chats(&self, channel_id: Option<&str>) -> Result<Vec<Chat>, AgwError> {
        self.repo.list_chats(channel_id).await
    }

    pub async fn list_messages(
        &self,
        chat_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, AgwError> {
        let limit = limit.unwrap_or(50).min(MESSAGES_LIMIT_CAP);
        self.repo.list_messages(chat_id, limit).await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<AgentRun>, AgwError> {
        self.repo.get_run(run_id).await
    }

    /// Current policy and tool catalog.
    pub async fn get_config(&self) -> (Policy, Vec<ToolSpec>) {
        let policy = self.policy.read().expect("policy lock poisoned").clone();
        let tools = self.tools.read().await.list();
        (policy, tools)
    }

    /// Applies a partial policy update and persists the merged result.
    pub async fn set_config(&self, diff: PolicyDiff) -> Result<Policy, AgwError> {
        let merged = {
            let mut policy = self.policy.write().expect("policy lock poisoned");
            if let Some(allowlist) = diff.channel_allowlist {
                policy.channel_allowlist = allowlist;
            }
            if let Some(tool_allow) = diff.tool_allowlist {
                policy.tool_allowlist = tool_allow;
            }
            if let Some(dm) = diff.dm_policy {
                policy.dm_policy = dm;
            }
            if let Some(group) = diff.group_policy {
                policy.group_policy = group;
            }
            if let Some(require) = diff.require_approval_for_write {
                policy.require_approval_for_write = require;
            }
            policy.clone()
        };
        self.repo.save_policy(&merged).await?;
        info!("policy updated");
        Ok(merged)
    }

    /// Swaps in a new tool registry (hot reload).
    pub async fn reload_tools(&self, registry: ToolRegistry) {
        let mut tools = self.tools.write().await;
        *tools = registry;
        info!(count = tools.len(), "tool registry reloaded");
    }

    /// Security posture audit.
    pub fn audit(&self) -> Vec<Finding> {
        let policy = self.policy.read().expect("policy lock poisoned").clone();
        let plugins = self
            .loaded_plugins
            .read()
            .expect("plugins lock poisoned")
            .clone();
        audit::run_audit(&self.config, &policy, &plugins)
    }

    /// Plugins discovered at startup.
    pub fn loaded_plugins(&self) -> Vec<LoadedPlugin> {
        self.loaded_plugins
            .read()
            .expect("plugins lock poisoned")
            .clone()
    }

    /// Health snapshot for `GET /healthz`.
    pub fn health(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "checks": {
                "active_runs": self.run_tasks.len(),
                "bus_subscribers": self.bus.subscriber_count(),
                "channels": self.channel_meta.len(),
            }
        })
    }

    // --- handles for the control plane ---

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    pub fn bus_watermark(&self) -> u64 {
        self.bus.current_seq()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn pending_approval(&self, run_id: &str) -> Option<agw_core::PendingApproval> {
        self.approvals.pending(run_id)
    }

    pub fn config(&self) -> &AgwConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        &self.config.server.instance_id
    }

    pub fn channel_known(&self, channel_id: &str) -> bool {
        self.channel_meta.contains_key(channel_id)
    }
}

#[async_trait::async_trait]
impl RunAuthority for Gateway {
    async fn emit(
        &self,
        run_id: Option<&str>,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<u64, AgwError> {
        let event = Gateway::emit(self, run_id.map(String::from), None, event_type, payload)
            .await
            .map_err(|e| {
                error!(error = %e, "event emission failed");
                e
            })?;
        Ok(event.seq)
    }

    async fn persist_run(&self, run: &AgentRun) -> Result<(), AgwError> {
        debug_assert!(
            !run.status.is_terminal() || run.ended_at.is_some(),
            "terminal run must carry ended_at"
        );
        self.repo.upsert_run(run).await
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.release_lock();
    }
}

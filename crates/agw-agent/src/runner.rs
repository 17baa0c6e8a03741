// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-run orchestrator state machine.
//!
//! Drives one `AgentRun` through plan / policy / approval / execute phases
//! with step and deadline budgets. The driver is a pure coordinator: every
//! durable effect goes through the [`RunAuthority`] (implemented by the
//! gateway core), which persists state and emits sequenced events.
//!
//! Event sequence per run: `run.progress{phase:start}`, then per step
//! `run.progress{phase:plan_end}` and the tool-call / blocked / output
//! events the plan leads to, then exactly one terminal `run.completed`.
//! No event for a run is published after its terminal event.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agw_core::{AgentRun, AgwError, EventType, RunError, RunStatus, ToolPermission};
use agw_llm::{PlanDecision, PlanMessage, Planner, ToolCall};
use agw_security::{PolicyEngine, ToolDecision};
use agw_tools::ToolRegistry;

use crate::approval::{ApprovalBroker, ApprovalOutcome};

/// Effect sink implemented by the gateway core.
///
/// `emit` persists the event and publishes it on the bus in one critical
/// section; `persist_run` writes the run row. The orchestrator never
/// touches the repository or the bus directly.
#[async_trait::async_trait]
pub trait RunAuthority: Send + Sync {
    async fn emit(
        &self,
        run_id: Option<&str>,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<u64, AgwError>;

    async fn persist_run(&self, run: &AgentRun) -> Result<(), AgwError>;
}

/// Timeouts the driver applies around its suspension points. The run
/// deadline itself lives on the `AgentRun`.
#[derive(Debug, Clone)]
pub struct DriverBudgets {
    pub tool_timeout: Duration,
    pub approval_timeout: Duration,
}

impl Default for DriverBudgets {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(30),
            approval_timeout: Duration::from_secs(300),
        }
    }
}

/// Terminal classification produced by the decision loop.
struct Terminal {
    status: RunStatus,
    summary: String,
    error: Option<RunError>,
}

impl Terminal {
    fn completed(summary: &str) -> Self {
        Self {
            status: RunStatus::Completed,
            summary: summary.to_string(),
            error: None,
        }
    }

    fn failed(kind: &str, message: &str, summary: &str) -> Self {
        Self {
            status: RunStatus::Failed,
            summary: summary.to_string(),
            error: Some(RunError {
                kind: kind.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Drives a single agent run to a terminal status.
pub struct RunDriver {
    authority: Arc<dyn RunAuthority>,
    planner: Arc<dyn Planner>,
    tools: Arc<RwLock<ToolRegistry>>,
    policy: Arc<PolicyEngine>,
    approvals: ApprovalBroker,
    budgets: DriverBudgets,
}

impl RunDriver {
    pub fn new(
        authority: Arc<dyn RunAuthority>,
        planner: Arc<dyn Planner>,
        tools: Arc<RwLock<ToolRegistry>>,
        policy: Arc<PolicyEngine>,
        approvals: ApprovalBroker,
        budgets: DriverBudgets,
    ) -> Self {
        Self {
            authority,
            planner,
            tools,
            policy,
            approvals,
            budgets,
        }
    }

    /// Runs the state machine to completion and returns the finalized run.
    pub async fn drive(
        &self,
        mut run: AgentRun,
        mut context: Vec<PlanMessage>,
        cancel: CancellationToken,
    ) -> AgentRun {
        let started = std::time::Instant::now();
        let mut output_chunks: Vec<String> = Vec::new();

        let terminal = match self
            .drive_inner(&mut run, &mut context, &mut output_chunks, &cancel)
            .await
        {
            Ok(terminal) => terminal,
            Err(AgwError::LlmUnavailable(msg)) => {
                Terminal::failed("llm_unavailable", &msg, "LLM unavailable")
            }
            Err(e) => {
                warn!(run_id = run.run_id.as_str(), error = %e, "run failed unexpectedly");
                Terminal::failed("internal", &e.to_string(), "Internal error")
            }
        };

        self.finalize(&mut run, &output_chunks, terminal).await;
        metrics::histogram!("agw_run_latency_seconds").record(started.elapsed().as_secs_f64());
        run
    }

    async fn drive_inner(
        &self,
        run: &mut AgentRun,
        context: &mut Vec<PlanMessage>,
        output_chunks: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Terminal, AgwError> {
        // build_context: history was loaded by the gateway; announce start.
        self.transition(run, RunStatus::Planning).await?;
        self.emit(run, EventType::RunProgress, json!({"phase": "start", "step": run.step}))
            .await?;

        let tool_defs = self.tools.read().await.tool_definitions();
        let mut blocked_reason: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Ok(self.canceled(run));
            }

            // plan
            run.step += 1;
            let reply = tokio::select! {
                result = self.planner.plan(context, &tool_defs) => result?,
                _ = cancel.cancelled() => return Ok(self.canceled(run)),
            };
            self.emit(
                run,
                EventType::RunProgress,
                json!({"phase": "plan_end", "step": run.step}),
            )
            .await?;

            match reply.normalize() {
                PlanDecision::Output(text) => {
                    self.emit(run, EventType::RunOutput, json!({"text": text}))
                        .await?;
                    output_chunks.push(text);
                }
                PlanDecision::Abstain => {
                    debug!(run_id = run.run_id.as_str(), step = run.step, "planner abstained");
                }
                PlanDecision::ToolCall {
                    call,
                    note,
                    discarded,
                } => {
                    if discarded > 0 {
                        self.emit(
                            run,
                            EventType::RunProgress,
                            json!({"phase": "multi_tool_discarded", "step": run.step, "discarded": discarded}),
                        )
                        .await?;
                    }
                    if let Some(note) = note {
                        context.push(PlanMessage::assistant(note));
                    }

                    // policy_check
                    let permission = self.tools.read().await.permission_of(&call.name);
                    match self.policy.evaluate_tool(&call.name, permission) {
                        ToolDecision::Deny { reason } => {
                            self.record_block(run, &reason, Some(&call.name)).await?;
                            blocked_reason = Some(reason);
                        }
                        ToolDecision::ApprovalRequired => {
                            match self.await_approval(run, &call, cancel).await? {
                                ApprovalStep::Proceed => {
                                    if let Some(terminal) = self
                                        .execute_tool(run, &call, permission, context, cancel)
                                        .await?
                                    {
                                        return Ok(terminal);
                                    }
                                }
                                ApprovalStep::Blocked(reason) => {
                                    blocked_reason = Some(reason);
                                }
                                ApprovalStep::Terminal(terminal) => return Ok(terminal),
                            }
                        }
                        ToolDecision::Allow => {
                            if let Some(terminal) = self
                                .execute_tool(run, &call, permission, context, cancel)
                                .await?
                            {
                                return Ok(terminal);
                            }
                        }
                    }
                }
            }

            // decide: deadline > step limit > output > blocked-only > continue.
            if Utc::now() >= run.deadline {
                return Ok(Terminal {
                    status: RunStatus::TimedOut,
                    summary: "Run deadline exceeded".to_string(),
                    error: Some(RunError {
                        kind: "run_timeout".to_string(),
                        message: "run deadline exceeded".to_string(),
                    }),
                });
            }
            if run.step >= run.max_steps {
                return Ok(Terminal::failed(
                    "step_limit",
                    &format!("step limit {} reached", run.max_steps),
                    "Step limit reached",
                ));
            }
            if !output_chunks.is_empty() {
                return Ok(Terminal::completed("Completed"));
            }
            if let Some(reason) = blocked_reason.take() {
                // clarify: the user always receives a response.
                let text = format!(
                    "I could not complete the request: the action was blocked ({reason}). \
                     Please rephrase or contact an operator."
                );
                self.emit(run, EventType::RunOutput, json!({"text": text}))
                    .await?;
                output_chunks.push(text);
                return Ok(Terminal::completed("Completed with blocked action"));
            }

            self.transition(run, RunStatus::Planning).await?;
        }
    }

    async fn await_approval(
        &self,
        run: &mut AgentRun,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ApprovalStep, AgwError> {
        self.transition(run, RunStatus::AwaitingApproval).await?;

        let approval_deadline = std::cmp::min(
            run.deadline,
            Utc::now()
                + chrono::Duration::from_std(self.budgets.approval_timeout)
                    .unwrap_or(chrono::Duration::seconds(300)),
        );
        let waiter = self
            .approvals
            .open(&run.run_id, &call.name, call.args.clone(), approval_deadline)?;
        let requested = std::time::Instant::now();

        self.emit(
            run,
            EventType::RunToolCall,
            json!({"tool": call.name, "args": call.args, "approval_required": true}),
        )
        .await?;
        self.emit(
            run,
            EventType::ApprovalRequired,
            json!({
                "run_id": run.run_id,
                "tool": call.name,
                "args": call.args,
                "deadline": approval_deadline,
            }),
        )
        .await?;

        info!(
            run_id = run.run_id.as_str(),
            tool = call.name.as_str(),
            "waiting for approval"
        );

        let outcome = tokio::select! {
            outcome = waiter.wait() => outcome,
            _ = cancel.cancelled() => {
                self.approvals.cancel(&run.run_id);
                return Ok(ApprovalStep::Terminal(self.canceled(run)));
            }
        };
        metrics::histogram!("agw_approval_latency_seconds")
            .record(requested.elapsed().as_secs_f64());

        match outcome {
            ApprovalOutcome::Granted { by } => {
                info!(
                    run_id = run.run_id.as_str(),
                    tool = call.name.as_str(),
                    by = by.as_str(),
                    "approval granted"
                );
                Ok(ApprovalStep::Proceed)
            }
            ApprovalOutcome::Denied { reason } => {
                self.record_block(run, "approval_denied", Some(&call.name))
                    .await?;
                Ok(ApprovalStep::Blocked(format!("approval_denied: {reason}")))
            }
            ApprovalOutcome::TimedOut => {
                self.record_block(run, "approval_timeout", Some(&call.name))
                    .await?;
                Ok(ApprovalStep::Terminal(Terminal::failed(
                    "approval_timeout",
                    &format!("approval for {} not granted in time", call.name),
                    "Approval timeout",
                )))
            }
        }
    }

    /// Invokes the tool. Returns a terminal when a write tool fails;
    /// otherwise the result (ok or error) is fed back for re-planning.
    async fn execute_tool(
        &self,
        run: &mut AgentRun,
        call: &ToolCall,
        permission: Option<ToolPermission>,
        context: &mut Vec<PlanMessage>,
        cancel: &CancellationToken,
    ) -> Result<Option<Terminal>, AgwError> {
        self.transition(run, RunStatus::ToolExec).await?;
        self.emit(
            run,
            EventType::RunToolCall,
            json!({"tool": call.name, "args": call.args, "approval_required": false}),
        )
        .await?;

        let tool = self.tools.read().await.get(&call.name);
        let Some(tool) = tool else {
            // Registry reload raced the policy check; surface as missing.
            self.record_block(run, "tool_missing", Some(&call.name)).await?;
            return Ok(None);
        };

        let mut result = tokio::select! {
            r = self.invoke_once(tool.as_ref(), call) => r,
            _ = cancel.cancelled() => return Ok(Some(self.canceled(run))),
        };
        if result.is_err() && permission == Some(ToolPermission::Read) {
            // Read tools are idempotent: retry once. Write tools never
            // auto-retry.
            debug!(
                run_id = run.run_id.as_str(),
                tool = call.name.as_str(),
                "read tool failed, retrying once"
            );
            result = tokio::select! {
                r = self.invoke_once(tool.as_ref(), call) => r,
                _ = cancel.cancelled() => return Ok(Some(self.canceled(run))),
            };
        }

        match result {
            Ok(value) => {
                metrics::counter!("agw_tool_calls_total", "ok" => "true").increment(1);
                self.emit(
                    run,
                    EventType::RunProgress,
                    json!({"phase": "tool_result", "step": run.step, "tool": call.name, "ok": true}),
                )
                .await?;
                context.push(PlanMessage::tool(format!("{} -> {value}", call.name)));
                Ok(None)
            }
            Err(e) => {
                metrics::counter!("agw_tool_calls_total", "ok" => "false").increment(1);
                self.emit(
                    run,
                    EventType::RunProgress,
                    json!({
                        "phase": "tool_result",
                        "step": run.step,
                        "tool": call.name,
                        "ok": false,
                        "error": e.to_string(),
                    }),
                )
                .await?;

                if permission == Some(ToolPermission::Write) {
                    return Ok(Some(Terminal::failed(
                        "tool_failed",
                        &e.to_string(),
                        "Write tool failed",
                    )));
                }
                context.push(PlanMessage::tool(format!("{} -> error: {e}", call.name)));
                Ok(None)
            }
        }
    }

    async fn invoke_once(
        &self,
        tool: &dyn agw_tools::Tool,
        call: &ToolCall,
    ) -> Result<serde_json::Value, AgwError> {
        match tokio::time::timeout(self.budgets.tool_timeout, tool.invoke(call.args.clone())).await
        {
            Ok(result) => result,
            Err(_) => Err(AgwError::Timeout {
                duration: self.budgets.tool_timeout,
            }),
        }
    }

    async fn record_block(
        &self,
        run: &AgentRun,
        reason: &str,
        tool: Option<&str>,
    ) -> Result<(), AgwError> {
        metrics::counter!("agw_blocked_total", "reason" => reason.to_string()).increment(1);
        warn!(
            run_id = run.run_id.as_str(),
            reason,
            tool = tool.unwrap_or("-"),
            "action blocked"
        );
        let mut payload = json!({"reason": reason});
        if let Some(tool) = tool {
            payload["tool"] = json!(tool);
        }
        self.emit(run, EventType::SecurityBlocked, payload).await?;
        Ok(())
    }

    fn canceled(&self, run: &AgentRun) -> Terminal {
        info!(run_id = run.run_id.as_str(), "run canceled");
        Terminal {
            status: RunStatus::Canceled,
            summary: "Canceled".to_string(),
            error: Some(RunError {
                kind: "canceled".to_string(),
                message: "run canceled".to_string(),
            }),
        }
    }

    async fn transition(&self, run: &mut AgentRun, status: RunStatus) -> Result<(), AgwError> {
        if run.status != status {
            run.status = status;
            self.authority.persist_run(run).await?;
        }
        Ok(())
    }

    async fn emit(
        &self,
        run: &AgentRun,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<u64, AgwError> {
        self.authority
            .emit(Some(&run.run_id), event_type, payload)
            .await
    }

    async fn finalize(&self, run: &mut AgentRun, output_chunks: &[String], terminal: Terminal) {
        run.status = terminal.status;
        run.summary = Some(terminal.summary.clone());
        run.error = terminal.error;
        run.ended_at = Some(Utc::now());
        if !output_chunks.is_empty() {
            run.output_text = Some(output_chunks.join("\n"));
        }

        if let Err(e) = self.authority.persist_run(run).await {
            warn!(run_id = run.run_id.as_str(), error = %e, "failed to persist terminal run");
        }

        let mut payload = json!({
            "status": run.status.to_string(),
            "summary": terminal.summary,
            "output_text": run.output_text,
        });
        if let Some(error) = &run.error {
            payload["error"] = json!({"kind": error.kind, "message": error.message});
        }
        if let Err(e) = self.emit(run, EventType::RunCompleted, payload).await {
            warn!(run_id = run.run_id.as_str(), error = %e, "failed to emit run.completed");
        }

        metrics::counter!("agw_runs_total", "status" => run.status.to_string()).increment(1);
        info!(
            run_id = run.run_id.as_str(),
            status = %run.status,
            steps = run.step,
            "run finalized"
        );
    }
}

enum ApprovalStep {
    Proceed,
    Blocked(String),
    Terminal(Terminal),
}

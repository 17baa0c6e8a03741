// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Planner seam between the orchestrator and the LLM provider.
//!
//! The provider returns a raw [`LlmReply`]; [`LlmReply::normalize`] turns
//! it into the tagged [`PlanDecision`] the orchestrator consumes, applying
//! the tool-wins tie-break. The only compiled-in provider is the
//! deterministic [`MockPlanner`]; real providers plug in behind the same
//! trait, wrapped by [`ResilientPlanner`] for retry + circuit breaking.

pub mod breaker;
pub mod retry;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use agw_core::AgwError;

pub use breaker::CircuitBreaker;
pub use retry::RetryPolicy;

/// One message of planner context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMessage {
    /// "user", "assistant", or "tool".
    pub role: String,
    pub content: String,
}

impl PlanMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
        }
    }
}

/// A tool invocation requested by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: serde_json::Value,
}

/// Raw provider reply: optional text plus zero or more tool calls.
#[derive(Debug, Clone, Default)]
pub struct LlmReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Normalized planner outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecision {
    /// Final text output for the user.
    Output(String),
    /// One tool to run. `note` carries text the provider attached to the
    /// call; `discarded` counts extra calls dropped by the tie-break.
    ToolCall {
        call: ToolCall,
        note: Option<String>,
        discarded: usize,
    },
    /// The provider declined to act.
    Abstain,
}

impl LlmReply {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            text: None,
            tool_calls: vec![ToolCall {
                name: name.into(),
                args,
            }],
        }
    }

    pub fn abstain() -> Self {
        Self::default()
    }

    /// Applies the tie-breaks: a tool call wins over text (the text
    /// becomes a transient note), and only the first of multiple tool
    /// calls survives.
    pub fn normalize(mut self) -> PlanDecision {
        if !self.tool_calls.is_empty() {
            let discarded = self.tool_calls.len() - 1;
            let call = self.tool_calls.remove(0);
            return PlanDecision::ToolCall {
                call,
                note: self.text.filter(|t| !t.is_empty()),
                discarded,
            };
        }
        match self.text {
            Some(text) if !text.is_empty() => PlanDecision::Output(text),
            _ => PlanDecision::Abstain,
        }
    }
}

/// LLM provider seam.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produces the next plan from conversation context and the available
    /// tool definitions.
    async fn plan(
        &self,
        messages: &[PlanMessage],
        tools: &[serde_json::Value],
    ) -> Result<LlmReply, AgwError>;
}

enum MockMode {
    /// Parse `tool:<name> <json>` prompts into tool calls, echo otherwise.
    Echo,
    /// Pop scripted replies in order; falls back to echo when exhausted.
    Script(Mutex<VecDeque<LlmReply>>),
    /// Return the same reply forever.
    Repeat(LlmReply),
}

/// Deterministic planner used by default and throughout the tests.
pub struct MockPlanner {
    mode: MockMode,
}

impl MockPlanner {
    pub fn new() -> Self {
        Self {
            mode: MockMode::Echo,
        }
    }

    pub fn with_script(replies: Vec<LlmReply>) -> Self {
        Self {
            mode: MockMode::Script(Mutex::new(replies.into())),
        }
    }

    pub fn repeating(reply: LlmReply) -> Self {
        Self {
            mode: MockMode::Repeat(reply),
        }
    }

    fn echo_plan(messages: &[PlanMessage]) -> LlmReply {
        let last = messages
            .last()
            .map(|m| m.content.trim())
            .unwrap_or_default();

        if let Some(rest) = last.strip_prefix("tool:") {
            // Format: tool:core.echo {"text":"hi"}
            let (name, raw_args) = match rest.split_once(' ') {
                Some((name, args)) => (name, args.trim()),
                None => (rest, ""),
            };
            let args = if raw_args.is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(raw_args)
                    .unwrap_or_else(|_| serde_json::json!({ "raw": raw_args }))
            };
            return LlmReply {
                text: Some("calling tool".into()),
                tool_calls: vec![ToolCall {
                    name: name.to_string(),
                    args,
                }],
            };
        }

        if last.eq_ignore_ascii_case("abstain") {
            return LlmReply::abstain();
        }

        LlmReply::text_only(format!("mock: {last}"))
    }
}

impl Default for MockPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Planner for MockPlanner {
    async fn plan(
        &self,
        messages: &[PlanMessage],
        _tools: &[serde_json::Value],
    ) -> Result<LlmReply, AgwError> {
        match &self.mode {
            MockMode::Echo => Ok(Self::echo_plan(messages)),
            MockMode::Script(queue) => {
                let next = queue.lock().expect("script lock poisoned").pop_front();
                Ok(next.unwrap_or_else(|| Self::echo_plan(messages)))
            }
            MockMode::Repeat(reply) => Ok(reply.clone()),
        }
    }
}

/// Planner wrapper adding per-call timeout, bounded retry with backoff,
/// and a circuit breaker.
///
/// Exhausted retries and an open circuit both surface as
/// [`AgwError::LlmUnavailable`].
pub struct ResilientPlanner {
    inner: Arc<dyn Planner>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl ResilientPlanner {
    pub fn new(
        inner: Arc<dyn Planner>,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            breaker,
            retry,
            call_timeout,
        }
    }
}

#[async_trait]
impl Planner for ResilientPlanner {
    async fn plan(
        &self,
        messages: &[PlanMessage],
        tools: &[serde_json::Value],
    ) -> Result<LlmReply, AgwError> {
        let mut last_err = String::new();

        for attempt in 1..=self.retry.max_attempts {
            if !self.breaker.allow_call() {
                return Err(AgwError::LlmUnavailable("circuit open".into()));
            }

            let outcome =
                tokio::time::timeout(self.call_timeout, self.inner.plan(messages, tools)).await;

            match outcome {
                Ok(Ok(reply)) => {
                    self.breaker.record_success();
                    return Ok(reply);
                }
                Ok(Err(e)) => {
                    self.breaker.record_failure();
                    last_err = e.to_string();
                }
                Err(_) => {
                    self.breaker.record_failure();
                    last_err = format!("llm call timed out after {:?}", self.call_timeout);
                }
            }

            if attempt < self.retry.max_attempts {
                let delay = self.retry.backoff_delay(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = last_err.as_str(),
                    "llm call failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(AgwError::LlmUnavailable(last_err))
    }
}

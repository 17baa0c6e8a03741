// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Approval rendezvous between the orchestrator and the control plane.
//!
//! One-shot single-producer/single-consumer channel keyed by run id in a
//! mutex-protected map. The waiter drains the channel once; `grant` and
//! `deny` fail once the slot is empty or consumed. The timeout fires at
//! the deadline whether or not anyone is still waiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use agw_core::{AgwError, PendingApproval};

/// Resolution of a pending approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Granted { by: String },
    Denied { reason: String },
    TimedOut,
}

struct Slot {
    tx: oneshot::Sender<ApprovalOutcome>,
    pending: PendingApproval,
}

type SlotMap = Arc<Mutex<HashMap<String, Slot>>>;

/// Registry of pending approvals, shared between the gateway core and the
/// orchestrators.
#[derive(Clone, Default)]
pub struct ApprovalBroker {
    slots: SlotMap,
}

impl ApprovalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a pending approval for a run. At most one may exist per run;
    /// a second `open` for the same run id fails.
    pub fn open(
        &self,
        run_id: &str,
        tool_name: &str,
        args: serde_json::Value,
        deadline: DateTime<Utc>,
    ) -> Result<ApprovalWaiter, AgwError> {
        let mut slots = self.slots.lock().expect("approval slots lock poisoned");
        if slots.contains_key(run_id) {
            return Err(AgwError::InvalidRequest(format!(
                "approval already pending for run {run_id}"
            )));
        }

        let (tx, rx) = oneshot::channel();
        let pending = PendingApproval {
            run_id: run_id.to_string(),
            tool_name: tool_name.to_string(),
            args,
            requested_at: Utc::now(),
            deadline,
        };
        slots.insert(
            run_id.to_string(),
            Slot {
                tx,
                pending: pending.clone(),
            },
        );

        Ok(ApprovalWaiter {
            run_id: run_id.to_string(),
            deadline,
            rx,
            slots: self.slots.clone(),
        })
    }

    /// Grants the pending approval for a run. `not_found` once the window
    /// has closed (resolved, timed out, or never opened).
    pub fn grant(&self, run_id: &str, by_principal: &str) -> Result<(), AgwError> {
        self.resolve(
            run_id,
            ApprovalOutcome::Granted {
                by: by_principal.to_string(),
            },
        )
    }

    /// Denies the pending approval for a run.
    pub fn deny(&self, run_id: &str, reason: &str) -> Result<(), AgwError> {
        self.resolve(
            run_id,
            ApprovalOutcome::Denied {
                reason: reason.to_string(),
            },
        )
    }

    fn resolve(&self, run_id: &str, outcome: ApprovalOutcome) -> Result<(), AgwError> {
        let slot = {
            let mut slots = self.slots.lock().expect("approval slots lock poisoned");
            slots.remove(run_id)
        };
        match slot {
            Some(slot) => {
                // A dropped waiter means the run already unwound; the
                // approval window is gone either way.
                let _ = slot.tx.send(outcome);
                Ok(())
            }
            None => Err(AgwError::NotFound(format!(
                "no pending approval for run {run_id}"
            ))),
        }
    }

    /// Currently pending approval for a run, if any.
    pub fn pending(&self, run_id: &str) -> Option<PendingApproval> {
        self.slots
            .lock()
            .expect("approval slots lock poisoned")
            .get(run_id)
            .map(|slot| slot.pending.clone())
    }

    /// Drops the slot without resolving, e.g. when the run is canceled.
    pub fn cancel(&self, run_id: &str) {
        self.slots
            .lock()
            .expect("approval slots lock poisoned")
            .remove(run_id);
    }
}

/// Single-use waiter returned by [`ApprovalBroker::open`].
pub struct ApprovalWaiter {
    run_id: String,
    deadline: DateTime<Utc>,
    rx: oneshot::Receiver<ApprovalOutcome>,
    slots: SlotMap,
}

impl ApprovalWaiter {
    /// Waits for resolution or the deadline, whichever comes first. The
    /// slot is removed in every case, so a late `grant` gets `not_found`.
    pub async fn wait(self) -> ApprovalOutcome {
        let remaining = (self.deadline - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        let outcome = match tokio::time::timeout(remaining, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without resolving; treat as a closed window.
            Ok(Err(_)) => ApprovalOutcome::TimedOut,
            Err(_) => ApprovalOutcome::TimedOut,
        };

        self.slots
            .lock()
            .expect("approval slots lock poisoned")
            .remove(&self.run_id);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn in_secs(s: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(s)
    }

    #[tokio::test]
    async fn grant_resolves_waiter() {
        let broker = ApprovalBroker::new();
        let waiter = broker
            .open("run_1", "email.send", json!({}), in_secs(5))
            .unwrap();

        broker.grant("run_1", "op").unwrap();
        assert_eq!(
            waiter.wait().await,
            ApprovalOutcome::Granted { by: "op".into() }
        );
    }

    #[tokio::test]
    async fn deny_resolves_waiter_with_reason() {
        let broker = ApprovalBroker::new();
        let waiter = broker
            .open("run_1", "email.send", json!({}), in_secs(5))
            .unwrap();

        broker.deny("run_1", "operator_rejected").unwrap();
        assert_eq!(
            waiter.wait().await,
            ApprovalOutcome::Denied {
                reason: "operator_rejected".into()
            }
        );
    }

    #[tokio::test]
    async fn second_open_for_same_run_fails() {
        let broker = ApprovalBroker::new();
        let _waiter = broker
            .open("run_1", "email.send", json!({}), in_secs(5))
            .unwrap();
        let second = broker.open("run_1", "other.tool", json!({}), in_secs(5));
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn grant_without_pending_is_not_found() {
        let broker = ApprovalBroker::new();
        let err = broker.grant("run_missing", "op").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn waiter_times_out_at_deadline() {
        let broker = ApprovalBroker::new();
        let deadline = Utc::now() + chrono::Duration::milliseconds(100);
        let waiter = broker
            .open("run_1", "email.send", json!({}), deadline)
            .unwrap();

        let started = std::time::Instant::now();
        let outcome = waiter.wait().await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_millis(500));

        // The window is closed; a late grant is not_found.
        assert!(broker.grant("run_1", "op").is_err());
    }

    #[tokio::test]
    async fn grant_is_single_shot() {
        let broker = ApprovalBroker::new();
        let waiter = broker
            .open("run_1", "email.send", json!({}), in_secs(5))
            .unwrap();
        broker.grant("run_1", "op").unwrap();
        assert!(broker.grant("run_1", "op").is_err(), "second grant fails");
        let _ = waiter.wait().await;
    }

    #[tokio::test]
    async fn pending_reports_slot_metadata() {
        let broker = ApprovalBroker::new();
        let _waiter = broker
            .open("run_1", "email.send", json!({"to": "a@b"}), in_secs(5))
            .unwrap();

        let pending = broker.pending("run_1").unwrap();
        assert_eq!(pending.tool_name, "email.send");
        assert_eq!(pending.args["to"], "a@b");
        assert!(broker.pending("run_2").is_none());
    }

    #[tokio::test]
    async fn cancel_clears_slot() {
        let broker = ApprovalBroker::new();
        let _waiter = broker
            .open("run_1", "email.send", json!({}), in_secs(5))
            .unwrap();
        broker.cancel("run_1");
        assert!(broker.pending("run_1").is_none());
        assert!(broker.grant("run_1", "op").is_err());
    }
}

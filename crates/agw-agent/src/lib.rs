// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent run orchestration.
//!
//! [`RunDriver`] executes the per-run state machine; [`ApprovalBroker`]
//! holds the human-in-the-loop rendezvous for write tools. All durable
//! effects flow through the [`RunAuthority`] trait implemented by the
//! gateway core, keeping this crate free of storage and transport code.

pub mod approval;
pub mod runner;

pub use approval::{ApprovalBroker, ApprovalOutcome, ApprovalWaiter};
pub use runner::{DriverBudgets, RunAuthority, RunDriver};

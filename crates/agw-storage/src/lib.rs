// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the agent gateway.
//!
//! One write connection (tokio-rusqlite background thread), WAL mode,
//! refinery-embedded migrations. The gateway core is the only caller of
//! the mutating methods.

pub mod database;
pub mod migrations;
pub mod queries;
pub mod repo;

pub use database::Database;
pub use repo::SqliteRepository;

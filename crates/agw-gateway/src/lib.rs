// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway core and control plane.
//!
//! [`Gateway`] is the single authority: it owns the run table, channel
//! table, policy, and repository, and is the only component that persists
//! state or emits events. The axum server exposes it over the WebSocket
//! control plane plus `/healthz` and `/metrics`.

pub mod audit;
pub mod channels;
pub mod core;
pub mod plugins;
pub mod proto;
pub mod server;
pub mod ws;

pub use audit::Finding;
pub use channels::WebChatChannel;
pub use core::{Gateway, PolicyDiff};
pub use plugins::{discover_plugins, LoadedPlugin};
pub use server::{router, start_server, AppState};

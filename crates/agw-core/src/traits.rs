// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seam traits implemented by the storage backend and channel transports.

use async_trait::async_trait;

use crate::error::AgwError;
use crate::event::Event;
use crate::types::{AgentRun, Channel, ChannelKind, Chat, Message, Policy};

/// Envelope handed to the gateway by a channel transport.
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    pub channel_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub is_dm: bool,
    pub is_group: bool,
}

/// Opaque persistence backend. The gateway core is the only caller of the
/// mutating methods.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn upsert_channel(&self, channel: &Channel) -> Result<(), AgwError>;
    async fn list_channels(&self) -> Result<Vec<Channel>, AgwError>;

    async fn upsert_chat(&self, chat: &Chat) -> Result<(), AgwError>;
    async fn list_chats(&self, channel_id: Option<&str>) -> Result<Vec<Chat>, AgwError>;

    async fn add_message(&self, message: &Message) -> Result<(), AgwError>;
    /// Returns at most `limit` messages for the chat, oldest first
    /// (newest-last replay order).
    async fn list_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<Message>, AgwError>;

    async fn upsert_run(&self, run: &AgentRun) -> Result<(), AgwError>;
    async fn get_run(&self, run_id: &str) -> Result<Option<AgentRun>, AgwError>;

    /// Appends to the event log. Events are immutable once written.
    async fn add_event(&self, event: &Event) -> Result<(), AgwError>;
    /// Replays persisted events with `seq > after_seq`, oldest first,
    /// optionally restricted to one run.
    async fn tail_events(
        &self,
        run_id: Option<&str>,
        after_seq: Option<u64>,
        limit: u32,
    ) -> Result<Vec<Event>, AgwError>;
    /// Highest sequence number in the event log, 0 when empty. Used to
    /// restore the bus counter across restarts.
    async fn max_seq(&self) -> Result<u64, AgwError>;

    async fn load_policy(&self) -> Result<Option<Policy>, AgwError>;
    async fn save_policy(&self, policy: &Policy) -> Result<(), AgwError>;

    async fn close(&self) -> Result<(), AgwError>;
}

/// A channel transport. Transports never touch persistence; they hand
/// [`InboundEnvelope`]s to the gateway and report status through its
/// single status-update entry point.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    fn channel_id(&self) -> &str;
    fn kind(&self) -> ChannelKind;
    async fn start(&self) -> Result<(), AgwError>;
    async fn stop(&self) -> Result<(), AgwError>;
    /// Delivers an outbound message to the remote side.
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), AgwError>;
}

// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback webchat transport.
//!
//! The gateway treats channel transports as collaborators behind the
//! [`ChannelTransport`] trait; Telegram and WhatsApp adapters live outside
//! this crate. The webchat transport is in-process: inbound messages are
//! pushed programmatically (tests, demos) and outbound delivery is a log
//! line, since the operator UI already follows the event stream.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use agw_core::{
    AgwError, ChannelKind, ChannelStatus, ChannelTransport, InboundEnvelope, Message,
};

use crate::core::Gateway;

/// In-process webchat transport bound to one channel id.
pub struct WebChatChannel {
    channel_id: String,
    gateway: Arc<Gateway>,
}

impl WebChatChannel {
    pub fn new(channel_id: impl Into<String>, gateway: Arc<Gateway>) -> Self {
        Self {
            channel_id: channel_id.into(),
            gateway,
        }
    }

    /// Pushes an inbound message through the gateway's ingest path.
    pub async fn push_inbound(
        &self,
        chat_id: &str,
        sender_id: &str,
        text: &str,
        is_dm: bool,
    ) -> Result<Option<Message>, AgwError> {
        self.gateway
            .ingest_inbound(InboundEnvelope {
                channel_id: self.channel_id.clone(),
                chat_id: chat_id.to_string(),
                sender_id: sender_id.to_string(),
                text: text.to_string(),
                is_dm,
                is_group: !is_dm,
            })
            .await
    }
}

#[async_trait]
impl ChannelTransport for WebChatChannel {
    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Webchat
    }

    async fn start(&self) -> Result<(), AgwError> {
        self.gateway
            .update_channel_status(&self.channel_id, ChannelStatus::Online)
            .await?;
        info!(channel_id = self.channel_id.as_str(), "webchat channel online");
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgwError> {
        self.gateway
            .update_channel_status(&self.channel_id, ChannelStatus::Offline)
            .await?;
        Ok(())
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), AgwError> {
        // Loopback: operator UIs consume run.output from the event stream.
        debug!(
            channel_id = self.channel_id.as_str(),
            chat_id,
            len = text.len(),
            "webchat outbound delivered"
        );
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the Repository trait.

use async_trait::async_trait;

use agw_core::{AgentRun, AgwError, Channel, Chat, Event, Message, Policy, Repository};

use crate::database::Database;
use crate::queries;

/// SQLite-backed repository.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules.
pub struct SqliteRepository {
    db: Database,
}

impl SqliteRepository {
    /// Opens the repository at `path`, running migrations as needed.
    pub async fn open(path: &str) -> Result<Self, AgwError> {
        let db = Database::open(path).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn upsert_channel(&self, channel: &Channel) -> Result<(), AgwError> {
        queries::channels::upsert_channel(&self.db, channel).await
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, AgwError> {
        queries::channels::list_channels(&self.db).await
    }

    async fn upsert_chat(&self, chat: &Chat) -> Result<(), AgwError> {
        queries::chats::upsert_chat(&self.db, chat).await
    }

    async fn list_chats(&self, channel_id: Option<&str>) -> Result<Vec<Chat>, AgwError> {
        queries::chats::list_chats(&self.db, channel_id).await
    }

    async fn add_message(&self, message: &Message) -> Result<(), AgwError> {
        queries::messages::insert_message(&self.db, message).await
    }

    async fn list_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<Message>, AgwError> {
        queries::messages::list_messages(&self.db, chat_id, limit).await
    }

    async fn upsert_run(&self, run: &AgentRun) -> Result<(), AgwError> {
        queries::runs::upsert_run(&self.db, run).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<AgentRun>, AgwError> {
        queries::runs::get_run(&self.db, run_id).await
    }

    async fn add_event(&self, event: &Event) -> Result<(), AgwError> {
        queries::events::add_event(&self.db, event).await
    }

    async fn tail_events(
        &self,
        run_id: Option<&str>,
        after_seq: Option<u64>,
        limit: u32,
    ) -> Result<Vec<Event>, AgwError> {
        queries::events::tail_events(&self.db, run_id, after_seq, limit).await
    }

    async fn max_seq(&self) -> Result<u64, AgwError> {
        queries::events::max_seq(&self.db).await
    }

    async fn load_policy(&self) -> Result<Option<Policy>, AgwError> {
        queries::config::load_policy(&self.db).await
    }

    async fn save_policy(&self, policy: &Policy) -> Result<(), AgwError> {
        queries::config::save_policy(&self.db, policy).await
    }

    async fn close(&self) -> Result<(), AgwError> {
        self.db.checkpoint().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    use agw_core::{ChannelKind, ChannelStatus, Direction, EventType, RunStatus};

    async fn open_repo(dir: &tempfile::TempDir) -> SqliteRepository {
        let path = dir.path().join("repo.db");
        SqliteRepository::open(path.to_str().unwrap()).await.unwrap()
    }

    fn channel(id: &str) -> Channel {
        Channel {
            channel_id: id.to_string(),
            kind: ChannelKind::Webchat,
            status: ChannelStatus::Offline,
            last_seen: None,
        }
    }

    fn message(id: &str, chat_id: &str, text: &str) -> Message {
        Message {
            message_id: id.to_string(),
            chat_id: chat_id.to_string(),
            channel_id: "webchat-1".to_string(),
            direction: Direction::Inbound,
            sender_id: "alice".to_string(),
            text: text.to_string(),
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn channel_upsert_and_list() {
        let dir = tempdir().unwrap();
        let repo = open_repo(&dir).await;

        repo.upsert_channel(&channel("webchat-1")).await.unwrap();

        let mut online = channel("webchat-1");
        online.status = ChannelStatus::Online;
        online.last_seen = Some(Utc::now());
        repo.upsert_channel(&online).await.unwrap();

        let channels = repo.list_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].status, ChannelStatus::Online);
        assert!(channels[0].last_seen.is_some());
    }

    #[tokio::test]
    async fn messages_replay_in_insertion_order() {
        let dir = tempdir().unwrap();
        let repo = open_repo(&dir).await;
        repo.upsert_channel(&channel("webchat-1")).await.unwrap();
        repo.upsert_chat(&Chat {
            chat_id: "c1".into(),
            channel_id: "webchat-1".into(),
            title: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        for i in 0..5 {
            repo.add_message(&message(&format!("m{i}"), "c1", &format!("text {i}")))
                .await
                .unwrap();
        }

        let messages = repo.list_messages("c1", 50).await.unwrap();
        assert_eq!(messages.len(), 5);
        for (i, m) in messages.iter().enumerate() {
            assert_eq!(m.text, format!("text {i}"), "newest-last order");
        }

        // Limit keeps the newest entries.
        let limited = repo.list_messages("c1", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].text, "text 3");
        assert_eq!(limited[1].text, "text 4");
    }

    #[tokio::test]
    async fn run_round_trip_preserves_error_and_ended_at() {
        let dir = tempdir().unwrap();
        let repo = open_repo(&dir).await;

        let mut run = AgentRun::new(
            "run_1".into(),
            "c1".into(),
            "webchat-1".into(),
            "op".into(),
            20,
            std::time::Duration::from_secs(300),
        );
        repo.upsert_run(&run).await.unwrap();

        run.status = RunStatus::Failed;
        run.step = 3;
        run.error = Some(agw_core::RunError {
            kind: "approval_timeout".into(),
            message: "not granted".into(),
        });
        run.ended_at = Some(Utc::now());
        repo.upsert_run(&run).await.unwrap();

        let loaded = repo.get_run("run_1").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.step, 3);
        assert_eq!(loaded.error.as_ref().unwrap().kind, "approval_timeout");
        assert!(loaded.ended_at.is_some());

        assert!(repo.get_run("run_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn events_tail_by_run_and_seq() {
        let dir = tempdir().unwrap();
        let repo = open_repo(&dir).await;

        for seq in 1..=6u64 {
            let run_id = if seq % 2 == 0 { "run_even" } else { "run_odd" };
            repo.add_event(&Event {
                seq,
                event_type: EventType::RunProgress,
                ts: Utc::now(),
                run_id: Some(run_id.to_string()),
                channel_id: None,
                payload: serde_json::json!({"seq": seq}),
            })
            .await
            .unwrap();
        }

        let all = repo.tail_events(None, None, 200).await.unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));

        let even = repo.tail_events(Some("run_even"), None, 200).await.unwrap();
        assert_eq!(even.len(), 3);

        let after = repo.tail_events(Some("run_even"), Some(2), 200).await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].seq, 4);

        assert_eq!(repo.max_seq().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn max_seq_is_zero_on_empty_log() {
        let dir = tempdir().unwrap();
        let repo = open_repo(&dir).await;
        assert_eq!(repo.max_seq().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn policy_round_trips_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.db");

        let mut policy = Policy::default();
        policy.tool_allowlist.insert("math.sum".into(), true);
        policy.require_approval_for_write = false;

        {
            let repo = SqliteRepository::open(path.to_str().unwrap()).await.unwrap();
            assert!(repo.load_policy().await.unwrap().is_none());
            repo.save_policy(&policy).await.unwrap();
            repo.close().await.unwrap();
        }

        let repo = SqliteRepository::open(path.to_str().unwrap()).await.unwrap();
        let loaded = repo.load_policy().await.unwrap().unwrap();
        assert!(loaded.is_tool_allowed("math.sum"));
        assert!(!loaded.require_approval_for_write);
    }
}

// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message table queries. Messages are immutable after insertion.

use agw_core::{AgwError, Message};

use crate::database::{map_tr_err, Database};
use super::{parse_enum, parse_ts, to_ts};

pub async fn insert_message(db: &Database, message: &Message) -> Result<(), AgwError> {
    let message = message.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO messages
                     (message_id, chat_id, channel_id, direction, sender_id, text, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message.message_id,
                    message.chat_id,
                    message.channel_id,
                    message.direction.to_string(),
                    message.sender_id,
                    message.text,
                    to_ts(&message.ts),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Returns at most `limit` most-recent messages for the chat, re-ordered
/// oldest first (newest-last replay order).
pub async fn list_messages(
    db: &Database,
    chat_id: &str,
    limit: u32,
) -> Result<Vec<Message>, AgwError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT message_id, chat_id, channel_id, direction, sender_id, text, ts
                 FROM messages WHERE chat_id = ?1
                 ORDER BY ts DESC, message_id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(rusqlite::params![chat_id, limit], |row| {
                Ok(Message {
                    message_id: row.get(0)?,
                    chat_id: row.get(1)?,
                    channel_id: row.get(2)?,
                    direction: parse_enum(&row.get::<_, String>(3)?)?,
                    sender_id: row.get(4)?,
                    text: row.get(5)?,
                    ts: parse_ts(&row.get::<_, String>(6)?)?,
                })
            })?;
            let mut messages: Vec<Message> = rows.collect::<Result<_, rusqlite::Error>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

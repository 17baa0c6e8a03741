// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat table queries.

use agw_core::{AgwError, Chat};

use crate::database::{map_tr_err, Database};
use super::{parse_ts, to_ts};

pub async fn upsert_chat(db: &Database, chat: &Chat) -> Result<(), AgwError> {
    let chat = chat.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO chats (chat_id, channel_id, title, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     channel_id = excluded.channel_id,
                     title = excluded.title",
                rusqlite::params![
                    chat.chat_id,
                    chat.channel_id,
                    chat.title,
                    to_ts(&chat.created_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_chats(db: &Database, channel_id: Option<&str>) -> Result<Vec<Chat>, AgwError> {
    let channel_id = channel_id.map(String::from);
    db.connection()
        .call(move |conn| -> Result<Vec<Chat>, tokio_rusqlite::Error> {
            let map_row = |row: &rusqlite::Row<'_>| -> Result<Chat, rusqlite::Error> {
                Ok(Chat {
                    chat_id: row.get(0)?,
                    channel_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: parse_ts(&row.get::<_, String>(3)?)?,
                })
            };

            let chats = match channel_id {
                Some(channel_id) => {
                    let mut stmt = conn.prepare(
                        "SELECT chat_id, channel_id, title, created_at FROM chats
                         WHERE channel_id = ?1 ORDER BY created_at",
                    )?;
                    let rows = stmt.query_map([channel_id], map_row)?;
                    rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT chat_id, channel_id, title, created_at FROM chats
                         ORDER BY created_at",
                    )?;
                    let rows = stmt.query_map([], map_row)?;
                    rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
                }
            };
            Ok(chats)
        })
        .await
        .map_err(map_tr_err)
}

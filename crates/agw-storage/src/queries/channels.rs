// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel table queries.

use agw_core::{AgwError, Channel};

use crate::database::{map_tr_err, Database};
use super::{parse_enum, parse_ts, to_ts};

pub async fn upsert_channel(db: &Database, channel: &Channel) -> Result<(), AgwError> {
    let channel = channel.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO channels (channel_id, kind, status, last_seen)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(channel_id) DO UPDATE SET
                     kind = excluded.kind,
                     status = excluded.status,
                     last_seen = excluded.last_seen",
                rusqlite::params![
                    channel.channel_id,
                    channel.kind.to_string(),
                    channel.status.to_string(),
                    channel.last_seen.as_ref().map(to_ts),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_channels(db: &Database) -> Result<Vec<Channel>, AgwError> {
    db.connection()
        .call(|conn| -> Result<Vec<Channel>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT channel_id, kind, status, last_seen FROM channels ORDER BY channel_id",
            )?;
            let rows = stmt.query_map([], |row| {
                let last_seen: Option<String> = row.get(3)?;
                Ok(Channel {
                    channel_id: row.get(0)?,
                    kind: parse_enum(&row.get::<_, String>(1)?)?,
                    status: parse_enum(&row.get::<_, String>(2)?)?,
                    last_seen: last_seen.as_deref().map(parse_ts).transpose()?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, rusqlite::Error>>()?)
        })
        .await
        .map_err(map_tr_err)
}

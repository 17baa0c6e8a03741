// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event log queries. The log is append-only; replay is indexed by
//! (run_id, seq).

use agw_core::{AgwError, Event};

use crate::database::{map_tr_err, Database};
use super::{parse_enum, parse_ts, to_ts};

pub async fn add_event(db: &Database, event: &Event) -> Result<(), AgwError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO events (seq, run_id, channel_id, type, payload, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    event.seq as i64,
                    event.run_id,
                    event.channel_id,
                    event.event_type.to_string(),
                    event.payload.to_string(),
                    to_ts(&event.ts),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replays events with `seq > after_seq`, oldest first, optionally
/// restricted to one run. At most `limit` newest matching events are
/// returned.
pub async fn tail_events(
    db: &Database,
    run_id: Option<&str>,
    after_seq: Option<u64>,
    limit: u32,
) -> Result<Vec<Event>, AgwError> {
    let run_id = run_id.map(String::from);
    let after_seq = after_seq.map(|s| s as i64);
    db.connection()
        .call(move |conn| -> Result<Vec<Event>, tokio_rusqlite::Error> {
            let mut sql = String::from(
                "SELECT seq, run_id, channel_id, type, payload, ts FROM events WHERE 1=1",
            );
            let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::new();
            if let Some(ref run_id) = run_id {
                sql.push_str(" AND run_id = ?");
                params.push(run_id);
            }
            if let Some(ref after_seq) = after_seq {
                sql.push_str(" AND seq > ?");
                params.push(after_seq);
            }
            sql.push_str(" ORDER BY seq DESC LIMIT ?");
            params.push(&limit);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                &params[..],
                |row| {
                    let payload: String = row.get(4)?;
                    Ok(Event {
                        seq: row.get::<_, i64>(0)? as u64,
                        run_id: row.get(1)?,
                        channel_id: row.get(2)?,
                        event_type: parse_enum(&row.get::<_, String>(3)?)?,
                        payload: serde_json::from_str(&payload).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                4,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                        ts: parse_ts(&row.get::<_, String>(5)?)?,
                    })
                },
            )?;
            let mut events: Vec<Event> = rows.collect::<Result<_, rusqlite::Error>>()?;
            events.reverse();
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Highest sequence number in the log, 0 when empty.
pub async fn max_seq(db: &Database) -> Result<u64, AgwError> {
    db.connection()
        .call(|conn| -> Result<u64, tokio_rusqlite::Error> {
            let max: Option<i64> =
                conn.query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))?;
            Ok(max.unwrap_or(0) as u64)
        })
        .await
        .map_err(map_tr_err)
}

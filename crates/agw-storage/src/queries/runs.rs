// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent run table queries.

use agw_core::{AgentRun, AgwError, RunError};

use crate::database::{map_tr_err, Database};
use super::{parse_enum, parse_ts, to_ts};

pub async fn upsert_run(db: &Database, run: &AgentRun) -> Result<(), AgwError> {
    let run = run.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO agent_runs
                     (run_id, chat_id, channel_id, requested_by, status, step, max_steps,
                      deadline, output_text, summary, error_kind, error_message,
                      created_at, ended_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(run_id) DO UPDATE SET
                     status = excluded.status,
                     step = excluded.step,
                     output_text = excluded.output_text,
                     summary = excluded.summary,
                     error_kind = excluded.error_kind,
                     error_message = excluded.error_message,
                     ended_at = excluded.ended_at",
                rusqlite::params![
                    run.run_id,
                    run.chat_id,
                    run.channel_id,
                    run.requested_by,
                    run.status.to_string(),
                    run.step,
                    run.max_steps,
                    to_ts(&run.deadline),
                    run.output_text,
                    run.summary,
                    run.error.as_ref().map(|e| e.kind.clone()),
                    run.error.as_ref().map(|e| e.message.clone()),
                    to_ts(&run.created_at),
                    run.ended_at.as_ref().map(to_ts),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_run(db: &Database, run_id: &str) -> Result<Option<AgentRun>, AgwError> {
    let run_id = run_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<AgentRun>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT run_id, chat_id, channel_id, requested_by, status, step, max_steps,
                        deadline, output_text, summary, error_kind, error_message,
                        created_at, ended_at
                 FROM agent_runs WHERE run_id = ?1",
            )?;
            let mut rows = stmt.query_map([run_id], |row| {
                let error_kind: Option<String> = row.get(10)?;
                let error_message: Option<String> = row.get(11)?;
                let ended_at: Option<String> = row.get(13)?;
                Ok(AgentRun {
                    run_id: row.get(0)?,
                    chat_id: row.get(1)?,
                    channel_id: row.get(2)?,
                    requested_by: row.get(3)?,
                    status: parse_enum(&row.get::<_, String>(4)?)?,
                    step: row.get(5)?,
                    max_steps: row.get(6)?,
                    deadline: parse_ts(&row.get::<_, String>(7)?)?,
                    output_text: row.get(8)?,
                    summary: row.get(9)?,
                    error: error_kind.map(|kind| RunError {
                        kind,
                        message: error_message.unwrap_or_default(),
                    }),
                    created_at: parse_ts(&row.get::<_, String>(12)?)?,
                    ended_at: ended_at.as_deref().map(parse_ts).transpose()?,
                })
            })?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)
}

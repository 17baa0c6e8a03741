// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config key-value queries. The policy is persisted here so `config.set`
//! survives restarts.

use agw_core::{AgwError, Policy};

use crate::database::{map_tr_err, Database};

const POLICY_KEY: &str = "policy";

pub async fn load_policy(db: &Database) -> Result<Option<Policy>, AgwError> {
    let raw = db
        .connection()
        .call(|conn| -> Result<Option<String>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT value FROM config WHERE key = ?1")?;
            let mut rows = stmt.query_map([POLICY_KEY], |row| row.get::<_, String>(0))?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)?;

    match raw {
        Some(json) => {
            let policy = serde_json::from_str(&json).map_err(|e| AgwError::Storage {
                source: Box::new(e),
            })?;
            Ok(Some(policy))
        }
        None => Ok(None),
    }
}

pub async fn save_policy(db: &Database, policy: &Policy) -> Result<(), AgwError> {
    let json = serde_json::to_string(policy).map_err(|e| AgwError::Storage {
        source: Box::new(e),
    })?;
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![POLICY_KEY, json],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and
//! lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use tokio_rusqlite::Connection;
use tracing::debug;

use agw_core::AgwError;

/// Maps a tokio-rusqlite error into the workspace error type.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> AgwError {
    AgwError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the gateway's SQLite database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path`, applies the
    /// connection PRAGMAs, and runs pending migrations.
    pub async fn open(path: &str) -> Result<Self, AgwError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AgwError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = Connection::open(path.to_string())
            .await
            .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        let db = Self { conn };
        db.run_migrations().await?;
        debug!(path, "database opened");
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), AgwError> {
        self.conn
            .call(|conn| -> Result<(), tokio_rusqlite::Error> {
                crate::migrations::run_migrations(conn)
                    .map_err(|e| tokio_rusqlite::Error::Other(e.to_string().into()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoints the WAL. Called on shutdown.
    pub async fn checkpoint(&self) -> Result<(), AgwError> {
        self.conn
            .call(|conn| -> Result<(), tokio_rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_database_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("open.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());

        // Schema exists after migrations.
        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, tokio_rusqlite::Error> {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                     ('channels', 'chats', 'messages', 'agent_runs', 'events', 'config')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(count, 6);
    }

    #[tokio::test]
    async fn open_creates_missing_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dirs/agw.db");
        Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        {
            let db = Database::open(path.to_str().unwrap()).await.unwrap();
            db.checkpoint().await.unwrap();
        }
        // Migrations are tracked; a second open must not fail.
        Database::open(path.to_str().unwrap()).await.unwrap();
    }
}

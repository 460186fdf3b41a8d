//! Per-workspace database stored at `<root>/.desktop_cleaner/workspace.db`.
//!
//! Holds indexed file metadata and a history of events such as organize runs.

use crate::registry::{RegistryResult, uuid_column};
use crate::tree::Metadata;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Name of the dot-directory created in every workspace root.
pub const WORKSPACE_DIR_NAME: &str = ".desktop_cleaner";
pub const WORKSPACE_DB_NAME: &str = "workspace.db";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    path TEXT NOT NULL,
    metadata BLOB,
    UNIQUE (workspace_id, path)
);
CREATE TABLE IF NOT EXISTS history (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    event_json TEXT NOT NULL,
    recorded_at DATETIME NOT NULL
);
";

/// Location of the database for the workspace rooted at `root`.
pub fn workspace_db_path(root: &Path) -> PathBuf {
    root.join(WORKSPACE_DIR_NAME).join(WORKSPACE_DB_NAME)
}

/// One entry of the workspace history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    pub id: Uuid,
    pub event_type: String,
    pub event_json: String,
    pub recorded_at: DateTime<Utc>,
}

pub struct WorkspaceDb {
    conn: Mutex<Connection>,
}

impl WorkspaceDb {
    /// Opens or creates the database at `path`. The parent directory must exist.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> RegistryResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> RegistryResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `metadata` for `path`, replacing any earlier entry for the same path.
    pub fn add_file_metadata(
        &self,
        workspace_id: Uuid,
        path: &Path,
        metadata: &Metadata,
    ) -> RegistryResult<()> {
        let blob = serde_json::to_vec(metadata)?;
        self.conn().execute(
            "INSERT INTO files (id, workspace_id, path, metadata) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (workspace_id, path) DO UPDATE SET metadata = excluded.metadata",
            params![
                Uuid::new_v4().to_string(),
                workspace_id.to_string(),
                path.to_string_lossy().into_owned(),
                blob
            ],
        )?;
        Ok(())
    }

    pub fn file_metadata(&self, workspace_id: Uuid, path: &Path) -> RegistryResult<Option<Metadata>> {
        let blob: Option<Vec<u8>> = self
            .conn()
            .query_row(
                "SELECT metadata FROM files WHERE workspace_id = ?1 AND path = ?2",
                params![workspace_id.to_string(), path.to_string_lossy().into_owned()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(blob.map(|bytes| serde_json::from_slice(&bytes)).transpose()?)
    }

    pub fn file_count(&self, workspace_id: Uuid) -> RegistryResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM files WHERE workspace_id = ?1",
            params![workspace_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Appends an event serialized as JSON.
    pub fn record_event<T: Serialize>(&self, event_type: &str, event: &T) -> RegistryResult<Uuid> {
        let json = serde_json::to_string(event)?;
        let id = Uuid::new_v4();
        self.conn().execute(
            "INSERT INTO history (id, event_type, event_json, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), event_type, json, Utc::now()],
        )?;
        Ok(id)
    }

    /// Events in the order they were recorded.
    pub fn history(&self) -> RegistryResult<Vec<HistoryEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, event_type, event_json, recorded_at FROM history ORDER BY recorded_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HistoryEvent {
                id: uuid_column(row, 0)?,
                event_type: row.get(1)?,
                event_json: row.get(2)?,
                recorded_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

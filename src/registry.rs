//! Central SQLite registry of workspaces and directory snapshots.
//!
//! The registry is shared by every workspace and lives in the application's
//! config directory. Each workspace additionally owns a database of its own,
//! see [`crate::workspace_db`].

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    root_path TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '',
    time_stamp DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    taken_at DATETIME NOT NULL,
    directory_state BLOB NOT NULL
);
";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to (de)serialize stored value: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected {expected} row(s) to be affected, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// A registered workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: Uuid,
    pub root_path: PathBuf,
    /// Opaque settings blob, usually serialized configuration.
    pub config: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: Uuid,
    pub taken_at: DateTime<Utc>,
    /// JSON produced by [`crate::tree::DirectoryTree::to_json`].
    pub directory_state: Vec<u8>,
}

pub struct Registry {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Registry {
    /// Opens (creating if needed) the registry database at `path`.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| RegistryError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        debug!("Opening registry at {}", path.display());
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

    /// Inserts `workspace` inside a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RowCountMismatch`] unless exactly one row was
    /// inserted; the transaction is rolled back in that case.
    pub fn insert_workspace(&self, workspace: &Workspace) -> RegistryResult<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT INTO workspaces (id, root_path, config, time_stamp) VALUES (?1, ?2, ?3, ?4)",
            params![
                workspace.id.to_string(),
                workspace.root_path.to_string_lossy().into_owned(),
                workspace.config,
                workspace.created_at,
            ],
        )?;
        expect_one_row(inserted)?;
        tx.commit()?;
        Ok(())
    }

    pub fn workspace(&self, id: Uuid) -> RegistryResult<Option<Workspace>> {
        let workspace = self
            .conn()
            .query_row(
                "SELECT id, root_path, config, time_stamp FROM workspaces WHERE id = ?1",
                params![id.to_string()],
                workspace_from_row,
            )
            .optional()?;
        Ok(workspace)
    }

    /// Workspaces ordered by creation time, oldest first.
    pub fn list_workspaces(&self) -> RegistryResult<Vec<Workspace>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, root_path, config, time_stamp FROM workspaces ORDER BY time_stamp ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], workspace_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Replaces the config blob. Returns false if no such workspace exists.
    pub fn update_workspace_config(&self, id: Uuid, config: &str) -> RegistryResult<bool> {
        let updated = self.conn().execute(
            "UPDATE workspaces SET config = ?1 WHERE id = ?2",
            params![config, id.to_string()],
        )?;
        Ok(updated > 0)
    }

    /// Removes the workspace row. Returns false if it was already gone.
    pub fn delete_workspace(&self, id: Uuid) -> RegistryResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM workspaces WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    pub fn insert_snapshot(&self, snapshot: &Snapshot) -> RegistryResult<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT INTO snapshots (id, taken_at, directory_state) VALUES (?1, ?2, ?3)",
            params![
                snapshot.id.to_string(),
                snapshot.taken_at,
                snapshot.directory_state
            ],
        )?;
        expect_one_row(inserted)?;
        tx.commit()?;
        Ok(())
    }

    pub fn snapshot(&self, id: Uuid) -> RegistryResult<Option<Snapshot>> {
        let snapshot = self
            .conn()
            .query_row(
                "SELECT id, taken_at, directory_state FROM snapshots WHERE id = ?1",
                params![id.to_string()],
                snapshot_from_row,
            )
            .optional()?;
        Ok(snapshot)
    }

    /// Snapshots ordered by the time they were taken, oldest first.
    pub fn snapshots(&self) -> RegistryResult<Vec<Snapshot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, taken_at, directory_state FROM snapshots ORDER BY taken_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], snapshot_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn expect_one_row(actual: usize) -> RegistryResult<()> {
    if actual == 1 {
        Ok(())
    } else {
        Err(RegistryError::RowCountMismatch {
            expected: 1,
            actual,
        })
    }
}

pub(crate) fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn workspace_from_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    let root: String = row.get(1)?;
    Ok(Workspace {
        id: uuid_column(row, 0)?,
        root_path: PathBuf::from(root),
        config: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: uuid_column(row, 0)?,
        taken_at: row.get(1)?,
        directory_state: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn workspace(root: &str, created_at: DateTime<Utc>) -> Workspace {
        Workspace {
            id: Uuid::new_v4(),
            root_path: PathBuf::from(root),
            config: "{}".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_insert_and_get_workspace() {
        let registry = Registry::open_in_memory().unwrap();
        let ws = workspace("/home/user/Desktop", Utc::now());
        registry.insert_workspace(&ws).unwrap();

        let loaded = registry.workspace(ws.id).unwrap().unwrap();
        assert_eq!(loaded.root_path, ws.root_path);
        assert_eq!(loaded.config, "{}");
        assert_eq!(loaded.created_at, ws.created_at);
        assert!(registry.workspace(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let registry = Registry::open_in_memory().unwrap();
        let ws = workspace("/a", Utc::now());
        registry.insert_workspace(&ws).unwrap();
        assert!(registry.insert_workspace(&ws).is_err());
        assert_eq!(registry.list_workspaces().unwrap().len(), 1);
    }

    #[test]
    fn test_list_is_ordered_by_creation_time() {
        let registry = Registry::open_in_memory().unwrap();
        let now = Utc::now();
        let newer = workspace("/newer", now);
        let older = workspace("/older", now - Duration::hours(1));
        registry.insert_workspace(&newer).unwrap();
        registry.insert_workspace(&older).unwrap();

        let roots: Vec<PathBuf> = registry
            .list_workspaces()
            .unwrap()
            .into_iter()
            .map(|w| w.root_path)
            .collect();
        assert_eq!(roots, vec![PathBuf::from("/older"), PathBuf::from("/newer")]);
    }

    #[test]
    fn test_update_and_delete() {
        let registry = Registry::open_in_memory().unwrap();
        let ws = workspace("/a", Utc::now());
        registry.insert_workspace(&ws).unwrap();

        assert!(registry.update_workspace_config(ws.id, "recursive = true").unwrap());
        assert_eq!(registry.workspace(ws.id).unwrap().unwrap().config, "recursive = true");
        assert!(!registry.update_workspace_config(Uuid::new_v4(), "x").unwrap());

        assert!(registry.delete_workspace(ws.id).unwrap());
        assert!(!registry.delete_workspace(ws.id).unwrap());
        assert!(registry.workspace(ws.id).unwrap().is_none());
    }

    #[test]
    fn test_snapshots_round_trip_blob() {
        let registry = Registry::open_in_memory().unwrap();
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            directory_state: br#"{"root_id":"x","nodes":[]}"#.to_vec(),
        };
        registry.insert_snapshot(&snapshot).unwrap();

        assert_eq!(registry.snapshot(snapshot.id).unwrap(), Some(snapshot.clone()));
        assert_eq!(registry.snapshots().unwrap(), vec![snapshot]);
    }

    #[test]
    fn test_row_count_mismatch() {
        assert!(expect_one_row(1).is_ok());
        assert!(matches!(
            expect_one_row(0),
            Err(RegistryError::RowCountMismatch { expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested/registry.db");
        Registry::open(&path).unwrap();
        assert!(path.exists());
    }
}

//! Workspace lifecycle on top of the central [`Registry`].
//!
//! A workspace is a directory the user organizes repeatedly. Creating one
//! provisions `<root>/.desktop_cleaner/` with a per-workspace database, seeds a
//! `.desktop-cleaner-ignore` file at the root and registers the root in the
//! central registry. Snapshots of directory trees are kept in the registry too.

use crate::ignore::{DEFAULT_IGNORE_ENTRIES, IGNORE_FILE_NAME};
use crate::organize::{Operation, OrganizeReport};
use crate::paths::AppPaths;
use crate::registry::{Registry, Snapshot, Workspace};
use crate::tree::DirectoryTree;
use crate::workspace_db::{HistoryEvent, WORKSPACE_DIR_NAME, WorkspaceDb, workspace_db_path};
use chrono::Utc;
use serde::Serialize;
use std::error::Error as StdError;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid workspace selector '{0}': expected a UUID or a 1-based index")]
    InvalidSelector(String),
    #[error("{context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

impl WorkspaceError {
    fn internal(context: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Internal {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Wraps lower-level errors as [`WorkspaceError::Internal`].
trait Context<T> {
    fn context(self, context: impl Into<String>) -> WorkspaceResult<T>;
}

impl<T, E> Context<T> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> WorkspaceResult<T> {
        self.map_err(|source| WorkspaceError::internal(context, source))
    }
}

fn workspace_not_found(id: Uuid) -> WorkspaceError {
    WorkspaceError::NotFound {
        kind: "workspace",
        id: id.to_string(),
    }
}

/// History entry written after each organize run.
#[derive(Debug, Serialize)]
struct OrganizeEvent<'a> {
    dry_run: bool,
    completed: usize,
    skipped_conflicts: usize,
    unmatched: usize,
    ignored: usize,
    operations: &'a [Operation],
}

#[derive(Debug)]
pub struct WorkspaceManager {
    registry: Registry,
}

impl WorkspaceManager {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Opens the registry at `paths.registry_db`.
    pub fn open(paths: &AppPaths) -> WorkspaceResult<Self> {
        let registry = Registry::open(&paths.registry_db).context(format!(
            "failed to open registry at {}",
            paths.registry_db.display()
        ))?;
        Ok(Self::new(registry))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Provisions and registers a workspace rooted at `root_path`.
    ///
    /// The root is created if it does not exist. An existing ignore file is
    /// left untouched.
    pub fn create_workspace(&self, root_path: &Path, config: &str) -> WorkspaceResult<Uuid> {
        debug!("Creating workspace at path: {}", root_path.display());

        let dot_dir = root_path.join(WORKSPACE_DIR_NAME);
        fs::create_dir_all(&dot_dir).context(format!(
            "error creating directory at {}",
            dot_dir.display()
        ))?;
        let root = fs::canonicalize(root_path).unwrap_or_else(|_| root_path.to_path_buf());

        let ignore_path = root.join(IGNORE_FILE_NAME);
        seed_ignore_file(&ignore_path).context(format!(
            "error creating ignore file at {}",
            ignore_path.display()
        ))?;

        WorkspaceDb::open(&workspace_db_path(&root))
            .context("failed to initialize workspace DB")?;

        let workspace = Workspace {
            id: Uuid::new_v4(),
            root_path: root,
            config: config.to_string(),
            created_at: Utc::now(),
        };
        self.registry
            .insert_workspace(&workspace)
            .context("failed to register workspace")?;

        info!(
            "Workspace created with ID: {} at path: {}",
            workspace.id,
            workspace.root_path.display()
        );
        Ok(workspace.id)
    }

    pub fn get_workspace(&self, id: Uuid) -> WorkspaceResult<Workspace> {
        self.registry
            .workspace(id)
            .context("failed to get workspace")?
            .ok_or_else(|| workspace_not_found(id))
    }

    pub fn update_workspace(&self, id: Uuid, config: &str) -> WorkspaceResult<()> {
        let updated = self
            .registry
            .update_workspace_config(id, config)
            .context("failed to update workspace configuration")?;
        if !updated {
            return Err(workspace_not_found(id));
        }
        debug!("Workspace with ID {} updated", id);
        Ok(())
    }

    /// Unregisters the workspace and removes its database file if present.
    pub fn delete_workspace(&self, id: Uuid) -> WorkspaceResult<()> {
        let workspace = self.get_workspace(id)?;

        self.registry
            .delete_workspace(id)
            .context("failed to delete workspace from registry")?;

        let db_path = workspace_db_path(&workspace.root_path);
        match fs::remove_file(&db_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Workspace DB {} already absent", db_path.display());
            }
            Err(e) => {
                return Err(WorkspaceError::internal("failed to delete workspace DB file", e));
            }
        }

        info!("Workspace with ID {} deleted", id);
        Ok(())
    }

    /// Workspaces oldest first; position + 1 is the display index.
    pub fn list_workspaces(&self) -> WorkspaceResult<Vec<Workspace>> {
        self.registry
            .list_workspaces()
            .context("failed to list workspaces")
    }

    /// Resolves a UUID or a 1-based index into [`Self::list_workspaces`].
    pub fn resolve_workspace(&self, selector: &str) -> WorkspaceResult<Workspace> {
        if let Ok(id) = Uuid::parse_str(selector) {
            return self.get_workspace(id);
        }

        let index: usize = selector
            .parse()
            .map_err(|_| WorkspaceError::InvalidSelector(selector.to_string()))?;
        let mut workspaces = self.list_workspaces()?;
        if index == 0 || index > workspaces.len() {
            return Err(WorkspaceError::NotFound {
                kind: "workspace",
                id: format!("#{index}"),
            });
        }
        Ok(workspaces.swap_remove(index - 1))
    }

    pub fn workspace_db(&self, id: Uuid) -> WorkspaceResult<WorkspaceDb> {
        let workspace = self.get_workspace(id)?;
        WorkspaceDb::open(&workspace_db_path(&workspace.root_path))
            .context("failed to open workspace DB")
    }

    /// Stores the metadata of every node of `tree` in the workspace database.
    /// Returns the number of entries written.
    pub fn index_workspace(&self, id: Uuid, tree: &DirectoryTree) -> WorkspaceResult<usize> {
        let db = self.workspace_db(id)?;
        let entries = tree.flatten_metadata();
        for (path, metadata) in &entries {
            db.add_file_metadata(id, path, metadata)
                .context(format!("failed to index {}", path.display()))?;
        }
        debug!("Indexed {} entries for workspace {}", entries.len(), id);
        Ok(entries.len())
    }

    /// Appends an `organize` event to the workspace history.
    pub fn record_organize(&self, id: Uuid, report: &OrganizeReport) -> WorkspaceResult<Uuid> {
        let event = OrganizeEvent {
            dry_run: report.dry_run,
            completed: report.completed(),
            skipped_conflicts: report.skipped_conflicts,
            unmatched: report.unmatched,
            ignored: report.ignored,
            operations: &report.operations,
        };
        self.workspace_db(id)?
            .record_event("organize", &event)
            .context("failed to record organize event")
    }

    pub fn history(&self, id: Uuid) -> WorkspaceResult<Vec<HistoryEvent>> {
        self.workspace_db(id)?
            .history()
            .context("failed to read workspace history")
    }

    /// Serializes `tree` and stores it as a new snapshot.
    pub fn take_snapshot(&self, tree: &DirectoryTree) -> WorkspaceResult<Uuid> {
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            directory_state: tree
                .to_json()
                .context("failed to serialize directory tree")?,
        };
        self.registry
            .insert_snapshot(&snapshot)
            .context("failed to store snapshot")?;
        info!("Snapshot {} taken of {}", snapshot.id, tree.root_path().display());
        Ok(snapshot.id)
    }

    pub fn get_snapshot(&self, id: Uuid) -> WorkspaceResult<Snapshot> {
        self.registry
            .snapshot(id)
            .context("failed to get snapshot")?
            .ok_or_else(|| WorkspaceError::NotFound {
                kind: "snapshot",
                id: id.to_string(),
            })
    }

    pub fn get_snapshots(&self) -> WorkspaceResult<Vec<Snapshot>> {
        self.registry
            .snapshots()
            .context("failed to list snapshots")
    }

    /// Replaces `tree` with the snapshot's state. `tree` is untouched on error.
    pub fn restore_snapshot(&self, id: Uuid, tree: &mut DirectoryTree) -> WorkspaceResult<()> {
        let snapshot = self.get_snapshot(id)?;
        tree.restore_from_json(&snapshot.directory_state)
            .context("failed to restore snapshot")?;
        info!("Restored snapshot {} into {}", id, tree.root_path().display());
        Ok(())
    }

    /// Rebuilds a detached tree from a snapshot.
    pub fn load_snapshot(&self, id: Uuid) -> WorkspaceResult<DirectoryTree> {
        let snapshot = self.get_snapshot(id)?;
        DirectoryTree::from_json(&snapshot.directory_state)
            .context("failed to decode snapshot")
    }
}

fn seed_ignore_file(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    let mut content = DEFAULT_IGNORE_ENTRIES.join("\n");
    content.push('\n');
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> WorkspaceManager {
        WorkspaceManager::new(Registry::open_in_memory().unwrap())
    }

    #[test]
    fn test_create_provisions_workspace() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let wm = manager();
        let id = wm.create_workspace(temp_dir.path(), "{}").unwrap();

        let ws = wm.get_workspace(id).unwrap();
        assert!(ws.root_path.join(".desktop_cleaner/workspace.db").exists());
        let ignore = fs::read_to_string(ws.root_path.join(IGNORE_FILE_NAME)).unwrap();
        assert_eq!(ignore, ".git/\n.desktop_cleaner/\n");
    }

    #[test]
    fn test_existing_ignore_file_is_kept() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join(IGNORE_FILE_NAME), "*.tmp\n").unwrap();
        manager().create_workspace(temp_dir.path(), "").unwrap();
        assert_eq!(
            fs::read_to_string(temp_dir.path().join(IGNORE_FILE_NAME)).unwrap(),
            "*.tmp\n"
        );
    }

    #[test]
    fn test_update_unknown_workspace_is_not_found() {
        assert!(matches!(
            manager().update_workspace(Uuid::new_v4(), "x"),
            Err(WorkspaceError::NotFound { kind: "workspace", .. })
        ));
    }

    #[test]
    fn test_delete_tolerates_missing_db_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let wm = manager();
        let id = wm.create_workspace(temp_dir.path(), "").unwrap();
        let root = wm.get_workspace(id).unwrap().root_path;
        fs::remove_file(workspace_db_path(&root)).unwrap();

        wm.delete_workspace(id).unwrap();
        assert!(matches!(
            wm.get_workspace(id),
            Err(WorkspaceError::NotFound { .. })
        ));
        assert!(wm.delete_workspace(id).is_err());
    }

    #[test]
    fn test_resolve_by_uuid_and_index() {
        let first = TempDir::new().expect("Failed to create temp directory");
        let second = TempDir::new().expect("Failed to create temp directory");
        let wm = manager();
        let a = wm.create_workspace(first.path(), "").unwrap();
        let b = wm.create_workspace(second.path(), "").unwrap();

        assert_eq!(wm.resolve_workspace("1").unwrap().id, a);
        assert_eq!(wm.resolve_workspace("2").unwrap().id, b);
        assert_eq!(wm.resolve_workspace(&b.to_string()).unwrap().id, b);
        assert!(matches!(
            wm.resolve_workspace("3"),
            Err(WorkspaceError::NotFound { .. })
        ));
        assert!(matches!(
            wm.resolve_workspace("0"),
            Err(WorkspaceError::NotFound { .. })
        ));
        assert!(matches!(
            wm.resolve_workspace("desk"),
            Err(WorkspaceError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_index_and_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        let wm = manager();
        let id = wm.create_workspace(temp_dir.path(), "").unwrap();
        let root = wm.get_workspace(id).unwrap().root_path;

        let mut tree = DirectoryTree::new(&root).unwrap();
        tree.build(false, None).unwrap();
        // root, .desktop_cleaner, a.txt, ignore file
        assert_eq!(wm.index_workspace(id, &tree).unwrap(), 4);
        let db = wm.workspace_db(id).unwrap();
        assert_eq!(db.file_metadata(id, &root.join("a.txt")).unwrap().unwrap().size, 1);

        let report = OrganizeReport {
            operations: Vec::new(),
            skipped_conflicts: 0,
            unmatched: 2,
            ignored: 0,
            already_in_place: 0,
            dry_run: true,
            tree,
        };
        wm.record_organize(id, &report).unwrap();
        let history = wm.history(id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].event_json.contains(r#""unmatched":2"#));
    }

    #[test]
    fn test_snapshot_restore_replaces_tree() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(temp_dir.path().join("docs")).unwrap();
        fs::write(temp_dir.path().join("docs/a.txt"), "a").unwrap();
        let wm = manager();

        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();
        let id = wm.take_snapshot(&tree).unwrap();

        let mut other = DirectoryTree::new(temp_dir.path().join("docs")).unwrap();
        wm.restore_snapshot(id, &mut other).unwrap();
        assert_eq!(other.flatten(), tree.flatten());
        assert_eq!(wm.get_snapshots().unwrap().len(), 1);
        assert_eq!(wm.load_snapshot(id).unwrap().flatten(), tree.flatten());
        assert!(matches!(
            wm.restore_snapshot(Uuid::new_v4(), &mut other),
            Err(WorkspaceError::NotFound { kind: "snapshot", .. })
        ));
    }
}

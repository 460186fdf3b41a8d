//! desktop-cleaner - organize directory trees into rule-based folders
//!
//! The library builds an in-memory [`DirectoryTree`] of a source directory,
//! classifies every file through a [`FileTypeTree`] of extension rules and lets
//! the [`OrganizeEngine`] move or copy files into their target folders on a pool
//! of worker threads. Around that sit optional git checkpoints
//! ([`GitRunner`]), a SQLite-backed workspace registry with directory
//! snapshots ([`WorkspaceManager`]) and a KD-tree over file metadata
//! ([`SpatialIndex`]).

pub mod cli;
pub mod config;
pub mod error;
pub mod file_types;
pub mod fs_ops;
pub mod git;
pub mod ignore;
pub mod logging;
pub mod organize;
pub mod output;
pub mod paths;
pub mod registry;
pub mod spatial;
pub mod tree;
pub mod workspace;
pub mod workspace_db;

pub use config::{CleanerConfig, ConfigError, LoggerConfig};
pub use error::{Error, Result};
pub use file_types::FileTypeTree;
pub use git::{GitCli, GitError, GitRunner};
pub use organize::{
    ConflictResolution, FilePathParams, Operation, OrganizeEngine, OrganizeError, OrganizeReport,
};
pub use paths::AppPaths;
pub use registry::{Registry, RegistryError, Snapshot, Workspace};
pub use spatial::{DirectoryPoint, SpatialIndex};
pub use tree::{DirectoryTree, TreeError};
pub use workspace::{WorkspaceError, WorkspaceManager};

//! Directory and file nodes stored in a [`DirectoryTree`](super::DirectoryTree) arena.

use super::metadata::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Index of a directory node inside the tree arena that created it.
///
/// Ids are only meaningful for the tree they came from; a rebuild invalidates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Kind of entry a node mirrors on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Directory,
    File,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Directory => "directory",
            NodeType::File => "file",
        }
    }
}

/// A regular file discovered during a build pass.
///
/// File nodes are immutable once built; the next build replaces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub id: Uuid,
    pub path: PathBuf,
    pub name: String,
    /// Lower-cased extension including the leading dot, empty when the name has none.
    pub extension: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl FileNode {
    pub fn new(path: PathBuf, size: u64, modified_at: Option<DateTime<Utc>>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = extension_of(&path);

        Self {
            id: Uuid::new_v4(),
            path,
            name,
            extension,
            size,
            modified_at,
            metadata: Metadata::default(),
        }
    }
}

/// Returns the lower-cased extension of `path` with a leading dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// A directory in the tree.
///
/// Parent and children are arena indices: the tree owns every node, and the
/// parent link is a plain back-reference.
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    pub(crate) id: Uuid,
    pub(crate) path: PathBuf,
    pub(crate) node_type: NodeType,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) files: Vec<FileNode>,
    pub(crate) metadata: Metadata,
}

impl DirectoryNode {
    pub(crate) fn new(path: PathBuf, parent: Option<NodeId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            node_type: NodeType::Directory,
            parent,
            children: Vec::new(),
            files: Vec::new(),
            metadata: Metadata::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child directories in discovery order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn files(&self) -> &[FileNode] {
        &self.files
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_dir(&self) -> bool {
        self.node_type == NodeType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    /// Final path component, used to match path segments when editing the tree.
    pub(crate) fn segment(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }
}

impl std::fmt::Display for DirectoryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

//! In-memory mirror of a directory subtree.
//!
//! The tree is an arena: [`DirectoryTree`] owns every [`DirectoryNode`] in a
//! `Vec`, nodes refer to each other by [`NodeId`], and files are owned inline by
//! their directory. A path cache maps every discovered path back to its node and
//! is the only part of the tree guarded by a mutex, so file tasks can consult it
//! while the organize engine runs.
//!
//! # Examples
//!
//! ```no_run
//! use desktop_cleaner::tree::DirectoryTree;
//!
//! let mut tree = DirectoryTree::new("/home/user/Desktop").unwrap();
//! tree.build(true, Some(4)).unwrap();
//! for path in tree.flatten() {
//!     println!("{}", path.display());
//! }
//! ```

mod metadata;
mod node;
mod snapshot;

pub use metadata::{
    Metadata, RelationType, Relationship, content_kind_tag, generate_tags, sniffed_extension,
};
pub use node::{DirectoryNode, FileNode, NodeId, NodeType, extension_of};

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Window within which sibling files are annotated as modified around the same time.
const SAME_TIME_WINDOW_SECS: i64 = 60;

/// Errors raised while building, editing or (de)serializing a tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode directory tree: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode directory tree: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("corrupt directory snapshot: {0}")]
    CorruptSnapshot(String),
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Cache entry: where a path lives in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedNode {
    Directory(NodeId),
    File { directory: NodeId, index: usize },
}

/// Borrowed view of a node resolved through the path cache.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Directory(&'a DirectoryNode),
    File(&'a FileNode),
}

#[derive(Debug)]
pub struct DirectoryTree {
    nodes: Vec<DirectoryNode>,
    cache: Mutex<HashMap<PathBuf, CachedNode>>,
}

impl DirectoryTree {
    /// Creates a tree holding only its root directory.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::InvalidArgument` if `root_path` is empty.
    pub fn new(root_path: impl Into<PathBuf>) -> TreeResult<Self> {
        let root_path = root_path.into();
        if root_path.as_os_str().is_empty() {
            return Err(TreeError::InvalidArgument(
                "root path cannot be empty".to_string(),
            ));
        }

        let tree = Self {
            nodes: vec![DirectoryNode::new(root_path.clone(), None)],
            cache: Mutex::new(HashMap::new()),
        };
        tree.safe_cache_set(root_path, CachedNode::Directory(tree.root_id()));
        Ok(tree)
    }

    /// Assembles a tree from already linked nodes; the first node is the root.
    pub(crate) fn from_nodes(nodes: Vec<DirectoryNode>) -> Self {
        let tree = Self {
            nodes,
            cache: Mutex::new(HashMap::new()),
        };
        tree.reindex_cache();
        tree
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root(&self) -> &DirectoryNode {
        &self.nodes[0]
    }

    pub fn root_path(&self) -> &Path {
        self.root().path()
    }

    /// Returns the node for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn node(&self, id: NodeId) -> &DirectoryNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&DirectoryNode> {
        self.nodes.get(id.0)
    }

    /// Directories in arena order: parents always precede their children.
    pub fn directories(&self) -> impl Iterator<Item = &DirectoryNode> {
        self.nodes.iter()
    }

    /// Every file in the tree, grouped by directory in arena order.
    pub fn files(&self) -> impl Iterator<Item = &FileNode> {
        self.nodes.iter().flat_map(|node| node.files.iter())
    }

    pub fn directory_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn file_count(&self) -> usize {
        self.nodes.iter().map(|node| node.files.len()).sum()
    }

    /// Walks the filesystem under the root and rebuilds every node.
    ///
    /// Directories deeper than `max_depth` (root entries are depth 0) are not
    /// read; a warning is logged instead. Entries are visited in file-name order
    /// so repeated builds of an unchanged directory produce the same layout.
    /// Symbolic links are skipped. Files whose header `infer` recognises get a
    /// content kind tag such as `image` or `archive`.
    ///
    /// # Errors
    ///
    /// Any read error on a directory or entry aborts the build.
    pub fn build(&mut self, recursive: bool, max_depth: Option<usize>) -> TreeResult<()> {
        let root_path = self.root_path().to_path_buf();
        let mut root = DirectoryNode::new(root_path.clone(), None);
        root.metadata = Metadata::from_path(&root_path).map_err(|source| TreeError::Io {
            path: root_path.clone(),
            source,
        })?;

        self.nodes = vec![root];
        self.cache_guard().clear();
        self.safe_cache_set(root_path, CachedNode::Directory(self.root_id()));

        self.build_nodes(self.root_id(), recursive, max_depth, 0)
    }

    fn build_nodes(
        &mut self,
        dir: NodeId,
        recursive: bool,
        max_depth: Option<usize>,
        current_depth: usize,
    ) -> TreeResult<()> {
        let dir_path = self.nodes[dir.0].path.clone();

        if let Some(max) = max_depth
            && current_depth > max
        {
            warn!(
                "Max depth of {} reached at {}. Skipping deeper levels.",
                max,
                dir_path.display()
            );
            return Ok(());
        }

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| TreeError::Io { path, source }
        };

        let mut entries = fs::read_dir(&dir_path)
            .map_err(io_err(&dir_path))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_err(&dir_path))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let child_path = entry.path();
            let file_type = entry.file_type().map_err(io_err(&child_path))?;

            if file_type.is_symlink() {
                debug!("Skipping symbolic link {}", child_path.display());
                continue;
            }

            let fs_meta = entry.metadata().map_err(io_err(&child_path))?;

            if file_type.is_dir() {
                let mut child = DirectoryNode::new(child_path.clone(), Some(dir));
                child.metadata = Metadata::from_fs(&fs_meta, NodeType::Directory);
                let child_id = self.push_directory(dir, child);
                self.safe_cache_set(child_path, CachedNode::Directory(child_id));

                if recursive {
                    self.build_nodes(child_id, recursive, max_depth, current_depth + 1)?;
                }
            } else if file_type.is_file() {
                let mut metadata = Metadata::from_fs(&fs_meta, NodeType::File);
                if let Some(kind) = content_kind_tag(&child_path) {
                    metadata.add_tag(kind);
                }
                let mut file = FileNode::new(child_path.clone(), metadata.size, metadata.modified_at);
                file.metadata = metadata;
                let index = self.push_file(dir, file);
                self.safe_cache_set(
                    child_path,
                    CachedNode::File {
                        directory: dir,
                        index,
                    },
                );
            }
        }

        Ok(())
    }

    fn push_directory(&mut self, parent: NodeId, mut child: DirectoryNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        child.parent = Some(parent);
        self.nodes.push(child);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_file(&mut self, dir: NodeId, file: FileNode) -> usize {
        let files = &mut self.nodes[dir.0].files;
        files.push(file);
        files.len() - 1
    }

    /// Lists every directory and file path, parent before children, with a
    /// directory's files after its child directories.
    pub fn flatten(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(self.directory_count() + self.file_count());
        self.flatten_node(self.root_id(), &mut paths);
        paths
    }

    fn flatten_node(&self, id: NodeId, paths: &mut Vec<PathBuf>) {
        let node = self.node(id);
        paths.push(node.path.clone());
        for &child in &node.children {
            self.flatten_node(child, paths);
        }
        paths.extend(node.files.iter().map(|file| file.path.clone()));
    }

    fn cache_guard(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, CachedNode>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn safe_cache_set(&self, path: PathBuf, node: CachedNode) {
        self.cache_guard().insert(path, node);
    }

    pub fn safe_cache_get(&self, path: &Path) -> Option<CachedNode> {
        self.cache_guard().get(path).copied()
    }

    /// Resolves a path through the cache to the node it names.
    pub fn lookup(&self, path: &Path) -> Option<NodeRef<'_>> {
        match self.safe_cache_get(path)? {
            CachedNode::Directory(id) => self.get(id).map(NodeRef::Directory),
            CachedNode::File { directory, index } => self
                .get(directory)
                .and_then(|dir| dir.files.get(index))
                .map(NodeRef::File),
        }
    }

    fn reindex_cache(&self) {
        let mut cache = self.cache_guard();
        cache.clear();
        for (i, node) in self.nodes.iter().enumerate() {
            cache.insert(node.path.clone(), CachedNode::Directory(NodeId(i)));
            for (index, file) in node.files.iter().enumerate() {
                cache.insert(
                    file.path.clone(),
                    CachedNode::File {
                        directory: NodeId(i),
                        index,
                    },
                );
            }
        }
    }

    /// Finds or creates the directory chain named by `segments` below the root.
    pub fn find_or_create_path<S: AsRef<str>>(&mut self, segments: &[S]) -> NodeId {
        let mut current = self.root_id();
        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() {
                continue;
            }

            let existing = self.nodes[current.0]
                .children
                .iter()
                .copied()
                .find(|&child| self.nodes[child.0].segment() == Some(OsStr::new(segment)));

            current = match existing {
                Some(child) => child,
                None => {
                    let path = self.nodes[current.0].path.join(segment);
                    let child = self.push_directory(current, DirectoryNode::new(path.clone(), None));
                    self.safe_cache_set(path, CachedNode::Directory(child));
                    child
                }
            };
        }
        current
    }

    /// Adds the directory at `relative` (below the root), creating missing parents.
    pub fn add_directory(&mut self, relative: &Path) -> NodeId {
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        self.find_or_create_path(&segments)
    }

    /// Adds a file named `name` inside the directory at `relative`, creating missing directories.
    pub fn add_file(
        &mut self,
        relative: &Path,
        name: &str,
        size: u64,
        modified_at: Option<DateTime<Utc>>,
    ) -> TreeResult<&FileNode> {
        if name.is_empty() {
            return Err(TreeError::InvalidArgument(
                "file name cannot be empty".to_string(),
            ));
        }

        let dir = self.add_directory(relative);
        let path = self.nodes[dir.0].path.join(name);
        let file = FileNode::new(path.clone(), size, modified_at);
        let index = self.push_file(dir, file);
        self.safe_cache_set(
            path,
            CachedNode::File {
                directory: dir,
                index,
            },
        );
        Ok(&self.nodes[dir.0].files[index])
    }

    /// Recomputes relationship annotations for every node.
    ///
    /// Directories get `contains` edges to their children and files, children get a
    /// `parent` edge back, and sibling files modified within a minute of each
    /// other get `modified-around-same-time` edges in both directions.
    pub fn add_relationships(&mut self) {
        for node in &mut self.nodes {
            node.metadata.relationships.clear();
            for file in &mut node.files {
                file.metadata.relationships.clear();
            }
        }

        for i in 0..self.nodes.len() {
            let dir_path = self.nodes[i].path.clone();
            let children = self.nodes[i].children.clone();

            for child in children {
                let child_path = self.nodes[child.0].path.clone();
                self.nodes[i]
                    .metadata
                    .relate(&child_path, RelationType::Contains);
                self.nodes[child.0]
                    .metadata
                    .relate(&dir_path, RelationType::Parent);
            }

            let node = &mut self.nodes[i];
            for file in &mut node.files {
                node.metadata.relate(&file.path, RelationType::Contains);
                file.metadata.relate(&dir_path, RelationType::Parent);
            }

            relate_same_time_siblings(&mut node.files);
        }
    }

    /// Collects the metadata of every directory and file keyed by path.
    pub fn flatten_metadata(&self) -> BTreeMap<PathBuf, Metadata> {
        let mut flat = BTreeMap::new();
        for node in &self.nodes {
            flat.insert(node.path.clone(), node.metadata.clone());
            for file in &node.files {
                flat.insert(file.path.clone(), file.metadata.clone());
            }
        }
        flat
    }
}

fn relate_same_time_siblings(files: &mut [FileNode]) {
    let mut order: Vec<(i64, usize)> = files
        .iter()
        .enumerate()
        .filter_map(|(i, file)| file.modified_at.map(|t| (t.timestamp(), i)))
        .collect();
    order.sort_unstable();

    for (pos, &(time, i)) in order.iter().enumerate() {
        for &(other_time, j) in &order[pos + 1..] {
            if other_time - time > SAME_TIME_WINDOW_SECS {
                break;
            }
            let (left, right) = (files[i].path.clone(), files[j].path.clone());
            files[i]
                .metadata
                .relate(&right, RelationType::ModifiedAroundSameTime);
            files[j]
                .metadata
                .relate(&left, RelationType::ModifiedAroundSameTime);
        }
    }
}

impl std::fmt::Display for DirectoryTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(structure: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for (path, content) in structure {
            let full = temp_dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).expect("Failed to create parent");
            fs::write(&full, content).expect("Failed to write test file");
        }
        temp_dir
    }

    #[test]
    fn test_new_rejects_empty_root() {
        let result = DirectoryTree::new("");
        assert!(matches!(result, Err(TreeError::InvalidArgument(_))));
    }

    #[test]
    fn test_build_tags_content_kind() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let png: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];
        fs::write(temp_dir.path().join("photo.png"), png).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "plain text").unwrap();

        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();

        let photo = tree.files().find(|f| f.name == "photo.png").unwrap();
        assert!(photo.metadata.has_tag("image"));
        assert!(photo.metadata.has_tag("file"));
        let notes = tree.files().find(|f| f.name == "notes.txt").unwrap();
        assert!(!notes.metadata.has_tag("image"));
    }

    #[test]
    fn test_build_mirrors_filesystem() {
        let temp_dir = setup(&[
            ("docs/report.docx", "r"),
            ("pics/photo.JPG", "p"),
            ("scripts/setup.sh", "s"),
            ("top.txt", "t"),
        ]);
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();

        assert_eq!(tree.directory_count(), 4);
        assert_eq!(tree.file_count(), 4);
        assert_eq!(tree.root().children().len(), 3);
        assert_eq!(tree.root().files().len(), 1);

        let photo = tree
            .files()
            .find(|file| file.name == "photo.JPG")
            .expect("photo should be in the tree");
        assert_eq!(photo.extension, ".jpg");
        assert_eq!(photo.size, 1);
        assert!(photo.modified_at.is_some());
    }

    #[test]
    fn test_build_respects_max_depth() {
        let temp_dir = setup(&[("a/b/c/deep.txt", ""), ("a/shallow.txt", "")]);
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, Some(1)).unwrap();

        let paths = tree.flatten();
        assert!(paths.contains(&temp_dir.path().join("a/shallow.txt")));
        assert!(paths.contains(&temp_dir.path().join("a/b")));
        assert!(!paths.contains(&temp_dir.path().join("a/b/c")));
    }

    #[test]
    fn test_build_non_recursive_lists_only_top_level() {
        let temp_dir = setup(&[("sub/inner.txt", ""), ("outer.txt", "")]);
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(false, None).unwrap();

        assert_eq!(tree.file_count(), 1);
        assert_eq!(tree.directory_count(), 2);
    }

    #[test]
    fn test_build_missing_root_is_fatal() {
        let mut tree = DirectoryTree::new("/definitely/not/here").unwrap();
        assert!(matches!(tree.build(true, None), Err(TreeError::Io { .. })));
    }

    #[test]
    fn test_rebuild_replaces_previous_nodes() {
        let temp_dir = setup(&[("one.txt", "")]);
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();
        tree.build(true, None).unwrap();
        assert_eq!(tree.file_count(), 1);
    }

    #[test]
    fn test_flatten_orders_children_before_files() {
        let temp_dir = setup(&[("b.txt", ""), ("sub/a.txt", "")]);
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();

        let root = temp_dir.path();
        assert_eq!(
            tree.flatten(),
            vec![
                root.to_path_buf(),
                root.join("sub"),
                root.join("sub/a.txt"),
                root.join("b.txt"),
            ]
        );
    }

    #[test]
    fn test_cache_round_trips_paths() {
        let temp_dir = setup(&[("sub/a.txt", "")]);
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();

        for path in tree.flatten() {
            match tree.lookup(&path).expect("every path should be cached") {
                NodeRef::Directory(dir) => assert_eq!(dir.path(), path),
                NodeRef::File(file) => assert_eq!(file.path, path),
            }
        }
    }

    #[test]
    fn test_parent_links_point_at_holder() {
        let temp_dir = setup(&[("a/b/c.txt", "")]);
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();

        for dir in tree.directories() {
            for &child in dir.children() {
                let parent = tree.node(child).parent().expect("child has a parent");
                assert_eq!(tree.node(parent).path(), dir.path());
            }
        }
    }

    #[test]
    fn test_find_or_create_path_reuses_existing_segments() {
        let mut tree = DirectoryTree::new("/virtual").unwrap();
        let first = tree.find_or_create_path(&["docs", "Reports"]);
        let second = tree.find_or_create_path(&["docs", "Reports"]);
        assert_eq!(first, second);
        assert_eq!(tree.directory_count(), 3);
        assert_eq!(tree.node(first).path(), Path::new("/virtual/docs/Reports"));
    }

    #[test]
    fn test_add_file_creates_intermediate_directories() {
        let mut tree = DirectoryTree::new("/virtual").unwrap();
        let file = tree.add_file(Path::new("pics/2024"), "Beach.PNG", 10, None).unwrap();
        assert_eq!(file.extension, ".png");
        assert_eq!(file.path, Path::new("/virtual/pics/2024/Beach.PNG"));
        assert!(matches!(
            tree.lookup(Path::new("/virtual/pics/2024/Beach.PNG")),
            Some(NodeRef::File(_))
        ));
        assert!(tree.add_file(Path::new("pics"), "", 0, None).is_err());
    }

    #[test]
    fn test_add_relationships() {
        let temp_dir = setup(&[("sub/a.txt", ""), ("sub/b.txt", "")]);
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();
        tree.add_relationships();

        let sub = tree.node(tree.root().children()[0]);
        let contains = sub
            .metadata()
            .relationships
            .iter()
            .filter(|r| r.relation_type == RelationType::Contains)
            .count();
        assert_eq!(contains, 2);
        assert!(sub.metadata().relationships.iter().any(|r| {
            r.relation_type == RelationType::Parent && r.related_node == temp_dir.path()
        }));

        // Both files were written moments apart.
        let a = &sub.files()[0];
        assert!(a.metadata.relationships.iter().any(|r| {
            r.relation_type == RelationType::ModifiedAroundSameTime
                && r.related_node == temp_dir.path().join("sub/b.txt")
        }));

        // Idempotent
        tree.add_relationships();
        let sub = tree.node(tree.root().children()[0]);
        assert_eq!(sub.metadata().relationships.len(), 3);
    }

    #[test]
    fn test_flatten_metadata_covers_every_node() {
        let temp_dir = setup(&[("sub/a.txt", "abc")]);
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();

        let flat = tree.flatten_metadata();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[&temp_dir.path().join("sub/a.txt")].size, 3);
    }
}

//! Classification rules stored as a tree of target folders.
//!
//! Each rule maps a nested target path such as `docs/Reports` to a set of
//! extensions. Rules that share a prefix share nodes, and the path from the
//! root to the node that accepts an extension is the folder files with that
//! extension are moved into.
//!
//! # Examples
//!
//! ```
//! use desktop_cleaner::file_types::FileTypeTree;
//! use std::path::PathBuf;
//!
//! let mut tree = FileTypeTree::new();
//! tree.populate_file_types([("docs/Reports", vec![".docx", ".pdf"]), ("Pics", vec![".jpg"])]);
//!
//! assert_eq!(tree.determine_target_folder(".pdf"), Some(PathBuf::from("docs/Reports")));
//! assert_eq!(tree.determine_target_folder(".jpg"), Some(PathBuf::from("Pics")));
//! assert!(tree.determine_target_folder(".exe").is_none());
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

const ROOT_NAME: &str = "root";

/// Index of a node in a [`FileTypeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileTypeId(usize);

/// A target folder and the extensions it accepts.
#[derive(Debug, Clone)]
pub struct FileTypeNode {
    name: String,
    extensions: Vec<String>,
    parent: Option<FileTypeId>,
    children: Vec<FileTypeId>,
}

impl FileTypeNode {
    fn new(name: &str, parent: Option<FileTypeId>) -> Self {
        Self {
            name: name.to_string(),
            extensions: Vec::new(),
            parent,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn parent(&self) -> Option<FileTypeId> {
        self.parent
    }

    pub fn children(&self) -> &[FileTypeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Checks only this node's own extension set.
    pub fn allows_extension(&self, ext: &str) -> bool {
        let ext = normalize_extension(ext);
        self.extensions.iter().any(|allowed| *allowed == ext)
    }

    fn add_extensions<I, S>(&mut self, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for ext in extensions {
            let ext = normalize_extension(ext.as_ref());
            if !ext.is_empty() && !self.extensions.contains(&ext) {
                self.extensions.push(ext);
            }
        }
    }
}

impl std::fmt::Display for FileTypeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Normalizes an extension to lower case with a single leading dot.
///
/// ```
/// use desktop_cleaner::file_types::normalize_extension;
///
/// assert_eq!(normalize_extension("JPG"), ".jpg");
/// assert_eq!(normalize_extension(".Tar"), ".tar");
/// assert_eq!(normalize_extension(""), "");
/// ```
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{}", trimmed.to_lowercase())
    }
}

#[derive(Debug, Clone)]
pub struct FileTypeTree {
    nodes: Vec<FileTypeNode>,
}

impl Default for FileTypeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTypeTree {
    /// Creates an empty tree holding only the sentinel root.
    pub fn new() -> Self {
        Self {
            nodes: vec![FileTypeNode::new(ROOT_NAME, None)],
        }
    }

    /// Builds a tree from a `file_types` table, appending each folder's
    /// `nested_dirs` entries below it.
    pub fn from_rules(
        file_types: &BTreeMap<String, Vec<String>>,
        nested_dirs: &BTreeMap<String, Vec<String>>,
    ) -> Self {
        let mut tree = Self::new();
        for (folder, extensions) in file_types {
            let mut path = folder.clone();
            for nested in nested_dirs.get(folder).into_iter().flatten() {
                path.push('/');
                path.push_str(nested);
            }
            tree.add_direct_path(&path, extensions);
        }
        tree
    }

    pub fn root_id(&self) -> FileTypeId {
        FileTypeId(0)
    }

    pub fn root(&self) -> &FileTypeNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: FileTypeId) -> &FileTypeNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Adds every `(path, extensions)` rule. Paths use `/` as separator.
    ///
    /// Extensions of rules that resolve to the same node accumulate.
    pub fn populate_file_types<R, P, E, S>(&mut self, rules: R)
    where
        R: IntoIterator<Item = (P, E)>,
        P: AsRef<str>,
        E: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (path, extensions) in rules {
            let id = self.add_direct_path(path.as_ref(), extensions);
            debug!(
                "Added path: {} with extensions: {:?}",
                path.as_ref(),
                self.node(id).extensions
            );
        }
    }

    fn add_direct_path<E, S>(&mut self, path: &str, extensions: E) -> FileTypeId
    where
        E: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: Vec<&str> = path.split('/').collect();
        let id = self.find_or_create_path(&segments);
        self.nodes[id.0].add_extensions(extensions);
        id
    }

    /// Walks `segments` from the root, creating missing nodes. Empty segments are ignored.
    pub fn find_or_create_path(&mut self, segments: &[&str]) -> FileTypeId {
        let mut current = self.root_id();
        for &segment in segments {
            if segment.is_empty() {
                continue;
            }

            let existing = self.nodes[current.0]
                .children
                .iter()
                .copied()
                .find(|&child| self.nodes[child.0].name == segment);

            current = match existing {
                Some(child) => child,
                None => {
                    let child = FileTypeId(self.nodes.len());
                    self.nodes.push(FileTypeNode::new(segment, Some(current)));
                    self.nodes[current.0].children.push(child);
                    child
                }
            };
        }
        current
    }

    /// Checks the root's own extension set.
    pub fn allows_extension(&self, ext: &str) -> bool {
        self.root().allows_extension(ext)
    }

    /// Searches the whole tree for a node accepting `ext`.
    pub fn find_extension(&self, ext: &str) -> bool {
        self.find_node_for_extension(ext).is_some()
    }

    /// First node, in depth-first rule order, whose own set accepts `ext`.
    pub fn find_node_for_extension(&self, ext: &str) -> Option<FileTypeId> {
        self.find_from(self.root_id(), ext)
    }

    fn find_from(&self, id: FileTypeId, ext: &str) -> Option<FileTypeId> {
        let node = self.node(id);
        if node.allows_extension(ext) {
            return Some(id);
        }
        node.children
            .iter()
            .find_map(|&child| self.find_from(child, ext))
    }

    /// Nested target folder, relative to the target root, for files with `ext`.
    pub fn determine_target_folder(&self, ext: &str) -> Option<PathBuf> {
        let found = self
            .find_node_for_extension(ext)
            .map(|id| self.build_path_from_node(id));
        match &found {
            Some(path) => debug!("Extension {} mapped to path: {}", ext, path.display()),
            None => debug!("No mapping found for extension {}", ext),
        }
        found
    }

    /// Joins the names from the root (excluded) down to `id`.
    ///
    /// # Panics
    ///
    /// Panics if a non-root node on the way has an empty name.
    pub fn build_path_from_node(&self, id: FileTypeId) -> PathBuf {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            let name = &self.node(current).name;
            assert!(!name.is_empty(), "file type node has an empty name");
            segments.push(name.as_str());
            current = parent;
        }
        segments.iter().rev().collect()
    }

    /// Rule paths (`a/b`) of every node that accepts at least one extension.
    pub fn flatten(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for &child in &self.root().children {
            self.flatten_node(child, self.node(child).name.clone(), &mut paths);
        }
        paths
    }

    fn flatten_node(&self, id: FileTypeId, current: String, paths: &mut Vec<String>) {
        let node = self.node(id);
        if !node.extensions.is_empty() {
            paths.push(current.clone());
        }
        for &child in &node.children {
            self.flatten_node(child, format!("{}/{}", current, self.node(child).name), paths);
        }
    }
}

//! Node metadata, derived tags and lightweight relationship annotations.

use super::node::NodeType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Size above which a node is tagged `large`.
const LARGE_THRESHOLD: u64 = 1_000_000;
/// Size above which a node is tagged `medium`.
const MEDIUM_THRESHOLD: u64 = 1_000;

/// Kind of edge between two nodes. Edges are annotations only, never ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationType {
    Contains,
    Parent,
    ModifiedAroundSameTime,
}

/// An edge to another node, referenced by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub related_node: PathBuf,
    pub relation_type: RelationType,
}

/// Metadata captured for every node in a tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    /// Best-effort: not every platform or filesystem reports a creation time.
    pub created_at: Option<DateTime<Utc>>,
    pub node_type: NodeType,
    /// Unix permission bits (`mode & 0o7777`).
    pub permissions: u32,
    /// Best-effort owner, the numeric uid on unix.
    pub owner: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Metadata {
    /// Builds metadata from an already fetched `fs::Metadata` and derives its tags.
    pub fn from_fs(meta: &fs::Metadata, node_type: NodeType) -> Self {
        let mut metadata = Self {
            size: meta.len(),
            modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
            created_at: meta.created().ok().map(DateTime::<Utc>::from),
            node_type,
            permissions: permission_bits(meta),
            owner: owner_of(meta),
            tags: Vec::new(),
            relationships: Vec::new(),
        };
        metadata.tags = generate_tags(&metadata);
        metadata
    }

    /// Stats `path` and builds its metadata.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        let node_type = if meta.is_dir() {
            NodeType::Directory
        } else {
            NodeType::File
        };
        Ok(Self::from_fs(&meta, node_type))
    }

    /// Projects the metadata into `(size, modified, created, permission bits)`.
    pub fn to_point(&self) -> [f64; 4] {
        [
            self.size as f64,
            self.modified_at.map(|t| t.timestamp()).unwrap_or(0) as f64,
            self.created_at.map(|t| t.timestamp()).unwrap_or(0) as f64,
            (self.permissions & 0o777) as f64,
        ]
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub(crate) fn add_tag(&mut self, tag: &str) {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub(crate) fn relate(&mut self, related_node: &Path, relation_type: RelationType) {
        self.relationships.push(Relationship {
            related_node: related_node.to_path_buf(),
            relation_type,
        });
    }
}

/// Derives tags from node type, size class and permission bits.
pub fn generate_tags(metadata: &Metadata) -> Vec<String> {
    let mut tags = Vec::new();

    tags.push(
        match metadata.node_type {
            NodeType::Directory => "folder",
            NodeType::File => "file",
        }
        .to_string(),
    );

    let size_class = if metadata.size > LARGE_THRESHOLD {
        "large"
    } else if metadata.size > MEDIUM_THRESHOLD {
        "medium"
    } else {
        "small"
    };
    tags.push(size_class.to_string());

    if metadata.permissions & 0o200 != 0 {
        tags.push("writable".to_string());
    }
    if metadata.permissions & 0o400 != 0 {
        tags.push("readable".to_string());
    }

    tags
}

/// Sniffs the file header and returns a coarse content kind, if recognised.
pub fn content_kind_tag(path: &Path) -> Option<&'static str> {
    let kind = infer::get_from_path(path).ok().flatten()?;
    match kind.matcher_type() {
        infer::MatcherType::App => Some("app"),
        infer::MatcherType::Archive => Some("archive"),
        infer::MatcherType::Audio => Some("audio"),
        infer::MatcherType::Book => Some("book"),
        infer::MatcherType::Doc => Some("document"),
        infer::MatcherType::Font => Some("font"),
        infer::MatcherType::Image => Some("image"),
        infer::MatcherType::Video => Some("video"),
        _ => None,
    }
}

/// Sniffs the file header and returns the detected extension with a leading dot.
pub fn sniffed_extension(path: &Path) -> Option<String> {
    infer::get_from_path(path)
        .ok()
        .flatten()
        .map(|kind| format!(".{}", kind.extension()))
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
fn owner_of(meta: &fs::Metadata) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.uid().to_string())
}

#[cfg(not(unix))]
fn owner_of(_meta: &fs::Metadata) -> Option<String> {
    None
}

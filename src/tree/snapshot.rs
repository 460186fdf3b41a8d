//! JSON wire format for a [`DirectoryTree`].
//!
//! Nodes are written as a flat list keyed by uuid, with parent and child edges
//! replaced by id references. Loading decodes every record into a staging map
//! and then rebuilds the arena from the root outwards.

use super::{DirectoryNode, DirectoryTree, FileNode, Metadata, NodeId, NodeType, TreeError, TreeResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct TreeRecord {
    root_id: Uuid,
    nodes: Vec<NodeRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    id: Uuid,
    path: PathBuf,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    files: Vec<FileNode>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    file_ids: Vec<Uuid>,
}

impl DirectoryTree {
    /// Serializes the tree structure and metadata to JSON.
    pub fn to_json(&self) -> TreeResult<Vec<u8>> {
        let nodes = self
            .directories()
            .map(|node| NodeRecord {
                id: node.id,
                path: node.path.clone(),
                node_type: node.node_type,
                files: node.files.clone(),
                metadata: node.metadata.clone(),
                parent_id: node.parent.map(|parent| self.node(parent).id),
                children_ids: node.children.iter().map(|&c| self.node(c).id).collect(),
                file_ids: node.files.iter().map(|f| f.id).collect(),
            })
            .collect();

        let record = TreeRecord {
            root_id: self.root().id,
            nodes,
        };
        serde_json::to_vec(&record).map_err(TreeError::Encode)
    }

    /// Decodes a tree previously written by [`DirectoryTree::to_json`].
    ///
    /// Every call stages its own records, so any number of snapshots can be
    /// decoded one after another.
    pub fn from_json(bytes: &[u8]) -> TreeResult<Self> {
        let record: TreeRecord = serde_json::from_slice(bytes).map_err(TreeError::Decode)?;

        let mut staged = HashMap::with_capacity(record.nodes.len());
        for node in record.nodes {
            if let Some(dup) = staged.insert(node.id, node) {
                return Err(TreeError::CorruptSnapshot(format!(
                    "duplicate node id {}",
                    dup.id
                )));
            }
        }

        let nodes = rebuild_graph(record.root_id, staged)?;
        Ok(Self::from_nodes(nodes))
    }

    /// Replaces this tree with the one encoded in `bytes`.
    pub fn restore_from_json(&mut self, bytes: &[u8]) -> TreeResult<()> {
        *self = Self::from_json(bytes)?;
        Ok(())
    }
}

/// Reconnects staged records into an arena, root first.
fn rebuild_graph(root_id: Uuid, mut staged: HashMap<Uuid, NodeRecord>) -> TreeResult<Vec<DirectoryNode>> {
    let mut nodes: Vec<DirectoryNode> = Vec::with_capacity(staged.len());
    let mut queue = VecDeque::from([(root_id, None::<NodeId>)]);

    while let Some((id, parent)) = queue.pop_front() {
        let record = staged.remove(&id).ok_or_else(|| {
            TreeError::CorruptSnapshot(format!("node {id} is missing or referenced twice"))
        })?;

        let expected_parent = parent.map(|p| nodes[p.0].id);
        if record.parent_id != expected_parent {
            return Err(TreeError::CorruptSnapshot(format!(
                "node {id} does not name its holder as parent"
            )));
        }

        let file_ids: Vec<Uuid> = record.files.iter().map(|f| f.id).collect();
        if file_ids != record.file_ids {
            return Err(TreeError::CorruptSnapshot(format!(
                "file ids of node {id} do not match its files"
            )));
        }

        let node_id = NodeId(nodes.len());
        nodes.push(DirectoryNode {
            id: record.id,
            path: record.path,
            node_type: record.node_type,
            parent,
            children: Vec::with_capacity(record.children_ids.len()),
            files: record.files,
            metadata: record.metadata,
        });
        if let Some(p) = parent {
            nodes[p.0].children.push(node_id);
        }

        queue.extend(record.children_ids.into_iter().map(|child| (child, Some(node_id))));
    }

    if !staged.is_empty() {
        return Err(TreeError::CorruptSnapshot(format!(
            "{} node(s) unreachable from the root",
            staged.len()
        )));
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    type Shape = (PathBuf, NodeType, Option<PathBuf>, Vec<PathBuf>, Vec<PathBuf>);

    fn shape(tree: &DirectoryTree) -> Vec<Shape> {
        let mut shapes: Vec<Shape> = tree
            .directories()
            .map(|node| {
                let mut children: Vec<PathBuf> = node
                    .children()
                    .iter()
                    .map(|&c| tree.node(c).path().to_path_buf())
                    .collect();
                children.sort();
                let mut files: Vec<PathBuf> = node.files().iter().map(|f| f.path.clone()).collect();
                files.sort();
                (
                    node.path().to_path_buf(),
                    node.node_type(),
                    node.parent().map(|p| tree.node(p).path().to_path_buf()),
                    children,
                    files,
                )
            })
            .collect();
        shapes.sort_by(|a, b| a.0.cmp(&b.0));
        shapes
    }

    fn built_tree() -> (TempDir, DirectoryTree) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for path in ["docs/a.docx", "docs/deep/b.md", "pics/c.jpg", "top.txt"] {
            let full = temp_dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, path).unwrap();
        }
        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();
        (temp_dir, tree)
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let (_temp_dir, tree) = built_tree();
        let json = tree.to_json().unwrap();
        let restored = DirectoryTree::from_json(&json).unwrap();

        assert_eq!(shape(&restored), shape(&tree));
        assert_eq!(restored.flatten(), tree.flatten());
        assert_eq!(restored.root().id(), tree.root().id());
    }

    #[test]
    fn test_restored_tree_answers_cache_lookups() {
        let (temp_dir, tree) = built_tree();
        let restored = DirectoryTree::from_json(&tree.to_json().unwrap()).unwrap();
        assert!(restored.lookup(&temp_dir.path().join("docs/deep/b.md")).is_some());
        assert!(restored.lookup(&temp_dir.path().join("pics")).is_some());
    }

    #[test]
    fn test_wire_format_uses_id_references() {
        let (_temp_dir, tree) = built_tree();
        let value: serde_json::Value = serde_json::from_slice(&tree.to_json().unwrap()).unwrap();

        let nodes = value["nodes"].as_array().unwrap();
        let root = nodes
            .iter()
            .find(|n| n["id"] == value["root_id"])
            .expect("root record present");
        assert!(root.get("parent_id").is_none());
        assert_eq!(root["type"], "directory");
        assert_eq!(root["children_ids"].as_array().unwrap().len(), 2);
        assert_eq!(root["file_ids"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_sequential_restores_are_independent() {
        let (_first_dir, first) = built_tree();
        let (_second_dir, second) = built_tree();
        let first_json = first.to_json().unwrap();
        let second_json = second.to_json().unwrap();

        let mut active = DirectoryTree::new("/unused").unwrap();
        active.restore_from_json(&first_json).unwrap();
        assert_eq!(shape(&active), shape(&first));
        active.restore_from_json(&second_json).unwrap();
        assert_eq!(shape(&active), shape(&second));
        active.restore_from_json(&first_json).unwrap();
        assert_eq!(shape(&active), shape(&first));
    }

    #[test]
    fn test_orphan_nodes_are_rejected() {
        let mut tree = DirectoryTree::new("/virtual").unwrap();
        tree.add_directory(Path::new("docs"));
        let mut value: serde_json::Value = serde_json::from_slice(&tree.to_json().unwrap()).unwrap();
        value["nodes"][0]
            .as_object_mut()
            .unwrap()
            .remove("children_ids");

        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            DirectoryTree::from_json(&bytes),
            Err(TreeError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert!(matches!(
            DirectoryTree::from_json(b"not json"),
            Err(TreeError::Decode(_))
        ));
    }
}

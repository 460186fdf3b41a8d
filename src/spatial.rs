//! Metadata search over a [`DirectoryTree`] using a 4-d k-d tree.
//!
//! Every directory and file becomes a point `(size, modified, created,
//! permission bits)` as produced by [`Metadata::to_point`]. The index never
//! touches the tree it was built from; it only keeps paths.

use crate::tree::{DirectoryTree, Metadata, NodeType};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;

pub const DIMENSIONS: usize = 4;

pub type Point = [f64; DIMENSIONS];

/// A node's metadata projected into the index space.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryPoint {
    pub path: PathBuf,
    pub node_type: NodeType,
    pub coords: Point,
}

impl DirectoryPoint {
    pub fn new(path: PathBuf, metadata: &Metadata) -> Self {
        Self {
            path,
            node_type: metadata.node_type,
            coords: metadata.to_point(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct KdNode {
    point: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Heap entry ordered by distance, farthest on top.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist_sq: f64,
    point: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.point.cmp(&other.point))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    points: Vec<DirectoryPoint>,
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

impl SpatialIndex {
    /// Indexes every directory and file of `tree`.
    pub fn from_tree(tree: &DirectoryTree) -> Self {
        let mut points = Vec::with_capacity(tree.directory_count() + tree.file_count());
        for dir in tree.directories() {
            points.push(DirectoryPoint::new(dir.path().to_path_buf(), dir.metadata()));
            points.extend(
                dir.files()
                    .iter()
                    .map(|file| DirectoryPoint::new(file.path.clone(), &file.metadata)),
            );
        }
        Self::from_points(points)
    }

    pub fn from_points(points: Vec<DirectoryPoint>) -> Self {
        let mut index = Self {
            points,
            nodes: Vec::new(),
            root: None,
        };
        index.rebuild();
        index
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[DirectoryPoint] {
        &self.points
    }

    /// Adds a point and rebuilds the whole tree.
    pub fn insert_node(&mut self, point: DirectoryPoint) {
        self.points.push(point);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.nodes = Vec::with_capacity(self.points.len());
        let mut order: Vec<usize> = (0..self.points.len()).collect();
        self.root = self.build(&mut order, 0);
    }

    fn build(&mut self, order: &mut [usize], depth: usize) -> Option<usize> {
        if order.is_empty() {
            return None;
        }

        let axis = depth % DIMENSIONS;
        let mid = order.len() / 2;
        let points = &self.points;
        order.select_nth_unstable_by(mid, |&a, &b| {
            points[a].coords[axis].total_cmp(&points[b].coords[axis])
        });

        let slot = self.nodes.len();
        self.nodes.push(KdNode {
            point: order[mid],
            axis,
            left: None,
            right: None,
        });

        let (lower, rest) = order.split_at_mut(mid);
        let left = self.build(lower, depth + 1);
        let right = self.build(&mut rest[1..], depth + 1);
        self.nodes[slot].left = left;
        self.nodes[slot].right = right;
        Some(slot)
    }

    /// Points within Euclidean distance `radius` of `query`, nearest first.
    pub fn range_search(&self, query: &Point, radius: f64) -> Vec<&DirectoryPoint> {
        let mut found = Vec::new();
        if radius >= 0.0 {
            self.range_from(self.root, query, radius, radius * radius, &mut found);
        }
        found.sort();
        found.into_iter().map(|c| &self.points[c.point]).collect()
    }

    fn range_from(
        &self,
        slot: Option<usize>,
        query: &Point,
        radius: f64,
        radius_sq: f64,
        found: &mut Vec<Candidate>,
    ) {
        let Some(node) = slot.map(|s| self.nodes[s]) else {
            return;
        };
        let coords = &self.points[node.point].coords;

        let dist_sq = distance_sq(query, coords);
        if dist_sq <= radius_sq {
            found.push(Candidate {
                dist_sq,
                point: node.point,
            });
        }

        let diff = query[node.axis] - coords[node.axis];
        if diff <= radius {
            self.range_from(node.left, query, radius, radius_sq, found);
        }
        if diff >= -radius {
            self.range_from(node.right, query, radius, radius_sq, found);
        }
    }

    /// The `k` points closest to `query`, nearest first.
    pub fn nearest_neighbors(&self, query: &Point, k: usize) -> Vec<&DirectoryPoint> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.nearest_from(self.root, query, k, &mut heap);
        heap.into_sorted_vec()
            .into_iter()
            .map(|c| &self.points[c.point])
            .collect()
    }

    fn nearest_from(
        &self,
        slot: Option<usize>,
        query: &Point,
        k: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        let Some(node) = slot.map(|s| self.nodes[s]) else {
            return;
        };
        let coords = &self.points[node.point].coords;

        heap.push(Candidate {
            dist_sq: distance_sq(query, coords),
            point: node.point,
        });
        if heap.len() > k {
            heap.pop();
        }

        let diff = query[node.axis] - coords[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        self.nearest_from(near, query, k, heap);

        let worst = heap.peek().map_or(f64::INFINITY, |c| c.dist_sq);
        if heap.len() < k || diff * diff <= worst {
            self.nearest_from(far, query, k, heap);
        }
    }
}

fn distance_sq(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(name: &str, coords: Point) -> DirectoryPoint {
        DirectoryPoint {
            path: PathBuf::from(name),
            node_type: NodeType::File,
            coords,
        }
    }

    fn grid() -> SpatialIndex {
        let mut points = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                points.push(point(
                    &format!("{x}-{y}"),
                    [f64::from(x), f64::from(y), 0.0, 0.0],
                ));
            }
        }
        SpatialIndex::from_points(points)
    }

    fn names(found: &[&DirectoryPoint]) -> Vec<String> {
        found
            .iter()
            .map(|p| p.path.to_string_lossy().to_string())
            .collect()
    }

    fn brute_force(index: &SpatialIndex, query: &Point, radius: f64) -> usize {
        index
            .points()
            .iter()
            .filter(|p| distance_sq(query, &p.coords) <= radius * radius)
            .count()
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::default();
        assert!(index.is_empty());
        assert!(index.range_search(&[0.0; 4], 10.0).is_empty());
        assert!(index.nearest_neighbors(&[0.0; 4], 3).is_empty());
    }

    #[test]
    fn test_range_search_matches_brute_force() {
        let index = grid();
        for (query, radius) in [
            ([2.0, 2.0, 0.0, 0.0], 1.0),
            ([0.0, 0.0, 0.0, 0.0], 1.5),
            ([4.5, 1.0, 0.0, 0.0], 2.2),
            ([2.0, 2.0, 0.0, 0.0], 0.0),
        ] {
            let found = index.range_search(&query, radius);
            assert_eq!(found.len(), brute_force(&index, &query, radius));
        }
        assert_eq!(names(&index.range_search(&[2.0, 2.0, 0.0, 0.0], 0.5)), vec!["2-2"]);
    }

    #[test]
    fn test_nearest_neighbors_are_sorted() {
        let index = grid();
        let found = index.nearest_neighbors(&[0.1, 0.0, 0.0, 0.0], 3);
        assert_eq!(names(&found)[0], "0-0");
        assert_eq!(found.len(), 3);
        let mut names = names(&found[1..]);
        names.sort();
        assert_eq!(names, vec!["0-1", "1-0"]);

        assert_eq!(index.nearest_neighbors(&[0.0; 4], 100).len(), 25);
    }

    #[test]
    fn test_insert_node_rebuilds() {
        let mut index = grid();
        index.insert_node(point("far", [100.0, 100.0, 0.0, 0.0]));
        assert_eq!(index.len(), 26);
        assert_eq!(
            names(&index.nearest_neighbors(&[99.0, 99.0, 0.0, 0.0], 1)),
            vec!["far"]
        );
    }

    #[test]
    fn test_from_tree_indexes_directories_and_files() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();
        std::fs::write(temp_dir.path().join("sub/big.bin"), vec![0u8; 4096]).unwrap();
        std::fs::write(temp_dir.path().join("small.txt"), "x").unwrap();

        let mut tree = DirectoryTree::new(temp_dir.path()).unwrap();
        tree.build(true, None).unwrap();
        let index = SpatialIndex::from_tree(&tree);
        assert_eq!(index.len(), 4);

        let big = index
            .points()
            .iter()
            .find(|p| p.path.ends_with("big.bin"))
            .unwrap();
        let nearest = index.nearest_neighbors(&big.coords, 1);
        assert_eq!(nearest[0].path, big.path);
    }
}

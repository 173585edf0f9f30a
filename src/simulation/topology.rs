//! Node records and the range predicate.
//!
//! Adjacency is never stored: every query recomputes it from positions,
//! online flags and the current range, so `neighbors` can never drift away
//! from `can_communicate`.

use std::collections::BTreeMap;

use super::geometry::within_range;
use super::types::{Node, NodeId, Point};
use crate::error::{MeshError, MeshResult};

/// Range used by an empty topology until one is set.
pub const DEFAULT_RANGE: f64 = 150.0;

/// The set of nodes plus a uniform communication range.
///
/// Nodes live in a `BTreeMap` so iteration (and therefore routing) is
/// ordered by node id and reproducible between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    nodes: BTreeMap<NodeId, Node>,
    range: f64,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            range: DEFAULT_RANGE,
        }
    }
}

impl Topology {
    /// An empty topology. The range is checked like `set_range`.
    pub fn new(range: f64) -> MeshResult<Self> {
        let mut topology = Self::default();
        topology.set_range(range)?;
        Ok(topology)
    }

    pub fn add_node(&mut self, id: NodeId, x: f64, y: f64, name: Option<String>) -> MeshResult<()> {
        self.insert_node(Node::new(id, Point::new(x, y), name))
    }

    /// Add a fully specified node record (online flag and battery included).
    pub fn insert_node(&mut self, node: Node) -> MeshResult<()> {
        if self.nodes.contains_key(&node.node_id) {
            return Err(MeshError::DuplicateId(node.node_id));
        }
        if !node.position.x.is_finite() || !node.position.y.is_finite() {
            return Err(MeshError::InvalidParameter(format!(
                "node {} position ({}, {}) is not finite",
                node.node_id, node.position.x, node.position.y
            )));
        }
        self.nodes.insert(node.node_id, node);
        Ok(())
    }

    pub fn set_range(&mut self, range: f64) -> MeshResult<()> {
        if !range.is_finite() || range < 0.0 {
            return Err(MeshError::InvalidParameter(format!("range must be non-negative, got {}", range)));
        }
        self.range = range;
        Ok(())
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    /// Flip a node's online flag. This is the only mutation a node sees after creation.
    pub fn set_online(&mut self, id: NodeId, online: bool) -> MeshResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(MeshError::UnknownNode(id))?;
        node.online = online;
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// All nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.nodes.values().filter(|n| n.online).count()
    }

    /// Whether `a` and `b` can exchange a frame directly.
    ///
    /// False for `a == b`, unknown ids, offline endpoints, or endpoints
    /// further apart than the range.
    pub fn can_communicate(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return false;
        }
        match (self.nodes.get(&a), self.nodes.get(&b)) {
            (Some(na), Some(nb)) => na.online && nb.online && within_range(&na.position, &nb.position, self.range),
            _ => false,
        }
    }

    /// Every node directly reachable from `a`, in ascending id order.
    pub fn neighbors(&self, a: NodeId) -> Vec<NodeId> {
        self.nodes.keys().copied().filter(|&b| self.can_communicate(a, b)).collect()
    }

    /// Currently adjacent pairs as `(low, high)`, each listed once.
    pub fn adjacent_pairs(&self) -> Vec<(NodeId, NodeId)> {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        let mut pairs = Vec::new();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                if self.can_communicate(a, b) {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    /// Share of all possible node pairs that are currently linked, in percent.
    pub fn connectivity_percent(&self) -> f64 {
        let n = self.nodes.len();
        if n < 2 {
            return 0.0;
        }
        let possible = n * (n - 1) / 2;
        self.adjacent_pairs().len() as f64 / possible as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_topology() -> Topology {
        let mut t = Topology::new(60.0).unwrap();
        t.add_node(0, 0.0, 0.0, None).unwrap();
        t.add_node(1, 50.0, 0.0, None).unwrap();
        t.add_node(2, 100.0, 0.0, None).unwrap();
        t
    }

    #[test]
    fn duplicate_ids_are_rejected_without_mutation() {
        let mut t = line_topology();
        let before = t.clone();
        assert_eq!(t.add_node(1, 999.0, 999.0, None), Err(MeshError::DuplicateId(1)));
        assert_eq!(t, before);
    }

    #[test]
    fn constructor_rejects_invalid_range() {
        assert!(matches!(Topology::new(-5.0), Err(MeshError::InvalidParameter(_))));
        assert!(matches!(Topology::new(f64::NAN), Err(MeshError::InvalidParameter(_))));
        assert!(matches!(Topology::new(f64::INFINITY), Err(MeshError::InvalidParameter(_))));
        assert_eq!(Topology::new(0.0).unwrap().range(), 0.0);
        assert_eq!(Topology::default().range(), DEFAULT_RANGE);
    }

    #[test]
    fn negative_range_is_rejected() {
        let mut t = line_topology();
        assert!(matches!(t.set_range(-1.0), Err(MeshError::InvalidParameter(_))));
        assert_eq!(t.range(), 60.0);
        t.set_range(0.0).unwrap();
        assert_eq!(t.range(), 0.0);
    }

    #[test]
    fn can_communicate_rules() {
        let mut t = line_topology();
        assert!(t.can_communicate(0, 1));
        assert!(!t.can_communicate(0, 2));
        assert!(!t.can_communicate(1, 1));
        assert!(!t.can_communicate(0, 42));
        t.set_online(1, false).unwrap();
        assert!(!t.can_communicate(0, 1));
        assert!(!t.can_communicate(1, 2));
    }

    #[test]
    fn can_communicate_is_symmetric() {
        let mut t = Topology::new(75.0).unwrap();
        let coords = [(0.0, 0.0), (40.0, 60.0), (75.0, 0.0), (120.0, 30.0), (200.0, 200.0)];
        for (i, (x, y)) in coords.iter().enumerate() {
            t.add_node(i as NodeId, *x, *y, None).unwrap();
        }
        t.set_online(3, false).unwrap();
        for a in 0..6 {
            for b in 0..6 {
                assert_eq!(t.can_communicate(a, b), t.can_communicate(b, a), "asymmetry for ({}, {})", a, b);
            }
        }
    }

    #[test]
    fn neighbors_follow_online_flag_and_range() {
        let mut t = line_topology();
        assert_eq!(t.neighbors(1), vec![0, 2]);
        t.set_online(2, false).unwrap();
        assert_eq!(t.neighbors(1), vec![0]);
        t.set_range(200.0).unwrap();
        t.set_online(2, true).unwrap();
        assert_eq!(t.neighbors(0), vec![1, 2]);
    }

    #[test]
    fn adjacent_pairs_and_connectivity() {
        let t = line_topology();
        assert_eq!(t.adjacent_pairs(), vec![(0, 1), (1, 2)]);
        assert!((t.connectivity_percent() - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(Topology::new(10.0).unwrap().connectivity_percent(), 0.0);
    }

    #[test]
    fn set_online_unknown_node() {
        let mut t = line_topology();
        assert_eq!(t.set_online(9, false), Err(MeshError::UnknownNode(9)));
    }
}

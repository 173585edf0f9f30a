//! Bounded-hop path discovery.
//!
//! Breadth-first search over the adjacency relation exposed by `Topology`,
//! one frontier layer per hop. The first time the destination is discovered
//! the path is the minimum-hop one, so the search stops right there.

use std::collections::{HashMap, HashSet};

use super::topology::Topology;
use super::types::NodeId;

/// Find a route from `source` to `destination` using at most `max_hops` hops.
///
/// Neighbours are expanded in ascending id order, so the result is
/// deterministic for a fixed topology.
///
/// # Parameters
///
/// * `topology` - Nodes, online flags and range
/// * `source` - Originating node
/// * `destination` - Target node
/// * `max_hops` - Number of BFS layers that may be explored
///
/// # Returns
///
/// `Some(path)` including both endpoints, with at most `max_hops + 1` nodes,
/// or `None` when no such path exists.
pub fn find_path(topology: &Topology, source: NodeId, destination: NodeId, max_hops: u32) -> Option<Vec<NodeId>> {
    if !topology.contains(source) || !topology.contains(destination) {
        return None;
    }
    if source == destination {
        return Some(vec![source]);
    }

    let mut visited: HashSet<NodeId> = HashSet::from([source]);
    let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
    let mut frontier = vec![source];

    for _layer in 0..max_hops {
        let mut next_frontier = Vec::new();
        for &current in &frontier {
            for neighbor in topology.neighbors(current) {
                if !visited.insert(neighbor) {
                    continue;
                }
                parent.insert(neighbor, current);
                if neighbor == destination {
                    return Some(reconstruct(&parent, source, destination));
                }
                next_frontier.push(neighbor);
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    None
}

fn reconstruct(parent: &HashMap<NodeId, NodeId>, source: NodeId, destination: NodeId) -> Vec<NodeId> {
    let mut path = vec![destination];
    let mut node = destination;
    while node != source {
        match parent.get(&node) {
            Some(&p) => {
                path.push(p);
                node = p;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

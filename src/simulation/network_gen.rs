//! Synthetic network generation.
//!
//! Nodes are laid out on a square grid whose side is `ceil(sqrt(n))`, each
//! position nudged by bounded random jitter and clamped into the bounding
//! box. The range is picked from a step table keyed by node count, so larger
//! networks get a shorter range and the link density stays roughly stable.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::geometry::clamp_point;
use super::topology::Topology;
use super::types::{NodeId, Point, default_node_name};
use crate::error::{MeshError, MeshResult};

/// Largest network the generator accepts.
pub const MAX_GENERATED_NODES: usize = 10_000;

/// How the per-axis jitter is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterDistribution {
    /// Uniform in `[-jitter, jitter]`.
    #[default]
    Uniform,
    /// Normal with sigma `jitter / 2`, truncated to `[-jitter, jitter]`.
    Normal,
}

/// One row of the range table: networks with at most `max_nodes` nodes use `range`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RangeStep {
    pub max_nodes: usize,
    pub range: f64,
}

/// Placement and range policy for `generate_grid_network`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GridPolicy {
    /// Distance between neighbouring grid cells.
    pub spacing: f64,
    /// Distance kept from every edge of the bounding box.
    pub margin: f64,
    /// Maximum per-axis offset from the grid position.
    pub jitter: f64,
    pub jitter_distribution: JitterDistribution,
    /// Width and height of the bounding box, anchored at the origin.
    pub bounds: [f64; 2],
    /// Steps in ascending `max_nodes` order.
    pub range_table: Vec<RangeStep>,
    /// Range for networks larger than every step.
    pub fallback_range: f64,
}

impl Default for GridPolicy {
    fn default() -> Self {
        Self {
            spacing: 60.0,
            margin: 50.0,
            jitter: 15.0,
            jitter_distribution: JitterDistribution::Uniform,
            bounds: [400.0, 350.0],
            range_table: vec![
                RangeStep { max_nodes: 10, range: 120.0 },
                RangeStep { max_nodes: 25, range: 100.0 },
                RangeStep { max_nodes: 50, range: 85.0 },
            ],
            fallback_range: 75.0,
        }
    }
}

impl GridPolicy {
    pub fn validate(&self) -> MeshResult<()> {
        let finite = [self.spacing, self.margin, self.jitter, self.bounds[0], self.bounds[1], self.fallback_range];
        if finite.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(MeshError::InvalidParameter("grid policy values must be finite and non-negative".to_string()));
        }
        if self.margin * 2.0 > self.bounds[0] || self.margin * 2.0 > self.bounds[1] {
            return Err(MeshError::InvalidParameter(format!(
                "margin {} does not fit inside bounds {:?}",
                self.margin, self.bounds
            )));
        }
        for pair in self.range_table.windows(2) {
            if pair[0].max_nodes >= pair[1].max_nodes {
                return Err(MeshError::InvalidParameter("range table must be sorted by ascending max-nodes".to_string()));
            }
        }
        if self.range_table.iter().any(|s| !s.range.is_finite() || s.range < 0.0) {
            return Err(MeshError::InvalidParameter("range table entries must be non-negative".to_string()));
        }
        Ok(())
    }

    /// Range for a network of `count` nodes.
    pub fn range_for(&self, count: usize) -> f64 {
        self.range_table
            .iter()
            .find(|step| count <= step.max_nodes)
            .map(|step| step.range)
            .unwrap_or(self.fallback_range)
    }

    fn sample_jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> MeshResult<f64> {
        if self.jitter == 0.0 {
            return Ok(0.0);
        }
        let offset = match self.jitter_distribution {
            JitterDistribution::Uniform => rng.gen_range(-self.jitter..=self.jitter),
            JitterDistribution::Normal => {
                let normal = Normal::new(0.0, self.jitter / 2.0).map_err(|e| MeshError::InvalidParameter(format!("jitter distribution: {}", e)))?;
                normal.sample(rng)
            }
        };
        Ok(offset.clamp(-self.jitter, self.jitter))
    }
}

/// Build a topology of `count` nodes (ids `0..count`) according to `policy`.
///
/// # Parameters
///
/// * `count` - Number of nodes, at least one
/// * `policy` - Grid spacing, jitter, bounds and range table
/// * `rng` - Source of jitter; pass a seeded RNG for reproducible layouts
///
/// # Returns
///
/// The new topology, or `InvalidParameter` for a zero or oversized count or
/// an inconsistent policy.
pub fn generate_grid_network<R: Rng + ?Sized>(count: usize, policy: &GridPolicy, rng: &mut R) -> MeshResult<Topology> {
    if count == 0 {
        return Err(MeshError::InvalidParameter("node count must be positive".to_string()));
    }
    if count > MAX_GENERATED_NODES {
        return Err(MeshError::InvalidParameter(format!("node count {} exceeds maximum of {}", count, MAX_GENERATED_NODES)));
    }
    policy.validate()?;

    let side = (count as f64).sqrt().ceil() as usize;
    let min = Point::new(policy.margin, policy.margin);
    let max = Point::new(policy.bounds[0] - policy.margin, policy.bounds[1] - policy.margin);

    let mut topology = Topology::new(policy.range_for(count))?;
    for i in 0..count {
        let row = i / side;
        let col = i % side;
        let base = Point::new(
            policy.margin + col as f64 * policy.spacing + policy.sample_jitter(rng)?,
            policy.margin + row as f64 * policy.spacing + policy.sample_jitter(rng)?,
        );
        let position = clamp_point(base, min, max);
        let id = i as NodeId;
        topology.add_node(id, position.x, position.y, Some(default_node_name(id)))?;
    }

    log::info!("Generated grid network with {} nodes (range {})", count, topology.range());
    Ok(topology)
}

/// The six-node demonstration network: a base station and five field devices.
pub fn sample_network() -> MeshResult<Topology> {
    let nodes: [(NodeId, f64, f64, &str); 6] = [
        (0, 100.0, 100.0, "Home Base"),
        (1, 200.0, 150.0, "Alice's Phone"),
        (2, 300.0, 120.0, "Bob's Device"),
        (3, 150.0, 250.0, "Car Radio"),
        (4, 350.0, 200.0, "Hiking Beacon"),
        (5, 250.0, 300.0, "Camp Site"),
    ];
    let mut topology = Topology::new(150.0)?;
    for (id, x, y, name) in nodes {
        topology.add_node(id, x, y, Some(name.to_string()))?;
    }
    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn range_table_steps() {
        let policy = GridPolicy::default();
        assert_eq!(policy.range_for(1), 120.0);
        assert_eq!(policy.range_for(10), 120.0);
        assert_eq!(policy.range_for(11), 100.0);
        assert_eq!(policy.range_for(50), 85.0);
        assert_eq!(policy.range_for(51), 75.0);
    }

    #[test]
    fn range_table_is_configurable() {
        let policy = GridPolicy {
            range_table: vec![RangeStep { max_nodes: 4, range: 500.0 }],
            fallback_range: 10.0,
            ..GridPolicy::default()
        };
        assert_eq!(policy.range_for(4), 500.0);
        assert_eq!(policy.range_for(5), 10.0);
    }

    #[test]
    fn zero_nodes_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(generate_grid_network(0, &GridPolicy::default(), &mut rng), Err(MeshError::InvalidParameter(_))));
    }

    #[test]
    fn positions_stay_inside_clamped_box() {
        let mut rng = StdRng::seed_from_u64(7);
        for distribution in [JitterDistribution::Uniform, JitterDistribution::Normal] {
            let policy = GridPolicy {
                jitter_distribution: distribution,
                ..GridPolicy::default()
            };
            let topo = generate_grid_network(100, &policy, &mut rng).unwrap();
            assert_eq!(topo.len(), 100);
            assert_eq!(topo.range(), 75.0);
            for node in topo.nodes() {
                assert!(node.position.x >= 50.0 && node.position.x <= 350.0);
                assert!(node.position.y >= 50.0 && node.position.y <= 300.0);
                assert!(node.online);
            }
        }
    }

    #[test]
    fn zero_jitter_gives_exact_grid() {
        let policy = GridPolicy {
            jitter: 0.0,
            ..GridPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let topo = generate_grid_network(4, &policy, &mut rng).unwrap();
        let positions: Vec<Point> = topo.nodes().map(|n| n.position).collect();
        assert_eq!(positions, vec![Point::new(50.0, 50.0), Point::new(110.0, 50.0), Point::new(50.0, 110.0), Point::new(110.0, 110.0)]);
        assert_eq!(topo.node(3).map(|n| n.name.as_str()), Some("Node 4"));
    }

    #[test]
    fn same_seed_same_layout() {
        let policy = GridPolicy::default();
        let a = generate_grid_network(25, &policy, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = generate_grid_network(25, &policy, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn inconsistent_policy_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let unsorted = GridPolicy {
            range_table: vec![RangeStep { max_nodes: 20, range: 100.0 }, RangeStep { max_nodes: 10, range: 120.0 }],
            ..GridPolicy::default()
        };
        assert!(generate_grid_network(5, &unsorted, &mut rng).is_err());
        let oversized_margin = GridPolicy {
            margin: 300.0,
            ..GridPolicy::default()
        };
        assert!(generate_grid_network(5, &oversized_margin, &mut rng).is_err());
    }

    #[test]
    fn sample_network_is_connected_from_home_base() {
        let topo = sample_network().unwrap();
        assert_eq!(topo.len(), 6);
        assert_eq!(topo.node(0).map(|n| n.name.as_str()), Some("Home Base"));
        assert!(crate::simulation::router::find_path(&topo, 0, 5, 3).is_some());
    }
}

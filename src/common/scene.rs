//! Scene loading, parsing, and validation logic.
//!
//! A scene is a JSON file describing a fixed network (node positions and the
//! shared range) plus an optional script of messages to submit. It is an
//! alternative to generating a grid network.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::error::MeshResult;
use crate::simulation::topology::Topology;
use crate::simulation::types::{DEFAULT_BATTERY, Node, NodeId, Point, default_node_name};

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

fn default_online() -> bool {
    true
}

/// Node entry of a scene file.
#[derive(Debug, Deserialize, Clone)]
pub struct SceneNode {
    pub node_id: NodeId,
    pub position: Point,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_online")]
    pub online: bool,
    #[serde(default)]
    pub battery: Option<u8>,
}

/// Scripted message of a scene file.
#[derive(Debug, Deserialize, Clone)]
pub struct SceneMessage {
    pub source: NodeId,
    pub destination: NodeId,
    pub text: String,
    /// Falls back to the configured default budget.
    #[serde(default)]
    pub hop_budget: Option<u32>,
    /// Tick after which the message is submitted; 0 submits before the first tick.
    #[serde(default)]
    pub submit_at_tick: u64,
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize, Clone)]
pub struct Scene {
    /// Communication range shared by every node.
    pub range: f64,
    pub nodes: Vec<SceneNode>,
    #[serde(default)]
    pub messages: Vec<SceneMessage>,
}

impl Scene {
    /// Build the topology described by this scene, adding nodes in file order.
    pub fn build_topology(&self) -> MeshResult<Topology> {
        let mut topology = Topology::new(self.range)?;
        for node in &self.nodes {
            topology.insert_node(Node {
                node_id: node.node_id,
                name: node.name.clone().unwrap_or_else(|| default_node_name(node.node_id)),
                position: node.position,
                online: node.online,
                battery: node.battery.unwrap_or(DEFAULT_BATTERY),
            })?;
        }
        Ok(topology)
    }
}

/// Parse and validate a scene from JSON text.
pub fn parse_scene(data: &str) -> Result<Scene, SceneLoadError> {
    let scene: Scene = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(format!("{:#}", e)))?;
    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;
    Ok(scene)
}

/// Load and parse a scene from a file.
///
/// # Parameters
///
/// * `path` - Path to the scene JSON file
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &str) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SceneLoadError::FileReadError(format!("{:#}", e)))?;
    let scene = parse_scene(&data)?;
    log::info!("Loaded scene {} with {} nodes and {} scripted messages", path, scene.nodes.len(), scene.messages.len());
    Ok(scene)
}

/// Validate a parsed scene.
///
/// Checks:
/// - At least one node and no more than `MAX_NODES`
/// - Unique node ids
/// - Finite, non-negative range and coordinates
/// - Scripted messages reference existing, distinct endpoints
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MAX_NODES: usize = 10000;

    if scene.nodes.is_empty() {
        return Err("Scene must contain at least one node".to_string());
    }
    if scene.nodes.len() > MAX_NODES {
        return Err(format!("Node count {} exceeds maximum of {}", scene.nodes.len(), MAX_NODES));
    }
    if !scene.range.is_finite() || scene.range < 0.0 {
        return Err(format!("Invalid range {}, must be non-negative", scene.range));
    }

    let mut node_ids = HashSet::new();
    for node in &scene.nodes {
        if !node_ids.insert(node.node_id) {
            return Err(format!("Duplicate node_id found: {}", node.node_id));
        }
        if !node.position.x.is_finite() || !node.position.y.is_finite() || node.position.x < 0.0 || node.position.y < 0.0 {
            return Err(format!(
                "Node {} position ({}, {}) must be finite and non-negative",
                node.node_id, node.position.x, node.position.y
            ));
        }
        if let Some(battery) = node.battery {
            if battery > 100 {
                return Err(format!("Node {} battery {} exceeds 100", node.node_id, battery));
            }
        }
    }

    for (idx, message) in scene.messages.iter().enumerate() {
        for endpoint in [message.source, message.destination] {
            if !node_ids.contains(&endpoint) {
                return Err(format!("Message {} references unknown node {}", idx, endpoint));
            }
        }
        if message.source == message.destination {
            return Err(format!("Message {} has the same source and destination {}", idx, message.source));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELAY_SCENE: &str = r#"{
        "range": 60.0,
        "nodes": [
            { "node_id": 0, "position": { "x": 0.0, "y": 0.0 }, "name": "Base" },
            { "node_id": 1, "position": { "x": 50.0, "y": 0.0 } },
            { "node_id": 2, "position": { "x": 100.0, "y": 0.0 }, "online": false, "battery": 40 }
        ],
        "messages": [
            { "source": 0, "destination": 2, "text": "hello", "hop_budget": 2 },
            { "source": 2, "destination": 0, "text": "later", "submit_at_tick": 5 }
        ]
    }"#;

    #[test]
    fn parses_and_builds_topology() {
        let scene = parse_scene(RELAY_SCENE).unwrap();
        assert_eq!(scene.messages.len(), 2);
        assert_eq!(scene.messages[1].hop_budget, None);
        assert_eq!(scene.messages[1].submit_at_tick, 5);

        let topo = scene.build_topology().unwrap();
        assert_eq!(topo.range(), 60.0);
        assert_eq!(topo.node(0).map(|n| n.name.as_str()), Some("Base"));
        assert_eq!(topo.node(1).map(|n| n.name.as_str()), Some("Node 2"));
        let offline = topo.node(2).unwrap();
        assert!(!offline.online);
        assert_eq!(offline.battery, 40);
        assert!(!topo.can_communicate(1, 2));
    }

    #[test]
    fn rejects_duplicates_and_bad_messages() {
        let dup = r#"{ "range": 10, "nodes": [
            { "node_id": 1, "position": { "x": 0, "y": 0 } },
            { "node_id": 1, "position": { "x": 5, "y": 0 } } ] }"#;
        assert!(matches!(parse_scene(dup), Err(SceneLoadError::ValidationError(_))));

        let bad_msg = r#"{ "range": 10, "nodes": [ { "node_id": 1, "position": { "x": 0, "y": 0 } } ],
            "messages": [ { "source": 1, "destination": 4, "text": "x" } ] }"#;
        assert!(matches!(parse_scene(bad_msg), Err(SceneLoadError::ValidationError(_))));

        let negative_range = r#"{ "range": -1, "nodes": [ { "node_id": 1, "position": { "x": 0, "y": 0 } } ] }"#;
        assert!(matches!(parse_scene(negative_range), Err(SceneLoadError::ValidationError(_))));
    }

    #[test]
    fn negative_hop_budget_fails_to_parse() {
        let scene = r#"{ "range": 10, "nodes": [
            { "node_id": 1, "position": { "x": 0, "y": 0 } },
            { "node_id": 2, "position": { "x": 5, "y": 0 } } ],
            "messages": [ { "source": 1, "destination": 2, "text": "x", "hop_budget": -1 } ] }"#;
        assert!(matches!(parse_scene(scene), Err(SceneLoadError::ParseError(_))));
    }

    #[test]
    fn missing_file_is_read_error() {
        assert!(matches!(load_scene("/nonexistent/scene.json"), Err(SceneLoadError::FileReadError(_))));
    }
}

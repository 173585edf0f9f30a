//! Type definitions for the simulation.
//!
//! Contains the data structures shared across the core:
//! - Node records and positions
//! - Messages and their status
//! - Simulated time
//! - Per-tick notifications and read-only snapshots for collaborators

use serde::{Deserialize, Serialize};

/// Node identifier, unique within a topology.
pub type NodeId = u32;

/// Message sequence number, unique per simulation run.
pub type MessageId = u64;

/// Battery level reported for freshly created nodes.
pub const DEFAULT_BATTERY: u8 = 100;

/// Hop budget used when a submission does not specify one.
pub const DEFAULT_HOP_BUDGET: u32 = 3;

/// Simple 2D point in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A simulated radio endpoint.
///
/// Only `online` changes after creation; the battery level is informational
/// and never consulted by routing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub node_id: NodeId,
    pub name: String,
    pub position: Point,
    pub online: bool,
    pub battery: u8,
}

impl Node {
    pub fn new(node_id: NodeId, position: Point, name: Option<String>) -> Self {
        Self {
            node_id,
            name: name.unwrap_or_else(|| default_node_name(node_id)),
            position,
            online: true,
            battery: DEFAULT_BATTERY,
        }
    }
}

/// Display name given to nodes created without an explicit one.
pub fn default_node_name(node_id: NodeId) -> String {
    format!("Node {}", node_id as u64 + 1)
}

/// Simulated time in microseconds since the last reset.
///
/// Integer ticks keep `fire_time <= now` comparisons exact no matter how many
/// steps have been accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_micros(micros: u64) -> Self {
        SimTime(micros)
    }

    pub const fn from_millis(millis: u64) -> Self {
        SimTime(millis * 1_000)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Saturating addition; simulated time never wraps.
    pub fn plus(self, delta: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(delta.0))
    }

    /// Elapsed time since `earlier`, or zero if `earlier` is in the future.
    pub fn since(self, earlier: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(earlier.0))
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}s", self.as_secs_f64())
    }
}

/// Lifecycle state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Transmitting,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            MessageStatus::Delivered | MessageStatus::Failed => true,
            MessageStatus::Pending | MessageStatus::Transmitting => false,
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Transmitting => "transmitting",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a message ended up failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Routing found no path within the hop budget.
    NoRoute,
    /// The link for the hop in flight disappeared before it completed.
    LinkLost { from: NodeId, to: NodeId },
}

/// A message relayed hop by hop through the mesh.
///
/// Collaborators only ever see clones of this record; all mutation goes
/// through the lifecycle methods driven by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub source: NodeId,
    pub destination: NodeId,
    pub text: String,
    pub hop_budget: u32,
    /// Nodes visited so far, starting with the source.
    pub path: Vec<NodeId>,
    /// Full route chosen by the router, empty until routing succeeds.
    pub planned_route: Vec<NodeId>,
    pub status: MessageStatus,
    pub submitted_at: SimTime,
    pub current_hop_start: SimTime,
    /// Time of delivery or failure.
    pub completed_at: Option<SimTime>,
    pub failure: Option<FailureReason>,
}

impl Message {
    pub fn new(id: MessageId, source: NodeId, destination: NodeId, text: String, hop_budget: u32, now: SimTime) -> Self {
        Self {
            id,
            source,
            destination,
            text,
            hop_budget,
            path: vec![source],
            planned_route: Vec::new(),
            status: MessageStatus::Pending,
            submitted_at: now,
            current_hop_start: now,
            completed_at: None,
            failure: None,
        }
    }

    /// Number of hops completed so far.
    pub fn hops_taken(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// The node the message currently sits at.
    pub fn current_node(&self) -> NodeId {
        *self.path.last().unwrap_or(&self.source)
    }

    /// The node the hop in flight is heading to, if any.
    pub fn next_hop(&self) -> Option<NodeId> {
        if self.status != MessageStatus::Transmitting {
            return None;
        }
        self.planned_route.get(self.path.len()).copied()
    }

    /// Submission-to-delivery latency, only for delivered messages.
    pub fn delivery_latency(&self) -> Option<SimTime> {
        match (self.status, self.completed_at) {
            (MessageStatus::Delivered, Some(done)) => Some(done.since(self.submitted_at)),
            _ => None,
        }
    }
}

/// A status change observed during one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub message_id: MessageId,
    pub previous: MessageStatus,
    pub current: MessageStatus,
    pub at: SimTime,
}

/// Aggregate figures derived from the current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationStats {
    pub total_nodes: usize,
    pub online_nodes: usize,
    pub direct_links: usize,
    pub connectivity_percent: f64,
    pub total_messages: usize,
    pub pending: usize,
    pub transmitting: usize,
    pub delivered: usize,
    pub failed: usize,
    pub queue_len: usize,
    pub average_hops: f64,
    pub average_delivery_secs: f64,
}

/// Owned copy of everything a display collaborator polls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSnapshot {
    pub now: SimTime,
    pub is_running: bool,
    pub range: f64,
    pub nodes: Vec<Node>,
    pub links: Vec<(NodeId, NodeId)>,
    pub messages: Vec<Message>,
    pub stats: SimulationStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_time_display_and_arithmetic() {
        let t = SimTime::from_millis(100).plus(SimTime::from_millis(200));
        assert_eq!(t.as_micros(), 300_000);
        assert_eq!(t.to_string(), "0.3s");
        assert_eq!(SimTime::ZERO.since(t), SimTime::ZERO);
    }

    #[test]
    fn new_message_starts_at_source() {
        let m = Message::new(0, 4, 9, "hi".into(), DEFAULT_HOP_BUDGET, SimTime::from_millis(300));
        assert_eq!(m.path, vec![4]);
        assert_eq!(m.status, MessageStatus::Pending);
        assert_eq!(m.current_node(), 4);
        assert_eq!(m.next_hop(), None);
        assert_eq!(m.hops_taken(), 0);
    }

    #[test]
    fn default_names_are_one_based() {
        assert_eq!(Node::new(0, Point::new(1.0, 2.0), None).name, "Node 1");
        assert_eq!(Node::new(5, Point::new(1.0, 2.0), Some("Camp Site".into())).name, "Camp Site");
    }
}

//! Mesh relay simulation core.
//!
//! This module provides the complete simulation engine for a radio mesh in
//! which messages are relayed hop by hop. It integrates:
//! - The connectivity model (flat-disk range, online flags)
//! - Bounded-hop path discovery
//! - A time-discrete scheduler firing hop-complete events
//! - The per-message lifecycle state machine
//!
//! ## Module Organization
//!
//! - `types`: Core data structures (nodes, messages, time, snapshots)
//! - `geometry`: Distance and range helpers
//! - `topology`: Node records and the range predicate
//! - `router`: Breadth-first path discovery with a hop cap
//! - `lifecycle`: Message state transitions
//! - `scheduler`: Clock, pending queue and event heap
//! - `engine`: The owned simulation context tying everything together
//! - `network_gen`: Synthetic grid networks and the demo network
//! - `driver`: Lock-guarded shared state and the paced driver task
//!
//! ## Public API
//!
//! Build a `Topology`, wrap it in a `Simulation`, submit messages and call
//! `tick`. For a paced background run, put the simulation into a
//! `SharedSimulation` and spawn `simulation_task` on an Embassy executor.

pub mod driver;
pub mod engine;
pub mod geometry;
pub mod lifecycle;
pub mod network_gen;
pub mod router;
pub mod scheduler;
pub mod topology;
pub mod types;

// Re-export the main entry points for convenience
pub use driver::{DriverSettings, SharedSimulation, SimulationCommand, SimulationRefresh, simulation_task};
pub use engine::{Simulation, SimulationConfig};
pub use network_gen::{GridPolicy, generate_grid_network, sample_network};
pub use router::find_path;
pub use topology::Topology;

// Re-export commonly used types
pub use types::{Message, MessageId, MessageStatus, Node, NodeId, Notification, Point, SimTime};

//! The simulation context.
//!
//! `Simulation` owns the topology, the scheduler and the message set of one
//! run. It is passed explicitly to whoever drives or inspects the run; there
//! is no process-wide state. Mutations are validated up front and either
//! apply completely or not at all.

use std::collections::BTreeMap;

use super::scheduler::Scheduler;
use super::topology::Topology;
use super::types::{
    DEFAULT_HOP_BUDGET, Message, MessageId, MessageStatus, Node, NodeId, Notification, SimTime, SimulationSnapshot, SimulationStats,
};
use crate::error::{MeshError, MeshResult};

/// Timing parameters of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    /// Simulated time added by every tick. Must be positive.
    pub time_step: SimTime,
    /// Time needed to cross one link.
    pub transmission_delay: SimTime,
    /// Budget used by `submit_default`.
    pub default_hop_budget: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: SimTime::from_millis(100),
            transmission_delay: SimTime::from_millis(100),
            default_hop_budget: DEFAULT_HOP_BUDGET,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> MeshResult<()> {
        if self.time_step == SimTime::ZERO {
            return Err(MeshError::InvalidParameter("time step must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Simulation {
    topology: Topology,
    scheduler: Scheduler,
    messages: BTreeMap<MessageId, Message>,
    next_message_id: MessageId,
    is_running: bool,
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(topology: Topology, config: SimulationConfig) -> MeshResult<Self> {
        config.validate()?;
        Ok(Self::assemble(topology, config))
    }

    /// A simulation with the default timing, which always validates.
    pub fn with_topology(topology: Topology) -> Self {
        Self::assemble(topology, SimulationConfig::default())
    }

    fn assemble(topology: Topology, config: SimulationConfig) -> Self {
        Self {
            topology,
            scheduler: Scheduler::new(config.time_step, config.transmission_delay),
            messages: BTreeMap::new(),
            next_message_id: 0,
            is_running: false,
            config,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Swap in a freshly generated network. Messages belong to the old
    /// network, so the run is reset as well.
    pub fn replace_topology(&mut self, topology: Topology) {
        self.topology = topology;
        self.reset();
    }

    pub fn add_node(&mut self, id: NodeId, x: f64, y: f64, name: Option<String>) -> MeshResult<()> {
        self.topology.add_node(id, x, y, name)
    }

    pub fn set_range(&mut self, range: f64) -> MeshResult<()> {
        self.topology.set_range(range)
    }

    /// Take a node off the air or bring it back. Takes effect for routing
    /// and hop completion from the next tick on.
    pub fn set_node_online(&mut self, id: NodeId, online: bool) -> MeshResult<()> {
        self.topology.set_online(id, online)?;
        log::info!("Node {} is now {}", id, if online { "online" } else { "offline" });
        Ok(())
    }

    pub fn set_time_step(&mut self, step: SimTime) -> MeshResult<()> {
        let config = SimulationConfig {
            time_step: step,
            ..self.config
        };
        config.validate()?;
        self.config = config;
        self.scheduler.set_time_step(step);
        Ok(())
    }

    /// Applies to hops scheduled after the change.
    pub fn set_transmission_delay(&mut self, delay: SimTime) {
        self.config.transmission_delay = delay;
        self.scheduler.set_transmission_delay(delay);
    }

    /// Queue a message for routing on the next tick.
    ///
    /// Rejects unknown endpoints and `source == destination` without
    /// touching any state.
    pub fn submit_message(&mut self, source: NodeId, destination: NodeId, text: impl Into<String>, hop_budget: u32) -> MeshResult<MessageId> {
        if !self.topology.contains(source) {
            return Err(MeshError::UnknownNode(source));
        }
        if !self.topology.contains(destination) {
            return Err(MeshError::UnknownNode(destination));
        }
        if source == destination {
            return Err(MeshError::InvalidParameter(format!("source and destination are both {}", source)));
        }

        let id = self.next_message_id;
        self.next_message_id += 1;
        let text = text.into();
        log::info!("Message {} queued: {:?} from {} to {} (hop budget {})", id, text, source, destination, hop_budget);
        self.messages.insert(id, Message::new(id, source, destination, text, hop_budget, self.scheduler.now()));
        self.scheduler.enqueue(id);
        Ok(id)
    }

    /// `submit_message` with the configured default hop budget.
    pub fn submit_default(&mut self, source: NodeId, destination: NodeId, text: impl Into<String>) -> MeshResult<MessageId> {
        let budget = self.config.default_hop_budget;
        self.submit_message(source, destination, text, budget)
    }

    /// Advance one time step and report every status change.
    pub fn tick(&mut self) -> Vec<Notification> {
        self.scheduler.tick(&self.topology, &mut self.messages)
    }

    /// Run `ticks` steps back to back, collecting all notifications.
    pub fn run_ticks(&mut self, ticks: usize) -> Vec<Notification> {
        let mut all = Vec::new();
        for _ in 0..ticks {
            all.extend(self.tick());
        }
        all
    }

    /// Stop, zero the clock and forget every message and scheduled event.
    /// The topology is kept.
    pub fn reset(&mut self) {
        self.is_running = false;
        self.scheduler.reset();
        self.messages.clear();
        self.next_message_id = 0;
        log::info!("Simulation reset");
    }

    pub fn start(&mut self) {
        if !self.is_running {
            self.is_running = true;
            log::info!("Simulation started at {}", self.now());
        }
    }

    /// Idempotent; leaves every message in its last state.
    pub fn stop(&mut self) {
        if self.is_running {
            self.is_running = false;
            log::info!("Simulation stopped at {}", self.now());
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.topology.nodes().cloned().collect()
    }

    pub fn links(&self) -> Vec<(NodeId, NodeId)> {
        self.topology.adjacent_pairs()
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(&id)
    }

    /// All messages in submission order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    /// `true` once no message is pending or in flight.
    pub fn is_idle(&self) -> bool {
        self.messages.values().all(|m| m.status.is_terminal())
    }

    pub fn stats(&self) -> SimulationStats {
        let count = |status: MessageStatus| self.messages.values().filter(|m| m.status == status).count();
        let delivered: Vec<&Message> = self.messages.values().filter(|m| m.status == MessageStatus::Delivered).collect();

        let (average_hops, average_delivery_secs) = if delivered.is_empty() {
            (0.0, 0.0)
        } else {
            let n = delivered.len() as f64;
            let hops: usize = delivered.iter().map(|m| m.hops_taken()).sum();
            let secs: f64 = delivered.iter().filter_map(|m| m.delivery_latency()).map(|t| t.as_secs_f64()).sum();
            (hops as f64 / n, secs / n)
        };

        SimulationStats {
            total_nodes: self.topology.len(),
            online_nodes: self.topology.online_count(),
            direct_links: self.topology.adjacent_pairs().len(),
            connectivity_percent: self.topology.connectivity_percent(),
            total_messages: self.messages.len(),
            pending: count(MessageStatus::Pending),
            transmitting: count(MessageStatus::Transmitting),
            delivered: count(MessageStatus::Delivered),
            failed: count(MessageStatus::Failed),
            queue_len: self.scheduler.pending_len(),
            average_hops,
            average_delivery_secs,
        }
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            now: self.now(),
            is_running: self.is_running,
            range: self.topology.range(),
            nodes: self.nodes(),
            links: self.links(),
            messages: self.messages.values().cloned().collect(),
            stats: self.stats(),
        }
    }
}

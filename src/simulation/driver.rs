//! Simulation driver and the shared-state contract.
//!
//! The driver task is the only thing that advances time. It owns nothing
//! itself: the `Simulation` lives inside `SharedSimulation`, a lock-guarded
//! cell, and every tick runs entirely inside one lock. Readers take the same
//! lock (or grab an owned snapshot), so they observe either the state before
//! a tick or the state after it, never something in between.
//!
//! Control flow per loop iteration:
//! 1) `select` waits for either the next command or the next tick deadline.
//! 2) Commands (start, stop, reset, submit, node on/off, snapshot, shutdown)
//!    are applied immediately and answered on the refresh channel.
//! 3) At the deadline, if running, one tick is executed and its status
//!    changes are published. The deadline then moves by the pacing interval,
//!    which is unrelated to the simulated `time_step`.

use core::cell::RefCell;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant, Timer};

use super::engine::Simulation;
use super::types::{MessageId, NodeId, Notification, SimTime, SimulationSnapshot};
use crate::error::MeshResult;

/// Depth of the command channel (collaborators → driver).
pub const COMMAND_QUEUE_SIZE: usize = 32;
/// Bounded channel carrying control commands to the driver.
pub type CommandQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, SimulationCommand, COMMAND_QUEUE_SIZE>;
/// Sender side of the command channel.
pub type CommandQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SimulationCommand, COMMAND_QUEUE_SIZE>;
/// Receiver side of the command channel.
pub type CommandQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SimulationCommand, COMMAND_QUEUE_SIZE>;

/// Depth of the refresh channel (driver → collaborators). Clock-only ticks,
/// submission replies and alerts are dropped when it is full; status changes
/// wait for room.
pub const REFRESH_QUEUE_SIZE: usize = 100;
/// Bounded channel carrying state updates out of the driver.
pub type RefreshQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, SimulationRefresh, REFRESH_QUEUE_SIZE>;
/// Sender side of the refresh channel.
pub type RefreshQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SimulationRefresh, REFRESH_QUEUE_SIZE>;
/// Receiver side of the refresh channel.
pub type RefreshQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SimulationRefresh, REFRESH_QUEUE_SIZE>;

/// Control requests accepted by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationCommand {
    Start,
    Stop,
    Reset,
    Submit {
        source: NodeId,
        destination: NodeId,
        text: String,
        /// `None` uses the configured default budget.
        hop_budget: Option<u32>,
    },
    SetNodeOnline {
        node: NodeId,
        online: bool,
    },
    RequestSnapshot,
    Shutdown,
}

/// Updates published by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationRefresh {
    /// A command was rejected or the driver hit a limit.
    Alert(String),
    RunningChanged(bool),
    Submitted(MessageId),
    Ticked {
        now: SimTime,
        notifications: Vec<Notification>,
    },
    Snapshot(Box<SimulationSnapshot>),
    Reset,
    ShutDown,
}

/// Lock-guarded owner of the simulation state.
pub struct SharedSimulation {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Simulation>>,
}

impl SharedSimulation {
    pub fn new(simulation: Simulation) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(simulation)),
        }
    }

    /// Run `f` against a consistent view of the state.
    pub fn with<R>(&self, f: impl FnOnce(&Simulation) -> R) -> R {
        self.inner.lock(|cell| f(&cell.borrow()))
    }

    /// Run `f` with exclusive access. `f` must not call back into `self`.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Simulation) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        self.with(|sim| sim.snapshot())
    }

    pub fn submit_message(&self, source: NodeId, destination: NodeId, text: impl Into<String>, hop_budget: u32) -> MeshResult<MessageId> {
        self.with_mut(|sim| sim.submit_message(source, destination, text, hop_budget))
    }

    pub fn tick(&self) -> Vec<Notification> {
        self.with_mut(|sim| sim.tick())
    }

    pub fn is_running(&self) -> bool {
        self.with(|sim| sim.is_running())
    }
}

/// Pacing and limits for the driver loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverSettings {
    /// Wall-clock delay between ticks.
    pub tick_interval: Duration,
    /// Stop automatically after this many ticks since the last reset.
    pub max_ticks: Option<u64>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            max_ticks: None,
        }
    }
}

/// Whether the driver loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverAction {
    Continue,
    Shutdown,
}

/// Command handling and tick pacing, independent of the executor.
pub struct Driver<'a> {
    shared: &'a SharedSimulation,
    settings: DriverSettings,
    ticks_run: u64,
}

impl<'a> Driver<'a> {
    pub fn new(shared: &'a SharedSimulation, settings: DriverSettings) -> Self {
        Self {
            shared,
            settings,
            ticks_run: 0,
        }
    }

    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }

    /// Apply one command and return the updates to publish.
    pub fn handle_command(&mut self, command: SimulationCommand) -> (DriverAction, Vec<SimulationRefresh>) {
        let mut out = Vec::new();
        match command {
            SimulationCommand::Start => {
                let changed = self.shared.with_mut(|sim| {
                    let was = sim.is_running();
                    sim.start();
                    !was
                });
                if changed {
                    out.push(SimulationRefresh::RunningChanged(true));
                }
            }
            SimulationCommand::Stop => {
                let changed = self.shared.with_mut(|sim| {
                    let was = sim.is_running();
                    sim.stop();
                    was
                });
                if changed {
                    out.push(SimulationRefresh::RunningChanged(false));
                }
            }
            SimulationCommand::Reset => {
                let was_running = self.shared.with_mut(|sim| {
                    let was = sim.is_running();
                    sim.reset();
                    was
                });
                self.ticks_run = 0;
                if was_running {
                    out.push(SimulationRefresh::RunningChanged(false));
                }
                out.push(SimulationRefresh::Reset);
            }
            SimulationCommand::Submit {
                source,
                destination,
                text,
                hop_budget,
            } => {
                let result = self.shared.with_mut(|sim| {
                    let budget = hop_budget.unwrap_or(sim.config().default_hop_budget);
                    sim.submit_message(source, destination, text, budget)
                });
                match result {
                    Ok(id) => out.push(SimulationRefresh::Submitted(id)),
                    Err(err) => {
                        log::warn!("Submission rejected: {}", err);
                        out.push(SimulationRefresh::Alert(format!("Submission rejected: {}", err)));
                    }
                }
            }
            SimulationCommand::SetNodeOnline { node, online } => {
                if let Err(err) = self.shared.with_mut(|sim| sim.set_node_online(node, online)) {
                    out.push(SimulationRefresh::Alert(err.to_string()));
                }
            }
            SimulationCommand::RequestSnapshot => {
                out.push(SimulationRefresh::Snapshot(Box::new(self.shared.snapshot())));
            }
            SimulationCommand::Shutdown => {
                self.shared.with_mut(|sim| sim.stop());
                log::info!("Driver shutting down after {} ticks", self.ticks_run);
                out.push(SimulationRefresh::ShutDown);
                return (DriverAction::Shutdown, out);
            }
        }
        (DriverAction::Continue, out)
    }

    /// Called at every pacing deadline. Ticks once if running.
    pub fn on_deadline(&mut self) -> Vec<SimulationRefresh> {
        let mut out = Vec::new();
        let ticked = self.shared.with_mut(|sim| {
            if !sim.is_running() {
                return None;
            }
            let notifications = sim.tick();
            Some((sim.now(), notifications))
        });

        let Some((now, notifications)) = ticked else {
            return out;
        };
        self.ticks_run += 1;
        out.push(SimulationRefresh::Ticked { now, notifications });

        if let Some(limit) = self.settings.max_ticks {
            if self.ticks_run >= limit {
                self.shared.with_mut(|sim| sim.stop());
                log::warn!("Tick limit of {} reached, stopping", limit);
                out.push(SimulationRefresh::RunningChanged(false));
                out.push(SimulationRefresh::Alert(format!("Tick limit of {} reached", limit)));
            }
        }
        out
    }
}

/// Refreshes dropped rather than awaited when the refresh channel is full.
///
/// Submission replies and alerts come one per command; awaiting them would
/// let a client blocked on a full command channel stall the driver.
fn is_droppable(refresh: &SimulationRefresh) -> bool {
    match refresh {
        SimulationRefresh::Ticked { notifications, .. } => notifications.is_empty(),
        SimulationRefresh::Submitted(_) | SimulationRefresh::Alert(_) => true,
        SimulationRefresh::RunningChanged(_) | SimulationRefresh::Snapshot(_) | SimulationRefresh::Reset | SimulationRefresh::ShutDown => false,
    }
}

async fn publish(refresh_tx: &RefreshQueueSender, refreshes: Vec<SimulationRefresh>) {
    for refresh in refreshes {
        if is_droppable(&refresh) {
            if refresh_tx.try_send(refresh).is_err() {
                log::debug!("Refresh channel full, dropping reply");
            }
        } else {
            refresh_tx.send(refresh).await;
        }
    }
}

/// Driver loop. Runs until a `Shutdown` command arrives.
#[embassy_executor::task]
pub async fn simulation_task(
    shared: &'static SharedSimulation,
    settings: DriverSettings,
    command_rx: CommandQueueReceiver,
    refresh_tx: RefreshQueueSender,
) {
    log::info!("Simulation driver started (tick interval {} ms)", settings.tick_interval.as_millis());
    let mut driver = Driver::new(shared, settings);
    let mut next_tick = Instant::now() + settings.tick_interval;

    loop {
        match select(command_rx.receive(), Timer::at(next_tick)).await {
            Either::First(command) => {
                let (action, refreshes) = driver.handle_command(command);
                publish(&refresh_tx, refreshes).await;
                if action == DriverAction::Shutdown {
                    break;
                }
            }
            Either::Second(()) => {
                let refreshes = driver.on_deadline();
                publish(&refresh_tx, refreshes).await;
                next_tick += settings.tick_interval;
                // Falling behind skips missed deadlines instead of bursting.
                let now = Instant::now();
                if next_tick < now {
                    next_tick = now + settings.tick_interval;
                }
            }
        }
    }
}

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use embassy_executor::{Executor, Spawner};
use embassy_sync::channel::TrySendError;
use env_logger::Builder;
use log::{LevelFilter, debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::path::Path;
use std::thread;
use std::time::Duration;

use mesh_relay_sim::common::scene::{SceneMessage, load_scene};
use mesh_relay_sim::config::SimulatorConfig;
use mesh_relay_sim::simulation::driver::{
    CommandQueue, CommandQueueReceiver, CommandQueueSender, DriverSettings, RefreshQueue, RefreshQueueReceiver, RefreshQueueSender,
};
use mesh_relay_sim::simulation::types::{SimulationSnapshot, SimulationStats};
use mesh_relay_sim::simulation::{
    SharedSimulation, Simulation, SimulationCommand, SimulationRefresh, Topology, generate_grid_network, sample_network,
    simulation_task,
};

const REFRESH_POLL_INTERVAL: Duration = Duration::from_millis(5);
const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

const USAGE: &str = "usage: mesh-relay-sim [SCENE.json] [--sample] [--config PATH] [--report PATH]";

#[derive(Debug, Default)]
struct CliArgs {
    scene: Option<String>,
    config: Option<String>,
    report: Option<String>,
    sample: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => cli.config = Some(args.next().ok_or_else(|| anyhow!("--config needs a path\n{}", USAGE))?),
            "--report" => cli.report = Some(args.next().ok_or_else(|| anyhow!("--report needs a path\n{}", USAGE))?),
            "--sample" => cli.sample = true,
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            _ if cli.scene.is_none() => cli.scene = Some(arg),
            _ => bail!("more than one scene given\n{}", USAGE),
        }
    }
    if cli.sample && cli.scene.is_some() {
        bail!("--sample cannot be combined with a scene file");
    }
    Ok(cli)
}

/// Final state written with `--report`.
#[derive(Serialize)]
struct RunReport {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    network: String,
    seed: Option<u64>,
    stats: SimulationStats,
    snapshot: SimulationSnapshot,
}

fn embassy_init(
    spawner: Spawner,
    shared: &'static SharedSimulation,
    settings: DriverSettings,
    command_rx: CommandQueueReceiver,
    refresh_tx: RefreshQueueSender,
) {
    let _ = spawner.spawn(simulation_task(shared, settings, command_rx, refresh_tx));
}

/// Queue a control command without ever blocking on the driver. While the
/// command channel is full the pending refreshes are drained and logged.
fn send_command(command_tx: &CommandQueueSender, refresh_rx: &RefreshQueueReceiver, command: SimulationCommand) {
    let mut command = command;
    loop {
        match command_tx.try_send(command) {
            Ok(()) => return,
            Err(TrySendError::Full(returned)) => {
                command = returned;
                while let Ok(refresh) = refresh_rx.try_receive() {
                    debug!("Drained while queueing a command: {:?}", refresh);
                }
                thread::sleep(REFRESH_POLL_INTERVAL);
            }
        }
    }
}

/// Submit a scripted message straight through the shared state.
fn submit(shared: &SharedSimulation, default_hop_budget: u32, message: &SceneMessage) {
    let budget = message.hop_budget.unwrap_or(default_hop_budget);
    if let Err(err) = shared.submit_message(message.source, message.destination, message.text.clone(), budget) {
        warn!("Scripted message {} -> {} rejected: {}", message.source, message.destination, err);
    }
}

fn main() -> Result<()> {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("mesh_relay_sim"), LevelFilter::Debug)
        .init();

    info!("Starting up");
    let started_at = Utc::now();
    let cli = parse_args(std::env::args().skip(1))?;

    let config = match (&cli.config, &cli.scene) {
        (Some(path), _) => SimulatorConfig::load(Path::new(path)),
        (None, Some(scene)) => SimulatorConfig::load_or_default(&SimulatorConfig::config_path_from_scene(scene)),
        (None, None) => SimulatorConfig::load_or_default(Path::new("config.toml")),
    }
    .map_err(|e| anyhow!(e))?;

    let (topology, mut script, network): (Topology, Vec<SceneMessage>, String) = if let Some(path) = &cli.scene {
        let scene = load_scene(path).with_context(|| format!("Failed to load scene {}", path))?;
        let topology = scene.build_topology().context("Scene does not form a valid topology")?;
        (topology, scene.messages, path.clone())
    } else {
        let topology = if cli.sample {
            sample_network()?
        } else {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            generate_grid_network(config.node_count, &config.grid, &mut rng)?
        };
        let network = if cli.sample { "sample" } else { "grid" }.to_string();
        (topology, Vec::new(), network)
    };

    if script.is_empty() {
        // Demo traffic across the whole network.
        let first = topology.nodes().next().map(|n| n.node_id);
        let last = topology.nodes().last().map(|n| n.node_id);
        if let (Some(source), Some(destination)) = (first, last) {
            if source != destination {
                script.push(SceneMessage {
                    source,
                    destination,
                    text: "Hello across the mesh".to_string(),
                    hop_budget: None,
                    submit_at_tick: 0,
                });
            }
        }
    }
    script.sort_by_key(|m| m.submit_at_tick);

    info!(
        "Network '{}': {} nodes, range {:.1}, {} direct links",
        network,
        topology.len(),
        topology.range(),
        topology.adjacent_pairs().len()
    );

    let time_step_micros = config.simulation_config().time_step.as_micros();
    let simulation = Simulation::new(topology, config.simulation_config())?;
    let shared: &'static SharedSimulation = Box::leak(Box::new(SharedSimulation::new(simulation)));
    let command_channel: &'static CommandQueue = Box::leak(Box::new(CommandQueue::new()));
    let refresh_channel: &'static RefreshQueue = Box::leak(Box::new(RefreshQueue::new()));

    let command_tx = command_channel.sender();
    let command_rx = command_channel.receiver();
    let refresh_tx = refresh_channel.sender();
    let refresh_rx = refresh_channel.receiver();
    let settings = config.driver_settings();

    // Spawn Embassy executor on a dedicated background thread
    thread::Builder::new()
        .name("embassy-executor".to_string())
        .spawn(move || {
            // Leak the executor to satisfy the 'static lifetime required by run()
            let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
            executor.run(|spawner| embassy_init(spawner, shared, settings, command_rx, refresh_tx));
        })
        .context("failed to spawn embassy thread")?;

    let default_hop_budget = config.default_hop_budget;
    let mut script = script.into_iter().peekable();
    while let Some(message) = script.next_if(|m| m.submit_at_tick == 0) {
        submit(shared, default_hop_budget, &message);
    }
    send_command(&command_tx, &refresh_rx, SimulationCommand::Start);

    let mut driver_gone = false;
    loop {
        let Ok(refresh) = refresh_rx.try_receive() else {
            let current_tick = shared.with(|sim| sim.now()).as_micros() / time_step_micros;
            while let Some(message) = script.next_if(|m| m.submit_at_tick <= current_tick) {
                submit(shared, default_hop_budget, &message);
            }
            if script.peek().is_none() && shared.with(|sim| sim.is_idle()) {
                info!("All messages settled");
                break;
            }
            thread::sleep(REFRESH_POLL_INTERVAL);
            continue;
        };

        match refresh {
            SimulationRefresh::Ticked { now, notifications } => {
                for n in notifications {
                    info!("[{}] message {}: {} -> {}", n.at, n.message_id, n.previous, n.current);
                }
                debug!("Tick at {}", now);
            }
            SimulationRefresh::Submitted(id) => debug!("Message {} accepted", id),
            SimulationRefresh::Alert(alert) => warn!("{}", alert),
            SimulationRefresh::RunningChanged(true) => info!("Simulation running"),
            SimulationRefresh::RunningChanged(false) => {
                info!("Simulation stopped");
                break;
            }
            SimulationRefresh::ShutDown => {
                driver_gone = true;
                break;
            }
            SimulationRefresh::Snapshot(_) | SimulationRefresh::Reset => {}
        }
    }

    if !driver_gone {
        send_command(&command_tx, &refresh_rx, SimulationCommand::Shutdown);
        let deadline = std::time::Instant::now() + SHUTDOWN_WAIT;
        while std::time::Instant::now() < deadline {
            if let Ok(SimulationRefresh::ShutDown) = refresh_rx.try_receive() {
                driver_gone = true;
                break;
            }
            thread::sleep(REFRESH_POLL_INTERVAL);
        }
        if !driver_gone {
            warn!("Driver did not confirm shutdown");
        }
    }

    let snapshot = shared.snapshot();
    let stats = snapshot.stats.clone();
    info!(
        "Finished at {}: {} delivered, {} failed, {} in flight, average {:.2} hops, average latency {:.2}s",
        snapshot.now,
        stats.delivered,
        stats.failed,
        stats.pending + stats.transmitting,
        stats.average_hops,
        stats.average_delivery_secs
    );

    if let Some(path) = &cli.report {
        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            network,
            seed: config.seed,
            stats,
            snapshot,
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise run report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report {}", path))?;
        info!("Report written to {}", path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_scene_and_flags() {
        let cli = parse_args(args(&["scene.json", "--report", "out.json"])).unwrap();
        assert_eq!(cli.scene.as_deref(), Some("scene.json"));
        assert_eq!(cli.report.as_deref(), Some("out.json"));
        assert!(!cli.sample);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(args(&["--report"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
        assert!(parse_args(args(&["a.json", "b.json"])).is_err());
        assert!(parse_args(args(&["a.json", "--sample"])).is_err());
    }
}

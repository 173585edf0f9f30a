//! Configuration loading for the simulator binary.
//!
//! Every key is optional; missing keys take the defaults below. The file
//! lives next to a scene as `config.toml`, or is passed explicitly.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{MeshError, MeshResult};
use crate::simulation::driver::DriverSettings;
use crate::simulation::engine::SimulationConfig;
use crate::simulation::network_gen::GridPolicy;
use crate::simulation::types::{DEFAULT_HOP_BUDGET, SimTime};

/// Run settings read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SimulatorConfig {
    /// Simulated milliseconds per tick
    pub time_step_ms: u64,
    /// Simulated milliseconds to cross one link
    pub transmission_delay_ms: u64,
    /// Wall-clock milliseconds between driver ticks
    pub tick_interval_ms: u64,
    pub default_hop_budget: u32,
    /// Nodes to generate when no scene is given
    pub node_count: usize,
    /// Seed for grid generation; entropy when absent
    pub seed: Option<u64>,
    /// Driver stops itself after this many ticks
    pub max_ticks: Option<u64>,
    pub grid: GridPolicy,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            time_step_ms: 100,
            transmission_delay_ms: 100,
            tick_interval_ms: 10,
            default_hop_budget: DEFAULT_HOP_BUDGET,
            node_count: 10,
            seed: None,
            max_ticks: Some(10_000),
            grid: GridPolicy::default(),
        }
    }
}

impl SimulatorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `config_path` - Path to the config.toml file
    ///
    /// # Returns
    /// * `Ok(SimulatorConfig)` if the file was loaded, parsed and validated
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| format!("Failed to parse config file: {}", e))?;
        config.validate().map_err(|e| format!("Invalid config: {}", e))?;
        Ok(config)
    }

    /// Load `config_path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(config_path: &Path) -> Result<Self, String> {
        if config_path.exists() {
            log::info!("Loading config from {}", config_path.display());
            Self::load(config_path)
        } else {
            log::debug!("No config at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Derive the config path from a scene file path.
    ///
    /// Replaces the scene filename with "config.toml" in the same directory.
    pub fn config_path_from_scene(scene_path: &str) -> PathBuf {
        let scene = Path::new(scene_path);
        scene.parent().unwrap_or(Path::new(".")).join("config.toml")
    }

    pub fn validate(&self) -> MeshResult<()> {
        if self.time_step_ms == 0 {
            return Err(MeshError::InvalidParameter("time-step-ms must be positive".to_string()));
        }
        if self.tick_interval_ms == 0 {
            return Err(MeshError::InvalidParameter("tick-interval-ms must be positive".to_string()));
        }
        if self.node_count == 0 {
            return Err(MeshError::InvalidParameter("node-count must be positive".to_string()));
        }
        self.grid.validate()
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            time_step: SimTime::from_millis(self.time_step_ms),
            transmission_delay: SimTime::from_millis(self.transmission_delay_ms),
            default_hop_budget: self.default_hop_budget,
        }
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            tick_interval: embassy_time::Duration::from_millis(self.tick_interval_ms),
            max_ticks: self.max_ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = SimulatorConfig::parse("").unwrap();
        assert_eq!(config, SimulatorConfig::default());
        let sim = config.simulation_config();
        assert_eq!(sim.time_step, SimTime::from_millis(100));
        assert_eq!(sim.default_hop_budget, 3);
    }

    #[test]
    fn kebab_case_keys_override_defaults() {
        let config = SimulatorConfig::parse(
            r#"
            time-step-ms = 50
            transmission-delay-ms = 200
            default-hop-budget = 5
            seed = 7
            max-ticks = 20

            [grid]
            spacing = 80.0
            "#,
        )
        .unwrap();
        assert_eq!(config.time_step_ms, 50);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.grid.spacing, 80.0);
        assert_eq!(config.driver_settings().max_ticks, Some(20));
        assert_eq!(config.simulation_config().transmission_delay, SimTime::from_millis(200));
    }

    #[test]
    fn zero_time_step_is_rejected() {
        assert!(SimulatorConfig::parse("time-step-ms = 0").is_err());
        assert!(SimulatorConfig::parse("node-count = 0").is_err());
        assert!(SimulatorConfig::parse("unknown = [").is_err());
    }

    #[test]
    fn config_path_sits_next_to_scene() {
        assert_eq!(
            SimulatorConfig::config_path_from_scene("scenes/relay.json"),
            PathBuf::from("scenes/config.toml")
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = SimulatorConfig::load_or_default(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config, SimulatorConfig::default());
    }
}

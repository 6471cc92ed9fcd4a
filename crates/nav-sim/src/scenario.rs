//! YAML scenario files.

use std::path::Path;

use anyhow::{Context, Result};
use nav_batch::SchedulerConfig;
use serde::{Deserialize, Serialize};

/// A simulation run: scheduler settings plus the wandering crowd that drives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub scheduler: SchedulerConfig,

    /// Number of wandering agents
    #[serde(default = "default_agents")]
    pub agents: usize,

    /// Simulation ticks to run
    #[serde(default = "default_ticks")]
    pub ticks: u32,

    /// Simulated seconds per tick
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: f64,

    /// How far (world units) an agent picks its next goal
    #[serde(default = "default_wander_radius")]
    pub wander_radius: f32,

    /// Agent speed in world units per second
    #[serde(default = "default_agent_speed")]
    pub agent_speed: f32,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Discs painted onto the grid before agents spawn
    #[serde(default)]
    pub obstacles: Vec<ObstacleDisc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleDisc {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    #[serde(default)]
    pub walkable: bool,
}

fn default_agents() -> usize {
    100
}
fn default_ticks() -> u32 {
    600
}
fn default_tick_seconds() -> f64 {
    1.0 / 60.0
}
fn default_wander_radius() -> f32 {
    20.0
}
fn default_agent_speed() -> f32 {
    3.0
}
fn default_seed() -> u64 {
    42
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            agents: default_agents(),
            ticks: default_ticks(),
            tick_seconds: default_tick_seconds(),
            wander_radius: default_wander_radius(),
            agent_speed: default_agent_speed(),
            seed: default_seed(),
            obstacles: vec![
                ObstacleDisc {
                    x: 50.0,
                    y: 50.0,
                    radius: 8.0,
                    walkable: false,
                },
                ObstacleDisc {
                    x: 25.0,
                    y: 70.0,
                    radius: 5.0,
                    walkable: false,
                },
            ],
        }
    }
}

impl Scenario {
    /// Load a scenario from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario from {}", path.display()))?;
        let scenario = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse scenario from {}", path.display()))?;
        Ok(scenario)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let scenario: Self = serde_yaml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler
            .validate()
            .context("Invalid scheduler section")?;
        if !(self.tick_seconds.is_finite() && self.tick_seconds > 0.0) {
            anyhow::bail!("tick_seconds must be finite and > 0");
        }
        if !(self.agent_speed.is_finite() && self.agent_speed >= 0.0) {
            anyhow::bail!("agent_speed must be finite and >= 0");
        }
        if !(self.wander_radius.is_finite() && self.wander_radius > 0.0) {
            anyhow::bail!("wander_radius must be finite and > 0");
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize scenario")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scenario_round_trips_through_yaml() {
        let scenario = Scenario::default();
        let yaml = scenario.to_yaml().unwrap();
        assert_eq!(Scenario::from_yaml(&yaml).unwrap(), scenario);
    }

    #[test]
    fn partial_scenario_uses_defaults() {
        let scenario = Scenario::from_yaml(
            "agents: 12\nscheduler:\n  grid_width: 40\n  grid_height: 40\nobstacles:\n  - { x: 5.0, y: 5.0, radius: 2.0 }\n",
        )
        .unwrap();
        assert_eq!(scenario.agents, 12);
        assert_eq!(scenario.ticks, 600);
        assert_eq!(scenario.scheduler.grid_width, 40);
        assert_eq!(scenario.scheduler.batch_size, 64);
        assert_eq!(scenario.obstacles.len(), 1);
        assert!(!scenario.obstacles[0].walkable);
    }

    #[test]
    fn invalid_scheduler_section_is_rejected() {
        let err = Scenario::from_yaml("scheduler:\n  batch_size: 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("batch_size"));
    }
}

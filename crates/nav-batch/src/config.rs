//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Grid, batch and throttling parameters for a [`PathScheduler`](crate::PathScheduler).
///
/// Every field has a default, so partial YAML/JSON documents deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Grid width in cells
    #[serde(default = "default_grid_dim")]
    pub grid_width: u32,

    /// Grid height in cells
    #[serde(default = "default_grid_dim")]
    pub grid_height: u32,

    /// World units per cell
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,

    /// Slots per dispatched batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Path buffer cells reserved per slot
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,

    /// Minimum spacing between re-requests of one agent (seconds).
    ///
    /// Requests closer than half of this are throttled.
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval: f64,

    /// Age after which a processing request may be superseded (seconds).
    ///
    /// `None` uses `min_request_interval`.
    #[serde(default)]
    pub stale_after: Option<f64>,

    /// Minimum spacing between batch dispatches (seconds)
    #[serde(default = "default_batch_interval")]
    pub batch_interval: f64,

    /// Agents without a request for this long are forgotten (seconds)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: f64,

    /// Pending queue bound. When full, the oldest pending request is dropped.
    #[serde(default)]
    pub max_pending: Option<usize>,

    /// Open-set capacity per slot
    #[serde(default = "default_open_set_capacity")]
    pub open_set_capacity: usize,

    /// Worker threads for the solve pool (`None` = rayon default)
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

fn default_grid_dim() -> u32 {
    200
}
fn default_cell_size() -> f32 {
    0.5
}
fn default_batch_size() -> usize {
    64
}
fn default_max_path_length() -> usize {
    128
}
fn default_min_request_interval() -> f64 {
    0.2
}
fn default_batch_interval() -> f64 {
    0.016
}
fn default_idle_timeout() -> f64 {
    5.0
}
fn default_open_set_capacity() -> usize {
    nav_grid::solver::DEFAULT_OPEN_SET_CAPACITY
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grid_width: default_grid_dim(),
            grid_height: default_grid_dim(),
            cell_size: default_cell_size(),
            batch_size: default_batch_size(),
            max_path_length: default_max_path_length(),
            min_request_interval: default_min_request_interval(),
            stale_after: None,
            batch_interval: default_batch_interval(),
            idle_timeout: default_idle_timeout(),
            max_pending: None,
            open_set_capacity: default_open_set_capacity(),
            worker_threads: None,
        }
    }
}

impl SchedulerConfig {
    /// Config for a `width` x `height` grid, defaults elsewhere.
    pub fn with_grid(width: u32, height: u32, cell_size: f32) -> Self {
        Self {
            grid_width: width,
            grid_height: height,
            cell_size,
            ..Self::default()
        }
    }

    pub fn stale_after(&self) -> f64 {
        self.stale_after.unwrap_or(self.min_request_interval)
    }

    pub fn throttle_window(&self) -> f64 {
        self.min_request_interval * 0.5
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        let invalid = |msg: &str| Err(SchedulerError::InvalidConfig(msg.to_string()));

        if self.grid_width == 0 || self.grid_height == 0 {
            return invalid("grid dimensions must be > 0");
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return invalid("cell_size must be finite and > 0");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be > 0");
        }
        if self.max_path_length == 0 {
            return invalid("max_path_length must be > 0");
        }
        if self.open_set_capacity == 0 {
            return invalid("open_set_capacity must be > 0");
        }
        if self.max_pending == Some(0) {
            return invalid("max_pending must be > 0 when set");
        }
        if self.worker_threads == Some(0) {
            return invalid("worker_threads must be > 0 when set");
        }
        for (name, value) in [
            ("min_request_interval", self.min_request_interval),
            ("batch_interval", self.batch_interval),
            ("idle_timeout", self.idle_timeout),
            ("stale_after", self.stale_after()),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SchedulerError::InvalidConfig(format!(
                    "{name} must be finite and >= 0"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.max_path_length, 128);
        assert_eq!(config.stale_after(), 0.2);
        assert_eq!(config.throttle_window(), 0.1);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: SchedulerConfig =
            serde_yaml::from_str("grid_width: 32\nbatch_size: 8\nmax_pending: 100\n").unwrap();
        assert_eq!(config.grid_width, 32);
        assert_eq!(config.grid_height, 200);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.max_pending, Some(100));
        assert_eq!(config.idle_timeout, 5.0);
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        let mut config = SchedulerConfig::default();
        config.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));

        let mut config = SchedulerConfig::default();
        config.cell_size = -1.0;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.batch_interval = f64::NAN;
        assert!(config.validate().is_err());
    }
}

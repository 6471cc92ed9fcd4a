//! Batched, parallel grid pathfinding for many agents.
//!
//! Agents submit requests to a [`PathScheduler`]; each tick the scheduler dispatches a batch of
//! pending requests to a rayon pool, harvests the previous batch without blocking, smooths the
//! winning paths and hands them to per-request callbacks. Results superseded by a newer
//! request of the same agent are dropped.

#![forbid(unsafe_code)]

pub mod agent;
mod batch;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod stats;

pub use agent::{AgentPathState, AgentPhase, PathCallback};
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use scheduler::{PathScheduler, Submission};
pub use stats::SchedulerStats;

pub use nav_grid::{GridCoord, NavGrid, Vec2};

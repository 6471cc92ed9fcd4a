use nav_grid::GridError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),

    #[error("grid construction failed: {0}")]
    Grid(#[from] GridError),

    #[error("failed to build solver thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("agent id 0 is reserved for empty batch slots")]
    ReservedAgentId,
}

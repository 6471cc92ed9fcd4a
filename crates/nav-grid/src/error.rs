use thiserror::Error;

/// Errors raised while constructing a [`NavGrid`](crate::NavGrid).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("grid must be non-empty (got {width}x{height})")]
    EmptyGrid { width: u32, height: u32 },

    #[error("grid of {width}x{height} cells exceeds the addressable range")]
    TooLarge { width: u32, height: u32 },

    #[error("cell_size must be finite and > 0 (got {0})")]
    InvalidCellSize(f32),

    #[error("walkability array has {actual} cells, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

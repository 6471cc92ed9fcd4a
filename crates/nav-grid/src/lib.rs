//! Grid navigation primitives: walkability map, bounded A* solver, and path smoothing.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod error;
pub mod grid;
pub mod heap;
pub mod math;
pub mod navigator;
pub mod smooth;
pub mod solver;

pub use error::GridError;
pub use grid::NavGrid;
pub use heap::{BoundedMinHeap, HeapNode};
pub use math::{GridCoord, Vec2};
pub use navigator::{NavPath, NavRaycastHit, Navigator};
pub use smooth::{has_line_of_sight, smooth_path, to_world_path};
pub use solver::{solve, PathRequest, PathResult, SearchKind, SearchScratch, SolveFailure};

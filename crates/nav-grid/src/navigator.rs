use crate::smooth::{first_blocked_on_line, smooth_path, to_world_path};
use crate::solver::{solve, PathRequest, SearchScratch, DEFAULT_OPEN_SET_CAPACITY};
use crate::{GridCoord, NavGrid, Vec2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NavPath {
    pub points: Vec<Vec2>,
}

impl NavPath {
    pub fn new(points: Vec<Vec2>) -> Self {
        Self { points }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NavRaycastHit {
    pub point: Vec2,
}

/// Synchronous, single-agent queries.
pub trait Navigator {
    fn find_path(&self, start: Vec2, goal: Vec2) -> Option<NavPath>;

    /// Raycast inside the nav representation.
    ///
    /// Returns the first point where the segment from `start` to `end` leaves navigable space.
    /// Backends that don't support raycasts may return `None`.
    fn raycast(&self, _start: Vec2, _end: Vec2) -> Option<NavRaycastHit> {
        None
    }

    /// Project a point onto the nearest navigable surface.
    ///
    /// Backends that don't support projection may return `None`.
    fn nearest_point(&self, _point: Vec2) -> Option<Vec2> {
        None
    }
}

impl NavGrid {
    /// Solve one request without a scheduler: snap, search, smooth, convert.
    pub fn find_path_with(
        &self,
        start: Vec2,
        goal: Vec2,
        scratch: &mut SearchScratch,
        max_path_length: usize,
    ) -> Option<NavPath> {
        let request = PathRequest {
            request_id: 1,
            agent_id: 1,
            start: self.find_nearest_walkable(self.to_grid(start)),
            goal: self.find_nearest_walkable(self.to_grid(goal)),
        };

        let mut buffer = vec![GridCoord::default(); max_path_length];
        let result = solve(self, &request, scratch, &mut buffer, 0);
        if !result.success {
            return None;
        }

        let smoothed = smooth_path(self, &buffer[..result.path_len]);
        Some(NavPath::new(to_world_path(self, &smoothed)))
    }
}

impl Navigator for NavGrid {
    fn find_path(&self, start: Vec2, goal: Vec2) -> Option<NavPath> {
        let max_path_length = self.len().min(u16::MAX as usize);
        let mut scratch = SearchScratch::new(DEFAULT_OPEN_SET_CAPACITY, max_path_length);
        self.find_path_with(start, goal, &mut scratch, max_path_length)
    }

    /// Reports the centre of the first blocked cell along the segment.
    fn raycast(&self, start: Vec2, end: Vec2) -> Option<NavRaycastHit> {
        let from = self.to_grid(start);
        if !self.is_walkable(from) {
            return None;
        }
        first_blocked_on_line(self, from, self.to_grid(end)).map(|cell| NavRaycastHit {
            point: self.to_world(cell),
        })
    }

    fn nearest_point(&self, point: Vec2) -> Option<Vec2> {
        let cell = self.find_nearest_walkable(self.to_grid(point));
        self.is_walkable(cell).then(|| self.to_world(cell))
    }
}

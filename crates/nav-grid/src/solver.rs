//! Single-request A* over a [`NavGrid`].
//!
//! A solve reads the grid, works entirely inside one [`SearchScratch`], and writes its raw
//! cell path into a caller-provided slice. Nothing is shared between solves, so many can run
//! in parallel over disjoint scratch/path slots.

use std::collections::{HashMap, HashSet};

use crate::heap::{BoundedMinHeap, HeapNode};
use crate::{GridCoord, NavGrid};

/// Cost of a horizontal or vertical step.
pub const CARDINAL_COST: u32 = 10;
/// Cost of a diagonal step (≈ 10·√2).
pub const DIAGONAL_COST: u32 = 14;
/// Hard cap on open-set pops per solve.
pub const MAX_ITERATIONS: u32 = 1000;
/// Start–goal distance (cells) at or beyond which a request counts as long-range.
pub const LONG_RANGE_DISTANCE: f32 = 15.0;
/// Default open-set capacity.
pub const DEFAULT_OPEN_SET_CAPACITY: usize = 4096;

/// Neighbour offsets, clockwise from north. Even entries are cardinal, odd are diagonal.
const DIRECTIONS: [(i32, i32); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

/// One path query. `request_id == 0` marks an empty batch slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathRequest {
    pub request_id: u64,
    pub agent_id: u64,
    pub start: GridCoord,
    pub goal: GridCoord,
}

impl PathRequest {
    pub const EMPTY: Self = Self {
        request_id: 0,
        agent_id: 0,
        start: GridCoord::new(0, 0),
        goal: GridCoord::new(0, 0),
    };

    pub fn is_empty(&self) -> bool {
        self.request_id == 0
    }

    pub fn kind(&self) -> SearchKind {
        if self.start.distance(self.goal) >= LONG_RANGE_DISTANCE {
            SearchKind::LongRange
        } else {
            SearchKind::Local
        }
    }
}

/// Distance class of a request.
///
/// Both classes currently run the same fine-grained search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchKind {
    #[default]
    Local,
    LongRange,
}

/// Why a solve produced no path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveFailure {
    /// Start or goal is outside the grid or unwalkable.
    InvalidEndpoint,
    /// The open set ran dry before reaching the goal.
    Unreachable,
    /// [`MAX_ITERATIONS`] pops without reaching the goal.
    IterationLimit,
    /// The reconstructed path does not fit in the slot's path buffer.
    PathTooLong,
    /// A parent link was missing while walking back from the goal.
    BrokenChain,
}

/// Outcome of one solve. The raw path lives in the shared path buffer at
/// `path_start..path_start + path_len`.
///
/// `agent_id == 0` marks an unused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathResult {
    pub request_id: u64,
    pub agent_id: u64,
    pub success: bool,
    pub path_start: usize,
    pub path_len: usize,
    /// `g` score of the goal; `0` on failure.
    pub cost: u32,
    pub iterations: u32,
    pub kind: SearchKind,
    pub failure: Option<SolveFailure>,
}

impl PathResult {
    pub fn is_empty(&self) -> bool {
        self.agent_id == 0
    }

    pub fn path_range(&self) -> core::ops::Range<usize> {
        self.path_start..self.path_start + self.path_len
    }
}

/// Per-solve working memory, sized once and cleared between solves.
#[derive(Debug, Clone)]
pub struct SearchScratch {
    open: BoundedMinHeap,
    closed: HashSet<usize>,
    came_from: HashMap<usize, usize>,
    g_score: HashMap<usize, u32>,
    walk: Vec<usize>,
}

impl SearchScratch {
    pub fn new(open_set_capacity: usize, max_path_length: usize) -> Self {
        let open_set_capacity = open_set_capacity.max(1);
        Self {
            open: BoundedMinHeap::with_capacity(open_set_capacity),
            closed: HashSet::with_capacity(open_set_capacity),
            came_from: HashMap::with_capacity(open_set_capacity),
            g_score: HashMap::with_capacity(open_set_capacity),
            walk: Vec::with_capacity(max_path_length),
        }
    }

    fn reset(&mut self) {
        self.open.clear();
        self.closed.clear();
        self.came_from.clear();
        self.g_score.clear();
        self.walk.clear();
    }

    /// `g` score recorded for `index` by the last solve.
    pub fn g_score(&self, index: usize) -> Option<u32> {
        self.g_score.get(&index).copied()
    }

    /// Open-set pushes dropped by the last solve.
    pub fn dropped_pushes(&self) -> usize {
        self.open.dropped()
    }
}

impl Default for SearchScratch {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_SET_CAPACITY, 128)
    }
}

/// Octile distance with the 10/14 step weights.
pub fn octile_distance(a: GridCoord, b: GridCoord) -> u32 {
    let dx = (i64::from(a.x) - i64::from(b.x)).unsigned_abs();
    let dy = (i64::from(a.y) - i64::from(b.y)).unsigned_abs();
    let cost = dx.min(dy) * u64::from(DIAGONAL_COST) + dx.abs_diff(dy) * u64::from(CARDINAL_COST);
    u32::try_from(cost).unwrap_or(u32::MAX)
}

/// Cost of a single step between adjacent cells.
pub fn step_cost(from: GridCoord, to: GridCoord) -> u32 {
    if from.x != to.x && from.y != to.y {
        DIAGONAL_COST
    } else {
        CARDINAL_COST
    }
}

/// Solve `request` on `grid`, writing the forward cell path into `path_out`.
///
/// `path_start` is the offset of `path_out` inside the shared buffer and is only recorded in
/// the result. At most `path_out.len()` cells are written.
pub fn solve(
    grid: &NavGrid,
    request: &PathRequest,
    scratch: &mut SearchScratch,
    path_out: &mut [GridCoord],
    path_start: usize,
) -> PathResult {
    let mut result = PathResult {
        request_id: request.request_id,
        agent_id: request.agent_id,
        path_start,
        kind: request.kind(),
        ..PathResult::default()
    };

    if !grid.is_walkable(request.start) || !grid.is_walkable(request.goal) {
        result.failure = Some(SolveFailure::InvalidEndpoint);
        return result;
    }

    if request.start == request.goal {
        let Some(first) = path_out.first_mut() else {
            result.failure = Some(SolveFailure::PathTooLong);
            return result;
        };
        *first = request.goal;
        result.success = true;
        result.path_len = 1;
        return result;
    }

    scratch.reset();
    match search(grid, request, scratch) {
        Ok(iterations) => {
            result.iterations = iterations;
            match reconstruct(grid, request, scratch, path_out) {
                Ok((len, cost)) => {
                    result.success = true;
                    result.path_len = len;
                    result.cost = cost;
                }
                Err(failure) => result.failure = Some(failure),
            }
        }
        Err((failure, iterations)) => {
            result.iterations = iterations;
            result.failure = Some(failure);
        }
    }
    result
}

fn search(
    grid: &NavGrid,
    request: &PathRequest,
    scratch: &mut SearchScratch,
) -> Result<u32, (SolveFailure, u32)> {
    // Endpoints were validated by the caller.
    let start_idx = grid.index(request.start).ok_or((SolveFailure::InvalidEndpoint, 0))?;
    let goal_idx = grid.index(request.goal).ok_or((SolveFailure::InvalidEndpoint, 0))?;

    let h0 = octile_distance(request.start, request.goal);
    scratch.g_score.insert(start_idx, 0);
    scratch.open.push(HeapNode {
        index: start_idx,
        f_cost: h0,
        h_cost: h0,
    });

    let mut iterations = 0;
    while !scratch.open.is_empty() {
        if iterations >= MAX_ITERATIONS {
            return Err((SolveFailure::IterationLimit, iterations));
        }
        iterations += 1;

        let Some(current) = scratch.open.pop() else {
            break;
        };
        if current.index == goal_idx {
            return Ok(iterations);
        }
        if !scratch.closed.insert(current.index) {
            continue;
        }

        let current_pos = grid.coord_of(current.index);
        let current_g = scratch
            .g_score
            .get(&current.index)
            .copied()
            .unwrap_or(u32::MAX);

        for (dir, (dx, dy)) in DIRECTIONS.iter().copied().enumerate() {
            let neighbor = current_pos.offset(dx, dy);
            let Some(neighbor_idx) = grid.index(neighbor) else {
                continue;
            };
            if scratch.closed.contains(&neighbor_idx) || !grid.is_walkable_index(neighbor_idx) {
                continue;
            }

            let diagonal = dir % 2 == 1;
            if diagonal && cuts_corner(grid, current_pos, dx, dy) {
                continue;
            }

            let move_cost = if diagonal { DIAGONAL_COST } else { CARDINAL_COST };
            let tentative_g = current_g.saturating_add(move_cost);
            let neighbor_g = scratch
                .g_score
                .get(&neighbor_idx)
                .copied()
                .unwrap_or(u32::MAX);
            if tentative_g >= neighbor_g {
                continue;
            }

            scratch.came_from.insert(neighbor_idx, current.index);
            scratch.g_score.insert(neighbor_idx, tentative_g);
            let h = octile_distance(neighbor, request.goal);
            scratch.open.push(HeapNode {
                index: neighbor_idx,
                f_cost: tentative_g.saturating_add(h),
                h_cost: h,
            });
        }
    }

    Err((SolveFailure::Unreachable, iterations))
}

/// A diagonal step is blocked when either flanking cardinal cell is blocked or off-grid.
fn cuts_corner(grid: &NavGrid, from: GridCoord, dx: i32, dy: i32) -> bool {
    !grid.is_walkable(from.offset(dx, 0)) || !grid.is_walkable(from.offset(0, dy))
}

fn reconstruct(
    grid: &NavGrid,
    request: &PathRequest,
    scratch: &mut SearchScratch,
    path_out: &mut [GridCoord],
) -> Result<(usize, u32), SolveFailure> {
    let start_idx = grid.index(request.start).ok_or(SolveFailure::InvalidEndpoint)?;
    let goal_idx = grid.index(request.goal).ok_or(SolveFailure::InvalidEndpoint)?;
    let max_len = path_out.len();

    let mut current = goal_idx;
    scratch.walk.push(current);
    while current != start_idx {
        let parent = *scratch
            .came_from
            .get(&current)
            .ok_or(SolveFailure::BrokenChain)?;
        if scratch.walk.len() >= max_len {
            return Err(SolveFailure::PathTooLong);
        }
        current = parent;
        scratch.walk.push(current);
    }
    if scratch.walk.len() > max_len {
        return Err(SolveFailure::PathTooLong);
    }

    for (slot, idx) in path_out.iter_mut().zip(scratch.walk.iter().rev()) {
        *slot = grid.coord_of(*idx);
    }

    let cost = scratch.g_score.get(&goal_idx).copied().unwrap_or(0);
    Ok((scratch.walk.len(), cost))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: (i32, i32), goal: (i32, i32)) -> PathRequest {
        PathRequest {
            request_id: 1,
            agent_id: 7,
            start: start.into(),
            goal: goal.into(),
        }
    }

    fn run(grid: &NavGrid, req: PathRequest, max_len: usize) -> (PathResult, Vec<GridCoord>) {
        let mut scratch = SearchScratch::new(DEFAULT_OPEN_SET_CAPACITY, max_len);
        let mut buf = vec![GridCoord::default(); max_len];
        let result = solve(grid, &req, &mut scratch, &mut buf, 0);
        buf.truncate(result.path_len);
        (result, buf)
    }

    #[test]
    fn octile_matches_step_weights() {
        let o = GridCoord::new(0, 0);
        assert_eq!(octile_distance(o, GridCoord::new(3, 0)), 30);
        assert_eq!(octile_distance(o, GridCoord::new(3, 3)), 42);
        assert_eq!(octile_distance(o, GridCoord::new(-2, 5)), 2 * 14 + 3 * 10);
    }

    #[test]
    fn trivial_request_returns_goal() {
        let grid = NavGrid::new(4, 4, 1.0).unwrap();
        let (result, path) = run(&grid, request((2, 2), (2, 2)), 16);
        assert!(result.success);
        assert_eq!(path, vec![GridCoord::new(2, 2)]);
        assert_eq!(result.cost, 0);
    }

    #[test]
    fn straight_line_cost() {
        let grid = NavGrid::new(10, 3, 1.0).unwrap();
        let (result, path) = run(&grid, request((0, 1), (9, 1)), 32);
        assert!(result.success);
        assert_eq!(path.len(), 10);
        assert_eq!(result.cost, 90);
        assert_eq!(result.kind, SearchKind::Local);
    }

    #[test]
    fn invalid_endpoints_fail_fast() {
        let mut grid = NavGrid::new(5, 5, 1.0).unwrap();
        grid.set_walkable(GridCoord::new(4, 4), false);

        let (oob, _) = run(&grid, request((-1, 0), (3, 3)), 16);
        assert_eq!(oob.failure, Some(SolveFailure::InvalidEndpoint));
        assert!(!oob.success);

        let (blocked, _) = run(&grid, request((0, 0), (4, 4)), 16);
        assert_eq!(blocked.failure, Some(SolveFailure::InvalidEndpoint));
        assert_eq!(blocked.iterations, 0);
    }

    #[test]
    fn short_buffer_reports_path_too_long() {
        let grid = NavGrid::new(10, 1, 1.0).unwrap();
        let (result, _) = run(&grid, request((0, 0), (9, 0)), 5);
        assert!(!result.success);
        assert_eq!(result.failure, Some(SolveFailure::PathTooLong));

        let (exact, path) = run(&grid, request((0, 0), (9, 0)), 10);
        assert!(exact.success);
        assert_eq!(path.len(), 10);
    }

    #[test]
    fn diagonal_blocked_by_single_corner() {
        // (1,0) is blocked, so the NE diagonal out of (0,0) would clip its corner.
        let mut grid = NavGrid::new(3, 3, 1.0).unwrap();
        grid.set_walkable(GridCoord::new(1, 0), false);
        let (result, path) = run(&grid, request((0, 0), (1, 1)), 16);
        assert!(result.success);
        assert_eq!(
            path,
            vec![GridCoord::new(0, 0), GridCoord::new(0, 1), GridCoord::new(1, 1)]
        );
        assert_eq!(result.cost, 20);
    }

    #[test]
    fn long_range_requests_are_classified() {
        let grid = NavGrid::new(40, 40, 1.0).unwrap();
        let (result, path) = run(&grid, request((0, 0), (20, 5)), 64);
        assert!(result.success);
        assert_eq!(result.kind, SearchKind::LongRange);
        assert_eq!(path.last().copied(), Some(GridCoord::new(20, 5)));
        assert_eq!(result.cost, octile_distance((0, 0).into(), (20, 5).into()));
    }

    #[test]
    fn tiny_open_set_drops_pushes_but_terminates() {
        let mut grid = NavGrid::new(12, 12, 1.0).unwrap();
        for y in 0..11 {
            grid.set_walkable(GridCoord::new(6, y), false);
        }
        let req = request((0, 0), (11, 0));
        let mut scratch = SearchScratch::new(1, 128);
        let mut buf = vec![GridCoord::default(); 128];
        let result = solve(&grid, &req, &mut scratch, &mut buf, 0);

        assert!(scratch.dropped_pushes() > 0);
        assert!(result.iterations <= MAX_ITERATIONS);
        if result.success {
            assert_eq!(buf[result.path_len - 1], req.goal);
            let (full, _) = run(&grid, req, 128);
            assert!(result.cost >= full.cost);
        }
    }

    #[test]
    fn out_of_range_endpoints_are_rejected() {
        let grid = NavGrid::new(8, 8, 1.0).unwrap();
        let (result, path) = run(&grid, request((i32::MAX, 0), (-1, 0)), 16);
        assert!(!result.success);
        assert_eq!(result.failure, Some(SolveFailure::InvalidEndpoint));
        assert_eq!(result.kind, SearchKind::LongRange);
        assert!(path.is_empty());

        let (result, _) = run(&grid, request((0, 0), (i32::MIN, i32::MAX)), 16);
        assert_eq!(result.failure, Some(SolveFailure::InvalidEndpoint));
        assert_eq!(
            octile_distance(GridCoord::new(i32::MIN, 0), GridCoord::new(i32::MAX, 0)),
            u32::MAX
        );
    }
}

//! Line-of-sight waypoint reduction for raw cell paths.

use crate::{GridCoord, NavGrid, Vec2};

/// `true` when every cell visited by the 4-connected line traversal from `from` to `to`
/// (`1 + |dx| + |dy|` cells, both endpoints included) is walkable.
pub fn has_line_of_sight(grid: &NavGrid, from: GridCoord, to: GridCoord) -> bool {
    first_blocked_on_line(grid, from, to).is_none()
}

/// First unwalkable (or off-grid) cell visited by the line traversal from `from` to `to`.
pub fn first_blocked_on_line(grid: &NavGrid, from: GridCoord, to: GridCoord) -> Option<GridCoord> {
    let mut dx = (i64::from(to.x) - i64::from(from.x)).abs();
    let mut dy = (i64::from(to.y) - i64::from(from.y)).abs();
    let x_inc = if to.x > from.x { 1 } else { -1 };
    let y_inc = if to.y > from.y { 1 } else { -1 };

    let mut x = from.x;
    let mut y = from.y;
    let mut error = dx - dy;
    let steps = 1 + dx + dy;
    dx *= 2;
    dy *= 2;

    for _ in 0..steps {
        let cell = GridCoord::new(x, y);
        if !grid.is_walkable(cell) {
            return Some(cell);
        }
        if error > 0 {
            x = x.saturating_add(x_inc);
            error -= dy;
        } else {
            y = y.saturating_add(y_inc);
            error += dx;
        }
    }

    None
}

/// Drop interior points that are bypassable by a clear straight line.
///
/// Keeps the first and last points, never lengthens the path, and is idempotent: the greedy
/// pass is repeated until it stops removing points.
pub fn smooth_path(grid: &NavGrid, path: &[GridCoord]) -> Vec<GridCoord> {
    let mut current = path.to_vec();
    loop {
        let next = smooth_pass(grid, &current);
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

fn smooth_pass(grid: &NavGrid, path: &[GridCoord]) -> Vec<GridCoord> {
    if path.len() <= 2 {
        return path.to_vec();
    }

    let mut out = Vec::with_capacity(path.len());
    out.push(path[0]);

    let mut anchor = 0;
    while anchor < path.len() - 1 {
        let mut farthest = anchor + 1;
        for i in anchor + 2..path.len() {
            if has_line_of_sight(grid, path[anchor], path[i]) {
                farthest = i;
            } else {
                break;
            }
        }
        out.push(path[farthest]);
        anchor = farthest;
    }

    out
}

/// Cell centres of `path` in world space.
pub fn to_world_path(grid: &NavGrid, path: &[GridCoord]) -> Vec<Vec2> {
    path.iter().map(|c| grid.to_world(*c)).collect()
}

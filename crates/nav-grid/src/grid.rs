use rand::Rng;

use crate::{GridCoord, GridError, Vec2};

/// Largest ring radius probed by [`NavGrid::find_nearest_walkable`].
pub const NEAREST_SEARCH_RADIUS: i32 = 9;

/// Row-major walkability map over world space.
///
/// Dimensions are fixed after construction; `index = x + y * width`.
#[derive(Debug, Clone, PartialEq)]
pub struct NavGrid {
    width: i32,
    height: i32,
    cell_size: f32,
    walkable: Vec<bool>,
}

impl NavGrid {
    /// Create a fully walkable grid.
    pub fn new(width: u32, height: u32, cell_size: f32) -> Result<Self, GridError> {
        let len = checked_len(width, height, cell_size)?;
        Ok(Self {
            width: width as i32,
            height: height as i32,
            cell_size,
            walkable: vec![true; len],
        })
    }

    /// Create a grid from a row-major walkability array produced by a grid builder.
    pub fn from_walkable(
        width: u32,
        height: u32,
        cell_size: f32,
        walkable: Vec<bool>,
    ) -> Result<Self, GridError> {
        let len = checked_len(width, height, cell_size)?;
        if walkable.len() != len {
            return Err(GridError::SizeMismatch {
                expected: len,
                actual: walkable.len(),
            });
        }
        Ok(Self {
            width: width as i32,
            height: height as i32,
            cell_size,
            walkable,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.walkable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walkable.is_empty()
    }

    pub fn walkable_count(&self) -> usize {
        self.walkable.iter().filter(|w| **w).count()
    }

    pub fn in_bounds(&self, coord: GridCoord) -> bool {
        coord.x >= 0 && coord.y >= 0 && coord.x < self.width && coord.y < self.height
    }

    pub fn index(&self, coord: GridCoord) -> Option<usize> {
        if !self.in_bounds(coord) {
            return None;
        }
        Some((coord.x + coord.y * self.width) as usize)
    }

    pub fn coord_of(&self, index: usize) -> GridCoord {
        let index = index as i32;
        GridCoord::new(index % self.width, index / self.width)
    }

    /// `false` outside the grid.
    pub fn is_walkable(&self, coord: GridCoord) -> bool {
        self.index(coord)
            .map(|idx| self.walkable[idx])
            .unwrap_or(false)
    }

    pub(crate) fn is_walkable_index(&self, index: usize) -> bool {
        self.walkable[index]
    }

    /// Out-of-bounds writes are ignored.
    pub fn set_walkable(&mut self, coord: GridCoord, walkable: bool) {
        if let Some(idx) = self.index(coord) {
            self.walkable[idx] = walkable;
        }
    }

    /// Paint a filled disc of cells (Euclidean distance `<= radius`), clipped to the grid.
    ///
    /// Returns the number of cells written.
    pub fn set_walkable_disc(&mut self, center: GridCoord, radius: i32, walkable: bool) -> usize {
        let radius = i64::from(radius.max(0));
        let (cx, cy) = (i64::from(center.x), i64::from(center.y));
        let x_range = (cx - radius).max(0)..=(cx + radius).min(i64::from(self.width) - 1);
        let y_range = (cy - radius).max(0)..=(cy + radius).min(i64::from(self.height) - 1);

        let mut written = 0;
        for y in y_range {
            for x in x_range.clone() {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let idx = (x + y * i64::from(self.width)) as usize;
                self.walkable[idx] = walkable;
                written += 1;
            }
        }
        written
    }

    /// Cell centre in world space.
    pub fn to_world(&self, coord: GridCoord) -> Vec2 {
        Vec2::new(
            (coord.x as f32 + 0.5) * self.cell_size,
            (coord.y as f32 + 0.5) * self.cell_size,
        )
    }

    /// Floor-based cell lookup. The result may lie outside the grid.
    pub fn to_grid(&self, point: Vec2) -> GridCoord {
        GridCoord::new(
            (point.x / self.cell_size).floor() as i32,
            (point.y / self.cell_size).floor() as i32,
        )
    }

    /// Snap `coord` to the closest walkable cell using square rings of radius
    /// `1..=NEAREST_SEARCH_RADIUS`.
    ///
    /// Returns `coord` unchanged when nothing walkable is in range; callers must treat an
    /// unchanged, still-unwalkable result as "no valid cell nearby".
    pub fn find_nearest_walkable(&self, coord: GridCoord) -> GridCoord {
        if self.is_walkable(coord) {
            return coord;
        }

        for radius in 1..=NEAREST_SEARCH_RADIUS {
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let cell = coord.offset(dx, dy);
                    if self.is_walkable(cell) {
                        return cell;
                    }
                }
            }
        }

        coord
    }

    /// Rejection-sample a walkable cell centre within `radius` (world units) of `center`.
    ///
    /// Returns `center` unchanged when no sample succeeds within `max_attempts`.
    pub fn random_walkable_near<R: Rng + ?Sized>(
        &self,
        center: Vec2,
        radius: f32,
        max_attempts: u32,
        rng: &mut R,
    ) -> Vec2 {
        let center_cell = self.to_grid(center);
        let cell_radius = (radius.max(0.0) / self.cell_size).ceil() as i32;

        for _ in 0..max_attempts {
            let dx = rng.gen_range(-cell_radius..=cell_radius);
            let dy = rng.gen_range(-cell_radius..=cell_radius);
            let cell = center_cell.offset(dx, dy);

            if center_cell.distance(cell) * self.cell_size > radius {
                continue;
            }
            if self.is_walkable(cell) {
                return self.to_world(cell);
            }
        }

        center
    }
}

fn checked_len(width: u32, height: u32, cell_size: f32) -> Result<usize, GridError> {
    if width == 0 || height == 0 {
        return Err(GridError::EmptyGrid { width, height });
    }
    if width > i32::MAX as u32 || height > i32::MAX as u32 {
        return Err(GridError::TooLarge { width, height });
    }
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(GridError::InvalidCellSize(cell_size));
    }
    (width as usize)
        .checked_mul(height as usize)
        .filter(|len| *len <= i32::MAX as usize)
        .ok_or(GridError::TooLarge { width, height })
}

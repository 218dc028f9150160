//! Grid geometry - integer cell coordinates and their world-space mapping.
//!
//! Everything here is pure: no ECS access, no state. World positions are the
//! cell coordinate scaled by a fixed unit length (see `GameConfig::unit_length`),
//! measured at the cell center.

use serde::{Deserialize, Serialize};

/// Integer grid cell. `x` grows to the right, `y` grows downward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step in `direction`. `Direction::None` returns `self`.
    pub fn step(self, direction: Direction) -> Self {
        self.offset(direction, 1)
    }

    /// The cell `distance` steps away in `direction`.
    pub fn offset(self, direction: Direction, distance: i32) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x + dx * distance, self.y + dy * distance)
    }

    /// Manhattan distance between two cells.
    pub fn manhattan(self, other: Point) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Direction of an axis-aligned neighbour or line, `None` if not aligned.
    pub fn direction_to(self, other: Point) -> Direction {
        match (other.x - self.x, other.y - self.y) {
            (0, dy) if dy < 0 => Direction::Up,
            (0, dy) if dy > 0 => Direction::Down,
            (dx, 0) if dx < 0 => Direction::Left,
            (dx, 0) if dx > 0 => Direction::Right,
            _ => Direction::None,
        }
    }
}

/// Width and height of a level in cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub width: i32,
    pub height: i32,
}

impl GridSize {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Whether `point` lies inside the grid.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= 0 && point.y >= 0 && point.x < self.width && point.y < self.height
    }
}

/// Facing / movement direction of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// The four axis directions in ray-cast and priority order.
    pub const CARDINAL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    /// Unit cell offset for this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::None => (0, 0),
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }
}

/// Inclusive rectangle of cells, used for projected bounding areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub min: Point,
    pub max: Point,
}

impl CellRect {
    /// Rectangle covering a single cell.
    pub fn cell(point: Point) -> Self {
        Self { min: point, max: point }
    }

    /// Smallest rectangle covering both cells.
    pub fn spanning(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn intersects(&self, other: &CellRect) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}

/// World-space coordinate of a cell center.
#[inline]
pub fn to_world(point: Point, unit_length: f32) -> (f32, f32) {
    (
        (point.x as f32 + 0.5) * unit_length,
        (point.y as f32 + 0.5) * unit_length,
    )
}

/// Cell containing a world-space coordinate.
#[inline]
pub fn from_world(x: f32, y: f32, unit_length: f32) -> Point {
    Point::new(
        (x / unit_length).floor() as i32,
        (y / unit_length).floor() as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_round_trip_lands_in_same_cell() {
        let cell = Point::new(3, 7);
        let (x, y) = to_world(cell, 32.0);
        assert_eq!((x, y), (112.0, 240.0));
        assert_eq!(from_world(x, y, 32.0), cell);
        assert_eq!(from_world(-0.5, 4.0, 32.0), Point::new(-1, 0));
    }

    #[test]
    fn test_step_and_direction_to() {
        let origin = Point::new(2, 2);
        assert_eq!(origin.step(Direction::Up), Point::new(2, 1));
        assert_eq!(origin.offset(Direction::Right, 3), Point::new(5, 2));
        assert_eq!(origin.step(Direction::None), origin);
        assert_eq!(origin.direction_to(Point::new(2, 9)), Direction::Down);
        assert_eq!(origin.direction_to(Point::new(3, 3)), Direction::None);
    }

    #[test]
    fn test_grid_bounds() {
        let size = GridSize::new(5, 4);
        assert!(size.contains(Point::new(0, 0)));
        assert!(size.contains(Point::new(4, 3)));
        assert!(!size.contains(Point::new(5, 0)));
        assert!(!size.contains(Point::new(0, -1)));
    }

    #[test]
    fn test_rect_intersection() {
        let moving = CellRect::spanning(Point::new(1, 1), Point::new(2, 1));
        assert!(moving.intersects(&CellRect::cell(Point::new(2, 1))));
        assert!(!moving.intersects(&CellRect::cell(Point::new(3, 1))));
    }
}

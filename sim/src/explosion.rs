//! Bomb explosion propagation.
//!
//! Pure planning over a read-only `BlastField`: the origin cell is always hit,
//! then one ray per axis direction walks outward up to the blast range.
//! Applying the plan (destroying tiles, chaining bombs, spawning explosion
//! segments) is the orchestrator's job.

use crate::components::{EntityId, TileType};
use crate::grid::{Direction, Point};

/// A tile as the blast sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTile {
    pub id: EntityId,
    pub tile_type: TileType,
    /// Already destroyed by an earlier blast.
    pub destroyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldBomb {
    pub id: EntityId,
    pub destroyed: bool,
}

/// Read-only grid probe used while planning a blast.
pub trait BlastField {
    fn tile_at(&self, point: Point) -> Option<FieldTile>;
    fn bomb_at(&self, point: Point) -> Option<FieldBomb>;
    fn in_bounds(&self, point: Point) -> bool;
}

/// One cell covered by the blast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlastSegment {
    pub position: Point,
    /// `Direction::None` for the origin.
    pub direction: Direction,
}

/// Everything one detonation affects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlastPlan {
    /// Origin first, then each ray outward in `Direction::CARDINAL` order.
    pub segments: Vec<BlastSegment>,
    /// Destructible blocks to destroy.
    pub tiles: Vec<EntityId>,
    /// Other bombs caught by the blast.
    pub bombs: Vec<EntityId>,
}

impl BlastPlan {
    pub fn covers(&self, point: Point) -> bool {
        self.segments.iter().any(|s| s.position == point)
    }
}

/// Plan the blast of a bomb at `origin`.
///
/// `source` is the exploding bomb itself and is never chained.
pub fn propagate(origin: Point, range: u32, source: Option<EntityId>, field: &impl BlastField) -> BlastPlan {
    let mut plan = BlastPlan::default();
    plan.segments.push(BlastSegment { position: origin, direction: Direction::None });

    let reach = i32::try_from(range).unwrap_or(i32::MAX);
    for direction in Direction::CARDINAL {
        for distance in 1..=reach {
            let cell = origin.offset(direction, distance);
            if !field.in_bounds(cell) {
                break;
            }
            match field.tile_at(cell) {
                None => plan.segments.push(BlastSegment { position: cell, direction }),
                Some(tile) if tile.tile_type == TileType::DestructibleBlock && !tile.destroyed => {
                    plan.segments.push(BlastSegment { position: cell, direction });
                    plan.tiles.push(tile.id);
                    break;
                }
                // Walls, indestructible blocks and blocks already going down.
                Some(_) => break,
            }
        }
    }

    for segment in &plan.segments {
        if let Some(bomb) = field.bomb_at(segment.position) {
            if Some(bomb.id) != source && !bomb.destroyed && !plan.bombs.contains(&bomb.id) {
                plan.bombs.push(bomb.id);
            }
        }
    }
    plan
}

//! Snapshot types.
//!
//! The `Snapshot` struct provides a serializable view of the simulation state
//! for debugging hosts and headless runs.

use crate::blueprint::EntityQueue;
use crate::components::*;
use crate::grid::Direction;
use crate::presentation::{HudStatus, LevelOutcome};
use crate::spatial::LiveCollections;
use crate::state::{StateKind, StateMachine};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Snapshot of a single live entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: u64,
    pub kind: String,
    pub x: i32,
    pub y: i32,
    pub state: Option<StateKind>,
    pub heading: Direction,
    /// Creatures only.
    pub health: Option<i32>,
    pub lives: Option<i32>,
    /// Score popups only.
    pub points: Option<u32>,
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    pub score: u32,
    /// Seconds left before sudden death.
    pub time_remaining: Option<f32>,
    pub outcome: Option<LevelOutcome>,
    /// Live entities in scan order.
    pub entities: Vec<EntitySnapshot>,
    pub players: Vec<HudStatus>,
    pub pending_additions: usize,
    pub pending_removals: usize,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Self {
        let mut query = world.query::<(
            &EntityKind,
            &GridPosition,
            &Heading,
            &StateMachine,
            Option<&Creature>,
            Option<&Player>,
            Option<&Points>,
        )>();

        let mut entities = Vec::new();
        let mut players = Vec::new();
        if let Some(live) = world.get_resource::<LiveCollections>() {
            for (id, entity) in live.entities() {
                let Ok((kind, position, heading, machine, creature, player, points)) = query.get(world, entity) else {
                    continue;
                };
                entities.push(EntitySnapshot {
                    id: id.0,
                    kind: kind.label().to_string(),
                    x: position.0.x,
                    y: position.0.y,
                    state: machine.current_kind(),
                    heading: heading.0,
                    health: creature.map(|c| c.health),
                    lives: creature.map(|c| c.lives),
                    points: points.map(|p| p.value),
                });
                if let (Some(player), Some(creature)) = (player, creature) {
                    players.push(HudStatus::new(player, creature.lives));
                }
            }
        }
        players.sort_by_key(|hud| hud.player);

        let (pending_additions, pending_removals) = world
            .get_resource::<EntityQueue>()
            .map_or((0, 0), |queue| (queue.additions(), queue.removals()));

        Self {
            tick,
            time,
            entities,
            players,
            pending_additions,
            pending_removals,
            ..Default::default()
        }
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Point;

    #[test]
    fn test_snapshot_lists_live_entities_in_scan_order() {
        let mut world = World::new();
        let tile = world
            .spawn((
                EntityKind::Tile(TileType::Wall),
                GridPosition(Point::new(0, 0)),
                Heading::default(),
                StateMachine::new(),
            ))
            .id();
        let monster = world
            .spawn((
                EntityKind::Creature(CreatureKind::Monster),
                GridPosition(Point::new(2, 1)),
                Heading(Direction::Left),
                StateMachine::new(),
                Creature::new(1, 2, Point::new(2, 1)),
            ))
            .id();
        let popup = world
            .spawn((
                EntityKind::Points,
                GridPosition(Point::new(1, 1)),
                Heading::default(),
                StateMachine::new(),
                Points { value: 50 },
            ))
            .id();
        let mut live = LiveCollections::default();
        live.insert(EntityId(1), tile, EntityKind::Tile(TileType::Wall));
        live.insert(EntityId(2), monster, EntityKind::Creature(CreatureKind::Monster));
        live.insert(EntityId(3), popup, EntityKind::Points);
        world.insert_resource(live);

        let snapshot = Snapshot::from_world(&mut world, 3, 0.5);
        assert_eq!(snapshot.tick, 3);
        assert_eq!(snapshot.entities.len(), 3);
        // Creatures scan first.
        assert_eq!(snapshot.entities[0].id, 2);
        assert_eq!(snapshot.entities[0].lives, Some(2));
        assert_eq!(snapshot.entities[0].heading, Direction::Left);
        assert_eq!(snapshot.entities[1].health, None);
        assert!(snapshot.players.is_empty());
        let points = snapshot.entities.iter().find(|e| e.id == 3).unwrap();
        assert_eq!((points.points, points.lives), (Some(50), None));

        let json = snapshot.to_json().unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.entities, snapshot.entities);
    }
}

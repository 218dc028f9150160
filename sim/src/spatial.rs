//! Live collections and grid occupancy queries.
//!
//! The orchestrator keeps one ordered collection per entity family. They are
//! only mutated by the flush steps at the start of a tick, so reading them
//! during the systems is always consistent. Occupancy queries are linear
//! scans over these collections; levels are small enough that a cell index
//! would only add bookkeeping on every step.

use crate::components::*;
use crate::explosion::{BlastField, FieldBomb, FieldTile};
use crate::grid::{CellRect, GridSize, Point};
use crate::state::StateMachine;
use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemParam;
use std::collections::HashMap;

/// Bounds of the current level. `None` before a level is configured.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct Arena {
    pub size: Option<GridSize>,
}

impl Arena {
    pub fn contains(&self, point: Point) -> bool {
        self.size.map_or(true, |size| size.contains(point))
    }
}

/// Every live entity, grouped by family in insertion order.
#[derive(Resource, Debug, Default)]
pub struct LiveCollections {
    bombs: Vec<EntityId>,
    creatures: Vec<EntityId>,
    tiles: Vec<EntityId>,
    props: Vec<EntityId>,
    projectiles: Vec<EntityId>,
    explosions: Vec<EntityId>,
    points: Vec<EntityId>,
    entities: HashMap<EntityId, (Entity, EntityKind)>,
    /// Authoritative `player1` / `player2` references.
    players: [Option<EntityId>; 2],
}

impl LiveCollections {
    /// Scan order used by every query: creatures first, then the static families.
    const ORDER: [Collection; 7] = [
        Collection::Creatures,
        Collection::Bombs,
        Collection::Tiles,
        Collection::Props,
        Collection::Projectiles,
        Collection::Explosions,
        Collection::Points,
    ];

    pub fn insert(&mut self, id: EntityId, entity: Entity, kind: EntityKind) {
        if self.entities.insert(id, (entity, kind)).is_none() {
            self.collection_mut(kind.collection()).push(id);
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<(Entity, EntityKind)> {
        let (entity, kind) = self.entities.remove(&id)?;
        self.collection_mut(kind.collection()).retain(|other| *other != id);
        Some((entity, kind))
    }

    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.entities.get(&id).map(|(entity, _)| *entity)
    }

    pub fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.entities.get(&id).map(|(_, kind)| *kind)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn collection(&self, collection: Collection) -> &[EntityId] {
        match collection {
            Collection::Bombs => &self.bombs,
            Collection::Creatures => &self.creatures,
            Collection::Tiles => &self.tiles,
            Collection::Props => &self.props,
            Collection::Projectiles => &self.projectiles,
            Collection::Explosions => &self.explosions,
            Collection::Points => &self.points,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut Vec<EntityId> {
        match collection {
            Collection::Bombs => &mut self.bombs,
            Collection::Creatures => &mut self.creatures,
            Collection::Tiles => &mut self.tiles,
            Collection::Props => &mut self.props,
            Collection::Projectiles => &mut self.projectiles,
            Collection::Explosions => &mut self.explosions,
            Collection::Points => &mut self.points,
        }
    }

    /// All live ids in scan order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        Self::ORDER
            .into_iter()
            .flat_map(move |collection| self.collection(collection).iter().copied())
    }

    /// Live ids paired with their ECS entity, in scan order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, Entity)> + '_ {
        self.ids().filter_map(move |id| self.entity(id).map(|entity| (id, entity)))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn register_player(&mut self, index: PlayerIndex, id: EntityId) {
        self.players[index.slot()] = Some(id);
    }

    /// Registered player, whether or not it is still live.
    pub fn player(&self, index: PlayerIndex) -> Option<EntityId> {
        self.players[index.slot()]
    }

    pub fn registered_players(&self) -> impl Iterator<Item = (PlayerIndex, EntityId)> + '_ {
        self.players
            .iter()
            .enumerate()
            .filter_map(|(slot, id)| Some((PlayerIndex::from_slot(slot)?, (*id)?)))
    }

    pub fn unregister_players(&mut self) {
        self.players = [None, None];
    }

    /// Drop everything, including the player registrations.
    pub fn clear(&mut self) {
        for collection in Self::ORDER {
            self.collection_mut(collection).clear();
        }
        self.entities.clear();
        self.players = [None, None];
    }
}

/// What occupancy queries know about one live entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occupant {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Point,
    /// Cell claimed by a step in flight.
    pub next: Option<Point>,
    /// In Destroy or Disintegrate.
    pub destroyed: bool,
    /// Creatures with a negative life counter are not alive.
    pub alive: bool,
    pub bomb_owner: Option<EntityId>,
}

impl Occupant {
    /// Current cell plus the claimed next cell.
    pub fn projected_area(&self) -> CellRect {
        CellRect::spanning(self.position, self.next.unwrap_or(self.position))
    }
}

type OccupantData = (
    &'static EntityId,
    &'static EntityKind,
    &'static GridPosition,
    &'static StateMachine,
    Option<&'static Creature>,
    Option<&'static Bomb>,
);

fn occupant(
    (id, kind, position, machine, creature, bomb): (&EntityId, &EntityKind, &GridPosition, &StateMachine, Option<&Creature>, Option<&Bomb>),
) -> Occupant {
    Occupant {
        id: *id,
        kind: *kind,
        position: position.0,
        next: creature.and_then(|c| c.next_grid_position),
        destroyed: machine.is_destroyed(),
        alive: creature.map_or(true, Creature::is_alive),
        bomb_owner: bomb.and_then(|b| b.owner),
    }
}

/// Point-in-time view of every live entity's cell.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    arena: Arena,
    occupants: Vec<Occupant>,
}

impl Occupancy {
    pub fn new(arena: Arena, occupants: Vec<Occupant>) -> Self {
        Self { arena, occupants }
    }

    /// Build from an exclusive world borrow (the orchestrator's side).
    pub fn from_world(world: &mut World) -> Self {
        let mut query = world.query::<OccupantData>();
        let arena = world.get_resource::<Arena>().copied().unwrap_or_default();
        let Some(live) = world.get_resource::<LiveCollections>() else {
            return Self::new(arena, Vec::new());
        };
        let occupants = live
            .entities()
            .filter_map(|(_, entity)| query.get(world, entity).ok().map(occupant))
            .collect();
        Self::new(arena, occupants)
    }

    pub fn occupants(&self) -> &[Occupant] {
        &self.occupants
    }

    pub fn get(&self, id: EntityId) -> Option<&Occupant> {
        self.occupants.iter().find(|o| o.id == id)
    }

    pub fn in_bounds(&self, point: Point) -> bool {
        self.arena.contains(point)
    }

    fn first_at(&self, point: Point, filter: impl Fn(&Occupant) -> bool) -> Option<&Occupant> {
        self.occupants.iter().find(|o| o.position == point && filter(o))
    }

    pub fn tile_at(&self, point: Point) -> Option<&Occupant> {
        self.first_at(point, |o| matches!(o.kind, EntityKind::Tile(_)))
    }

    pub fn bomb_at(&self, point: Point) -> Option<&Occupant> {
        self.first_at(point, |o| o.kind == EntityKind::Bomb)
    }

    pub fn creature_at(&self, point: Point) -> Option<&Occupant> {
        self.first_at(point, |o| matches!(o.kind, EntityKind::Creature(_)))
    }

    pub fn player_at(&self, point: Point) -> Option<&Occupant> {
        self.first_at(point, |o| o.kind.is_player())
    }

    pub fn boss_at(&self, point: Point) -> Option<&Occupant> {
        self.first_at(point, |o| o.kind.is_boss())
    }

    /// Whether a creature other than `except` claimed `point` for its step.
    pub fn is_reserved(&self, point: Point, except: EntityId) -> bool {
        self.occupants
            .iter()
            .any(|o| o.id != except && o.next == Some(point))
    }

    /// Record a claim made after the view was built.
    pub fn claim(&mut self, id: EntityId, next: Option<Point>) {
        if let Some(o) = self.occupants.iter_mut().find(|o| o.id == id) {
            o.next = next;
        }
    }

    /// Live bombs dropped by `owner`.
    pub fn bombs_owned_by(&self, owner: EntityId) -> usize {
        self.occupants
            .iter()
            .filter(|o| o.kind == EntityKind::Bomb && o.bomb_owner == Some(owner))
            .count()
    }

    /// Monster-kind creatures other than `except`.
    pub fn other_monsters(&self, except: EntityId) -> impl Iterator<Item = &Occupant> {
        self.occupants
            .iter()
            .filter(move |o| o.id != except && o.kind.is_monster())
    }
}

impl BlastField for Occupancy {
    fn tile_at(&self, point: Point) -> Option<FieldTile> {
        Occupancy::tile_at(self, point).and_then(|o| match o.kind {
            EntityKind::Tile(tile_type) => Some(FieldTile { id: o.id, tile_type, destroyed: o.destroyed }),
            _ => None,
        })
    }

    fn bomb_at(&self, point: Point) -> Option<FieldBomb> {
        Occupancy::bomb_at(self, point).map(|o| FieldBomb { id: o.id, destroyed: o.destroyed })
    }

    fn in_bounds(&self, point: Point) -> bool {
        Occupancy::in_bounds(self, point)
    }
}

/// System-side occupancy access.
#[derive(SystemParam)]
pub struct GridScan<'w, 's> {
    live: Res<'w, LiveCollections>,
    arena: Res<'w, Arena>,
    bodies: Query<'w, 's, OccupantData>,
}

impl GridScan<'_, '_> {
    pub fn occupancy(&self) -> Occupancy {
        let occupants = self
            .live
            .entities()
            .filter_map(|(_, entity)| self.bodies.get(entity).ok().map(occupant))
            .collect();
        Occupancy::new(*self.arena, occupants)
    }
}

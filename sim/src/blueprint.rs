//! Entity construction and the deferred mutation queues.
//!
//! Anything that wants an entity added or removed goes through the
//! `EntityQueue` resource. Identity is handed out at enqueue time so callers
//! can refer to the entity before it is live; the ECS entity itself is only
//! spawned when `Game` flushes the additions at the start of the next tick.

use crate::components::*;
use crate::config::ArchetypeConfig;
use crate::grid::{self, Direction, Point};
use crate::state::StateMachine;
use bevy_ecs::prelude::*;
use std::sync::Arc;

/// Kind-specific data carried by a blueprint.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Player { index: PlayerIndex, bomb: Option<Arc<ArchetypeConfig>> },
    Bomb(Bomb),
    Explosion(Explosion),
    Projectile(Projectile),
    Points(Points),
}

/// Everything needed to materialize one entity.
#[derive(Debug, Clone)]
pub struct Blueprint {
    pub kind: EntityKind,
    pub archetype: Arc<ArchetypeConfig>,
    pub position: Point,
    pub heading: Direction,
    pub payload: Payload,
}

impl Blueprint {
    fn new(kind: EntityKind, archetype: Arc<ArchetypeConfig>, position: Point) -> Self {
        Self { kind, archetype, position, heading: Direction::None, payload: Payload::None }
    }

    pub fn tile(archetype: Arc<ArchetypeConfig>, tile_type: TileType, position: Point) -> Self {
        Self::new(EntityKind::Tile(tile_type), archetype, position)
    }

    pub fn player(
        archetype: Arc<ArchetypeConfig>,
        index: PlayerIndex,
        position: Point,
        bomb: Option<Arc<ArchetypeConfig>>,
    ) -> Self {
        let mut blueprint = Self::new(EntityKind::Creature(CreatureKind::Player(index)), archetype, position);
        blueprint.payload = Payload::Player { index, bomb };
        blueprint
    }

    pub fn monster(archetype: Arc<ArchetypeConfig>, position: Point, boss: bool) -> Self {
        let kind = if boss { CreatureKind::Boss } else { CreatureKind::Monster };
        Self::new(EntityKind::Creature(kind), archetype, position)
    }

    pub fn bomb(archetype: Arc<ArchetypeConfig>, position: Point, owner: Option<EntityId>, range: u32, fuse: f32) -> Self {
        let mut blueprint = Self::new(EntityKind::Bomb, archetype, position);
        blueprint.payload = Payload::Bomb(Bomb { owner, range, fuse });
        blueprint
    }

    pub fn explosion(archetype: Arc<ArchetypeConfig>, position: Point, direction: Direction) -> Self {
        let mut blueprint = Self::new(EntityKind::Explosion, archetype, position);
        blueprint.heading = direction;
        blueprint.payload = Payload::Explosion(Explosion { direction });
        blueprint
    }

    pub fn projectile(archetype: Arc<ArchetypeConfig>, position: Point, heading: Direction, owner: Option<EntityId>) -> Self {
        let mut blueprint = Self::new(EntityKind::Projectile, archetype, position);
        blueprint.heading = heading;
        blueprint.payload = Payload::Projectile(Projectile { owner });
        blueprint
    }

    pub fn points(archetype: Arc<ArchetypeConfig>, position: Point, value: u32) -> Self {
        let mut blueprint = Self::new(EntityKind::Points, archetype, position);
        blueprint.payload = Payload::Points(Points { value });
        blueprint
    }

    pub fn prop(archetype: Arc<ArchetypeConfig>, prop: PropType, position: Point) -> Self {
        Self::new(EntityKind::Prop(prop), archetype, position)
    }

    pub fn power_up(archetype: Arc<ArchetypeConfig>, power_up: PowerUpType, position: Point) -> Self {
        Self::new(EntityKind::PowerUp(power_up), archetype, position)
    }

    /// Spawn the entity into `world`, with its visual positioned and attached.
    pub fn spawn(self, id: EntityId, world: &mut World, unit_length: f32) -> (Entity, VisualHandle) {
        let mut visual = VisualHandle::for_archetype(&self.archetype, self.kind);
        visual.attach(id);
        visual.position = grid::to_world(self.position, unit_length);

        let mut entity = world.spawn((
            id,
            self.kind,
            GridPosition(self.position),
            Heading(self.heading),
            StateMachine::new(),
            visual.clone(),
        ));

        match self.kind {
            EntityKind::Creature(_) => {
                entity.insert((
                    Creature::new(self.archetype.health, self.archetype.lives, self.position),
                    CpuController,
                ));
            }
            EntityKind::Prop(_) | EntityKind::PowerUp(_) => {
                entity.insert(Collectible::default());
            }
            EntityKind::Tile(_) | EntityKind::Bomb | EntityKind::Points | EntityKind::Projectile | EntityKind::Explosion => {}
        }

        match self.payload {
            Payload::None => {}
            Payload::Player { index, bomb } => {
                let loadout = self.archetype.loadout.unwrap_or_default();
                entity.insert(Player::new(index, &loadout, bomb));
            }
            Payload::Bomb(bomb) => {
                entity.insert(bomb);
            }
            Payload::Explosion(explosion) => {
                entity.insert(explosion);
            }
            Payload::Projectile(projectile) => {
                entity.insert(projectile);
            }
            Payload::Points(points) => {
                entity.insert(points);
            }
        }

        entity.insert(Archetype(self.archetype));
        (entity.id(), visual)
    }
}

/// Pending additions and removals, drained by the orchestrator's flush steps.
#[derive(Resource, Debug, Default)]
pub struct EntityQueue {
    next_id: u64,
    additions: Vec<(EntityId, Blueprint)>,
    removals: Vec<EntityId>,
}

impl EntityQueue {
    /// Enqueue an addition and hand out its identity.
    pub fn add(&mut self, blueprint: Blueprint) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.additions.push((id, blueprint));
        id
    }

    /// Enqueue a removal. Removing an entity that is still pending addition
    /// cancels the addition.
    pub fn remove(&mut self, id: EntityId) {
        let pending = self.additions.len();
        self.additions.retain(|(pending_id, _)| *pending_id != id);
        if self.additions.len() == pending && !self.removals.contains(&id) {
            self.removals.push(id);
        }
    }

    pub fn take_additions(&mut self) -> Vec<(EntityId, Blueprint)> {
        std::mem::take(&mut self.additions)
    }

    pub fn take_removals(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.removals)
    }

    pub fn is_pending_addition(&self, id: EntityId) -> bool {
        self.additions.iter().any(|(pending_id, _)| *pending_id == id)
    }

    /// A bomb waiting to be added at `point`.
    pub fn pending_bomb_at(&self, point: Point) -> bool {
        self.additions
            .iter()
            .any(|(_, b)| b.kind == EntityKind::Bomb && b.position == point)
    }

    pub fn pending_bombs_owned_by(&self, owner: EntityId) -> usize {
        self.additions
            .iter()
            .filter(|(_, b)| matches!(b.payload, Payload::Bomb(Bomb { owner: Some(o), .. }) if o == owner))
            .count()
    }

    pub fn additions(&self) -> usize {
        self.additions.len()
    }

    pub fn removals(&self) -> usize {
        self.removals.len()
    }

    /// Drop pending additions only; queued removals still flush.
    pub fn clear_additions(&mut self) {
        self.additions.clear();
    }

    /// Drop both queues. Identities keep increasing.
    pub fn clear(&mut self) {
        self.additions.clear();
        self.removals.clear();
    }
}

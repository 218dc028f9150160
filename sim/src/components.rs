//! ECS Components for the Blast Arena simulation.
//!
//! Components are data attached to live entities. The closed `EntityKind` sum
//! type tags every entity with its variant; collection routing and transition
//! legality match on it exhaustively.

use crate::config::{ArchetypeConfig, CollisionCategory, CounterSpec, Loadout};
use crate::grid::{Direction, Point};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Stable identity of a simulated entity, assigned when it is enqueued.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerIndex {
    Player1,
    Player2,
}

impl PlayerIndex {
    pub fn slot(self) -> usize {
        match self {
            PlayerIndex::Player1 => 0,
            PlayerIndex::Player2 => 1,
        }
    }

    pub fn from_slot(slot: usize) -> Option<Self> {
        match slot {
            0 => Some(PlayerIndex::Player1),
            1 => Some(PlayerIndex::Player2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreatureKind {
    Player(PlayerIndex),
    Monster,
    /// A monster that other monsters refuse to roam into.
    Boss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileType {
    Wall,
    DestructibleBlock,
    IndestructibleBlock,
}

impl TileType {
    /// Decode a level tile digit. `None` is an unknown code, `Some(None)`
    /// an empty cell.
    pub fn from_code(code: char) -> Option<Option<Self>> {
        match code {
            '0' => Some(None),
            '1' => Some(Some(TileType::Wall)),
            '2' => Some(Some(TileType::DestructibleBlock)),
            '3' => Some(Some(TileType::IndestructibleBlock)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropType {
    Coin,
    Gem,
    /// Grants one extra life.
    Heart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerUpType {
    ExplosionRange,
    BombCount,
    FuseSpeed,
    Shield,
    MoveSpeed,
}

/// The variant of a simulated entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Bomb,
    Creature(CreatureKind),
    Tile(TileType),
    Prop(PropType),
    PowerUp(PowerUpType),
    Points,
    Projectile,
    Explosion,
}

/// The live collection an entity kind is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Bombs,
    Creatures,
    Tiles,
    Props,
    Projectiles,
    Explosions,
    Points,
}

impl EntityKind {
    pub fn collection(&self) -> Collection {
        match self {
            EntityKind::Bomb => Collection::Bombs,
            EntityKind::Creature(_) => Collection::Creatures,
            EntityKind::Tile(_) => Collection::Tiles,
            EntityKind::Prop(_) | EntityKind::PowerUp(_) => Collection::Props,
            EntityKind::Points => Collection::Points,
            EntityKind::Projectile => Collection::Projectiles,
            EntityKind::Explosion => Collection::Explosions,
        }
    }

    pub fn player_index(&self) -> Option<PlayerIndex> {
        match self {
            EntityKind::Creature(CreatureKind::Player(index)) => Some(*index),
            _ => None,
        }
    }

    pub fn is_player(&self) -> bool {
        self.player_index().is_some()
    }

    /// Monsters and bosses.
    pub fn is_monster(&self) -> bool {
        matches!(self, EntityKind::Creature(CreatureKind::Monster | CreatureKind::Boss))
    }

    pub fn is_boss(&self) -> bool {
        matches!(self, EntityKind::Creature(CreatureKind::Boss))
    }

    /// Entities whose touch damages what they touch.
    pub fn is_hazard(&self) -> bool {
        matches!(self, EntityKind::Projectile | EntityKind::Explosion)
    }

    pub fn is_collectible(&self) -> bool {
        matches!(self, EntityKind::Prop(_) | EntityKind::PowerUp(_))
    }

    /// Draw order for the presentation layer.
    pub fn z_order(&self) -> i32 {
        match self {
            EntityKind::Tile(_) => 0,
            EntityKind::Prop(_) | EntityKind::PowerUp(_) => 1,
            EntityKind::Bomb => 2,
            EntityKind::Explosion => 3,
            EntityKind::Creature(_) => 4,
            EntityKind::Projectile => 5,
            EntityKind::Points => 6,
        }
    }

    /// Short label used in snapshots and logs.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Bomb => "Bomb",
            EntityKind::Creature(CreatureKind::Player(_)) => "Player",
            EntityKind::Creature(CreatureKind::Monster) => "Monster",
            EntityKind::Creature(CreatureKind::Boss) => "Boss",
            EntityKind::Tile(TileType::Wall) => "Wall",
            EntityKind::Tile(TileType::DestructibleBlock) => "DestructibleBlock",
            EntityKind::Tile(TileType::IndestructibleBlock) => "IndestructibleBlock",
            EntityKind::Prop(_) => "Prop",
            EntityKind::PowerUp(_) => "PowerUp",
            EntityKind::Points => "Points",
            EntityKind::Projectile => "Projectile",
            EntityKind::Explosion => "Explosion",
        }
    }
}

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// Cell the entity currently occupies.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPosition(pub Point);

/// Current movement / facing direction.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading(pub Direction);

// ============================================================================
// CONFIGURATION COMPONENT
// ============================================================================

/// Shared immutable archetype data.
#[derive(Component, Debug, Clone)]
pub struct Archetype(pub Arc<ArchetypeConfig>);

impl std::ops::Deref for Archetype {
    type Target = ArchetypeConfig;

    fn deref(&self) -> &ArchetypeConfig {
        &self.0
    }
}

// ============================================================================
// CREATURE COMPONENTS
// ============================================================================

/// Health and life bookkeeping for players and monsters.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Creature {
    pub health: i32,
    /// Authoritative life counter. Negative means permanently out.
    pub lives: i32,
    /// Cell being moved into, claimed for the duration of the step.
    pub next_grid_position: Option<Point>,
    /// Where the creature respawns.
    pub spawn_point: Point,
    /// Movement speed scale (sudden death raises it for monsters).
    pub speed_multiplier: f32,
}

impl Creature {
    pub fn new(health: i32, lives: i32, spawn_point: Point) -> Self {
        Self {
            health,
            lives,
            next_grid_position: None,
            spawn_point,
            speed_multiplier: 1.0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.lives >= 0
    }

    pub fn is_moving(&self) -> bool {
        self.next_grid_position.is_some()
    }
}

/// A counter bounded by `max`, with per-increment expiry timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedCounter {
    base: u32,
    current: u32,
    max: u32,
    expiry: Option<f32>,
    timers: Vec<f32>,
}

impl BoundedCounter {
    pub fn new(counter: CounterSpec) -> Self {
        let max = counter.max.max(counter.base);
        Self { base: counter.base, current: counter.base, max, expiry: counter.expiry, timers: Vec::new() }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Raise by one if below the cap. Timed counters start an expiry timer.
    pub fn increment(&mut self) -> bool {
        if self.current >= self.max {
            return false;
        }
        self.current += 1;
        if let Some(expiry) = self.expiry {
            self.timers.push(expiry);
        }
        true
    }

    /// Lower by one, never below the base value.
    pub fn decrement(&mut self) -> bool {
        if self.current <= self.base {
            return false;
        }
        self.current -= 1;
        true
    }

    /// Advance expiry timers; returns whether the value changed.
    pub fn tick(&mut self, dt: f32) -> bool {
        if self.timers.is_empty() {
            return false;
        }
        let mut expired = 0;
        self.timers.retain_mut(|remaining| {
            *remaining -= dt;
            if *remaining <= 0.0 {
                expired += 1;
                false
            } else {
                true
            }
        });
        let mut changed = false;
        for _ in 0..expired {
            changed |= self.decrement();
        }
        changed
    }
}

/// Power-up state of a player.
#[derive(Component, Debug, Clone)]
pub struct Player {
    pub index: PlayerIndex,
    pub range: BoundedCounter,
    pub bombs: BoundedCounter,
    pub fuse: BoundedCounter,
    pub shield: BoundedCounter,
    pub speed: BoundedCounter,
    /// Archetype of the bombs this player drops.
    pub bomb_archetype: Option<Arc<ArchetypeConfig>>,
}

impl Player {
    pub fn new(index: PlayerIndex, loadout: &Loadout, bomb_archetype: Option<Arc<ArchetypeConfig>>) -> Self {
        Self {
            index,
            range: BoundedCounter::new(loadout.range),
            bombs: BoundedCounter::new(loadout.bombs),
            fuse: BoundedCounter::new(loadout.fuse),
            shield: BoundedCounter::new(loadout.shield),
            speed: BoundedCounter::new(loadout.speed),
            bomb_archetype,
        }
    }

    pub fn counter_mut(&mut self, power_up: PowerUpType) -> &mut BoundedCounter {
        match power_up {
            PowerUpType::ExplosionRange => &mut self.range,
            PowerUpType::BombCount => &mut self.bombs,
            PowerUpType::FuseSpeed => &mut self.fuse,
            PowerUpType::Shield => &mut self.shield,
            PowerUpType::MoveSpeed => &mut self.speed,
        }
    }

    pub fn is_shielded(&self) -> bool {
        self.shield.current() > 0
    }

    /// Multiplier on step speed granted by speed power-ups.
    pub fn speed_factor(&self) -> f32 {
        1.0 + 0.25 * self.speed.current() as f32
    }

    /// Multiplier on fuse speed granted by fuse power-ups.
    pub fn fuse_factor(&self) -> f32 {
        1.0 + 0.5 * self.fuse.current() as f32
    }

    /// Advance every counter's expiry timers.
    pub fn tick(&mut self, dt: f32) -> bool {
        let mut changed = false;
        for counter in [&mut self.range, &mut self.bombs, &mut self.fuse, &mut self.shield, &mut self.speed] {
            changed |= counter.tick(dt);
        }
        changed
    }
}

// ============================================================================
// ITEM COMPONENTS
// ============================================================================

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Bomb {
    pub owner: Option<EntityId>,
    pub range: u32,
    /// Seconds until detonation.
    pub fuse: f32,
}

/// One blast segment; the direction picks the destroy animation variant.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Explosion {
    pub direction: Direction,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projectile {
    pub owner: Option<EntityId>,
}

/// Score popup.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Points {
    pub value: u32,
}

/// Pickup state of props and power-ups.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Collectible {
    pub collected_by: Option<EntityId>,
}

// ============================================================================
// VISUAL COMPONENT
// ============================================================================

/// Physics body masks handed to the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicsBody {
    pub category: u32,
    pub collision_mask: u32,
    pub contact_mask: u32,
}

impl PhysicsBody {
    pub fn for_category(category: CollisionCategory) -> Self {
        use CollisionCategory as C;
        let bit = |c: C| match c {
            C::None => 0,
            C::Player => 1 << 0,
            C::Monster => 1 << 1,
            C::Bomb => 1 << 2,
            C::Tile => 1 << 3,
            C::Prop => 1 << 4,
            C::Projectile => 1 << 5,
            C::Explosion => 1 << 6,
        };
        let contacts = match category {
            C::None | C::Tile => 0,
            C::Player => bit(C::Prop) | bit(C::Projectile) | bit(C::Explosion),
            C::Monster | C::Bomb => bit(C::Projectile) | bit(C::Explosion),
            C::Prop => bit(C::Player) | bit(C::Explosion),
            C::Projectile => bit(C::Player) | bit(C::Monster) | bit(C::Bomb),
            C::Explosion => bit(C::Player) | bit(C::Monster) | bit(C::Bomb) | bit(C::Prop),
        };
        let collisions = match category {
            C::Player | C::Monster => bit(C::Tile) | bit(C::Bomb),
            _ => 0,
        };
        Self { category: bit(category), collision_mask: collisions, contact_mask: contacts }
    }
}

/// Sprite and physics-body handle. The presentation layer renders it; the
/// core positions it and reads it back for occupancy and contacts.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualHandle {
    /// Back-reference to the owning entity, set when attached.
    pub owner: Option<EntityId>,
    pub atlas: String,
    pub position: (f32, f32),
    pub z_order: i32,
    pub body: PhysicsBody,
}

impl VisualHandle {
    /// Build a handle for an archetype. Archetypes without sprite metadata
    /// get an atlas named after the archetype.
    pub fn for_archetype(archetype: &ArchetypeConfig, kind: EntityKind) -> Self {
        let atlas = archetype
            .sprite
            .as_ref()
            .map(|sprite| sprite.atlas.clone())
            .unwrap_or_else(|| archetype.name.clone());
        Self {
            owner: None,
            atlas,
            position: (0.0, 0.0),
            z_order: kind.z_order(),
            body: PhysicsBody::for_category(archetype.collision),
        }
    }

    pub fn attach(&mut self, owner: EntityId) {
        self.owner = Some(owner);
    }
}

// ============================================================================
// CONTROLLER COMPONENTS
// ============================================================================

/// Logical input actions. Declaration order is the movement priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    DropBomb,
    Pause,
}

impl Action {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Action::MoveUp => Some(Direction::Up),
            Action::MoveDown => Some(Direction::Down),
            Action::MoveLeft => Some(Direction::Left),
            Action::MoveRight => Some(Direction::Right),
            Action::DropBomb | Action::Pause => None,
        }
    }
}

/// Held input actions of one player.
#[derive(Component, Debug, Clone, Default)]
pub struct PlayerController {
    held: std::collections::BTreeSet<Action>,
}

impl PlayerController {
    pub fn start(&mut self, action: Action) {
        self.held.insert(action);
    }

    pub fn stop(&mut self, action: Action) {
        self.held.remove(&action);
    }

    /// Consume a held drop action. Edge-triggered: one bomb per press.
    pub fn take_drop(&mut self) -> bool {
        self.held.remove(&Action::DropBomb)
    }

    /// Highest-priority held direction.
    pub fn direction(&self) -> Direction {
        self.held
            .iter()
            .find_map(|action| action.direction())
            .unwrap_or(Direction::None)
    }
}

/// Marker for CPU-driven creatures.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct CpuController;

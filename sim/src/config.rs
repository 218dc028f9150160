//! Declarative configuration: archetypes, levels and game tuning.
//!
//! Archetypes are loaded once and shared by `Arc` across every entity spawned
//! from them. Levels describe the tile grid as rows of tile codes plus named
//! placement lists. Locating files on disk is the host's job; this module only
//! turns JSON into validated definitions.

use crate::components::{PowerUpType, PropType, TileType};
use crate::grid::{GridSize, Point};
use crate::state::StateKind;
use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Failures while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("archetype `{0}` is not defined")]
    MissingArchetype(String),
    #[error("archetype `{0}` does not list the Spawn state")]
    MissingSpawnState(String),
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("cannot read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid tile code `{code}` at ({x}, {y})")]
    InvalidTileCode { code: char, x: i32, y: i32 },
    #[error("level row {row} is {width} cells wide, expected {expected}")]
    RaggedGrid { row: usize, width: usize, expected: usize },
    #[error("level places {0} players, at most 2 are supported")]
    TooManyPlayers(usize),
    #[error("placement ({}, {}) lies outside the grid", .0.x, .0.y)]
    OutOfBounds(Point),
}

// ============================================================================
// ARCHETYPES
// ============================================================================

/// Frame range of one animation inside the sprite atlas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationRange {
    pub first: u32,
    pub count: u32,
    /// Playback rate in frames per second.
    pub fps: f32,
    /// Number of times the range plays before the sequence completes.
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

fn default_repeat() -> u32 {
    1
}

impl AnimationRange {
    pub fn new(first: u32, count: u32, fps: f32) -> Self {
        Self { first, count, fps, repeat: 1 }
    }

    /// Seconds until the animation finishes.
    pub fn duration(&self) -> f32 {
        if self.fps <= 0.0 {
            0.0
        } else {
            self.count as f32 * self.repeat.max(1) as f32 / self.fps
        }
    }
}

/// Destroy-animation variants for explosion segments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlastAnimations {
    pub center: AnimationRange,
    pub horizontal: AnimationRange,
    pub vertical: AnimationRange,
}

/// Sprite metadata handed to the presentation layer unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteMeta {
    pub atlas: String,
    pub width: u32,
    pub height: u32,
}

/// Physics category of an archetype's body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionCategory {
    #[default]
    None,
    Player,
    Monster,
    Bomb,
    Tile,
    Prop,
    Projectile,
    Explosion,
}

/// How a monster attacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackStyle {
    #[default]
    None,
    /// Fires the linked projectile archetype along its heading.
    Ranged,
    /// Hits an adjacent player directly.
    Melee,
}

/// Base, cap and optional expiry of one player power-up counter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterSpec {
    pub base: u32,
    pub max: u32,
    /// Seconds a power-up increment lasts. `None` means permanent.
    #[serde(default)]
    pub expiry: Option<f32>,
}

impl CounterSpec {
    pub const fn new(base: u32, max: u32, expiry: Option<f32>) -> Self {
        Self { base, max, expiry }
    }
}

/// Starting power-up counters of a player archetype.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Loadout {
    pub range: CounterSpec,
    pub bombs: CounterSpec,
    pub fuse: CounterSpec,
    pub shield: CounterSpec,
    pub speed: CounterSpec,
}

impl Default for Loadout {
    fn default() -> Self {
        Self {
            range: CounterSpec::new(1, 8, None),
            bombs: CounterSpec::new(1, 8, None),
            fuse: CounterSpec::new(0, 3, None),
            shield: CounterSpec::new(0, 1, Some(10.0)),
            speed: CounterSpec::new(0, 4, Some(20.0)),
        }
    }
}

/// Immutable per-archetype data shared by every instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchetypeConfig {
    pub name: String,
    pub sprite: Option<SpriteMeta>,
    pub animations: HashMap<StateKind, AnimationRange>,
    pub blast_animations: Option<BlastAnimations>,
    pub sounds: HashMap<StateKind, String>,
    /// Movement speed in cells per second.
    pub speed: f32,
    pub health: i32,
    pub lives: i32,
    /// Health lost on every Hit entry.
    pub hit_damage: i32,
    /// States this archetype may enter.
    pub states: Vec<StateKind>,
    pub collision: CollisionCategory,
    pub attack: AttackStyle,
    /// How many cells a ranged attacker looks along its heading.
    pub sight: i32,
    /// Bomb fuse in seconds (bomb archetypes only).
    pub fuse: f32,
    /// Archetype of the bombs a player drops.
    pub bomb: Option<String>,
    /// Archetype of the explosion segments a bomb leaves.
    pub explosion: Option<String>,
    /// Archetype of the projectile a ranged monster fires.
    pub projectile: Option<String>,
    /// Archetype of the score popup left on destruction.
    pub points: Option<String>,
    pub points_value: u32,
    pub loadout: Option<Loadout>,
}

impl Default for ArchetypeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            sprite: None,
            animations: HashMap::new(),
            blast_animations: None,
            sounds: HashMap::new(),
            speed: 4.0,
            health: 1,
            lives: 0,
            hit_damage: 1,
            states: vec![StateKind::Spawn],
            collision: CollisionCategory::None,
            attack: AttackStyle::None,
            sight: 4,
            fuse: 2.0,
            bomb: None,
            explosion: None,
            projectile: None,
            points: None,
            points_value: 0,
            loadout: None,
        }
    }
}

impl ArchetypeConfig {
    /// Whether this archetype may enter `state` at all.
    pub fn allows(&self, state: StateKind) -> bool {
        self.states.contains(&state)
    }

    pub fn animation(&self, state: StateKind) -> Option<&AnimationRange> {
        self.animations.get(&state)
    }

    pub fn sound(&self, state: StateKind) -> Option<&str> {
        self.sounds.get(&state).map(String::as_str)
    }

    /// Seconds needed to cross one cell, `None` for immobile archetypes.
    pub fn step_duration(&self) -> Option<f32> {
        if self.speed > 0.0 {
            Some(1.0 / self.speed)
        } else {
            None
        }
    }
}

/// Every archetype known to a running game, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ArchetypeLibrary {
    archetypes: HashMap<String, Arc<ArchetypeConfig>>,
}

impl ArchetypeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object mapping archetype names to definitions.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, ArchetypeConfig> = serde_json::from_str(json)?;
        let mut library = Self::new();
        for (name, mut archetype) in raw {
            archetype.name = name;
            library.insert(archetype)?;
        }
        library.validate_links()?;
        Ok(library)
    }

    /// Read and parse an archetype file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Register one archetype, replacing any previous one of the same name.
    pub fn insert(&mut self, archetype: ArchetypeConfig) -> Result<Arc<ArchetypeConfig>, ConfigError> {
        if !archetype.allows(StateKind::Spawn) {
            return Err(ConfigError::MissingSpawnState(archetype.name));
        }
        let shared = Arc::new(archetype);
        self.archetypes.insert(shared.name.clone(), Arc::clone(&shared));
        Ok(shared)
    }

    pub fn get(&self, name: &str) -> Result<Arc<ArchetypeConfig>, ConfigError> {
        self.archetypes
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::MissingArchetype(name.to_string()))
    }

    /// Resolve an optional link, failing only when a named link is missing.
    pub fn link(&self, name: Option<&str>) -> Result<Option<Arc<ArchetypeConfig>>, ConfigError> {
        name.map(|n| self.get(n)).transpose()
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    fn validate_links(&self) -> Result<(), ConfigError> {
        for archetype in self.archetypes.values() {
            for link in [&archetype.bomb, &archetype.explosion, &archetype.projectile, &archetype.points] {
                self.link(link.as_deref())?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// LEVELS
// ============================================================================

/// Archetype names used for each tile type of a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub wall: String,
    pub destructible: String,
    pub indestructible: String,
}

impl Theme {
    pub fn archetype_for(&self, tile: TileType) -> &str {
        match tile {
            TileType::Wall => &self.wall,
            TileType::DestructibleBlock => &self.destructible,
            TileType::IndestructibleBlock => &self.indestructible,
        }
    }
}

/// A creature placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub archetype: String,
    pub position: Point,
    /// Monsters only: blocks roaming like a tile does.
    #[serde(default)]
    pub boss: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropPlacement {
    pub archetype: String,
    pub kind: PropType,
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerUpPlacement {
    pub archetype: String,
    pub kind: PowerUpType,
    pub position: Point,
}

/// A loaded level layout.
///
/// Tile rows use one digit per cell: `0` empty, `1` wall,
/// `2` destructible block, `3` indestructible block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDefinition {
    #[serde(default)]
    pub name: String,
    pub rows: Vec<String>,
    pub theme: Theme,
    #[serde(default)]
    pub players: Vec<Placement>,
    #[serde(default)]
    pub monsters: Vec<Placement>,
    #[serde(default)]
    pub props: Vec<PropPlacement>,
    #[serde(default)]
    pub power_ups: Vec<PowerUpPlacement>,
    /// Seconds before sudden death. `None` disables the countdown.
    #[serde(default)]
    pub duration: Option<f32>,
}

impl LevelDefinition {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Grid dimensions; fails on rows of unequal width.
    pub fn size(&self) -> Result<GridSize, ConfigError> {
        let expected = self.rows.first().map(|r| r.chars().count()).unwrap_or(0);
        for (row, line) in self.rows.iter().enumerate() {
            let width = line.chars().count();
            if width != expected {
                return Err(ConfigError::RaggedGrid { row, width, expected });
            }
        }
        Ok(GridSize::new(expected as i32, self.rows.len() as i32))
    }

    /// Every non-empty tile cell with its type, row by row.
    pub fn tiles(&self) -> Result<Vec<(Point, TileType)>, ConfigError> {
        let mut tiles = Vec::new();
        for (y, line) in self.rows.iter().enumerate() {
            for (x, code) in line.chars().enumerate() {
                let (x, y) = (x as i32, y as i32);
                match TileType::from_code(code) {
                    Some(Some(tile)) => tiles.push((Point::new(x, y), tile)),
                    Some(None) => {}
                    None => return Err(ConfigError::InvalidTileCode { code, x, y }),
                }
            }
        }
        Ok(tiles)
    }
}

// ============================================================================
// GAME TUNING
// ============================================================================

/// Orchestrator tuning.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// World units per grid cell.
    pub unit_length: f32,
    /// Deltas below this are treated as zero.
    pub min_delta: f32,
    /// Upper clamp for a single frame's delta, in seconds.
    pub max_delta: f32,
    /// Speed multiplier applied once to monsters when the countdown expires.
    pub sudden_death_multiplier: f32,
    /// Seed for CPU decision making.
    pub seed: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            unit_length: 32.0,
            min_delta: 1.0e-6,
            max_delta: 0.25,
            sudden_death_multiplier: 2.0,
            seed: 0x5eed_b0b5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCHETYPES: &str = r#"{
        "hero": { "states": ["Spawn", "Control", "Hit", "Destroy"], "lives": 2, "health": 3, "bomb": "bomb" },
        "bomb": { "states": ["Spawn", "Destroy"], "fuse": 1.5, "explosion": "blast" },
        "blast": { "states": ["Spawn", "Destroy"], "animations": { "Destroy": { "first": 0, "count": 4, "fps": 8.0 } } }
    }"#;

    #[test]
    fn test_library_parses_and_shares_archetypes() {
        let library = ArchetypeLibrary::from_json_str(ARCHETYPES).unwrap();
        assert_eq!(library.len(), 3);
        let a = library.get("hero").unwrap();
        let b = library.get("hero").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.lives, 2);
        let blast = library.get("blast").unwrap();
        assert!((blast.animation(StateKind::Destroy).unwrap().duration() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_missing_link_is_rejected() {
        let json = r#"{ "hero": { "states": ["Spawn"], "bomb": "nope" } }"#;
        match ArchetypeLibrary::from_json_str(json) {
            Err(ConfigError::MissingArchetype(name)) => assert_eq!(name, "nope"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_archetype_without_spawn_is_rejected() {
        let json = r#"{ "ghost": { "states": ["Roam"] } }"#;
        assert!(matches!(
            ArchetypeLibrary::from_json_str(json),
            Err(ConfigError::MissingSpawnState(_))
        ));
    }

    #[test]
    fn test_malformed_json_propagates() {
        assert!(matches!(
            ArchetypeLibrary::from_json_str("{ not json"),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn test_level_tiles_and_size() {
        let level = LevelDefinition {
            name: "t".into(),
            rows: vec!["111".into(), "102".into(), "131".into()],
            theme: Theme { wall: "w".into(), destructible: "d".into(), indestructible: "i".into() },
            players: vec![],
            monsters: vec![],
            props: vec![],
            power_ups: vec![],
            duration: None,
        };
        assert_eq!(level.size().unwrap(), GridSize::new(3, 3));
        let tiles = level.tiles().unwrap();
        assert_eq!(tiles.len(), 8);
        assert!(tiles.contains(&(Point::new(2, 1), TileType::DestructibleBlock)));
        assert!(tiles.contains(&(Point::new(1, 2), TileType::IndestructibleBlock)));
    }

    #[test]
    fn test_level_rejects_bad_codes_and_ragged_rows() {
        let mut level = LevelDefinition {
            name: String::new(),
            rows: vec!["1x1".into()],
            theme: Theme { wall: "w".into(), destructible: "d".into(), indestructible: "i".into() },
            players: vec![],
            monsters: vec![],
            props: vec![],
            power_ups: vec![],
            duration: None,
        };
        assert!(matches!(level.tiles(), Err(ConfigError::InvalidTileCode { code: 'x', x: 1, y: 0 })));
        level.rows = vec!["11".into(), "1".into()];
        assert!(matches!(level.size(), Err(ConfigError::RaggedGrid { row: 1, .. })));
    }
}

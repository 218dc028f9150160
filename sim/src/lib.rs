//! Blast Arena - Simulation Core
//!
//! A deterministic, grid-based arena simulation: players drop bombs, monsters
//! roam, explosions chain through tiles and bombs. Every entity runs a small
//! state machine whose sequences are timed by the core and presented by the
//! host. Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod blueprint;
pub mod components;
pub mod config;
pub mod contact;
pub mod delegate;
pub mod explosion;
pub mod grid;
pub mod presentation;
pub mod sequence;
pub mod spatial;
pub mod state;
pub mod systems;
pub mod world;

pub use api::Game;
pub use blueprint::{Blueprint, EntityQueue};
pub use components::*;
pub use config::{ArchetypeConfig, ArchetypeLibrary, ConfigError, GameConfig, LevelDefinition};
pub use contact::ContactOutcome;
pub use delegate::EntityDelegate;
pub use explosion::{propagate, BlastPlan, BlastSegment};
pub use grid::{Direction, GridSize, Point};
pub use presentation::{HudStatus, LevelOutcome, PresentationEvent};
pub use state::{StateKind, StateMachine, TransitionError};
pub use world::Snapshot;

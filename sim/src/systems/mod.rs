//! ECS Systems for the Blast Arena simulation.
//!
//! Three systems run every tick, chained in this order on a single-threaded
//! executor:
//!
//! - `cpu_controller_system` - monster roaming and attack decisions
//! - `player_controller_system` - held input into heading and bomb drops
//! - `state_machine_system` - forces Spawn, starts sequences and grid steps
//!
//! Controllers settle intent before the state machine advances, so input
//! takes effect on the tick it arrives. None of them mutate the live
//! collections; additions go through `EntityQueue`.

pub mod cpu_controller;
pub mod player_controller;
pub mod state_machine;

pub use cpu_controller::*;
pub use player_controller::*;
pub use state_machine::*;

use bevy_ecs::prelude::*;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct DeltaTime(pub f32);

//! Player controller - held input into heading and bomb drops.

use super::DeltaTime;
use crate::blueprint::{Blueprint, EntityQueue};
use crate::components::*;
use crate::grid::Point;
use crate::presentation::{HudStatus, PresentationEvent, PresentationOutbox};
use crate::spatial::{GridScan, LiveCollections, Occupancy};
use crate::state::StateMachine;
use bevy_ecs::prelude::*;
use log::debug;

/// Enqueue a bomb under the player.
///
/// Fails when the cell already holds a bomb, live or pending, or when the
/// player's bombs in play already reached its bomb counter.
pub fn drop_bomb(
    occupancy: &Occupancy,
    queue: &mut EntityQueue,
    owner: EntityId,
    position: Point,
    player: &Player,
) -> bool {
    if occupancy.bomb_at(position).is_some() || queue.pending_bomb_at(position) {
        return false;
    }
    let in_play = occupancy.bombs_owned_by(owner) + queue.pending_bombs_owned_by(owner);
    if in_play >= player.bombs.current() as usize {
        return false;
    }
    let Some(archetype) = player.bomb_archetype.clone() else {
        return false;
    };
    let fuse = archetype.fuse / player.fuse_factor();
    let id = queue.add(Blueprint::bomb(archetype, position, Some(owner), player.range.current(), fuse));
    debug!("{:?} dropped bomb {:?} at ({}, {})", owner, id, position.x, position.y);
    true
}

/// Apply held actions to every player-driven creature.
#[allow(clippy::type_complexity)]
pub fn player_controller_system(
    dt: Res<DeltaTime>,
    live: Res<LiveCollections>,
    mut queue: ResMut<EntityQueue>,
    mut outbox: ResMut<PresentationOutbox>,
    mut set: ParamSet<(
        GridScan,
        Query<(
            &GridPosition,
            &mut Heading,
            &StateMachine,
            &Creature,
            &mut Player,
            &mut PlayerController,
        )>,
    )>,
) {
    let occupancy = set.p0().occupancy();
    let mut players = set.p1();

    for (id, entity) in live.entities() {
        let Ok((position, mut heading, machine, creature, mut player, mut controller)) = players.get_mut(entity) else {
            continue;
        };

        if player.tick(dt.0) {
            outbox.push(PresentationEvent::Hud(HudStatus::new(&player, creature.lives)));
        }

        if !machine.is_controllable() {
            continue;
        }
        if controller.take_drop() {
            drop_bomb(&occupancy, &mut queue, id, position.0, &player);
        }
        // Mid-move: keep the heading of the step in flight.
        if creature.is_moving() || machine.is_updating() {
            continue;
        }
        heading.0 = controller.direction();
    }
}

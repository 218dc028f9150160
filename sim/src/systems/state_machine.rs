//! State machine system - forces Spawn, starts sequences and grid steps.

use super::DeltaTime;
use crate::components::*;
use crate::config::{ArchetypeConfig, GameConfig};
use crate::grid::{self, Direction, Point};
use crate::presentation::{AudioStatus, PresentationEvent, PresentationOutbox};
use crate::sequence::{self, Timeline};
use crate::spatial::{GridScan, LiveCollections, Occupancy};
use crate::state::{apply_entry_effects, StateKind, StateMachine, TransitionContext};
use bevy_ecs::prelude::*;
use log::{debug, warn};

/// Move an entity's machine into `next`, applying the entry side effects.
///
/// Illegal transitions are logged and leave the machine unchanged. Entering a
/// state while a sequence is in flight abandons that sequence: any step claim
/// is released and the host is told to cancel it.
pub fn transition(
    id: EntityId,
    kind: EntityKind,
    archetype: &ArchetypeConfig,
    machine: &mut StateMachine,
    creature: Option<&mut Creature>,
    outbox: &mut PresentationOutbox,
    next: StateKind,
) -> bool {
    let ctx = TransitionContext::new(kind, creature.as_deref());
    match machine.enter(&ctx, archetype, next) {
        Ok(entered) => {
            if let Some(old) = entered.interrupted {
                debug!("{:?}: {:?} sequence interrupted by {:?}", id, old.kind(), next);
                outbox.push(PresentationEvent::CancelSequence { id, state: old.kind() });
            }
            if let Some(creature) = creature {
                creature.next_grid_position = None;
                apply_entry_effects(next, creature, archetype);
            }
            true
        }
        Err(err) => {
            warn!("{:?}: {}", id, err);
            false
        }
    }
}

/// Whether the entity may not step into `target`.
pub fn step_blocked(occupancy: &Occupancy, id: EntityId, kind: EntityKind, target: Point) -> bool {
    if !occupancy.in_bounds(target) || occupancy.tile_at(target).is_some() {
        return true;
    }
    match kind {
        EntityKind::Creature(CreatureKind::Player(_)) => occupancy.bomb_at(target).is_some(),
        EntityKind::Creature(_) => {
            occupancy.bomb_at(target).is_some()
                || occupancy.boss_at(target).is_some_and(|boss| boss.id != id)
                || occupancy.is_reserved(target, id)
        }
        _ => false,
    }
}

/// Seconds needed for one grid step, `None` for immobile archetypes.
pub fn step_duration(archetype: &ArchetypeConfig, creature: Option<&Creature>, player: Option<&Player>) -> Option<f32> {
    let base = archetype.step_duration()?;
    let speed = creature.map_or(1.0, |c| c.speed_multiplier) * player.map_or(1.0, Player::speed_factor);
    Some(base / speed.max(f32::EPSILON))
}

/// Advance every live entity's state.
///
/// Elapsed sequences are completed on the timeline first; they are
/// dispatched by the orchestrator once the schedule finished. Busy states
/// are skipped, so repeated ticks never start a second sequence.
#[allow(clippy::type_complexity)]
pub fn state_machine_system(
    dt: Res<DeltaTime>,
    config: Res<GameConfig>,
    audio: Res<AudioStatus>,
    live: Res<LiveCollections>,
    mut timeline: ResMut<Timeline>,
    mut outbox: ResMut<PresentationOutbox>,
    mut set: ParamSet<(
        GridScan,
        Query<(
            &EntityKind,
            &Archetype,
            &GridPosition,
            &mut Heading,
            &mut StateMachine,
            Option<&mut Creature>,
            Option<&Player>,
            Option<&Bomb>,
            Option<&Explosion>,
        )>,
    )>,
) {
    timeline.advance(dt.0);
    let mut occupancy = set.p0().occupancy();
    let mut bodies = set.p1();

    for (id, entity) in live.entities() {
        let Ok((kind, archetype, position, mut heading, mut machine, mut creature, player, bomb, explosion)) =
            bodies.get_mut(entity)
        else {
            continue;
        };

        // First update: nothing is current yet.
        if machine.current().is_none()
            && !transition(id, *kind, archetype, &mut machine, creature.as_deref_mut(), &mut outbox, StateKind::Spawn)
        {
            continue;
        }

        let Some(state) = machine.current_mut() else {
            continue;
        };
        if state.is_updating() {
            continue;
        }
        let state_kind = state.kind();

        if state_kind.is_stepping() {
            if heading.0 == Direction::None {
                continue;
            }
            let Some(duration) = step_duration(archetype, creature.as_deref(), player) else {
                continue;
            };
            let target = position.0.step(heading.0);
            if step_blocked(&occupancy, id, *kind, target) {
                if kind.is_monster() {
                    heading.0 = Direction::None;
                }
                continue;
            }
            if !state.begin_step(target) {
                continue;
            }
            if let Some(creature) = creature.as_deref_mut() {
                creature.next_grid_position = Some(target);
            }
            occupancy.claim(id, Some(target));
            outbox.push(PresentationEvent::MoveTo {
                id,
                position: grid::to_world(target, config.unit_length),
                duration,
            });
            let animation = sequence::animation_for(archetype, state_kind, None);
            sequence::start_sequence(&mut timeline, &mut outbox, &audio, id, state, archetype, animation, duration);
        } else if state.begin() {
            let animation = sequence::animation_for(archetype, state_kind, explosion.map(|e| e.direction));
            let duration = match (state_kind, bomb, animation) {
                (StateKind::Spawn, Some(bomb), _) => bomb.fuse,
                (_, _, Some(animation)) => animation.duration(),
                // Unanimated attacks still take a step's time to wind up.
                (StateKind::Attack, _, None) => step_duration(archetype, creature.as_deref(), player).unwrap_or(0.0),
                _ => 0.0,
            };
            debug!("{:?}: {:?} sequence started ({:.2}s)", id, state_kind, duration);
            sequence::start_sequence(&mut timeline, &mut outbox, &audio, id, state, archetype, animation, duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnimationRange;
    use crate::grid::GridSize;
    use crate::spatial::{Arena, Occupant};
    use std::sync::Arc;

    fn world_with(archetype: ArchetypeConfig, kind: EntityKind) -> (World, Schedule, Entity) {
        let mut world = World::new();
        world.insert_resource(DeltaTime(0.1));
        world.insert_resource(GameConfig::default());
        world.insert_resource(AudioStatus::default());
        world.insert_resource(Timeline::default());
        world.insert_resource(PresentationOutbox::default());
        world.insert_resource(Arena::default());
        let entity = world
            .spawn((
                EntityId(1),
                kind,
                GridPosition(Point::new(1, 1)),
                Heading::default(),
                StateMachine::new(),
                Archetype(Arc::new(archetype)),
            ))
            .id();
        let mut live = LiveCollections::default();
        live.insert(EntityId(1), entity, kind);
        world.insert_resource(live);

        let mut schedule = Schedule::default();
        schedule.add_systems(state_machine_system);
        (world, schedule, entity)
    }

    #[test]
    fn test_first_update_forces_spawn() {
        let archetype = ArchetypeConfig {
            states: vec![StateKind::Spawn, StateKind::Destroy],
            animations: [(StateKind::Spawn, AnimationRange::new(0, 4, 4.0))].into_iter().collect(),
            ..Default::default()
        };
        let (mut world, mut schedule, entity) = world_with(archetype, EntityKind::Tile(TileType::Wall));
        schedule.run(&mut world);
        let machine = world.get::<StateMachine>(entity).unwrap();
        assert_eq!(machine.current_kind(), Some(StateKind::Spawn));
        assert!(machine.is_updating());
        assert_eq!(world.resource::<Timeline>().pending(), 1);
    }

    #[test]
    fn test_busy_state_starts_only_one_sequence() {
        let archetype = ArchetypeConfig {
            states: vec![StateKind::Spawn],
            animations: [(StateKind::Spawn, AnimationRange::new(0, 10, 1.0))].into_iter().collect(),
            ..Default::default()
        };
        let (mut world, mut schedule, _) = world_with(archetype, EntityKind::Points);
        for _ in 0..5 {
            schedule.run(&mut world);
        }
        let animations = world
            .resource::<PresentationOutbox>()
            .iter()
            .filter(|e| matches!(e, PresentationEvent::PlayAnimation { .. }))
            .count();
        assert_eq!(animations, 1);
        assert_eq!(world.resource::<Timeline>().pending(), 1);
    }

    #[test]
    fn test_bomb_spawn_lasts_its_fuse() {
        let archetype = ArchetypeConfig { states: vec![StateKind::Spawn, StateKind::Destroy], ..Default::default() };
        let (mut world, mut schedule, entity) = world_with(archetype, EntityKind::Bomb);
        world.entity_mut(entity).insert(Bomb { owner: None, range: 1, fuse: 0.25 });
        schedule.run(&mut world);
        let mut timeline = world.resource_mut::<Timeline>();
        assert!(timeline.drain_ready().is_empty());
        timeline.advance(0.3);
        assert_eq!(timeline.drain_ready().len(), 1);
    }

    #[test]
    fn test_monster_blocked_by_reserved_cell() {
        let monster = EntityKind::Creature(CreatureKind::Monster);
        let claimed = Point::new(2, 1);
        let occupancy = Occupancy::new(
            Arena { size: Some(GridSize::new(5, 5)) },
            vec![Occupant {
                id: EntityId(2),
                kind: monster,
                position: Point::new(3, 1),
                next: Some(claimed),
                destroyed: false,
                alive: true,
                bomb_owner: None,
            }],
        );
        assert!(step_blocked(&occupancy, EntityId(1), monster, claimed));
        let player = EntityKind::Creature(CreatureKind::Player(PlayerIndex::Player1));
        assert!(!step_blocked(&occupancy, EntityId(1), player, claimed));
        assert!(step_blocked(&occupancy, EntityId(1), player, Point::new(-1, 0)));
    }

    #[test]
    fn test_speed_multipliers_shorten_steps() {
        let archetype = ArchetypeConfig { speed: 4.0, ..Default::default() };
        let mut creature = Creature::new(1, 0, Point::new(0, 0));
        assert_eq!(step_duration(&archetype, Some(&creature), None), Some(0.25));
        creature.speed_multiplier = 2.0;
        assert_eq!(step_duration(&archetype, Some(&creature), None), Some(0.125));
        let still = ArchetypeConfig { speed: 0.0, ..Default::default() };
        assert_eq!(step_duration(&still, None, None), None);
    }
}

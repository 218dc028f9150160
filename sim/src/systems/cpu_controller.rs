//! CPU controller - roaming and attack decisions for monsters.
//!
//! A monster that finished spawning is pushed into Roam. While roaming and
//! idle it attacks when its attack style finds a player, otherwise it picks
//! a fresh direction whenever it has none.
//!
//! The direction filter skips any direction whose projected step overlaps
//! another monster's projected step. Two monsters walking into each other
//! can therefore leave one with no direction at all; it simply stands still
//! until the other one moves on.

use super::state_machine::transition;
use crate::components::*;
use crate::config::AttackStyle;
use crate::grid::{CellRect, Direction, Point};
use crate::presentation::PresentationOutbox;
use crate::spatial::{GridScan, LiveCollections, Occupancy};
use crate::state::{StateKind, StateMachine, TransitionContext};
use bevy_ecs::prelude::*;
use log::debug;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Seeded random source for CPU decisions.
#[derive(Resource, Debug, Clone)]
pub struct SimRng(pub Pcg32);

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self(Pcg32::seed_from_u64(seed))
    }
}

/// Direction towards an attackable player, if any.
///
/// Ranged attackers look along each axis up to `sight` cells, current
/// heading first; tiles block the line. Melee attackers need the player in
/// an adjacent cell.
pub fn find_target(
    occupancy: &Occupancy,
    position: Point,
    heading: Direction,
    style: AttackStyle,
    sight: i32,
) -> Option<Direction> {
    let attackable = |cell: Point| occupancy.player_at(cell).is_some_and(|p| p.alive && !p.destroyed);
    match style {
        AttackStyle::None => None,
        AttackStyle::Melee => Direction::CARDINAL
            .into_iter()
            .find(|d| attackable(position.step(*d))),
        AttackStyle::Ranged => {
            let order = std::iter::once(heading)
                .filter(|d| *d != Direction::None)
                .chain(Direction::CARDINAL.into_iter().filter(move |d| *d != heading));
            for direction in order {
                for distance in 1..=sight {
                    let cell = position.offset(direction, distance);
                    if !occupancy.in_bounds(cell) || occupancy.tile_at(cell).is_some() {
                        break;
                    }
                    if attackable(cell) {
                        return Some(direction);
                    }
                }
            }
            None
        }
    }
}

/// Directions a monster at `position` may start roaming in.
pub fn roam_directions(occupancy: &Occupancy, id: EntityId, position: Point) -> Vec<Direction> {
    Direction::CARDINAL
        .into_iter()
        .filter(|d| {
            let cell = position.step(*d);
            occupancy.in_bounds(cell)
                && occupancy.tile_at(cell).is_none()
                && occupancy.boss_at(cell).map_or(true, |boss| boss.id == id)
        })
        .filter(|d| {
            let projected = CellRect::spanning(position, position.step(*d));
            !occupancy
                .other_monsters(id)
                .any(|other| other.projected_area().intersects(&projected))
        })
        .collect()
}

/// Roaming decisions for every CPU-driven creature.
#[allow(clippy::type_complexity)]
pub fn cpu_controller_system(
    live: Res<LiveCollections>,
    mut rng: ResMut<SimRng>,
    mut outbox: ResMut<PresentationOutbox>,
    mut set: ParamSet<(
        GridScan,
        Query<
            (
                &EntityKind,
                &Archetype,
                &GridPosition,
                &mut Heading,
                &mut StateMachine,
                Option<&mut Creature>,
            ),
            With<CpuController>,
        >,
    )>,
) {
    let occupancy = set.p0().occupancy();
    let mut bodies = set.p1();

    for (id, entity) in live.entities() {
        let Ok((kind, archetype, position, mut heading, mut machine, mut creature)) = bodies.get_mut(entity) else {
            continue;
        };
        let Some(state) = machine.current() else {
            continue;
        };
        if !state.is_idle() {
            continue;
        }
        let (current, finished) = (state.kind(), state.is_finished());
        let ctx = TransitionContext::new(*kind, creature.as_deref());

        if current != StateKind::Roam {
            if finished && machine.check(&ctx, archetype, StateKind::Roam).is_ok() {
                transition(id, *kind, archetype, &mut machine, creature.as_deref_mut(), &mut outbox, StateKind::Roam);
            }
            continue;
        }

        if let Some(direction) = find_target(&occupancy, position.0, heading.0, archetype.attack, archetype.sight) {
            if machine.check(&ctx, archetype, StateKind::Attack).is_ok() {
                heading.0 = direction;
                transition(id, *kind, archetype, &mut machine, creature.as_deref_mut(), &mut outbox, StateKind::Attack);
                continue;
            }
        }

        if heading.0 == Direction::None {
            let choices = roam_directions(&occupancy, id, position.0);
            if choices.is_empty() {
                debug!("{:?}: no roaming direction available", id);
            } else {
                heading.0 = choices[rng.0.random_range(0..choices.len())];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridSize;
    use crate::spatial::{Arena, Occupant};

    fn body(id: u64, kind: EntityKind, x: i32, y: i32) -> Occupant {
        Occupant {
            id: EntityId(id),
            kind,
            position: Point::new(x, y),
            next: None,
            destroyed: false,
            alive: true,
            bomb_owner: None,
        }
    }

    fn field(occupants: Vec<Occupant>) -> Occupancy {
        Occupancy::new(Arena { size: Some(GridSize::new(7, 7)) }, occupants)
    }

    const MONSTER: EntityKind = EntityKind::Creature(CreatureKind::Monster);
    const PLAYER: EntityKind = EntityKind::Creature(CreatureKind::Player(PlayerIndex::Player1));

    #[test]
    fn test_roam_excludes_tiles_bosses_and_bounds() {
        let occupancy = field(vec![
            body(1, MONSTER, 0, 3),
            body(2, EntityKind::Tile(TileType::Wall), 1, 3),
            body(3, EntityKind::Creature(CreatureKind::Boss), 0, 2),
        ]);
        assert_eq!(roam_directions(&occupancy, EntityId(1), Point::new(0, 3)), vec![Direction::Down]);
    }

    #[test]
    fn test_roam_avoids_other_monsters_projection() {
        let mut other = body(2, MONSTER, 5, 3);
        other.next = Some(Point::new(4, 3));
        let occupancy = field(vec![body(1, MONSTER, 3, 3), other]);
        let choices = roam_directions(&occupancy, EntityId(1), Point::new(3, 3));
        assert!(!choices.contains(&Direction::Right));
        assert_eq!(choices.len(), 3);
    }

    #[test]
    fn test_converging_monsters_can_jam() {
        // The other monster claimed this monster's own cell.
        let mut other = body(2, MONSTER, 3, 2);
        other.next = Some(Point::new(3, 3));
        let occupancy = field(vec![body(1, MONSTER, 3, 3), other]);
        assert!(roam_directions(&occupancy, EntityId(1), Point::new(3, 3)).is_empty());
    }

    #[test]
    fn test_ranged_sight_is_blocked_by_tiles() {
        let occupancy = field(vec![body(1, PLAYER, 4, 0), body(2, EntityKind::Tile(TileType::Wall), 0, 2)]);
        let origin = Point::new(0, 0);
        assert_eq!(find_target(&occupancy, origin, Direction::None, AttackStyle::Ranged, 4), Some(Direction::Right));
        assert_eq!(find_target(&occupancy, origin, Direction::None, AttackStyle::Ranged, 3), None);
        let hidden = field(vec![body(1, PLAYER, 0, 4), body(2, EntityKind::Tile(TileType::Wall), 0, 2)]);
        assert_eq!(find_target(&hidden, origin, Direction::Down, AttackStyle::Ranged, 6), None);
    }

    #[test]
    fn test_ranged_looks_along_every_axis_heading_first() {
        let origin = Point::new(3, 3);
        let below = field(vec![body(1, PLAYER, 3, 5)]);
        assert_eq!(find_target(&below, origin, Direction::Right, AttackStyle::Ranged, 6), Some(Direction::Down));

        let both = field(vec![body(1, PLAYER, 3, 5), body(2, PLAYER, 5, 3)]);
        assert_eq!(find_target(&both, origin, Direction::Right, AttackStyle::Ranged, 6), Some(Direction::Right));
        assert_eq!(find_target(&both, origin, Direction::Down, AttackStyle::Ranged, 6), Some(Direction::Down));
    }

    #[test]
    fn test_melee_needs_adjacent_live_player() {
        let mut gone = body(1, PLAYER, 2, 1);
        gone.destroyed = true;
        let occupancy = field(vec![gone]);
        assert_eq!(find_target(&occupancy, Point::new(2, 2), Direction::None, AttackStyle::Melee, 1), None);
        let occupancy = field(vec![body(1, PLAYER, 2, 1)]);
        assert_eq!(find_target(&occupancy, Point::new(2, 2), Direction::None, AttackStyle::Melee, 1), Some(Direction::Up));
        assert_eq!(find_target(&occupancy, Point::new(2, 2), Direction::None, AttackStyle::None, 1), None);
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut a = SimRng::seeded(7);
        let mut b = SimRng::seeded(7);
        let xs: Vec<u32> = (0..8).map(|_| a.0.random_range(0..100)).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.0.random_range(0..100)).collect();
        assert_eq!(xs, ys);
    }
}

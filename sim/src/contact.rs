//! Contact resolution.
//!
//! The physics layer lives with the host; it reports pairs of touching
//! entities through `Game::begin_contact`. `Game::grid_contacts` derives the
//! same pairs from shared grid cells for hosts without a physics engine.

use crate::api::Game;
use crate::components::*;
use crate::state::{StateKind, StateMachine};
use log::debug;
use serde::Serialize;

/// Result of one reported contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContactOutcome {
    /// The pair has no interaction rule.
    Ignored,
    /// A hazard touched a target that is destroyed, already hit, shielded, or
    /// has no state to react with.
    Unaffected { hazard: EntityId, target: EntityId },
    /// The target entered `effect`; `spent` is set when the hazard was a
    /// projectile that got destroyed by the impact.
    Struck { hazard: EntityId, target: EntityId, effect: StateKind, spent: bool },
    Collected { item: EntityId, collector: EntityId },
}

impl Game {
    /// Resolve a contact between two live entities, in either order.
    pub fn begin_contact(&mut self, a: EntityId, b: EntityId) -> ContactOutcome {
        let (Some(kind_a), Some(kind_b)) = (self.kind_of(a), self.kind_of(b)) else {
            return ContactOutcome::Ignored;
        };
        match (kind_a.is_hazard(), kind_b.is_hazard()) {
            (true, false) => return self.hazard_contact(a, kind_a, b, kind_b),
            (false, true) => return self.hazard_contact(b, kind_b, a, kind_a),
            (true, true) => return ContactOutcome::Ignored,
            (false, false) => {}
        }
        if kind_a.is_collectible() && kind_b.is_player() {
            self.collect(a, b)
        } else if kind_b.is_collectible() && kind_a.is_player() {
            self.collect(b, a)
        } else {
            ContactOutcome::Ignored
        }
    }

    /// Resolve every hazard and pickup pair sharing a grid cell, in live order.
    pub fn grid_contacts(&mut self) -> Vec<ContactOutcome> {
        let occupancy = self.occupancy();
        let mut pairs = Vec::new();
        for first in occupancy.occupants() {
            if !first.kind.is_hazard() && !first.kind.is_collectible() {
                continue;
            }
            for second in occupancy.occupants() {
                if second.id == first.id || second.position != first.position {
                    continue;
                }
                let relevant = if first.kind.is_hazard() {
                    matches!(
                        second.kind,
                        EntityKind::Creature(_) | EntityKind::Bomb | EntityKind::Prop(_) | EntityKind::PowerUp(_)
                    )
                } else {
                    second.kind.is_player()
                };
                if relevant {
                    pairs.push((first.id, second.id));
                }
            }
        }
        pairs
            .into_iter()
            .map(|(a, b)| self.begin_contact(a, b))
            .filter(|outcome| *outcome != ContactOutcome::Ignored)
            .collect()
    }

    /// Resolve a projectile against whatever shares its cell.
    ///
    /// Runs when a step lands, ahead of the flight check that may end it.
    pub(crate) fn impact(&mut self, projectile: EntityId) -> Vec<ContactOutcome> {
        let Some(position) = self.position_of(projectile) else {
            return Vec::new();
        };
        let targets: Vec<EntityId> = self
            .occupancy()
            .occupants()
            .iter()
            .filter(|o| o.id != projectile && o.position == position && !o.kind.is_hazard())
            .map(|o| o.id)
            .collect();
        let mut outcomes = Vec::new();
        for target in targets {
            if self.component::<StateMachine>(projectile).is_some_and(StateMachine::is_destroyed) {
                break;
            }
            let outcome = self.begin_contact(projectile, target);
            if outcome != ContactOutcome::Ignored {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    fn hazard_contact(
        &mut self,
        hazard: EntityId,
        hazard_kind: EntityKind,
        target: EntityId,
        target_kind: EntityKind,
    ) -> ContactOutcome {
        if matches!(target_kind, EntityKind::Tile(_) | EntityKind::Points) {
            return ContactOutcome::Ignored;
        }
        // Explosions spend their whole life in Destroy; projectiles are spent by it.
        if hazard_kind == EntityKind::Projectile {
            let spent = self.component::<StateMachine>(hazard).is_some_and(StateMachine::is_destroyed);
            let own = self.component::<Projectile>(hazard).and_then(|p| p.owner) == Some(target);
            if spent || own {
                return ContactOutcome::Ignored;
            }
        }

        let Some(effect) = self.strike(target) else {
            return ContactOutcome::Unaffected { hazard, target };
        };
        let spent = hazard_kind == EntityKind::Projectile && self.transition(hazard, StateKind::Destroy);
        debug!("{:?} struck {:?} into {:?}", hazard, target, effect);
        ContactOutcome::Struck { hazard, target, effect, spent }
    }

    /// Apply a hit to `target`, returning the state it entered.
    ///
    /// Creatures take a Hit, or are destroyed outright when their archetype
    /// has no Hit state. Bombs are set off, props disintegrate.
    pub(crate) fn strike(&mut self, target: EntityId) -> Option<StateKind> {
        let kind = self.kind_of(target)?;
        let machine = self.component::<StateMachine>(target)?;
        if machine.is_destroyed() || machine.is_hit() {
            return None;
        }
        if self.component::<Player>(target).is_some_and(Player::is_shielded) {
            return None;
        }
        let choices: &[StateKind] = match kind {
            EntityKind::Creature(_) => &[StateKind::Hit, StateKind::Destroy],
            EntityKind::Bomb => &[StateKind::Destroy],
            EntityKind::Prop(_) | EntityKind::PowerUp(_) => &[StateKind::Disintegrate, StateKind::Destroy],
            _ => &[],
        };
        let effect = choices.iter().copied().find(|state| self.allows(target, *state))?;
        self.transition(target, effect).then_some(effect)
    }

    fn collect(&mut self, item: EntityId, collector: EntityId) -> ContactOutcome {
        let item_done = self.component::<StateMachine>(item).is_some_and(|m| m.is_destroyed());
        let collector_gone = self
            .component::<StateMachine>(collector)
            .map_or(true, |m| m.is_destroyed());
        let taken = self.component::<Collectible>(item).is_some_and(|c| c.collected_by.is_some());
        if item_done || collector_gone || taken || !self.allows(item, StateKind::Destroy) {
            return ContactOutcome::Ignored;
        }
        if let Some(mut collectible) = self.component_mut::<Collectible>(item) {
            collectible.collected_by = Some(collector);
        }
        self.transition(item, StateKind::Destroy);
        debug!("{:?} collected {:?}", collector, item);
        ContactOutcome::Collected { item, collector }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::Blueprint;
    use crate::config::{ArchetypeConfig, ArchetypeLibrary};
    use crate::grid::{Direction, Point};
    use std::sync::Arc;

    fn game() -> Game {
        let library = ArchetypeLibrary::from_json_str(
            r#"{
                "hero": { "states": ["Spawn", "Control", "Hit", "Destroy"], "health": 2, "lives": 1,
                          "animations": { "Hit": { "first": 0, "count": 4, "fps": 4.0 } } },
                "grunt": { "states": ["Spawn", "Roam", "Destroy"], "speed": 0.0 },
                "shot": { "states": ["Spawn", "Propel", "Destroy"], "speed": 0.0 },
                "coin": { "states": ["Spawn", "Destroy"], "points_value": 10 },
                "crate": { "states": ["Spawn", "Disintegrate"] }
            }"#,
        )
        .unwrap();
        Game::new(library)
    }

    fn arch(game: &Game, name: &str) -> Arc<ArchetypeConfig> {
        game.library().get(name).unwrap()
    }

    /// Enqueue and flush at a frozen clock.
    fn spawn(game: &mut Game, blueprint: Blueprint) -> EntityId {
        let id = game.add_entity(blueprint);
        game.update(0.0);
        id
    }

    fn hero(game: &mut Game, at: Point) -> EntityId {
        let archetype = arch(game, "hero");
        spawn(game, Blueprint::player(archetype, PlayerIndex::Player1, at, None))
    }

    fn shot(game: &mut Game, at: Point, owner: Option<EntityId>) -> EntityId {
        let archetype = arch(game, "shot");
        spawn(game, Blueprint::projectile(archetype, at, Direction::Left, owner))
    }

    fn grunt(game: &mut Game, at: Point) -> EntityId {
        let archetype = arch(game, "grunt");
        spawn(game, Blueprint::monster(archetype, at, false))
    }

    #[test]
    fn test_projectile_hits_player_and_is_spent() {
        let mut g = game();
        let hero = hero(&mut g, Point::new(1, 1));
        let first = shot(&mut g, Point::new(1, 1), None);
        assert_eq!(
            g.begin_contact(first, hero),
            ContactOutcome::Struck { hazard: first, target: hero, effect: StateKind::Hit, spent: true }
        );
        assert_eq!(g.state_of(hero), Some(StateKind::Hit));
        assert_eq!(g.state_of(first), Some(StateKind::Destroy));
        assert_eq!(g.component::<Creature>(hero).unwrap().health, 1);

        // Already in Hit: further hazards pass through.
        let second = shot(&mut g, Point::new(1, 1), None);
        assert_eq!(g.begin_contact(hero, second), ContactOutcome::Unaffected { hazard: second, target: hero });
        assert_eq!(g.state_of(second), Some(StateKind::Propel));
    }

    #[test]
    fn test_projectile_ignores_its_owner() {
        let mut g = game();
        let grunt = grunt(&mut g, Point::new(2, 2));
        let shot = shot(&mut g, Point::new(2, 2), Some(grunt));
        assert_eq!(g.begin_contact(shot, grunt), ContactOutcome::Ignored);
    }

    #[test]
    fn test_monster_without_hit_state_is_destroyed() {
        let mut g = game();
        let grunt = grunt(&mut g, Point::new(2, 2));
        let shot = shot(&mut g, Point::new(2, 2), None);
        match g.begin_contact(shot, grunt) {
            ContactOutcome::Struck { effect, .. } => assert_eq!(effect, StateKind::Destroy),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(g.component::<Creature>(grunt).unwrap().lives, -1);
    }

    #[test]
    fn test_hazards_do_not_touch_each_other() {
        let mut g = game();
        let a = shot(&mut g, Point::new(0, 0), None);
        let b = shot(&mut g, Point::new(0, 0), None);
        assert_eq!(g.begin_contact(a, b), ContactOutcome::Ignored);
        assert!(g.grid_contacts().is_empty());
    }

    #[test]
    fn test_player_collects_prop_once() {
        let mut g = game();
        let hero = hero(&mut g, Point::new(1, 1));
        let coin_archetype = arch(&g, "coin");
        let coin = spawn(&mut g, Blueprint::prop(coin_archetype, PropType::Coin, Point::new(1, 1)));
        assert_eq!(g.grid_contacts(), vec![ContactOutcome::Collected { item: coin, collector: hero }]);
        assert_eq!(g.component::<Collectible>(coin).unwrap().collected_by, Some(hero));
        assert_eq!(g.begin_contact(hero, coin), ContactOutcome::Ignored);

        // Destroy completes on the next tick and credits the coin's value.
        g.update(0.0);
        assert_eq!(g.score(), 10);
    }

    #[test]
    fn test_prop_disintegrates_under_projectile() {
        let mut g = game();
        let crate_archetype = arch(&g, "crate");
        let target = spawn(&mut g, Blueprint::prop(crate_archetype, PropType::Gem, Point::new(3, 3)));
        let shot = shot(&mut g, Point::new(3, 3), None);
        match g.begin_contact(shot, target) {
            ContactOutcome::Struck { effect, spent, .. } => {
                assert_eq!(effect, StateKind::Disintegrate);
                assert!(spent);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

//! Sequence completion callbacks.
//!
//! Every finished sequence is reported to an `EntityDelegate` through the
//! callback named after its state. `Game` is the delegate of every entity it
//! owns; the reactions below are the game rules layered on top of the state
//! machine.

use crate::api::Game;
use crate::blueprint::Blueprint;
use crate::components::*;
use crate::config::AttackStyle;
use crate::explosion;
use crate::grid::{self, Direction};
use crate::presentation::PresentationEvent;
use crate::state::StateKind;
use log::debug;
use std::sync::Arc;

/// Receiver of sequence completions.
pub trait EntityDelegate {
    fn entity_did_spawn(&mut self, id: EntityId);
    fn entity_did_roam(&mut self, _id: EntityId) {}
    fn entity_did_attack(&mut self, id: EntityId);
    fn entity_did_hit(&mut self, id: EntityId);
    fn entity_did_destroy(&mut self, id: EntityId);
    fn entity_did_disintegrate(&mut self, id: EntityId);
    fn entity_did_decay(&mut self, id: EntityId);
    fn entity_did_cheer(&mut self, id: EntityId);
    fn entity_did_float(&mut self, id: EntityId);
    fn entity_did_propel(&mut self, id: EntityId);
    fn entity_did_control(&mut self, _id: EntityId) {}
}

/// Route a completed `state` sequence to its callback.
pub fn notify(delegate: &mut impl EntityDelegate, state: StateKind, id: EntityId) {
    debug!("{:?}: {}", id, state.completion_event());
    match state {
        StateKind::Spawn => delegate.entity_did_spawn(id),
        StateKind::Roam => delegate.entity_did_roam(id),
        StateKind::Attack => delegate.entity_did_attack(id),
        StateKind::Hit => delegate.entity_did_hit(id),
        StateKind::Destroy => delegate.entity_did_destroy(id),
        StateKind::Disintegrate => delegate.entity_did_disintegrate(id),
        StateKind::Decay => delegate.entity_did_decay(id),
        StateKind::Cheer => delegate.entity_did_cheer(id),
        StateKind::Float => delegate.entity_did_float(id),
        StateKind::Propel => delegate.entity_did_propel(id),
        StateKind::Control => delegate.entity_did_control(id),
    }
}

impl EntityDelegate for Game {
    fn entity_did_spawn(&mut self, id: EntityId) {
        let Some(kind) = self.kind_of(id) else {
            return;
        };
        match kind {
            EntityKind::Creature(CreatureKind::Player(_)) => {
                self.transition(id, StateKind::Control);
            }
            // Monsters are handed to Roam by their controller.
            EntityKind::Creature(_) | EntityKind::Tile(_) => {}
            EntityKind::Bomb | EntityKind::Explosion => {
                self.transition(id, StateKind::Destroy);
            }
            EntityKind::Projectile => {
                let next = if self.projectile_blocked(id) { StateKind::Destroy } else { StateKind::Propel };
                self.transition(id, next);
            }
            EntityKind::Prop(_) | EntityKind::PowerUp(_) | EntityKind::Points => {
                if self.allows(id, StateKind::Float) {
                    self.transition(id, StateKind::Float);
                } else if kind == EntityKind::Points {
                    self.transition(id, StateKind::Destroy);
                }
            }
        }
    }

    fn entity_did_attack(&mut self, id: EntityId) {
        if let (Some(archetype), Some(position), Some(heading)) =
            (self.archetype_of(id), self.position_of(id), self.component::<Heading>(id).map(|h| h.0))
        {
            let target = position.step(heading);
            match archetype.attack {
                AttackStyle::Ranged if heading != Direction::None => {
                    let occupancy = self.occupancy();
                    let open = occupancy.in_bounds(target) && occupancy.tile_at(target).is_none();
                    if let (true, Some(projectile)) = (open, self.linked(archetype.projectile.as_deref())) {
                        let shot = self.add_entity(Blueprint::projectile(projectile, target, heading, Some(id)));
                        debug!("{:?} fired {:?} {:?}", id, shot, heading);
                    }
                }
                AttackStyle::Melee => {
                    let victim = self.occupancy().player_at(target).map(|o| o.id);
                    if let Some(victim) = victim {
                        self.strike(victim);
                    }
                }
                _ => {}
            }
        }
        self.transition(id, StateKind::Roam);
    }

    fn entity_did_hit(&mut self, id: EntityId) {
        let (Some(kind), Some(creature)) = (self.kind_of(id), self.component::<Creature>(id).copied()) else {
            return;
        };
        let next = if creature.health <= 0 {
            StateKind::Destroy
        } else if kind.is_player() {
            StateKind::Control
        } else {
            StateKind::Roam
        };
        self.transition(id, next);
    }

    fn entity_did_destroy(&mut self, id: EntityId) {
        let Some(kind) = self.kind_of(id) else {
            return;
        };
        match kind {
            EntityKind::Bomb => self.detonate(id),
            EntityKind::Creature(_) => self.creature_destroyed(id, kind),
            EntityKind::Tile(_) => {
                self.drop_points(id);
                self.remove_entity(id);
            }
            EntityKind::Prop(_) | EntityKind::PowerUp(_) => {
                self.apply_pickup(id, kind);
                self.remove_entity(id);
            }
            EntityKind::Points | EntityKind::Projectile | EntityKind::Explosion => self.remove_entity(id),
        }
    }

    fn entity_did_disintegrate(&mut self, id: EntityId) {
        self.remove_entity(id);
    }

    fn entity_did_decay(&mut self, id: EntityId) {
        self.remove_entity(id);
    }

    fn entity_did_cheer(&mut self, id: EntityId) {
        self.transition(id, StateKind::Control);
    }

    fn entity_did_float(&mut self, id: EntityId) {
        match self.kind_of(id) {
            Some(EntityKind::Points) => {
                self.transition(id, StateKind::Destroy);
            }
            Some(EntityKind::Prop(_) | EntityKind::PowerUp(_)) if self.allows(id, StateKind::Decay) => {
                self.transition(id, StateKind::Decay);
            }
            _ => {}
        }
    }

    fn entity_did_propel(&mut self, id: EntityId) {
        self.impact(id);
        if self.state_of(id) != Some(StateKind::Destroy) && self.projectile_blocked(id) {
            self.transition(id, StateKind::Destroy);
        }
    }
}

// ============================================================================
// GAME RULES
// ============================================================================

impl Game {
    /// Explode a bomb: chain into tiles and bombs, spawn the blast, remove it.
    pub(crate) fn detonate(&mut self, id: EntityId) {
        let (Some(position), Some(bomb), Some(archetype)) =
            (self.position_of(id), self.component::<Bomb>(id).copied(), self.archetype_of(id))
        else {
            self.remove_entity(id);
            return;
        };
        let plan = explosion::propagate(position, bomb.range, Some(id), &self.occupancy());
        debug!(
            "{:?} detonated at ({}, {}): {} segments, {} tiles, {} bombs",
            id,
            position.x,
            position.y,
            plan.segments.len(),
            plan.tiles.len(),
            plan.bombs.len()
        );

        for tile in &plan.tiles {
            self.transition(*tile, StateKind::Destroy);
        }
        for other in &plan.bombs {
            self.transition(*other, StateKind::Destroy);
        }
        if let Some(blast) = self.linked(archetype.explosion.as_deref()) {
            for segment in &plan.segments {
                self.add_entity(Blueprint::explosion(Arc::clone(&blast), segment.position, segment.direction));
            }
        }
        self.remove_entity(id);
    }

    /// Respawn while lives remain, otherwise leave the game for good.
    fn creature_destroyed(&mut self, id: EntityId, kind: EntityKind) {
        let Some(creature) = self.component::<Creature>(id).copied() else {
            return;
        };
        if creature.lives >= 0 {
            let spawn_point = creature.spawn_point;
            if let Some(mut position) = self.component_mut::<GridPosition>(id) {
                position.0 = spawn_point;
            }
            if let Some(mut heading) = self.component_mut::<Heading>(id) {
                heading.0 = Direction::None;
            }
            let position = grid::to_world(spawn_point, self.config().unit_length);
            self.post(PresentationEvent::Reposition { id, position });
            self.transition(id, StateKind::Spawn);
            self.post_hud(id);
            return;
        }

        self.remove_entity(id);
        match kind {
            EntityKind::Creature(CreatureKind::Player(index)) => {
                self.post_hud(id);
                let other = match index {
                    PlayerIndex::Player1 => PlayerIndex::Player2,
                    PlayerIndex::Player2 => PlayerIndex::Player1,
                };
                if let Some(survivor) = self.player(other) {
                    if self.state_of(survivor) == Some(StateKind::Control) && self.allows(survivor, StateKind::Cheer) {
                        self.transition(survivor, StateKind::Cheer);
                    }
                }
            }
            _ => self.drop_points(id),
        }
    }

    /// Score the entity's value and leave its popup behind.
    fn drop_points(&mut self, id: EntityId) {
        let (Some(archetype), Some(position)) = (self.archetype_of(id), self.position_of(id)) else {
            return;
        };
        let value = archetype.points_value;
        self.add_score(value);
        if let Some(popup) = self.linked(archetype.points.as_deref()) {
            self.add_entity(Blueprint::points(popup, position, value));
        }
    }

    /// Credit a collected prop or power-up to its collector.
    fn apply_pickup(&mut self, id: EntityId, kind: EntityKind) {
        let Some(collector) = self.component::<Collectible>(id).and_then(|c| c.collected_by) else {
            return;
        };
        match kind {
            EntityKind::PowerUp(power_up) => {
                if let Some(mut player) = self.component_mut::<Player>(collector) {
                    player.counter_mut(power_up).increment();
                }
                self.post_hud(collector);
            }
            EntityKind::Prop(PropType::Heart) => {
                if let Some(mut creature) = self.component_mut::<Creature>(collector) {
                    creature.lives += 1;
                }
                self.post_hud(collector);
            }
            EntityKind::Prop(_) => self.drop_points(id),
            _ => {}
        }
    }

    /// Whether a projectile's next cell ends its flight.
    fn projectile_blocked(&mut self, id: EntityId) -> bool {
        let (Some(position), Some(heading)) = (self.position_of(id), self.component::<Heading>(id).map(|h| h.0)) else {
            return true;
        };
        if heading == Direction::None {
            return true;
        }
        let next = position.step(heading);
        let occupancy = self.occupancy();
        !occupancy.in_bounds(next) || occupancy.tile_at(next).is_some()
    }
}

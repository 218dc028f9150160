//! Timed state sequences.
//!
//! A state's "sequence" is the animation (and optional sound) the presentation
//! layer plays for it. The core does not wait on the presentation layer; it
//! schedules a task on the `Timeline` with the sequence's duration and treats
//! the task's expiry as the completion callback. Completions are collected
//! here and dispatched by `Game` after the systems ran, so every delegate
//! callback executes on the tick, never inside a system.

use crate::components::EntityId;
use crate::config::{AnimationRange, ArchetypeConfig};
use crate::grid::Direction;
use crate::presentation::{AudioStatus, PresentationEvent, PresentationOutbox};
use crate::state::{State, StateKind};
use bevy_ecs::prelude::*;

/// A finished sequence, addressed to one entry of one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub id: EntityId,
    pub state: StateKind,
    pub serial: u64,
}

#[derive(Debug, Clone)]
struct Task {
    completion: Completion,
    remaining: f32,
}

/// Pending sequence tasks and the completions that are ready to dispatch.
#[derive(Resource, Debug, Default)]
pub struct Timeline {
    tasks: Vec<Task>,
    ready: Vec<Completion>,
}

impl Timeline {
    /// Schedule a completion `duration` seconds from now. Zero-length
    /// sequences complete on the current tick.
    pub fn schedule(&mut self, completion: Completion, duration: f32) {
        if duration <= 0.0 {
            self.ready.push(completion);
        } else {
            self.tasks.push(Task { completion, remaining: duration });
        }
    }

    /// Advance every task; elapsed ones become ready in scheduling order.
    pub fn advance(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let ready = &mut self.ready;
        self.tasks.retain_mut(|task| {
            task.remaining -= dt;
            if task.remaining <= 0.0 {
                ready.push(task.completion);
                false
            } else {
                true
            }
        });
    }

    /// Take every ready completion.
    pub fn drain_ready(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.ready)
    }

    /// Forget everything scheduled for an entity that left the game.
    pub fn forget(&mut self, id: EntityId) {
        self.tasks.retain(|task| task.completion.id != id);
        self.ready.retain(|completion| completion.id != id);
    }

    pub fn pending(&self) -> usize {
        self.tasks.len() + self.ready.len()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.ready.clear();
    }
}

/// Animation played for `state`. Explosion segments pick their Destroy
/// variant from the blast direction.
pub fn animation_for(
    archetype: &ArchetypeConfig,
    state: StateKind,
    blast: Option<Direction>,
) -> Option<AnimationRange> {
    if let (StateKind::Destroy, Some(direction), Some(variants)) = (state, blast, archetype.blast_animations) {
        return Some(if direction.is_vertical() {
            variants.vertical
        } else if direction.is_horizontal() {
            variants.horizontal
        } else {
            variants.center
        });
    }
    archetype.animation(state).copied()
}

/// Start the sequence of `state`: post the presentation cues and schedule
/// its completion. The sound is only requested while the audio engine is up.
#[allow(clippy::too_many_arguments)]
pub fn start_sequence(
    timeline: &mut Timeline,
    outbox: &mut PresentationOutbox,
    audio: &AudioStatus,
    id: EntityId,
    state: &State,
    archetype: &ArchetypeConfig,
    animation: Option<AnimationRange>,
    duration: f32,
) {
    let kind = state.kind();
    if let Some(range) = animation {
        outbox.push(PresentationEvent::PlayAnimation { id, state: kind, range });
    }
    if let Some(sound) = archetype.sound(kind) {
        if audio.alive {
            outbox.push(PresentationEvent::PlaySound { id, sound: sound.to_string() });
        }
    }
    timeline.schedule(Completion { id, state: kind, serial: state.serial() }, duration);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlastAnimations;

    fn completion(id: u64) -> Completion {
        Completion { id: EntityId(id), state: StateKind::Spawn, serial: 1 }
    }

    #[test]
    fn test_zero_length_sequence_is_ready_immediately() {
        let mut timeline = Timeline::default();
        timeline.schedule(completion(1), 0.0);
        assert_eq!(timeline.drain_ready(), vec![completion(1)]);
        assert_eq!(timeline.pending(), 0);
    }

    #[test]
    fn test_tasks_elapse_in_order() {
        let mut timeline = Timeline::default();
        timeline.schedule(completion(1), 0.5);
        timeline.schedule(completion(2), 0.2);
        timeline.advance(0.25);
        assert_eq!(timeline.drain_ready(), vec![completion(2)]);
        timeline.advance(0.0);
        assert!(timeline.drain_ready().is_empty());
        timeline.advance(0.25);
        assert_eq!(timeline.drain_ready(), vec![completion(1)]);
    }

    #[test]
    fn test_forget_drops_entity_tasks() {
        let mut timeline = Timeline::default();
        timeline.schedule(completion(1), 1.0);
        timeline.schedule(completion(2), 0.0);
        timeline.forget(EntityId(1));
        timeline.forget(EntityId(2));
        assert_eq!(timeline.pending(), 0);
    }

    #[test]
    fn test_blast_variant_follows_direction() {
        let archetype = ArchetypeConfig {
            blast_animations: Some(BlastAnimations {
                center: AnimationRange::new(0, 4, 8.0),
                horizontal: AnimationRange::new(4, 4, 8.0),
                vertical: AnimationRange::new(8, 4, 8.0),
            }),
            ..Default::default()
        };
        let pick = |d| animation_for(&archetype, StateKind::Destroy, Some(d)).map(|a| a.first);
        assert_eq!(pick(Direction::None), Some(0));
        assert_eq!(pick(Direction::Left), Some(4));
        assert_eq!(pick(Direction::Up), Some(8));
        assert_eq!(animation_for(&archetype, StateKind::Spawn, Some(Direction::Up)), None);
    }

    #[test]
    fn test_sound_requires_live_audio() {
        let archetype = ArchetypeConfig {
            sounds: [(StateKind::Spawn, "pop.wav".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let mut machine = crate::state::StateMachine::new();
        let ctx = crate::state::TransitionContext { kind: crate::components::EntityKind::Bomb, lives: None };
        machine.enter(&ctx, &archetype, StateKind::Spawn).unwrap();
        let state = machine.current().unwrap();

        let mut timeline = Timeline::default();
        let mut outbox = PresentationOutbox::default();
        start_sequence(&mut timeline, &mut outbox, &AudioStatus { alive: false }, EntityId(1), state, &archetype, None, 1.0);
        assert!(outbox.is_empty());
        start_sequence(&mut timeline, &mut outbox, &AudioStatus { alive: true }, EntityId(1), state, &archetype, None, 1.0);
        assert_eq!(outbox.len(), 1);
        assert_eq!(timeline.pending(), 2);
    }
}

//! Finite state machine framework.
//!
//! Every simulated entity owns one `StateMachine`. The machine holds the current
//! `State` and decides which transitions are legal from two sources: the
//! archetype's configured state list and a per-kind transition predicate
//! (`is_valid_next_state`) written as an exhaustive match over `EntityKind`.
//!
//! ## Busy flag
//!
//! A state is *updating* from the moment its sequence starts until the
//! orchestrator dispatches that sequence's completion. Repeated updates while
//! updating are no-ops. One-shot states run their sequence exactly once;
//! stepping states (`Roam`, `Control`, `Propel`) start one grid step per idle
//! update.
//!
//! ## Interruption
//!
//! There is no cancellation primitive. Entering a new state while the current
//! one is updating abandons the in-flight sequence: the caller receives the old
//! state in `Entered::interrupted`, releases whatever it claimed, and the old
//! completion is later discarded because its serial no longer matches. Nothing
//! about the interrupted sequence is resumed.

use crate::components::{Creature, CreatureKind, EntityId, EntityKind};
use crate::config::ArchetypeConfig;
use crate::grid::Point;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed catalog of behavior states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateKind {
    Spawn,
    Roam,
    Attack,
    Hit,
    Destroy,
    Disintegrate,
    Decay,
    Cheer,
    Float,
    Propel,
    Control,
}

impl StateKind {
    pub const ALL: [StateKind; 11] = [
        StateKind::Spawn,
        StateKind::Roam,
        StateKind::Attack,
        StateKind::Hit,
        StateKind::Destroy,
        StateKind::Disintegrate,
        StateKind::Decay,
        StateKind::Cheer,
        StateKind::Float,
        StateKind::Propel,
        StateKind::Control,
    ];

    /// States that move their entity one cell per sequence.
    pub fn is_stepping(self) -> bool {
        matches!(self, StateKind::Roam | StateKind::Control | StateKind::Propel)
    }

    /// Name of the delegate callback fired when this state's sequence completes.
    pub fn completion_event(self) -> &'static str {
        match self {
            StateKind::Spawn => "entity_did_spawn",
            StateKind::Roam => "entity_did_roam",
            StateKind::Attack => "entity_did_attack",
            StateKind::Hit => "entity_did_hit",
            StateKind::Destroy => "entity_did_destroy",
            StateKind::Disintegrate => "entity_did_disintegrate",
            StateKind::Decay => "entity_did_decay",
            StateKind::Cheer => "entity_did_cheer",
            StateKind::Float => "entity_did_float",
            StateKind::Propel => "entity_did_propel",
            StateKind::Control => "entity_did_control",
        }
    }
}

/// Transition failures. All of them leave the machine in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal state transition {from:?} -> {to:?}")]
    Illegal { from: Option<StateKind>, to: StateKind },
    #[error("state {0:?} is not configured for this archetype")]
    NotConfigured(StateKind),
    #[error("entity {0:?} is not live")]
    UnknownEntity(EntityId),
}

/// What the transition predicate needs to know about the entity.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext {
    pub kind: EntityKind,
    /// Remaining lives for creatures.
    pub lives: Option<i32>,
}

impl TransitionContext {
    pub fn new(kind: EntityKind, creature: Option<&Creature>) -> Self {
        Self { kind, lives: creature.map(|c| c.lives) }
    }
}

/// Per-kind transition legality.
///
/// From no state only `Spawn` is legal. Leaving `Destroy` is legal only for
/// creatures whose life counter is still non-negative.
pub fn is_valid_next_state(ctx: &TransitionContext, current: Option<StateKind>, next: StateKind) -> bool {
    use StateKind::*;
    let Some(current) = current else {
        return next == Spawn;
    };
    match ctx.kind {
        EntityKind::Creature(CreatureKind::Player(_)) => match current {
            Spawn => next == Control,
            Control => matches!(next, Hit | Destroy | Cheer),
            Hit => matches!(next, Control | Destroy),
            Cheer => matches!(next, Control | Hit | Destroy),
            Destroy => next == Spawn && ctx.lives.is_some_and(|l| l >= 0),
            _ => false,
        },
        EntityKind::Creature(CreatureKind::Monster | CreatureKind::Boss) => match current {
            Spawn => next == Roam,
            Roam => matches!(next, Attack | Hit | Destroy),
            Attack => matches!(next, Roam | Hit | Destroy),
            Hit => matches!(next, Roam | Destroy),
            Destroy => next == Spawn && ctx.lives.is_some_and(|l| l >= 0),
            _ => false,
        },
        EntityKind::Bomb => current == Spawn && next != Spawn,
        EntityKind::Tile(_) | EntityKind::Explosion => current == Spawn && next == Destroy,
        EntityKind::Projectile => match current {
            Spawn => matches!(next, Propel | Destroy),
            Propel => next == Destroy,
            _ => false,
        },
        EntityKind::Prop(_) | EntityKind::PowerUp(_) => match current {
            Spawn => matches!(next, Float | Destroy | Disintegrate),
            Float => matches!(next, Decay | Destroy | Disintegrate),
            Decay => matches!(next, Destroy | Disintegrate),
            _ => false,
        },
        EntityKind::Points => match current {
            Spawn => matches!(next, Float | Destroy),
            Float => next == Destroy,
            _ => false,
        },
    }
}

/// The active state of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    kind: StateKind,
    serial: u64,
    updating: bool,
    finished: bool,
    step: Option<Point>,
}

impl State {
    fn new(kind: StateKind, serial: u64) -> Self {
        Self { kind, serial, updating: false, finished: false, step: None }
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    /// Identifies this entry of the state; completions carry it back.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    /// One-shot state whose sequence already completed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Not updating, and either a stepping state or a finished one-shot.
    pub fn is_idle(&self) -> bool {
        !self.updating && (self.finished || self.kind.is_stepping())
    }

    /// Target cell of the step in flight.
    pub fn step(&self) -> Option<Point> {
        self.step
    }

    /// Mark the one-shot sequence as started. Returns `false` (and changes
    /// nothing) if a sequence is running or has already run.
    pub fn begin(&mut self) -> bool {
        if self.updating || self.finished || self.kind.is_stepping() {
            return false;
        }
        self.updating = true;
        true
    }

    /// Mark a step towards `target` as started. Returns `false` while busy.
    pub fn begin_step(&mut self, target: Point) -> bool {
        if self.updating || !self.kind.is_stepping() {
            return false;
        }
        self.updating = true;
        self.step = Some(target);
        true
    }

    /// Clear the busy flag for the sequence identified by `serial`.
    ///
    /// Returns `None` for stale or duplicate completions; otherwise the step
    /// target (if this was a step).
    pub fn complete(&mut self, serial: u64) -> Option<Option<Point>> {
        if serial != self.serial || !self.updating {
            return None;
        }
        self.updating = false;
        if !self.kind.is_stepping() {
            self.finished = true;
        }
        Some(self.step.take())
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Entered {
    pub previous: Option<StateKind>,
    /// The previous state, if its sequence was still in flight.
    pub interrupted: Option<State>,
    pub serial: u64,
}

/// Drives an entity's current behavior state.
#[derive(Component, Debug, Clone, Default)]
pub struct StateMachine {
    current: Option<State>,
    next_serial: u64,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&State> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut State> {
        self.current.as_mut()
    }

    pub fn current_kind(&self) -> Option<StateKind> {
        self.current.as_ref().map(State::kind)
    }

    pub fn is_in(&self, kind: StateKind) -> bool {
        self.current_kind() == Some(kind)
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.current_kind(), Some(StateKind::Destroy | StateKind::Disintegrate))
    }

    pub fn is_controllable(&self) -> bool {
        self.is_in(StateKind::Control)
    }

    pub fn is_hit(&self) -> bool {
        self.is_in(StateKind::Hit)
    }

    pub fn is_updating(&self) -> bool {
        self.current.as_ref().is_some_and(State::is_updating)
    }

    /// Check a transition without performing it.
    pub fn check(
        &self,
        ctx: &TransitionContext,
        archetype: &ArchetypeConfig,
        next: StateKind,
    ) -> Result<(), TransitionError> {
        if !archetype.allows(next) {
            return Err(TransitionError::NotConfigured(next));
        }
        let from = self.current_kind();
        if !is_valid_next_state(ctx, from, next) {
            return Err(TransitionError::Illegal { from, to: next });
        }
        Ok(())
    }

    /// Replace the current state with a fresh `next` if the transition is legal.
    pub fn enter(
        &mut self,
        ctx: &TransitionContext,
        archetype: &ArchetypeConfig,
        next: StateKind,
    ) -> Result<Entered, TransitionError> {
        self.check(ctx, archetype, next)?;
        self.next_serial += 1;
        let serial = self.next_serial;
        let old = self.current.replace(State::new(next, serial));
        let previous = old.as_ref().map(State::kind);
        let interrupted = old.filter(State::is_updating);
        Ok(Entered { previous, interrupted, serial })
    }
}

/// Side effects applied by the transition itself, not by the delegate.
///
/// Destroy costs one life, Hit costs the archetype's hit damage, Spawn restores
/// the baseline health. Each runs once per entry.
pub fn apply_entry_effects(next: StateKind, creature: &mut Creature, archetype: &ArchetypeConfig) {
    match next {
        StateKind::Destroy => creature.lives -= 1,
        StateKind::Hit => creature.health -= archetype.hit_damage,
        StateKind::Spawn => {
            creature.health = archetype.health;
            creature.next_grid_position = None;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{PlayerIndex, TileType};

    fn archetype(states: &[StateKind]) -> ArchetypeConfig {
        ArchetypeConfig { states: states.to_vec(), ..Default::default() }
    }

    fn player_ctx(lives: i32) -> TransitionContext {
        TransitionContext {
            kind: EntityKind::Creature(CreatureKind::Player(PlayerIndex::Player1)),
            lives: Some(lives),
        }
    }

    #[test]
    fn test_only_spawn_from_nothing() {
        let ctx = player_ctx(1);
        assert!(is_valid_next_state(&ctx, None, StateKind::Spawn));
        for state in StateKind::ALL.iter().copied().filter(|s| *s != StateKind::Spawn) {
            assert!(!is_valid_next_state(&ctx, None, state));
        }
    }

    #[test]
    fn test_player_reaches_only_control_after_spawn() {
        let ctx = player_ctx(1);
        for state in StateKind::ALL {
            assert_eq!(
                is_valid_next_state(&ctx, Some(StateKind::Spawn), state),
                state == StateKind::Control
            );
        }
    }

    #[test]
    fn test_bomb_may_leave_spawn_for_anything() {
        let ctx = TransitionContext { kind: EntityKind::Bomb, lives: None };
        assert!(is_valid_next_state(&ctx, Some(StateKind::Spawn), StateKind::Destroy));
        assert!(is_valid_next_state(&ctx, Some(StateKind::Spawn), StateKind::Float));
        assert!(!is_valid_next_state(&ctx, Some(StateKind::Destroy), StateKind::Destroy));
    }

    #[test]
    fn test_tile_reaches_only_destroy() {
        let ctx = TransitionContext { kind: EntityKind::Tile(TileType::DestructibleBlock), lives: None };
        for state in StateKind::ALL {
            assert_eq!(
                is_valid_next_state(&ctx, Some(StateKind::Spawn), state),
                state == StateKind::Destroy
            );
        }
    }

    #[test]
    fn test_destroy_is_terminal_without_lives() {
        assert!(is_valid_next_state(&player_ctx(0), Some(StateKind::Destroy), StateKind::Spawn));
        assert!(!is_valid_next_state(&player_ctx(-1), Some(StateKind::Destroy), StateKind::Spawn));
    }

    #[test]
    fn test_illegal_transition_keeps_current_state() {
        let config = archetype(&[StateKind::Spawn, StateKind::Control, StateKind::Destroy]);
        let ctx = player_ctx(1);
        let mut machine = StateMachine::new();
        machine.enter(&ctx, &config, StateKind::Spawn).unwrap();
        let err = machine.enter(&ctx, &config, StateKind::Destroy).unwrap_err();
        assert_eq!(err, TransitionError::Illegal { from: Some(StateKind::Spawn), to: StateKind::Destroy });
        assert_eq!(machine.current_kind(), Some(StateKind::Spawn));
    }

    #[test]
    fn test_unconfigured_state_rejected() {
        let config = archetype(&[StateKind::Spawn]);
        let mut machine = StateMachine::new();
        machine.enter(&player_ctx(1), &config, StateKind::Spawn).unwrap();
        assert_eq!(
            machine.enter(&player_ctx(1), &config, StateKind::Control),
            Err(TransitionError::NotConfigured(StateKind::Control))
        );
    }

    #[test]
    fn test_busy_guard_blocks_second_sequence() {
        let config = archetype(&[StateKind::Spawn]);
        let mut machine = StateMachine::new();
        let entered = machine.enter(&player_ctx(1), &config, StateKind::Spawn).unwrap();
        let state = machine.current_mut().unwrap();
        assert!(state.begin());
        assert!(!state.begin());
        assert_eq!(state.complete(entered.serial), Some(None));
        // A duplicate completion is ignored and the one-shot never restarts.
        assert_eq!(state.complete(entered.serial), None);
        assert!(!state.begin());
        assert!(state.is_idle());
    }

    #[test]
    fn test_interrupting_a_busy_state_reports_it() {
        let config = archetype(&[StateKind::Spawn, StateKind::Control, StateKind::Hit]);
        let ctx = player_ctx(1);
        let mut machine = StateMachine::new();
        machine.enter(&ctx, &config, StateKind::Spawn).unwrap();
        machine.current_mut().unwrap().begin();
        assert!(machine.enter(&ctx, &config, StateKind::Control).unwrap().interrupted.is_some());
        let idle = machine.enter(&ctx, &config, StateKind::Hit).unwrap();
        assert!(idle.interrupted.is_none());
        assert_eq!(idle.previous, Some(StateKind::Control));
    }

    #[test]
    fn test_stale_completion_is_dropped() {
        let config = archetype(&[StateKind::Spawn, StateKind::Control]);
        let ctx = player_ctx(1);
        let mut machine = StateMachine::new();
        let spawn = machine.enter(&ctx, &config, StateKind::Spawn).unwrap();
        machine.current_mut().unwrap().begin();
        machine.enter(&ctx, &config, StateKind::Control).unwrap();
        assert_eq!(machine.current_mut().unwrap().complete(spawn.serial), None);
    }

    #[test]
    fn test_entry_effects() {
        let config = ArchetypeConfig { health: 3, hit_damage: 2, ..Default::default() };
        let mut creature = Creature::new(1, 2, Point::new(0, 0));
        apply_entry_effects(StateKind::Hit, &mut creature, &config);
        assert_eq!(creature.health, -1);
        apply_entry_effects(StateKind::Destroy, &mut creature, &config);
        assert_eq!(creature.lives, 1);
        apply_entry_effects(StateKind::Spawn, &mut creature, &config);
        assert_eq!(creature.health, 3);
        assert_eq!(creature.lives, 1);
    }
}

//! Presentation-layer boundary.
//!
//! The core never renders or plays audio. It posts ordered cues into the
//! `PresentationOutbox` resource and the host drains them once per frame.

use crate::components::{EntityId, EntityKind, Player, PlayerIndex, VisualHandle};
use crate::config::AnimationRange;
use crate::state::StateKind;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// How a level ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelOutcome {
    /// Every monster is gone while a player is still alive.
    Won,
    /// Every registered player is out.
    Lost,
}

/// HUD values of one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HudStatus {
    pub player: PlayerIndex,
    pub lives: i32,
    pub range: u32,
    pub bombs: u32,
    pub fuse: u32,
    pub shield: u32,
    pub speed: u32,
}

impl HudStatus {
    pub fn new(player: &Player, lives: i32) -> Self {
        Self {
            player: player.index,
            lives,
            range: player.range.current(),
            bombs: player.bombs.current(),
            fuse: player.fuse.current(),
            shield: player.shield.current(),
            speed: player.speed.current(),
        }
    }
}

/// One presentation cue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PresentationEvent {
    /// A new entity went live; its visual is positioned already.
    Attach { id: EntityId, kind: EntityKind, visual: VisualHandle },
    Detach { id: EntityId },
    /// Jump to a world position.
    Reposition { id: EntityId, position: (f32, f32) },
    /// Slide to a world position over `duration` seconds.
    MoveTo { id: EntityId, position: (f32, f32), duration: f32 },
    PlayAnimation { id: EntityId, state: StateKind, range: AnimationRange },
    PlaySound { id: EntityId, sound: String },
    /// The in-flight sequence of `state` was abandoned.
    CancelSequence { id: EntityId, state: StateKind },
    Hud(HudStatus),
    ScoreChanged { score: u32 },
    SpeedChanged { id: EntityId, multiplier: f32 },
    TimeRemaining { seconds: u32 },
    LevelFinished { outcome: LevelOutcome },
}

/// Ordered queue of cues awaiting the host.
#[derive(Resource, Debug, Default)]
pub struct PresentationOutbox {
    events: Vec<PresentationEvent>,
}

impl PresentationOutbox {
    pub fn push(&mut self, event: PresentationEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<PresentationEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresentationEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Whether the host's audio engine can currently play sounds.
#[derive(Resource, Debug, Clone, Copy)]
pub struct AudioStatus {
    pub alive: bool,
}

impl Default for AudioStatus {
    fn default() -> Self {
        Self { alive: true }
    }
}

//! Public API for the simulation.
//!
//! `Game` is the orchestrator a host drives once per rendered frame. It owns
//! the ECS world, the schedule and every world resource, so there is no
//! global state: RNG, audio status and mutation queues all live here.
//!
//! ## Tick order
//!
//! `update(current_time)` always runs, in this order:
//! 1. delta time (first tick and clock anomalies yield zero)
//! 2. removal flush
//! 3. addition flush
//! 4. controllers and state machine, then sequence completions
//! 5. level-finished check
//! 6. countdown and sudden death

use crate::blueprint::{Blueprint, EntityQueue};
use crate::components::*;
use crate::config::{ArchetypeConfig, ArchetypeLibrary, ConfigError, GameConfig, LevelDefinition};
use crate::grid::Point;
use crate::presentation::{AudioStatus, HudStatus, LevelOutcome, PresentationEvent, PresentationOutbox};
use crate::sequence::Timeline;
use crate::spatial::{Arena, LiveCollections, Occupancy};
use crate::state::{StateKind, StateMachine, TransitionContext, TransitionError};
use crate::systems::{self, *};
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;
use log::{debug, info, warn};
use std::sync::Arc;

/// The game loop orchestrator.
pub struct Game {
    world: World,
    schedule: Schedule,
    library: ArchetypeLibrary,
    config: GameConfig,
    tick: u64,
    time: f32,
    last_time: Option<f64>,
    /// Seconds left before sudden death, if the level has a countdown.
    countdown: Option<f32>,
    reported_second: Option<u32>,
    sudden_death: bool,
    /// Set by `configure_level`; win and loss are only judged while true.
    level_active: bool,
    outcome: Option<LevelOutcome>,
    score: u32,
}

impl Game {
    /// Create a game with default tuning.
    pub fn new(library: ArchetypeLibrary) -> Self {
        Self::with_config(library, GameConfig::default())
    }

    /// Create a game with custom tuning.
    pub fn with_config(library: ArchetypeLibrary, config: GameConfig) -> Self {
        let mut world = World::new();

        world.insert_resource(DeltaTime(0.0));
        world.insert_resource(config.clone());
        world.insert_resource(SimRng::seeded(config.seed));
        world.insert_resource(AudioStatus::default());
        world.insert_resource(Arena::default());
        world.insert_resource(LiveCollections::default());
        world.insert_resource(EntityQueue::default());
        world.insert_resource(Timeline::default());
        world.insert_resource(PresentationOutbox::default());

        // Controllers settle intent before the state machine moves anything.
        let mut schedule = Schedule::default();
        schedule.set_executor_kind(ExecutorKind::SingleThreaded);
        schedule.add_systems(
            (
                cpu_controller_system,
                player_controller_system,
                state_machine_system,
            )
                .chain(),
        );

        Self {
            world,
            schedule,
            library,
            config,
            tick: 0,
            time: 0.0,
            last_time: None,
            countdown: None,
            reported_second: None,
            sudden_death: false,
            level_active: false,
            outcome: None,
            score: 0,
        }
    }

    // ========================================================================
    // FRAME TICK
    // ========================================================================

    /// Drive one tick. `current_time` is the host clock in seconds.
    pub fn update(&mut self, current_time: f64) {
        let dt = self.delta_time(current_time);

        self.flush_removals();
        self.flush_additions();

        if let Some(mut dt_res) = self.world.get_resource_mut::<DeltaTime>() {
            dt_res.0 = dt;
        }
        self.schedule.run(&mut self.world);
        self.dispatch_completions();

        self.check_level_finished();
        self.run_countdown(dt);

        self.tick += 1;
        self.time += dt;
    }

    fn delta_time(&mut self, current_time: f64) -> f32 {
        let dt = match self.last_time {
            Some(previous) => (current_time - previous) as f32,
            None => 0.0,
        };
        self.last_time = Some(current_time);
        if !dt.is_finite() || dt < self.config.min_delta {
            0.0
        } else {
            dt.min(self.config.max_delta)
        }
    }

    fn flush_removals(&mut self) {
        let Some(removals) = self.world.get_resource_mut::<EntityQueue>().map(|mut q| q.take_removals()) else {
            return;
        };
        for id in removals {
            let Some((entity, kind)) = self
                .world
                .get_resource_mut::<LiveCollections>()
                .and_then(|mut live| live.remove(id))
            else {
                continue;
            };
            self.world.despawn(entity);
            if let Some(mut timeline) = self.world.get_resource_mut::<Timeline>() {
                timeline.forget(id);
            }
            self.post(PresentationEvent::Detach { id });
            debug!("removed {:?} ({})", id, kind.label());
        }
    }

    fn flush_additions(&mut self) {
        let Some(additions) = self.world.get_resource_mut::<EntityQueue>().map(|mut q| q.take_additions()) else {
            return;
        };
        for (id, blueprint) in additions {
            let kind = blueprint.kind;
            // One bomb per cell, whoever enqueued it.
            if kind == EntityKind::Bomb {
                if let Some(existing) = self.occupancy().bomb_at(blueprint.position).map(|o| o.id) {
                    warn!(
                        "dropping bomb {:?}: ({}, {}) already holds {:?}",
                        id, blueprint.position.x, blueprint.position.y, existing
                    );
                    continue;
                }
            }
            let (entity, visual) = blueprint.spawn(id, &mut self.world, self.config.unit_length);
            if let Some(mut live) = self.world.get_resource_mut::<LiveCollections>() {
                live.insert(id, entity, kind);
                if let Some(index) = kind.player_index() {
                    live.register_player(index, id);
                }
            }
            self.post(PresentationEvent::Attach { id, kind, visual });
            if kind.is_player() {
                self.attach_player_controller(id);
                self.post_hud(id);
            }
        }
    }

    fn dispatch_completions(&mut self) {
        let Some(ready) = self.world.get_resource_mut::<Timeline>().map(|mut t| t.drain_ready()) else {
            return;
        };
        for completion in ready {
            let Some(entity) = self.entity_of(completion.id) else {
                continue;
            };
            let step = {
                let Some(mut machine) = self.world.get_mut::<StateMachine>(entity) else {
                    continue;
                };
                let Some(state) = machine.current_mut() else {
                    continue;
                };
                if state.kind() != completion.state {
                    debug!("{:?}: dropping stale {:?} completion", completion.id, completion.state);
                    continue;
                }
                match state.complete(completion.serial) {
                    Some(step) => step,
                    None => {
                        debug!("{:?}: dropping stale {:?} completion", completion.id, completion.state);
                        continue;
                    }
                }
            };
            if let Some(target) = step {
                self.commit_step(entity, target);
            }
            crate::delegate::notify(self, completion.state, completion.id);
        }
    }

    fn commit_step(&mut self, entity: Entity, target: Point) {
        if let Some(mut position) = self.world.get_mut::<GridPosition>(entity) {
            position.0 = target;
        }
        if let Some(mut creature) = self.world.get_mut::<Creature>(entity) {
            creature.next_grid_position = None;
        }
    }

    fn check_level_finished(&mut self) {
        if !self.level_active || self.outcome.is_some() {
            return;
        }
        let Some(live) = self.world.get_resource::<LiveCollections>() else {
            return;
        };
        let alive = |id: EntityId| {
            live.entity(id)
                .and_then(|entity| self.world.get::<Creature>(entity))
                .is_some_and(Creature::is_alive)
        };

        let mut registered = 0;
        let mut players_alive = 0;
        for (_, id) in live.registered_players() {
            registered += 1;
            if alive(id) {
                players_alive += 1;
            }
        }
        if registered == 0 {
            return;
        }
        let monsters_alive = live
            .collection(Collection::Creatures)
            .iter()
            .any(|id| live.kind(*id).is_some_and(|k| k.is_monster()) && alive(*id));

        let outcome = if players_alive == 0 {
            LevelOutcome::Lost
        } else if !monsters_alive {
            LevelOutcome::Won
        } else {
            return;
        };
        self.finish_level(outcome);
    }

    fn finish_level(&mut self, outcome: LevelOutcome) {
        let ids: Vec<EntityId> = self
            .world
            .get_resource::<LiveCollections>()
            .map(|live| live.ids().collect())
            .unwrap_or_default();
        for id in ids {
            self.post(PresentationEvent::Detach { id });
        }
        self.world.clear_entities();
        if let Some(mut live) = self.world.get_resource_mut::<LiveCollections>() {
            live.clear();
        }
        if let Some(mut queue) = self.world.get_resource_mut::<EntityQueue>() {
            queue.clear();
        }
        if let Some(mut timeline) = self.world.get_resource_mut::<Timeline>() {
            timeline.clear();
        }
        self.outcome = Some(outcome);
        self.level_active = false;
        self.countdown = None;
        self.post(PresentationEvent::LevelFinished { outcome });
        info!("level finished: {:?} (score {})", outcome, self.score);
    }

    fn run_countdown(&mut self, dt: f32) {
        if self.outcome.is_some() {
            return;
        }
        let Some(before) = self.countdown else {
            return;
        };
        if before <= 0.0 {
            return;
        }
        let remaining = before - dt;
        self.countdown = Some(remaining);

        let seconds = remaining.max(0.0).ceil() as u32;
        if self.reported_second != Some(seconds) {
            self.reported_second = Some(seconds);
            self.post(PresentationEvent::TimeRemaining { seconds });
        }
        if remaining <= 0.0 && !self.sudden_death {
            self.sudden_death = true;
            self.begin_sudden_death();
        }
    }

    fn begin_sudden_death(&mut self) {
        let multiplier = self.config.sudden_death_multiplier;
        let monsters: Vec<(EntityId, Entity)> = self
            .world
            .get_resource::<LiveCollections>()
            .map(|live| {
                live.entities()
                    .filter(|(id, _)| live.kind(*id).is_some_and(|k| k.is_monster()))
                    .collect()
            })
            .unwrap_or_default();
        info!("sudden death: {} monsters speed up x{}", monsters.len(), multiplier);
        for (id, entity) in monsters {
            let Some(mut creature) = self.world.get_mut::<Creature>(entity) else {
                continue;
            };
            creature.speed_multiplier *= multiplier;
            let multiplier = creature.speed_multiplier;
            self.post(PresentationEvent::SpeedChanged { id, multiplier });
        }
    }

    // ========================================================================
    // ENTITY MUTATION (ENQUEUE ONLY)
    // ========================================================================

    /// Enqueue an entity; it goes live at the next tick's addition flush.
    pub fn add_entity(&mut self, blueprint: Blueprint) -> EntityId {
        match self.world.get_resource_mut::<EntityQueue>() {
            Some(mut queue) => queue.add(blueprint),
            None => EntityId(0),
        }
    }

    /// Enqueue a removal; the entity stays queryable until the next flush.
    pub fn remove_entity(&mut self, id: EntityId) {
        if let Some(mut queue) = self.world.get_resource_mut::<EntityQueue>() {
            queue.remove(id);
        }
    }

    /// Validate a level and enqueue every entity it places.
    ///
    /// Nothing is enqueued unless the whole level resolves. Entities of a
    /// previous level are enqueued for removal.
    pub fn configure_level(&mut self, level: &LevelDefinition) -> Result<(), ConfigError> {
        let size = level.size()?;
        if level.players.len() > 2 {
            return Err(ConfigError::TooManyPlayers(level.players.len()));
        }
        let inside = |point: Point| {
            if size.contains(point) {
                Ok(point)
            } else {
                Err(ConfigError::OutOfBounds(point))
            }
        };

        let mut blueprints = Vec::new();
        for (position, tile_type) in level.tiles()? {
            let archetype = self.library.get(level.theme.archetype_for(tile_type))?;
            blueprints.push(Blueprint::tile(archetype, tile_type, position));
        }
        for (slot, placement) in level.players.iter().enumerate() {
            let index = PlayerIndex::from_slot(slot).ok_or(ConfigError::TooManyPlayers(level.players.len()))?;
            let archetype = self.library.get(&placement.archetype)?;
            let bomb = self.library.link(archetype.bomb.as_deref())?;
            blueprints.push(Blueprint::player(archetype, index, inside(placement.position)?, bomb));
        }
        for placement in &level.monsters {
            let archetype = self.library.get(&placement.archetype)?;
            blueprints.push(Blueprint::monster(archetype, inside(placement.position)?, placement.boss));
        }
        for placement in &level.props {
            let archetype = self.library.get(&placement.archetype)?;
            blueprints.push(Blueprint::prop(archetype, placement.kind, inside(placement.position)?));
        }
        for placement in &level.power_ups {
            let archetype = self.library.get(&placement.archetype)?;
            blueprints.push(Blueprint::power_up(archetype, placement.kind, inside(placement.position)?));
        }

        // Entities queued by the old level must never go live in the new one.
        if let Some(mut queue) = self.world.get_resource_mut::<EntityQueue>() {
            queue.clear_additions();
        }
        let previous: Vec<EntityId> = self
            .world
            .get_resource::<LiveCollections>()
            .map(|live| live.ids().collect())
            .unwrap_or_default();
        for id in previous {
            self.remove_entity(id);
        }
        if let Some(mut live) = self.world.get_resource_mut::<LiveCollections>() {
            live.unregister_players();
        }
        if let Some(mut arena) = self.world.get_resource_mut::<Arena>() {
            arena.size = Some(size);
        }
        self.countdown = level.duration;
        self.reported_second = None;
        self.sudden_death = false;
        self.level_active = true;
        self.outcome = None;

        let count = blueprints.len();
        for blueprint in blueprints {
            self.add_entity(blueprint);
        }
        info!("level `{}` configured: {}x{}, {} entities", level.name, size.width, size.height, count);
        Ok(())
    }

    /// Swap an entity's CPU controller for a player controller.
    pub fn attach_player_controller(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entity_of(id) else {
            return false;
        };
        if self.world.get::<EntityKind>(entity).is_none() {
            return false;
        }
        self.world
            .entity_mut(entity)
            .remove::<CpuController>()
            .insert(PlayerController::default());
        true
    }

    // ========================================================================
    // INPUT / HOST STATUS
    // ========================================================================

    pub fn action_started(&mut self, player: PlayerIndex, action: Action) {
        if let Some(mut controller) = self.player_controller(player) {
            controller.start(action);
        }
    }

    pub fn action_stopped(&mut self, player: PlayerIndex, action: Action) {
        if let Some(mut controller) = self.player_controller(player) {
            controller.stop(action);
        }
    }

    fn player_controller(&mut self, player: PlayerIndex) -> Option<Mut<'_, PlayerController>> {
        let id = self.player(player)?;
        self.component_mut::<PlayerController>(id)
    }

    pub fn set_audio_alive(&mut self, alive: bool) {
        if let Some(mut audio) = self.world.get_resource_mut::<AudioStatus>() {
            audio.alive = alive;
        }
    }

    /// Take every presentation cue posted since the last call.
    pub fn drain_presentation(&mut self) -> Vec<PresentationEvent> {
        self.world
            .get_resource_mut::<PresentationOutbox>()
            .map(|mut outbox| outbox.drain())
            .unwrap_or_default()
    }

    // ========================================================================
    // GRID QUERIES
    // ========================================================================

    pub fn tile_at(&mut self, point: Point) -> Option<EntityId> {
        self.occupancy().tile_at(point).map(|o| o.id)
    }

    pub fn bomb_at(&mut self, point: Point) -> Option<EntityId> {
        self.occupancy().bomb_at(point).map(|o| o.id)
    }

    pub fn creature_at(&mut self, point: Point) -> Option<EntityId> {
        self.occupancy().creature_at(point).map(|o| o.id)
    }

    pub fn player_at(&mut self, point: Point) -> Option<EntityId> {
        self.occupancy().player_at(point).map(|o| o.id)
    }

    pub(crate) fn occupancy(&mut self) -> Occupancy {
        Occupancy::from_world(&mut self.world)
    }

    // ========================================================================
    // ENTITY ACCESS
    // ========================================================================

    /// Component of a live entity, `None` when absent.
    pub fn component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.world.get::<T>(self.entity_of(id)?)
    }

    pub(crate) fn component_mut<T: Component>(&mut self, id: EntityId) -> Option<Mut<'_, T>> {
        let entity = self.entity_of(id)?;
        self.world.get_mut::<T>(entity)
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        self.entity_of(id).is_some()
    }

    pub fn kind_of(&self, id: EntityId) -> Option<EntityKind> {
        self.world.get_resource::<LiveCollections>()?.kind(id)
    }

    pub fn state_of(&self, id: EntityId) -> Option<StateKind> {
        self.component::<StateMachine>(id)?.current_kind()
    }

    pub fn position_of(&self, id: EntityId) -> Option<Point> {
        self.component::<GridPosition>(id).map(|p| p.0)
    }

    /// Registered `player1` / `player2` reference.
    pub fn player(&self, index: PlayerIndex) -> Option<EntityId> {
        self.world.get_resource::<LiveCollections>()?.player(index)
    }

    pub fn live_count(&self) -> usize {
        self.world.get_resource::<LiveCollections>().map_or(0, LiveCollections::len)
    }

    pub fn collection(&self, collection: Collection) -> Vec<EntityId> {
        self.world
            .get_resource::<LiveCollections>()
            .map(|live| live.collection(collection).to_vec())
            .unwrap_or_default()
    }

    pub(crate) fn entity_of(&self, id: EntityId) -> Option<Entity> {
        self.world.get_resource::<LiveCollections>()?.entity(id)
    }

    pub(crate) fn archetype_of(&self, id: EntityId) -> Option<Arc<ArchetypeConfig>> {
        self.component::<Archetype>(id).map(|a| Arc::clone(&a.0))
    }

    /// Resolve an archetype link, logging a missing one.
    pub(crate) fn linked(&self, name: Option<&str>) -> Option<Arc<ArchetypeConfig>> {
        match self.library.link(name) {
            Ok(archetype) => archetype,
            Err(err) => {
                warn!("{}", err);
                None
            }
        }
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// Whether `id` may enter `next` right now.
    pub fn allows(&self, id: EntityId, next: StateKind) -> bool {
        let Some(entity) = self.entity_of(id) else {
            return false;
        };
        let (Some(kind), Some(archetype), Some(machine)) = (
            self.world.get::<EntityKind>(entity),
            self.world.get::<Archetype>(entity),
            self.world.get::<StateMachine>(entity),
        ) else {
            return false;
        };
        let ctx = TransitionContext::new(*kind, self.world.get::<Creature>(entity));
        machine.check(&ctx, archetype, next).is_ok()
    }

    /// Request a transition of a live entity. Illegal requests are logged and
    /// leave the entity unchanged.
    pub fn transition(&mut self, id: EntityId, next: StateKind) -> bool {
        let Some(entity) = self.entity_of(id) else {
            warn!("{}", TransitionError::UnknownEntity(id));
            return false;
        };
        let (Some(kind), Some(archetype)) = (
            self.world.get::<EntityKind>(entity).copied(),
            self.world.get::<Archetype>(entity).map(|a| Arc::clone(&a.0)),
        ) else {
            return false;
        };
        let mut creature = self.world.get::<Creature>(entity).copied();
        let entered = self.world.resource_scope(|world, mut outbox: Mut<PresentationOutbox>| {
            world.get_mut::<StateMachine>(entity).is_some_and(|mut machine| {
                systems::transition(id, kind, &archetype, &mut machine, creature.as_mut(), &mut outbox, next)
            })
        });
        if entered {
            if let (Some(updated), Some(mut slot)) = (creature, self.world.get_mut::<Creature>(entity)) {
                *slot = updated;
            }
        }
        entered
    }

    // ========================================================================
    // PRESENTATION HELPERS
    // ========================================================================

    pub(crate) fn post(&mut self, event: PresentationEvent) {
        if let Some(mut outbox) = self.world.get_resource_mut::<PresentationOutbox>() {
            outbox.push(event);
        }
    }

    pub(crate) fn post_hud(&mut self, id: EntityId) {
        let status = match (self.component::<Player>(id), self.component::<Creature>(id)) {
            (Some(player), Some(creature)) => HudStatus::new(player, creature.lives),
            _ => return,
        };
        self.post(PresentationEvent::Hud(status));
    }

    pub(crate) fn add_score(&mut self, value: u32) {
        if value == 0 {
            return;
        }
        self.score += value;
        let score = self.score;
        self.post(PresentationEvent::ScoreChanged { score });
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&mut self) -> Snapshot {
        let mut snapshot = Snapshot::from_world(&mut self.world, self.tick, self.time);
        snapshot.score = self.score;
        snapshot.time_remaining = self.countdown.map(|r| r.max(0.0));
        snapshot.outcome = self.outcome;
        snapshot
    }

    /// Get snapshot as JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    pub fn outcome(&self) -> Option<LevelOutcome> {
        self.outcome
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn current_time(&self) -> f32 {
        self.time
    }

    pub fn time_remaining(&self) -> Option<f32> {
        self.countdown.map(|r| r.max(0.0))
    }

    pub fn is_sudden_death(&self) -> bool {
        self.sudden_death
    }

    pub fn library(&self) -> &ArchetypeLibrary {
        &self.library
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Get read-only access to the ECS world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Direction;

    fn library() -> ArchetypeLibrary {
        ArchetypeLibrary::from_json_str(
            r#"{
                "wall": { "states": ["Spawn"] },
                "block": { "states": ["Spawn", "Destroy"] },
                "hero": { "states": ["Spawn", "Control", "Hit", "Destroy", "Cheer"], "lives": 1, "speed": 10.0, "bomb": "bomb" },
                "bomb": { "states": ["Spawn", "Destroy"], "fuse": 0.5, "explosion": "blast" },
                "blast": { "states": ["Spawn", "Destroy"], "animations": { "Destroy": { "first": 0, "count": 2, "fps": 4.0 } } },
                "grunt": { "states": ["Spawn", "Roam", "Hit", "Destroy"], "speed": 2.0 }
            }"#,
        )
        .unwrap()
    }

    fn run(game: &mut Game, frames: usize, start: f64) -> f64 {
        let mut t = start;
        for _ in 0..frames {
            game.update(t);
            t += 0.05;
        }
        t
    }

    #[test]
    fn test_new_game() {
        let game = Game::new(library());
        assert_eq!(game.current_tick(), 0);
        assert_eq!(game.live_count(), 0);
        assert!(game.outcome().is_none());
    }

    #[test]
    fn test_first_tick_has_zero_delta() {
        let mut game = Game::new(library());
        game.update(100.0);
        assert_eq!(game.current_time(), 0.0);
        game.update(100.1);
        assert!((game.current_time() - 0.1).abs() < 1e-6);
        // Clock going backwards is treated as no time passing.
        game.update(99.0);
        assert!((game.current_time() - 0.1).abs() < 1e-6);
        // Long stalls are capped.
        game.update(200.0);
        assert!((game.current_time() - 0.35).abs() < 1e-5);
    }

    #[test]
    fn test_additions_go_live_at_next_flush() {
        let mut game = Game::new(library());
        let wall = game.library().get("wall").unwrap();
        let id = game.add_entity(Blueprint::tile(wall, TileType::Wall, Point::new(2, 3)));
        assert!(!game.is_live(id));
        assert_eq!(game.tile_at(Point::new(2, 3)), None);
        game.update(0.0);
        assert!(game.is_live(id));
        assert_eq!(game.tile_at(Point::new(2, 3)), Some(id));
        let visual = game.component::<VisualHandle>(id).unwrap();
        assert_eq!(visual.owner, Some(id));
        assert_eq!(visual.position, (80.0, 112.0));
    }

    #[test]
    fn test_removals_stay_queryable_until_flush() {
        let mut game = Game::new(library());
        let wall = game.library().get("wall").unwrap();
        let id = game.add_entity(Blueprint::tile(wall, TileType::Wall, Point::new(0, 0)));
        game.update(0.0);
        game.remove_entity(id);
        assert_eq!(game.tile_at(Point::new(0, 0)), Some(id));
        game.update(0.05);
        assert!(!game.is_live(id));
        assert_eq!(game.tile_at(Point::new(0, 0)), None);
        assert!(game.drain_presentation().contains(&PresentationEvent::Detach { id }));
    }

    #[test]
    fn test_player_gets_player_controller_and_control() {
        let mut game = Game::new(library());
        let hero = game.library().get("hero").unwrap();
        let id = game.add_entity(Blueprint::player(hero, PlayerIndex::Player1, Point::new(1, 1), None));
        game.update(0.0);
        assert_eq!(game.player(PlayerIndex::Player1), Some(id));
        assert!(game.component::<PlayerController>(id).is_some());
        assert!(game.component::<CpuController>(id).is_none());
        // Spawn has no animation, so it completes on its first tick.
        assert_eq!(game.state_of(id), Some(StateKind::Control));
    }

    #[test]
    fn test_held_direction_moves_player() {
        let mut game = Game::new(library());
        let hero = game.library().get("hero").unwrap();
        let id = game.add_entity(Blueprint::player(hero, PlayerIndex::Player1, Point::new(1, 1), None));
        game.update(0.0);
        game.action_started(PlayerIndex::Player1, Action::MoveRight);
        run(&mut game, 4, 0.05);
        assert_eq!(game.position_of(id), Some(Point::new(2, 1)));
        assert_eq!(game.component::<Heading>(id), Some(&Heading(Direction::Right)));
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut game = Game::new(library());
        let wall = game.library().get("wall").unwrap();
        let id = game.add_entity(Blueprint::tile(wall, TileType::Wall, Point::new(0, 0)));
        game.update(0.0);
        assert!(!game.allows(id, StateKind::Destroy));
        assert!(!game.transition(id, StateKind::Destroy));
        assert_eq!(game.state_of(id), Some(StateKind::Spawn));
        assert!(!game.transition(EntityId(999), StateKind::Spawn));
    }

    #[test]
    fn test_destroy_reentry_keeps_lives() {
        let mut game = Game::new(library());
        let grunt = game.library().get("grunt").unwrap();
        let id = game.add_entity(Blueprint::monster(grunt, Point::new(4, 4), false));
        run(&mut game, 2, 0.0);
        assert_eq!(game.state_of(id), Some(StateKind::Roam));

        assert!(game.transition(id, StateKind::Destroy));
        assert!(!game.transition(id, StateKind::Destroy));
        assert_eq!(game.component::<Creature>(id).unwrap().lives, -1);
        // Out of lives: no way back to Spawn.
        assert!(!game.allows(id, StateKind::Spawn));
    }

    #[test]
    fn test_configure_level_rejects_missing_archetype() {
        let mut game = Game::new(library());
        let level = LevelDefinition::from_json_str(
            r#"{ "rows": ["111", "101", "111"],
                 "theme": { "wall": "wall", "destructible": "block", "indestructible": "wall" },
                 "monsters": [{ "archetype": "ghost", "position": { "x": 1, "y": 1 } }] }"#,
        )
        .unwrap();
        assert!(matches!(game.configure_level(&level), Err(ConfigError::MissingArchetype(_))));
        game.update(0.0);
        assert_eq!(game.live_count(), 0);
    }

    #[test]
    fn test_second_bomb_on_a_cell_never_goes_live() {
        let mut game = Game::new(library());
        let bomb = game.library().get("bomb").unwrap();
        let cell = Point::new(2, 2);
        let first = game.add_entity(Blueprint::bomb(Arc::clone(&bomb), cell, None, 1, 0.5));
        let second = game.add_entity(Blueprint::bomb(Arc::clone(&bomb), cell, None, 1, 0.5));
        game.update(0.0);
        assert!(game.is_live(first));
        assert!(!game.is_live(second));
        assert_eq!(game.collection(Collection::Bombs), vec![first]);

        // Still refused while the first bomb sits there.
        let third = game.add_entity(Blueprint::bomb(bomb, cell, None, 1, 0.5));
        game.update(0.05);
        assert!(!game.is_live(third));
        assert_eq!(game.bomb_at(cell), Some(first));
    }

    #[test]
    fn test_sounds_wait_for_audio_engine() {
        let library = ArchetypeLibrary::from_json_str(
            r#"{ "bell": { "states": ["Spawn"], "sounds": { "Spawn": "ding" } } }"#,
        )
        .unwrap();
        let mut game = Game::new(library);
        let bell = game.library().get("bell").unwrap();
        game.set_audio_alive(false);
        game.add_entity(Blueprint::tile(Arc::clone(&bell), TileType::Wall, Point::new(0, 0)));
        game.update(0.0);
        let sounds = |events: Vec<PresentationEvent>| {
            events.iter().filter(|e| matches!(e, PresentationEvent::PlaySound { .. })).count()
        };
        assert_eq!(sounds(game.drain_presentation()), 0);

        game.set_audio_alive(true);
        game.add_entity(Blueprint::tile(bell, TileType::Wall, Point::new(1, 0)));
        game.update(0.05);
        assert_eq!(sounds(game.drain_presentation()), 1);
    }

    #[test]
    fn test_snapshot_json() {
        let mut game = Game::new(library());
        let wall = game.library().get("wall").unwrap();
        game.add_entity(Blueprint::tile(wall, TileType::Wall, Point::new(0, 0)));
        game.update(0.0);
        let json = game.snapshot_json();
        assert!(json.contains("entities"));
        assert!(json.contains("Wall"));
    }
}

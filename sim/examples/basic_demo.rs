//! Basic demonstration of the Blast Arena simulation.
//!
//! Run with: cargo run --example basic_demo
//! Set `RUST_LOG=debug` to follow state transitions.

use blast_sim::config::{Placement, PowerUpPlacement, Theme};
use blast_sim::{
    Action, ArchetypeLibrary, ContactOutcome, Game, LevelDefinition, Point, PowerUpType, PlayerIndex,
    PresentationEvent,
};

const ARCHETYPES: &str = include_str!("../tests/fixtures/archetypes.json");

fn main() {
    env_logger::init();
    println!("=== Blast Arena - Simulation Demo ===\n");

    let library = ArchetypeLibrary::from_json_str(ARCHETYPES).expect("demo archetypes");
    let mut game = Game::new(library);

    let level = LevelDefinition {
        name: "demo".into(),
        rows: vec![
            "111111111".into(),
            "100020001".into(),
            "103030301".into(),
            "100000001".into(),
            "103030301".into(),
            "100020001".into(),
            "111111111".into(),
        ],
        theme: Theme { wall: "wall".into(), destructible: "block".into(), indestructible: "hard_block".into() },
        players: vec![Placement { archetype: "hero".into(), position: Point::new(1, 1), boss: false }],
        monsters: vec![
            Placement { archetype: "walker".into(), position: Point::new(7, 5), boss: false },
            Placement { archetype: "archer".into(), position: Point::new(7, 3), boss: false },
        ],
        props: Vec::new(),
        power_ups: vec![PowerUpPlacement {
            archetype: "range_up".into(),
            kind: PowerUpType::ExplosionRange,
            position: Point::new(1, 3),
        }],
        duration: Some(8.0),
    };
    game.configure_level(&level).expect("demo level");

    // Walk down onto the power-up, drop a bomb, then retreat.
    let script: [(f64, Action, bool); 6] = [
        (0.1, Action::MoveDown, true),
        (0.4, Action::MoveDown, false),
        (0.5, Action::DropBomb, true),
        (0.6, Action::MoveUp, true),
        (0.9, Action::MoveUp, false),
        (2.0, Action::MoveRight, true),
    ];

    println!("Running simulation for 240 ticks (12 seconds at 20 ticks/sec)...\n");
    let mut clock = 0.0;
    for tick in 0..240 {
        for (at, action, pressed) in script {
            if (clock - at).abs() < 0.025 {
                if pressed {
                    game.action_started(PlayerIndex::Player1, action);
                } else {
                    game.action_stopped(PlayerIndex::Player1, action);
                }
            }
        }

        game.update(clock);
        clock += 0.05;

        for outcome in game.grid_contacts() {
            if outcome != ContactOutcome::Ignored {
                println!("  contact: {:?}", outcome);
            }
        }
        for event in game.drain_presentation() {
            match event {
                PresentationEvent::Hud(hud) => println!("  hud: {:?}", hud),
                PresentationEvent::ScoreChanged { score } => println!("  score: {}", score),
                PresentationEvent::TimeRemaining { seconds } => println!("  time left: {}s", seconds),
                PresentationEvent::SpeedChanged { id, multiplier } => {
                    println!("  {:?} speeds up x{:.1}", id, multiplier)
                }
                PresentationEvent::LevelFinished { outcome } => println!("  level finished: {:?}", outcome),
                _ => {}
            }
        }

        if (tick + 1) % 40 == 0 {
            println!(
                "--- Tick {} (t={:.1}s): {} live entities ---",
                game.current_tick(),
                game.current_time(),
                game.live_count()
            );
        }
        if game.outcome().is_some() {
            break;
        }
    }

    // Final snapshot as JSON
    println!("\n=== Final State (JSON) ===\n");
    println!("{}", game.snapshot().to_json_pretty().expect("snapshot json"));
}

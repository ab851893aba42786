//! Voidwalker Simulator
//!
//! Headless driver for the Voidwalker core. Loads a config (the built-in
//! demo, or a JSON file given as the first argument), plays a scripted run,
//! then replays the recorded input and checks the final state hash.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use voidwalker::{
    game::{
        events::{sort_events, GameEventData},
        input::{HeldKeys, InputRecording, InputTracker},
        tick::replay,
    },
    tick, GameConfig, InlineLevels, MemoryScoreboard, TickContext, TsvScoreboard, World,
    FRAME_RATE, VERSION,
};

/// Frames to simulate in the demo run.
const DEMO_FRAMES: u64 = 900;

const DEMO_CONFIG: &str = r##"{
    "currentLevel": "Level1",
    "tile_size": 48,
    "player": {"upgrades": {"extra_live": 1}},
    "scoring": {"exploration_points": true},
    "legend": {
        "#": {"shape": "rect", "color": [90, 90, 110], "solid": true},
        "*": {"shape": "circle", "color": [250, 210, 60], "consumable": true, "consumable_as": ".",
              "on_collision": {"player": {"score": 100}}},
        "J": {"shape": "circle", "color": [60, 200, 250], "consumable": true,
              "title": "High Jump", "description": "Jump higher",
              "on_collision": {"player": {"upgrades": {"high_jump": 1}}}},
        "^": {"shape": "triangle", "orientation": "up", "color": [220, 40, 40],
              "on_collision": {"player": {"alive": false}}},
        "G": {"shape": "rect", "color": [40, 220, 90], "on_collision": {"currentLevel": "Level2"}}
    },
    "levels": {
        "Level1": "..........\n..........\nS..*..J..^...G\n##############",
        "Level2": {
            "map": "S....*....\n####..####\n..........\n##########",
            "legend": {"*": {"on_collision": {"player": {"score": 500}}}}
        }
    }
}"##;

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    info!("Voidwalker Simulator v{}", VERSION);
    info!("Frame Rate: {} Hz", FRAME_RATE);

    let config = load_config()?;
    demo_run(config)
}

fn load_config() -> Result<GameConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading config {}", path))?;
            GameConfig::from_json_str(&text).with_context(|| format!("parsing config {}", path))
        }
        None => GameConfig::from_json_str(DEMO_CONFIG).context("parsing built-in demo config"),
    }
}

/// Held keys for frame `t` of the scripted run: walk right, hop now and then.
fn scripted_keys(t: u64) -> HeldKeys {
    HeldKeys {
        right: true,
        jump: t % 45 < 3,
        shift: t % 90 > 60,
        ..HeldKeys::default()
    }
}

fn demo_run(config: GameConfig) -> Result<()> {
    info!("=== Starting Demo Run ===");

    let levels = InlineLevels::from_config(&config);
    let started = Utc::now();
    let dt = 1.0 / FRAME_RATE as f32;

    let mut world = World::new(config.clone(), &levels, started).context("building world")?;
    let mut scoreboard = TsvScoreboard::new(&config.scoreboard_file);
    let mut tracker = InputTracker::new();
    let mut recording = InputRecording::new();

    info!(level = %world.game().current_level, spawn = %world.spawn_position(), "run started");

    let mut total_events = 0;
    for t in 0..DEMO_FRAMES {
        let input = tracker.next_frame(scripted_keys(t));
        recording.record(t, input);

        let mut ctx = TickContext {
            levels: &levels,
            scoreboard: &mut scoreboard,
        };
        let mut result = tick(&mut world, &input, dt, &mut ctx);
        total_events += result.events.len();

        // Deaths first, then damage, triggers, level changes
        sort_events(&mut result.events);
        for event in &result.events {
            match &event.data {
                GameEventData::LevelSwitched { from, to } => info!("Level {} -> {}", from, to),
                GameEventData::LifeLost { cause, lives_left } => {
                    info!("Life lost ({:?}), {} left", cause, lives_left)
                }
                GameEventData::PlayerDied { level, score, .. } => {
                    info!("Run ended on {} with score {}", level, score)
                }
                _ => {}
            }
        }
        if let Some(err) = result.level_error {
            warn!("level switch failed: {}", err);
        }
        if let Some(ui) = world.take_pending_ui() {
            info!("UI requested: {}", ui);
        }
        if result.died || result.quit {
            break;
        }
    }

    // Print final results
    info!("=== Run Results ===");
    let player = world.player();
    info!(
        "Level: {}  Score: {}  Lives: {}  Phase: {:?}",
        world.game().current_level,
        player.score,
        player.lives,
        world.game().phase
    );
    let hash = world.compute_hash();
    info!("Final State Hash: {}", hex::encode(hash));
    info!("Total events: {}", total_events);

    match scoreboard.top_scores(5) {
        Ok(top) => {
            for (i, entry) in top.iter().enumerate() {
                info!("#{}: {} {} {}", i + 1, entry.level, entry.score, entry.timestamp);
            }
        }
        Err(err) => warn!("could not read scoreboard: {}", err),
    }

    // Verify determinism by replaying
    info!("=== Verifying Determinism ===");
    let mut replay_world = World::new(config, &levels, started).context("building replay world")?;
    let mut replay_board = MemoryScoreboard::new();
    let mut ctx = TickContext {
        levels: &levels,
        scoreboard: &mut replay_board,
    };
    replay(&mut replay_world, &recording, dt, &mut ctx);

    let replay_hash = replay_world.compute_hash();
    info!("Replay State Hash: {}", hex::encode(replay_hash));

    if hash != replay_hash {
        bail!("determinism check failed: hashes differ");
    }
    info!("Determinism verified: hashes match");
    Ok(())
}

//! Simulation Tick
//!
//! One call advances the world by one frame. The step order is fixed:
//!
//! 1. physics (input, gravity, jumps)
//! 2. collision (solid response, grounding, overlaps, fall damage)
//! 3. triggers, in row-major overlap order
//! 4. pending level switch
//! 5. death
//! 6. exploration score
//!
//! Given the same world, inputs and dt sequence, the result is identical.

use std::collections::BTreeSet;

use tracing::{debug, error, info};

use crate::game::collision;
use crate::game::events::{DamageCause, GameEvent, GameEventData, EventPriority};
use crate::game::input::{InputFrame, InputRecording};
use crate::game::level::{LevelLoadError, LevelSource, TileCoord};
use crate::game::patch::{self, SideEffect};
use crate::game::physics;
use crate::game::scoreboard::{ScoreEntry, Scoreboard};
use crate::game::state::{GamePhase, World};

/// Collaborators a tick may call into.
pub struct TickContext<'a> {
    /// Where level switches load from
    pub levels: &'a dyn LevelSource,
    /// Where finished runs are recorded
    pub scoreboard: &'a mut dyn Scoreboard,
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Side effects requested by patches this tick
    pub side_effects: Vec<SideEffect>,
    /// Level switch that failed this tick
    pub level_error: Option<LevelLoadError>,
    /// Whether the run ended this tick
    pub died: bool,
    /// Whether the world is in the terminal quit phase
    pub quit: bool,
}

/// Run one simulation tick.
///
/// `dt` is clamped to `[0, max_step_seconds]`.
pub fn tick(world: &mut World, input: &InputFrame, dt: f32, ctx: &mut TickContext<'_>) -> TickResult {
    let mut result = TickResult::default();

    // Phase-specific logic
    match world.game.phase {
        GamePhase::Quit => {
            result.quit = true;
            return result;
        }
        _ if input.quit_pressed() => {
            world.game.phase = GamePhase::Quit;
            info!(tick = world.game.tick, "quit");
            result.events.push(GameEvent::new(world.game.tick, EventPriority::Other, GameEventData::Quit));
            result.quit = true;
            return result;
        }
        GamePhase::Dead => {
            if input.restart_pressed() {
                restart(world, &mut result);
            }
            return result;
        }
        GamePhase::Playing | GamePhase::LevelTransition => {
            if input.restart_pressed() {
                restart(world, &mut result);
                return result;
            }
        }
    }

    let dt = if dt.is_finite() {
        dt.max(0.0).min(world.config.max_step())
    } else {
        0.0
    };
    world.game.tick += 1;
    world.game.run_time += f64::from(dt);
    let tile = world.config.tile();

    // 1. Physics
    let was_grounded = world.player.grounded;
    let prev_y = world.player.pos.y;
    let delta = physics::integrate(&mut world.player, input, dt, &world.tables);

    // 2. Collision
    let outcome = collision::resolve_move(
        world.player.aabb(),
        delta,
        &world.level.grid,
        &world.level.rules,
        tile,
    );
    let fall = physics::after_move(&mut world.player, &outcome, was_grounded, prev_y, tile, &world.tables);

    let mut damage = None;
    if let Some(fall) = fall {
        debug!(
            distance = fall.distance_tiles,
            threshold = fall.threshold_tiles,
            "fall damage"
        );
        lose_life(world, DamageCause::FallDamage, true, &mut result);
        damage = Some(DamageCause::FallDamage);
    }

    // 3. Triggers
    if damage.is_none() && world.player.alive {
        damage = process_triggers(world, &outcome.overlaps, &mut result);
    }

    if damage.is_none() && world.player.alive && below_death_line(world) {
        let buffered = world.config.damage.out_of_world_uses_life_buffer;
        lose_life(world, DamageCause::OutOfWorld, buffered, &mut result);
        damage = Some(DamageCause::OutOfWorld);
    }

    // 4. Level switch
    let mut switched = false;
    if let Some(name) = world.game.pending_level_switch.take() {
        switched = switch_level(world, &name, ctx.levels, &mut result);
    }

    // 5. Death
    if !world.player.alive || world.player.lives == 0 {
        finish_run(world, damage, ctx.scoreboard, &mut result);
        return result;
    }

    // 6. Exploration
    if world.config.scoring.exploration_points {
        award_exploration(world, tile, &mut result);
    }

    if world.player.grounded && damage.is_none() && !switched {
        world.player.safe_point = world.player.pos;
    }

    result
}

/// Replay a recorded run, one tick per recorded frame.
///
/// Stops early once the world quits. Returns every event in emission order.
pub fn replay(
    world: &mut World,
    recording: &InputRecording,
    dt: f32,
    ctx: &mut TickContext<'_>,
) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for t in 0..=recording.end_tick() {
        let result = tick(world, &recording.input_at(t), dt, ctx);
        events.extend(result.events);
        if result.quit {
            break;
        }
    }
    events
}

// =============================================================================
// STEP HELPERS
// =============================================================================

/// Apply collision patches for every overlapped tile, in order.
///
/// Stops at the first damage; returns its cause.
fn process_triggers(
    world: &mut World,
    overlaps: &[(char, TileCoord)],
    result: &mut TickResult,
) -> Option<DamageCause> {
    let tick = world.game.tick;
    let mut consumed: BTreeSet<TileCoord> = BTreeSet::new();

    for &(_, coord) in overlaps {
        if consumed.contains(&coord) {
            continue;
        }

        // Read the live symbol: an earlier trigger may have rewritten it.
        let symbol = world.level.grid.at_coord(coord);
        let rule = world.level.rules.rule(symbol);
        if !rule.is_trigger() {
            continue;
        }
        let Some(on_collision) = &rule.on_collision else {
            continue;
        };

        let effects = patch::apply(on_collision, &mut world.player, &mut world.game, &world.tables);
        result.side_effects.extend(effects);
        result.events.push(GameEvent::tile_triggered(tick, symbol, coord));
        debug!(%symbol, x = coord.x, y = coord.y, "tile triggered");

        if rule.consumable {
            let became = rule.consumed_symbol();
            world.level.grid.set_symbol(coord.x, coord.y, became);
            consumed.insert(coord);
            result.events.push(GameEvent::tile_consumed(tick, symbol, became, coord));
            debug!(%symbol, %became, x = coord.x, y = coord.y, "tile consumed");
        }

        if !world.player.alive {
            let buffered = world.config.damage.hazards_use_life_buffer;
            lose_life(world, DamageCause::Hazard, buffered, result);
            return Some(DamageCause::Hazard);
        }
        if world.player.lives == 0 {
            return Some(DamageCause::LivesExhausted);
        }
    }

    None
}

/// Spend one life.
///
/// With the buffer and a spare life the player keeps going from the last
/// safe point; otherwise this was the last life.
fn lose_life(world: &mut World, cause: DamageCause, buffered: bool, result: &mut TickResult) {
    let player = &mut world.player;
    if buffered && player.lives > 1 {
        player.lives -= 1;
        player.alive = true;
        let safe = player.safe_point;
        player.reposition(safe);

        info!(?cause, lives = player.lives, "life lost");
        result.events.push(GameEvent::life_lost(world.game.tick, cause, player.lives));
    } else {
        player.lives = player.lives.saturating_sub(1);
        player.alive = false;
    }
}

fn below_death_line(world: &World) -> bool {
    let tile = world.config.tile();
    let (_, height) = world.level.grid.bounds();
    let death_y = height as f32 * tile + tile * 2.0;
    world.player.pos.y > death_y
}

fn switch_level(world: &mut World, name: &str, levels: &dyn LevelSource, result: &mut TickResult) -> bool {
    let tick = world.game.tick;
    let from = world.level.name.clone();

    world.game.phase = GamePhase::LevelTransition;
    let switched = match world.switch_level(name, levels) {
        Ok(()) => {
            result.events.push(GameEvent::level_switched(tick, &from, &world.level.name));
            true
        }
        Err(err) => {
            error!(requested = name, error = %err, "level load failed");
            result.events.push(GameEvent::level_load_failed(tick, name, err.to_string()));
            result.level_error = Some(err);
            false
        }
    };
    world.game.phase = GamePhase::Playing;
    switched
}

fn finish_run(
    world: &mut World,
    cause: Option<DamageCause>,
    scoreboard: &mut dyn Scoreboard,
    result: &mut TickResult,
) {
    let tick = world.game.tick;
    world.player.alive = false;
    world.game.phase = GamePhase::Dead;
    result.died = true;

    let entry = ScoreEntry {
        timestamp: world.game.now(),
        level: world.level.name.clone(),
        score: world.player.score,
    };
    let cause = cause.or(if world.player.lives == 0 {
        Some(DamageCause::LivesExhausted)
    } else {
        None
    });

    info!(level = %entry.level, score = entry.score, ?cause, "player died");
    result.events.push(GameEvent::player_died(tick, cause, &entry.level, entry.score));

    match scoreboard.record(&entry) {
        Ok(()) => result.events.push(GameEvent::new(
            tick,
            EventPriority::Death,
            GameEventData::ScoreRecorded {
                level: entry.level,
                score: entry.score,
            },
        )),
        Err(err) => {
            error!(error = %err, "scoreboard write failed");
            result.events.push(GameEvent::new(
                tick,
                EventPriority::Other,
                GameEventData::ScoreboardWriteFailed {
                    reason: err.to_string(),
                },
            ));
        }
    }
}

/// +1 per new maximum tile column and per new maximum tile row.
fn award_exploration(world: &mut World, tile: f32, result: &mut TickResult) {
    let tick = world.game.tick;
    let player = &mut world.player;
    let here = player.tile(tile);

    if here.x > player.max_tile_x {
        player.max_tile_x = here.x;
        player.score += 1;
        result.events.push(GameEvent::exploration_point(tick, here, player.score));
    }
    if here.y > player.max_tile_y {
        player.max_tile_y = here.y;
        player.score += 1;
        result.events.push(GameEvent::exploration_point(tick, here, player.score));
    }
}

fn restart(world: &mut World, result: &mut TickResult) {
    world.restart();
    result.events.push(GameEvent::new(
        world.game.tick,
        EventPriority::Other,
        GameEventData::Restarted {
            level: world.level.name.clone(),
        },
    ));
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::GameConfig;
    use crate::game::level::InlineLevels;
    use crate::game::scoreboard::{MemoryScoreboard, ScoreboardError};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    const DT: f32 = 1.0 / 60.0;

    fn legend() -> Value {
        json!({
            "#": {"shape": "rect", "solid": true},
            "*": {"shape": "circle", "consumable": true, "consumable_as": "d",
                  "on_collision": {"player": {"score": 100}}},
            "d": {"shape": "none"},
            "G": {"shape": "rect", "on_collision": {"currentLevel": "Level2"}},
            "^": {"shape": "triangle", "on_collision": {"player": {"alive": false}}}
        })
    }

    struct Harness {
        world: World,
        levels: InlineLevels,
        board: MemoryScoreboard,
    }

    impl Harness {
        fn new(overrides: Value) -> Self {
            let mut raw = json!({"currentLevel": "Level1", "legend": legend()});
            crate::game::config::merge_json(&mut raw, &overrides);
            let config = GameConfig::from_value(raw).unwrap();
            let levels = InlineLevels::from_config(&config);
            let started = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let world = World::new(config, &levels, started).unwrap();
            Self {
                world,
                levels,
                board: MemoryScoreboard::new(),
            }
        }

        fn step(&mut self, input: InputFrame) -> TickResult {
            let mut ctx = TickContext {
                levels: &self.levels,
                scoreboard: &mut self.board,
            };
            tick(&mut self.world, &input, DT, &mut ctx)
        }

        fn step_until(&mut self, input: InputFrame, max: usize, mut done: impl FnMut(&TickResult) -> bool) -> TickResult {
            for _ in 0..max {
                let result = self.step(input);
                if done(&result) {
                    return result;
                }
            }
            panic!("condition not reached in {} ticks", max);
        }
    }

    fn count<F: Fn(&GameEventData) -> bool>(events: &[GameEvent], f: F) -> usize {
        events.iter().filter(|e| f(&e.data)).count()
    }

    const RIGHT: InputFrame = InputFrame::with_horizontal(1);

    #[test]
    fn test_star_then_goal_scenario() {
        let mut h = Harness::new(json!({"levels": {
            "Level1": "S.*G\n####",
            "Level2": "S...\n####"
        }}));

        let mut star_triggers = 0;
        let mut consumed_at = None;
        let switch = h.step_until(RIGHT, 120, |r| {
            star_triggers += count(&r.events, |d| matches!(d, GameEventData::TileTriggered { symbol: '*', .. }));
            if consumed_at.is_none() && count(&r.events, |d| matches!(d, GameEventData::TileConsumed { .. })) > 0 {
                consumed_at = Some(());
            }
            r.side_effects.contains(&SideEffect::LevelSwitch("Level2".into()))
        });

        assert_eq!(star_triggers, 1);
        assert!(consumed_at.is_some());
        assert!(switch.level_error.is_none());
        assert_eq!(h.world.game().current_level, "Level2");
        assert_eq!(h.world.player().score, 100);
        assert_eq!(h.world.player().pos, h.world.spawn_position());
    }

    #[test]
    fn test_star_rewritten_and_score_stable() {
        let mut h = Harness::new(json!({"levels": {"Level1": "S.*....#\n########"}}));

        h.step_until(RIGHT, 60, |r| {
            count(&r.events, |d| matches!(d, GameEventData::TileConsumed { became: 'd', .. })) == 1
        });
        assert_eq!(h.world.grid().at(2, 0), 'd');
        assert_eq!(h.world.player().score, 100);

        // Walking on over the 'd' never re-awards
        for _ in 0..20 {
            let r = h.step(RIGHT);
            assert_eq!(count(&r.events, |d| matches!(d, GameEventData::TileTriggered { .. })), 0);
        }
        assert_eq!(h.world.player().score, 100);
    }

    #[test]
    fn test_goal_without_target_level_keeps_level() {
        let mut h = Harness::new(json!({"levels": {"Level1": "SG\n##"}}));

        let r = h.step_until(RIGHT, 60, |r| r.level_error.is_some());
        assert_eq!(r.level_error, Some(LevelLoadError::UnknownLevel("Level2".into())));
        assert_eq!(h.world.game().current_level, "Level1");
        assert_eq!(h.world.game().phase, GamePhase::Playing);
        assert!(h.world.game().pending_level_switch.is_none());
        assert_eq!(count(&r.events, |d| matches!(d, GameEventData::LevelLoadFailed { .. })), 1);
    }

    #[test]
    fn test_fall_speed_clamped() {
        let map = format!("S\n{}", ".\n".repeat(60));
        let mut h = Harness::new(json!({
            "player": {"gravity": [0, 1700], "max_fall": 1200},
            "levels": {"Level1": map}
        }));

        for _ in 0..120 {
            h.step(InputFrame::new());
            assert!(h.world.player().vel.y <= 1200.0);
        }
        assert_eq!(h.world.player().vel.y, 1200.0);
        assert!(h.world.player().alive);
    }

    #[test]
    fn test_extra_life_absorbs_hazard() {
        let mut h = Harness::new(json!({
            "player": {"upgrades": {"extra_live": 1}},
            "levels": {"Level1": "S..^\n####"}
        }));
        assert_eq!(h.world.player().lives, 2);

        let hit = h.step_until(RIGHT, 120, |r| {
            count(&r.events, |d| matches!(d, GameEventData::LifeLost { .. })) > 0
        });

        assert!(hit.events.iter().any(|e| matches!(
            e.data,
            GameEventData::LifeLost { cause: DamageCause::Hazard, lives_left: 1 }
        )));
        assert_eq!(h.world.player().lives, 1);
        assert!(h.world.player().alive);
        assert!(!hit.died);
        assert_eq!(h.world.player().pos, h.world.player().safe_point);
        assert_eq!(h.world.game().phase, GamePhase::Playing);

        // Standing still at the safe point costs nothing more
        for _ in 0..30 {
            h.step(InputFrame::new());
        }
        assert_eq!(h.world.player().lives, 1);
    }

    #[test]
    fn test_hazard_kills_without_buffer() {
        let mut h = Harness::new(json!({
            "player": {"upgrades": {"extra_live": 1}},
            "damage": {"hazards_use_life_buffer": false},
            "levels": {"Level1": "S.^\n###"}
        }));

        let r = h.step_until(RIGHT, 120, |r| r.died);
        assert_eq!(h.world.game().phase, GamePhase::Dead);
        assert!(!h.world.player().alive);
        assert!(r.events.iter().any(|e| matches!(
            e.data,
            GameEventData::PlayerDied { cause: Some(DamageCause::Hazard), .. }
        )));
        assert_eq!(h.board.entries.len(), 1);
        assert_eq!(h.board.entries[0].level, "Level1");
    }

    #[test]
    fn test_dead_waits_for_restart() {
        let mut h = Harness::new(json!({"levels": {"Level1": "S*^\n###"}}));
        h.step_until(RIGHT, 120, |r| r.died);
        let dead_tick = h.world.game().tick;

        let idle = h.step(RIGHT);
        assert!(idle.events.is_empty());
        assert_eq!(h.world.game().tick, dead_tick);

        let mut restart = InputFrame::new();
        restart.set_restart(true);
        let r = h.step(restart);

        assert!(matches!(r.events[0].data, GameEventData::Restarted { .. }));
        assert_eq!(h.world.game().phase, GamePhase::Playing);
        assert!(h.world.player().alive);
        assert_eq!(h.world.player().score, 0);
        assert_eq!(h.world.player().pos, h.world.spawn_position());
        // Consumed tiles come back
        assert_eq!(h.world.grid().changed_cells().count(), 0);
    }

    #[test]
    fn test_fall_damage_is_lethal_on_last_life() {
        let map = format!("S\n{}#", ".\n".repeat(11));
        let mut h = Harness::new(json!({"levels": {"Level1": map}}));

        let r = h.step_until(InputFrame::new(), 300, |r| r.died);
        assert!(r.events.iter().any(|e| matches!(
            e.data,
            GameEventData::PlayerDied { cause: Some(DamageCause::FallDamage), .. }
        )));
        assert_eq!(h.world.player().lives, 0);
    }

    #[test]
    fn test_fall_damage_spends_spare_life() {
        let map = format!("S\n{}#", ".\n".repeat(11));
        let mut h = Harness::new(json!({
            "player": {"upgrades": {"extra_live": 1}},
            "levels": {"Level1": map}
        }));

        let r = h.step_until(InputFrame::new(), 300, |r| !r.events.is_empty());
        assert!(r.events.iter().any(|e| matches!(
            e.data,
            GameEventData::LifeLost { cause: DamageCause::FallDamage, lives_left: 1 }
        )));
        assert!(h.world.player().alive);
        assert_eq!(h.world.player().pos, h.world.spawn_position());
    }

    #[test]
    fn test_short_fall_is_harmless() {
        let map = format!("S\n{}#", ".\n".repeat(4));
        let mut h = Harness::new(json!({"levels": {"Level1": map}}));
        for _ in 0..120 {
            let r = h.step(InputFrame::new());
            assert!(r.events.is_empty());
        }
        assert!(h.world.player().grounded);
        assert_eq!(h.world.player().lives, 1);
    }

    #[test]
    fn test_falling_out_of_world() {
        let mut h = Harness::new(json!({"levels": {"Level1": "S.."}}));
        let r = h.step_until(InputFrame::new(), 300, |r| r.died);
        assert!(r.events.iter().any(|e| matches!(
            e.data,
            GameEventData::PlayerDied { cause: Some(DamageCause::OutOfWorld), .. }
        )));
        assert!(h.world.player().pos.y > 3.0 * 48.0);
    }

    #[test]
    fn test_falling_out_of_world_spends_spare_life() {
        let mut h = Harness::new(json!({
            "player": {"upgrades": {"extra_live": 1}},
            "levels": {"Level1": "S....\n##..."}
        }));

        let r = h.step_until(RIGHT, 300, |r| !r.events.is_empty());
        assert!(r.events.iter().any(|e| matches!(
            e.data,
            GameEventData::LifeLost { cause: DamageCause::OutOfWorld, lives_left: 1 }
        )));
        assert!(!r.died);
        assert!(h.world.player().alive);
        assert_eq!(h.world.player().lives, 1);
        assert_eq!(h.world.player().pos, h.world.player().safe_point);
        // Last grounded spot was on the ledge
        assert!(h.world.player().safe_point.y < 48.0);
        assert_eq!(h.world.game().phase, GamePhase::Playing);
    }

    #[test]
    fn test_falling_out_of_world_without_buffer_ends_run() {
        let mut h = Harness::new(json!({
            "player": {"upgrades": {"extra_live": 1}},
            "damage": {"out_of_world_uses_life_buffer": false},
            "levels": {"Level1": "S....\n##..."}
        }));

        let r = h.step_until(RIGHT, 300, |r| !r.events.is_empty());
        assert!(r.died);
        assert!(r.events.iter().any(|e| matches!(
            e.data,
            GameEventData::PlayerDied { cause: Some(DamageCause::OutOfWorld), .. }
        )));
        assert!(!r.events.iter().any(|e| matches!(e.data, GameEventData::LifeLost { .. })));
        assert_eq!(h.world.game().phase, GamePhase::Dead);
    }

    #[test]
    fn test_lives_patched_to_zero_ends_run() {
        let mut h = Harness::new(json!({
            "legend": {"x": {"shape": "rect", "on_collision": {"player": {"lives": 0}}}},
            "levels": {"Level1": "S.x\n###"}
        }));
        let r = h.step_until(RIGHT, 120, |r| r.died);
        assert!(r.events.iter().any(|e| matches!(
            e.data,
            GameEventData::PlayerDied { cause: Some(DamageCause::LivesExhausted), .. }
        )));
    }

    #[test]
    fn test_two_consumables_in_one_step_fire_once_each() {
        let mut h = Harness::new(json!({
            "legend": {"+": {"shape": "circle", "consumable": true,
                             "on_collision": {"player": {"upgrades": {"speed": 1}}}}},
            "levels": {"Level1": "#S.*+....#\n##########"}
        }));

        let mut triggers = 0;
        let mut consumed = 0;
        for _ in 0..90 {
            let r = h.step(RIGHT);
            triggers += count(&r.events, |d| matches!(d, GameEventData::TileTriggered { .. }));
            consumed += count(&r.events, |d| matches!(d, GameEventData::TileConsumed { .. }));
        }
        assert_eq!(triggers, 2);
        assert_eq!(consumed, 2);
        assert_eq!(h.world.grid().at(3, 0), 'd');
        assert_eq!(h.world.grid().at(4, 0), '.');
        assert_eq!(h.world.player().score, 100);
    }

    #[test]
    fn test_ui_open_surfaced() {
        let mut h = Harness::new(json!({
            "legend": {"?": {"shape": "rect", "consumable": true,
                             "on_collision": {"ui": {"open": "shop"}, "future_key": 1}}},
            "levels": {"Level1": "S?\n##"}
        }));
        let r = h.step_until(RIGHT, 60, |r| !r.side_effects.is_empty());
        assert_eq!(r.side_effects, vec![SideEffect::OpenUi(json!("shop"))]);
        assert_eq!(h.world.take_pending_ui(), Some(json!("shop")));
        assert_eq!(h.world.take_pending_ui(), None);
    }

    #[test]
    fn test_exploration_awards_once_per_new_tile() {
        let mut h = Harness::new(json!({
            "scoring": {"exploration_points": true},
            "levels": {"Level1": "#S.....#\n########"}
        }));

        for _ in 0..40 {
            h.step(RIGHT);
        }
        let score = h.world.player().score;
        assert!(score > 0);
        assert_eq!(score, i64::from(h.world.player().max_tile_x - 1));

        for _ in 0..40 {
            h.step(InputFrame::with_horizontal(-1));
        }
        for _ in 0..40 {
            h.step(RIGHT);
        }
        assert_eq!(h.world.player().score, i64::from(h.world.player().max_tile_x - 1));
    }

    #[test]
    fn test_exploration_off_by_default() {
        let mut h = Harness::new(json!({"levels": {"Level1": "#S.....#\n########"}}));
        for _ in 0..40 {
            h.step(RIGHT);
        }
        assert_eq!(h.world.player().score, 0);
    }

    #[test]
    fn test_jump_budget_through_ticks() {
        let mut h = Harness::new(json!({
            "player": {"upgrades": {"double_jump": 1}},
            "levels": {"Level1": "........\n........\n....S...\n########"}
        }));
        for _ in 0..10 {
            h.step(InputFrame::new());
        }
        assert!(h.world.player().grounded);
        assert_eq!(h.world.player().air_jumps_left, 1);

        let jump = InputFrame::new().jumping();
        h.step(jump);
        assert!(!h.world.player().grounded);
        assert_eq!(h.world.player().air_jumps_left, 1);

        h.step(InputFrame::new());
        h.step(jump);
        assert_eq!(h.world.player().air_jumps_left, 0);
        h.step(jump);
        assert_eq!(h.world.player().air_jumps_left, 0);

        for _ in 0..120 {
            h.step(InputFrame::new());
        }
        assert!(h.world.player().grounded);
        assert_eq!(h.world.player().air_jumps_left, 1);
    }

    #[test]
    fn test_scoreboard_failure_does_not_block_death() {
        struct Broken;
        impl Scoreboard for Broken {
            fn record(&mut self, _: &ScoreEntry) -> Result<(), ScoreboardError> {
                Err(ScoreboardError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
            }
        }

        let h = Harness::new(json!({"levels": {"Level1": "S.."}}));
        let (mut world, levels) = (h.world, h.levels);
        let mut broken = Broken;

        let mut died = None;
        for _ in 0..300 {
            let mut ctx = TickContext { levels: &levels, scoreboard: &mut broken };
            let r = tick(&mut world, &InputFrame::new(), DT, &mut ctx);
            if r.died {
                died = Some(r);
                break;
            }
        }
        let r = died.expect("player should fall out of the world");
        assert!(r.events.iter().any(|e| matches!(e.data, GameEventData::ScoreboardWriteFailed { .. })));
        assert_eq!(world.game().phase, GamePhase::Dead);
    }

    #[test]
    fn test_quit_is_terminal() {
        let mut h = Harness::new(json!({"levels": {"Level1": "S.\n##"}}));
        let mut quit = InputFrame::new();
        quit.set_quit(true);

        let r = h.step(quit);
        assert!(r.quit);
        assert_eq!(h.world.game().phase, GamePhase::Quit);

        let tick_before = h.world.game().tick;
        let mut restart = InputFrame::new();
        restart.set_restart(true);
        assert!(h.step(restart).quit);
        assert_eq!(h.world.game().phase, GamePhase::Quit);
        assert_eq!(h.world.game().tick, tick_before);
    }

    #[test]
    fn test_dt_clamped() {
        let mut h = Harness::new(json!({"levels": {"Level1": "S.\n##"}}));
        let mut ctx = TickContext { levels: &h.levels, scoreboard: &mut h.board };
        tick(&mut h.world, &InputFrame::new(), 1.0, &mut ctx);
        assert!((h.world.game().run_time - 0.05).abs() < 1e-6);
        tick(&mut h.world, &InputFrame::new(), -1.0, &mut ctx);
        assert!((h.world.game().run_time - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_negative_step_cap_does_not_panic() {
        let mut h = Harness::new(json!({
            "max_step_seconds": -1.0,
            "levels": {"Level1": "S.\n##"}
        }));
        assert_eq!(h.world.config().max_step_seconds, 0.05);

        // Set behind the parser's back as well
        h.world.config.max_step_seconds = -1.0;
        h.step(RIGHT);
        h.step(RIGHT);
        assert!((h.world.game().run_time - 2.0 * f64::from(DT)).abs() < 1e-6);
        assert!(h.world.player().alive);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let overrides = json!({
            "scoring": {"exploration_points": true},
            "player": {"upgrades": {"double_jump": 1, "extra_live": 1}},
            "levels": {
                "Level1": "......\n.S.*.^G\n#######",
                "Level2": "S.....\n######"
            }
        });
        let script: Vec<InputFrame> = (0..200)
            .map(|i| match i % 50 {
                0 => RIGHT.jumping(),
                10..=30 => RIGHT,
                35 => InputFrame::new().jumping(),
                _ => InputFrame::with_horizontal(if i % 3 == 0 { -1 } else { 1 }),
            })
            .collect();

        let run = || {
            let mut h = Harness::new(overrides.clone());
            for input in &script {
                h.step(*input);
            }
            h.world.compute_hash()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_recording_replays_to_same_hash() {
        let overrides = json!({
            "player": {"upgrades": {"extra_live": 1}},
            "levels": {"Level1": "#S.*.^..#\n#########"}
        });

        let mut live = Harness::new(overrides.clone());
        let mut recording = InputRecording::new();
        for t in 0..150u64 {
            let input = match t {
                0..=59 => RIGHT,
                60 => InputFrame::new().jumping(),
                61..=99 => InputFrame::with_horizontal(-1),
                _ => RIGHT,
            };
            recording.record(t, input);
            live.step(input);
        }

        let mut fresh = Harness::new(overrides);
        let mut ctx = TickContext { levels: &fresh.levels, scoreboard: &mut fresh.board };
        let events = replay(&mut fresh.world, &recording, DT, &mut ctx);

        assert!(!events.is_empty());
        assert_eq!(fresh.world.game().tick, live.world.game().tick);
        assert_eq!(fresh.world.compute_hash(), live.world.compute_hash());
    }

    proptest! {
        #[test]
        fn prop_exploration_monotonic(moves in proptest::collection::vec(-1i8..=1, 1..150)) {
            let mut h = Harness::new(json!({
                "scoring": {"exploration_points": true},
                "levels": {"Level1": "#S.........#\n############"}
            }));

            let mut last = h.world.player().score;
            for m in moves {
                h.step(InputFrame::with_horizontal(m));
                let p = h.world.player();
                prop_assert!(p.score >= last);
                prop_assert_eq!(p.score, i64::from(p.max_tile_x - 1));
                last = p.score;
            }
        }
    }
}

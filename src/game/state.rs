//! Game State Definitions
//!
//! Player state, run state and the [`World`] that owns them together with
//! the active level. Upgrade levels live in a BTreeMap so hashing and
//! iteration are deterministic.

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::hash::{compute_state_hash, StateHash, StateHasher};
use crate::core::vec2::Vec2;
use crate::game::collision::Aabb;
use crate::game::config::{GameConfig, PlayerDefaults};
use crate::game::level::{spawn_world_position, LevelGrid, LevelLoadError, LevelSource, LoadedLevel, TileCoord};
use crate::game::tile::TileRuleSet;
use crate::game::upgrade::{UpgradeKind, UpgradeLevels, UpgradeTables};

/// Player box size in tiles (width, height).
pub const PLAYER_SIZE_TILES: (f32, f32) = (0.70, 0.90);

// =============================================================================
// PLAYER STATE
// =============================================================================

/// Physical parameters a patch may overwrite.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsParams {
    /// Base horizontal speed (pixels/s)
    pub speed: f32,
    /// Base jump impulse (pixels/s)
    pub jump_strength: f32,
    /// Gravity (pixels/s²); only `y` drives motion
    pub gravity: Vec2,
    /// Terminal downward velocity (pixels/s)
    pub max_fall: f32,
}

impl PhysicsParams {
    /// Parameters from config defaults.
    pub fn from_defaults(defaults: &PlayerDefaults) -> Self {
        Self {
            speed: defaults.speed,
            jump_strength: defaults.jump_strength,
            gravity: defaults.gravity.to_vec2(),
            max_fall: defaults.max_fall,
        }
    }
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self::from_defaults(&PlayerDefaults::default())
    }
}

/// Horizontal facing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    /// Facing left
    Left,
    /// Facing right
    #[default]
    Right,
}

/// State of the player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Top-left of the bounding box (pixels)
    pub pos: Vec2,
    /// Velocity (pixels/s)
    pub vel: Vec2,
    /// Bounding box size (pixels)
    pub size: Vec2,
    /// Standing on a solid tile
    pub grounded: bool,
    /// Alive flag
    pub alive: bool,
    /// Remaining lives, including the current one
    pub lives: u32,
    /// Run score
    pub score: i64,
    /// Upgrade levels
    pub upgrades: UpgradeLevels,
    /// Y where the current airborne phase began
    pub fall_origin_y: Option<f32>,
    /// Facing
    pub facing: Facing,
    /// Gliding this step
    pub gliding: bool,
    /// Highest tile column reached
    pub max_tile_x: i32,
    /// Highest tile row reached
    pub max_tile_y: i32,
    /// Remaining mid-air jumps
    pub air_jumps_left: u32,
    /// Last grounded, damage-free position
    pub safe_point: Vec2,
    /// Physical parameters
    pub params: PhysicsParams,
}

impl PlayerState {
    /// Create a player standing (or falling) at `pos`.
    pub fn new(
        pos: Vec2,
        tile: f32,
        params: PhysicsParams,
        upgrades: UpgradeLevels,
        tables: &UpgradeTables,
    ) -> Self {
        let extra = tables.extra_lives(upgrades.get(&UpgradeKind::ExtraLive).copied().unwrap_or(0));
        let start_tile = TileCoord::containing(pos, tile);
        Self {
            pos,
            vel: Vec2::ZERO,
            size: Vec2::new(tile * PLAYER_SIZE_TILES.0, tile * PLAYER_SIZE_TILES.1),
            grounded: false,
            alive: true,
            lives: 1 + extra,
            score: 0,
            upgrades,
            fall_origin_y: Some(pos.y),
            facing: Facing::Right,
            gliding: false,
            max_tile_x: start_tile.x,
            max_tile_y: start_tile.y,
            air_jumps_left: 0,
            safe_point: pos,
            params,
        }
    }

    /// Current level of an upgrade (0 when not held).
    #[inline]
    pub fn upgrade_level(&self, kind: UpgradeKind) -> u32 {
        self.upgrades.get(&kind).copied().unwrap_or(0)
    }

    /// Bounding box.
    #[inline]
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.pos, self.size)
    }

    /// Tile containing the top-left corner.
    #[inline]
    pub fn tile(&self, tile: f32) -> TileCoord {
        TileCoord::containing(self.pos, tile)
    }

    /// Move to `pos` with motion cleared. Used after a life loss.
    pub fn reposition(&mut self, pos: Vec2) {
        self.pos = pos;
        self.vel = Vec2::ZERO;
        self.grounded = false;
        self.gliding = false;
        self.fall_origin_y = Some(pos.y);
    }

    /// Hash this player's state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_vec2(self.pos);
        hasher.update_vec2(self.vel);
        hasher.update_bool(self.grounded);
        hasher.update_bool(self.alive);
        hasher.update_u32(self.lives);
        hasher.update_i64(self.score);
        for (kind, level) in &self.upgrades {
            hasher.update_u8(*kind as u8);
            hasher.update_u32(*level);
        }
        hasher.update_f32(self.fall_origin_y.unwrap_or(f32::NAN));
        hasher.update_u32(self.air_jumps_left);
        hasher.update_u32(self.max_tile_x as u32);
        hasher.update_u32(self.max_tile_y as u32);
        hasher.update_vec2(self.safe_point);
        hasher.update_f32(self.params.speed);
        hasher.update_f32(self.params.jump_strength);
        hasher.update_vec2(self.params.gravity);
        hasher.update_f32(self.params.max_fall);
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Phase of the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Active gameplay
    #[default]
    Playing,
    /// Swapping levels (only observable inside a tick)
    LevelTransition,
    /// Player died, waiting for restart
    Dead,
    /// Terminal
    Quit,
}

/// Run-wide state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Name of the active level
    pub current_level: String,
    /// Level requested by a patch this step
    pub pending_level_switch: Option<String>,
    /// Opaque UI request from the last patch that made one
    pub pending_ui: Option<Value>,
    /// When the run started
    pub run_started_at: DateTime<Utc>,
    /// Simulated seconds since the run started
    pub run_time: f64,
    /// Phase
    pub phase: GamePhase,
    /// Steps simulated
    pub tick: u64,
}

impl GameState {
    /// Fresh run state.
    pub fn new(level: &str, run_started_at: DateTime<Utc>) -> Self {
        Self {
            current_level: level.to_string(),
            pending_level_switch: None,
            pending_ui: None,
            run_started_at,
            run_time: 0.0,
            phase: GamePhase::Playing,
            tick: 0,
        }
    }

    /// Simulated wall-clock time: run start plus simulated time.
    ///
    /// Derived from simulated time so replays stamp identical records.
    pub fn now(&self) -> DateTime<Utc> {
        self.run_started_at + Duration::milliseconds((self.run_time * 1000.0) as i64)
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// The whole simulation: config, active level, player and run state.
///
/// Level switches and restarts replace the level and player together, so
/// callers never observe a grid from one level with a player from another.
#[derive(Clone, Debug)]
pub struct World {
    pub(crate) config: GameConfig,
    pub(crate) tables: UpgradeTables,
    pub(crate) level: LoadedLevel,
    pub(crate) player: PlayerState,
    pub(crate) game: GameState,
}

impl World {
    /// Build the world on the config's start level.
    pub fn new(
        config: GameConfig,
        levels: &dyn LevelSource,
        run_started_at: DateTime<Utc>,
    ) -> Result<Self, LevelLoadError> {
        let (tables, _) = UpgradeTables::from_config(&config.upgrades);
        let level = levels.load(&config.start_level)?;
        let player = initial_player(&config, &tables, &level);
        let game = GameState::new(&level.name, run_started_at);

        info!(level = %level.name, "world created");

        Ok(Self {
            config,
            tables,
            level,
            player,
            game,
        })
    }

    /// Player state.
    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    /// Live level grid.
    pub fn grid(&self) -> &LevelGrid {
        &self.level.grid
    }

    /// Rules of the active level.
    pub fn rules(&self) -> &TileRuleSet {
        &self.level.rules
    }

    /// Run state.
    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Upgrade tables.
    pub fn tables(&self) -> &UpgradeTables {
        &self.tables
    }

    /// Spawn position of the active level.
    pub fn spawn_position(&self) -> Vec2 {
        spawn_world_position(self.level.spawn, self.config.tile())
    }

    /// Take the pending UI request, if any.
    pub fn take_pending_ui(&mut self) -> Option<Value> {
        self.game.pending_ui.take()
    }

    /// Restart the run on the current level.
    ///
    /// Player back to initial values at spawn, consumed tiles restored, run
    /// clock restarted. All or nothing.
    pub fn restart(&mut self) {
        self.level.grid.reset();
        self.player = initial_player(&self.config, &self.tables, &self.level);

        let now = self.game.now();
        self.game = GameState::new(&self.level.name, now);

        info!(level = %self.level.name, "run restarted");
    }

    /// Replace the active level, carrying score and upgrade levels.
    ///
    /// On error nothing changes.
    pub fn switch_level(&mut self, name: &str, levels: &dyn LevelSource) -> Result<(), LevelLoadError> {
        let next = match levels.load(name) {
            Ok(level) => level,
            Err(err) => {
                warn!(requested = name, error = %err, "level switch failed, staying");
                return Err(err);
            }
        };

        let mut player = PlayerState::new(
            spawn_world_position(next.spawn, self.config.tile()),
            self.config.tile(),
            PhysicsParams::from_defaults(&self.config.player),
            self.player.upgrades.clone(),
            &self.tables,
        );
        player.score = self.player.score;

        info!(from = %self.level.name, to = %next.name, score = player.score, "level switched");

        self.game.current_level = next.name.clone();
        self.level = next;
        self.player = player;
        Ok(())
    }

    /// Compute hash of current state for replay verification.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.game.tick, |hasher| {
            hasher.update_str(&self.level.name);
            self.player.hash_into(hasher);

            // Consumed tiles, row-major
            for (coord, symbol) in self.level.grid.changed_cells() {
                hasher.update_u32(coord.x as u32);
                hasher.update_u32(coord.y as u32);
                hasher.update_u32(symbol as u32);
            }

            hasher.update_u8(self.game.phase as u8);
            hasher.update_i64(self.game.now().timestamp_millis());
        })
    }
}

fn initial_player(config: &GameConfig, tables: &UpgradeTables, level: &LoadedLevel) -> PlayerState {
    let (upgrades, issues) = tables.parse_levels(&config.player.upgrades);
    for issue in &issues {
        warn!(%issue, "starting upgrade ignored");
    }
    PlayerState::new(
        spawn_world_position(level.spawn, config.tile()),
        config.tile(),
        PhysicsParams::from_defaults(&config.player),
        upgrades,
        tables,
    )
}

// =============================================================================
// TESTS
// =============================================================================

//! Game Configuration
//!
//! The merged configuration object the simulation consumes. File discovery
//! and per-file merging live outside the core; [`merge_json`] is provided so
//! callers can layer overrides the same way level legends are layered.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::vec2::Vec2;

/// Step cap used when the configured one is unusable.
pub const DEFAULT_MAX_STEP_SECONDS: f32 = 0.05;

/// Fatal configuration failure: the document could not be read at all.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON was malformed or a field had the wrong type
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Non-fatal configuration problem, resolved by falling back to a safe default.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigIssue {
    /// Legend key is not exactly one character
    #[error("Legend key {0:?} is not a single character")]
    BadLegendKey(String),
    /// Legend entry is not an object
    #[error("Legend entry for '{0}' is not an object")]
    BadLegendEntry(char),
    /// Unknown shape name
    #[error("Legend entry '{symbol}' has unknown shape {shape:?}")]
    UnknownShape {
        /// Tile symbol
        symbol: char,
        /// Shape as written
        shape: String,
    },
    /// Consumable tile points at a symbol that is not in the legend
    #[error("Legend entry '{symbol}' is consumable as {target:?}, falling back to '.'")]
    BadConsumableTarget {
        /// Tile symbol
        symbol: char,
        /// Target as written
        target: String,
    },
    /// Upgrade name not recognised
    #[error("Unknown upgrade {0:?}")]
    UnknownUpgrade(String),
    /// Upgrade table could not be read
    #[error("Upgrade table for {0:?} is malformed, using built-in table")]
    BadUpgradeTable(String),
    /// Step cap is not a positive number
    #[error("max_step_seconds {0} is not positive, using 0.05")]
    BadMaxStep(f32),
}

// =============================================================================
// CONFIG SECTIONS
// =============================================================================

/// Gravity as written in config: a scalar (vertical only) or `[x, y]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GravityValue {
    /// Vertical gravity only
    Scalar(f32),
    /// Full vector
    Vector([f32; 2]),
}

impl GravityValue {
    /// Gravity as a vector (pixels/s²).
    pub fn to_vec2(self) -> Vec2 {
        match self {
            GravityValue::Scalar(g) => Vec2::new(0.0, g),
            GravityValue::Vector(v) => Vec2::from(v),
        }
    }
}

impl Default for GravityValue {
    fn default() -> Self {
        GravityValue::Vector([0.0, 1700.0])
    }
}

/// Player physical defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerDefaults {
    /// Base horizontal speed (pixels/s)
    pub speed: f32,
    /// Base jump impulse (pixels/s)
    pub jump_strength: f32,
    /// Gravity
    pub gravity: GravityValue,
    /// Terminal downward velocity (pixels/s)
    pub max_fall: f32,
    /// Upgrade levels at the start of a run
    pub upgrades: Map<String, Value>,
}

impl Default for PlayerDefaults {
    fn default() -> Self {
        Self {
            speed: 260.0,
            jump_strength: 560.0,
            gravity: GravityValue::default(),
            max_fall: 1000.0,
            upgrades: Map::new(),
        }
    }
}

/// Scoring switches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Award +1 per newly reached max tile column or row
    pub exploration_points: bool,
}

/// Which damage sources are softened by spare lives.
///
/// When a source uses the life buffer and the player has more than one
/// life, the hit costs a life and repositions the player at the last safe
/// point instead of killing outright.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamagePolicy {
    /// Tile patches that set `alive: false`
    pub hazards_use_life_buffer: bool,
    /// Falling below the death line
    pub out_of_world_uses_life_buffer: bool,
}

impl Default for DamagePolicy {
    fn default() -> Self {
        Self {
            hazards_use_life_buffer: true,
            out_of_world_uses_life_buffer: true,
        }
    }
}

// =============================================================================
// GAME CONFIG
// =============================================================================

/// Merged game configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Level the run starts on
    #[serde(rename = "currentLevel")]
    pub start_level: String,
    /// Player defaults
    pub player: PlayerDefaults,
    /// Global legend: symbol -> tile rule object
    pub legend: Map<String, Value>,
    /// Upgrade tables: name -> `{ "max_level": n, "values": [...] }` or a bare array
    pub upgrades: Map<String, Value>,
    /// Scoring switches
    pub scoring: ScoringConfig,
    /// Damage policy
    pub damage: DamagePolicy,
    /// Inline levels: name -> `{ "map": "...", "legend": {...} }`
    pub levels: Map<String, Value>,
    /// Scoreboard file path
    pub scoreboard_file: PathBuf,
    /// Largest dt a single step integrates (seconds)
    pub max_step_seconds: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tile_size: 48,
            start_level: "Level1".to_string(),
            player: PlayerDefaults::default(),
            legend: Map::new(),
            upgrades: Map::new(),
            scoring: ScoringConfig::default(),
            damage: DamagePolicy::default(),
            levels: Map::new(),
            scoreboard_file: PathBuf::from("scoreboard.txt"),
            max_step_seconds: DEFAULT_MAX_STEP_SECONDS,
        }
    }
}

impl GameConfig {
    /// Parse a merged config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.repaired())
    }

    /// Parse from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value)?;
        Ok(config.repaired())
    }

    /// Replace values the simulation cannot run with by their defaults.
    pub fn validate(&mut self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if !(self.max_step_seconds.is_finite() && self.max_step_seconds > 0.0) {
            issues.push(ConfigIssue::BadMaxStep(self.max_step_seconds));
            self.max_step_seconds = DEFAULT_MAX_STEP_SECONDS;
        }
        issues
    }

    fn repaired(mut self) -> Self {
        for issue in self.validate() {
            warn!(%issue, "config value replaced");
        }
        self
    }

    /// Largest dt one step integrates. Always positive.
    #[inline]
    pub fn max_step(&self) -> f32 {
        if self.max_step_seconds.is_finite() && self.max_step_seconds > 0.0 {
            self.max_step_seconds
        } else {
            DEFAULT_MAX_STEP_SECONDS
        }
    }

    /// Tile size as f32 for physics.
    #[inline]
    pub fn tile(&self) -> f32 {
        self.tile_size.max(1) as f32
    }
}

/// Deep-merge `overlay` into `base`.
///
/// Objects merge key by key; any other value in `overlay` replaces the one
/// in `base`. Arrays are replaced, never concatenated.
pub fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

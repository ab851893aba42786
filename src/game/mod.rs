//! Game Logic Module
//!
//! All simulation code. Deterministic given config, inputs and dt.
//!
//! ## Module Structure
//!
//! - `config`: Game configuration document and defaults
//! - `tile`: Tile rules built from the legend
//! - `level`: Level grids, spawn lookup, level sources
//! - `upgrade`: Upgrade kinds and per-level effect tables
//! - `patch`: Declarative collision patches
//! - `collision`: Swept AABB vs. tile grid
//! - `physics`: Gravity, jumps, gliding, fall damage
//! - `input`: Input frames, edge detection, recording
//! - `state`: Player, run state and the world
//! - `events`: Game events for logging/replay
//! - `scoreboard`: Finished-run records
//! - `tick`: Simulation step

pub mod config;
pub mod tile;
pub mod level;
pub mod upgrade;
pub mod patch;
pub mod collision;
pub mod physics;
pub mod input;
pub mod state;
pub mod events;
pub mod scoreboard;
pub mod tick;

// Re-export key types
pub use config::{ConfigError, ConfigIssue, GameConfig};
pub use input::{InputFrame, InputDelta, InputRecording, InputTracker, HeldKeys};
pub use level::{InlineLevels, LevelGrid, LevelLoadError, LevelSource, LoadedLevel, TileCoord};
pub use patch::{Patch, SideEffect};
pub use scoreboard::{MemoryScoreboard, ScoreEntry, Scoreboard, ScoreboardError, TsvScoreboard};
pub use state::{GamePhase, GameState, PlayerState, World};
pub use tick::{replay, tick, TickContext, TickResult};
pub use events::GameEvent;

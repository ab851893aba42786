//! # Voidwalker Core
//!
//! Data-driven tile rule engine and platformer physics for Voidwalker.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      VOIDWALKER CORE                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── vec2.rs     - 2D float vector                           │
//! │  └── hash.rs     - State hashing for replay verification     │
//! │                                                              │
//! │  game/           - Simulation (single-threaded, per frame)   │
//! │  ├── config.rs   - Merged configuration object               │
//! │  ├── tile.rs     - Tile rules (the legend)                   │
//! │  ├── level.rs    - Level grid, level sources, spawn          │
//! │  ├── upgrade.rs  - Upgrade level tables                      │
//! │  ├── patch.rs    - Declarative state patches                 │
//! │  ├── collision.rs- Axis-separated tile collision             │
//! │  ├── physics.rs  - Gravity, jumps, gliding, fall damage      │
//! │  ├── input.rs    - Per-frame input snapshot                  │
//! │  ├── state.rs    - Player, game and world state              │
//! │  ├── events.rs   - Events emitted by a tick                  │
//! │  ├── scoreboard.rs - Finished-run records                    │
//! │  └── tick.rs     - Frame orchestration                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Step Order
//!
//! physics → collision → triggers (patches, consumption) → level switch →
//! death → exploration score. Overlaps are processed in row-major order so
//! two hazards touched in the same frame always resolve the same way.
//!
//! Nothing about a tile is hardcoded: solidity, consumption and collision
//! patches all come from the legend in [`game::config::GameConfig`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;

// Re-export commonly used types
pub use crate::core::vec2::Vec2;
pub use game::config::GameConfig;
pub use game::input::InputFrame;
pub use game::level::{InlineLevels, LevelGrid, LevelLoadError, LevelSource};
pub use game::patch::{Patch, SideEffect};
pub use game::scoreboard::{MemoryScoreboard, ScoreEntry, Scoreboard, TsvScoreboard};
pub use game::state::{GamePhase, GameState, PlayerState, World};
pub use game::tick::{tick, TickContext, TickResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nominal frame rate (Hz). Physics is dt-based; this only drives the demo.
pub const FRAME_RATE: u32 = 60;

/// Background symbol. Out-of-range reads and unknown symbols behave as this.
pub const BACKGROUND: char = '.';

/// Spawn symbol.
pub const SPAWN: char = 'S';

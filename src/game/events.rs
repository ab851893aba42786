//! Game Events
//!
//! Events generated during a tick, for the renderer, logging and replay checks.

use serde::{Serialize, Deserialize};

use crate::game::level::TileCoord;

/// Priority for event processing order.
///
/// Lower value = processed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Death and run end first
    Death = 0,
    /// Then life losses
    Damage = 1,
    /// Then tile triggers, in scan order
    Trigger = 2,
    /// Then level changes
    Level = 3,
    /// Then scoring
    Score = 4,
    /// Lowest priority
    Other = 255,
}

/// What cost the player a life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageCause {
    /// A tile patch set `alive: false`
    Hazard,
    /// Landing after a fall longer than the threshold
    FallDamage,
    /// Fell below the level
    OutOfWorld,
    /// A tile patch set `lives: 0`
    LivesExhausted,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// A tile's collision patch was applied
    TileTriggered {
        symbol: char,
        coord: TileCoord,
    },

    /// A consumable tile was rewritten
    TileConsumed {
        symbol: char,
        became: char,
        coord: TileCoord,
    },

    /// A life was spent instead of dying
    LifeLost {
        cause: DamageCause,
        lives_left: u32,
    },

    /// The run ended
    PlayerDied {
        cause: Option<DamageCause>,
        level: String,
        score: i64,
    },

    /// Active level replaced
    LevelSwitched {
        from: String,
        to: String,
    },

    /// Requested level could not be loaded; previous level kept
    LevelLoadFailed {
        requested: String,
        reason: String,
    },

    /// New exploration maximum reached
    ExplorationPoint {
        coord: TileCoord,
        new_score: i64,
    },

    /// Finished run appended to the scoreboard
    ScoreRecorded {
        level: String,
        score: i64,
    },

    /// Scoreboard append failed; gameplay continues
    ScoreboardWriteFailed {
        reason: String,
    },

    /// Run restarted
    Restarted {
        level: String,
    },

    /// Quit requested
    Quit,
}

/// A game event with timing and priority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,

    /// Processing priority
    pub priority: EventPriority,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, priority: EventPriority, data: GameEventData) -> Self {
        Self { tick, priority, data }
    }

    /// Processing order key: tick, then priority.
    #[inline]
    pub fn sort_key(&self) -> (u64, EventPriority) {
        (self.tick, self.priority)
    }

    /// Create tile triggered event.
    pub fn tile_triggered(tick: u64, symbol: char, coord: TileCoord) -> Self {
        Self::new(tick, EventPriority::Trigger, GameEventData::TileTriggered { symbol, coord })
    }

    /// Create tile consumed event.
    pub fn tile_consumed(tick: u64, symbol: char, became: char, coord: TileCoord) -> Self {
        Self::new(
            tick,
            EventPriority::Trigger,
            GameEventData::TileConsumed { symbol, became, coord },
        )
    }

    /// Create life lost event.
    pub fn life_lost(tick: u64, cause: DamageCause, lives_left: u32) -> Self {
        Self::new(tick, EventPriority::Damage, GameEventData::LifeLost { cause, lives_left })
    }

    /// Create player died event.
    pub fn player_died(tick: u64, cause: Option<DamageCause>, level: &str, score: i64) -> Self {
        Self::new(
            tick,
            EventPriority::Death,
            GameEventData::PlayerDied {
                cause,
                level: level.to_string(),
                score,
            },
        )
    }

    /// Create level switched event.
    pub fn level_switched(tick: u64, from: &str, to: &str) -> Self {
        Self::new(
            tick,
            EventPriority::Level,
            GameEventData::LevelSwitched {
                from: from.to_string(),
                to: to.to_string(),
            },
        )
    }

    /// Create level load failed event.
    pub fn level_load_failed(tick: u64, requested: &str, reason: String) -> Self {
        Self::new(
            tick,
            EventPriority::Level,
            GameEventData::LevelLoadFailed {
                requested: requested.to_string(),
                reason,
            },
        )
    }

    /// Create exploration point event.
    pub fn exploration_point(tick: u64, coord: TileCoord, new_score: i64) -> Self {
        Self::new(
            tick,
            EventPriority::Score,
            GameEventData::ExplorationPoint { coord, new_score },
        )
    }
}

/// Order events by tick, then priority. Stable, so scan order survives
/// within a priority.
pub fn sort_events(events: &mut [GameEvent]) {
    events.sort_by_key(GameEvent::sort_key);
}

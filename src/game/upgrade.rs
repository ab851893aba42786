//! Upgrade Modifiers
//!
//! Level-indexed lookup tables. Every value is the effect *at* a level, not
//! an increment over the previous level. Lookups are pure and are redone
//! every step, so a patched upgrade level takes effect immediately.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::game::config::ConfigIssue;

/// Upgrade identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeKind {
    /// Additive jump strength bonus (pixels/s)
    HighJump,
    /// Mid-air jump budget
    DoubleJump,
    /// Additive horizontal speed bonus (pixels/s)
    Speed,
    /// Fraction of gravity removed while gliding
    Gliding,
    /// Spare lives on top of the first
    ExtraLive,
    /// Fall distance (tiles) that can be survived without losing a life
    FallDamage,
    /// Fireball ability flag
    Fireball,
    /// Gravity direction rotation (degrees)
    GravityTransformation,
}

impl UpgradeKind {
    /// All upgrades, in table order.
    pub const ALL: [UpgradeKind; 8] = [
        UpgradeKind::HighJump,
        UpgradeKind::DoubleJump,
        UpgradeKind::Speed,
        UpgradeKind::Gliding,
        UpgradeKind::ExtraLive,
        UpgradeKind::FallDamage,
        UpgradeKind::Fireball,
        UpgradeKind::GravityTransformation,
    ];

    /// Config name.
    pub fn name(self) -> &'static str {
        match self {
            UpgradeKind::HighJump => "high_jump",
            UpgradeKind::DoubleJump => "double_jump",
            UpgradeKind::Speed => "speed",
            UpgradeKind::Gliding => "gliding",
            UpgradeKind::ExtraLive => "extra_live",
            UpgradeKind::FallDamage => "fall_damage",
            UpgradeKind::Fireball => "fireball",
            UpgradeKind::GravityTransformation => "gravity_transformation",
        }
    }

    /// Parse a config name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn default_values(self) -> &'static [f32] {
        match self {
            UpgradeKind::HighJump => &[0.0, 80.0, 160.0, 240.0],
            UpgradeKind::DoubleJump => &[0.0, 1.0, 2.0, 3.0],
            UpgradeKind::Speed => &[0.0, 40.0, 80.0, 120.0],
            UpgradeKind::Gliding => &[0.0, 0.5, 0.65, 0.8],
            UpgradeKind::ExtraLive => &[0.0, 1.0, 2.0, 3.0],
            UpgradeKind::FallDamage => &[8.0, 12.0, 16.0, 24.0],
            UpgradeKind::Fireball => &[0.0, 1.0],
            UpgradeKind::GravityTransformation => &[0.0, 90.0, 180.0, 270.0],
        }
    }
}

impl fmt::Display for UpgradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Upgrade levels held by a player.
pub type UpgradeLevels = BTreeMap<UpgradeKind, u32>;

/// One level-indexed table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeTable {
    /// Highest reachable level
    pub max_level: u32,
    /// Effect at each level, index = level
    pub values: Vec<f32>,
}

impl UpgradeTable {
    /// Build a table whose max level is the last index.
    pub fn from_values(values: Vec<f32>) -> Self {
        let max_level = values.len().saturating_sub(1) as u32;
        Self { max_level, values }
    }

    /// Clamp a level into `[0, max_level]`.
    #[inline]
    pub fn clamp_level(&self, level: u32) -> u32 {
        level.min(self.max_level)
    }

    /// Effect at `level` (clamped). Levels past the last listed value reuse it.
    pub fn effect(&self, level: u32) -> f32 {
        let level = self.clamp_level(level) as usize;
        match self.values.get(level) {
            Some(v) => *v,
            None => self.values.last().copied().unwrap_or(0.0),
        }
    }

    fn parse(raw: &Value) -> Option<Self> {
        let numbers = |v: &Value| -> Option<Vec<f32>> {
            v.as_array()?
                .iter()
                .map(|n| n.as_f64().map(|f| f as f32))
                .collect()
        };

        match raw {
            Value::Array(_) => numbers(raw).filter(|v| !v.is_empty()).map(Self::from_values),
            Value::Object(obj) => {
                let values = numbers(obj.get("values")?)?;
                if values.is_empty() {
                    return None;
                }
                let max_level = match obj.get("max_level") {
                    Some(m) => m.as_u64()? as u32,
                    None => values.len() as u32 - 1,
                };
                Some(Self { max_level, values })
            }
            _ => None,
        }
    }
}

/// All upgrade tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeTables {
    tables: BTreeMap<UpgradeKind, UpgradeTable>,
}

impl Default for UpgradeTables {
    fn default() -> Self {
        let tables = UpgradeKind::ALL
            .into_iter()
            .map(|kind| (kind, UpgradeTable::from_values(kind.default_values().to_vec())))
            .collect();
        Self { tables }
    }
}

impl UpgradeTables {
    /// Build from the `upgrades` config section.
    ///
    /// Missing tables use the built-in ones. Unknown names and malformed
    /// tables are reported and skipped.
    pub fn from_config(raw: &Map<String, Value>) -> (Self, Vec<ConfigIssue>) {
        let mut tables = Self::default();
        let mut issues = Vec::new();

        for (name, value) in raw {
            let Some(kind) = UpgradeKind::from_name(name) else {
                issues.push(ConfigIssue::UnknownUpgrade(name.clone()));
                continue;
            };
            match UpgradeTable::parse(value) {
                Some(table) => {
                    tables.tables.insert(kind, table);
                }
                None => issues.push(ConfigIssue::BadUpgradeTable(name.clone())),
            }
        }

        for issue in &issues {
            warn!(%issue, "upgrade config fallback");
        }

        (tables, issues)
    }

    /// Replace one table.
    pub fn with_table(mut self, kind: UpgradeKind, table: UpgradeTable) -> Self {
        self.tables.insert(kind, table);
        self
    }

    /// Table for an upgrade.
    pub fn table(&self, kind: UpgradeKind) -> Option<&UpgradeTable> {
        self.tables.get(&kind)
    }

    /// Effect of `kind` at `level`, level clamped to the table.
    pub fn effect(&self, kind: UpgradeKind, level: u32) -> f32 {
        self.tables.get(&kind).map_or(0.0, |t| t.effect(level))
    }

    /// Clamp a level for `kind` into `[0, max_level]`.
    pub fn clamp_level(&self, kind: UpgradeKind, level: u32) -> u32 {
        self.tables.get(&kind).map_or(0, |t| t.clamp_level(level))
    }

    /// Parse and clamp a `name -> level` map (starting upgrades, patches).
    pub fn parse_levels(&self, raw: &Map<String, Value>) -> (UpgradeLevels, Vec<ConfigIssue>) {
        let mut levels = UpgradeLevels::new();
        let mut issues = Vec::new();
        for (name, value) in raw {
            match (UpgradeKind::from_name(name), value.as_u64()) {
                (Some(kind), Some(level)) => {
                    let level = u32::try_from(level).unwrap_or(u32::MAX);
                    levels.insert(kind, self.clamp_level(kind, level));
                }
                _ => issues.push(ConfigIssue::UnknownUpgrade(name.clone())),
            }
        }
        (levels, issues)
    }

    // =========================================================================
    // TYPED LOOKUPS
    // =========================================================================

    /// Jump strength bonus at level.
    pub fn jump_bonus(&self, level: u32) -> f32 {
        self.effect(UpgradeKind::HighJump, level)
    }

    /// Mid-air jumps granted at level.
    pub fn air_jumps(&self, level: u32) -> u32 {
        self.effect(UpgradeKind::DoubleJump, level).max(0.0) as u32
    }

    /// Speed bonus at level.
    pub fn speed_bonus(&self, level: u32) -> f32 {
        self.effect(UpgradeKind::Speed, level)
    }

    /// Gravity reduction fraction while gliding, in `[0, 1]`.
    pub fn glide_reduction(&self, level: u32) -> f32 {
        self.effect(UpgradeKind::Gliding, level).clamp(0.0, 1.0)
    }

    /// Spare lives at level.
    pub fn extra_lives(&self, level: u32) -> u32 {
        self.effect(UpgradeKind::ExtraLive, level).max(0.0) as u32
    }

    /// Survivable fall distance in tiles at level.
    pub fn fall_damage_threshold(&self, level: u32) -> f32 {
        self.effect(UpgradeKind::FallDamage, level)
    }

    /// Whether fireballs are enabled at level.
    pub fn fireball_enabled(&self, level: u32) -> bool {
        self.effect(UpgradeKind::Fireball, level) > 0.0
    }

    /// Gravity rotation in degrees at level.
    pub fn gravity_angle(&self, level: u32) -> f32 {
        self.effect(UpgradeKind::GravityTransformation, level)
    }
}

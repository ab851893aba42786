//! Level Grid and Level Sources
//!
//! A level is a rectangular grid of tile symbols plus the rule set that
//! gives those symbols meaning. The grid keeps its pristine rows next to
//! the live ones so consumed tiles come back on restart.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::vec2::Vec2;
use crate::game::config::{merge_json, GameConfig};
use crate::game::tile::TileRuleSet;
use crate::{BACKGROUND, SPAWN};

/// Spawn offset inside the spawn tile, in tiles.
pub const SPAWN_OFFSET: (f32, f32) = (0.15, 0.05);

/// Level loading failure. The current level stays active.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LevelLoadError {
    /// No level with that name
    #[error("Level '{0}' not found")]
    UnknownLevel(String),
    /// Map has no rows
    #[error("Level '{0}' is empty")]
    EmptyMap(String),
    /// Map has no spawn cell
    #[error("Level '{0}' has no spawn tile 'S'")]
    MissingSpawn(String),
}

/// Integer tile coordinate. Ordering is row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Row
    pub y: i32,
    /// Column
    pub x: i32,
}

impl TileCoord {
    /// Create a coordinate.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile containing a world-space point.
    pub fn containing(point: Vec2, tile: f32) -> Self {
        Self {
            x: (point.x / tile).floor() as i32,
            y: (point.y / tile).floor() as i32,
        }
    }
}

// =============================================================================
// LEVEL GRID
// =============================================================================

/// Rectangular grid of tile symbols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelGrid {
    base: Vec<Vec<char>>,
    live: Vec<Vec<char>>,
    width: usize,
}

impl LevelGrid {
    /// Build from rows, padding short rows with `.`.
    pub fn from_rows<S: AsRef<str>>(
        level: &str,
        rows: impl IntoIterator<Item = S>,
    ) -> Result<Self, LevelLoadError> {
        let mut base: Vec<Vec<char>> = rows
            .into_iter()
            .map(|r| r.as_ref().chars().collect())
            .collect();
        if base.is_empty() {
            return Err(LevelLoadError::EmptyMap(level.to_string()));
        }

        let width = base.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut base {
            row.resize(width, BACKGROUND);
        }

        Ok(Self {
            live: base.clone(),
            base,
            width,
        })
    }

    /// Parse a map text block. Blank lines are dropped.
    pub fn parse(level: &str, map: &str) -> Result<Self, LevelLoadError> {
        let rows = map
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty());
        Self::from_rows(level, rows)
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<(usize, usize)> {
        let (x, y) = (usize::try_from(x).ok()?, usize::try_from(y).ok()?);
        (x < self.width && y < self.live.len()).then_some((x, y))
    }

    /// Symbol at a cell; `.` outside the grid.
    #[inline]
    pub fn at(&self, x: i32, y: i32) -> char {
        match self.index(x, y) {
            Some((x, y)) => self.live[y][x],
            None => BACKGROUND,
        }
    }

    /// Symbol at a coordinate.
    #[inline]
    pub fn at_coord(&self, coord: TileCoord) -> char {
        self.at(coord.x, coord.y)
    }

    /// Overwrite a live cell. Returns false outside the grid.
    pub fn set_symbol(&mut self, x: i32, y: i32, symbol: char) -> bool {
        match self.index(x, y) {
            Some((x, y)) => {
                self.live[y][x] = symbol;
                true
            }
            None => false,
        }
    }

    /// Spawn cell. The last `S` in row-major order wins.
    pub fn find_spawn(&self) -> Option<TileCoord> {
        let mut spawn = None;
        for (y, row) in self.base.iter().enumerate() {
            for (x, &c) in row.iter().enumerate() {
                if c == SPAWN {
                    spawn = Some(TileCoord::new(x as i32, y as i32));
                }
            }
        }
        spawn
    }

    /// `(width, height)` in tiles.
    pub fn bounds(&self) -> (usize, usize) {
        (self.width, self.live.len())
    }

    /// Restore every consumed cell.
    pub fn reset(&mut self) {
        self.live.clone_from(&self.base);
    }

    /// Live rows as strings (for drawing).
    pub fn rows(&self) -> impl Iterator<Item = String> + '_ {
        self.live.iter().map(|r| r.iter().collect())
    }

    /// Cells whose live symbol differs from the base layer.
    pub fn changed_cells(&self) -> impl Iterator<Item = (TileCoord, char)> + '_ {
        self.live.iter().zip(&self.base).enumerate().flat_map(|(y, (live, base))| {
            live.iter()
                .zip(base)
                .enumerate()
                .filter(|(_, (l, b))| l != b)
                .map(move |(x, (l, _))| (TileCoord::new(x as i32, y as i32), *l))
        })
    }
}

/// World position of the player when spawning in `coord`.
pub fn spawn_world_position(coord: TileCoord, tile: f32) -> Vec2 {
    Vec2::new(
        coord.x as f32 * tile + tile * SPAWN_OFFSET.0,
        coord.y as f32 * tile + tile * SPAWN_OFFSET.1,
    )
}

// =============================================================================
// LEVEL SOURCES
// =============================================================================

/// A level ready to play.
#[derive(Clone, Debug)]
pub struct LoadedLevel {
    /// Resolved name
    pub name: String,
    /// Tile grid
    pub grid: LevelGrid,
    /// Rules with the level's legend overrides applied
    pub rules: TileRuleSet,
    /// Spawn cell
    pub spawn: TileCoord,
}

/// Something that can produce levels by name.
pub trait LevelSource {
    /// Load a level.
    fn load(&self, name: &str) -> Result<LoadedLevel, LevelLoadError>;
}

#[derive(Clone, Debug)]
struct InlineLevel {
    map: String,
    legend: Map<String, Value>,
}

/// Levels embedded in the config `levels` section.
///
/// Names resolve exactly first, then case-insensitively. A level's own
/// legend is deep-merged over the global legend, per symbol.
#[derive(Clone, Debug, Default)]
pub struct InlineLevels {
    levels: BTreeMap<String, InlineLevel>,
    legend: Map<String, Value>,
}

impl InlineLevels {
    /// Empty source with a global legend.
    pub fn new(legend: Map<String, Value>) -> Self {
        Self {
            levels: BTreeMap::new(),
            legend,
        }
    }

    /// Build from the config's `legend` and `levels` sections.
    ///
    /// A level entry is either a map string or `{ "map": ..., "legend": {...} }`.
    pub fn from_config(config: &GameConfig) -> Self {
        let mut source = Self::new(config.legend.clone());
        for (name, raw) in &config.levels {
            let (map, legend) = match raw {
                Value::String(map) => (map.clone(), Map::new()),
                Value::Object(obj) => {
                    let Some(map) = obj.get("map").and_then(Value::as_str) else {
                        warn!(level = %name, "inline level has no map, skipped");
                        continue;
                    };
                    let legend = obj
                        .get("legend")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    (map.to_string(), legend)
                }
                _ => {
                    warn!(level = %name, "inline level is not a map or object, skipped");
                    continue;
                }
            };
            source.levels.insert(name.clone(), InlineLevel { map, legend });
        }
        source
    }

    /// Builder: add a level.
    pub fn with_level(mut self, name: &str, map: &str, legend: Map<String, Value>) -> Self {
        self.levels.insert(
            name.to_string(),
            InlineLevel {
                map: map.to_string(),
                legend,
            },
        );
        self
    }

    /// Resolve a requested name to a stored one.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.levels.get_key_value(name) {
            return Some(key);
        }
        self.levels
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True when no levels are defined.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl LevelSource for InlineLevels {
    fn load(&self, name: &str) -> Result<LoadedLevel, LevelLoadError> {
        let resolved = self
            .resolve(name)
            .ok_or_else(|| LevelLoadError::UnknownLevel(name.to_string()))?;
        let level = &self.levels[resolved];

        let mut legend = Value::Object(self.legend.clone());
        merge_json(&mut legend, &Value::Object(level.legend.clone()));
        let (rules, issues) = match legend.as_object() {
            Some(merged) => TileRuleSet::from_legend(merged),
            None => TileRuleSet::from_legend(&Map::new()),
        };

        let grid = LevelGrid::parse(resolved, &level.map)?;
        let spawn = grid
            .find_spawn()
            .ok_or_else(|| LevelLoadError::MissingSpawn(resolved.to_string()))?;

        debug!(
            level = resolved,
            width = grid.bounds().0,
            height = grid.bounds().1,
            legend_issues = issues.len(),
            "level loaded"
        );

        Ok(LoadedLevel {
            name: resolved.to_string(),
            grid,
            rules,
            spawn,
        })
    }
}

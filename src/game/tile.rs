//! Tile Rules
//!
//! The legend maps single-character symbols to [`TileRule`] records.
//! Behaviour is data: solidity, consumption and the collision patch. Shape,
//! orientation and colour are presentation metadata passed through untouched.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::game::config::ConfigIssue;
use crate::game::patch::Patch;
use crate::BACKGROUND;

/// Colour used when a visible tile has no valid colour.
pub const DEFAULT_TILE_COLOR: Rgb = Rgb(200, 60, 220);

/// RGB colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    fn parse(raw: Option<&Value>) -> Option<Self> {
        let arr = raw?.as_array()?;
        if arr.len() != 3 {
            return None;
        }
        let channel = |v: &Value| v.as_u64().and_then(|c| u8::try_from(c).ok());
        Some(Rgb(channel(&arr[0])?, channel(&arr[1])?, channel(&arr[2])?))
    }
}

/// Presentation shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileShape {
    /// Not drawn
    #[default]
    None,
    /// Filled square
    Rect,
    /// Circle
    Circle,
    /// Triangle
    Triangle,
}

impl TileShape {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(TileShape::None),
            "rect" => Some(TileShape::Rect),
            "circle" => Some(TileShape::Circle),
            "triangle" => Some(TileShape::Triangle),
            _ => None,
        }
    }
}

/// Presentation orientation (triangles).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Pointing up
    #[default]
    Up,
    /// Pointing down
    Down,
}

/// Behaviour and presentation of one tile symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct TileRule {
    /// Symbol in the level map
    pub symbol: char,
    /// Presentation shape
    pub shape: TileShape,
    /// Presentation orientation
    pub orientation: Orientation,
    /// Colour, `None` when the shape is not drawn
    pub color: Option<Rgb>,
    /// Blocks movement
    pub solid: bool,
    /// Rewritten to `consumable_as` after its patch fires
    pub consumable: bool,
    /// Replacement symbol for consumable tiles
    pub consumable_as: Option<char>,
    /// Patch applied while the player overlaps this tile
    pub on_collision: Option<Patch>,
    /// Display title
    pub title: Option<String>,
    /// Display description
    pub description: Option<String>,
}

impl TileRule {
    /// The background rule: invisible, non-solid, inert.
    pub fn background() -> Self {
        Self {
            symbol: BACKGROUND,
            shape: TileShape::None,
            orientation: Orientation::Up,
            color: None,
            solid: false,
            consumable: false,
            consumable_as: None,
            on_collision: None,
            title: None,
            description: None,
        }
    }

    /// Whether touching this tile does anything.
    #[inline]
    pub fn is_trigger(&self) -> bool {
        !self.solid && self.on_collision.is_some()
    }

    /// Symbol this tile turns into once consumed.
    #[inline]
    pub fn consumed_symbol(&self) -> char {
        self.consumable_as.unwrap_or(BACKGROUND)
    }

    fn parse(symbol: char, raw: &Map<String, Value>, issues: &mut Vec<ConfigIssue>) -> Self {
        let shape_name = raw.get("shape").and_then(Value::as_str).unwrap_or("none");
        let shape = TileShape::from_name(shape_name).unwrap_or_else(|| {
            issues.push(ConfigIssue::UnknownShape {
                symbol,
                shape: shape_name.to_string(),
            });
            TileShape::None
        });

        let orientation = match raw.get("orientation").and_then(Value::as_str) {
            Some(o) if o.eq_ignore_ascii_case("down") => Orientation::Down,
            _ => Orientation::Up,
        };

        let color = match shape {
            TileShape::None => None,
            _ => Some(Rgb::parse(raw.get("color")).unwrap_or(DEFAULT_TILE_COLOR)),
        };

        let on_collision = raw
            .get("on_collision")
            .map(Patch::from_value)
            .filter(|p| !p.is_empty());

        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);

        // Targets are validated once the whole legend is known.
        let consumable = raw.get("consumable").and_then(Value::as_bool).unwrap_or(false);
        let consumable_as = raw
            .get("consumable_as")
            .and_then(Value::as_str)
            .and_then(single_char);

        Self {
            symbol,
            shape,
            orientation,
            color,
            solid: raw.get("solid").and_then(Value::as_bool).unwrap_or(false),
            consumable,
            consumable_as,
            on_collision,
            title: text("title"),
            description: text("description"),
        }
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Immutable symbol -> rule mapping. Always contains the background rule.
#[derive(Clone, Debug, PartialEq)]
pub struct TileRuleSet {
    rules: BTreeMap<char, TileRule>,
    background: TileRule,
}

impl Default for TileRuleSet {
    fn default() -> Self {
        Self::from_rules(Vec::new())
    }
}

impl TileRuleSet {
    /// Build from already-constructed rules.
    pub fn from_rules(rules: impl IntoIterator<Item = TileRule>) -> Self {
        let mut rules: BTreeMap<char, TileRule> =
            rules.into_iter().map(|r| (r.symbol, r)).collect();
        let background = rules
            .entry(BACKGROUND)
            .or_insert_with(TileRule::background)
            .clone();
        Self { rules, background }
    }

    /// Build from a legend object.
    ///
    /// Never fails: bad entries are reported and skipped, bad consumable
    /// targets fall back to `.`.
    pub fn from_legend(legend: &Map<String, Value>) -> (Self, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        let mut rules = Vec::new();

        for (key, raw) in legend {
            let Some(symbol) = single_char(key) else {
                issues.push(ConfigIssue::BadLegendKey(key.clone()));
                continue;
            };
            let Some(obj) = raw.as_object() else {
                issues.push(ConfigIssue::BadLegendEntry(symbol));
                continue;
            };
            rules.push(TileRule::parse(symbol, obj, &mut issues));
        }

        let mut set = Self::from_rules(rules);

        let known: Vec<char> = set.rules.keys().copied().collect();
        for rule in set.rules.values_mut() {
            if !rule.consumable {
                continue;
            }
            let raw_target = legend
                .get(&rule.symbol.to_string())
                .and_then(|v| v.get("consumable_as"));
            match rule.consumable_as {
                Some(target) if known.contains(&target) => {}
                None if raw_target.is_none() => rule.consumable_as = Some(BACKGROUND),
                _ => {
                    issues.push(ConfigIssue::BadConsumableTarget {
                        symbol: rule.symbol,
                        target: raw_target.map(|v| v.to_string()).unwrap_or_default(),
                    });
                    rule.consumable_as = Some(BACKGROUND);
                }
            }
        }
        if let Some(bg) = set.rules.get(&BACKGROUND) {
            set.background = bg.clone();
        }

        for issue in &issues {
            warn!(%issue, "legend fallback");
        }

        (set, issues)
    }

    /// Rule for a symbol; unknown symbols behave as the background.
    #[inline]
    pub fn rule(&self, symbol: char) -> &TileRule {
        self.rules.get(&symbol).unwrap_or(&self.background)
    }

    /// Rule for a symbol, if defined.
    pub fn get(&self, symbol: char) -> Option<&TileRule> {
        self.rules.get(&symbol)
    }

    /// Whether a symbol blocks movement.
    #[inline]
    pub fn is_solid(&self, symbol: char) -> bool {
        self.rule(symbol).solid
    }

    /// Number of defined symbols (including background).
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Never true: the background rule is always present.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate rules in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = &TileRule> {
        self.rules.values()
    }
}

//! Patch Engine
//!
//! Patches are the declarative mutations attached to a tile's
//! `on_collision`. They are parsed once, when the legend is built, into a
//! tagged union of recognised operations; anything unrecognised is dropped.
//!
//! ## Idempotence
//!
//! Every operation is an overwrite, so applying a patch twice leaves the
//! same state as applying it once. This matters because a trigger fires on
//! every step the player overlaps it. The one derived effect, extra lives
//! granted when `extra_live` is raised, is computed from the level
//! *difference* and is therefore zero on a repeat.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::vec2::Vec2;
use crate::game::config::GravityValue;
use crate::game::state::{GameState, PlayerState};
use crate::game::upgrade::{UpgradeKind, UpgradeTables};

/// Field overwrites for the player.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerPatch {
    /// Alive flag
    pub alive: Option<bool>,
    /// Lives
    pub lives: Option<u32>,
    /// Score
    pub score: Option<i64>,
    /// Base speed
    pub speed: Option<f32>,
    /// Base jump strength
    pub jump_strength: Option<f32>,
    /// Gravity
    pub gravity: Option<Vec2>,
    /// Terminal fall velocity
    pub max_fall: Option<f32>,
    /// Upgrade levels (clamped when applied)
    pub upgrades: BTreeMap<UpgradeKind, u32>,
}

impl PlayerPatch {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let float = |key: &str| obj.get(key).and_then(Value::as_f64).map(|v| v as f32);

        let upgrades = obj
            .get("upgrades")
            .and_then(Value::as_object)
            .map(|ups| {
                ups.iter()
                    .filter_map(|(name, level)| {
                        let kind = UpgradeKind::from_name(name)?;
                        let level = u32::try_from(level.as_u64()?).unwrap_or(u32::MAX);
                        Some((kind, level))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            alive: obj.get("alive").and_then(truthy),
            lives: obj
                .get("lives")
                .and_then(Value::as_u64)
                .map(|v| u32::try_from(v).unwrap_or(u32::MAX)),
            score: obj.get("score").and_then(Value::as_i64),
            speed: float("speed"),
            jump_strength: float("jump_strength"),
            gravity: obj
                .get("gravity")
                .and_then(|g| serde_json::from_value::<GravityValue>(g.clone()).ok())
                .map(GravityValue::to_vec2),
            max_fall: float("max_fall"),
            upgrades,
        }
    }

    /// True when nothing would be written.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn truthy(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

/// One recognised patch operation.
#[derive(Clone, Debug, PartialEq)]
pub enum PatchOp {
    /// `player`: field overwrites
    Player(PlayerPatch),
    /// `currentLevel`: request a level switch
    LevelSwitch(String),
    /// `ui.open`: opaque request for the UI layer
    OpenUi(Value),
}

/// A parsed patch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Patch {
    /// Operations, applied in order
    pub ops: Vec<PatchOp>,
}

impl Patch {
    /// Parse a patch object. Unknown keys and non-object input are ignored.
    pub fn from_value(value: &Value) -> Self {
        let mut ops = Vec::new();
        let Some(obj) = value.as_object() else {
            return Self { ops };
        };

        if let Some(player) = obj.get("player").and_then(Value::as_object) {
            let patch = PlayerPatch::from_object(player);
            if !patch.is_empty() {
                ops.push(PatchOp::Player(patch));
            }
        }

        match obj.get("currentLevel") {
            Some(Value::String(name)) => ops.push(PatchOp::LevelSwitch(name.clone())),
            Some(Value::Null) | None => {}
            Some(other) => ops.push(PatchOp::LevelSwitch(other.to_string())),
        }

        if let Some(open) = obj.get("ui").and_then(|ui| ui.get("open")) {
            ops.push(PatchOp::OpenUi(open.clone()));
        }

        Self { ops }
    }

    /// Patch with player overwrites only.
    pub fn player(patch: PlayerPatch) -> Self {
        Self {
            ops: vec![PatchOp::Player(patch)],
        }
    }

    /// Patch requesting a level switch.
    pub fn level_switch(name: &str) -> Self {
        Self {
            ops: vec![PatchOp::LevelSwitch(name.to_string())],
        }
    }

    /// True when the patch does nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Request for the orchestrator, produced by applying a patch.
#[derive(Clone, Debug, PartialEq)]
pub enum SideEffect {
    /// Load the named level after this step's triggers
    LevelSwitch(String),
    /// Opaque UI request
    OpenUi(Value),
}

/// Apply a patch. Never fails.
///
/// The pending requests are also written to `game`, so a caller that
/// ignores the returned list still sees them.
pub fn apply(
    patch: &Patch,
    player: &mut PlayerState,
    game: &mut GameState,
    tables: &UpgradeTables,
) -> Vec<SideEffect> {
    let mut effects = Vec::new();

    for op in &patch.ops {
        match op {
            PatchOp::Player(p) => apply_player(p, player, tables),
            PatchOp::LevelSwitch(name) => {
                game.pending_level_switch = Some(name.clone());
                effects.push(SideEffect::LevelSwitch(name.clone()));
            }
            PatchOp::OpenUi(request) => {
                game.pending_ui = Some(request.clone());
                effects.push(SideEffect::OpenUi(request.clone()));
            }
        }
    }

    effects
}

fn apply_player(patch: &PlayerPatch, player: &mut PlayerState, tables: &UpgradeTables) {
    // Upgrades first: an explicit `lives` in the same patch must win.
    for (&kind, &level) in &patch.upgrades {
        let level = tables.clamp_level(kind, level);
        let previous = player.upgrade_level(kind);
        if kind == UpgradeKind::ExtraLive && level > previous {
            let granted = tables
                .extra_lives(level)
                .saturating_sub(tables.extra_lives(previous));
            player.lives = player.lives.saturating_add(granted);
        }
        player.upgrades.insert(kind, level);
        debug!(upgrade = %kind, level, "upgrade set by patch");
    }

    if let Some(alive) = patch.alive {
        player.alive = alive;
    }
    if let Some(lives) = patch.lives {
        player.lives = lives;
    }
    if let Some(score) = patch.score {
        player.score = score;
    }
    if let Some(speed) = patch.speed {
        player.params.speed = speed;
    }
    if let Some(jump) = patch.jump_strength {
        player.params.jump_strength = jump;
    }
    if let Some(gravity) = patch.gravity {
        player.params.gravity = gravity;
    }
    if let Some(max_fall) = patch.max_fall {
        player.params.max_fall = max_fall;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PhysicsParams;
    use crate::game::upgrade::UpgradeLevels;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::json;

    fn fresh() -> (PlayerState, GameState, UpgradeTables) {
        let tables = UpgradeTables::default();
        let player = PlayerState::new(
            Vec2::new(10.0, 10.0),
            48.0,
            PhysicsParams::default(),
            UpgradeLevels::new(),
            &tables,
        );
        let started = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (player, GameState::new("Level1", started), tables)
    }

    #[test]
    fn test_parse_recognised_keys() {
        let patch = Patch::from_value(&json!({
            "player": {"score": 100, "alive": false, "gravity": [0, 900],
                       "upgrades": {"double_jump": 2, "laser": 1}, "colour": "red"},
            "currentLevel": "Level2",
            "ui": {"open": {"panel": "shop"}},
            "music": "loud"
        }));

        assert_eq!(patch.ops.len(), 3);
        match &patch.ops[0] {
            PatchOp::Player(p) => {
                assert_eq!(p.score, Some(100));
                assert_eq!(p.alive, Some(false));
                assert_eq!(p.gravity, Some(Vec2::new(0.0, 900.0)));
                assert_eq!(p.upgrades.len(), 1);
                assert_eq!(p.upgrades.get(&UpgradeKind::DoubleJump), Some(&2));
            }
            other => panic!("unexpected op {:?}", other),
        }
        assert_eq!(patch.ops[1], PatchOp::LevelSwitch("Level2".into()));
        assert_eq!(patch.ops[2], PatchOp::OpenUi(json!({"panel": "shop"})));
    }

    #[test]
    fn test_parse_ignores_garbage() {
        assert!(Patch::from_value(&json!(42)).is_empty());
        assert!(Patch::from_value(&json!({"weather": "rain"})).is_empty());
        assert!(Patch::from_value(&json!({"player": {"hat": true}})).is_empty());
        assert!(Patch::from_value(&json!({"currentLevel": null})).is_empty());
    }

    #[test]
    fn test_apply_overwrites_and_side_effects() {
        let (mut player, mut game, tables) = fresh();
        let patch = Patch::from_value(&json!({
            "player": {"score": 100, "speed": 400},
            "currentLevel": "Level2"
        }));

        let effects = apply(&patch, &mut player, &mut game, &tables);

        assert_eq!(player.score, 100);
        assert_eq!(player.params.speed, 400.0);
        assert_eq!(game.pending_level_switch.as_deref(), Some("Level2"));
        assert_eq!(effects, vec![SideEffect::LevelSwitch("Level2".into())]);
    }

    #[test]
    fn test_extra_live_grants_difference_once() {
        let (mut player, mut game, tables) = fresh();
        assert_eq!(player.lives, 1);
        let patch = Patch::from_value(&json!({"player": {"upgrades": {"extra_live": 2}}}));

        apply(&patch, &mut player, &mut game, &tables);
        assert_eq!(player.lives, 3);
        apply(&patch, &mut player, &mut game, &tables);
        assert_eq!(player.lives, 3);
    }

    #[test]
    fn test_upgrade_level_clamped() {
        let (mut player, mut game, tables) = fresh();
        let patch = Patch::from_value(&json!({"player": {"upgrades": {"high_jump": 40}}}));
        apply(&patch, &mut player, &mut game, &tables);
        assert_eq!(player.upgrade_level(UpgradeKind::HighJump), 3);
    }

    #[test]
    fn test_explicit_lives_wins_over_grant() {
        let (mut player, mut game, tables) = fresh();
        let patch = Patch::from_value(&json!({"player": {"lives": 5, "upgrades": {"extra_live": 1}}}));
        apply(&patch, &mut player, &mut game, &tables);
        assert_eq!(player.lives, 5);
        apply(&patch, &mut player, &mut game, &tables);
        assert_eq!(player.lives, 5);
    }

    #[test]
    fn test_builders_match_parsed_patches() {
        let score = Patch::player(PlayerPatch {
            score: Some(5),
            ..PlayerPatch::default()
        });
        assert_eq!(score, Patch::from_value(&json!({"player": {"score": 5}})));
        assert_eq!(
            Patch::level_switch("Level2"),
            Patch::from_value(&json!({"currentLevel": "Level2"}))
        );

        let (mut player, mut game, tables) = fresh();
        let effects = apply(&Patch::level_switch("Level2"), &mut player, &mut game, &tables);
        assert_eq!(effects, vec![SideEffect::LevelSwitch("Level2".into())]);
    }

    fn upgrade_kind() -> impl Strategy<Value = UpgradeKind> {
        (0usize..UpgradeKind::ALL.len()).prop_map(|i| UpgradeKind::ALL[i])
    }

    fn player_patch() -> impl Strategy<Value = PlayerPatch> {
        (
            proptest::option::of(any::<bool>()),
            proptest::option::of(0u32..10),
            proptest::option::of(-1000i64..1000),
            proptest::option::of(0.0f32..1000.0),
            proptest::option::of(0.0f32..1000.0),
            proptest::option::of((-500.0f32..500.0, 0.0f32..3000.0)),
            proptest::option::of(0.0f32..2000.0),
            proptest::collection::btree_map(upgrade_kind(), 0u32..6, 0..4),
        )
            .prop_map(|(alive, lives, score, speed, jump_strength, gravity, max_fall, upgrades)| {
                PlayerPatch {
                    alive,
                    lives,
                    score,
                    speed,
                    jump_strength,
                    gravity: gravity.map(|(x, y)| Vec2::new(x, y)),
                    max_fall,
                    upgrades,
                }
            })
    }

    fn patch() -> impl Strategy<Value = Patch> {
        (
            proptest::option::of(player_patch()),
            proptest::option::of("[A-Za-z0-9]{1,8}"),
            any::<bool>(),
        )
            .prop_map(|(player, level, ui)| {
                let mut ops = Vec::new();
                if let Some(p) = player {
                    ops.push(PatchOp::Player(p));
                }
                if let Some(l) = level {
                    ops.push(PatchOp::LevelSwitch(l));
                }
                if ui {
                    ops.push(PatchOp::OpenUi(json!({"panel": "info"})));
                }
                Patch { ops }
            })
    }

    fn player_state() -> impl Strategy<Value = PlayerState> {
        (
            proptest::collection::btree_map(upgrade_kind(), 0u32..5, 0..5),
            0u32..4,
            0u32..6,
            -1000i64..1000,
            any::<bool>(),
        )
            .prop_map(|(mut upgrades, extra_live, lives, score, alive)| {
                upgrades.insert(UpgradeKind::ExtraLive, extra_live);
                let tables = UpgradeTables::default();
                let mut player = PlayerState::new(
                    Vec2::new(10.0, 10.0),
                    48.0,
                    PhysicsParams::default(),
                    upgrades,
                    &tables,
                );
                player.lives = lives;
                player.score = score;
                player.alive = alive;
                player
            })
    }

    proptest! {
        #[test]
        fn prop_apply_is_idempotent(patch in patch(), start in player_state()) {
            let (_, mut game, tables) = fresh();
            let mut player = start;

            let first = apply(&patch, &mut player, &mut game, &tables);
            let (player_once, game_once) = (player.clone(), game.clone());

            let second = apply(&patch, &mut player, &mut game, &tables);

            prop_assert_eq!(&player, &player_once);
            prop_assert_eq!(&game, &game_once);
            prop_assert_eq!(first, second);
        }
    }
}

//! Player Physics
//!
//! Two halves around collision resolution:
//! - [`integrate`] turns input and dt into velocity and a proposed
//!   displacement (gravity, gliding, horizontal speed, jumps).
//! - [`after_move`] takes the resolved move and updates grounding, the jump
//!   budget and fall tracking, reporting fall damage on landing.

use crate::core::vec2::Vec2;
use crate::game::collision::CollisionOutcome;
use crate::game::input::InputFrame;
use crate::game::state::{Facing, PlayerState};
use crate::game::upgrade::{UpgradeKind, UpgradeTables};

/// Landing that exceeded the survivable fall distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FallDamage {
    /// Fall distance in tiles
    pub distance_tiles: f32,
    /// Threshold that was exceeded
    pub threshold_tiles: f32,
}

/// Advance velocity from input and return this step's displacement.
pub fn integrate(player: &mut PlayerState, input: &InputFrame, dt: f32, tables: &UpgradeTables) -> Vec2 {
    // Horizontal: instant, no acceleration ramp
    let dir = input.direction();
    let speed = player.params.speed + tables.speed_bonus(player.upgrade_level(UpgradeKind::Speed));
    player.vel.x = speed * dir;
    if dir < 0.0 {
        player.facing = Facing::Left;
    } else if dir > 0.0 {
        player.facing = Facing::Right;
    }

    // Jump
    if input.jump_pressed() {
        let strength = player.params.jump_strength
            + tables.jump_bonus(player.upgrade_level(UpgradeKind::HighJump));
        if player.grounded {
            player.vel.y = -strength;
        } else if player.air_jumps_left > 0 {
            player.air_jumps_left -= 1;
            player.vel.y = -strength;
        }
    }

    // Gravity, softened while gliding downward
    let glide_level = player.upgrade_level(UpgradeKind::Gliding);
    player.gliding = glide_level > 0 && input.shift_held() && player.vel.y > 0.0;
    let mut gravity = player.params.gravity.y;
    if player.gliding {
        gravity *= 1.0 - tables.glide_reduction(glide_level);
    }

    player.vel.y = (player.vel.y + gravity * dt).min(player.params.max_fall);

    player.vel * dt
}

/// Apply a resolved move.
///
/// `was_grounded` and `prev_y` are the values from before [`integrate`].
pub fn after_move(
    player: &mut PlayerState,
    outcome: &CollisionOutcome,
    was_grounded: bool,
    prev_y: f32,
    tile: f32,
    tables: &UpgradeTables,
) -> Option<FallDamage> {
    player.pos = outcome.position;
    if outcome.hit_x {
        player.vel.x = 0.0;
    }
    if outcome.hit_y {
        player.vel.y = 0.0;
    }
    player.grounded = outcome.grounded;

    let mut damage = None;
    match (was_grounded, player.grounded) {
        (true, false) => player.fall_origin_y = Some(prev_y),
        (false, true) => {
            let origin = player.fall_origin_y.take().unwrap_or(player.pos.y);
            let distance_tiles = (player.pos.y - origin) / tile;
            let threshold_tiles =
                tables.fall_damage_threshold(player.upgrade_level(UpgradeKind::FallDamage));
            if distance_tiles > threshold_tiles {
                damage = Some(FallDamage {
                    distance_tiles,
                    threshold_tiles,
                });
            }
        }
        _ => {}
    }

    if player.grounded {
        player.air_jumps_left = tables.air_jumps(player.upgrade_level(UpgradeKind::DoubleJump));
    }

    damage
}

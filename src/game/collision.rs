//! Tile Collision
//!
//! Axis-separated resolution of the player box against solid tiles:
//! x first, then y. Each axis sweeps every tile column (or row) between the
//! old and new edge, so fast moves cannot tunnel through thin walls. After
//! the move, every non-solid tile under the final box is reported in
//! row-major order.

use std::ops::RangeInclusive;

use crate::core::vec2::Vec2;
use crate::game::level::{LevelGrid, TileCoord};
use crate::game::tile::TileRuleSet;

/// Edge tolerance in pixels. A box edge exactly on a tile boundary does
/// not overlap the neighbouring tile.
pub const EPS: f32 = 1e-3;

/// Axis-aligned box. `pos` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Top-left corner
    pub pos: Vec2,
    /// Width and height
    pub size: Vec2,
}

impl Aabb {
    /// Create a box.
    pub const fn new(pos: Vec2, size: Vec2) -> Self {
        Self { pos, size }
    }

    /// Right edge.
    #[inline]
    pub fn right(&self) -> f32 {
        self.pos.x + self.size.x
    }

    /// Bottom edge.
    #[inline]
    pub fn bottom(&self) -> f32 {
        self.pos.y + self.size.y
    }

    /// Inclusive tile column range covered by `[left, left + width)`.
    #[inline]
    fn columns(&self, tile: f32) -> (i32, i32) {
        (cell(self.pos.x, tile), cell(self.right() - EPS, tile))
    }

    /// Inclusive tile row range covered by `[top, top + height)`.
    #[inline]
    fn rows(&self, tile: f32) -> (i32, i32) {
        (cell(self.pos.y, tile), cell(self.bottom() - EPS, tile))
    }

    /// Whether this box overlaps the tile at `coord` by more than `EPS`.
    pub fn overlaps_tile(&self, coord: TileCoord, tile: f32) -> bool {
        let (tx, ty) = (coord.x as f32 * tile, coord.y as f32 * tile);
        self.pos.x < tx + tile - EPS
            && self.right() > tx + EPS
            && self.pos.y < ty + tile - EPS
            && self.bottom() > ty + EPS
    }
}

#[inline]
fn cell(v: f32, tile: f32) -> i32 {
    (v / tile).floor() as i32
}

/// Sweep range clamped to the grid plus a one-tile border. Everything
/// further out is background.
#[inline]
fn within(from: i32, to: i32, limit: usize) -> RangeInclusive<i32> {
    let limit = i32::try_from(limit).unwrap_or(i32::MAX);
    from.max(-1)..=to.min(limit)
}

/// Result of resolving one move.
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionOutcome {
    /// Resolved top-left position
    pub position: Vec2,
    /// Standing on a solid tile
    pub grounded: bool,
    /// Horizontal move was clamped
    pub hit_x: bool,
    /// Vertical move was clamped (floor or ceiling)
    pub hit_y: bool,
    /// Non-solid tiles under the final box, row-major
    pub overlaps: Vec<(char, TileCoord)>,
}

/// Resolve a displacement against the grid.
pub fn resolve_move(
    bounds: Aabb,
    delta: Vec2,
    grid: &LevelGrid,
    rules: &TileRuleSet,
    tile: f32,
) -> CollisionOutcome {
    let solid = |x: i32, y: i32| rules.is_solid(grid.at(x, y));
    let (width, height) = grid.bounds();
    let mut b = bounds;

    // ---- X axis ----
    let mut hit_x = false;
    if delta.x != 0.0 {
        let (top, bottom) = b.rows(tile);
        let column_blocked = |col: i32| within(top, bottom, height).any(|row| solid(col, row));
        let target = b.pos.x + delta.x;

        if delta.x > 0.0 {
            let first = cell(b.right() - EPS, tile).saturating_add(1);
            let last = cell(target + b.size.x - EPS, tile);
            match within(first, last, width).find(|&c| column_blocked(c)) {
                Some(col) => {
                    b.pos.x = col as f32 * tile - b.size.x;
                    hit_x = true;
                }
                None => b.pos.x = target,
            }
        } else {
            let first = cell(b.pos.x, tile).saturating_sub(1);
            let last = cell(target, tile);
            match within(last, first, width).rev().find(|&c| column_blocked(c)) {
                Some(col) => {
                    b.pos.x = (col + 1) as f32 * tile;
                    hit_x = true;
                }
                None => b.pos.x = target,
            }
        }
    }

    // ---- Y axis ----
    let mut hit_y = false;
    let mut grounded = false;
    let (left, right) = b.columns(tile);
    let row_blocked = |row: i32| within(left, right, width).any(|col| solid(col, row));

    if delta.y > 0.0 {
        let target = b.pos.y + delta.y;
        let first = cell(b.bottom() - EPS, tile).saturating_add(1);
        let last = cell(target + b.size.y - EPS, tile);
        match within(first, last, height).find(|&r| row_blocked(r)) {
            Some(row) => {
                b.pos.y = row as f32 * tile - b.size.y;
                hit_y = true;
                grounded = true;
            }
            None => b.pos.y = target,
        }
    } else if delta.y < 0.0 {
        let target = b.pos.y + delta.y;
        let first = cell(b.pos.y, tile).saturating_sub(1);
        let last = cell(target, tile);
        match within(last, first, height).rev().find(|&r| row_blocked(r)) {
            Some(row) => {
                b.pos.y = (row + 1) as f32 * tile;
                hit_y = true;
            }
            None => b.pos.y = target,
        }
    } else {
        // No vertical motion: grounded if resting exactly on a solid row.
        let below = cell(b.bottom() + EPS, tile);
        let resting = (b.bottom() - below as f32 * tile).abs() <= EPS * 10.0;
        grounded = resting && row_blocked(below);
    }

    CollisionOutcome {
        position: b.pos,
        grounded,
        hit_x,
        hit_y,
        overlaps: non_solid_overlaps(&b, grid, rules, tile),
    }
}

/// Every non-solid tile under `b`, row-major.
pub fn non_solid_overlaps(
    b: &Aabb,
    grid: &LevelGrid,
    rules: &TileRuleSet,
    tile: f32,
) -> Vec<(char, TileCoord)> {
    let (left, right) = b.columns(tile);
    let (top, bottom) = b.rows(tile);
    let (width, height) = grid.bounds();
    let mut overlaps = Vec::new();

    for y in within(top, bottom, height) {
        for x in within(left, right, width) {
            let symbol = grid.at(x, y);
            if !rules.is_solid(symbol) {
                overlaps.push((symbol, TileCoord::new(x, y)));
            }
        }
    }

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(count = overlaps.len(), "non-solid overlaps");

    overlaps
}

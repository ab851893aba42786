//! Input Snapshot and Recording
//!
//! The simulation consumes one [`InputFrame`] per step. Collaborators report
//! held keys; [`InputTracker`] turns those into frames with a jump *edge*,
//! so holding jump does not re-fire every frame.

use serde::{Serialize, Deserialize};

// =============================================================================
// INPUT TYPES
// =============================================================================

/// Input state for a single frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Horizontal direction: negative = left, positive = right, 0 = none
    pub horizontal: i8,

    /// Action flags (packed bits):
    /// - Bit 0: Jump pressed this frame (edge)
    /// - Bit 1: Shift held
    /// - Bit 2: Restart pressed
    /// - Bit 3: Quit pressed
    pub flags: u8,
}

impl InputFrame {
    /// Jump flag bit
    pub const FLAG_JUMP: u8 = 0x01;

    /// Shift (glide) flag bit
    pub const FLAG_SHIFT: u8 = 0x02;

    /// Restart flag bit
    pub const FLAG_RESTART: u8 = 0x04;

    /// Quit flag bit
    pub const FLAG_QUIT: u8 = 0x08;

    /// Create an idle frame.
    pub const fn new() -> Self {
        Self {
            horizontal: 0,
            flags: 0,
        }
    }

    /// Create a frame with horizontal movement only.
    pub const fn with_horizontal(horizontal: i8) -> Self {
        Self {
            horizontal,
            flags: 0,
        }
    }

    /// Builder: set the jump edge.
    pub const fn jumping(mut self) -> Self {
        self.flags |= Self::FLAG_JUMP;
        self
    }

    /// Builder: hold shift.
    pub const fn shifted(mut self) -> Self {
        self.flags |= Self::FLAG_SHIFT;
        self
    }

    /// Movement direction as -1.0, 0.0 or +1.0.
    #[inline]
    pub fn direction(&self) -> f32 {
        self.horizontal.signum() as f32
    }

    /// Check if jump was pressed this frame.
    #[inline]
    pub fn jump_pressed(&self) -> bool {
        self.flags & Self::FLAG_JUMP != 0
    }

    /// Check if shift is held.
    #[inline]
    pub fn shift_held(&self) -> bool {
        self.flags & Self::FLAG_SHIFT != 0
    }

    /// Check if restart was pressed.
    #[inline]
    pub fn restart_pressed(&self) -> bool {
        self.flags & Self::FLAG_RESTART != 0
    }

    /// Check if quit was pressed.
    #[inline]
    pub fn quit_pressed(&self) -> bool {
        self.flags & Self::FLAG_QUIT != 0
    }

    /// Check if this is an idle frame (no input).
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.horizontal == 0 && self.flags == 0
    }

    /// Set jump flag.
    #[inline]
    pub fn set_jump(&mut self, pressed: bool) {
        self.set_flag(Self::FLAG_JUMP, pressed);
    }

    /// Set shift flag.
    #[inline]
    pub fn set_shift(&mut self, held: bool) {
        self.set_flag(Self::FLAG_SHIFT, held);
    }

    /// Set restart flag.
    #[inline]
    pub fn set_restart(&mut self, pressed: bool) {
        self.set_flag(Self::FLAG_RESTART, pressed);
    }

    /// Set quit flag.
    #[inline]
    pub fn set_quit(&mut self, pressed: bool) {
        self.set_flag(Self::FLAG_QUIT, pressed);
    }

    #[inline]
    fn set_flag(&mut self, bit: u8, on: bool) {
        if on {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
    }
}

/// Keys currently held, as reported by the input collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeldKeys {
    /// Left held
    pub left: bool,
    /// Right held
    pub right: bool,
    /// Jump held
    pub jump: bool,
    /// Shift held
    pub shift: bool,
    /// Restart held
    pub restart: bool,
    /// Quit held
    pub quit: bool,
}

/// Converts held keys into frames with press edges.
#[derive(Clone, Debug, Default)]
pub struct InputTracker {
    previous: HeldKeys,
}

impl InputTracker {
    /// Create a tracker with nothing held.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the frame for this step and remember what was held.
    pub fn next_frame(&mut self, held: HeldKeys) -> InputFrame {
        let mut frame = InputFrame::new();
        frame.horizontal = match (held.left, held.right) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        };
        frame.set_jump(held.jump && !self.previous.jump);
        frame.set_shift(held.shift);
        frame.set_restart(held.restart && !self.previous.restart);
        frame.set_quit(held.quit);

        self.previous = held;
        frame
    }
}

// =============================================================================
// INPUT RECORDING
// =============================================================================

/// Input change at a given tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDelta {
    /// Tick when this input state began
    pub tick: u64,
    /// The new input state
    pub frame: InputFrame,
}

/// Delta-compressed input recording for replaying a run.
///
/// Only ticks where the input changed are stored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InputRecording {
    deltas: Vec<InputDelta>,
    end_tick: u64,
    #[serde(skip)]
    last_frame: InputFrame,
}

impl InputRecording {
    /// Create an empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record input for a tick. Ticks must be recorded in increasing order.
    pub fn record(&mut self, tick: u64, frame: InputFrame) {
        self.end_tick = tick;
        if self.deltas.is_empty() || frame != self.last_frame {
            self.deltas.push(InputDelta { tick, frame });
            self.last_frame = frame;
        }
    }

    /// Input in effect at `tick` (idle before the first delta).
    pub fn input_at(&self, tick: u64) -> InputFrame {
        let idx = self.deltas.partition_point(|d| d.tick <= tick);
        if idx == 0 {
            InputFrame::new()
        } else {
            self.deltas[idx - 1].frame
        }
    }

    /// Last recorded tick.
    pub fn end_tick(&self) -> u64 {
        self.end_tick
    }

    /// Stored deltas.
    pub fn deltas(&self) -> &[InputDelta] {
        &self.deltas
    }
}

//! Pixel masks for the 21-LED ring and the short blocking effects
//! ("micro-programs") that can be played on it.
//!
//! Layout: pixel 0 is the centre dot, 1..=8 the inner ring and 9..=20 the
//! outer ring, both rings starting at the top and running clockwise.

use crate::drivers::{Clock, LedStrip};

pub const PIXEL_COUNT: usize = 21;

const WIPE_STEP_MS: u64 = 20;
const BLINK_PHASE_MS: u64 = 100;
const SETTLE_MS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedMask(pub [bool; PIXEL_COUNT]);

impl LedMask {
    pub const NONE: Self = Self([false; PIXEL_COUNT]);

    /// Mask with every pixel in `start..end` lit.
    pub const fn range(start: usize, end: usize) -> Self {
        let mut pixels = [false; PIXEL_COUNT];
        let mut i = start;
        while i < end && i < PIXEL_COUNT {
            pixels[i] = true;
            i += 1;
        }
        Self(pixels)
    }

    pub const fn from_indices(indices: &[usize]) -> Self {
        let mut pixels = [false; PIXEL_COUNT];
        let mut i = 0;
        while i < indices.len() {
            if indices[i] < PIXEL_COUNT {
                pixels[indices[i]] = true;
            }
            i += 1;
        }
        Self(pixels)
    }

    pub const fn union(self, other: Self) -> Self {
        let mut pixels = self.0;
        let mut i = 0;
        while i < PIXEL_COUNT {
            pixels[i] = pixels[i] || other.0[i];
            i += 1;
        }
        Self(pixels)
    }

    pub fn is_lit(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn lit_count(&self) -> usize {
        self.0.iter().filter(|lit| **lit).count()
    }
}

impl Default for LedMask {
    fn default() -> Self {
        Self::NONE
    }
}

pub const CENTER_DOT: LedMask = LedMask::range(0, 1);
pub const INNER_RING: LedMask = LedMask::range(1, 9);
pub const OUTER_RING: LedMask = LedMask::range(9, PIXEL_COUNT);
pub const ALL: LedMask = LedMask::range(0, PIXEL_COUNT);
pub const INNER_TOP: LedMask = LedMask::from_indices(&[1, 2, 8]);
pub const OUTER_TOP: LedMask = LedMask::from_indices(&[9, 10, 11, 19, 20]);
pub const QUARTER_1: LedMask = LedMask::from_indices(&[1, 2, 9, 10, 11]);
pub const QUARTER_2: LedMask = LedMask::from_indices(&[3, 4, 12, 13, 14]);
pub const QUARTER_3: LedMask = LedMask::from_indices(&[5, 6, 15, 16, 17]);
pub const QUARTER_4: LedMask = LedMask::from_indices(&[7, 8, 18, 19, 20]);

pub const STAGE_2: LedMask = CENTER_DOT.union(INNER_RING);
pub const WIFI_SIGNAL: LedMask = CENTER_DOT.union(INNER_TOP).union(OUTER_TOP);

/// Short blocking effects. Each one drives the strip directly and returns
/// once finished; none of them runs longer than about a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    /// Fills the ring pixel by pixel, or empties it when `reverse`.
    CircleWipe { reverse: bool },
    /// Flashes the whole ring `passes` times.
    Blink { passes: u8 },
    /// Grows a signal-strength fan from the centre upwards over `duration_ms`.
    Radiate { duration_ms: u64 },
}

impl Procedure {
    pub fn run<L: LedStrip, C: Clock>(self, led: &mut L, clock: &mut C) {
        match self {
            Self::CircleWipe { reverse } => circle_wipe(led, clock, reverse),
            Self::Blink { passes } => blink(led, clock, passes),
            Self::Radiate { duration_ms } => radiate(led, clock, duration_ms),
        }
    }

    /// Wall time the effect blocks for.
    pub fn run_time_ms(self) -> u64 {
        match self {
            Self::CircleWipe { .. } => (PIXEL_COUNT as u64 + 1) * WIPE_STEP_MS,
            Self::Blink { passes } => u64::from(passes) * 2 * BLINK_PHASE_MS,
            Self::Radiate { duration_ms } => radiate_step_ms(duration_ms) * 4 + SETTLE_MS,
        }
    }
}

fn circle_wipe<L: LedStrip, C: Clock>(led: &mut L, clock: &mut C, reverse: bool) {
    for step in 0..=PIXEL_COUNT {
        let mask = if reverse {
            LedMask::range(step, PIXEL_COUNT)
        } else {
            LedMask::range(0, step)
        };
        led.set_pixels(&mask, false);
        led.show();
        clock.delay_ms(WIPE_STEP_MS);
    }
}

fn blink<L: LedStrip, C: Clock>(led: &mut L, clock: &mut C, passes: u8) {
    for phase in 0..u16::from(passes) * 2 {
        if phase % 2 == 0 {
            led.set_pixels(&ALL, false);
        } else {
            led.clear();
        }
        led.show();
        clock.delay_ms(BLINK_PHASE_MS);
    }
}

fn radiate_step_ms(duration_ms: u64) -> u64 {
    (duration_ms.saturating_sub(SETTLE_MS) / 4).max(SETTLE_MS)
}

fn radiate<L: LedStrip, C: Clock>(led: &mut L, clock: &mut C, duration_ms: u64) {
    let step_ms = radiate_step_ms(duration_ms);

    for step in 0..3 {
        led.set_pixels(&CENTER_DOT, false);
        if step > 0 {
            led.set_pixels(&INNER_TOP, true);
        }
        if step > 1 {
            led.set_pixels(&OUTER_TOP, true);
        }
        led.show();
        clock.delay_ms(step_ms);
    }

    // hold the full fan for one more step
    clock.delay_ms(step_ms);

    led.clear();
    led.show();
    clock.delay_ms(SETTLE_MS);
}

//! Background animation engine.
//!
//! Frames sit in a fixed-capacity ring and play back as a loop: each call to
//! [`AnimationScheduler::tick`] renders at most one frame, and only once its
//! deadline has passed. Deadlines accumulate from the previous deadline rather
//! than from "now", so a late tick does not push the rest of the loop back.
//!
//! Foreground feedback (gesture stages, settings menu) takes the strip with
//! [`AnimationScheduler::pause`] and hands it back with
//! [`AnimationScheduler::resume`], which shifts the schedule by the time spent
//! paused and re-renders the static frame that was showing.

use crate::{
    drivers::{Clock, LedStrip},
    led::{
        LedMask, Procedure, ALL, CENTER_DOT, INNER_RING, OUTER_RING, QUARTER_1, QUARTER_2,
        QUARTER_3, QUARTER_4, WIFI_SIGNAL,
    },
    ring::RingBuffer,
};

pub const ANIMATION_QUEUE_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    StaticMask(&'static LedMask),
    Procedure(Procedure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationFrame {
    pub kind: FrameKind,
    pub duration_ms: u64,
}

impl AnimationFrame {
    pub const fn mask(mask: &'static LedMask, duration_ms: u64) -> Self {
        Self {
            kind: FrameKind::StaticMask(mask),
            duration_ms,
        }
    }

    pub const fn program(procedure: Procedure, duration_ms: u64) -> Self {
        Self {
            kind: FrameKind::Procedure(procedure),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnimationCursor {
    pub next_deadline_ms: u64,
    pub index: usize,
    pub paused: bool,
    pub paused_at_ms: u64,
    /// Queue position of the frame most recently rendered.
    pub active: Option<usize>,
}

/// Canned frame loops enqueued by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playlist {
    Celebration,
    QuadrantSweep,
    ErrorBlink,
}

const CELEBRATION: [AnimationFrame; 6] = [
    AnimationFrame::program(Procedure::CircleWipe { reverse: false }, 600),
    AnimationFrame::mask(&INNER_RING, 300),
    AnimationFrame::mask(&OUTER_RING, 300),
    AnimationFrame::mask(&ALL, 300),
    AnimationFrame::program(Procedure::Blink { passes: 2 }, 500),
    AnimationFrame::mask(&CENTER_DOT, 300),
];

const QUADRANT_SWEEP: [AnimationFrame; 4] = [
    AnimationFrame::mask(&QUARTER_1, 250),
    AnimationFrame::mask(&QUARTER_2, 250),
    AnimationFrame::mask(&QUARTER_3, 250),
    AnimationFrame::mask(&QUARTER_4, 250),
];

const ERROR_BLINK: [AnimationFrame; 2] = [
    AnimationFrame::mask(&WIFI_SIGNAL, 1_000),
    AnimationFrame::mask(&LedMask::NONE, 5_000),
];

impl Playlist {
    pub fn frames(self) -> &'static [AnimationFrame] {
        match self {
            Self::Celebration => &CELEBRATION,
            Self::QuadrantSweep => &QUADRANT_SWEEP,
            Self::ErrorBlink => &ERROR_BLINK,
        }
    }
}

#[derive(Debug, Default)]
pub struct AnimationScheduler {
    queue: RingBuffer<AnimationFrame, ANIMATION_QUEUE_CAPACITY>,
    cursor: AnimationCursor,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> AnimationCursor {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.cursor.paused
    }

    pub fn frames(&self) -> impl Iterator<Item = &AnimationFrame> {
        self.queue.iter()
    }

    pub fn enqueue(&mut self, frame: AnimationFrame, now_ms: u64) {
        if self.queue.is_empty() {
            self.cursor.index = 0;
            self.cursor.active = None;
            self.cursor.next_deadline_ms = now_ms;
        }

        if self.queue.push(frame).is_some() {
            // Oldest frame dropped; every queued position moved down by one.
            self.cursor.index = self.cursor.index.saturating_sub(1);
            self.cursor.active = match self.cursor.active {
                Some(0) | None => None,
                Some(active) => Some(active - 1),
            };
        }
    }

    pub fn enqueue_playlist(&mut self, playlist: Playlist, now_ms: u64) {
        for frame in playlist.frames() {
            self.enqueue(*frame, now_ms);
        }
    }

    /// Renders the due frame, if any. Returns whether a frame was rendered.
    pub fn tick<L: LedStrip, C: Clock>(&mut self, now_ms: u64, led: &mut L, clock: &mut C) -> bool {
        if self.queue.is_empty() || self.cursor.paused || now_ms < self.cursor.next_deadline_ms {
            return false;
        }

        let index = self.cursor.index % self.queue.len();
        let Some(frame) = self.queue.get(index).copied() else {
            return false;
        };

        render(frame, led, clock);

        self.cursor.active = Some(index);
        self.cursor.index = (index + 1) % self.queue.len();
        self.cursor.next_deadline_ms = self
            .cursor
            .next_deadline_ms
            .saturating_add(frame.duration_ms);
        true
    }

    pub fn pause(&mut self, now_ms: u64) {
        if self.cursor.paused {
            return;
        }
        self.cursor.paused = true;
        self.cursor.paused_at_ms = now_ms;
    }

    pub fn resume<L: LedStrip>(&mut self, now_ms: u64, led: &mut L) {
        if !self.cursor.paused {
            return;
        }
        self.cursor.paused = false;

        let paused_for = now_ms.saturating_sub(self.cursor.paused_at_ms);
        self.cursor.next_deadline_ms = self.cursor.next_deadline_ms.saturating_add(paused_for);

        // Programs are not replayed; only a static frame is restored.
        let active = self.cursor.active.and_then(|index| self.queue.get(index));
        if let Some(AnimationFrame {
            kind: FrameKind::StaticMask(mask),
            ..
        }) = active
        {
            led.set_pixels(mask, false);
            led.show();
        }
    }

    pub fn clear<L: LedStrip>(&mut self, led: &mut L) {
        self.queue.clear();
        self.cursor = AnimationCursor::default();
        led.clear();
        led.show();
    }
}

fn render<L: LedStrip, C: Clock>(frame: AnimationFrame, led: &mut L, clock: &mut C) {
    match frame.kind {
        FrameKind::StaticMask(mask) => {
            led.set_pixels(mask, false);
            led.show();
        }
        FrameKind::Procedure(procedure) => procedure.run(led, clock),
    }
}

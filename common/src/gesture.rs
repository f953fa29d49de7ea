//! Long-press staging on top of the button driver's edges.
//!
//! | Stage | Held for (since long-press start) | Meaning                 |
//! |-------|-----------------------------------|-------------------------|
//! | 1     | immediately                       | feedback: centre dot    |
//! | 2     | >= 1000 ms                        | feedback: inner ring    |
//! | 3     | >= 2000 ms                        | feedback: outer ring    |
//! | 4     | >= 3000 ms                        | release restarts device |
//!
//! At most one stage is emitted per update, so a press that is only
//! re-evaluated late still walks through every stage in order.

use crate::button::ButtonEdge;

pub const RESET_STAGE: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    Click,
    DoubleClick,
    LongPressStart,
    LongPressStage(u8),
    LongPressEnd { reset: bool },
}

#[derive(Debug, Clone)]
pub struct GestureRecognizer {
    thresholds_ms: [u64; 3],
    stage: u8,
    press_start_ms: u64,
}

impl GestureRecognizer {
    pub fn new(thresholds_ms: [u64; 3]) -> Self {
        Self {
            thresholds_ms,
            stage: 0,
            press_start_ms: 0,
        }
    }

    pub fn stage(&self) -> u8 {
        self.stage
    }

    /// Feeds the driver's edge for this tick (if any) and re-evaluates a held
    /// press.
    pub fn update(&mut self, edge: Option<ButtonEdge>, now_ms: u64) -> Option<GestureEvent> {
        match edge {
            Some(ButtonEdge::Click) => Some(GestureEvent::Click),
            Some(ButtonEdge::DoubleClick) => Some(GestureEvent::DoubleClick),
            Some(ButtonEdge::LongPressStart) => {
                self.stage = 1;
                self.press_start_ms = now_ms;
                Some(GestureEvent::LongPressStart)
            }
            Some(ButtonEdge::LongPressStop) => {
                if self.stage == 0 {
                    return None;
                }
                let reset = self.stage == RESET_STAGE;
                self.stage = 0;
                Some(GestureEvent::LongPressEnd { reset })
            }
            None => self.advance_stage(now_ms),
        }
    }

    fn advance_stage(&mut self, now_ms: u64) -> Option<GestureEvent> {
        if self.stage == 0 || self.stage >= RESET_STAGE {
            return None;
        }

        let held_ms = now_ms.saturating_sub(self.press_start_ms);
        // thresholds_ms[0] gates stage 2, [1] stage 3, [2] stage 4.
        let threshold = self.thresholds_ms[usize::from(self.stage - 1)];
        if held_ms < threshold {
            return None;
        }

        self.stage += 1;
        Some(GestureEvent::LongPressStage(self.stage))
    }
}

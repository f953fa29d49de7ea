//! Debounced click / double-click / long-press edge detection for a single
//! momentary button, fed with raw pin samples from the platform's polling
//! loop.
//!
//! | Edge           | Condition                                          |
//! |----------------|----------------------------------------------------|
//! | Click          | released, no second press within the click window |
//! | DoubleClick    | second press starts inside the click window        |
//! | LongPressStart | held >= long-press delay                           |
//! | LongPressStop  | released after a long press                        |

const DEBOUNCE_MS: u64 = 50;
const CLICK_WINDOW_MS: u64 = 400;
const LONG_PRESS_DELAY_MS: u64 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Click,
    DoubleClick,
    LongPressStart,
    LongPressStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Idle,
    Pressed { since_ms: u64 },
    AwaitSecondPress { released_ms: u64 },
    SecondPress,
    LongPress,
}

#[derive(Debug, Clone)]
pub struct ButtonDecoder {
    state: DecoderState,
    raw_pressed: bool,
    raw_changed_ms: u64,
    stable_pressed: bool,
}

impl Default for ButtonDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            raw_pressed: false,
            raw_changed_ms: 0,
            stable_pressed: false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.stable_pressed
    }

    /// Call once per loop iteration with the current pin level.
    pub fn update(&mut self, pressed: bool, now_ms: u64) -> Option<ButtonEdge> {
        if pressed != self.raw_pressed {
            self.raw_pressed = pressed;
            self.raw_changed_ms = now_ms;
        }
        if self.raw_pressed != self.stable_pressed
            && now_ms.saturating_sub(self.raw_changed_ms) >= DEBOUNCE_MS
        {
            self.stable_pressed = self.raw_pressed;
        }

        let down = self.stable_pressed;
        match self.state {
            DecoderState::Idle => {
                if down {
                    self.state = DecoderState::Pressed { since_ms: now_ms };
                }
                None
            }
            DecoderState::Pressed { since_ms } => {
                if !down {
                    self.state = DecoderState::AwaitSecondPress {
                        released_ms: now_ms,
                    };
                    None
                } else if now_ms.saturating_sub(since_ms) >= LONG_PRESS_DELAY_MS {
                    self.state = DecoderState::LongPress;
                    Some(ButtonEdge::LongPressStart)
                } else {
                    None
                }
            }
            DecoderState::AwaitSecondPress { released_ms } => {
                if down {
                    self.state = DecoderState::SecondPress;
                    None
                } else if now_ms.saturating_sub(released_ms) >= CLICK_WINDOW_MS {
                    self.state = DecoderState::Idle;
                    Some(ButtonEdge::Click)
                } else {
                    None
                }
            }
            DecoderState::SecondPress => {
                if down {
                    None
                } else {
                    self.state = DecoderState::Idle;
                    Some(ButtonEdge::DoubleClick)
                }
            }
            DecoderState::LongPress => {
                if down {
                    None
                } else {
                    self.state = DecoderState::Idle;
                    Some(ButtonEdge::LongPressStop)
                }
            }
        }
    }
}

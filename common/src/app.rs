use crate::{
    animation::Playlist,
    config::PartyConfig,
    gesture::{GestureEvent, RESET_STAGE},
    led::{LedMask, Procedure, ALL, CENTER_DOT, STAGE_2},
    monitor::LinkEvent,
    types::{AppState, ErrorCode, SettingsOption, Voice},
    webhook::{WebhookOutcome, WebhookReport},
};

const PARTY_ON: &str = "The party is on.";
const LETS_PARTY: &str = "Let's party!";
const ANNOUNCED: &str = "The party has been announced. Please wait.";
const REFUSED: &str = "Sorry. The party was refused.";
const CONNECTION_FAILED: &str = "Connection failed.";
const FAREWELL: &str = "Good night. See you at the next party.";
const IMPATIENT: &str = "Fine. No party then.";
const PARTY_OVER: &str = "The party is over.";
const SETTINGS: &str = "Settings.";
const SETTINGS_EXIT: &str = "Bye.";
const VOICE_CHANGED: &str = "Voice changed.";
const TEST_ARMED: &str = "The next party is a test.";
const TESTING: &str = "Testing connection.";
const TEST_PASSED: &str = "Connection test succeeded.";
const TEST_FAILED: &str = "Connection test failed.";
const WAIT_PHRASES: [&str; 4] = [
    "Please wait.",
    "Patience, please.",
    "The guests are on their way.",
    "Not yet. Almost there.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Gesture(GestureEvent),
    Link(LinkEvent),
    Webhook(WebhookReport),
}

/// Side effects requested by the engine, executed in order by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Say(&'static str),
    SetVoice(Voice),
    AnnounceIp,
    ShowMask(&'static LedMask),
    ClearLeds,
    Play(Procedure),
    Delay(u64),
    PauseAnimation,
    ResumeAnimation,
    ClearAnimation,
    Enqueue(Playlist),
    CallWebhook { test: bool },
    Restart,
}

#[derive(Debug, Clone)]
pub struct PartyEngine {
    config: PartyConfig,
    state: AppState,
    previous: Option<AppState>,
    entered_at_ms: u64,
    error_code: Option<ErrorCode>,
    settings_option: SettingsOption,
    voice: Voice,
    test_armed: bool,
    test_in_flight: bool,
    // The background animation was paused by an ongoing long press.
    held_pause: bool,
    rng: u32,
}

impl PartyEngine {
    pub fn new(config: PartyConfig, voice: Voice) -> Self {
        Self {
            config,
            state: AppState::Ready,
            previous: None,
            entered_at_ms: 0,
            error_code: None,
            settings_option: SettingsOption::Exit,
            voice,
            test_armed: false,
            test_in_flight: false,
            held_pause: false,
            rng: 0x2545_f491,
        }
    }

    pub fn config(&self) -> &PartyConfig {
        &self.config
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn previous_state(&self) -> Option<AppState> {
        self.previous
    }

    pub fn entered_at_ms(&self) -> u64 {
        self.entered_at_ms
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }

    pub fn settings_option(&self) -> SettingsOption {
        self.settings_option
    }

    pub fn voice(&self) -> Voice {
        self.voice
    }

    pub fn is_test_armed(&self) -> bool {
        self.test_armed
    }

    /// Outcome of the power-on link check.
    pub fn boot_completed(&mut self, connected: bool, now_ms: u64) -> Vec<Effect> {
        self.entered_at_ms = now_ms;
        if connected {
            return vec![Effect::Delay(200), Effect::Play(Procedure::Blink { passes: 3 })];
        }
        self.enter_error(ErrorCode::NoNetworkAtBoot, now_ms)
    }

    pub fn handle(&mut self, event: Event, now_ms: u64) -> Vec<Effect> {
        match event {
            Event::Gesture(gesture) => self.on_gesture(gesture, now_ms),
            Event::Link(LinkEvent::Restored) => self.on_link_restored(now_ms),
            Event::Link(LinkEvent::Lost(code)) => self.on_link_lost(code, now_ms),
            Event::Webhook(report) => self.on_webhook(report, now_ms),
        }
    }

    /// Applies the per-state timeouts.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Effect> {
        let elapsed = now_ms.saturating_sub(self.entered_at_ms);
        match self.state {
            AppState::Party if elapsed >= self.config.party_timeout_ms => {
                self.enter(AppState::Ready, now_ms);
                let mut effects = self.reset_animation(None);
                effects.push(Effect::Say(PARTY_OVER));
                effects
            }
            AppState::Wait if elapsed >= self.config.wait_timeout_ms => {
                self.enter(AppState::Ready, now_ms);
                self.reset_animation(None)
            }
            AppState::Error if elapsed >= self.config.standby_timeout_ms => {
                self.enter(AppState::Standby, now_ms);
                self.reset_animation(None)
            }
            _ => Vec::new(),
        }
    }

    fn on_gesture(&mut self, gesture: GestureEvent, now_ms: u64) -> Vec<Effect> {
        match gesture {
            GestureEvent::Click => self.on_click(now_ms),
            GestureEvent::DoubleClick => self.on_double_click(now_ms),
            GestureEvent::LongPressStart => {
                let mut effects = Vec::new();
                if self.state != AppState::Settings && !self.held_pause {
                    self.held_pause = true;
                    effects.push(Effect::PauseAnimation);
                }
                effects.push(Effect::ShowMask(&CENTER_DOT));
                effects
            }
            GestureEvent::LongPressStage(2) => vec![Effect::ShowMask(&STAGE_2)],
            GestureEvent::LongPressStage(3) => vec![Effect::ShowMask(&ALL)],
            GestureEvent::LongPressStage(RESET_STAGE) => vec![
                Effect::ClearLeds,
                Effect::Delay(100),
                Effect::Play(Procedure::Blink { passes: 3 }),
            ],
            GestureEvent::LongPressStage(_) => Vec::new(),
            GestureEvent::LongPressEnd { reset } => {
                let mut effects = vec![Effect::ClearLeds];
                if reset {
                    effects.push(Effect::Restart);
                } else if self.held_pause {
                    self.held_pause = false;
                    effects.push(Effect::ResumeAnimation);
                }
                effects
            }
        }
    }

    fn on_click(&mut self, now_ms: u64) -> Vec<Effect> {
        match self.state {
            AppState::Standby => vec![Effect::Restart],
            AppState::Ready if self.test_armed => {
                self.test_armed = false;
                self.test_in_flight = true;
                vec![
                    Effect::Play(Procedure::Radiate {
                        duration_ms: self.config.boot_check_animation_ms,
                    }),
                    Effect::Say(TESTING),
                    Effect::CallWebhook { test: true },
                ]
            }
            AppState::Ready => {
                self.enter(AppState::Party, now_ms);
                let mut effects = self.reset_animation(None);
                effects.extend([
                    Effect::Play(Procedure::CircleWipe { reverse: false }),
                    Effect::Say(PARTY_ON),
                    Effect::CallWebhook { test: false },
                ]);
                effects
            }
            AppState::Wait => vec![Effect::Say(self.next_wait_phrase(now_ms))],
            AppState::Settings => {
                self.settings_option = self.settings_option.next();
                vec![Effect::Say(self.settings_option.label())]
            }
            AppState::Party | AppState::Error => Vec::new(),
        }
    }

    fn on_double_click(&mut self, now_ms: u64) -> Vec<Effect> {
        match self.state {
            AppState::Party => {
                self.enter(AppState::Ready, now_ms);
                let mut effects = self.reset_animation(None);
                effects.extend([
                    Effect::Play(Procedure::CircleWipe { reverse: true }),
                    Effect::Say(FAREWELL),
                ]);
                effects
            }
            AppState::Wait => {
                self.enter(AppState::Ready, now_ms);
                let mut effects = self.reset_animation(None);
                effects.push(Effect::Say(IMPATIENT));
                effects
            }
            AppState::Ready | AppState::Error => {
                self.enter(AppState::Settings, now_ms);
                self.settings_option = SettingsOption::Exit;
                vec![Effect::PauseAnimation, Effect::Say(SETTINGS)]
            }
            AppState::Settings => self.run_settings_option(now_ms),
            AppState::Standby => Vec::new(),
        }
    }

    fn run_settings_option(&mut self, now_ms: u64) -> Vec<Effect> {
        match self.settings_option {
            SettingsOption::Exit => {
                let back = self
                    .previous
                    .filter(|state| *state != AppState::Settings)
                    .unwrap_or(AppState::Ready);
                self.enter(back, now_ms);
                vec![Effect::Say(SETTINGS_EXIT), Effect::ResumeAnimation]
            }
            SettingsOption::Voice => {
                self.voice = self.voice.next();
                vec![Effect::SetVoice(self.voice), Effect::Say(VOICE_CHANGED)]
            }
            SettingsOption::Ip => vec![Effect::AnnounceIp],
            SettingsOption::ConnectionTest => {
                self.test_armed = true;
                vec![Effect::Say(TEST_ARMED)]
            }
        }
    }

    fn on_webhook(&mut self, report: WebhookReport, now_ms: u64) -> Vec<Effect> {
        if report.test {
            if !self.test_in_flight {
                return Vec::new();
            }
            self.test_in_flight = false;
            let phrase = if report.delivered {
                TEST_PASSED
            } else {
                TEST_FAILED
            };
            return vec![Effect::Say(phrase)];
        }

        if self.state != AppState::Party {
            return Vec::new();
        }

        let outcome = match report.outcome {
            WebhookOutcome::Failed if report.delivered && self.config.fail_open => {
                WebhookOutcome::StayActive
            }
            outcome => outcome,
        };

        match outcome {
            WebhookOutcome::StayActive => {
                let mut effects = vec![Effect::Say(LETS_PARTY)];
                effects.extend(self.reset_animation(Some(Playlist::Celebration)));
                effects
            }
            WebhookOutcome::Deferred => {
                self.enter(AppState::Wait, now_ms);
                let mut effects = vec![Effect::Say(ANNOUNCED)];
                effects.extend(self.reset_animation(Some(Playlist::QuadrantSweep)));
                effects
            }
            WebhookOutcome::Refused | WebhookOutcome::Failed => {
                self.enter(AppState::Ready, now_ms);
                let phrase = if outcome == WebhookOutcome::Refused {
                    REFUSED
                } else {
                    CONNECTION_FAILED
                };
                let mut effects = self.reset_animation(None);
                effects.extend([
                    Effect::Play(Procedure::CircleWipe { reverse: true }),
                    Effect::Say(phrase),
                ]);
                effects
            }
        }
    }

    fn on_link_restored(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.state != AppState::Error {
            return Vec::new();
        }
        self.error_code = None;
        self.enter(AppState::Ready, now_ms);
        self.reset_animation(None)
    }

    fn on_link_lost(&mut self, code: ErrorCode, now_ms: u64) -> Vec<Effect> {
        match self.state {
            // Once the party is on, nothing interrupts it.
            AppState::Party | AppState::Standby => Vec::new(),
            AppState::Error if self.error_code == Some(code) => Vec::new(),
            _ => self.enter_error(code, now_ms),
        }
    }

    fn enter_error(&mut self, code: ErrorCode, now_ms: u64) -> Vec<Effect> {
        self.enter(AppState::Error, now_ms);
        self.error_code = Some(code);
        self.reset_animation(Some(Playlist::ErrorBlink))
    }

    /// Only a real mode change moves the previous-state slot and the timeout clock.
    fn enter(&mut self, state: AppState, now_ms: u64) {
        if self.state == state {
            return;
        }
        self.previous = Some(self.state);
        self.state = state;
        self.entered_at_ms = now_ms;
    }

    fn reset_animation(&self, playlist: Option<Playlist>) -> Vec<Effect> {
        let mut effects = vec![Effect::ClearAnimation];
        if let Some(playlist) = playlist {
            effects.push(Effect::Enqueue(playlist));
        }
        // Clearing unpauses; keep the strip owned by a press still in progress.
        if self.held_pause {
            effects.push(Effect::PauseAnimation);
        }
        effects
    }

    fn next_wait_phrase(&mut self, now_ms: u64) -> &'static str {
        let mut x = self.rng ^ (now_ms as u32);
        if x == 0 {
            x = 0x9e37_79b9;
        }
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        WAIT_PHRASES[x as usize % WAIT_PHRASES.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn engine() -> PartyEngine {
        PartyEngine::new(PartyConfig::default(), Voice::Sam)
    }

    fn click(engine: &mut PartyEngine, now_ms: u64) -> Vec<Effect> {
        engine.handle(Event::Gesture(GestureEvent::Click), now_ms)
    }

    fn double_click(engine: &mut PartyEngine, now_ms: u64) -> Vec<Effect> {
        engine.handle(Event::Gesture(GestureEvent::DoubleClick), now_ms)
    }

    fn reply(engine: &mut PartyEngine, outcome: WebhookOutcome, delivered: bool) -> Vec<Effect> {
        engine.handle(
            Event::Webhook(WebhookReport {
                outcome,
                delivered,
                test: false,
            }),
            1_000,
        )
    }

    #[test]
    fn click_in_ready_starts_party_and_calls_webhook() {
        let mut engine = engine();
        let effects = click(&mut engine, 100);

        assert_eq!(engine.state(), AppState::Party);
        assert_eq!(engine.previous_state(), Some(AppState::Ready));
        assert_eq!(
            effects,
            vec![
                Effect::ClearAnimation,
                Effect::Play(Procedure::CircleWipe { reverse: false }),
                Effect::Say(PARTY_ON),
                Effect::CallWebhook { test: false },
            ]
        );
    }

    #[test]
    fn stay_active_enqueues_celebration() {
        let mut engine = engine();
        click(&mut engine, 0);
        let effects = reply(&mut engine, WebhookOutcome::StayActive, true);

        assert_eq!(engine.state(), AppState::Party);
        assert!(effects.contains(&Effect::Enqueue(Playlist::Celebration)));
    }

    #[test]
    fn deferred_moves_to_wait_with_quadrant_sweep() {
        let mut engine = engine();
        click(&mut engine, 0);
        let effects = reply(&mut engine, WebhookOutcome::Deferred, true);

        assert_eq!(engine.state(), AppState::Wait);
        assert_eq!(engine.entered_at_ms(), 1_000);
        assert!(effects.contains(&Effect::Enqueue(Playlist::QuadrantSweep)));
    }

    #[test]
    fn refused_and_unreachable_close_out_to_ready() {
        for (outcome, delivered) in [
            (WebhookOutcome::Refused, true),
            (WebhookOutcome::Failed, false),
        ] {
            let mut engine = engine();
            click(&mut engine, 0);
            let effects = reply(&mut engine, outcome, delivered);

            assert_eq!(engine.state(), AppState::Ready);
            assert!(effects.contains(&Effect::Play(Procedure::CircleWipe { reverse: true })));
        }
    }

    #[test]
    fn ambiguous_reply_fails_open() {
        let mut engine = engine();
        click(&mut engine, 0);
        reply(&mut engine, WebhookOutcome::Failed, true);
        assert_eq!(engine.state(), AppState::Party);

        let mut strict = PartyEngine::new(
            PartyConfig {
                fail_open: false,
                ..PartyConfig::default()
            },
            Voice::Sam,
        );
        click(&mut strict, 0);
        reply(&mut strict, WebhookOutcome::Failed, true);
        assert_eq!(strict.state(), AppState::Ready);
    }

    #[test]
    fn double_click_ends_party() {
        let mut engine = engine();
        click(&mut engine, 0);
        reply(&mut engine, WebhookOutcome::StayActive, true);

        let effects = double_click(&mut engine, 5_000);

        assert_eq!(engine.state(), AppState::Ready);
        assert_eq!(effects.first(), Some(&Effect::ClearAnimation));
        assert!(effects.contains(&Effect::Say(FAREWELL)));
    }

    #[test]
    fn party_times_out_after_four_hours() {
        let mut engine = engine();
        click(&mut engine, 0);
        reply(&mut engine, WebhookOutcome::StayActive, true);

        assert!(engine.tick(14_399_999).is_empty());
        let effects = engine.tick(14_400_000);
        assert_eq!(engine.state(), AppState::Ready);
        assert!(effects.contains(&Effect::Say(PARTY_OVER)));
    }

    #[test]
    fn wait_click_speaks_without_resetting_timeout() {
        let mut engine = engine();
        click(&mut engine, 0);
        engine.handle(
            Event::Webhook(WebhookReport {
                outcome: WebhookOutcome::Deferred,
                delivered: true,
                test: false,
            }),
            0,
        );

        let effects = click(&mut engine, 200_000);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::Say(phrase) if WAIT_PHRASES.contains(&phrase)));
        assert_eq!(engine.state(), AppState::Wait);

        assert!(engine.tick(299_999).is_empty());
        engine.tick(300_000);
        assert_eq!(engine.state(), AppState::Ready);
    }

    #[test]
    fn wait_double_click_returns_to_ready() {
        let mut engine = engine();
        click(&mut engine, 0);
        reply(&mut engine, WebhookOutcome::Deferred, true);

        let effects = double_click(&mut engine, 2_000);
        assert_eq!(engine.state(), AppState::Ready);
        assert!(effects.contains(&Effect::Say(IMPATIENT)));
    }

    #[test]
    fn link_loss_is_ignored_during_party() {
        let mut engine = engine();
        click(&mut engine, 0);

        let effects = engine.handle(Event::Link(LinkEvent::Lost(ErrorCode::NoWifi)), 20_000);
        assert!(effects.is_empty());
        assert_eq!(engine.state(), AppState::Party);
    }

    #[test]
    fn repeated_link_loss_with_same_code_is_idempotent() {
        let mut engine = engine();
        let first = engine.handle(Event::Link(LinkEvent::Lost(ErrorCode::NoWifi)), 10_000);
        assert_eq!(
            first,
            vec![Effect::ClearAnimation, Effect::Enqueue(Playlist::ErrorBlink)]
        );

        assert!(engine
            .handle(Event::Link(LinkEvent::Lost(ErrorCode::NoWifi)), 12_000)
            .is_empty());
        assert_eq!(engine.entered_at_ms(), 10_000);
    }

    #[test]
    fn changed_error_code_restarts_animation_but_not_clock() {
        let mut engine = engine();
        engine.boot_completed(false, 0);
        assert_eq!(engine.error_code(), Some(ErrorCode::NoNetworkAtBoot));

        let effects = engine.handle(Event::Link(LinkEvent::Lost(ErrorCode::NoWifi)), 10_000);
        assert_eq!(
            effects,
            vec![Effect::ClearAnimation, Effect::Enqueue(Playlist::ErrorBlink)]
        );
        assert_eq!(engine.error_code(), Some(ErrorCode::NoWifi));
        assert_eq!(engine.entered_at_ms(), 0);
    }

    #[test]
    fn error_recovers_then_degrades_to_standby() {
        let mut engine = engine();
        engine.handle(Event::Link(LinkEvent::Lost(ErrorCode::NoWifi)), 0);
        engine.handle(Event::Link(LinkEvent::Restored), 4_000);
        assert_eq!(engine.state(), AppState::Ready);
        assert_eq!(engine.error_code(), None);

        engine.handle(Event::Link(LinkEvent::Lost(ErrorCode::NoWifi)), 10_000);
        assert!(engine.tick(1_809_999).is_empty());
        assert_eq!(engine.tick(1_810_000), vec![Effect::ClearAnimation]);
        assert_eq!(engine.state(), AppState::Standby);

        // Standby ignores everything except a click, which restarts.
        assert!(engine
            .handle(Event::Link(LinkEvent::Restored), 1_820_000)
            .is_empty());
        assert_eq!(click(&mut engine, 1_830_000), vec![Effect::Restart]);
    }

    #[test]
    fn settings_menu_cycles_and_runs_options() {
        let mut engine = engine();
        let effects = double_click(&mut engine, 0);
        assert_eq!(engine.state(), AppState::Settings);
        assert_eq!(effects, vec![Effect::PauseAnimation, Effect::Say(SETTINGS)]);

        assert_eq!(click(&mut engine, 10), vec![Effect::Say("Voice.")]);
        assert_eq!(
            double_click(&mut engine, 20),
            vec![Effect::SetVoice(Voice::Elf), Effect::Say(VOICE_CHANGED)]
        );

        click(&mut engine, 30);
        assert_eq!(engine.settings_option(), SettingsOption::Ip);
        assert_eq!(double_click(&mut engine, 40), vec![Effect::AnnounceIp]);

        click(&mut engine, 50);
        double_click(&mut engine, 60);
        assert!(engine.is_test_armed());

        click(&mut engine, 70);
        assert_eq!(engine.settings_option(), SettingsOption::Exit);
        assert_eq!(
            double_click(&mut engine, 80),
            vec![Effect::Say(SETTINGS_EXIT), Effect::ResumeAnimation]
        );
        assert_eq!(engine.state(), AppState::Ready);
    }

    #[test]
    fn settings_exit_returns_to_error() {
        let mut engine = engine();
        engine.handle(Event::Link(LinkEvent::Lost(ErrorCode::NoWifi)), 0);
        double_click(&mut engine, 100);
        assert_eq!(engine.previous_state(), Some(AppState::Error));

        double_click(&mut engine, 200);
        assert_eq!(engine.state(), AppState::Error);
    }

    #[test]
    fn armed_test_call_stays_in_ready() {
        let mut engine = engine();
        double_click(&mut engine, 0);
        for _ in 0..3 {
            click(&mut engine, 10);
        }
        double_click(&mut engine, 20);
        click(&mut engine, 30);
        double_click(&mut engine, 40);
        assert_eq!(engine.state(), AppState::Ready);

        let effects = click(&mut engine, 100);
        assert_eq!(effects.last(), Some(&Effect::CallWebhook { test: true }));
        assert!(!engine.is_test_armed());
        assert_eq!(engine.state(), AppState::Ready);

        let effects = engine.handle(
            Event::Webhook(WebhookReport {
                outcome: WebhookOutcome::Failed,
                delivered: false,
                test: true,
            }),
            200,
        );
        assert_eq!(effects, vec![Effect::Say(TEST_FAILED)]);

        // The flag was one-shot.
        assert_eq!(
            click(&mut engine, 300).last(),
            Some(&Effect::CallWebhook { test: false })
        );
    }

    #[test]
    fn long_press_feedback_pauses_and_resumes_animation() {
        let mut engine = engine();
        let start = engine.handle(Event::Gesture(GestureEvent::LongPressStart), 0);
        assert_eq!(
            start,
            vec![Effect::PauseAnimation, Effect::ShowMask(&CENTER_DOT)]
        );
        assert_eq!(
            engine.handle(Event::Gesture(GestureEvent::LongPressStage(2)), 1_000),
            vec![Effect::ShowMask(&STAGE_2)]
        );

        let end = engine.handle(
            Event::Gesture(GestureEvent::LongPressEnd { reset: false }),
            1_500,
        );
        assert_eq!(end, vec![Effect::ClearLeds, Effect::ResumeAnimation]);
    }

    #[test]
    fn long_press_to_stage_four_restarts() {
        let mut engine = engine();
        engine.handle(Event::Gesture(GestureEvent::LongPressStart), 0);
        let effects = engine.handle(
            Event::Gesture(GestureEvent::LongPressEnd { reset: true }),
            3_200,
        );

        assert_eq!(effects, vec![Effect::ClearLeds, Effect::Restart]);
    }

    #[test]
    fn error_during_long_press_keeps_animation_paused() {
        let mut engine = engine();
        engine.handle(Event::Gesture(GestureEvent::LongPressStart), 0);

        let effects = engine.handle(Event::Link(LinkEvent::Lost(ErrorCode::NoWifi)), 500);
        assert_eq!(
            effects,
            vec![
                Effect::ClearAnimation,
                Effect::Enqueue(Playlist::ErrorBlink),
                Effect::PauseAnimation,
            ]
        );
    }
}

//! One control-loop iteration per `tick`, in fixed order: gesture,
//! animation, network poll, timeouts. The engine decides; this type owns the
//! drivers and carries the decisions out.

use std::{collections::VecDeque, net::Ipv4Addr};

use crate::{
    animation::AnimationScheduler,
    app::{Effect, Event, PartyEngine},
    button::ButtonEdge,
    config::RuntimeConfig,
    drivers::{Clock, Devices, LedStrip, Link, Platform, Speech},
    gesture::GestureRecognizer,
    led::Procedure,
    log_buffer::LogBuffer,
    monitor::NetworkMonitor,
    types::AppState,
    webhook::WebhookClient,
};

/// Requests the front-end must carry out itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Restart,
}

pub struct Controller<P: Platform> {
    devices: Devices<P>,
    engine: PartyEngine,
    gestures: GestureRecognizer,
    animation: AnimationScheduler,
    monitor: NetworkMonitor,
    webhook: WebhookClient,
    log: LogBuffer,
}

impl<P: Platform> Controller<P> {
    pub fn new(mut config: RuntimeConfig, mut devices: Devices<P>) -> Self {
        config.sanitize();
        let now_ms = devices.clock.now_ms();
        devices.speech.set_voice(config.voice);

        Self {
            gestures: GestureRecognizer::new(config.party.long_press_stage_ms),
            monitor: NetworkMonitor::new(&config.party, now_ms),
            engine: PartyEngine::new(config.party, config.voice),
            animation: AnimationScheduler::new(),
            webhook: WebhookClient::new(config.webhook),
            log: LogBuffer::new(),
            devices,
        }
    }

    pub fn state(&self) -> AppState {
        self.engine.state()
    }

    pub fn engine(&self) -> &PartyEngine {
        &self.engine
    }

    pub fn animation(&self) -> &AnimationScheduler {
        &self.animation
    }

    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    pub fn devices(&self) -> &Devices<P> {
        &self.devices
    }

    pub fn into_devices(self) -> Devices<P> {
        self.devices
    }

    /// Waits for the link, radiating between checks, then settles into READY
    /// or ERROR.
    pub fn boot(&mut self) -> Option<DeviceCommand> {
        self.log.trace("Booting");
        let checks = self.engine.config().boot_link_checks;
        let radiate = Procedure::Radiate {
            duration_ms: self.engine.config().boot_check_animation_ms,
        };

        let mut connected = false;
        for attempt in 1..=checks {
            if self.devices.link.is_connected() {
                connected = true;
                break;
            }
            log::debug!("link check {attempt}/{checks}: down");
            radiate.run(&mut self.devices.led, &mut self.devices.clock);
        }

        let now_ms = self.devices.clock.now_ms();
        if connected {
            self.monitor.mark_connected(now_ms);
            match self.devices.link.local_ip() {
                Some(ip) => self.log.trace(format!("Connected, IP {ip}")),
                None => self.log.trace("Connected"),
            }
        } else {
            self.log.error(format!("No network after {checks} checks"));
        }

        let before = self.engine.state();
        let effects = self.engine.boot_completed(connected, now_ms);
        self.log_transition(before);
        self.apply(effects)
    }

    /// Runs one loop iteration with the button driver's edge for this tick.
    pub fn tick(&mut self, edge: Option<ButtonEdge>) -> Option<DeviceCommand> {
        let now_ms = self.devices.clock.now_ms();
        if let Some(gesture) = self.gestures.update(edge, now_ms) {
            if let Some(command) = self.dispatch(Event::Gesture(gesture)) {
                return Some(command);
            }
        }

        if self.engine.state() != AppState::Standby {
            let now_ms = self.devices.clock.now_ms();
            self.animation
                .tick(now_ms, &mut self.devices.led, &mut self.devices.clock);

            let now_ms = self.devices.clock.now_ms();
            if self.monitor.is_due(now_ms) {
                let link_up = self.devices.link.is_connected();
                if let Some(event) = self.monitor.poll(now_ms, link_up) {
                    if let Some(command) = self.dispatch(Event::Link(event)) {
                        return Some(command);
                    }
                }
            }
        }

        let now_ms = self.devices.clock.now_ms();
        let before = self.engine.state();
        let effects = self.engine.tick(now_ms);
        self.log_transition(before);
        self.apply(effects)
    }

    fn dispatch(&mut self, event: Event) -> Option<DeviceCommand> {
        let now_ms = self.devices.clock.now_ms();
        let before = self.engine.state();
        let effects = self.engine.handle(event, now_ms);
        self.log_transition(before);
        self.apply(effects)
    }

    fn apply(&mut self, effects: Vec<Effect>) -> Option<DeviceCommand> {
        let mut pending = VecDeque::from(effects);

        while let Some(effect) = pending.pop_front() {
            let now_ms = self.devices.clock.now_ms();
            match effect {
                Effect::Say(text) => self.devices.speech.say(text),
                Effect::SetVoice(voice) => {
                    self.log.trace(format!("Voice {}", voice.as_str()));
                    self.devices.speech.set_voice(voice);
                }
                Effect::AnnounceIp => {
                    let phrase = spoken_ip(self.devices.link.local_ip());
                    self.devices.speech.say(&phrase);
                }
                Effect::ShowMask(mask) => {
                    self.devices.led.set_pixels(mask, false);
                    self.devices.led.show();
                }
                Effect::ClearLeds => {
                    self.devices.led.clear();
                    self.devices.led.show();
                }
                Effect::Play(procedure) => {
                    procedure.run(&mut self.devices.led, &mut self.devices.clock);
                }
                Effect::Delay(ms) => self.devices.clock.delay_ms(ms),
                Effect::PauseAnimation => self.animation.pause(now_ms),
                Effect::ResumeAnimation => self.animation.resume(now_ms, &mut self.devices.led),
                Effect::ClearAnimation => self.animation.clear(&mut self.devices.led),
                Effect::Enqueue(playlist) => self.animation.enqueue_playlist(playlist, now_ms),
                Effect::CallWebhook { test } => {
                    let report = self.webhook.call(
                        &mut self.devices.transport,
                        &mut self.devices.clock,
                        &mut self.log,
                        test,
                    );
                    let now_ms = self.devices.clock.now_ms();
                    let before = self.engine.state();
                    let follow_up = self.engine.handle(Event::Webhook(report), now_ms);
                    self.log_transition(before);
                    pending.extend(follow_up);
                }
                Effect::Restart => {
                    self.log.trace("Restart requested");
                    return Some(DeviceCommand::Restart);
                }
            }
        }

        None
    }

    fn log_transition(&mut self, before: AppState) {
        let after = self.engine.state();
        if before == after {
            return;
        }
        match (after, self.engine.error_code()) {
            (AppState::Error, Some(code)) => self.log.error(format!(
                "State {} -> {} ({})",
                before.as_str(),
                after.as_str(),
                code.as_str()
            )),
            _ => self
                .log
                .trace(format!("State {} -> {}", before.as_str(), after.as_str())),
        }
    }
}

/// "192 dot 168 dot 1 dot 42", read digit groups and all.
fn spoken_ip(ip: Option<Ipv4Addr>) -> String {
    match ip {
        Some(ip) => ip
            .octets()
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(" dot "),
        None => "No address".to_string(),
    }
}

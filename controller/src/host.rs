use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use tokio::{
    io::AsyncBufReadExt,
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tracing::{debug, info, warn};

use partybutton_common::{
    ButtonDecoder, ButtonEdge, Clock, Controller, DeviceCommand, Devices, LedMask, LedStrip, Link,
    Platform, RuntimeConfig, SecureTransport, Speech, TransportError, Voice, PIXEL_COUNT,
};

use crate::clock::MonotonicClock;

const TICK_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_CONFIG_PATH: &str = "partybutton.json";
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_MOCK_REPLY: &str = "PARTY";

#[derive(Clone)]
struct AppState {
    log_snapshot: Arc<Mutex<String>>,
    mock_reply: Arc<Mutex<String>>,
}

/// Simulated button activity forwarded to the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonInput {
    Click,
    DoubleClick,
    Press,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Button(ButtonInput),
    Wifi(bool),
    Help,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config().await;
    let http_port = config.network.http_port;
    info!(
        "webhook target `{}:{}{}`",
        config.webhook.host, config.webhook.port, config.webhook.resource
    );

    let app_state = AppState {
        log_snapshot: Arc::new(Mutex::new(String::new())),
        mock_reply: Arc::new(Mutex::new(
            std::env::var("PARTY_WEBHOOK_REPLY").unwrap_or_else(|_| DEFAULT_MOCK_REPLY.to_string()),
        )),
    };

    let link_up = Arc::new(AtomicBool::new(true));
    let (buttons_tx, buttons_rx) = mpsc::unbounded_channel();

    spawn_control_loop(
        config,
        link_up.clone(),
        buttons_rx,
        app_state.log_snapshot.clone(),
    )?;
    spawn_stdin_loop(buttons_tx, link_up);

    let app = Router::new()
        .route("/", get(handle_get_log))
        .route("/trigger/{*event}", get(handle_mock_webhook))
        .route("/mock/reply", put(handle_put_mock_reply))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind diagnostic server at {addr}"))?;

    info!("diagnostic log on http://{addr}/");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn load_config() -> RuntimeConfig {
    let path = std::env::var("PARTY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = match read_config(&path).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            info!("no config at {}, using host defaults", path.display());
            host_defaults()
        }
        Err(err) => {
            warn!("failed to load config from {}: {err:#}", path.display());
            host_defaults()
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();
    if let Err(err) = config.webhook.validate() {
        warn!("webhook config rejected, calls will fail: {err}");
    }
    config
}

async fn read_config(path: &Path) -> anyhow::Result<Option<RuntimeConfig>> {
    match tokio::fs::read(path).await {
        Ok(raw) => {
            let config = serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("invalid config JSON in {}", path.display()))?;
            Ok(Some(config))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Points the webhook at the built-in mock so a bare `cargo run` works offline.
fn host_defaults() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.network.http_port = DEFAULT_HTTP_PORT;
    config.webhook.host = "127.0.0.1".to_string();
    config.webhook.port = DEFAULT_HTTP_PORT;
    config.webhook.resource = "/trigger/party".to_string();
    config.webhook.test_resource = "/trigger/party_test".to_string();
    config
}

fn apply_env_overrides(config: &mut RuntimeConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("WEBHOOK_HOST") {
        config.webhook.host = host;
    }
    if let Some(port) = var("WEBHOOK_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.webhook.port = port;
    }
    if let Some(resource) = var("WEBHOOK_RESOURCE") {
        config.webhook.resource = resource;
    }
    if let Some(port) = var("HTTP_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.network.http_port = port;
    }
}

fn spawn_control_loop(
    config: RuntimeConfig,
    link_up: Arc<AtomicBool>,
    buttons: mpsc::UnboundedReceiver<ButtonInput>,
    log_snapshot: Arc<Mutex<String>>,
) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("control-loop".into())
        .spawn(move || control_loop(config, link_up, buttons, log_snapshot))
        .context("failed to spawn control loop thread")?;
    Ok(())
}

// The core blocks inside micro-programs and webhook calls, so it gets its own
// OS thread instead of a tokio task.
fn control_loop(
    config: RuntimeConfig,
    link_up: Arc<AtomicBool>,
    mut buttons: mpsc::UnboundedReceiver<ButtonInput>,
    log_snapshot: Arc<Mutex<String>>,
) {
    let devices = Devices::<HostPlatform> {
        led: ConsoleStrip::default(),
        speech: ConsoleSpeech::default(),
        link: SimulatedLink { up: link_up },
        transport: TcpTransport::default(),
        clock: MonotonicClock::new(),
    };

    let mut controller = Controller::new(config.clone(), devices);
    let mut decoder = ButtonDecoder::new();
    let mut pressed = false;
    let mut published_revision = None;
    let mut command = controller.boot();

    loop {
        if let Some(DeviceCommand::Restart) = command {
            warn!("restart requested, re-initialising controller");
            controller = Controller::new(config.clone(), controller.into_devices());
            decoder = ButtonDecoder::new();
            pressed = false;
            published_revision = None;
            command = controller.boot();
            continue;
        }

        // A closed channel just means no more input.
        let injected = buttons
            .try_recv()
            .ok()
            .and_then(|input| apply_button_input(input, &mut pressed));

        let now_ms = controller.devices().clock.now_ms();
        let decoded = decoder.update(pressed, now_ms);
        command = controller.tick(injected.or(decoded));

        let revision = controller.log().revision();
        if published_revision != Some(revision) {
            *log_snapshot.blocking_lock() = controller.log().snapshot();
            published_revision = Some(revision);
        }

        thread::sleep(TICK_INTERVAL);
    }
}

/// Clicks bypass the decoder; press and release drive the raw pin level.
fn apply_button_input(input: ButtonInput, pressed: &mut bool) -> Option<ButtonEdge> {
    match input {
        ButtonInput::Click => Some(ButtonEdge::Click),
        ButtonInput::DoubleClick => Some(ButtonEdge::DoubleClick),
        ButtonInput::Press => {
            *pressed = true;
            None
        }
        ButtonInput::Release => {
            *pressed = false;
            None
        }
    }
}

fn spawn_stdin_loop(buttons: mpsc::UnboundedSender<ButtonInput>, link_up: Arc<AtomicBool>) {
    tokio::spawn(async move {
        print_help();
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("stdin closed, button input disabled");
                    break;
                }
                Err(err) => {
                    warn!("stdin read failed: {err}");
                    break;
                }
            };

            match parse_command(&line) {
                Some(Command::Wifi(up)) => {
                    link_up.store(up, Ordering::Relaxed);
                    info!("simulated wifi {}", if up { "up" } else { "down" });
                }
                Some(Command::Help) => print_help(),
                Some(Command::Button(input)) => {
                    if buttons.send(input).is_err() {
                        warn!("control loop is gone");
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("unknown command {line:?}, try `help`"),
            }
        }
    });
}

fn print_help() {
    info!("commands: click | double | press | release | wifi on | wifi off | help");
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match (words.next()?, words.next()) {
        ("click" | "c", None) => Command::Button(ButtonInput::Click),
        ("double" | "d", None) => Command::Button(ButtonInput::DoubleClick),
        ("press" | "p", None) => Command::Button(ButtonInput::Press),
        ("release" | "r", None) => Command::Button(ButtonInput::Release),
        ("wifi", Some("on")) => Command::Wifi(true),
        ("wifi", Some("off")) => Command::Wifi(false),
        ("help" | "?", None) => Command::Help,
        _ => return None,
    };
    words.next().is_none().then_some(command)
}

async fn handle_get_log(State(state): State<AppState>) -> impl IntoResponse {
    state.log_snapshot.lock().await.clone()
}

async fn handle_mock_webhook(
    State(state): State<AppState>,
    UrlPath(event): UrlPath<String>,
) -> impl IntoResponse {
    let reply = state.mock_reply.lock().await.clone();
    info!("mock webhook `{event}` answering {reply:?}");
    reply
}

async fn handle_put_mock_reply(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let reply = body.trim().to_string();
    info!("mock webhook reply set to {reply:?}");
    *state.mock_reply.lock().await = reply;
    StatusCode::NO_CONTENT
}

struct HostPlatform;

impl Platform for HostPlatform {
    type Led = ConsoleStrip;
    type Speech = ConsoleSpeech;
    type Link = SimulatedLink;
    type Transport = TcpTransport;
    type Clock = MonotonicClock;
}

#[derive(Default)]
struct ConsoleStrip {
    staged: LedMask,
    shown: Option<LedMask>,
}

impl LedStrip for ConsoleStrip {
    fn set_pixels(&mut self, mask: &LedMask, additive: bool) {
        self.staged = if additive {
            self.staged.union(*mask)
        } else {
            *mask
        };
    }

    fn clear(&mut self) {
        self.staged = LedMask::NONE;
    }

    fn show(&mut self) {
        if self.shown == Some(self.staged) {
            return;
        }
        self.shown = Some(self.staged);
        debug!(target: "led", "{}", render_mask(&self.staged));
    }
}

/// `[o|oo......|............]`: centre, inner ring, outer ring.
fn render_mask(mask: &LedMask) -> String {
    let mut out = String::with_capacity(PIXEL_COUNT + 4);
    out.push('[');
    for index in 0..PIXEL_COUNT {
        if index == 1 || index == 9 {
            out.push('|');
        }
        out.push(if mask.is_lit(index) { 'o' } else { '.' });
    }
    out.push(']');
    out
}

#[derive(Default)]
struct ConsoleSpeech {
    voice: Voice,
}

impl Speech for ConsoleSpeech {
    fn say(&mut self, text: &str) {
        info!(voice = self.voice.as_str(), "say: {text}");
    }

    fn set_voice(&mut self, voice: Voice) {
        self.voice = voice;
    }
}

struct SimulatedLink {
    up: Arc<AtomicBool>,
}

impl Link for SimulatedLink {
    fn is_connected(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.is_connected().then_some(Ipv4Addr::LOCALHOST)
    }
}

/// Plain TCP stand-in for the device's TLS client.
#[derive(Default)]
struct TcpTransport {
    reader: Option<BufReader<TcpStream>>,
    eof: bool,
    timeout_ms: u64,
}

impl SecureTransport for TcpTransport {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        fingerprint: &str,
        timeout_ms: u64,
    ) -> Result<(), TransportError> {
        self.close();
        if !fingerprint.is_empty() {
            debug!("plain TCP transport, not checking fingerprint {fingerprint}");
        }

        let timeout = Duration::from_millis(timeout_ms.max(1));
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|err| TransportError::Io(err.to_string()))?;

        let mut last_err = TransportError::ConnectFailed {
            host: host.to_string(),
            port,
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(timeout))
                        .map_err(|err| TransportError::Io(err.to_string()))?;
                    self.reader = Some(BufReader::new(stream));
                    self.eof = false;
                    self.timeout_ms = timeout_ms;
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::TimedOut => {
                    last_err = TransportError::Timeout(timeout_ms);
                }
                Err(err) => debug!("connect to {addr} failed: {err}"),
            }
        }
        Err(last_err)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let reader = self.reader.as_mut().ok_or(TransportError::Closed)?;
        let stream = reader.get_mut();
        stream
            .write_all(bytes)
            .and_then(|()| stream.flush())
            .map_err(|err| TransportError::Io(err.to_string()))
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let reader = self.reader.as_mut().ok_or(TransportError::Closed)?;
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                self.eof = true;
                Err(TransportError::Closed)
            }
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Ok(line)
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(TransportError::Timeout(self.timeout_ms))
            }
            Err(err) => Err(TransportError::Io(err.to_string())),
        }
    }

    fn is_connected(&self) -> bool {
        self.reader.is_some() && !self.eof
    }

    fn available(&self) -> bool {
        self.reader
            .as_ref()
            .is_some_and(|reader| !reader.buffer().is_empty())
    }

    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.get_ref().shutdown(Shutdown::Both);
        }
        self.eof = false;
    }
}

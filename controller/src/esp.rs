use core::convert::TryInto;
use std::{
    net::Ipv4Addr,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Input, PinDriver, Pull};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals, rmt::CHANNEL0},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    tls::{Config as TlsConfig, EspTls, InternalSocket},
    wifi::EspWifi,
};
use log::{debug, info, warn};

use partybutton_common::{
    ButtonDecoder, ButtonEdge, Clock, Controller, DeviceCommand, Devices, Link, NetworkConfig,
    Platform, RuntimeConfig, SecureTransport, Speech, TransportError, Voice,
};

use crate::{clock::MonotonicClock, led_strip::RingStrip};

const LED_PIN: i32 = 5;
const BUTTON_PIN: i32 = 4;
// Must outlast the longest blocking webhook call (attempts x connect timeout).
const WATCHDOG_TIMEOUT_SEC: u32 = 60;
const WIFI_RECONNECT_INTERVAL_MS: u64 = 10_000;
const TICK_INTERVAL_MS: u64 = 10;
const TLS_READ_CHUNK: usize = 512;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let config = build_config();

    info!(
        "config: ssid=`{}`, webhook=`{}:{}{}`",
        config.network.wifi_ssid,
        config.webhook.host,
        config.webhook.port,
        config.webhook.resource,
    );

    let Peripherals { modem, rmt, .. } = Peripherals::take()?;

    let wifi = start_wifi(modem, sys_loop, nvs_partition, &config.network)
        .context("wifi startup failed")?;
    disable_wifi_power_save();

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;

    let log_snapshot = Arc::new(Mutex::new(String::new()));
    let server = match create_http_server(config.network.http_port, log_snapshot.clone()) {
        Ok(server) => Some(server),
        Err(err) => {
            warn!("diagnostic server unavailable: {err:#}");
            None
        }
    };

    spawn_control_loop(config, rmt.channel0, log_snapshot);

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn build_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();

    if let Some(ssid) = option_env!("WIFI_SSID") {
        config.network.wifi_ssid = ssid.to_string();
    }
    if let Some(pass) = option_env!("WIFI_PASS") {
        config.network.wifi_pass = pass.to_string();
    }
    if let Some(host) = option_env!("WEBHOOK_HOST") {
        config.webhook.host = host.to_string();
    }
    if let Some(resource) = option_env!("WEBHOOK_RESOURCE") {
        config.webhook.resource = resource.to_string();
    }
    if let Some(fingerprint) = option_env!("WEBHOOK_FINGERPRINT") {
        config.webhook.fingerprint = fingerprint.to_string();
    }

    config.sanitize();
    if let Err(err) = config.webhook.validate() {
        warn!("webhook config rejected, calls will fail: {err}");
    }
    config
}

fn spawn_control_loop(
    config: RuntimeConfig,
    led_channel: CHANNEL0,
    log_snapshot: Arc<Mutex<String>>,
) {
    thread::Builder::new()
        .name("control-loop".into())
        .stack_size(24 * 1024)
        .spawn(move || {
            if let Err(err) = add_current_task_to_watchdog() {
                warn!("failed to register control loop with watchdog: {err:#}");
            }

            let led = match unsafe { RingStrip::new(led_channel, AnyOutputPin::new(LED_PIN)) } {
                Ok(strip) => {
                    info!("LED ring initialized on RMT channel0 / GPIO{LED_PIN}");
                    strip
                }
                Err(err) => {
                    warn!("failed to initialize LED ring, running dark: {err:#}");
                    RingStrip::disabled()
                }
            };
            let mut button = match GpioButton::new(BUTTON_PIN) {
                Ok(button) => Some(button),
                Err(err) => {
                    warn!("button unavailable: {err:#}");
                    None
                }
            };

            let devices = Devices::<EspPlatform> {
                led,
                speech: LogSpeech::default(),
                link: StationLink,
                transport: TlsTransport::default(),
                clock: MonotonicClock::new(),
            };
            let mut controller = Controller::new(config, devices);
            let mut last_reconnect_ms = None;
            let mut published_revision = None;

            if let Some(DeviceCommand::Restart) = controller.boot() {
                restart_device();
            }

            loop {
                feed_watchdog();
                let now_ms = controller.devices().clock.now_ms();
                reconnect_wifi(now_ms, &mut last_reconnect_ms);

                let edge = button.as_mut().and_then(|button| button.poll(now_ms));
                if let Some(DeviceCommand::Restart) = controller.tick(edge) {
                    restart_device();
                }

                let revision = controller.log().revision();
                if published_revision != Some(revision) {
                    *log_snapshot.lock().unwrap_or_else(PoisonError::into_inner) =
                        controller.log().snapshot();
                    published_revision = Some(revision);
                }

                thread::sleep(Duration::from_millis(TICK_INTERVAL_MS));
            }
        })
        .expect("failed to spawn control loop thread");
}

fn restart_device() {
    warn!("restarting device");
    thread::sleep(Duration::from_millis(100));
    unsafe { esp_idf_svc::sys::esp_restart() };
}

fn create_http_server(
    port: u16,
    log_snapshot: Arc<Mutex<String>>,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        stack_size: 8 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
        let body = log_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        req.into_response(
            200,
            Some("OK"),
            &[("Content-Type", "text/plain; charset=utf-8")],
        )?
        .write_all(body.as_bytes())?;
        Ok(())
    })?;

    info!("diagnostic log served on port {port}");
    Ok(server)
}

/// Configures the station and requests a join without waiting for it; the
/// controller's boot check polls the link while the radiate animation runs.
fn start_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut wifi = EspWifi::new(modem, sys_loop, Some(nvs_partition))?;

    if network.wifi_ssid.trim().is_empty() {
        warn!("no wifi credentials compiled in; the boot check will report the missing network");
        return Ok(wifi);
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    if let Err(err) = wifi.connect() {
        warn!("wifi join request failed, retrying in the background: {err:#}");
    }
    info!("wifi started, joining `{}`", network.wifi_ssid);
    Ok(wifi)
}

fn reconnect_wifi(now_ms: u64, last_attempt_ms: &mut Option<u64>) {
    if is_wifi_station_connected() {
        return;
    }
    if last_attempt_ms.is_some_and(|last| now_ms.saturating_sub(last) < WIFI_RECONNECT_INTERVAL_MS)
    {
        return;
    }
    *last_attempt_ms = Some(now_ms);

    let rc = unsafe { esp_idf_svc::sys::esp_wifi_connect() };
    if rc != esp_idf_svc::sys::ESP_OK {
        debug!("esp_wifi_connect failed: esp_err_t={rc}");
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}

fn station_ip() -> Option<Ipv4Addr> {
    let netif =
        unsafe { esp_idf_svc::sys::esp_netif_get_handle_from_ifkey(c"WIFI_STA_DEF".as_ptr()) };
    if netif.is_null() {
        return None;
    }

    let mut ip_info = esp_idf_svc::sys::esp_netif_ip_info_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_netif_get_ip_info(netif, &mut ip_info) };
    if rc != esp_idf_svc::sys::ESP_OK || ip_info.ip.addr == 0 {
        return None;
    }
    // lwIP keeps the address in network byte order.
    Some(Ipv4Addr::from(ip_info.ip.addr.to_le_bytes()))
}

struct EspPlatform;

impl Platform for EspPlatform {
    type Led = RingStrip;
    type Speech = LogSpeech;
    type Link = StationLink;
    type Transport = TlsTransport;
    type Clock = MonotonicClock;
}

/// Active-low push button with the internal pull-up enabled.
struct GpioButton {
    pin: PinDriver<'static, AnyIOPin, Input>,
    decoder: ButtonDecoder,
}

impl GpioButton {
    fn new(pin: i32) -> anyhow::Result<Self> {
        let mut driver = unsafe { PinDriver::input(AnyIOPin::new(pin)) }
            .with_context(|| format!("failed to claim button GPIO{pin}"))?;
        driver
            .set_pull(Pull::Up)
            .context("failed to enable button pull-up")?;

        Ok(Self {
            pin: driver,
            decoder: ButtonDecoder::new(),
        })
    }

    fn poll(&mut self, now_ms: u64) -> Option<ButtonEdge> {
        self.decoder.update(self.pin.is_low(), now_ms)
    }
}

/// The board has no speech synthesizer; phrases go to the serial log.
#[derive(Default)]
struct LogSpeech {
    voice: Voice,
}

impl Speech for LogSpeech {
    fn say(&mut self, text: &str) {
        info!("say ({}): {text}", self.voice.as_str());
    }

    fn set_voice(&mut self, voice: Voice) {
        self.voice = voice;
    }
}

struct StationLink;

impl Link for StationLink {
    // Associated is not enough: the webhook needs DHCP to have finished.
    fn is_connected(&self) -> bool {
        is_wifi_station_connected() && station_ip().is_some()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        station_ip()
    }
}

/// TLS client validated against the IDF certificate bundle.
#[derive(Default)]
struct TlsTransport {
    tls: Option<EspTls<InternalSocket>>,
    pending: Vec<u8>,
    eof: bool,
}

impl SecureTransport for TlsTransport {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        fingerprint: &str,
        timeout_ms: u64,
    ) -> Result<(), TransportError> {
        self.close();
        if !fingerprint.is_empty() {
            debug!("server pinned as {fingerprint}; verifying through the CA bundle");
        }

        let mut tls = EspTls::new().map_err(|err| TransportError::Io(err.to_string()))?;
        let config = TlsConfig {
            common_name: Some(host),
            timeout_ms: timeout_ms.try_into().unwrap_or(u32::MAX),
            use_crt_bundle_attach: true,
            ..Default::default()
        };

        tls.connect(host, port, &config).map_err(|err| {
            debug!("TLS connect to {host}:{port} failed: {err}");
            TransportError::ConnectFailed {
                host: host.to_string(),
                port,
            }
        })?;

        self.tls = Some(tls);
        self.eof = false;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let tls = self.tls.as_mut().ok_or(TransportError::Closed)?;
        tls.write_all(bytes)
            .map_err(|err| TransportError::Io(err.to_string()))
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        loop {
            if let Some(end) = self.pending.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=end).collect();
                return Ok(String::from_utf8_lossy(&line[..end]).into_owned());
            }

            if self.eof {
                if self.pending.is_empty() {
                    return Err(TransportError::Closed);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(String::from_utf8_lossy(&rest).into_owned());
            }

            let tls = self.tls.as_mut().ok_or(TransportError::Closed)?;
            let mut chunk = [0_u8; TLS_READ_CHUNK];
            match tls.read(&mut chunk) {
                Ok(0) => self.eof = true,
                Ok(read) => self.pending.extend_from_slice(&chunk[..read]),
                Err(err) => {
                    // Servers often drop the session without close_notify.
                    debug!("TLS read ended: {err}");
                    self.eof = true;
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.tls.is_some() && !self.eof
    }

    fn available(&self) -> bool {
        !self.pending.is_empty()
    }

    fn close(&mut self) {
        self.tls = None;
        self.pending.clear();
        self.eof = false;
    }
}

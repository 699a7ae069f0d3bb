//! JunctionRelay node firmware: main entry point.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       Adapters (outer ring)                       │
//! │  NvsAdapter   NetworkManager   EspNowRadio   EspWs   EspMqtt      │
//! │  MdnsAdapter  TcpBackendHttp   EspSystem     UartTransport        │
//! │                                                                   │
//! │  ───────────────────── Port trait boundary ─────────────────────  │
//! │                                                                   │
//! │  core 0: main loop ─▶ ProtocolOrchestrator (Arc<Mutex>) ◀─ HTTP   │
//! │          serial-in ─▶ Inbox                                       │
//! │  core 1: consumers ◀─ sensor queue (30) / config queue (3)        │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartConfig, UartDriver};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::info;

use relaynode::adapters::backend_http::TcpBackendHttp;
use relaynode::adapters::device_id;
use relaynode::adapters::http_server;
use relaynode::adapters::log_sink::{LogDisplaySink, LogStatusSink};
use relaynode::adapters::mdns::MdnsAdapter;
use relaynode::adapters::mqtt_client::EspMqtt;
use relaynode::adapters::nvs::NvsAdapter;
use relaynode::adapters::radio::EspNowRadio;
use relaynode::adapters::serial::{SERIAL_BAUD, UartTransport};
use relaynode::adapters::system::EspSystem;
use relaynode::adapters::time::SystemClock;
use relaynode::adapters::wifi::NetworkManager;
use relaynode::adapters::ws_client::EspWs;
use relaynode::app::ports::Clock;
use relaynode::app::status::ConfigStats;
use relaynode::orchestrator::{Collaborators, MqttClientBox, ProtocolMode, ProtocolOrchestrator};
use relaynode::protocol::consumer;
use relaynode::protocol::ingress::{self, new_inbox};
use relaynode::protocol::queue::{ConfigQueue, SensorQueue};
use relaynode::protocol::router::MessageRouter;

/// Main loop period. Every maintenance interval is a multiple of this.
const LOOP_PERIOD_MS: u64 = 20;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("JunctionRelay node v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let clock = SystemClock::new();

    // ── 2. Identity + storage ─────────────────────────────────
    let identity = device_id::local_identity();
    info!("Device: {} ({})", identity.device_name, identity.mac);
    let storage = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;

    // ── 3. Queues + consumers (core 1) ────────────────────────
    let inbox = new_inbox();
    let sensor_queue = Arc::new(SensorQueue::new("sensor"));
    let config_queue = Arc::new(ConfigQueue::new("config"));
    let config_stats = Arc::new(ConfigStats::new());
    consumer::spawn(
        sensor_queue.clone(),
        config_queue.clone(),
        LogDisplaySink::new(),
        clock,
        config_stats.clone(),
    )?;

    // ── 4. Serial ingress (core 0) ────────────────────────────
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(SERIAL_BAUD)),
    )?;
    ingress::spawn_serial(UartTransport::new(uart), inbox.clone())?;

    // ── 5. Orchestrator ───────────────────────────────────────
    let wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    let mqtt_inbox = inbox.clone();
    let collaborators = Collaborators {
        storage: Box::new(storage),
        network: Box::new(NetworkManager::new(wifi)),
        system: Box::new(EspSystem::new()),
        radio: Box::new(EspNowRadio::new()),
        ws_client: Box::new(EspWs::new()),
        backend_http: Box::new(TcpBackendHttp::new()),
        advertiser: Box::new(MdnsAdapter::new()),
        mqtt_builder: Box::new(move |settings| {
            EspMqtt::start(settings, mqtt_inbox.clone())
                .ok()
                .map(|c| Box::new(c) as MqttClientBox)
        }),
    };

    let router = MessageRouter::new(sensor_queue, config_queue);
    let mut orchestrator =
        ProtocolOrchestrator::new(collaborators, identity, inbox, router, config_stats);
    orchestrator.set_status_sink(Box::new(LogStatusSink::new()));
    let mode = orchestrator.init(clock.now_ms());
    info!("Orchestrator: running in {:?}", mode);

    let orchestrator = Arc::new(Mutex::new(orchestrator));

    // ── 6. HTTP API (network modes and captive portal) ────────
    let _server = if mode.uses_network() || mode == ProtocolMode::CaptivePortal {
        Some(http_server::start(orchestrator.clone(), clock)?)
    } else {
        None
    };

    // ── 7. Main loop ──────────────────────────────────────────
    loop {
        orchestrator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .poll(clock.now_ms());
        std::thread::sleep(Duration::from_millis(LOOP_PERIOD_MS));
    }
}

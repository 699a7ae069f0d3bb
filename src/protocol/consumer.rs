//! Consumer tasks: one per work queue, each handing items to the display
//! subsystem.
//!
//! Both consumers run as futures on a single `edge-executor` thread
//! pinned to the application core. Each awaits its own queue, processes
//! one item synchronously, drops it, and loops.
//!
//! Config items get one extra rule: if the display rejects a layout the
//! consumer routes an empty (home) configuration instead, so the screen
//! never stays on a half-applied layout.

use core::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::{Map, Value};

use super::message::QueueItem;
use super::queue::{ConfigQueue, SensorQueue};
use crate::app::ports::{Clock, DisplaySink, SinkError};
use crate::app::status::ConfigStats;
use crate::drivers::task_pin::{self, Core};

const CONSUMER_PRIORITY: u8 = 1;
const CONSUMER_STACK_KB: usize = 8;

/// What happened to one config item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOutcome {
    Applied,
    FellBackToHome(SinkError),
    /// Even the home layout was rejected.
    Failed(SinkError),
}

/// The layout routed when a config cannot be applied.
pub fn home_config() -> Value {
    Value::Object(Map::new())
}

// ── Sensor consumer ──────────────────────────────────────────

pub struct SensorConsumer<S> {
    queue: Arc<SensorQueue>,
    sink: S,
    processed: u32,
    failed: u32,
}

impl<S: DisplaySink> SensorConsumer<S> {
    pub fn new(queue: Arc<SensorQueue>, sink: S) -> Self {
        Self {
            queue,
            sink,
            processed: 0,
            failed: 0,
        }
    }

    pub fn process(&mut self, item: QueueItem) -> Result<(), SinkError> {
        self.processed += 1;
        self.sink.route_sensor(&item.doc).inspect_err(|e| {
            self.failed += 1;
            warn!("Queue[sensor]: sink rejected item from {}: {}", item.origin, e);
        })
    }

    /// Process everything currently queued without waiting.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while let Some(item) = self.queue.try_pop() {
            let _ = self.process(item);
            n += 1;
        }
        n
    }

    pub fn processed(&self) -> u32 {
        self.processed
    }

    pub fn failed(&self) -> u32 {
        self.failed
    }

    pub async fn run(mut self) {
        info!("Queue[sensor]: consumer running");
        loop {
            let item = self.queue.pop().await;
            let _ = self.process(item);
        }
    }
}

// ── Config consumer ──────────────────────────────────────────

pub struct ConfigConsumer<S, C> {
    queue: Arc<ConfigQueue>,
    sink: S,
    clock: C,
    stats: Arc<ConfigStats>,
}

impl<S: DisplaySink, C: Clock> ConfigConsumer<S, C> {
    pub fn new(queue: Arc<ConfigQueue>, sink: S, clock: C, stats: Arc<ConfigStats>) -> Self {
        Self {
            queue,
            sink,
            clock,
            stats,
        }
    }

    pub fn process(&mut self, item: QueueItem) -> ConfigOutcome {
        match self.sink.route_config(&item.doc) {
            Ok(()) => {
                self.stats.record_applied(self.clock.now_ms());
                debug!(
                    "Queue[config]: applied config #{} from {}",
                    self.stats.count(),
                    item.origin
                );
                ConfigOutcome::Applied
            }
            Err(e) => {
                warn!("Queue[config]: config from {} rejected ({}), routing home", item.origin, e);
                match self.sink.route_config(&home_config()) {
                    Ok(()) => ConfigOutcome::FellBackToHome(e),
                    Err(home_err) => {
                        error!("Queue[config]: home layout rejected too: {}", home_err);
                        ConfigOutcome::Failed(home_err)
                    }
                }
            }
        }
    }

    /// Process everything currently queued without waiting.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while let Some(item) = self.queue.try_pop() {
            self.process(item);
            n += 1;
        }
        n
    }

    pub async fn run(mut self) {
        info!("Queue[config]: consumer running");
        loop {
            let item = self.queue.pop().await;
            self.process(item);
        }
    }
}

impl<T: DisplaySink> DisplaySink for Rc<RefCell<T>> {
    fn route_sensor(&mut self, doc: &Value) -> Result<(), SinkError> {
        self.borrow_mut().route_sensor(doc)
    }

    fn route_config(&mut self, doc: &Value) -> Result<(), SinkError> {
        self.borrow_mut().route_config(doc)
    }
}

// ── Thread spawn ─────────────────────────────────────────────

fn run_consumers<S, C>(
    sensor: Arc<SensorQueue>,
    config: Arc<ConfigQueue>,
    sink: S,
    clock: C,
    stats: Arc<ConfigStats>,
) where
    S: DisplaySink,
    C: Clock,
{
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
    let sink = Rc::new(RefCell::new(sink));

    executor
        .spawn(SensorConsumer::new(sensor, sink.clone()).run())
        .detach();
    executor
        .spawn(ConfigConsumer::new(config, sink, clock, stats).run())
        .detach();

    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

/// Spawn both consumers on one thread pinned to the application core.
pub fn spawn<S, C>(
    sensor: Arc<SensorQueue>,
    config: Arc<ConfigQueue>,
    sink: S,
    clock: C,
    stats: Arc<ConfigStats>,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    S: DisplaySink + Send + 'static,
    C: Clock + Send + 'static,
{
    task_pin::spawn_on_core(
        Core::App,
        CONSUMER_PRIORITY,
        CONSUMER_STACK_KB,
        "consumers\0",
        move || run_consumers(sensor, config, sink, clock, stats),
    )
}

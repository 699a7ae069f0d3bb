//! Bounded work queues between the router and the consumer tasks.
//!
//! ```text
//!  Router ──try_push──▶ ┌──────────────┐ ──pop().await──▶ SensorConsumer
//!                       │ sensor (30)  │
//!                       └──────────────┘
//!  Router ──try_push──▶ ┌──────────────┐ ──pop().await──▶ ConfigConsumer
//!                       │ config (3)   │
//!                       └──────────────┘
//! ```
//!
//! Both queues reject new items when full: queued items are kept and the
//! incoming one is dropped and counted. Pushes never block; each queue has
//! exactly one consumer that awaits the next item.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use serde::Serialize;

use super::message::QueueItem;
use crate::error::QueueError;

pub const SENSOR_QUEUE_CAPACITY: usize = 30;
pub const CONFIG_QUEUE_CAPACITY: usize = 3;

pub type SensorQueue = WorkQueue<QueueItem, SENSOR_QUEUE_CAPACITY>;
pub type ConfigQueue = WorkQueue<QueueItem, CONFIG_QUEUE_CAPACITY>;

/// Depth and counters for the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub depth: usize,
    pub max_size: usize,
    pub accepted: u32,
    pub dropped: u32,
}

/// Bounded FIFO, drop-new on overflow.
pub struct WorkQueue<T, const N: usize> {
    name: &'static str,
    channel: Channel<CriticalSectionRawMutex, T, N>,
    accepted: AtomicU32,
    dropped: AtomicU32,
}

impl<T, const N: usize> WorkQueue<T, N> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            channel: Channel::new(),
            accepted: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue without blocking. On a full queue the item is returned to
    /// the caller's scope and dropped there.
    pub fn try_push(&self, item: T) -> Result<(), QueueError> {
        if self.channel.try_send(item).is_ok() {
            self.accepted.fetch_add(1, Ordering::Relaxed);
            Ok(())
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            Err(QueueError::Full)
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.channel.try_receive().ok()
    }

    /// Wait for the next item.
    pub async fn pop(&self) -> T {
        self.channel.receive().await
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            max_size: N,
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

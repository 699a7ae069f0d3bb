//! Token-bucket throttle for hot-path log lines.
//!
//! The ingest path drops malformed frames, unparsable payloads and
//! queue-full items silently to the wire, but logs them. A scanner or a
//! misbehaving client can produce thousands per second, so each dropping
//! component owns a `LogThrottle` and only logs while tokens remain.
//! Counters are always updated; only the log line is suppressed. The next
//! line allowed through is preceded by a count of what was skipped.

use burster::Limiter;
use core::time::Duration;
use log::warn;

pub struct LogThrottle {
    bucket: burster::TokenBucket<fn() -> Duration>,
    suppressed: u32,
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl LogThrottle {
    /// 5 lines per second, bursts of 10.
    pub fn new() -> Self {
        Self {
            bucket: burster::TokenBucket::new_with_time_provider(
                5,
                10,
                platform_now as fn() -> Duration,
            ),
            suppressed: 0,
        }
    }

    /// `true` if the caller may log now.
    pub fn allow(&mut self) -> bool {
        if self.bucket.try_consume(1).is_ok() {
            let skipped = self.take_suppressed();
            if skipped > 0 {
                warn!("{} similar log line(s) suppressed", skipped);
            }
            true
        } else {
            self.suppressed = self.suppressed.saturating_add(1);
            false
        }
    }

    fn take_suppressed(&mut self) -> u32 {
        core::mem::take(&mut self.suppressed)
    }
}

#[cfg(target_os = "espidf")]
fn platform_now() -> Duration {
    let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    Duration::from_micros(us as u64)
}

#[cfg(not(target_os = "espidf"))]
fn platform_now() -> Duration {
    use std::time::Instant;
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

//! Restart-loop detection.
//!
//! Counts `init()` calls made during the first 30 s of uptime. More than
//! two, with the latest arriving within 10 s of the previous one, means a
//! bad configuration is crash-looping the node; the orchestrator then
//! drops into the captive portal instead of trying the stored mode again.

use log::warn;

/// Window after boot during which inits are counted.
pub const EARLY_BOOT_MS: u64 = 30_000;
/// Two inits closer than this count as rapid.
pub const RAPID_INIT_MS: u64 = 10_000;
/// Inits tolerated before the guard trips.
pub const MAX_EARLY_INITS: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootGuard {
    init_count: u32,
    last_init_ms: u64,
}

impl BootGuard {
    pub const fn new() -> Self {
        Self {
            init_count: 0,
            last_init_ms: 0,
        }
    }

    /// Record one `init()` at uptime `now_ms`. Returns `true` when a
    /// restart loop is detected.
    pub fn record_init(&mut self, now_ms: u64) -> bool {
        let mut tripped = false;
        if now_ms < EARLY_BOOT_MS {
            self.init_count += 1;
            if self.init_count > MAX_EARLY_INITS
                && now_ms.saturating_sub(self.last_init_ms) < RAPID_INIT_MS
            {
                warn!(
                    "Orchestrator: rapid restart loop detected (count: {})",
                    self.init_count
                );
                tripped = true;
            }
        } else {
            self.init_count = 0;
        }
        self.last_init_ms = now_ms;
        tripped
    }

    pub fn init_count(&self) -> u32 {
        self.init_count
    }
}

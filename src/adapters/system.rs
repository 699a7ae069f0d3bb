//! System services: heap statistics and deferred restart.
//!
//! Implements [`SystemPort`]. Battery measurement hardware is not fitted,
//! so `battery()` always reports `None`.

use log::{info, warn};

use crate::app::ports::{BatteryReading, HeapStats, SystemPort};

#[derive(Default)]
pub struct EspSystem {
    restart_pending: Option<u32>,
}

impl EspSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay of the restart already scheduled, if any.
    pub fn restart_pending(&self) -> Option<u32> {
        self.restart_pending
    }

    #[cfg(target_os = "espidf")]
    fn platform_heap(&self) -> HeapStats {
        use esp_idf_svc::sys::{
            MALLOC_CAP_DEFAULT, esp_get_free_heap_size, heap_caps_get_largest_free_block,
            heap_caps_get_total_size,
        };
        // SAFETY: read-only allocator queries.
        unsafe {
            HeapStats {
                free: esp_get_free_heap_size(),
                total: heap_caps_get_total_size(MALLOC_CAP_DEFAULT) as u32,
                largest_block: heap_caps_get_largest_free_block(MALLOC_CAP_DEFAULT) as u32,
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_heap(&self) -> HeapStats {
        HeapStats {
            free: 180 * 1024,
            total: 320 * 1024,
            largest_block: 110 * 1024,
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_restart(delay_ms: u32) -> std::io::Result<()> {
        std::thread::Builder::new()
            .name("restart".into())
            .stack_size(3 * 1024)
            .spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(delay_ms.into()));
                info!("System: restarting");
                // SAFETY: does not return.
                unsafe { esp_idf_svc::sys::esp_restart() };
            })
            .map(|_| ())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_restart(delay_ms: u32) -> std::io::Result<()> {
        info!("System(sim): restart in {} ms", delay_ms);
        Ok(())
    }
}

impl SystemPort for EspSystem {
    fn heap(&self) -> HeapStats {
        self.platform_heap()
    }

    fn battery(&self) -> Option<BatteryReading> {
        None
    }

    fn schedule_restart(&mut self, delay_ms: u32) {
        if let Some(pending) = self.restart_pending {
            info!("System: restart already scheduled ({} ms)", pending);
            return;
        }
        match Self::platform_restart(delay_ms) {
            Ok(()) => self.restart_pending = Some(delay_ms),
            Err(e) => warn!("System: could not schedule restart: {}", e),
        }
    }
}

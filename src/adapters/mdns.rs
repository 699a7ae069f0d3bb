//! mDNS service advertisement adapter.
//!
//! Implements [`Advertiser`]. Uses the ESP-IDF mDNS component on target
//! and only logs on simulation targets. A second `advertise` call
//! replaces the previous registration.

use std::ffi::CString;

use log::info;

use crate::app::ports::{AdvertiseError, Advertiser};

/// Current registration; replaced by the next `advertise`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Registration {
    pub hostname: String,
    pub service: String,
    pub protocol: String,
    pub port: u16,
}

#[derive(Default)]
pub struct MdnsAdapter {
    active: Option<Registration>,
}

impl MdnsAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn stop(&mut self) {
        if self.active.take().is_some() {
            self.platform_stop();
            info!("mDNS: stopped");
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&self, reg: &Registration) -> Result<(), AdvertiseError> {
        use esp_idf_svc::sys::*;

        let cstr = |s: &str| CString::new(s).map_err(|_| AdvertiseError(ESP_ERR_INVALID_ARG as i32));
        let hostname = cstr(&reg.hostname)?;
        let service = cstr(&reg.service)?;
        let protocol = cstr(&reg.protocol)?;
        let version = cstr(env!("CARGO_PKG_VERSION"))?;

        let check = |ret: i32| {
            if ret == ESP_OK as i32 {
                Ok(())
            } else {
                Err(AdvertiseError(ret))
            }
        };

        // SAFETY: every pointer is a NUL-terminated CString alive for the
        // whole block; the mDNS component copies what it keeps.
        unsafe {
            check(mdns_init())?;
            check(mdns_hostname_set(hostname.as_ptr()))?;
            check(mdns_instance_name_set(hostname.as_ptr()))?;
            check(mdns_service_add(
                core::ptr::null(),
                service.as_ptr(),
                protocol.as_ptr(),
                reg.port,
                core::ptr::null_mut(),
                0,
            ))?;
            check(mdns_service_txt_item_set(
                service.as_ptr(),
                protocol.as_ptr(),
                c"version".as_ptr(),
                version.as_ptr(),
            ))?;
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self, reg: &Registration) -> Result<(), AdvertiseError> {
        // Mirrors the driver's argument checks.
        for s in [&reg.hostname, &reg.service, &reg.protocol] {
            if s.is_empty() || CString::new(s.as_str()).is_err() {
                return Err(AdvertiseError(-1));
            }
        }
        info!(
            "mDNS(sim): registered {}.local {}.{}:{} v={}",
            reg.hostname,
            reg.service,
            reg.protocol,
            reg.port,
            env!("CARGO_PKG_VERSION")
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&self) {
        // SAFETY: freeing an initialised mDNS instance; no handles escape.
        unsafe { esp_idf_svc::sys::mdns_free() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&self) {
        info!("mDNS(sim): unregistered");
    }
}

impl Advertiser for MdnsAdapter {
    fn advertise(
        &mut self,
        hostname: &str,
        service: &str,
        protocol: &str,
        port: u16,
    ) -> Result<(), AdvertiseError> {
        self.stop();
        let reg = Registration {
            hostname: hostname.into(),
            service: service.into(),
            protocol: protocol.into(),
            port,
        };
        self.platform_start(&reg)?;
        self.active = Some(reg);
        Ok(())
    }
}

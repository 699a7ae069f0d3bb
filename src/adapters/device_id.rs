//! Device identity derived from the factory MAC address and chip info.
//!
//! The MAC is read from eFuse, so the identity is stable across reboots.
//! It feeds the backend device name (`ESP32-S3_R0_EEFF`), the mDNS
//! hostname and the captive portal AP name.

use crate::espnow::mac::MacAddr;
use crate::websocket::messages::{DeviceIdentity, device_name};

/// Chip facts read once at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    pub model: &'static str,
    pub revision: u16,
    pub cpu_freq_mhz: u32,
    pub flash_size: u32,
}

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddr {
    let mut mac = [0u8; 6];
    // SAFETY: `mac` is exactly the 6 bytes the call writes.
    let ret = unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    if ret != esp_idf_svc::sys::ESP_OK as i32 {
        log::warn!("DeviceId: eFuse MAC read failed ({})", ret);
    }
    MacAddr(mac)
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddr {
    MacAddr([0x24, 0x6F, 0x28, 0xDE, 0xCA, 0xFE])
}

#[cfg(target_os = "espidf")]
pub fn chip_info() -> ChipInfo {
    use esp_idf_svc::sys::*;

    let mut info = esp_chip_info_t::default();
    // SAFETY: `info` outlives the call.
    unsafe { esp_chip_info(&mut info) };

    #[allow(non_upper_case_globals)]
    let model = match info.model {
        esp_chip_model_t_CHIP_ESP32 => "ESP32",
        esp_chip_model_t_CHIP_ESP32S2 => "ESP32-S2",
        esp_chip_model_t_CHIP_ESP32S3 => "ESP32-S3",
        esp_chip_model_t_CHIP_ESP32C3 => "ESP32-C3",
        esp_chip_model_t_CHIP_ESP32C6 => "ESP32-C6",
        _ => "ESP32-Unknown",
    };

    let mut flash_size = 0u32;
    // SAFETY: null selects the default flash chip.
    if unsafe { esp_flash_get_size(core::ptr::null_mut(), &mut flash_size) } != ESP_OK as i32 {
        flash_size = 0;
    }

    ChipInfo {
        model,
        revision: info.revision,
        cpu_freq_mhz: CONFIG_ESP_DEFAULT_CPU_FREQ_MHZ,
        flash_size,
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn chip_info() -> ChipInfo {
    ChipInfo {
        model: "ESP32-S3",
        revision: 0,
        cpu_freq_mhz: 240,
        flash_size: 8 * 1024 * 1024,
    }
}

/// Build the identity reported to the backend.
pub fn identity(mac: MacAddr, chip: &ChipInfo) -> DeviceIdentity {
    DeviceIdentity {
        mac,
        device_name: device_name(chip.model, chip.revision, &mac),
        device_model: chip.model.into(),
        firmware_version: env!("CARGO_PKG_VERSION"),
        chip_model: chip.model.into(),
        chip_revision: chip.revision,
        cpu_freq_mhz: chip.cpu_freq_mhz,
        flash_size: chip.flash_size,
        // Only the original ESP32 carries an internal EMAC.
        supports_ethernet: chip.model == "ESP32",
        supports_espnow: true,
        supports_mqtt: true,
    }
}

/// Identity of the chip this code runs on.
pub fn local_identity() -> DeviceIdentity {
    identity(read_mac(), &chip_info())
}

//! Station configuration
//!
//! One immutable [`DeviceConfig`] is assembled at startup and borrowed by
//! every component for the lifetime of the device. Nothing in the pipeline
//! reads configuration from globals.

use embassy_time::Duration;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::http::Endpoint;

/// Longest SSID allowed by 802.11.
pub const MAX_SSID_LEN: usize = 32;
/// Longest WPA2 passphrase.
pub const MAX_PASSWORD_LEN: usize = 64;
/// Longest device id sent with each check-in.
pub const MAX_DEVICE_ID_LEN: usize = 32;
/// Longest device name sent with each check-in.
pub const MAX_DEVICE_NAME_LEN: usize = 64;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
#[serde(default)]
pub struct DeviceConfig<'a> {
    pub network: NetworkCredentials<'a>,
    pub server: ServerConfig<'a>,
    pub identity: DeviceIdentity<'a>,
    pub timing: TimingPolicy,
    pub features: FeatureFlags,
    pub pins: PinAssignments,
}

impl<'a> DeviceConfig<'a> {
    /// Check every field the pipeline relies on.
    ///
    /// Returns the parsed server endpoint so callers do not parse twice.
    pub fn validate(&self) -> Result<Endpoint<'a>, ConfigError> {
        let ssid = self.network.ssid;
        if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::InvalidSsid);
        }
        if self.network.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::InvalidPassword);
        }

        let device_id = self.identity.device_id;
        if device_id.is_empty() || device_id.len() > MAX_DEVICE_ID_LEN {
            return Err(ConfigError::InvalidDeviceId {
                max: MAX_DEVICE_ID_LEN,
            });
        }
        if self.identity.device_name.len() > MAX_DEVICE_NAME_LEN {
            return Err(ConfigError::InvalidDeviceName {
                max: MAX_DEVICE_NAME_LEN,
            });
        }

        self.timing.validate()?;

        Ok(Endpoint::parse(self.server.url)?)
    }
}

/// WiFi station credentials
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkCredentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig<'a> {
    /// Check-in endpoint, e.g. `http://192.168.1.100/rfid-checkin/api/rfid_checkin.php`
    pub url: &'a str,
}

impl Default for ServerConfig<'_> {
    fn default() -> Self {
        Self {
            url: "http://192.168.1.100/rfid-checkin/api/rfid_checkin.php",
        }
    }
}

/// Who this reader is, as reported to the server
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceIdentity<'a> {
    pub device_id: &'a str,
    pub device_name: &'a str,
}

impl Default for DeviceIdentity<'_> {
    fn default() -> Self {
        Self {
            device_id: "ESP32-MAIN",
            device_name: "Main Entrance Reader",
        }
    }
}

/// Timing budgets, all in milliseconds
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimingPolicy {
    /// Minimum interval between two admitted scans of the same tag
    pub scan_cooldown_ms: u32,
    /// Budget for bringing the WiFi link up
    pub wifi_timeout_ms: u32,
    /// Budget for one check-in request
    pub http_timeout_ms: u32,
}

impl TimingPolicy {
    pub const fn scan_cooldown(&self) -> Duration {
        Duration::from_millis(self.scan_cooldown_ms as u64)
    }

    pub const fn wifi_timeout(&self) -> Duration {
        Duration::from_millis(self.wifi_timeout_ms as u64)
    }

    pub const fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms as u64)
    }

    /// Upper bound on the time one accepted scan may hold the loop.
    pub const fn event_budget(&self) -> Duration {
        Duration::from_millis(self.wifi_timeout_ms as u64 + self.http_timeout_ms as u64)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // A zero cooldown is allowed: it disables debouncing.
        if self.wifi_timeout_ms == 0 {
            return Err(ConfigError::ZeroTiming {
                field: "wifi_timeout_ms",
            });
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::ZeroTiming {
                field: "http_timeout_ms",
            });
        }
        Ok(())
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            scan_cooldown_ms: 2_000,
            wifi_timeout_ms: 20_000,
            http_timeout_ms: 10_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureFlags {
    /// Print scan, outcome and link lines on the console
    pub debug_enabled: bool,
    /// Print a liveness line once per minute
    pub heartbeat_enabled: bool,
}

impl FeatureFlags {
    /// Ceiling for `log` output: `verbose` with debug on, nothing otherwise.
    pub fn log_ceiling(&self, verbose: LevelFilter) -> LevelFilter {
        if self.debug_enabled {
            verbose
        } else {
            LevelFilter::Off
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            debug_enabled: true,
            heartbeat_enabled: false,
        }
    }
}

/// GPIO numbers of the reader and indicator peripherals
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct PinAssignments {
    /// MFRC522 SDA / chip select
    pub reader_ss: u8,
    /// MFRC522 reset
    pub reader_rst: u8,
    pub success_led: u8,
    pub error_led: u8,
}

impl Default for PinAssignments {
    fn default() -> Self {
        Self {
            reader_ss: 21,
            reader_rst: 22,
            success_led: 2,
            error_led: 4,
        }
    }
}

/// Parse a millisecond value coming from a text source (env var, CLI flag).
pub fn parse_millis(field: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidTiming { field })
}

/// Parse a boolean flag coming from a text source. Accepts `true/false`, `1/0`, `on/off`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

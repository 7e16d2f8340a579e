//! Build-time station configuration
//!
//! Values come from `CHECKIN_*` variables captured by `build.rs`. Anything
//! left unset keeps the `checkin-core` default. Pins are not configurable:
//! the default `PinAssignments` is the board wiring `main` drives.

use checkin_core::config::{parse_flag, parse_millis};
use checkin_core::error::ConfigError;
use checkin_core::DeviceConfig;

/// Assemble the station configuration baked into this image.
pub fn device_config() -> Result<DeviceConfig<'static>, ConfigError> {
    let mut config = DeviceConfig::default();

    if let Some(ssid) = option_env!("CHECKIN_WIFI_SSID") {
        config.network.ssid = ssid;
    }
    if let Some(password) = option_env!("CHECKIN_WIFI_PASSWORD") {
        config.network.password = password;
    }
    if let Some(url) = option_env!("CHECKIN_SERVER_URL") {
        config.server.url = url;
    }
    if let Some(id) = option_env!("CHECKIN_DEVICE_ID") {
        config.identity.device_id = id;
    }
    if let Some(name) = option_env!("CHECKIN_DEVICE_NAME") {
        config.identity.device_name = name;
    }

    if let Some(ms) = option_env!("CHECKIN_SCAN_COOLDOWN_MS") {
        config.timing.scan_cooldown_ms = parse_millis("scan_cooldown_ms", ms)?;
    }
    if let Some(ms) = option_env!("CHECKIN_WIFI_TIMEOUT_MS") {
        config.timing.wifi_timeout_ms = parse_millis("wifi_timeout_ms", ms)?;
    }
    if let Some(ms) = option_env!("CHECKIN_HTTP_TIMEOUT_MS") {
        config.timing.http_timeout_ms = parse_millis("http_timeout_ms", ms)?;
    }

    if let Some(flag) = option_env!("CHECKIN_DEBUG").and_then(parse_flag) {
        config.features.debug_enabled = flag;
    }
    if let Some(flag) = option_env!("CHECKIN_HEARTBEAT").and_then(parse_flag) {
        config.features.heartbeat_enabled = flag;
    }

    config.validate()?;
    Ok(config)
}

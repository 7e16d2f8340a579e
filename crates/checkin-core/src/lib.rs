//! Hardware-independent core library for the RFID check-in station
//!
//! This crate contains the whole scan-to-server pipeline: tag debouncing,
//! WiFi link lifecycle, check-in delivery with bounded retries, and status
//! feedback. Hardware is reached only through the capability traits in
//! [`scan`], [`connectivity`], [`dispatch`], [`status`] and [`time`], so the
//! pipeline runs unchanged on the ESP32 firmware, the desktop simulator and
//! host tests.
//!
//! It is `#![no_std]` and allocation free.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod connectivity;
pub mod cooldown;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod reply;
pub mod scan;
pub mod station;
pub mod status;
pub mod time;

#[cfg(test)]
mod testing;

pub use config::{DeviceConfig, DeviceIdentity, FeatureFlags, PinAssignments, TimingPolicy};
pub use connectivity::{ConnectivityManager, ConnectivityState, WirelessLink};
pub use cooldown::CooldownGate;
pub use dispatch::{CheckinDispatcher, CheckinOutcome, CheckinRequest, Transport};
pub use scan::{ScanEvent, ScanSource, TagId, TagReader};
pub use station::{CheckinStation, StationStats, StepReport};
pub use status::{Console, Indicator, LedIndicator, Signal, StatusIndicator};
pub use time::{Clock, SystemClock};

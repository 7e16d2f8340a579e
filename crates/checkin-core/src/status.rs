//! LED and console feedback
//!
//! Nothing here blocks. A lit LED is switched off by a later
//! [`StatusIndicator::tick`] once [`INDICATOR_HOLD`] has passed, so the loop
//! keeps polling the reader while the LED is on.

use core::fmt;

use embassy_time::{Duration, Instant};
use embedded_hal::digital::OutputPin;

use crate::config::{DeviceConfig, FeatureFlags};
use crate::connectivity::ConnectivityState;
use crate::dispatch::CheckinOutcome;
use crate::reply::ServerReply;
use crate::scan::TagId;
use crate::station::StationStats;

/// How long an outcome LED stays lit.
pub const INDICATOR_HOLD: Duration = Duration::from_millis(1_500);
/// Interval between heartbeat lines.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Off,
    Success,
    Error,
}

/// Visual status output (two LEDs on the station).
pub trait Indicator {
    /// Show `signal`. Failures are ignored; an LED must never stop a check-in.
    fn set(&mut self, signal: Signal);
}

/// Line-oriented text output (serial, RTT or stdout).
pub trait Console {
    fn write_line(&mut self, line: fmt::Arguments<'_>);
}

/// Success/error LED pair on two GPIOs.
pub struct LedIndicator<G, R> {
    success: G,
    error: R,
}

impl<G: OutputPin, R: OutputPin> LedIndicator<G, R> {
    pub fn new(success: G, error: R) -> Self {
        Self { success, error }
    }
}

impl<G: OutputPin, R: OutputPin> Indicator for LedIndicator<G, R> {
    fn set(&mut self, signal: Signal) {
        let (green, red) = match signal {
            Signal::Off => (false, false),
            Signal::Success => (true, false),
            Signal::Error => (false, true),
        };
        let _ = self.success.set_state(green.into());
        let _ = self.error.set_state(red.into());
    }
}

/// Everything a heartbeat line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub uptime: Duration,
    pub link: ConnectivityState,
    pub stats: StationStats,
    pub reconnects: u32,
}

/// Renders station events on the LEDs and, when enabled, the console.
pub struct StatusIndicator<I, W> {
    indicator: I,
    console: W,
    flags: FeatureFlags,
    /// When the current LED goes dark
    lit_until: Option<Instant>,
    next_heartbeat: Option<Instant>,
}

impl<I: Indicator, W: Console> StatusIndicator<I, W> {
    pub fn new(indicator: I, console: W, flags: FeatureFlags) -> Self {
        Self {
            indicator,
            console,
            flags,
            lit_until: None,
            next_heartbeat: None,
        }
    }

    /// Startup banner; also starts the heartbeat schedule.
    pub fn on_boot(&mut self, config: &DeviceConfig<'_>, now: Instant) {
        self.indicator.set(Signal::Off);
        self.lit_until = None;
        self.next_heartbeat = now.checked_add(HEARTBEAT_PERIOD);

        if self.flags.debug_enabled {
            self.console.write_line(format_args!(
                "RFID check-in station v{}",
                env!("CARGO_PKG_VERSION")
            ));
            self.console.write_line(format_args!(
                "Device: {} ({})",
                config.identity.device_id, config.identity.device_name
            ));
            self.console
                .write_line(format_args!("Server: {}", config.server.url));
            self.console.write_line(format_args!(
                "Cooldown {} ms, WiFi timeout {} ms, HTTP timeout {} ms",
                config.timing.scan_cooldown_ms,
                config.timing.wifi_timeout_ms,
                config.timing.http_timeout_ms
            ));
            let pins = &config.pins;
            self.console.write_line(format_args!(
                "Pins: reader SS {}, reader RST {}, success LED {}, error LED {}",
                pins.reader_ss, pins.reader_rst, pins.success_led, pins.error_led
            ));
        }
    }

    /// A tag was read and passed the cooldown.
    pub fn on_scan(&mut self, tag: &TagId) {
        // The web scanner page greps the serial stream for this exact prefix.
        if self.flags.debug_enabled {
            self.console.write_line(format_args!("RFID: {}", tag));
        }
    }

    pub fn on_connectivity(&mut self, state: ConnectivityState) {
        if self.flags.debug_enabled {
            self.console.write_line(format_args!("WiFi: {}", state));
        }
    }

    /// Final outcome of one accepted scan.
    pub fn on_outcome(
        &mut self,
        now: Instant,
        tag: &TagId,
        outcome: CheckinOutcome,
        reply: Option<&ServerReply>,
    ) {
        let signal = if outcome.is_delivered() {
            Signal::Success
        } else {
            Signal::Error
        };
        self.indicator.set(signal);
        self.lit_until = Some(now.checked_add(INDICATOR_HOLD).unwrap_or(now));

        if self.flags.debug_enabled {
            self.console.write_line(format_args!(
                "Check-in {}: {}{}",
                tag,
                outcome,
                ReplyNote(reply)
            ));
        }
    }

    /// Housekeeping, called once per loop iteration.
    pub fn tick(&mut self, now: Instant, heartbeat: &Heartbeat) {
        if self.lit_until.is_some_and(|until| now >= until) {
            self.indicator.set(Signal::Off);
            self.lit_until = None;
        }

        if !self.flags.heartbeat_enabled {
            return;
        }
        let due = match self.next_heartbeat {
            Some(due) => due,
            None => {
                self.next_heartbeat = now.checked_add(HEARTBEAT_PERIOD);
                return;
            }
        };
        if now < due {
            return;
        }

        let stats = &heartbeat.stats;
        self.console.write_line(format_args!(
            "Heartbeat: uptime {} s, WiFi {}, scans {}, suppressed {}, delivered {}, failed {}, reconnects {}",
            heartbeat.uptime.as_secs(),
            heartbeat.link,
            stats.scans,
            stats.suppressed,
            stats.delivered,
            stats.failed,
            heartbeat.reconnects
        ));

        // After a long blocking event, skip missed beats instead of bursting.
        let mut next = due.checked_add(HEARTBEAT_PERIOD);
        if next.is_some_and(|next| next <= now) {
            next = now.checked_add(HEARTBEAT_PERIOD);
        }
        self.next_heartbeat = next;
    }
}

/// `" [action] text"` suffix of an outcome line, empty without a reply.
struct ReplyNote<'r>(Option<&'r ServerReply>);

impl fmt::Display for ReplyNote<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(reply) = self.0 else {
            return Ok(());
        };
        if let Some(action) = reply.action.as_deref() {
            write!(f, " [{}]", action)?;
        }
        if let Some(text) = reply.summary() {
            write!(f, " {}", text)?;
        }
        Ok(())
    }
}

//! The station control loop
//!
//! [`CheckinStation`] wires the pipeline together:
//!
//! ```text
//! ScanSource -> CooldownGate -> ConnectivityManager -> CheckinDispatcher -> StatusIndicator
//! ```
//!
//! Each accepted scan is handled to completion before the reader is polled
//! again, within a budget of `wifi_timeout + http_timeout`.

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::connectivity::{ConnectivityManager, ConnectivityState, WirelessLink};
use crate::cooldown::CooldownGate;
use crate::dispatch::{CheckinDispatcher, CheckinOutcome, CheckinRequest, Transport};
use crate::error::ConfigError;
use crate::scan::{ScanEvent, ScanSource, TagReader};
use crate::status::{Console, Heartbeat, Indicator, StatusIndicator};
use crate::time::{Clock, deadline_within};

/// Delivery attempts per accepted scan, the first one included.
pub const MAX_DISPATCH_ATTEMPTS: u8 = 2;
/// Pause between loop iterations in [`CheckinStation::run`].
pub const LOOP_IDLE: Duration = Duration::from_millis(50);

/// Counters reported in heartbeat lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StationStats {
    /// Scan events seen, suppressed ones included
    pub scans: u32,
    /// Scans dropped by the cooldown gate
    pub suppressed: u32,
    pub delivered: u32,
    pub failed: u32,
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepReport {
    /// No new tag in the field
    Idle,
    /// A tag was read again inside its cooldown window
    Suppressed,
    /// An accepted scan was handled to this final outcome
    Completed(CheckinOutcome),
}

pub struct CheckinStation<'a, R, L, T, I, W, C> {
    config: &'a DeviceConfig<'a>,
    clock: C,
    scanner: ScanSource<R, C>,
    gate: CooldownGate,
    connectivity: ConnectivityManager<L, C>,
    dispatcher: CheckinDispatcher<'a, T, C>,
    status: StatusIndicator<I, W>,
    stats: StationStats,
    booted_at: Instant,
    /// Last link state shown on the console
    shown_link: ConnectivityState,
}

impl<'a, R, L, T, I, W, C> CheckinStation<'a, R, L, T, I, W, C>
where
    R: TagReader,
    L: WirelessLink,
    T: Transport,
    I: Indicator,
    W: Console,
    C: Clock + Clone,
{
    /// Validate `config` and assemble the pipeline. Prints the boot banner.
    pub fn new(
        config: &'a DeviceConfig<'a>,
        clock: C,
        reader: R,
        link: L,
        transport: T,
        indicator: I,
        console: W,
    ) -> Result<Self, ConfigError> {
        let endpoint = config.validate()?;

        let booted_at = clock.now();
        let mut status = StatusIndicator::new(indicator, console, config.features);
        status.on_boot(config, booted_at);

        info!(
            "Station {} ready, posting to {}:{}{}",
            config.identity.device_id, endpoint.host, endpoint.port, endpoint.path
        );

        Ok(Self {
            config,
            scanner: ScanSource::new(reader, clock.clone()),
            gate: CooldownGate::new(config.timing.scan_cooldown()),
            connectivity: ConnectivityManager::new(link, clock.clone()),
            dispatcher: CheckinDispatcher::new(transport, clock.clone(), endpoint),
            status,
            stats: StationStats::default(),
            booted_at,
            shown_link: ConnectivityState::Disconnected,
            clock,
        })
    }

    pub fn stats(&self) -> StationStats {
        self.stats
    }

    pub fn connectivity_state(&self) -> ConnectivityState {
        self.connectivity.state()
    }

    /// One loop iteration. Never blocks longer than the event budget.
    pub async fn step(&mut self) -> StepReport {
        let report = match self.scanner.poll() {
            Some(event) => self.handle_scan(event).await,
            None => StepReport::Idle,
        };

        let now = self.clock.now();
        let heartbeat = self.heartbeat(now);
        self.status.tick(now, &heartbeat);

        report
    }

    /// Run the station forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.step().await;
            let now = self.clock.now();
            self.clock
                .sleep_until(deadline_within(now, LOOP_IDLE, Instant::MAX))
                .await;
        }
    }

    async fn handle_scan(&mut self, event: ScanEvent) -> StepReport {
        self.stats.scans = self.stats.scans.saturating_add(1);

        if !self.gate.admit(&event) {
            self.stats.suppressed = self.stats.suppressed.saturating_add(1);
            debug!("Ignoring {}: still in cooldown", event.tag);
            return StepReport::Suppressed;
        }

        info!("Scanned {}", event.tag);
        self.status.on_scan(&event.tag);

        let outcome = self.deliver(&event).await;

        if outcome.is_delivered() {
            self.stats.delivered = self.stats.delivered.saturating_add(1);
            info!("Check-in for {} delivered", event.tag);
        } else {
            self.stats.failed = self.stats.failed.saturating_add(1);
            warn!("Check-in for {} dropped: {}", event.tag, outcome);
        }

        let now = self.clock.now();
        self.status
            .on_outcome(now, &event.tag, outcome, self.dispatcher.last_reply());

        StepReport::Completed(outcome)
    }

    /// Deliver one admitted scan with bounded retries.
    ///
    /// Only transient failures are retried, and no attempt starts once the
    /// event budget is spent. Each wait is clamped to the budget.
    async fn deliver(&mut self, event: &ScanEvent) -> CheckinOutcome {
        let timing = self.config.timing;
        let budget_end = deadline_within(self.clock.now(), timing.event_budget(), Instant::MAX);
        let request = CheckinRequest::new(&self.config.identity, event);

        let mut outcome = CheckinOutcome::ConnectivityFailure;
        for attempt in 1..=MAX_DISPATCH_ATTEMPTS {
            let now = self.clock.now();
            if now >= budget_end {
                debug!("Event budget for {} spent", event.tag);
                break;
            }

            let link_deadline = deadline_within(now, timing.wifi_timeout(), budget_end);
            let link = self.connectivity.ensure_connected(link_deadline).await;
            self.show_link(link);

            let http_deadline =
                deadline_within(self.clock.now(), timing.http_timeout(), budget_end);
            outcome = self.dispatcher.send(link, &request, http_deadline).await;

            if !outcome.is_retryable() {
                break;
            }
            if attempt < MAX_DISPATCH_ATTEMPTS {
                warn!(
                    "Check-in attempt {} for {} failed ({}), retrying",
                    attempt, event.tag, outcome
                );
            }
        }

        outcome
    }

    fn show_link(&mut self, state: ConnectivityState) {
        if state != self.shown_link {
            self.shown_link = state;
            self.status.on_connectivity(state);
        }
    }

    fn heartbeat(&self, now: Instant) -> Heartbeat {
        Heartbeat {
            uptime: now.saturating_duration_since(self.booted_at),
            link: self.connectivity.state(),
            stats: self.stats,
            reconnects: self.connectivity.reconnects(),
        }
    }
}

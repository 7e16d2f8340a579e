//! WiFi link lifecycle
//!
//! The [`ConnectivityManager`] owns the link state machine:
//!
//! ```text
//! Disconnected ──> Connecting ──> Connected ──> Reconnecting ──> Connected
//!       ^               │                             │
//!       └───────────────┴─────── budget spent ────────┘
//! ```
//!
//! There is no background retry. The link is only (re)established when a
//! caller asks for it through [`ConnectivityManager::ensure_connected`], which
//! keeps the station loop single-threaded and deterministic.

use core::fmt;
use core::future::Future;

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use crate::time::{Clock, with_deadline};

/// How often link-up is re-checked while waiting for association/DHCP.
pub const LINK_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectivityState {
    /// Whether `self -> next` is an edge of the link state machine.
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Disconnected)
                | (Self::Connected, Self::Reconnecting)
                | (Self::Reconnecting, Self::Connected)
                | (Self::Reconnecting, Self::Disconnected)
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Wireless link capability.
pub trait WirelessLink {
    type Error: fmt::Debug;

    /// Start (or restart) association with the configured access point.
    ///
    /// Resolves once the radio reports association or the attempt fails.
    /// May be dropped mid-way when the caller's deadline passes.
    fn associate(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    /// True once the link is associated and has an address.
    fn is_up(&mut self) -> bool;

    /// Drop a stale association before trying again.
    fn disconnect(&mut self) -> impl Future<Output = ()>;
}

pub struct ConnectivityManager<L, C> {
    link: L,
    clock: C,
    state: ConnectivityState,
    reconnects: u32,
}

impl<L: WirelessLink, C: Clock> ConnectivityManager<L, C> {
    pub fn new(link: L, clock: C) -> Self {
        Self {
            link,
            clock,
            state: ConnectivityState::Disconnected,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Number of times a dropped link was restored.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Bring the link to `Connected`, giving up at `deadline`.
    ///
    /// Never returns after `deadline`. Returns `Connected` or `Disconnected`.
    pub async fn ensure_connected(&mut self, deadline: Instant) -> ConnectivityState {
        match self.state {
            ConnectivityState::Connected => {
                if self.link.is_up() {
                    return ConnectivityState::Connected;
                }
                warn!("WiFi link lost, reconnecting");
                self.transition(ConnectivityState::Reconnecting);
                // Clear the dead association so the radio starts clean.
                let _ = with_deadline(&self.clock, deadline, self.link.disconnect()).await;
            }
            ConnectivityState::Disconnected => self.transition(ConnectivityState::Connecting),
            // A previous attempt was cancelled part way; resume it.
            ConnectivityState::Connecting | ConnectivityState::Reconnecting => {}
        }

        let started = self.clock.now();
        let mut associated = false;

        loop {
            if self.link.is_up() {
                let elapsed = self.clock.now().saturating_duration_since(started);
                info!("WiFi connected after {} ms", elapsed.as_millis());
                if self.state == ConnectivityState::Reconnecting {
                    self.reconnects = self.reconnects.saturating_add(1);
                }
                self.transition(ConnectivityState::Connected);
                return ConnectivityState::Connected;
            }

            if self.clock.now() >= deadline {
                break;
            }

            if !associated {
                match with_deadline(&self.clock, deadline, self.link.associate()).await {
                    Ok(Ok(())) => {
                        debug!("WiFi associated, waiting for address");
                        associated = true;
                        continue;
                    }
                    Ok(Err(e)) => warn!("WiFi association failed: {:?}", e),
                    Err(_) => break,
                }
            }

            let wake = crate::time::deadline_within(self.clock.now(), LINK_POLL_INTERVAL, deadline);
            self.clock.sleep_until(wake).await;
        }

        warn!(
            "WiFi not connected after {} ms, giving up for now",
            self.clock.now().saturating_duration_since(started).as_millis()
        );
        self.transition(ConnectivityState::Disconnected);
        ConnectivityState::Disconnected
    }

    fn transition(&mut self, next: ConnectivityState) {
        debug_assert!(
            self.state.can_transition(next),
            "invalid link transition {} -> {}",
            self.state,
            next
        );
        if !self.state.can_transition(next) {
            warn!("Ignoring invalid link transition {} -> {}", self.state, next);
            return;
        }
        info!("WiFi {} -> {}", self.state, next);
        self.state = next;
    }
}

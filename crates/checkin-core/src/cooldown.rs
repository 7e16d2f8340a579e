//! Per-tag scan debouncing

use embassy_time::{Duration, Instant};
use log::debug;

use crate::scan::{ScanEvent, TagId};

/// Number of distinct tags remembered. The oldest entry is evicted when full.
pub const LAST_SEEN_CAPACITY: usize = 16;

/// Suppresses repeat scans of the same tag inside the cooldown window.
///
/// Advisory only: it keeps one physical tap from producing two dispatches,
/// it does not deduplicate check-ins.
pub struct CooldownGate {
    cooldown: Duration,
    last_seen: heapless::Vec<(TagId, Instant), LAST_SEEN_CAPACITY>,
}

impl CooldownGate {
    pub const fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_seen: heapless::Vec::new(),
        }
    }

    /// Admit `event` unless the same tag was admitted less than one cooldown ago.
    pub fn admit(&mut self, event: &ScanEvent) -> bool {
        let now = event.observed_at;

        // A timestamp older than anything recorded means the clock restarted.
        if self.last_seen.iter().any(|(_, seen)| *seen > now) {
            debug!("Monotonic clock went backwards, clearing scan history");
            self.last_seen.clear();
        }

        match self.last_seen.iter_mut().find(|(tag, _)| *tag == event.tag) {
            Some((_, seen)) => {
                if now.duration_since(*seen) < self.cooldown {
                    return false;
                }
                *seen = now;
            }
            None => self.remember(event.tag.clone(), now),
        }

        true
    }

    /// When the tag was last admitted.
    pub fn last_seen(&self, tag: &TagId) -> Option<Instant> {
        self.last_seen
            .iter()
            .find(|(seen_tag, _)| seen_tag == tag)
            .map(|(_, at)| *at)
    }

    fn remember(&mut self, tag: TagId, at: Instant) {
        if self.last_seen.is_full() {
            let oldest = self
                .last_seen
                .iter()
                .enumerate()
                .min_by_key(|(_, (_, seen))| *seen)
                .map(|(idx, _)| idx);
            if let Some(idx) = oldest {
                self.last_seen.swap_remove(idx);
            }
        }
        // Capacity was just made available above.
        let _ = self.last_seen.push((tag, at));
    }
}

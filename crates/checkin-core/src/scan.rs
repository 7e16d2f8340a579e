//! Tag scanning
//!
//! [`TagReader`] is the capability a reader driver provides: "which UID is in
//! the field right now". [`ScanSource`] turns that level signal into scan
//! events, stamped with the monotonic clock and reported once per
//! presentation.

use core::fmt;

use embassy_time::Instant;
use log::trace;

use crate::time::Clock;

/// Longest ISO 14443 UID (triple size).
pub const MAX_UID_LEN: usize = 10;

/// Opaque tag identifier (the card UID bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct TagId {
    bytes: heapless::Vec<u8, MAX_UID_LEN>,
}

impl TagId {
    /// Returns `None` for an empty UID or one longer than [`MAX_UID_LEN`].
    pub fn from_bytes(uid: &[u8]) -> Option<Self> {
        if uid.is_empty() {
            return None;
        }
        heapless::Vec::from_slice(uid).ok().map(|bytes| Self { bytes })
    }

    /// Parse the upper- or lower-case hex form, ignoring spaces (`"12 34 AB CD"`).
    pub fn from_hex(text: &str) -> Option<Self> {
        let mut bytes = heapless::Vec::<u8, MAX_UID_LEN>::new();
        let mut high: Option<u8> = None;
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            let nibble = c.to_digit(16)? as u8;
            match high.take() {
                Some(h) => bytes.push((h << 4) | nibble).ok()?,
                None => high = Some(nibble),
            }
        }
        if high.is_some() {
            return None;
        }
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Upper-case hex without separators, the form the server expects.
impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.bytes.iter() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId({})", self)
    }
}

/// One physical presentation of a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub tag: TagId,
    pub observed_at: Instant,
}

/// Reader driver capability.
pub trait TagReader {
    type Error: fmt::Debug;

    /// UID of the tag currently in the field, if any. Must not block.
    fn read_tag(&mut self) -> Result<Option<TagId>, Self::Error>;
}

/// Non-blocking scan event source.
pub struct ScanSource<R, C> {
    reader: R,
    clock: C,
    /// Tag reported on the previous poll, still in the field
    present: Option<TagId>,
}

impl<R: TagReader, C: Clock> ScanSource<R, C> {
    pub fn new(reader: R, clock: C) -> Self {
        Self {
            reader,
            clock,
            present: None,
        }
    }

    /// Called once per loop iteration.
    ///
    /// Reports a tag when it enters the field (or replaces another one). A tag
    /// lingering on the reader is reported once. Read errors count as "no tag":
    /// a missed scan is preferable to a false one.
    pub fn poll(&mut self) -> Option<ScanEvent> {
        let current = match self.reader.read_tag() {
            Ok(tag) => tag,
            Err(e) => {
                trace!("Tag read failed, treating as no tag: {:?}", e);
                None
            }
        };

        let Some(tag) = current else {
            self.present = None;
            return None;
        };

        if self.present.as_ref() == Some(&tag) {
            return None;
        }

        self.present = Some(tag.clone());
        Some(ScanEvent {
            tag,
            observed_at: self.clock.now(),
        })
    }
}

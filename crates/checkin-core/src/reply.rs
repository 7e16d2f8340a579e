//! JSON reply of the check-in endpoint
//!
//! The server answers every request with a small JSON object. Only the
//! fields worth showing on the console are kept; anything else is ignored.
//! Parsing is best effort: a body that does not parse leaves the outcome,
//! which is decided by the status code alone, untouched.

use serde::Deserialize;

const MESSAGE_LEN: usize = 96;
const ACTION_LEN: usize = 16;
/// Room for one unescaped string while parsing.
const UNESCAPE_SCRATCH_LEN: usize = 128;

/// Human-readable parts of a server reply.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ServerReply {
    pub success: Option<bool>,
    /// e.g. "Successfully checked in"
    pub message: Option<heapless::String<MESSAGE_LEN>>,
    /// `checkin` or `checkout`
    pub action: Option<heapless::String<ACTION_LEN>>,
    /// Accepted but not recorded, e.g. "No active event found for check-in"
    pub warning: Option<heapless::String<MESSAGE_LEN>>,
    /// Reason for a rejection, e.g. "RFID not recognized"
    pub error: Option<heapless::String<MESSAGE_LEN>>,
}

impl ServerReply {
    /// Parse a reply body. Returns `None` for anything that is not the expected object.
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        let mut scratch = [0u8; UNESCAPE_SCRATCH_LEN];
        serde_json_core::from_slice_escaped::<Self>(body, &mut scratch)
            .ok()
            .map(|(reply, _)| reply)
    }

    /// The most specific text the server gave, preferring problems over success.
    pub fn summary(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.warning.as_deref())
            .or(self.message.as_deref())
    }
}

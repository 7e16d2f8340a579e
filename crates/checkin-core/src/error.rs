//! Error types shared across the check-in pipeline
//!
//! None of these ever escape the station loop: the loop degrades every
//! failure to a [`CheckinOutcome`](crate::dispatch::CheckinOutcome) and a
//! status signal. They exist so codecs and adapters can use `?`.

use thiserror_no_std::Error;

/// Configuration rejected at startup
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("WiFi SSID is empty or longer than 32 bytes")]
    InvalidSsid,
    #[error("WiFi password is longer than 64 bytes")]
    InvalidPassword,
    #[error("device id must be 1-{max} bytes")]
    InvalidDeviceId { max: usize },
    #[error("device name must be at most {max} bytes")]
    InvalidDeviceName { max: usize },
    #[error("timing value `{field}` must be non-zero")]
    ZeroTiming { field: &'static str },
    #[error("timing value `{field}` is not a number of milliseconds")]
    InvalidTiming { field: &'static str },
    #[error("server URL is invalid: {0}")]
    Endpoint(EndpointError),
}

impl From<EndpointError> for ConfigError {
    fn from(value: EndpointError) -> Self {
        Self::Endpoint(value)
    }
}

/// Server URL could not be used as an HTTP endpoint
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointError {
    #[error("only plain http:// URLs are supported")]
    UnsupportedScheme,
    #[error("URL has no host")]
    MissingHost,
    #[error("URL port is not a number between 1 and 65535")]
    InvalidPort,
}

/// Request did not fit the encode buffer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("request exceeds the {capacity} byte buffer")]
    BufferFull { capacity: usize },
}

/// Bytes received from the server were not an HTTP response
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    #[error("server closed the connection without a response")]
    Empty,
    #[error("response ends before the status line")]
    Truncated,
    #[error("malformed HTTP response: {0}")]
    Malformed(httparse::Error),
}

/// Failure reported by a [`Transport`](crate::dispatch::Transport)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not resolve server host")]
    Dns,
    #[error("connection refused")]
    Refused,
    #[error("connection reset")]
    Reset,
    #[error("socket timed out")]
    TimedOut,
    #[error("socket I/O error")]
    Io,
}

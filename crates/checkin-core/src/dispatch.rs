//! Check-in delivery
//!
//! One [`CheckinDispatcher::send`] call is exactly one HTTP `POST`. Retries
//! are the station's business, not the dispatcher's.

use core::fmt::{self, Write};
use core::future::Future;

use embassy_time::Instant;
use log::{debug, error, warn};

use crate::config::DeviceIdentity;
use crate::connectivity::ConnectivityState;
use crate::error::TransportError;
use crate::http::{Endpoint, FormBody, encode_post, parse_response, write_form_pair};
use crate::reply::ServerReply;
use crate::scan::{ScanEvent, TagId};
use crate::time::{Clock, with_deadline};

/// Encoded request size limit (head plus form body).
pub const REQUEST_CAPACITY: usize = 512;
/// Bytes of the response kept; the rest is discarded unread.
pub const RESPONSE_CAPACITY: usize = 1024;

/// Classification of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinOutcome {
    /// Server answered 2xx
    Delivered,
    /// No answer before the deadline
    TimedOut,
    /// Link down, or the connection was refused/reset
    ConnectivityFailure,
    /// Server answered with a non-2xx status
    ServerRejected(u16),
}

impl CheckinOutcome {
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Transient failures worth another attempt. A rejection is the server's final word.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TimedOut | Self::ConnectivityFailure)
    }
}

impl fmt::Display for CheckinOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => f.write_str("delivered"),
            Self::TimedOut => f.write_str("timed out"),
            Self::ConnectivityFailure => f.write_str("connectivity failure"),
            Self::ServerRejected(code) => write!(f, "rejected by server (HTTP {})", code),
        }
    }
}

/// What gets sent for one accepted scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinRequest<'a> {
    pub device_id: &'a str,
    pub device_name: &'a str,
    pub tag: TagId,
    pub observed_at: Instant,
}

impl<'a> CheckinRequest<'a> {
    pub fn new(identity: &DeviceIdentity<'a>, event: &ScanEvent) -> Self {
        Self {
            device_id: identity.device_id,
            device_name: identity.device_name,
            tag: event.tag.clone(),
            observed_at: event.observed_at,
        }
    }
}

impl FormBody for CheckinRequest<'_> {
    fn write_form<W: Write>(&self, out: &mut W) -> fmt::Result {
        write_form_pair(out, true, "rfid", format_args!("{}", self.tag))?;
        write_form_pair(out, false, "device_id", format_args!("{}", self.device_id))?;
        write_form_pair(out, false, "device_name", format_args!("{}", self.device_name))?;
        write_form_pair(
            out,
            false,
            "observed_at",
            format_args!("{}", self.observed_at.as_millis()),
        )
    }
}

/// Byte transport to the check-in server.
pub trait Transport {
    /// Connect to `endpoint`, write `request`, and read the response into
    /// `response` until the server closes or the buffer is full.
    ///
    /// Returns the number of response bytes. May be dropped mid-way when the
    /// caller's deadline passes.
    fn exchange(
        &mut self,
        endpoint: &Endpoint<'_>,
        request: &[u8],
        response: &mut [u8],
    ) -> impl Future<Output = Result<usize, TransportError>>;
}

pub struct CheckinDispatcher<'a, T, C> {
    transport: T,
    clock: C,
    endpoint: Endpoint<'a>,
    request_buf: [u8; REQUEST_CAPACITY],
    response_buf: [u8; RESPONSE_CAPACITY],
    last_reply: Option<ServerReply>,
}

impl<'a, T: Transport, C: Clock> CheckinDispatcher<'a, T, C> {
    pub fn new(transport: T, clock: C, endpoint: Endpoint<'a>) -> Self {
        Self {
            transport,
            clock,
            endpoint,
            request_buf: [0; REQUEST_CAPACITY],
            response_buf: [0; RESPONSE_CAPACITY],
            last_reply: None,
        }
    }

    /// Reply body of the most recent `send`, when the server sent a parsable one.
    pub fn last_reply(&self) -> Option<&ServerReply> {
        self.last_reply.as_ref()
    }

    /// Deliver `request` with a single `POST`, giving up at `deadline`.
    ///
    /// `link` is the caller's view of the connectivity state; nothing is sent
    /// unless it is `Connected`.
    pub async fn send(
        &mut self,
        link: ConnectivityState,
        request: &CheckinRequest<'_>,
        deadline: Instant,
    ) -> CheckinOutcome {
        self.last_reply = None;

        if link != ConnectivityState::Connected {
            debug!("Not sending check-in for {}: link is {}", request.tag, link);
            return CheckinOutcome::ConnectivityFailure;
        }

        let len = match encode_post(&mut self.request_buf, &self.endpoint, request) {
            Ok(len) => len,
            Err(e) => {
                error!("Cannot encode check-in for {}: {}", request.tag, e);
                return CheckinOutcome::ConnectivityFailure;
            }
        };

        debug!(
            "POST {} to {}:{} ({} bytes)",
            request.tag, self.endpoint.host, self.endpoint.port, len
        );

        let exchange = self.transport.exchange(
            &self.endpoint,
            &self.request_buf[..len],
            &mut self.response_buf,
        );
        let received = match with_deadline(&self.clock, deadline, exchange).await {
            Ok(Ok(received)) => received,
            Ok(Err(TransportError::TimedOut)) | Err(_) => {
                warn!("Check-in for {} timed out", request.tag);
                return CheckinOutcome::TimedOut;
            }
            Ok(Err(e)) => {
                warn!("Check-in for {} failed: {}", request.tag, e);
                return CheckinOutcome::ConnectivityFailure;
            }
        };

        let response = match parse_response(&mut self.response_buf[..received]) {
            Ok(response) => response,
            Err(e) => {
                warn!("Check-in for {} got an unusable response: {}", request.tag, e);
                return CheckinOutcome::ConnectivityFailure;
            }
        };

        self.last_reply = ServerReply::parse(response.body);

        if response.is_success() {
            CheckinOutcome::Delivered
        } else {
            CheckinOutcome::ServerRejected(response.status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClock, FakeTransport, TransportStep, tag};
    use embassy_futures::block_on;

    const URL: &str = "http://192.168.1.100/rfid-checkin/api/rfid_checkin.php";

    fn request() -> CheckinRequest<'static> {
        CheckinRequest {
            device_id: "ESP32-MAIN",
            device_name: "Main Entrance Reader",
            tag: tag("A1B2C3"),
            observed_at: Instant::from_millis(1_234),
        }
    }

    fn dispatcher(
        clock: &FakeClock,
        transport: &FakeTransport,
    ) -> CheckinDispatcher<'static, FakeTransport, FakeClock> {
        CheckinDispatcher::new(transport.clone(), clock.clone(), Endpoint::parse(URL).unwrap())
    }

    #[test]
    fn test_2xx_is_delivered_and_reply_is_kept() {
        let clock = FakeClock::new();
        let transport = FakeTransport::new(&clock);
        transport.push(TransportStep::respond(
            200,
            r#"{"success":true,"message":"Successfully checked in","action":"checkin"}"#,
        ));
        let mut dispatcher = dispatcher(&clock, &transport);

        let outcome = block_on(dispatcher.send(
            ConnectivityState::Connected,
            &request(),
            Instant::from_millis(10_000),
        ));

        assert_eq!(outcome, CheckinOutcome::Delivered);
        let reply = dispatcher.last_reply().unwrap();
        assert_eq!(reply.action.as_deref(), Some("checkin"));

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("POST /rfid-checkin/api/rfid_checkin.php HTTP/1.1\r\n"));
        assert!(sent[0].ends_with(
            "rfid=A1B2C3&device_id=ESP32-MAIN&device_name=Main%20Entrance%20Reader&observed_at=1234"
        ));
    }

    #[test]
    fn test_non_2xx_is_rejected_with_code() {
        let clock = FakeClock::new();
        let transport = FakeTransport::new(&clock);
        transport.push(TransportStep::respond(404, r#"{"error":"RFID not recognized"}"#));
        let mut dispatcher = dispatcher(&clock, &transport);

        let outcome = block_on(dispatcher.send(
            ConnectivityState::Connected,
            &request(),
            Instant::from_millis(10_000),
        ));

        assert_eq!(outcome, CheckinOutcome::ServerRejected(404));
        assert_eq!(
            dispatcher.last_reply().and_then(|r| r.summary()),
            Some("RFID not recognized")
        );
    }

    #[test]
    fn test_silent_server_times_out_at_deadline() {
        let clock = FakeClock::new();
        let transport = FakeTransport::new(&clock);
        transport.push(TransportStep::Silent);
        let mut dispatcher = dispatcher(&clock, &transport);

        let outcome = block_on(dispatcher.send(
            ConnectivityState::Connected,
            &request(),
            Instant::from_millis(10_000),
        ));

        assert_eq!(outcome, CheckinOutcome::TimedOut);
        assert_eq!(clock.now_ms(), 10_000);
        assert!(dispatcher.last_reply().is_none());
    }

    #[test]
    fn test_slow_server_inside_deadline_is_delivered() {
        let clock = FakeClock::new();
        let transport = FakeTransport::new(&clock);
        transport.push(TransportStep::Delayed {
            after_ms: 3_000,
            status: 201,
        });
        let mut dispatcher = dispatcher(&clock, &transport);

        let outcome = block_on(dispatcher.send(
            ConnectivityState::Connected,
            &request(),
            Instant::from_millis(10_000),
        ));

        assert_eq!(outcome, CheckinOutcome::Delivered);
        assert_eq!(clock.now_ms(), 3_000);
    }

    #[test]
    fn test_refused_and_reset_are_connectivity_failures() {
        for error in [TransportError::Refused, TransportError::Reset, TransportError::Dns] {
            let clock = FakeClock::new();
            let transport = FakeTransport::new(&clock);
            transport.push(TransportStep::Fail(error));
            let mut dispatcher = dispatcher(&clock, &transport);

            let outcome = block_on(dispatcher.send(
                ConnectivityState::Connected,
                &request(),
                Instant::from_millis(10_000),
            ));

            assert_eq!(outcome, CheckinOutcome::ConnectivityFailure, "{error:?}");
        }
    }

    #[test]
    fn test_socket_timeout_maps_to_timed_out() {
        let clock = FakeClock::new();
        let transport = FakeTransport::new(&clock);
        transport.push(TransportStep::Fail(TransportError::TimedOut));
        let mut dispatcher = dispatcher(&clock, &transport);

        let outcome = block_on(dispatcher.send(
            ConnectivityState::Connected,
            &request(),
            Instant::from_millis(10_000),
        ));

        assert_eq!(outcome, CheckinOutcome::TimedOut);
    }

    #[test]
    fn test_garbage_response_is_connectivity_failure() {
        let clock = FakeClock::new();
        let transport = FakeTransport::new(&clock);
        transport.push(TransportStep::Raw("garbage\r\n\r\n"));
        let mut dispatcher = dispatcher(&clock, &transport);

        let outcome = block_on(dispatcher.send(
            ConnectivityState::Connected,
            &request(),
            Instant::from_millis(10_000),
        ));

        assert_eq!(outcome, CheckinOutcome::ConnectivityFailure);
    }

    #[test]
    fn test_no_transfer_without_link() {
        let clock = FakeClock::new();
        let transport = FakeTransport::new(&clock);
        let mut dispatcher = dispatcher(&clock, &transport);

        for state in [
            ConnectivityState::Disconnected,
            ConnectivityState::Connecting,
            ConnectivityState::Reconnecting,
        ] {
            let outcome =
                block_on(dispatcher.send(state, &request(), Instant::from_millis(10_000)));
            assert_eq!(outcome, CheckinOutcome::ConnectivityFailure);
        }
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_outcome_classification() {
        assert!(CheckinOutcome::TimedOut.is_retryable());
        assert!(CheckinOutcome::ConnectivityFailure.is_retryable());
        assert!(!CheckinOutcome::ServerRejected(500).is_retryable());
        assert!(!CheckinOutcome::Delivered.is_retryable());
        assert_eq!(
            std::format!("{}", CheckinOutcome::ServerRejected(404)),
            "rejected by server (HTTP 404)"
        );
    }
}

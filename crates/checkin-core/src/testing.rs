//! Test doubles for the capability traits
//!
//! Everything runs on [`FakeClock`] virtual time: a sleep completes as soon as
//! it is polled, moving the clock forward to its wake-up time. Fakes are
//! cheap `Rc` handles so a test keeps one clone to inspect what the pipeline
//! did with the other.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embassy_time::Instant;

use crate::connectivity::WirelessLink;
use crate::dispatch::Transport;
use crate::error::TransportError;
use crate::http::Endpoint;
use crate::scan::{TagId, TagReader};
use crate::status::{Console, Indicator, Signal};
use crate::time::Clock;

pub fn tag(hex: &str) -> TagId {
    TagId::from_hex(hex).unwrap()
}

#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    now_ms: Rc<Cell<u64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ms(&self, ms: u64) {
        self.now_ms.set(ms);
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.now_ms.get())
    }

    fn sleep_until(&self, at: Instant) -> impl Future<Output = ()> {
        FakeSleep {
            now_ms: self.now_ms.clone(),
            at_ms: at.as_millis(),
        }
    }
}

/// Jumps the clock to its wake-up time when polled.
struct FakeSleep {
    now_ms: Rc<Cell<u64>>,
    at_ms: u64,
}

impl Future for FakeSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.now_ms.get() < self.at_ms {
            self.now_ms.set(self.at_ms);
        }
        Poll::Ready(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFault;

/// Reader replaying a fixed script, one entry per poll, then an empty field.
pub struct ScriptedReader {
    script: VecDeque<Result<Option<TagId>, ReadFault>>,
}

impl ScriptedReader {
    pub fn new(script: impl IntoIterator<Item = Result<Option<TagId>, ReadFault>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl TagReader for ScriptedReader {
    type Error = ReadFault;

    fn read_tag(&mut self) -> Result<Option<TagId>, ReadFault> {
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkFault;

struct LinkState {
    clock: FakeClock,
    up_from: Cell<Option<u64>>,
    hang: Cell<bool>,
    associate_calls: Cell<u32>,
    disconnect_calls: Cell<u32>,
}

/// Link that is up from a given virtual time on (never, with `None`).
#[derive(Clone)]
pub struct FakeLink {
    state: Rc<LinkState>,
}

impl FakeLink {
    pub fn up_from(clock: &FakeClock, up_from_ms: Option<u64>) -> Self {
        Self {
            state: Rc::new(LinkState {
                clock: clock.clone(),
                up_from: Cell::new(up_from_ms),
                hang: Cell::new(false),
                associate_calls: Cell::new(0),
                disconnect_calls: Cell::new(0),
            }),
        }
    }

    pub fn set_up_from(&self, up_from_ms: Option<u64>) {
        self.state.up_from.set(up_from_ms);
    }

    /// Make `associate` never resolve.
    pub fn hang_on_associate(&self, hang: bool) {
        self.state.hang.set(hang);
    }

    pub fn associate_calls(&self) -> u32 {
        self.state.associate_calls.get()
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.disconnect_calls.get()
    }

    fn up(&self) -> bool {
        self.state
            .up_from
            .get()
            .is_some_and(|from| self.state.clock.now_ms() >= from)
    }
}

impl WirelessLink for FakeLink {
    type Error = LinkFault;

    async fn associate(&mut self) -> Result<(), LinkFault> {
        let calls = &self.state.associate_calls;
        calls.set(calls.get() + 1);
        if self.state.hang.get() {
            core::future::pending::<()>().await;
        }
        if self.up() { Ok(()) } else { Err(LinkFault) }
    }

    fn is_up(&mut self) -> bool {
        self.up()
    }

    async fn disconnect(&mut self) {
        let calls = &self.state.disconnect_calls;
        calls.set(calls.get() + 1);
    }
}

/// How the fake server handles one exchange.
#[derive(Debug, Clone)]
pub enum TransportStep {
    /// Answer immediately with these raw bytes
    Respond(Vec<u8>),
    /// Answer immediately with a raw, possibly malformed, response
    Raw(&'static str),
    /// Answer with `status` and an empty JSON object after `after_ms`
    Delayed { after_ms: u64, status: u16 },
    /// Accept the request and never answer
    Silent,
    Fail(TransportError),
}

impl TransportStep {
    pub fn respond(status: u16, json: &str) -> Self {
        let raw = std::format!(
            "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            status,
            json.len(),
            json
        );
        Self::Respond(raw.into_bytes())
    }
}

#[derive(Default)]
struct TransportState {
    script: VecDeque<TransportStep>,
    requests: Vec<String>,
}

/// Transport answering from a script; an exhausted script refuses connections.
#[derive(Clone)]
pub struct FakeTransport {
    clock: FakeClock,
    state: Rc<RefCell<TransportState>>,
}

impl FakeTransport {
    pub fn new(clock: &FakeClock) -> Self {
        Self {
            clock: clock.clone(),
            state: Rc::default(),
        }
    }

    pub fn push(&self, step: TransportStep) {
        self.state.borrow_mut().script.push_back(step);
    }

    /// Every request written so far, as text.
    pub fn requests(&self) -> Vec<String> {
        self.state.borrow().requests.clone()
    }
}

fn copy_response(raw: &[u8], response: &mut [u8]) -> usize {
    let len = raw.len().min(response.len());
    response[..len].copy_from_slice(&raw[..len]);
    len
}

impl Transport for FakeTransport {
    async fn exchange(
        &mut self,
        _endpoint: &Endpoint<'_>,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, TransportError> {
        let step = {
            let mut state = self.state.borrow_mut();
            state
                .requests
                .push(String::from_utf8_lossy(request).into_owned());
            state.script.pop_front()
        };

        match step {
            None => Err(TransportError::Refused),
            Some(TransportStep::Respond(raw)) => Ok(copy_response(&raw, response)),
            Some(TransportStep::Raw(raw)) => Ok(copy_response(raw.as_bytes(), response)),
            Some(TransportStep::Delayed { after_ms, status }) => {
                let wake = Instant::from_millis(self.clock.now_ms() + after_ms);
                self.clock.sleep_until(wake).await;
                let raw = std::format!("HTTP/1.1 {} X\r\n\r\n{{}}", status);
                Ok(copy_response(raw.as_bytes(), response))
            }
            Some(TransportStep::Silent) => core::future::pending().await,
            Some(TransportStep::Fail(error)) => Err(error),
        }
    }
}

/// Indicator remembering every signal it was asked to show.
#[derive(Clone, Default)]
pub struct RecordingIndicator {
    history: Rc<RefCell<Vec<Signal>>>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Signal {
        self.history.borrow().last().copied().unwrap_or(Signal::Off)
    }

    pub fn history(&self) -> Vec<Signal> {
        self.history.borrow().clone()
    }
}

impl Indicator for RecordingIndicator {
    fn set(&mut self, signal: Signal) {
        self.history.borrow_mut().push(signal);
    }
}

#[derive(Clone, Default)]
pub struct RecordingConsole {
    lines: Rc<RefCell<Vec<String>>>,
}

impl RecordingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl Console for RecordingConsole {
    fn write_line(&mut self, line: fmt::Arguments<'_>) {
        self.lines.borrow_mut().push(std::fmt::format(line));
    }
}

//! Desktop simulator for the RFID check-in station.
//!
//! Runs the `checkin-core` station loop on the host. Tags are typed on stdin
//! as hex UIDs, the WiFi link is simulated, and check-ins go to the real
//! server over TCP so the pipeline can be exercised end to end.
//!
//! # Commands
//!
//! | Input       | Action                          |
//! |-------------|---------------------------------|
//! | `A1B2C3`    | Present the tag with this UID   |
//! | `wifi down` | Drop the simulated access point |
//! | `wifi up`   | Bring it back                   |
//!
//! Usage: `checkin-simulator [station.json]`. `RUST_LOG` controls log output
//! while `debug_enabled` is on; with it off the simulator stays silent.

use std::io::{self, BufRead, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use log::{error, info, warn};

use checkin_core::config::NetworkCredentials;
use checkin_core::error::TransportError;
use checkin_core::http::Endpoint;
use checkin_core::{
    CheckinStation, Console, DeviceConfig, Indicator, Signal, SystemClock, TagId, TagReader,
    Transport, WirelessLink,
};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Time the simulated access point takes to accept an association.
const ASSOCIATION_DELAY: Duration = Duration::from_millis(800);

/// Hard limit on each blocking socket call. An exchange abandoned at the
/// station's deadline keeps its worker thread until this runs out.
const SOCKET_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// How often the station task checks on an exchange running on its thread.
const EXCHANGE_POLL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Tag input
// ---------------------------------------------------------------------------

/// Reads commands from stdin on a helper thread so the station loop never blocks.
fn spawn_input_thread(tags: Sender<TagId>, access_point: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            match line {
                "" => {}
                "wifi down" => {
                    info!("Simulated access point switched off");
                    access_point.store(false, Ordering::Relaxed);
                }
                "wifi up" => {
                    info!("Simulated access point switched on");
                    access_point.store(true, Ordering::Relaxed);
                }
                _ => match TagId::from_hex(line) {
                    Some(tag) => {
                        if tags.send(tag).is_err() {
                            break;
                        }
                    }
                    None => warn!("Not a tag UID: {:?}", line),
                },
            }
        }
        info!("stdin closed, no more tags");
    });
}

#[derive(Debug)]
struct InputClosed;

/// A typed UID counts as one presentation: present for one poll, then gone.
struct StdinTagReader {
    tags: Receiver<TagId>,
}

impl TagReader for StdinTagReader {
    type Error = InputClosed;

    fn read_tag(&mut self) -> Result<Option<TagId>, InputClosed> {
        match self.tags.try_recv() {
            Ok(tag) => Ok(Some(tag)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(InputClosed),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated WiFi
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct AccessPointOff;

struct SimulatedLink {
    access_point: Arc<AtomicBool>,
    associated: bool,
}

impl WirelessLink for SimulatedLink {
    type Error = AccessPointOff;

    async fn associate(&mut self) -> Result<(), AccessPointOff> {
        Timer::after(ASSOCIATION_DELAY).await;
        self.associated = self.access_point.load(Ordering::Relaxed);
        if self.associated {
            Ok(())
        } else {
            Err(AccessPointOff)
        }
    }

    fn is_up(&mut self) -> bool {
        self.associated && self.access_point.load(Ordering::Relaxed)
    }

    async fn disconnect(&mut self) {
        self.associated = false;
    }
}

// ---------------------------------------------------------------------------
// Real TCP transport
// ---------------------------------------------------------------------------

/// Real TCP. The blocking socket calls run on a worker thread and the task
/// only polls for the result, so dropping the future at the deadline returns
/// control to the station at once and the executor never stalls.
struct StdTcpTransport;

fn classify_io(e: &io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::TimedOut,
        io::ErrorKind::ConnectionRefused => TransportError::Refused,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransportError::Reset,
        _ => TransportError::Io,
    }
}

/// One blocking request/response on a fresh connection, keeping at most
/// `capacity` response bytes.
fn blocking_exchange(
    host: &str,
    port: u16,
    request: &[u8],
    capacity: usize,
) -> Result<Vec<u8>, TransportError> {
    let address = (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addresses| addresses.next())
        .ok_or(TransportError::Dns)?;

    let mut stream =
        TcpStream::connect_timeout(&address, SOCKET_TIMEOUT).map_err(|e| classify_io(&e))?;
    stream
        .set_read_timeout(Some(SOCKET_TIMEOUT))
        .and_then(|_| stream.set_write_timeout(Some(SOCKET_TIMEOUT)))
        .map_err(|e| classify_io(&e))?;
    stream.write_all(request).map_err(|e| classify_io(&e))?;

    let mut response = vec![0; capacity];
    let mut received = 0;
    while received < capacity {
        match stream.read(&mut response[received..]) {
            Ok(0) => break,
            Ok(n) => received += n,
            Err(_) if received > 0 => break,
            Err(e) => return Err(classify_io(&e)),
        }
    }
    response.truncate(received);
    Ok(response)
}

impl Transport for StdTcpTransport {
    async fn exchange(
        &mut self,
        endpoint: &Endpoint<'_>,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, TransportError> {
        let host = endpoint.host.to_owned();
        let port = endpoint.port;
        let request = request.to_vec();
        let capacity = response.len();

        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            // The receiver is gone when the station stopped waiting.
            let _ = done_tx.send(blocking_exchange(&host, port, &request, capacity));
        });

        loop {
            match done_rx.try_recv() {
                Ok(result) => {
                    let received = result?;
                    response[..received.len()].copy_from_slice(&received);
                    return Ok(received.len());
                }
                Err(TryRecvError::Empty) => Timer::after(EXCHANGE_POLL).await,
                Err(TryRecvError::Disconnected) => return Err(TransportError::Io),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Status outputs
// ---------------------------------------------------------------------------

struct StdoutConsole;

impl Console for StdoutConsole {
    fn write_line(&mut self, line: core::fmt::Arguments<'_>) {
        println!("{}", line);
    }
}

/// Stands in for the two LEDs.
struct LogIndicator {
    shown: Signal,
}

impl Indicator for LogIndicator {
    fn set(&mut self, signal: Signal) {
        if signal == self.shown {
            return;
        }
        self.shown = signal;
        match signal {
            Signal::Off => info!("LEDs off"),
            Signal::Success => info!("Green LED on"),
            Signal::Error => info!("Red LED on"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration used when no file is given: defaults plus a simulated SSID.
fn default_config() -> DeviceConfig<'static> {
    DeviceConfig {
        network: NetworkCredentials {
            ssid: "simulated-ap",
            password: "",
        },
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args().nth(1);
    let text = match &path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                error!("Cannot read {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => String::new(),
    };

    let config = if text.is_empty() {
        info!("No configuration file given, using defaults");
        default_config()
    } else {
        match serde_json_core::from_str::<DeviceConfig<'_>>(&text) {
            Ok((config, _)) => config,
            Err(e) => {
                error!("Invalid configuration file: {:?}", e);
                std::process::exit(1);
            }
        }
    };

    // Same gating as the firmware: a quiet station prints nothing.
    log::set_max_level(config.features.log_ceiling(log::max_level()));
    info!("Starting check-in station simulator");

    let access_point = Arc::new(AtomicBool::new(true));
    let (tag_tx, tag_rx) = mpsc::channel();
    spawn_input_thread(tag_tx, access_point.clone());
    info!("Type a tag UID in hex and press enter; 'wifi down' / 'wifi up' toggles the link");

    let station = CheckinStation::new(
        &config,
        SystemClock,
        StdinTagReader { tags: tag_rx },
        SimulatedLink {
            access_point,
            associated: false,
        },
        StdTcpTransport,
        LogIndicator { shown: Signal::Off },
        StdoutConsole,
    );

    match station {
        Ok(mut station) => station.run().await,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    }
}

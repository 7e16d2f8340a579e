//! Station console on UART0, the USB serial port of a devkit
//!
//! The web scanner page reads `RFID: <HEX>` lines from this port at
//! [`CONSOLE_BAUD`]. `log` output stays on RTT so the two never interleave.

use core::fmt::{self, Write};

use checkin_core::Console;
use esp_hal::Blocking;
use esp_hal::uart::UartTx;

/// Baud rate the web scanner opens the port with.
pub const CONSOLE_BAUD: u32 = 115_200;

pub struct SerialConsole<'d> {
    tx: UartTx<'d, Blocking>,
}

impl<'d> SerialConsole<'d> {
    pub fn new(tx: UartTx<'d, Blocking>) -> Self {
        Self { tx }
    }
}

impl Console for SerialConsole<'_> {
    fn write_line(&mut self, line: fmt::Arguments<'_>) {
        // A console that cannot be written must not stop a check-in.
        let _ = write!(self.tx, "{}\r\n", line);
    }
}

//! ESP32 bindings for the RFID check-in station
//!
//! Implements the `checkin-core` capability traits on real hardware: the
//! MFRC522 reader on SPI, the esp-radio WiFi station, TCP through
//! embassy-net and the RTT console.

#![no_std]

extern crate alloc;

pub mod config;
pub mod console;
pub mod reader;
pub mod transport;
pub mod wifi;

//! MFRC522 tag reader on SPI

use checkin_core::{TagId, TagReader};
use embedded_hal::spi::SpiDevice;
use log::info;
use mfrc522::comm::blocking::spi::SpiInterface;
use mfrc522::{Initialized, Mfrc522};
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderError {
    #[error("reader did not answer during init")]
    Init,
    #[error("anticollision/select failed")]
    Select,
    #[error("UID longer than supported")]
    UidTooLong,
}

pub struct Mfrc522Reader<D: SpiDevice> {
    device: Mfrc522<SpiInterface<D>, Initialized>,
}

impl<D: SpiDevice> Mfrc522Reader<D> {
    pub fn new(spi: D) -> Result<Self, ReaderError> {
        let mut device = Mfrc522::new(SpiInterface::new(spi))
            .init()
            .map_err(|_| ReaderError::Init)?;

        if let Ok(version) = device.version() {
            info!("MFRC522 ready, version 0x{:02X}", version);
        }

        Ok(Self { device })
    }
}

impl<D: SpiDevice> TagReader for Mfrc522Reader<D> {
    type Error = ReaderError;

    /// Wake any card in the field (halted ones included), select it and halt it
    /// again, so a card resting on the reader answers every poll.
    fn read_tag(&mut self) -> Result<Option<TagId>, ReaderError> {
        let Ok(atqa) = self.device.wupa() else {
            return Ok(None);
        };

        let uid = self
            .device
            .select(&atqa)
            .map_err(|_| ReaderError::Select)?;
        let _ = self.device.hlta();

        TagId::from_bytes(uid.as_bytes())
            .map(Some)
            .ok_or(ReaderError::UidTooLong)
    }
}

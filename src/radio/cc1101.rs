//! SPI driver for a CC1101 attached to the access point.
//!
//! The CC1101 has no DMA of its own; the "DMA" half of [`Transceiver`] is
//! served from the 64 byte FIFOs with burst transfers. Chip select is a
//! plain GPIO so that one [`SpiBus`] can be shared with other peripherals.
//!
//! ## Header byte
//!
//! | bit 7 | bit 6 | bits 5..0 |
//! |-------|-------|-----------|
//! | read  | burst | address   |
//!
//! Status registers (`0x30..=0x3d`) share their addresses with the strobes
//! and are only reachable with both bits set.

use super::regs::LAST_CONFIG_REG;
use super::transceiver::{Strobe, Transceiver};
use crate::consts::{RADIO_MAX_PACKET_LEN, RX_SLOT_LEN};
use crate::error::BusError;
use crate::fmt::HexDump;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

const READ: u8 = 0x80;
const BURST: u8 = 0x40;

const PARTNUM: u8 = 0x30;
const VERSION: u8 = 0x31;
const MARCSTATE: u8 = 0x35;
const TXBYTES: u8 = 0x3a;
const RXBYTES: u8 = 0x3b;
const PATABLE: u8 = 0x3e;
const FIFO: u8 = 0x3f;

const MARCSTATE_IDLE: u8 = 0x01;
const MARCSTATE_MASK: u8 = 0x1f;
const FIFO_OVERFLOW: u8 = 0x80;
const FIFO_COUNT_MASK: u8 = 0x7f;

/// Silicon revisions reported in `VERSION` by known CC1101 parts.
const KNOWN_VERSIONS: [u8; 3] = [0x04, 0x14, 0x17];

/// A CC1101 on an SPI bus with a GPIO chip select.
#[derive(Debug)]
pub struct Cc1101<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> Cc1101<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// Creates the driver. The chip is not touched until the first call.
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Returns the bus and the chip select.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    fn selected<R>(
        &mut self,
        f: impl FnOnce(&mut SPI) -> Result<R, SPI::Error>,
    ) -> Result<R, BusError> {
        self.cs.set_low().map_err(|_| BusError::Pin)?;
        let result = f(&mut self.spi).and_then(|r| self.spi.flush().map(|_| r));
        self.cs.set_high().map_err(|_| BusError::Pin)?;
        result.map_err(|_| BusError::Spi)
    }

    fn read_status(&mut self, addr: u8) -> Result<u8, BusError> {
        let mut buf = [addr | READ | BURST, 0];
        self.selected(|spi| spi.transfer_in_place(&mut buf))?;
        Ok(buf[1])
    }

    /// Reads every configuration register and logs them as a hex dump.
    pub fn dump_registers(&mut self) -> Result<(), BusError> {
        let mut regs = [0u8; LAST_CONFIG_REG as usize + 1];
        for (addr, value) in regs.iter_mut().enumerate() {
            *value = self.read_reg(addr as u8)?;
        }
        trace!("CC1101 registers:\n{}", HexDump(&regs));
        Ok(())
    }
}

impl<SPI, CS> Transceiver for Cc1101<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    fn is_present(&mut self) -> Result<bool, BusError> {
        let part = self.read_status(PARTNUM)?;
        let version = self.read_status(VERSION)?;
        debug!("CC1101 partnum {:#x} version {:#x}", part, version);
        Ok(part == 0 && KNOWN_VERSIONS.contains(&version))
    }

    fn reset(&mut self) -> Result<(), BusError> {
        self.strobe(Strobe::Sres)
    }

    fn write_reg(&mut self, addr: u8, value: u8) -> Result<(), BusError> {
        self.selected(|spi| spi.write(&[addr, value]))
    }

    fn read_reg(&mut self, addr: u8) -> Result<u8, BusError> {
        let mut buf = [addr | READ, 0];
        self.selected(|spi| spi.transfer_in_place(&mut buf))?;
        Ok(buf[1])
    }

    fn write_pa(&mut self, value: u8) -> Result<(), BusError> {
        self.write_reg(PATABLE, value)
    }

    fn strobe(&mut self, strobe: Strobe) -> Result<(), BusError> {
        self.selected(|spi| spi.write(&[strobe.addr()]))
    }

    fn is_idle(&mut self) -> Result<bool, BusError> {
        Ok(self.read_status(MARCSTATE)? & MARCSTATE_MASK == MARCSTATE_IDLE)
    }

    fn arm_rx(&mut self) -> Result<(), BusError> {
        self.strobe(Strobe::Sfrx)
    }

    fn read_frame(&mut self, slot: &mut [u8; RX_SLOT_LEN]) -> Result<bool, BusError> {
        let rx_bytes = self.read_status(RXBYTES)?;
        if rx_bytes & FIFO_OVERFLOW != 0 {
            warn!("CC1101 RX FIFO overflow");
            return Ok(false);
        }
        if rx_bytes & FIFO_COUNT_MASK == 0 {
            return Ok(false);
        }
        let len = self.read_status(FIFO)?;
        slot[0] = len;
        // An oversized length fails validation; read what fits so the slot stays coherent.
        let count = usize::from(len.min(RADIO_MAX_PACKET_LEN)) + 2;
        let body = &mut slot[1..=count];
        self.selected(|spi| {
            spi.write(&[FIFO | READ | BURST])?;
            spi.read(body)
        })?;
        Ok(true)
    }

    fn load_tx(&mut self, frame: &[u8]) -> Result<(), BusError> {
        self.strobe(Strobe::Sftx)?;
        if frame.is_empty() {
            return Ok(());
        }
        self.selected(|spi| {
            spi.write(&[FIFO | BURST])?;
            spi.write(frame)
        })
    }

    fn tx_done(&mut self) -> Result<bool, BusError> {
        let pending = self.read_status(TXBYTES)? & FIFO_COUNT_MASK;
        Ok(pending == 0 && self.is_idle()?)
    }
}

//! External SPI NOR flash holding images and settings.
//!
//! The renderer and the settings store only need 24-bit addressed reads,
//! page-programmed writes and sector erases; [`SerialFlash`] is that
//! contract. [`SpiFlash`] implements it for the usual JEDEC command set.

use crate::consts::{FLASH_PAGE_SIZE, FLASH_SECTOR_SIZE};
use crate::error::{BusError, FlashError};
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// Byte-addressed serial flash.
pub trait SerialFlash {
    /// Reads `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Programs `data` at `addr`. The range must have been erased.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Erases `count` 4 KiB sectors starting at the sector aligned `addr`.
    fn erase_sectors(&mut self, addr: u32, count: u16) -> Result<(), FlashError>;

    /// Leaves deep power down.
    fn wake(&mut self) -> Result<(), FlashError> {
        Ok(())
    }

    /// Enters deep power down.
    fn power_down(&mut self) -> Result<(), FlashError> {
        Ok(())
    }
}

const CMD_READ: u8 = 0x03;
const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_PAGE_PROGRAM: u8 = 0x02;
const CMD_READ_STATUS: u8 = 0x05;
const CMD_ERASE_4K: u8 = 0x20;
const CMD_ERASE_32K: u8 = 0x52;
const CMD_ERASE_64K: u8 = 0xd8;
const CMD_POWER_DOWN: u8 = 0xb9;
const CMD_WAKE: u8 = 0xab;

const STATUS_BUSY: u8 = 0x01;

/// Splits a write at `addr` of `len` bytes into `(addr, offset, len)` page-sized pieces.
pub fn page_chunks(addr: u32, len: usize) -> impl Iterator<Item = (u32, usize, usize)> {
    let mut addr = addr;
    let mut offset = 0usize;
    core::iter::from_fn(move || {
        if offset >= len {
            return None;
        }
        let room = (FLASH_PAGE_SIZE - (addr & (FLASH_PAGE_SIZE - 1))) as usize;
        let now = room.min(len - offset);
        let chunk = (addr, offset, now);
        addr += now as u32;
        offset += now;
        Some(chunk)
    })
}

fn addr_bytes(cmd: u8, addr: u32) -> [u8; 4] {
    [cmd, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

/// A JEDEC SPI NOR flash on an SPI bus with a GPIO chip select.
#[derive(Debug)]
pub struct SpiFlash<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> SpiFlash<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// Creates the driver.
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
    ) -> Result<R, FlashError> {
        self.cs.set_low().map_err(|_| BusError::Pin)?;
        let result = f(&mut self.spi).and_then(|r| self.spi.flush().map(|_| r));
        self.cs.set_high().map_err(|_| BusError::Pin)?;
        result.map_err(|_| FlashError::Bus(BusError::Spi))
    }

    fn command(&mut self, cmd: u8) -> Result<(), FlashError> {
        self.selected(|spi| spi.write(&[cmd]))
    }

    fn wait_ready(&mut self) -> Result<(), FlashError> {
        self.selected(|spi| {
            spi.write(&[CMD_READ_STATUS])?;
            let mut status = [STATUS_BUSY];
            while status[0] & STATUS_BUSY != 0 {
                spi.read(&mut status)?;
            }
            Ok(())
        })
    }
}

impl<SPI, CS> SerialFlash for SpiFlash<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.selected(|spi| {
            spi.write(&addr_bytes(CMD_READ, addr))?;
            spi.read(buf)
        })
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        for (page_addr, offset, len) in page_chunks(addr, data.len()) {
            self.command(CMD_WRITE_ENABLE)?;
            let chunk = &data[offset..offset + len];
            self.selected(|spi| {
                spi.write(&addr_bytes(CMD_PAGE_PROGRAM, page_addr))?;
                spi.write(chunk)
            })?;
            self.wait_ready()?;
        }
        Ok(())
    }

    fn erase_sectors(&mut self, addr: u32, count: u16) -> Result<(), FlashError> {
        if addr & (FLASH_SECTOR_SIZE - 1) != 0 {
            return Err(FlashError::Misaligned(addr));
        }
        let mut addr = addr;
        let mut left = count;
        while left > 0 {
            let (cmd, sectors) = if left >= 16 && addr & 0xffff == 0 {
                (CMD_ERASE_64K, 16)
            } else if left >= 8 && addr & 0x7fff == 0 {
                (CMD_ERASE_32K, 8)
            } else {
                (CMD_ERASE_4K, 1)
            };
            self.command(CMD_WRITE_ENABLE)?;
            self.selected(|spi| spi.write(&addr_bytes(cmd, addr)))?;
            self.wait_ready()?;
            addr += FLASH_SECTOR_SIZE * u32::from(sectors);
            left -= sectors;
        }
        Ok(())
    }

    fn wake(&mut self) -> Result<(), FlashError> {
        self.command(CMD_WAKE)
    }

    fn power_down(&mut self) -> Result<(), FlashError> {
        self.command(CMD_POWER_DOWN)
    }
}

//! In-memory stand-ins for the chips around the core, shared by the unit tests.

use crate::battery::VoltageMonitor;
use crate::consts::{FLASH_SECTOR_SIZE, RX_SLOT_LEN};
use crate::display::cmd;
use crate::display::epd::EpdControl;
use crate::error::{BusError, FlashError};
use crate::flash::SerialFlash;
use crate::radio::{Strobe, Transceiver};
use core::convert::Infallible;
use embedded_hal::spi::{ErrorType, SpiBus};
use std::collections::VecDeque;

/// Flattens a command table into the bytes it puts on the wire.
pub fn table_bytes(table: &[u8]) -> Vec<u8> {
    cmd::entries(table)
        .flat_map(|(c, d)| core::iter::once(c).chain(d.iter().copied()))
        .collect()
}

/// A transceiver that records what it is told and replays queued frames.
#[derive(Debug)]
pub struct FakeChip {
    pub present: bool,
    pub regs: [u8; 0x2f],
    pub pa: u8,
    pub resets: u32,
    pub writes: Vec<(u8, u8)>,
    pub strobes: Vec<Strobe>,
    pub rx_arms: u32,
    pub irq_clears: u32,
    /// `tx_done` polls that report "not yet" before the next one succeeds.
    pub tx_polls: u32,
    pub sent: Vec<Vec<u8>>,
    /// `read_frame` fails with a bus error while set.
    pub fail_reads: bool,
    frames: VecDeque<Vec<u8>>,
}

impl FakeChip {
    pub fn new() -> Self {
        Self {
            present: true,
            regs: [0; 0x2f],
            pa: 0,
            resets: 0,
            writes: Vec::new(),
            strobes: Vec::new(),
            rx_arms: 0,
            irq_clears: 0,
            tx_polls: 0,
            sent: Vec::new(),
            fail_reads: false,
            frames: VecDeque::new(),
        }
    }

    /// Queues a frame for the next `read_frame`, with its two status bytes.
    pub fn queue_frame(&mut self, payload: &[u8], rssi: u8, lqi_crc: u8) {
        let mut frame = Vec::with_capacity(payload.len() + 3);
        frame.push(payload.len() as u8);
        frame.extend_from_slice(payload);
        frame.extend([rssi, lqi_crc]);
        self.frames.push_back(frame);
    }
}

impl Transceiver for FakeChip {
    fn is_present(&mut self) -> Result<bool, BusError> {
        Ok(self.present)
    }

    fn reset(&mut self) -> Result<(), BusError> {
        self.resets += 1;
        Ok(())
    }

    fn write_reg(&mut self, addr: u8, value: u8) -> Result<(), BusError> {
        self.writes.push((addr, value));
        if let Some(reg) = self.regs.get_mut(usize::from(addr)) {
            *reg = value;
        }
        Ok(())
    }

    fn read_reg(&mut self, addr: u8) -> Result<u8, BusError> {
        Ok(self.regs.get(usize::from(addr)).copied().unwrap_or(0))
    }

    fn write_pa(&mut self, value: u8) -> Result<(), BusError> {
        self.pa = value;
        Ok(())
    }

    fn strobe(&mut self, strobe: Strobe) -> Result<(), BusError> {
        self.strobes.push(strobe);
        Ok(())
    }

    fn is_idle(&mut self) -> Result<bool, BusError> {
        Ok(true)
    }

    fn arm_rx(&mut self) -> Result<(), BusError> {
        self.rx_arms += 1;
        Ok(())
    }

    fn read_frame(&mut self, slot: &mut [u8; RX_SLOT_LEN]) -> Result<bool, BusError> {
        if self.fail_reads {
            return Err(BusError::Spi);
        }
        match self.frames.pop_front() {
            Some(frame) => {
                slot[..frame.len()].copy_from_slice(&frame);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn load_tx(&mut self, frame: &[u8]) -> Result<(), BusError> {
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn tx_done(&mut self) -> Result<bool, BusError> {
        if self.tx_polls == 0 {
            return Ok(true);
        }
        self.tx_polls -= 1;
        Ok(false)
    }

    fn clear_irqs(&mut self) -> Result<(), BusError> {
        self.irq_clears += 1;
        Ok(())
    }
}

/// A battery that cycles through fixed raw readings; one count is 3 mV.
#[derive(Debug)]
pub struct FakeBattery {
    values: Vec<u16>,
    next: usize,
}

impl FakeBattery {
    pub fn new(values: &[u16]) -> Self {
        Self {
            values: values.to_vec(),
            next: 0,
        }
    }
}

impl VoltageMonitor for FakeBattery {
    fn sample_raw(&mut self) -> u16 {
        let raw = self.values[self.next % self.values.len()];
        self.next += 1;
        raw
    }

    fn to_millivolts(&self, raw: u16) -> u16 {
        raw * 3
    }
}

/// NOR flash in RAM: erase sets bytes to `0xff`, programming can only clear bits.
#[derive(Debug)]
pub struct FakeFlash {
    mem: Vec<u8>,
    pub erases: u32,
    pub writes: u32,
    pub awake: bool,
}

impl FakeFlash {
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0xff; size],
            erases: 0,
            writes: 0,
            awake: false,
        }
    }
}

impl SerialFlash for FakeFlash {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let start = addr as usize;
        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let start = addr as usize;
        for (cell, &b) in self.mem[start..start + data.len()].iter_mut().zip(data) {
            *cell &= b;
        }
        self.writes += 1;
        Ok(())
    }

    fn erase_sectors(&mut self, addr: u32, count: u16) -> Result<(), FlashError> {
        if addr % FLASH_SECTOR_SIZE != 0 {
            return Err(FlashError::Misaligned(addr));
        }
        let start = addr as usize;
        let len = FLASH_SECTOR_SIZE as usize * usize::from(count);
        self.mem[start..start + len].fill(0xff);
        self.erases += 1;
        Ok(())
    }

    fn wake(&mut self) -> Result<(), FlashError> {
        self.awake = true;
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), FlashError> {
        self.awake = false;
        Ok(())
    }
}

/// Panel control lines as plain flags, with a scripted busy line.
#[derive(Debug)]
pub struct FakeControl {
    pub powered: bool,
    pub attached: bool,
    pub reset_asserted: bool,
    pub power_cycles: u32,
    /// `select` calls that included the slave controller.
    pub cascade_selects: u32,
    pub selected: bool,
    pub parked: bool,
    busy: VecDeque<bool>,
}

impl FakeControl {
    pub fn new() -> Self {
        Self {
            powered: false,
            attached: false,
            reset_asserted: true,
            power_cycles: 0,
            cascade_selects: 0,
            selected: false,
            parked: false,
            busy: VecDeque::new(),
        }
    }

    /// Busy readings for the next `is_busy` calls; idle once they run out.
    pub fn script_busy(&mut self, levels: &[bool]) {
        self.busy = levels.iter().copied().collect();
    }
}

impl EpdControl for FakeControl {
    fn select(&mut self, cascade: bool) -> Result<(), BusError> {
        if cascade {
            self.cascade_selects += 1;
        }
        self.selected = true;
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), BusError> {
        self.selected = false;
        Ok(())
    }

    fn set_command_mode(&mut self, _command: bool) -> Result<(), BusError> {
        Ok(())
    }

    fn set_reset(&mut self, asserted: bool) -> Result<(), BusError> {
        self.reset_asserted = asserted;
        Ok(())
    }

    fn set_power(&mut self, on: bool) -> Result<(), BusError> {
        if on {
            self.power_cycles += 1;
            self.parked = false;
        }
        self.powered = on;
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool, BusError> {
        Ok(self.busy.pop_front().unwrap_or(false))
    }

    fn park(&mut self) -> Result<(), BusError> {
        self.parked = true;
        Ok(())
    }

    fn attach_bus(&mut self) -> Result<(), BusError> {
        self.attached = true;
        Ok(())
    }

    fn detach_bus(&mut self) -> Result<(), BusError> {
        self.attached = false;
        Ok(())
    }
}

/// An SPI bus that keeps every byte written to it.
#[derive(Debug)]
pub struct RecordingSpi {
    pub written: Vec<u8>,
}

impl RecordingSpi {
    pub fn new() -> Self {
        Self {
            written: Vec::new(),
        }
    }
}

impl ErrorType for RecordingSpi {
    type Error = Infallible;
}

impl SpiBus<u8> for RecordingSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        words.fill(0);
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.written.extend_from_slice(words);
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.written.extend_from_slice(write);
        read.fill(0);
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.written.extend_from_slice(words);
        words.fill(0);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

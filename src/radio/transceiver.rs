//! The seam between the radio link and a concrete transceiver.
//!
//! [`Radio`](super::Radio) owns the state machine and the receive ring; a
//! [`Transceiver`] only moves bytes and strobes. On the CC1110 the "DMA"
//! methods drive the SoC's DMA channels; on an SPI attached CC1101 they
//! move the FIFO contents with burst transfers (see [`Cc1101`](super::Cc1101)).

use crate::consts::RX_SLOT_LEN;
use crate::error::BusError;

/// Command strobes shared by the CC1101 and CC1110.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum Strobe {
    /// Reset chip.
    Sres = 0x30,
    /// Enable and calibrate the frequency synthesizer.
    Sfstxon = 0x31,
    /// Turn off the crystal oscillator.
    Sxoff = 0x32,
    /// Calibrate the frequency synthesizer and turn it off.
    Scal = 0x33,
    /// Enable RX.
    Srx = 0x34,
    /// Enable TX.
    Stx = 0x35,
    /// Exit RX/TX, turn off the frequency synthesizer.
    Sidle = 0x36,
    /// Start automatic RX polling sequence.
    Swor = 0x38,
    /// Enter power down mode when CSn goes high.
    Spwd = 0x39,
    /// Flush the RX FIFO.
    Sfrx = 0x3a,
    /// Flush the TX FIFO.
    Sftx = 0x3b,
    /// No operation, returns the status byte.
    Snop = 0x3d,
}

impl Strobe {
    /// The command byte.
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

/// Low-level access to a CC1101/CC1110 class transceiver.
pub trait Transceiver {
    /// Checks the chip identity.
    fn is_present(&mut self) -> Result<bool, BusError>;

    /// Resets the chip. The chip is idle afterwards once [`Transceiver::is_idle`] says so.
    fn reset(&mut self) -> Result<(), BusError>;

    /// Writes one configuration register.
    fn write_reg(&mut self, addr: u8, value: u8) -> Result<(), BusError>;

    /// Reads one configuration register.
    fn read_reg(&mut self, addr: u8) -> Result<u8, BusError>;

    /// Programs the PA gain code used for transmission.
    fn write_pa(&mut self, value: u8) -> Result<(), BusError>;

    /// Issues a command strobe.
    fn strobe(&mut self, strobe: Strobe) -> Result<(), BusError>;

    /// Whether the main radio state machine is idle.
    fn is_idle(&mut self) -> Result<bool, BusError>;

    /// Arms reception of the next frame.
    fn arm_rx(&mut self) -> Result<(), BusError>;

    /// Moves a completed frame into `slot` as `[len][payload][rssi][lqi|crc]`.
    ///
    /// # Returns
    /// - `Ok(true)` when a frame was copied
    /// - `Ok(false)` when the chip had nothing to deliver
    fn read_frame(&mut self, slot: &mut [u8; RX_SLOT_LEN]) -> Result<bool, BusError>;

    /// Loads `frame` (length byte first) for transmission.
    fn load_tx(&mut self, frame: &[u8]) -> Result<(), BusError>;

    /// Whether the last transmission has left the air.
    fn tx_done(&mut self) -> Result<bool, BusError>;

    /// Stops any DMA transfer in flight.
    fn abort_dma(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    /// Clears pending radio interrupt flags.
    fn clear_irqs(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

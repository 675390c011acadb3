//! Error types returned by the radio link, the display pipeline and the flash driver.
//!
//! Every fallible operation returns to its immediate caller; nothing in this
//! crate retries. "No packet waiting" is not an error: [`Radio::receive`]
//! reports it as [`nb::Error::WouldBlock`].
//!
//! [`Radio::receive`]: crate::radio::Radio::receive

use thiserror::Error;

/// A failed transaction on the bus shared with a peripheral chip.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum BusError {
    /// The SPI peripheral reported an error.
    #[error("SPI transfer failed")]
    Spi,
    /// A chip-select or control line could not be driven or read.
    #[error("GPIO access failed")]
    Pin,
}

/// Errors of the radio link.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RadioError {
    /// The transceiver did not answer with the expected part number.
    #[error("transceiver not found")]
    ChipNotFound,
    /// [`Radio::init`](crate::radio::Radio::init) has not completed.
    #[error("radio not initialized")]
    NotInitialized,
    /// The radio was initialized but is not enabled.
    #[error("radio not enabled")]
    NotEnabled,
    /// The transmit-done flag never came up within the configured poll limit.
    #[error("transmit did not complete")]
    TransmitFailed,
    /// The transceiver did not reach the idle state within the poll limit.
    #[error("timed out waiting for the transceiver")]
    Timeout,
    /// The frame does not fit the transceiver's packet length.
    #[error("frame of {0} bytes is too long")]
    InvalidFrame(usize),
    /// The carrier-wave test is running; normal traffic is suspended.
    #[error("carrier test mode active")]
    TestModeActive,
    /// The bus to the transceiver failed.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

/// Errors of the external serial flash.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FlashError {
    /// The bus to the flash failed.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    /// Erase requests must start on a sector boundary.
    #[error("address {0:#x} is not sector aligned")]
    Misaligned(u32),
    /// Data read back after programming differs from what was written.
    #[error("verify failed at {0:#x}")]
    VerifyFailed(u32),
}

/// Errors of the display pipeline.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum DisplayError {
    /// The image header names a data type the pipeline cannot decode.
    #[error("unsupported image data type {0:#04x}")]
    UnsupportedImageFormat(u8),
    /// The panel busy line did not settle within the configured timeout.
    #[error("panel stayed busy")]
    BusyTimeout,
    /// The scratch buffer cannot hold one part of the configured panel.
    #[error("scratch buffer too small, need {0} bytes")]
    ScratchTooSmall(usize),
    /// The panel geometry cannot be split into whole parts of whole bytes.
    #[error("invalid panel geometry")]
    InvalidGeometry,
    /// The image at the given address runs past the end of the address space.
    #[error("image at {0:#x} is out of range")]
    OutOfRange(u32),
    /// The bus to the panel failed.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    /// Reading the image from flash failed.
    #[error("flash error: {0}")]
    Flash(#[from] FlashError),
}

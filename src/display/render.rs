//! Part-streaming renderer.
//!
//! [`Display`] drives one frame through the [`Epd`] part by part: fill the
//! canvas (from flash, or by calling back into the application once per
//! scanline), repack it into the controller's pixel codes, stream it, move
//! on. After the last pass the panel refreshes and powers down.

use super::canvas::Canvas;
use super::epd::{Epd, EpdControl};
use super::{Geometry, Plane};
use crate::battery::VoltageMonitor;
use crate::error::DisplayError;
use crate::flash::SerialFlash;
use crate::fmt::HexDump;
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiBus;

/// Length of the image header in front of the pixel data.
pub const IMAGE_HEADER_LEN: usize = 21;

/// `version:u64, valid:u32, size:u32`, then the type byte.
const IMAGE_DATA_TYPE_OFFSET: usize = 16;

/// Pixel data formats an image in flash may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ImageFormat {
    /// One plane, monochrome only.
    Raw1bpp,
    /// Monochrome plane followed by the accent plane.
    Raw2bpp,
}

impl ImageFormat {
    /// Maps the header's data type byte, `None` when unsupported.
    pub fn from_data_type(data_type: u8) -> Option<Self> {
        match data_type {
            0x20 => Some(ImageFormat::Raw1bpp),
            0x21 => Some(ImageFormat::Raw2bpp),
            _ => None,
        }
    }

    fn has_accent(self) -> bool {
        self == ImageFormat::Raw2bpp
    }
}

/// The panel together with its scratch canvas.
#[derive(Debug)]
pub struct Display<SPI, C, const N: usize> {
    epd: Epd<SPI, C>,
    canvas: Canvas<N>,
}

impl<SPI, C, const N: usize> Display<SPI, C, N>
where
    SPI: SpiBus<u8>,
    C: EpdControl,
{
    /// Pairs the engine with a canvas for `geometry`.
    ///
    /// # Returns
    /// `Err(DisplayError::ScratchTooSmall)` if `N` cannot hold one part.
    pub fn new(epd: Epd<SPI, C>, geometry: Geometry) -> Result<Self, DisplayError> {
        Ok(Self {
            epd,
            canvas: Canvas::new(geometry)?,
        })
    }

    /// The transfer engine.
    pub fn epd(&self) -> &Epd<SPI, C> {
        &self.epd
    }

    /// The transfer engine, e.g. to shut the panel down early.
    pub fn epd_mut(&mut self) -> &mut Epd<SPI, C> {
        &mut self.epd
    }

    /// The canvas as left by the last draw.
    pub fn canvas(&self) -> &Canvas<N> {
        &self.canvas
    }

    /// Returns the transfer engine.
    pub fn release(self) -> Epd<SPI, C> {
        self.epd
    }

    /// Shows the image stored at `addr` of the serial flash.
    ///
    /// The header is checked before anything reaches the panel, so an
    /// unsupported image leaves the previous picture on screen. A 1bpp
    /// image gets a blank accent plane.
    ///
    /// # Returns
    /// - `Err(DisplayError::UnsupportedImageFormat)` for an unknown data type
    /// - `Err(DisplayError::OutOfRange)` if the image would run past `u32::MAX`
    /// - otherwise the first bus, flash or busy error
    pub fn draw_image_at_address<F, D, B>(
        &mut self,
        flash: &mut F,
        delay: &mut D,
        battery: &mut B,
        addr: u32,
    ) -> Result<(), DisplayError>
    where
        F: SerialFlash + ?Sized,
        D: DelayNs,
        B: VoltageMonitor + ?Sized,
    {
        let Some(mut src) = addr.checked_add(IMAGE_HEADER_LEN as u32) else {
            warn!("display: image header at {:#x} out of range", addr);
            return Err(DisplayError::OutOfRange(addr));
        };
        flash.wake()?;
        let mut header = [0u8; IMAGE_HEADER_LEN];
        flash.read(addr, &mut header)?;
        let data_type = header[IMAGE_DATA_TYPE_OFFSET];
        let Some(format) = ImageFormat::from_data_type(data_type) else {
            warn!("display: unsupported image type {:#x} at {:#x}", data_type, addr);
            warn!("{}", HexDump(&header));
            flash.power_down()?;
            return Err(DisplayError::UnsupportedImageFormat(data_type));
        };

        let geometry = *self.canvas.geometry();
        let part_len = geometry.bytes_per_part() as u32;
        let plane_len = geometry.bytes_per_plane() as u32;
        let planes = if format.has_accent() { 2 } else { 1 };
        if src.checked_add(plane_len * planes).is_none() {
            warn!("display: image at {:#x} runs out of range", addr);
            flash.power_down()?;
            return Err(DisplayError::OutOfRange(addr));
        }
        info!("display: image {:?} at {:#x}", format, addr);
        let streamed = self.stream_passes(delay, |canvas| {
            let pass = canvas.pass();
            let part = canvas.part_mut();
            if geometry.packed() {
                let (mono, accent) = part.split_at_mut(geometry.bytes_per_part());
                flash.read(src, mono)?;
                if format.has_accent() {
                    flash.read(src + plane_len, accent)?;
                } else {
                    accent.fill(0);
                }
            } else if pass == Plane::Accent && !format.has_accent() {
                part.fill(0);
                return Ok(());
            } else {
                flash.read(src, part)?;
            }
            src += part_len;
            Ok(())
        });
        let parked = flash.power_down();
        self.finish(streamed, delay, battery)?;
        parked?;
        Ok(())
    }

    /// Draws a screen composed by `draw`.
    ///
    /// `draw` runs once per scanline of every pass with the canvas positioned
    /// on that line; it paints through the canvas primitives, which clip to
    /// the current part.
    pub fn draw_screen<D, B>(
        &mut self,
        delay: &mut D,
        battery: &mut B,
        mut draw: impl FnMut(&mut Canvas<N>),
    ) -> Result<(), DisplayError>
    where
        D: DelayNs,
        B: VoltageMonitor + ?Sized,
    {
        info!("display: draw screen");
        let lines = self.canvas.geometry().lines_per_part;
        let streamed = self.stream_passes(delay, |canvas| {
            canvas.clear_part();
            for _ in 0..lines {
                draw(canvas);
                canvas.next_line();
            }
            Ok(())
        });
        self.finish(streamed, delay, battery)
    }

    fn stream_passes<D: DelayNs>(
        &mut self,
        delay: &mut D,
        mut fill: impl FnMut(&mut Canvas<N>) -> Result<(), DisplayError>,
    ) -> Result<(), DisplayError> {
        let geometry = *self.canvas.geometry();
        for &pass in geometry.passes() {
            self.epd.start_transfer(delay, pass)?;
            self.epd.begin_data()?;
            self.canvas.begin_pass(pass);
            for _ in 0..geometry.parts() {
                fill(&mut self.canvas)?;
                self.send_part()?;
                self.canvas.next_part();
            }
            self.epd.end_data()?;
            debug!("display: pass {:?} sent", pass);
        }
        Ok(())
    }

    fn send_part(&mut self) -> Result<(), DisplayError> {
        let geometry = *self.canvas.geometry();
        let pass = self.canvas.pass();
        let part = self.canvas.buffer();
        let (data, accent) = if geometry.packed() {
            part.split_at(geometry.bytes_per_part())
        } else {
            (part, &[][..])
        };
        for (i, &byte) in data.iter().enumerate() {
            let accent = accent.get(i).copied().unwrap_or(0);
            for &out in geometry.pack(pass, byte, accent).iter() {
                self.epd.send_byte(out)?;
            }
        }
        Ok(())
    }

    fn finish<D, B>(
        &mut self,
        streamed: Result<(), DisplayError>,
        delay: &mut D,
        battery: &mut B,
    ) -> Result<(), DisplayError>
    where
        D: DelayNs,
        B: VoltageMonitor + ?Sized,
    {
        if let Err(e) = streamed {
            error!("display: transfer failed: {}", e);
            let _ = self.epd.shutdown();
            return Err(e);
        }
        self.epd.refresh_and_sleep(delay, battery)
    }
}

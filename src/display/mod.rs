//! E-paper rendering pipeline.
//!
//! The tag has far less RAM than one frame needs, so a frame is streamed in
//! *parts*: a handful of scanlines of one color plane are composed into a
//! scratch buffer, repacked into the controller's pixel format and sent,
//! then the next part follows. A two-plane panel is drawn in two passes
//! (monochrome, then accent); a panel that packs both planes per pixel is
//! drawn in one pass with both planes side by side in the scratch buffer.
//!
//! - [`cmd`]: controller commands and the tables replayed at power up/down
//! - [`epd`]: the transfer engine ([`Epd`]) and its control lines ([`EpdControl`])
//! - [`canvas`]: the scratch buffer plus windowed compositing of bitmaps,
//!   text and barcodes ([`Canvas`])
//! - [`render`]: the per-part streaming loop ([`Display`])
//!
//! ```rust,ignore
//! use chroma_tag::display::{Display, Epd, EpdConfig, Geometry, Plane, TextDirection, TextSize};
//! use core::fmt::Write;
//!
//! let epd = Epd::new(spi, pins, EpdConfig::default());
//! let mut display: Display<_, _, 1184> = Display::new(epd, Geometry::CHROMA29)?;
//! display.draw_screen(&mut delay, &mut adc, |canvas| {
//!     canvas.print_begin(8, 8, TextDirection::Horizontal, TextSize::Normal, Plane::Mono);
//!     let _ = write!(canvas, "{} mV", battery_mv);
//! })?;
//! ```

pub mod barcode;
pub mod canvas;
pub mod cmd;
pub mod epd;
pub mod font;
pub mod render;

pub use canvas::{Canvas, TextDirection, TextSize, Window};
pub use epd::{Epd, EpdConfig, EpdControl, EpdPins};
pub use render::Display;

use heapless::Vec;

/// One of the two independently transmitted bitmaps of a frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Plane {
    /// Black on white.
    #[default]
    Mono,
    /// Red or yellow.
    Accent,
}

/// How a panel's controller wants its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PanelEncoding {
    /// Monochrome pass at 2 bits per pixel (`0b11` black), accent pass at
    /// 1 bit per pixel with `0` marking accent.
    TwoBitMono,
    /// Both passes at 1 bit per pixel with `0` marking ink.
    OneBit,
    /// One pass at 4 bits per pixel built from both planes.
    Packed4,
}

const PIXEL_2BIT_BLACK: u8 = 0b11;
const PIXEL_4BIT_BLACK: u8 = 0x0;
const PIXEL_4BIT_WHITE: u8 = 0x3;
const PIXEL_4BIT_ACCENT: u8 = 0x4;

/// Fixed dimensions of a panel and how it is split into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Geometry {
    /// Width in pixels, a multiple of 8.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Scanlines per part; must divide `height`.
    pub lines_per_part: u16,
    /// Pixel format of the controller.
    pub encoding: PanelEncoding,
}

impl Geometry {
    /// 2.9" 128x296, four parts of 74 lines.
    pub const CHROMA29: Geometry = Geometry {
        width: 128,
        height: 296,
        lines_per_part: 74,
        encoding: PanelEncoding::TwoBitMono,
    };

    /// 4.2" 400x300 on two cascaded controllers, ten parts of 30 lines.
    pub const CHROMA42: Geometry = Geometry {
        width: 400,
        height: 300,
        lines_per_part: 30,
        encoding: PanelEncoding::OneBit,
    };

    /// 7.4" 640x384, 64 parts of 6 lines with both planes per part.
    pub const CHROMA74: Geometry = Geometry {
        width: 640,
        height: 384,
        lines_per_part: 6,
        encoding: PanelEncoding::Packed4,
    };

    /// Whether the width is whole bytes and the height whole parts.
    pub const fn is_valid(&self) -> bool {
        self.width % 8 == 0 && self.lines_per_part != 0 && self.height % self.lines_per_part == 0
    }

    /// Bytes of one scanline of one plane.
    pub const fn bytes_per_line(&self) -> usize {
        self.width as usize / 8
    }

    /// Bytes of one part of one plane.
    pub const fn bytes_per_part(&self) -> usize {
        self.bytes_per_line() * self.lines_per_part as usize
    }

    /// Bytes of one full plane.
    pub const fn bytes_per_plane(&self) -> usize {
        self.bytes_per_line() * self.height as usize
    }

    /// Number of parts per pass.
    pub const fn parts(&self) -> u16 {
        self.height / self.lines_per_part
    }

    /// Whether both planes travel in the same pass.
    pub const fn packed(&self) -> bool {
        matches!(self.encoding, PanelEncoding::Packed4)
    }

    /// Scratch bytes a [`Canvas`] needs for this panel.
    pub const fn scratch_len(&self) -> usize {
        if self.packed() {
            self.bytes_per_part() * 2
        } else {
            self.bytes_per_part()
        }
    }

    /// The passes of one frame, in transmission order.
    pub fn passes(&self) -> &'static [Plane] {
        if self.packed() {
            &[Plane::Mono]
        } else {
            &[Plane::Mono, Plane::Accent]
        }
    }

    /// Repacks one scratch byte (8 pixels, MSB first) into controller bytes.
    ///
    /// `data` is the byte of the plane being sent; `accent` is the matching
    /// accent byte and only read by packed panels.
    pub fn pack(&self, pass: Plane, data: u8, accent: u8) -> Vec<u8, 4> {
        let mut out = Vec::new();
        match (self.encoding, pass) {
            (PanelEncoding::TwoBitMono, Plane::Mono) => {
                let mut value = 0u8;
                for bit in (0..8).rev() {
                    value <<= 2;
                    if data & (1 << bit) != 0 {
                        value |= PIXEL_2BIT_BLACK;
                    }
                    if bit % 4 == 0 {
                        let _ = out.push(value);
                    }
                }
            }
            (PanelEncoding::TwoBitMono, Plane::Accent) | (PanelEncoding::OneBit, _) => {
                let _ = out.push(!data);
            }
            (PanelEncoding::Packed4, _) => {
                let mut value = 0u8;
                for bit in (0..8).rev() {
                    let pixel = if accent & (1 << bit) != 0 {
                        PIXEL_4BIT_ACCENT
                    } else if data & (1 << bit) != 0 {
                        PIXEL_4BIT_BLACK
                    } else {
                        PIXEL_4BIT_WHITE
                    };
                    value = (value << 4) | pixel;
                    if bit % 2 == 0 {
                        let _ = out.push(value);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_fit_their_parts() {
        for g in [Geometry::CHROMA29, Geometry::CHROMA42, Geometry::CHROMA74] {
            assert_eq!(g.height % g.lines_per_part, 0);
            assert_eq!(g.width % 8, 0);
        }
        assert_eq!(Geometry::CHROMA29.bytes_per_part(), 1184);
        assert_eq!(Geometry::CHROMA29.parts(), 4);
        assert_eq!(Geometry::CHROMA74.scratch_len(), 960);
        assert_eq!(Geometry::CHROMA74.passes(), &[Plane::Mono]);
        assert_eq!(Geometry::CHROMA42.passes(), &[Plane::Mono, Plane::Accent]);
    }

    #[test]
    fn test_two_bit_mono_packing() {
        let g = Geometry::CHROMA29;
        assert_eq!(g.pack(Plane::Mono, 0b1000_0001, 0).as_slice(), &[0xc0, 0x03]);
        assert_eq!(g.pack(Plane::Mono, 0xff, 0).as_slice(), &[0xff, 0xff]);
        assert_eq!(g.pack(Plane::Accent, 0b1010_0000, 0).as_slice(), &[0b0101_1111]);
    }

    #[test]
    fn test_packed_four_bit() {
        let g = Geometry::CHROMA74;
        // black, white, accent over black, white...
        let out = g.pack(Plane::Mono, 0b1010_0000, 0b0010_0000);
        assert_eq!(out.as_slice(), &[0x03, 0x43, 0x33, 0x33]);
    }
}

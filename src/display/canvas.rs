//! Scratch buffer and windowed compositing.
//!
//! A [`Canvas`] holds one part of the frame: `lines_per_part` scanlines of
//! the plane being sent (both planes, side by side, on packed panels). A
//! drawing callback is invoked once per scanline with
//! [`Canvas::draw_y`] advancing; each primitive first asks
//! [`Canvas::set_window_y`] whether that scanline crosses its rectangle and
//! only then ORs the row's pixels into the buffer. No primitive ever clears
//! a bit, so overlapping draws accumulate.
//!
//! Buffer bytes hold 8 pixels, MSB leftmost; a set bit is ink.

use super::barcode::{Code128, barcode_width};
use super::font::{FONT_HEIGHT, FONT_WIDTH, glyph};
use super::{Geometry, Plane};
use crate::error::DisplayError;
use core::fmt;

const BARCODE_ROWS: u16 = 40;

/// Flow of printed text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TextDirection {
    /// Left to right.
    #[default]
    Horizontal,
    /// Top to bottom, glyphs rotated.
    Vertical,
}

/// Glyph scale.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TextSize {
    /// 10x16.
    #[default]
    Normal,
    /// 20x32.
    Double,
}

impl TextSize {
    const fn scale(self) -> u16 {
        match self {
            TextSize::Normal => 1,
            TextSize::Double => 2,
        }
    }
}

/// The clip rectangle set by the last window calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Window {
    /// Left edge.
    pub x: u16,
    /// Top edge.
    pub y: u16,
    /// One past the right edge.
    pub end_x: u16,
    /// One past the bottom edge.
    pub end_y: u16,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct TextCursor {
    x: u16,
    y: u16,
    direction: TextDirection,
    size: TextSize,
    color: Plane,
}

/// Part-sized scratch buffer with its draw context.
///
/// `N` must hold [`Geometry::scratch_len`] bytes.
#[derive(Debug)]
pub struct Canvas<const N: usize> {
    geometry: Geometry,
    buf: [u8; N],
    pass: Plane,
    draw_y: u16,
    part_y: u16,
    window: Window,
    win_draw_x: u16,
    win_draw_y: u16,
    win_buf_ndx: usize,
    win_color: Plane,
    cursor: TextCursor,
}

impl<const N: usize> Canvas<N> {
    /// Creates a cleared canvas for `geometry`.
    ///
    /// # Returns
    /// - `Err(DisplayError::InvalidGeometry)` unless [`Geometry::is_valid`]
    /// - `Err(DisplayError::ScratchTooSmall)` if `N` cannot hold one part
    pub fn new(geometry: Geometry) -> Result<Self, DisplayError> {
        if !geometry.is_valid() {
            return Err(DisplayError::InvalidGeometry);
        }
        let needed = geometry.scratch_len();
        if N < needed {
            return Err(DisplayError::ScratchTooSmall(needed));
        }
        Ok(Self {
            geometry,
            buf: [0; N],
            pass: Plane::Mono,
            draw_y: 0,
            part_y: 0,
            window: Window::default(),
            win_draw_x: 0,
            win_draw_y: 0,
            win_buf_ndx: 0,
            win_color: Plane::Mono,
            cursor: TextCursor::default(),
        })
    }

    /// The panel geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// The plane being composed.
    pub fn pass(&self) -> Plane {
        self.pass
    }

    /// The scanline the current callback invocation is drawing.
    pub fn draw_y(&self) -> u16 {
        self.draw_y
    }

    /// First scanline held by the buffer.
    pub fn part_y(&self) -> u16 {
        self.part_y
    }

    /// The current clip rectangle.
    pub fn window(&self) -> Window {
        self.window
    }

    /// The composed part.
    pub fn buffer(&self) -> &[u8] {
        &self.buf[..self.geometry.scratch_len()]
    }

    pub(crate) fn part_mut(&mut self) -> &mut [u8] {
        let len = self.geometry.scratch_len();
        &mut self.buf[..len]
    }

    pub(crate) fn begin_pass(&mut self, pass: Plane) {
        self.pass = pass;
        self.draw_y = 0;
        self.part_y = 0;
    }

    pub(crate) fn clear_part(&mut self) {
        self.part_mut().fill(0);
    }

    pub(crate) fn next_line(&mut self) {
        self.draw_y += 1;
    }

    pub(crate) fn next_part(&mut self) {
        self.part_y += self.geometry.lines_per_part;
        self.draw_y = self.part_y;
    }

    /// Positions the composition at scanline `y` of `pass`, e.g. to drive
    /// primitives outside of a streaming pass.
    pub fn seek(&mut self, pass: Plane, y: u16) {
        let lines = self.geometry.lines_per_part;
        self.pass = pass;
        self.draw_y = y;
        self.part_y = y - y % lines;
    }

    fn draws_on(&self, color: Plane) -> bool {
        self.geometry.packed() || color == self.pass
    }

    fn update_index(&mut self) {
        let line = usize::from(self.win_draw_y.saturating_sub(self.part_y));
        let mut ndx = usize::from(self.win_draw_x >> 3) + line * self.geometry.bytes_per_line();
        if self.geometry.packed() && self.win_color == Plane::Accent {
            ndx += self.geometry.bytes_per_part();
        }
        self.win_buf_ndx = ndx;
    }

    fn or_byte(&mut self, ndx: usize, bits: u8) {
        let len = self.geometry.scratch_len();
        if ndx < len {
            self.buf[ndx] |= bits;
        }
    }

    /// Sets the window's horizontal extent and moves the draw index to its left edge.
    pub fn set_window_x(&mut self, start: u16, width: u16) {
        self.window.x = start;
        self.window.end_x = start.saturating_add(width);
        self.win_draw_x = start;
        self.update_index();
    }

    /// Sets the window's vertical extent.
    ///
    /// # Returns
    /// `true` when the current scanline lies outside `[start, start + height)`;
    /// the caller must then skip drawing.
    pub fn set_window_y(&mut self, start: u16, height: u16) -> bool {
        self.window.end_y = start.saturating_add(height);
        if self.draw_y >= start && self.draw_y < self.window.end_y {
            self.window.y = start;
            self.win_draw_y = self.draw_y;
            false
        } else {
            true
        }
    }

    /// ORs the current row of a raw 1bpp bitmap into the buffer.
    ///
    /// `bmp` is `[width, height, rows..]` with `width` a multiple of 8 and
    /// rows packed MSB first; `x` should be a multiple of 8 as well.
    pub fn load_raw_bitmap(&mut self, bmp: &[u8], x: u16, y: u16, color: Plane) {
        let [width, height, rows @ ..] = bmp else {
            return;
        };
        if !self.draws_on(color) || self.set_window_y(y, u16::from(*height)) {
            return;
        }
        self.win_color = color;
        self.set_window_x(x, u16::from(*width));

        let row_bytes = usize::from(*width / 8);
        let offset = usize::from(self.win_draw_y - self.window.y) * row_bytes;
        let row = rows.get(offset..).unwrap_or(&[]);
        for (i, &bits) in row.iter().take(row_bytes).enumerate() {
            self.or_byte(self.win_buf_ndx + i, bits);
        }
        self.win_buf_ndx += row_bytes;
    }

    /// Starts a text run at `(x, y)`.
    pub fn print_begin(
        &mut self,
        x: u16,
        y: u16,
        direction: TextDirection,
        size: TextSize,
        color: Plane,
    ) {
        self.cursor = TextCursor {
            x,
            y,
            direction,
            size,
            color,
        };
    }

    /// Draws `text` at the cursor.
    pub fn print(&mut self, text: &str) {
        for c in text.chars() {
            self.put_char(c);
        }
    }

    /// Ends the text run and returns where the next glyph would have gone.
    pub fn print_end(&mut self) -> (u16, u16) {
        (self.cursor.x, self.cursor.y)
    }

    fn put_char(&mut self, c: char) {
        let cursor = self.cursor;
        if !self.draws_on(cursor.color) {
            return;
        }
        let scale = cursor.size.scale();
        let (height, width) = match cursor.direction {
            TextDirection::Horizontal => (FONT_HEIGHT * scale, FONT_WIDTH * scale),
            TextDirection::Vertical => (FONT_WIDTH * scale, FONT_HEIGHT * scale),
        };
        if !self.set_window_y(cursor.y, height) {
            self.win_color = cursor.color;
            self.set_window_x(cursor.x, width);
            self.write_glyph(glyph(c), width, scale);
        }
        match cursor.direction {
            TextDirection::Horizontal => self.cursor.x = cursor.x.saturating_add(width + 1),
            TextDirection::Vertical => self.cursor.y = cursor.y.saturating_add(height + 1),
        }
    }

    /// ORs one pixel at the draw index and steps right.
    fn emit(&mut self, out_mask: &mut u8, ink: bool) {
        if ink {
            self.or_byte(self.win_buf_ndx, *out_mask);
        }
        *out_mask >>= 1;
        if *out_mask == 0 {
            self.win_buf_ndx += 1;
            *out_mask = 0x80;
        }
    }

    /// Writes the glyph pixels crossing the current scanline.
    fn write_glyph(&mut self, columns: &[u16; FONT_WIDTH as usize], width: u16, scale: u16) {
        let row = (self.win_draw_y - self.window.y) / scale;
        let mut out_mask = 0x80u8 >> (self.win_draw_x & 7);
        let direction = self.cursor.direction;
        match direction {
            TextDirection::Horizontal => {
                let in_mask = 0x8000u16 >> row;
                for px in 0..width {
                    let column = columns[usize::from(px / scale)];
                    self.emit(&mut out_mask, column & in_mask != 0);
                }
            }
            TextDirection::Vertical => {
                // rotated: the column runs bottom to top across the scanline
                let column = columns[usize::from(row)];
                for px in 0..width {
                    self.emit(&mut out_mask, column & (1 << (px / scale)) != 0);
                }
            }
        }
    }

    /// Draws a 40 row Code 128 barcode of `text` at `(x, y)`, monochrome only.
    pub fn print_barcode(&mut self, text: &str, x: u16, y: u16) {
        if self.pass != Plane::Mono || self.set_window_y(y, BARCODE_ROWS) {
            return;
        }
        self.win_color = Plane::Mono;
        self.set_window_x(x, barcode_width(text.len()));
        let mut out_mask = 0x80u8 >> (self.win_draw_x & 7);
        for bar in Code128::new(text) {
            self.emit(&mut out_mask, bar);
        }
    }
}

impl<const N: usize> fmt::Write for Canvas<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.print(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    const SCRATCH: usize = 1184;

    fn canvas_at(y: u16) -> Canvas<SCRATCH> {
        let mut canvas = Canvas::new(Geometry::CHROMA29).unwrap();
        canvas.seek(Plane::Mono, y);
        canvas
    }

    #[test]
    fn test_scratch_size_checked() {
        let canvas = Canvas::<100>::new(Geometry::CHROMA29);
        assert_eq!(canvas.err(), Some(DisplayError::ScratchTooSmall(1184)));
        assert!(Canvas::<960>::new(Geometry::CHROMA74).is_ok());
    }

    #[test]
    fn test_geometry_checked() {
        let no_parts = Geometry {
            lines_per_part: 0,
            ..Geometry::CHROMA29
        };
        let ragged = Geometry {
            lines_per_part: 75,
            ..Geometry::CHROMA29
        };
        let odd_width = Geometry {
            width: 130,
            ..Geometry::CHROMA29
        };
        for geometry in [no_parts, ragged, odd_width] {
            assert!(!geometry.is_valid());
            let canvas = Canvas::<SCRATCH>::new(geometry);
            assert_eq!(canvas.err(), Some(DisplayError::InvalidGeometry));
        }
        assert!(Geometry::CHROMA42.is_valid());
    }

    #[test]
    fn test_window_y_bounds() {
        let mut canvas = canvas_at(10);
        assert!(!canvas.set_window_y(10, 1));
        assert!(!canvas.set_window_y(0, 11));
        assert!(canvas.set_window_y(0, 10));
        assert!(canvas.set_window_y(11, 5));
        assert_eq!(canvas.window().end_y, 16);
    }

    #[test]
    fn test_draws_outside_window_leave_buffer_alone() {
        let mut canvas = canvas_at(5);
        canvas.load_raw_bitmap(&[8, 2, 0xff, 0xff], 0, 20, Plane::Mono);
        canvas.print_begin(0, 30, TextDirection::Horizontal, TextSize::Normal, Plane::Mono);
        canvas.print("HI");
        canvas.print_barcode("X", 0, 50);
        assert!(canvas.buffer().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_overlapping_bitmaps_accumulate() {
        let mut canvas = canvas_at(3);
        canvas.load_raw_bitmap(&[8, 1, 0b1100_0000], 16, 3, Plane::Mono);
        canvas.load_raw_bitmap(&[8, 1, 0b0000_0011], 16, 3, Plane::Mono);
        let ndx = 2 + 3 * 16;
        assert_eq!(canvas.buffer()[ndx], 0b1100_0011);
        assert_eq!(canvas.buffer().iter().filter(|&&b| b != 0).count(), 1);
    }

    #[test]
    fn test_bitmap_picks_row_and_plane() {
        let bmp = [16, 3, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let mut canvas = canvas_at(76);
        // part 1 starts at line 74; row 1 of a bitmap placed at 75
        canvas.load_raw_bitmap(&bmp, 8, 75, Plane::Mono);
        assert_eq!(&canvas.buffer()[2 * 16 + 1..2 * 16 + 3], &[0x03, 0x04]);

        canvas.load_raw_bitmap(&bmp, 32, 75, Plane::Accent);
        assert_eq!(canvas.buffer()[2 * 16 + 4], 0);
    }

    #[test]
    fn test_packed_accent_goes_to_second_half() {
        let mut canvas = Canvas::<960>::new(Geometry::CHROMA74).unwrap();
        canvas.seek(Plane::Mono, 0);
        canvas.load_raw_bitmap(&[8, 1, 0xaa], 0, 0, Plane::Accent);
        assert_eq!(canvas.buffer()[0], 0);
        assert_eq!(canvas.buffer()[480], 0xaa);
    }

    #[test]
    fn test_horizontal_text_row() {
        // row 14 of 'L' is its foot: every column inked
        let mut canvas = canvas_at(14);
        canvas.print_begin(0, 0, TextDirection::Horizontal, TextSize::Normal, Plane::Mono);
        canvas.print("L");
        assert_eq!(&canvas.buffer()[14 * 16..14 * 16 + 2], &[0xff, 0xc0]);
        assert_eq!(canvas.print_end(), (11, 0));
    }

    #[test]
    fn test_double_text_scales_both_ways() {
        let mut canvas = canvas_at(28);
        canvas.print_begin(0, 0, TextDirection::Horizontal, TextSize::Double, Plane::Mono);
        canvas.print("L");
        assert_eq!(&canvas.buffer()[28 * 16..28 * 16 + 3], &[0xff, 0xff, 0xf0]);
        assert_eq!(canvas.print_end(), (21, 0));
    }

    #[test]
    fn test_vertical_text_advances_down() {
        let mut canvas = canvas_at(0);
        canvas.print_begin(8, 0, TextDirection::Vertical, TextSize::Normal, Plane::Mono);
        canvas.print("L");
        // first column of 'L' rotated: rows 1..=14 of the glyph
        assert_eq!(&canvas.buffer()[1..3], &[0x7f, 0xfe]);
        assert_eq!(canvas.print_end(), (8, 11));
    }

    #[test]
    fn test_text_on_other_plane_is_skipped() {
        let mut canvas = canvas_at(14);
        canvas.print_begin(0, 0, TextDirection::Horizontal, TextSize::Normal, Plane::Accent);
        let _ = write!(canvas, "L{}", 1);
        assert!(canvas.buffer().iter().all(|&b| b == 0));
        assert_eq!(canvas.print_end(), (0, 0));
    }

    #[test]
    fn test_formatted_text() {
        let mut canvas = canvas_at(14);
        canvas.print_begin(0, 0, TextDirection::Horizontal, TextSize::Normal, Plane::Mono);
        assert!(write!(canvas, "{}{}", 'L', "L").is_ok());
        assert_eq!(canvas.print_end(), (22, 0));
        // second 'L' starts at x = 11
        assert_eq!(canvas.buffer()[14 * 16 + 1], 0xdf);
    }

    #[test]
    fn test_barcode_row_and_accent_pass() {
        let mut canvas = canvas_at(0);
        canvas.print_barcode("A", 0, 0);
        // start B: 11010010000
        assert_eq!(canvas.buffer()[0], 0b1101_0010);
        assert_eq!(canvas.buffer()[1] & 0b1110_0000, 0);

        let mut accent = canvas_at(0);
        accent.seek(Plane::Accent, 0);
        accent.print_barcode("A", 0, 0);
        assert!(accent.buffer().iter().all(|&b| b == 0));
    }
}

//! Code 128 (code set B) bar generator.
//!
//! [`Code128`] yields one `bool` per module, `true` for a bar, covering
//! start symbol, data, checksum and stop pattern. Quiet zones are left to
//! the caller's layout.

/// Module patterns of symbol values 0..=105, MSB first, 11 modules each.
#[rustfmt::skip]
const PATTERNS: [u16; 106] = [
    0b11011001100, 0b11001101100, 0b11001100110, 0b10010011000, 0b10010001100, 0b10001001100,
    0b10011001000, 0b10011000100, 0b10001100100, 0b11001001000, 0b11001000100, 0b11000100100,
    0b10110011100, 0b10011011100, 0b10011001110, 0b10111001100, 0b10011101100, 0b10011100110,
    0b11001110010, 0b11001011100, 0b11001001110, 0b11011100100, 0b11001110100, 0b11101101110,
    0b11101001100, 0b11100101100, 0b11100100110, 0b11101100100, 0b11100110100, 0b11100110010,
    0b11011011000, 0b11011000110, 0b11000110110, 0b10100011000, 0b10001011000, 0b10001000110,
    0b10110001000, 0b10001101000, 0b10001100010, 0b11010001000, 0b11000101000, 0b11000100010,
    0b10110111000, 0b10110001110, 0b10001101110, 0b10111011000, 0b10111000110, 0b10001110110,
    0b11101110110, 0b11010001110, 0b11000101110, 0b11011101000, 0b11011100010, 0b11011101110,
    0b11101011000, 0b11101000110, 0b11100010110, 0b11101101000, 0b11101100010, 0b11100011010,
    0b11101111010, 0b11001000010, 0b11110001010, 0b10100110000, 0b10100001100, 0b10010110000,
    0b10010000110, 0b10000101100, 0b10000100110, 0b10110010000, 0b10110000100, 0b10011010000,
    0b10011000010, 0b10000110100, 0b10000110010, 0b11000010010, 0b11001010000, 0b11110111010,
    0b11000010100, 0b10001111010, 0b10100111100, 0b10010111100, 0b10010011110, 0b10111100100,
    0b10011110100, 0b10011110010, 0b11110100100, 0b11110010100, 0b11110010010, 0b11011011110,
    0b11011110110, 0b11110110110, 0b10101111000, 0b10100011110, 0b10001011110, 0b10111101000,
    0b10111100010, 0b11110101000, 0b11110100010, 0b10111011110, 0b10111101110, 0b11101011110,
    0b11110101110, 0b11010000100, 0b11010010000, 0b11010011100,];

const START_B: u8 = 104;
const STOP: u16 = 0b1100011101011;
const STOP_MODULES: u8 = 13;
const SYMBOL_MODULES: u8 = 11;

/// Width in modules of the barcode for a `len` character string.
pub const fn barcode_width(len: usize) -> u16 {
    (SYMBOL_MODULES as usize * (len + 3) + 2) as u16
}

/// Code set B value of an ASCII byte; anything else encodes as `?`.
fn value_of(b: u8) -> u8 {
    match b {
        0x20..=0x7f => b - 0x20,
        _ => b'?' - 0x20,
    }
}

/// Module iterator over a Code 128 B symbol.
#[derive(Debug, Clone)]
pub struct Code128<'a> {
    data: &'a [u8],
    checksum: u8,
    symbol: usize,
    module: u8,
}

impl<'a> Code128<'a> {
    /// Encodes `text`.
    pub fn new(text: &'a str) -> Self {
        let data = text.as_bytes();
        let weighted = data
            .iter()
            .enumerate()
            .fold(u32::from(START_B), |sum, (i, &b)| {
                sum + (i as u32 + 1) * u32::from(value_of(b))
            });
        Self {
            data,
            checksum: (weighted % 103) as u8,
            symbol: 0,
            module: 0,
        }
    }

    /// The check symbol value.
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    fn pattern(&self, symbol: usize) -> Option<(u16, u8)> {
        let len = self.data.len();
        let value = match symbol {
            0 => START_B,
            s if s <= len => value_of(self.data[s - 1]),
            s if s == len + 1 => self.checksum,
            s if s == len + 2 => return Some((STOP, STOP_MODULES)),
            _ => return None,
        };
        Some((PATTERNS[usize::from(value)], SYMBOL_MODULES))
    }
}

impl Iterator for Code128<'_> {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        loop {
            let (pattern, modules) = self.pattern(self.symbol)?;
            if self.module < modules {
                let bar = pattern & (1 << (modules - 1 - self.module)) != 0;
                self.module += 1;
                return Some(bar);
            }
            self.symbol += 1;
            self.module = 0;
        }
    }
}

//! Controller commands and the command tables replayed to the panel.
//!
//! The panel controllers are UC8154 compatible. A table is a run of
//! `[count][command][data; count - 1]` entries ended by a zero count; see
//! [`entries`].

/// Panel setting (PSR).
pub const PANEL_SETTING: u8 = 0x00;
/// Power setting (PWR).
pub const POWER_SETTING: u8 = 0x01;
/// Power off (POF).
pub const POWER_OFF: u8 = 0x02;
/// Power on (PON).
pub const POWER_ON: u8 = 0x04;
/// Booster soft start (BTST).
pub const BOOSTER_SOFT_START: u8 = 0x06;
/// Deep sleep (DSLP).
pub const DEEP_SLEEP: u8 = 0x07;
/// Start transmission into the monochrome buffer (DTM1).
pub const START_TRANSMISSION_DTM1: u8 = 0x10;
/// Data stop (DSP).
pub const DATA_STOP: u8 = 0x11;
/// Display refresh (DRF).
pub const DISPLAY_REFRESH: u8 = 0x12;
/// Start transmission into the accent buffer (DTM2).
pub const START_TRANSMISSION_DTM2: u8 = 0x13;
/// PLL control.
pub const PLL_CONTROL: u8 = 0x30;
/// VCOM and data interval (CDI).
pub const VCOM_INTERVAL: u8 = 0x50;
/// TCON setting.
pub const TCON_SETTING: u8 = 0x60;
/// Resolution setting (TRES).
pub const RESOLUTION_SETTING: u8 = 0x61;
/// VCOM DC level (VDCS).
pub const VCOM_DC_SETTING: u8 = 0x82;
/// Cascade setting; bit 0 lets the master drive the slave's refresh.
pub const CASCADE_SET: u8 = 0xe0;

/// Booster and power rails.
#[rustfmt::skip]
pub const POWER_UP: &[u8] = &[
    5, POWER_SETTING, 0x07, 0x00, 0x09, 0x00,
    4, BOOSTER_SOFT_START, 0x07, 0x07, 0x0f,
    0,
];

/// Panel geometry, timing and the waveform lookup tables.
#[rustfmt::skip]
pub const SETUP: &[u8] = &[
    2, PANEL_SETTING, 0x8f,
    4, RESOLUTION_SETTING, 0xc8, 0x01, 0x2c,
    2, PLL_CONTROL, 0x39,
    2, VCOM_INTERVAL, 0x17,
    2, VCOM_DC_SETTING, 0x08,
    2, TCON_SETTING, 0x22,
    // VCOM1
    16, 0x20, 0x03, 0x02, 0x01, 0x02, 0x04, 0x0f, 0x0a, 0x0a, 0x19, 0x02, 0x04, 0x0f, 0x00, 0x00, 0x00,
    // white
    16, 0x21, 0x03, 0x02, 0x01, 0x02, 0x84, 0x0f, 0x8a, 0x4a, 0x19, 0x02, 0x44, 0x0f, 0x00, 0x00, 0x00,
    // black
    16, 0x22, 0x03, 0x02, 0x01, 0x42, 0x04, 0x0f, 0x8a, 0x4a, 0x19, 0x82, 0x04, 0x0f, 0x00, 0x00, 0x00,
    // VCOM2
    16, 0x25, 0x0a, 0x0a, 0x01, 0x02, 0x14, 0x08, 0x14, 0x14, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // accent 0
    16, 0x26, 0x4a, 0x4a, 0x01, 0x82, 0x54, 0x08, 0x54, 0x54, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // accent 1
    16, 0x27, 0x0a, 0x0a, 0x01, 0x02, 0x14, 0x08, 0x14, 0x14, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // gray 2
    16, 0x24, 0x83, 0x82, 0x01, 0x82, 0x84, 0x0f, 0x8a, 0x4a, 0x19, 0x02, 0x04, 0x0f, 0x00, 0x00, 0x00,
    0,
];

/// Blank waveforms, rails down, and one last refresh to discharge.
#[rustfmt::skip]
pub const POWER_OFF_SEQUENCE: &[u8] = &[
    16, 0x20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    16, 0x21, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    16, 0x22, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    16, 0x24, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    2, PANEL_SETTING, 0x8f,
    4, RESOLUTION_SETTING, 0xc8, 0x01, 0x2c,
    5, POWER_SETTING, 0x02, 0x00, 0x00, 0x00,
    2, PLL_CONTROL, 0x29,
    1, DISPLAY_REFRESH,
    5, POWER_SETTING, 0x02, 0x00, 0x00, 0x00,
    0,
];

/// Cascade both controllers and refresh.
#[rustfmt::skip]
pub const START_REFRESH: &[u8] = &[
    2, CASCADE_SET, 0x01,
    1, DISPLAY_REFRESH,
    0,
];

/// Walks a command table, yielding `(command, data)` per entry.
///
/// Stops at the zero terminator, or at a truncated entry.
pub fn entries(table: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut rest = table;
    core::iter::from_fn(move || {
        let (&count, tail) = rest.split_first()?;
        let count = usize::from(count);
        if count == 0 || tail.len() < count {
            return None;
        }
        let (entry, next) = tail.split_at(count);
        rest = next;
        Some((entry[0], &entry[1..]))
    })
}

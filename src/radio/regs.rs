//! Transceiver register model.
//!
//! Register addresses follow the CC1101 configuration register map. The
//! CC1110 exposes the same logical registers through XDATA, so one address
//! space serves both parts; the [`Transceiver`](super::Transceiver)
//! implementation maps them onto the bus.
//!
//! RF tables are ordered `(address, value)` lists closed by [`RfSetting::END`].
//! Order matters: the frequency synthesizer calibration registers must follow
//! the frequency words they calibrate.

use crate::consts::{
    CHANNEL_SPACING_866, CHANNEL_SPACING_915, FIRST_866_CHAN, FIRST_915_CHAN, NUM_866_CHANNELS,
    NUM_915_CHANNELS, TX_POWER_MAX_DBM, TX_POWER_MIN_DBM,
};

/// GDO2 output pin configuration.
pub const IOCFG2: u8 = 0x00;
/// GDO1 output pin configuration.
pub const IOCFG1: u8 = 0x01;
/// GDO0 output pin configuration.
pub const IOCFG0: u8 = 0x02;
/// RX/TX FIFO thresholds.
pub const FIFOTHR: u8 = 0x03;
/// Sync word, high byte.
pub const SYNC1: u8 = 0x04;
/// Sync word, low byte.
pub const SYNC0: u8 = 0x05;
/// Packet length.
pub const PKTLEN: u8 = 0x06;
/// Packet automation control.
pub const PKTCTRL1: u8 = 0x07;
/// Packet automation control.
pub const PKTCTRL0: u8 = 0x08;
/// Device address.
pub const ADDR: u8 = 0x09;
/// Channel number.
pub const CHANNR: u8 = 0x0a;
/// Frequency synthesizer control.
pub const FSCTRL1: u8 = 0x0b;
/// Frequency synthesizer control.
pub const FSCTRL0: u8 = 0x0c;
/// Frequency control word, high byte.
pub const FREQ2: u8 = 0x0d;
/// Frequency control word, middle byte.
pub const FREQ1: u8 = 0x0e;
/// Frequency control word, low byte.
pub const FREQ0: u8 = 0x0f;
/// Modem configuration.
pub const MDMCFG4: u8 = 0x10;
/// Modem configuration.
pub const MDMCFG3: u8 = 0x11;
/// Modem configuration.
pub const MDMCFG2: u8 = 0x12;
/// Modem configuration.
pub const MDMCFG1: u8 = 0x13;
/// Modem configuration.
pub const MDMCFG0: u8 = 0x14;
/// Modem deviation setting.
pub const DEVIATN: u8 = 0x15;
/// Main radio control state machine configuration.
pub const MCSM2: u8 = 0x16;
/// Main radio control state machine configuration.
pub const MCSM1: u8 = 0x17;
/// Main radio control state machine configuration.
pub const MCSM0: u8 = 0x18;
/// Frequency offset compensation configuration.
pub const FOCCFG: u8 = 0x19;
/// Bit synchronization configuration.
pub const BSCFG: u8 = 0x1a;
/// AGC control.
pub const AGCCTRL2: u8 = 0x1b;
/// AGC control.
pub const AGCCTRL1: u8 = 0x1c;
/// AGC control.
pub const AGCCTRL0: u8 = 0x1d;
/// Front end RX configuration.
pub const FREND1: u8 = 0x21;
/// Front end TX configuration.
pub const FREND0: u8 = 0x22;
/// Frequency synthesizer calibration.
pub const FSCAL3: u8 = 0x23;
/// Frequency synthesizer calibration.
pub const FSCAL2: u8 = 0x24;
/// Frequency synthesizer calibration.
pub const FSCAL1: u8 = 0x25;
/// Frequency synthesizer calibration.
pub const FSCAL0: u8 = 0x26;
/// Various test settings.
pub const TEST2: u8 = 0x2c;
/// Various test settings.
pub const TEST1: u8 = 0x2d;
/// Various test settings.
pub const TEST0: u8 = 0x2e;

/// Last configuration register address.
pub const LAST_CONFIG_REG: u8 = TEST0;

/// One register write of an RF table.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct RfSetting {
    /// Register address.
    pub addr: u8,
    /// Value to write.
    pub value: u8,
}

impl RfSetting {
    /// Table terminator.
    pub const END: RfSetting = RfSetting::new(0xff, 0);

    /// Creates a table entry.
    pub const fn new(addr: u8, value: u8) -> Self {
        Self { addr, value }
    }

    /// Whether this entry closes its table.
    pub const fn is_end(&self) -> bool {
        self.addr == Self::END.addr
    }
}

/// A named, immutable RF configuration.
pub type RfTable = &'static [RfSetting];

/// Iterates the entries of `table` up to, not including, the terminator.
pub fn settings(table: RfTable) -> impl Iterator<Item = &'static RfSetting> {
    table.iter().take_while(|s| !s.is_end())
}

/// 250 kbps GFSK at 915 MHz, the configuration the access point bridge runs by default.
pub const LEGACY_250K_915: RfTable = &[
    RfSetting::new(IOCFG0, 0x06),
    RfSetting::new(PKTCTRL0, 0x05),
    RfSetting::new(FREQ2, 0x22),
    RfSetting::new(FREQ1, 0xbb),
    RfSetting::new(FREQ0, 0x13),
    RfSetting::new(MDMCFG4, 0x1d),
    RfSetting::new(MDMCFG3, 0x3b),
    RfSetting::new(MDMCFG2, 0x13),
    RfSetting::new(MDMCFG1, 0x73),
    RfSetting::new(MDMCFG0, 0xa7),
    RfSetting::new(DEVIATN, 0x65),
    RfSetting::new(MCSM0, 0x18),
    RfSetting::new(FOCCFG, 0x1e),
    RfSetting::new(BSCFG, 0x1c),
    RfSetting::new(AGCCTRL2, 0xc7),
    RfSetting::new(AGCCTRL1, 0x00),
    RfSetting::new(AGCCTRL0, 0xb0),
    RfSetting::new(FREND1, 0xb6),
    RfSetting::new(FSCAL3, 0xea),
    RfSetting::new(FSCAL2, 0x2a),
    RfSetting::new(FSCAL1, 0x00),
    RfSetting::new(FSCAL0, 0x1f),
    RfSetting::new(TEST0, 0x09),
    RfSetting::END,
];

/// The tag SoC configuration: the same 250 kbps link with variable length
/// packets, appended status bytes and hardware CRC.
pub const CC1110_250K_915: RfTable = &[
    RfSetting::new(SYNC1, 0xd3),
    RfSetting::new(SYNC0, 0x91),
    RfSetting::new(PKTLEN, 125),
    RfSetting::new(PKTCTRL1, 0x04),
    RfSetting::new(PKTCTRL0, 0x45),
    RfSetting::new(ADDR, 0x22),
    RfSetting::new(CHANNR, 0x00),
    RfSetting::new(FSCTRL1, 0x0f),
    RfSetting::new(FSCTRL0, 0x00),
    RfSetting::new(FREQ2, 0x22),
    RfSetting::new(FREQ1, 0xbb),
    RfSetting::new(FREQ0, 0x13),
    RfSetting::new(MDMCFG4, 0x1d),
    RfSetting::new(MDMCFG3, 0x3b),
    RfSetting::new(MDMCFG2, 0x13),
    RfSetting::new(MDMCFG1, 0x73),
    RfSetting::new(MDMCFG0, 0xa7),
    RfSetting::new(DEVIATN, 0x65),
    RfSetting::new(MCSM2, 0x07),
    RfSetting::new(MCSM1, 0x00),
    RfSetting::new(MCSM0, 0x18),
    RfSetting::new(FOCCFG, 0x1e),
    RfSetting::new(BSCFG, 0x1c),
    RfSetting::new(AGCCTRL2, 0xc7),
    RfSetting::new(AGCCTRL1, 0x00),
    RfSetting::new(AGCCTRL0, 0xb0),
    RfSetting::new(FREND1, 0xb6),
    RfSetting::new(FREND0, 0x10),
    RfSetting::new(FSCAL3, 0xea),
    RfSetting::new(FSCAL2, 0x2a),
    RfSetting::new(FSCAL1, 0x00),
    RfSetting::new(FSCAL0, 0x1f),
    RfSetting::new(TEST2, 0x88),
    RfSetting::new(TEST1, 0x31),
    RfSetting::new(TEST0, 0x09),
    RfSetting::END,
];

/// 38.4 kbps GFSK around 902 MHz, with the base frequency trimmed for the
/// crystal on the common CC1101 modules.
pub const IDF_38K4_902: RfTable = &[
    RfSetting::new(SYNC1, 0xc7),
    RfSetting::new(SYNC0, 0x0a),
    RfSetting::new(PKTLEN, 0x3d),
    RfSetting::new(PKTCTRL0, 0x05),
    RfSetting::new(ADDR, 0xff),
    RfSetting::new(FSCTRL1, 0x08),
    RfSetting::new(FREQ2, 0x22),
    RfSetting::new(FREQ1, 0xb1),
    RfSetting::new(FREQ0, 0x3b),
    RfSetting::new(MDMCFG4, 0xca),
    RfSetting::new(MDMCFG3, 0x83),
    RfSetting::new(MDMCFG2, 0x93),
    RfSetting::new(DEVIATN, 0x35),
    RfSetting::new(MCSM0, 0x18),
    RfSetting::new(FOCCFG, 0x16),
    RfSetting::new(AGCCTRL2, 0x43),
    RfSetting::new(FSCAL3, 0xef),
    RfSetting::new(FSCAL2, 0x2d),
    RfSetting::new(FSCAL1, 0x25),
    RfSetting::new(FSCAL0, 0x1f),
    RfSetting::new(TEST2, 0x81),
    RfSetting::new(TEST1, 0x35),
    RfSetting::new(TEST0, 0x09),
    RfSetting::END,
];

/// Unmodulated carrier for frequency checks. Apply a band table after it.
pub const CARRIER_WAVE: RfTable = &[
    RfSetting::new(PKTCTRL0, 0x22),
    RfSetting::new(FSCTRL1, 0x06),
    RfSetting::new(MDMCFG4, 0xf5),
    RfSetting::new(MDMCFG3, 0x83),
    RfSetting::new(MDMCFG2, 0xb0),
    RfSetting::new(DEVIATN, 0x15),
    RfSetting::new(MCSM0, 0x18),
    RfSetting::new(FOCCFG, 0x17),
    RfSetting::new(FSCAL3, 0xe9),
    RfSetting::new(FSCAL2, 0x2a),
    RfSetting::new(FSCAL1, 0x00),
    RfSetting::new(FSCAL0, 0x1f),
    RfSetting::new(TEST1, 0x31),
    RfSetting::new(TEST0, 0x09),
    RfSetting::END,
];

/// Base frequency 865.999 MHz.
pub const BASE_866: RfTable = &[
    RfSetting::new(FREQ2, 0x21),
    RfSetting::new(FREQ1, 0x4e),
    RfSetting::new(FREQ0, 0xc4),
    RfSetting::END,
];

/// Base frequency 915.000 MHz.
pub const BASE_915: RfTable = &[
    RfSetting::new(FREQ2, 0x23),
    RfSetting::new(FREQ1, 0x31),
    RfSetting::new(FREQ0, 0x3b),
    RfSetting::END,
];

/// Band selector for the carrier test.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Band {
    /// 866 MHz (EU).
    Mhz866,
    /// 915 MHz (US).
    #[default]
    Mhz915,
}

impl Band {
    /// The base frequency table of the band.
    pub const fn table(self) -> RfTable {
        match self {
            Band::Mhz866 => BASE_866,
            Band::Mhz915 => BASE_915,
        }
    }
}

/// PA gain codes from -30 dBm to +10 dBm in 2 dB steps.
pub const POWER_TABLE: [u8; 21] = [
    0x03, 0x05, 0x06, 0x08, 0x0b, 0x0e, 0x19, 0x1c, 0x24, 0x25, 0x27, 0x29, 0x38, 0x55, 0x40,
    0x8d, 0x8a, 0x84, 0xca, 0xc4, 0xc0,
];

/// Maps an output power request to its PA gain code.
///
/// The request is clamped to `[-30, 10]` dBm first, so any value below the
/// range programs the -30 dBm code and any value above it the +10 dBm code.
pub fn power_code(dbm: i8) -> u8 {
    let clamped = dbm.clamp(TX_POWER_MIN_DBM, TX_POWER_MAX_DBM);
    let index = (i16::from(clamped) - i16::from(TX_POWER_MIN_DBM)) / 2;
    POWER_TABLE[index as usize]
}

/// Frequency words and channel number for one tag channel id.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ChannelSettings {
    /// `FREQ2`, `FREQ1`, `FREQ0`.
    pub freq: [u8; 3],
    /// `CHANNR`.
    pub channr: u8,
}

impl ChannelSettings {
    const BASE_866: [u8; 3] = [0x21, 0x3b, 0x13];
    const BASE_915: [u8; 3] = [0x22, 0xbb, 0x13];

    /// Computes the register values for channel id `ch`.
    ///
    /// # Notes
    /// - `100..106`: 866 MHz base, `CHANNR = (ch - 100) * 3`
    /// - `200..206`: 915 MHz base, `CHANNR = (ch - 200) * 12`
    /// - anything else falls back to the first 915 MHz channel
    pub fn for_channel(ch: u8) -> Self {
        if (FIRST_866_CHAN..FIRST_866_CHAN + NUM_866_CHANNELS).contains(&ch) {
            Self {
                freq: Self::BASE_866,
                channr: (ch - FIRST_866_CHAN) * CHANNEL_SPACING_866,
            }
        } else if (FIRST_915_CHAN..FIRST_915_CHAN + NUM_915_CHANNELS).contains(&ch) {
            Self {
                freq: Self::BASE_915,
                channr: (ch - FIRST_915_CHAN) * CHANNEL_SPACING_915,
            }
        } else {
            Self {
                freq: Self::BASE_915,
                channr: 0,
            }
        }
    }

    /// The register writes in programming order.
    pub fn writes(&self) -> [RfSetting; 4] {
        [
            RfSetting::new(FREQ2, self.freq[0]),
            RfSetting::new(FREQ1, self.freq[1]),
            RfSetting::new(FREQ0, self.freq[2]),
            RfSetting::new(CHANNR, self.channr),
        ]
    }
}

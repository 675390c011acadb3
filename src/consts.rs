//! Constants shared by the radio link, the display pipeline and the flash map.
//!
//! ## Key Concepts
//!
//! - **Packets**: the transceiver is run in variable-length mode with a
//!   length byte in front and two appended status bytes behind the payload.
//! - **Ring**: received frames land in a small fixed set of slots, one frame per slot.
//! - **Channel plan**: tag channel ids are split into an 866 MHz range and a
//!   915 MHz range, each with its own base frequency and channel spacing.
//! - **Flash map**: settings live behind a magic word at a fixed offset of the
//!   external serial flash.

/// Largest payload the transceiver is configured to accept (`PKTLEN`).
pub const RADIO_MAX_PACKET_LEN: u8 = 125;

/// See [`RADIO_MAX_PACKET_LEN`](crate::consts::RADIO_MAX_PACKET_LEN)
pub const RADIO_MAX_PACKET_LEN_USIZE: usize = RADIO_MAX_PACKET_LEN as usize;

/// Number of slots in the receive ring.
pub const RX_BUFFER_NUM: u8 = 3;

/// One ring slot: `[len][payload..125][rssi][lqi | crc_ok]`.
pub const RX_SLOT_LEN: usize = 1 + RADIO_MAX_PACKET_LEN_USIZE + 2;

/// CRC-ok flag in the second appended status byte.
pub const RX_STATUS_CRC_OK: u8 = 0x80;

/// LQI bits in the second appended status byte.
pub const RX_STATUS_LQI_MASK: u8 = 0x7f;

/// First channel id of the 866 MHz range.
pub const FIRST_866_CHAN: u8 = 100;
/// Number of channels in the 866 MHz range.
pub const NUM_866_CHANNELS: u8 = 6;
/// `CHANNR` steps between two 866 MHz channels.
pub const CHANNEL_SPACING_866: u8 = 3;

/// First channel id of the 915 MHz range.
pub const FIRST_915_CHAN: u8 = 200;
/// Number of channels in the 915 MHz range.
pub const NUM_915_CHANNELS: u8 = 6;
/// `CHANNR` steps between two 915 MHz channels.
pub const CHANNEL_SPACING_915: u8 = 12;

/// Lowest programmable output power in dBm.
pub const TX_POWER_MIN_DBM: i8 = -30;
/// Highest programmable output power in dBm.
pub const TX_POWER_MAX_DBM: i8 = 10;

/// Frame type field of an 802.15.4-style frame control byte.
pub const FRAME_TYPE_MASK: u8 = 0x07;
/// Frame type value of an acknowledgement.
pub const FRAME_TYPE_ACK: u8 = 2;

/// Offset of the settings area in the external serial flash.
pub const SETTINGS_AREA_START: u32 = 0x8000;
/// Magic word written in front of a valid settings block.
pub const SETTINGS_MAGIC: u32 = 0xABBA_5AA5;

/// Erase granularity of the external serial flash.
pub const FLASH_SECTOR_SIZE: u32 = 0x1000;
/// Program granularity of the external serial flash.
pub const FLASH_PAGE_SIZE: u32 = 0x100;

/// Sleep between two busy-line checks while the panel refreshes.
pub const REFRESH_POLL_MS: u32 = 50;
/// Settle time after powering the panel and after releasing its reset.
pub const EPD_SETTLE_MS: u32 = 10;

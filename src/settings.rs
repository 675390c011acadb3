//! Persistent tag settings.
//!
//! The settings block lives at [`SETTINGS_AREA_START`] in the external flash:
//! a little-endian [`SETTINGS_MAGIC`] word followed by the packed 14 byte
//! [`TagSettings`] body. A missing magic or an erased version byte means
//! "never written" and yields the defaults.
//!
//! [`TagSettings::save`] compares against what is stored first and skips the
//! erase/program cycle entirely when nothing changed.

use crate::consts::{SETTINGS_AREA_START, SETTINGS_MAGIC};
use crate::error::FlashError;
use crate::flash::SerialFlash;

/// Layout version written by this crate.
pub const SETTINGS_STRUCT_VERSION: u8 = 1;

/// Size of the packed settings body.
pub const SETTINGS_LEN: usize = 14;

const MAGIC_LEN: usize = 4;
const STORED_LEN: usize = MAGIC_LEN + SETTINGS_LEN;

/// Tag behaviour switches pushed by the access point.
///
/// Flags are stored as bytes (`0` off, anything else on) to keep the
/// on-flash layout byte compatible with what the access point sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TagSettings {
    /// Layout version of this block.
    pub settings_ver: u8,
    /// Skip the AP scan on boot.
    pub enable_fast_boot: u8,
    /// Wake on RF activity.
    pub enable_rf_wake: u8,
    /// Allow switching to another access point.
    pub enable_tag_roaming: u8,
    /// Rescan channels after losing the access point.
    pub enable_scan_for_ap_after_timeout: u8,
    /// Overlay a low battery symbol.
    pub enable_low_bat_symbol: u8,
    /// Overlay a no-signal symbol.
    pub enable_no_rf_symbol: u8,
    /// Capability bits reported in fast boot.
    pub fast_boot_capabilities: u8,
    /// Custom firmware mode selector.
    pub custom_mode: u8,
    /// Battery level treated as low, in millivolts.
    pub bat_low_voltage: u16,
    /// Minimum check-in interval, in seconds.
    pub minimum_check_in_time: u16,
    /// Fixed channel, `0` to scan.
    pub fixed_channel: u8,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            settings_ver: SETTINGS_STRUCT_VERSION,
            enable_fast_boot: 0,
            enable_rf_wake: 0,
            enable_tag_roaming: 0,
            enable_scan_for_ap_after_timeout: 1,
            enable_low_bat_symbol: 1,
            enable_no_rf_symbol: 1,
            fast_boot_capabilities: 0,
            custom_mode: 0,
            bat_low_voltage: 2450,
            minimum_check_in_time: 40,
            fixed_channel: 0,
        }
    }
}

/// Result of [`TagSettings::save`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SaveOutcome {
    /// Flash already held these settings; nothing was erased or written.
    Unchanged,
    /// The block was erased and rewritten.
    Written,
}

impl TagSettings {
    /// Packs the settings in their on-flash layout.
    pub fn to_bytes(&self) -> [u8; SETTINGS_LEN] {
        let low = self.bat_low_voltage.to_le_bytes();
        let check_in = self.minimum_check_in_time.to_le_bytes();
        [
            self.settings_ver,
            self.enable_fast_boot,
            self.enable_rf_wake,
            self.enable_tag_roaming,
            self.enable_scan_for_ap_after_timeout,
            self.enable_low_bat_symbol,
            self.enable_no_rf_symbol,
            self.fast_boot_capabilities,
            self.custom_mode,
            low[0],
            low[1],
            check_in[0],
            check_in[1],
            self.fixed_channel,
        ]
    }

    /// Unpacks settings from their on-flash layout.
    pub fn from_bytes(b: &[u8; SETTINGS_LEN]) -> Self {
        Self {
            settings_ver: b[0],
            enable_fast_boot: b[1],
            enable_rf_wake: b[2],
            enable_tag_roaming: b[3],
            enable_scan_for_ap_after_timeout: b[4],
            enable_low_bat_symbol: b[5],
            enable_no_rf_symbol: b[6],
            fast_boot_capabilities: b[7],
            custom_mode: b[8],
            bat_low_voltage: u16::from_le_bytes([b[9], b[10]]),
            minimum_check_in_time: u16::from_le_bytes([b[11], b[12]]),
            fixed_channel: b[13],
        }
    }

    fn stored_image(&self) -> [u8; STORED_LEN] {
        let mut image = [0u8; STORED_LEN];
        image[..MAGIC_LEN].copy_from_slice(&SETTINGS_MAGIC.to_le_bytes());
        image[MAGIC_LEN..].copy_from_slice(&self.to_bytes());
        image
    }

    /// Loads the settings block, falling back to [`TagSettings::default`]
    /// when the block was never written or has been invalidated.
    pub fn load<F: SerialFlash + ?Sized>(flash: &mut F) -> Result<Self, FlashError> {
        let mut image = [0u8; STORED_LEN];
        flash.read(SETTINGS_AREA_START, &mut image)?;
        let magic = u32::from_le_bytes([image[0], image[1], image[2], image[3]]);
        let mut body = [0u8; SETTINGS_LEN];
        body.copy_from_slice(&image[MAGIC_LEN..]);
        let settings = Self::from_bytes(&body);

        if magic != SETTINGS_MAGIC || settings.settings_ver == 0xff {
            info!("settings: loaded defaults");
            return Ok(Self::default());
        }
        if settings.settings_ver < SETTINGS_STRUCT_VERSION {
            info!("settings: upgraded from version {}", settings.settings_ver);
        } else {
            debug!("settings: loaded from flash");
        }
        Ok(settings)
    }

    /// Stores the settings block unless flash already holds exactly these settings.
    ///
    /// # Returns
    /// - `Ok(SaveOutcome::Unchanged)` without any erase or write when the
    ///   stored block matches
    /// - `Ok(SaveOutcome::Written)` after erase, program and read-back verify
    /// - `Err(FlashError::VerifyFailed)` when the read-back differs
    pub fn save<F: SerialFlash + ?Sized>(&self, flash: &mut F) -> Result<SaveOutcome, FlashError> {
        let wanted = self.stored_image();
        let mut stored = [0u8; STORED_LEN];
        flash.read(SETTINGS_AREA_START, &mut stored)?;
        if stored == wanted {
            debug!("settings: unchanged");
            return Ok(SaveOutcome::Unchanged);
        }

        flash.erase_sectors(SETTINGS_AREA_START, 1)?;
        flash.write(SETTINGS_AREA_START, &wanted[..MAGIC_LEN])?;
        flash.write(SETTINGS_AREA_START + MAGIC_LEN as u32, &wanted[MAGIC_LEN..])?;

        flash.read(SETTINGS_AREA_START, &mut stored)?;
        if let Some(pos) = stored.iter().zip(wanted.iter()).position(|(a, b)| a != b) {
            error!("settings: verify failed at byte {}", pos);
            return Err(FlashError::VerifyFailed(SETTINGS_AREA_START + pos as u32));
        }
        info!("settings: updated");
        Ok(SaveOutcome::Written)
    }

    /// Clears the magic word so the next [`TagSettings::load`] returns defaults.
    pub fn invalidate<F: SerialFlash + ?Sized>(flash: &mut F) -> Result<(), FlashError> {
        info!("settings: invalidated");
        flash.write(SETTINGS_AREA_START, &[0; MAGIC_LEN])
    }

    /// Adopts a settings block received from the access point.
    ///
    /// # Arguments
    /// - `buf`: the block as sent, version byte first
    /// - `capabilities`: this tag's fast boot capability bits, which always
    ///   override whatever the access point sent
    ///
    /// # Returns
    /// `true` when the block had the current layout version and was taken over.
    ///
    /// # Notes
    /// Call [`TagSettings::save`] afterwards to persist.
    pub fn apply_from_buffer(&mut self, buf: &[u8], capabilities: u8) -> bool {
        let accepted = match buf.get(..SETTINGS_LEN) {
            Some(body) if body[0] == SETTINGS_STRUCT_VERSION => {
                let mut packed = [0u8; SETTINGS_LEN];
                packed.copy_from_slice(body);
                *self = Self::from_bytes(&packed);
                true
            }
            _ => {
                warn!(
                    "settings: ignoring block with version {}",
                    buf.first().copied().unwrap_or(0)
                );
                false
            }
        };
        self.fast_boot_capabilities = capabilities;
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeFlash;

    #[test]
    fn test_blank_flash_loads_defaults() {
        let mut flash = FakeFlash::new(0x10000);
        assert_eq!(TagSettings::load(&mut flash), Ok(TagSettings::default()));
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let mut flash = FakeFlash::new(0x10000);
        let settings = TagSettings {
            enable_fast_boot: 1,
            bat_low_voltage: 2600,
            minimum_check_in_time: 300,
            fixed_channel: 203,
            ..TagSettings::default()
        };
        assert_eq!(settings.save(&mut flash), Ok(SaveOutcome::Written));
        assert_eq!(TagSettings::load(&mut flash), Ok(settings));
        assert_eq!(flash.erases, 1);
    }

    #[test]
    fn test_identical_save_is_skipped() {
        let mut flash = FakeFlash::new(0x10000);
        let settings = TagSettings::default();
        assert_eq!(settings.save(&mut flash), Ok(SaveOutcome::Written));
        let (erases, writes) = (flash.erases, flash.writes);
        assert_eq!(settings.save(&mut flash), Ok(SaveOutcome::Unchanged));
        assert_eq!((flash.erases, flash.writes), (erases, writes));
    }

    #[test]
    fn test_changed_save_rewrites() {
        let mut flash = FakeFlash::new(0x10000);
        let mut settings = TagSettings::default();
        assert_eq!(settings.save(&mut flash), Ok(SaveOutcome::Written));
        settings.fixed_channel = 101;
        assert_eq!(settings.save(&mut flash), Ok(SaveOutcome::Written));
        assert_eq!(flash.erases, 2);
        assert_eq!(TagSettings::load(&mut flash).map(|s| s.fixed_channel), Ok(101));
    }

    /// Flash with one cell that always reads back with its low bit flipped.
    #[derive(Debug)]
    struct FlakyFlash {
        inner: FakeFlash,
        bad: u32,
    }

    impl SerialFlash for FlakyFlash {
        fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
            self.inner.read(addr, buf)?;
            if let Some(b) = self.bad.checked_sub(addr).and_then(|i| buf.get_mut(i as usize)) {
                *b ^= 1;
            }
            Ok(())
        }

        fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
            self.inner.write(addr, data)
        }

        fn erase_sectors(&mut self, addr: u32, count: u16) -> Result<(), FlashError> {
            self.inner.erase_sectors(addr, count)
        }
    }

    #[test]
    fn test_save_reports_verify_failure() {
        let mut flash = FlakyFlash {
            inner: FakeFlash::new(0x10000),
            bad: SETTINGS_AREA_START + 6,
        };
        let settings = TagSettings::default();
        assert_eq!(
            settings.save(&mut flash),
            Err(FlashError::VerifyFailed(SETTINGS_AREA_START + 6))
        );
        assert_eq!(flash.inner.erases, 1);
        assert_eq!(flash.inner.writes, 2);
    }

    #[test]
    fn test_invalidate_restores_defaults() {
        let mut flash = FakeFlash::new(0x10000);
        let settings = TagSettings {
            custom_mode: 7,
            ..TagSettings::default()
        };
        assert_eq!(settings.save(&mut flash), Ok(SaveOutcome::Written));
        assert_eq!(TagSettings::invalidate(&mut flash), Ok(()));
        assert_eq!(TagSettings::load(&mut flash), Ok(TagSettings::default()));
    }

    #[test]
    fn test_erased_version_byte_means_defaults() {
        let mut flash = FakeFlash::new(0x10000);
        let mut bytes = [0xffu8; STORED_LEN];
        bytes[..4].copy_from_slice(&SETTINGS_MAGIC.to_le_bytes());
        assert_eq!(flash.write(SETTINGS_AREA_START, &bytes), Ok(()));
        assert_eq!(TagSettings::load(&mut flash), Ok(TagSettings::default()));
    }

    #[test]
    fn test_apply_from_buffer() {
        let mut settings = TagSettings::default();
        let mut incoming = TagSettings {
            enable_rf_wake: 1,
            fast_boot_capabilities: 0x55,
            ..TagSettings::default()
        }
        .to_bytes();
        assert!(settings.apply_from_buffer(&incoming, 0x0c));
        assert_eq!(settings.enable_rf_wake, 1);
        assert_eq!(settings.fast_boot_capabilities, 0x0c);

        incoming[0] = 9;
        incoming[2] = 0;
        assert!(!settings.apply_from_buffer(&incoming, 0x0c));
        assert_eq!(settings.enable_rf_wake, 1);
        assert!(!settings.apply_from_buffer(&incoming[..3], 0x0c));
    }
}

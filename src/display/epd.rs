//! Transfer engine for the panel controller(s).
//!
//! Two UC8154-like controllers may be cascaded, each owning one half of the
//! panel. Commands always go to both; image data is streamed to the master,
//! which forwards the slave's share.
//!
//! ```text
//!   CS0: 200 px       CS1: 200 px
//! +---------------+---------------+
//! |               |               |
//! |    master     |     slave     |  300 px
//! |               |               |
//! +---------------+---------------+
//! ```
//!
//! [`EpdControl`] abstracts the control lines so the engine works with
//! plain GPIOs ([`EpdPins`]) as well as with boards that have to mux the
//! SPI pins between the flash and the panel.

use super::Plane;
use super::cmd;
use crate::battery::{MinTracker, VoltageMonitor};
use crate::consts::{EPD_SETTLE_MS, REFRESH_POLL_MS};
use crate::error::{BusError, DisplayError};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiBus;

const BUSY_POLL_MS: u32 = 1;

/// Control lines of the panel, excluding the SPI data and clock.
pub trait EpdControl {
    /// Asserts the master chip select, and the slave's too when `cascade` is set.
    fn select(&mut self, cascade: bool) -> Result<(), BusError>;

    /// Releases both chip selects.
    fn deselect(&mut self) -> Result<(), BusError>;

    /// Drives the D/C line: `true` for a command byte, `false` for data.
    fn set_command_mode(&mut self, command: bool) -> Result<(), BusError>;

    /// Drives the reset line.
    fn set_reset(&mut self, asserted: bool) -> Result<(), BusError>;

    /// Switches the panel supply.
    fn set_power(&mut self, on: bool) -> Result<(), BusError>;

    /// Whether the controller reports busy.
    fn is_busy(&mut self) -> Result<bool, BusError>;

    /// Drives every control line low so nothing back-powers an unpowered panel.
    fn park(&mut self) -> Result<(), BusError>;

    /// Hands the shared clock and data lines to the SPI peripheral.
    fn attach_bus(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    /// Returns the shared clock and data lines to plain GPIO.
    fn detach_bus(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

/// [`EpdControl`] on discrete GPIOs.
///
/// Chip selects, reset and the supply enable are active low; the busy line
/// is active low unless `busy_inverted` is set.
#[derive(Debug)]
pub struct EpdPins<CS0, CS1, DC, RST, EN, BUSY> {
    /// Master chip select.
    pub cs0: CS0,
    /// Slave chip select on cascaded panels.
    pub cs1: Option<CS1>,
    /// Data/command select.
    pub dc: DC,
    /// Controller reset.
    pub rst: RST,
    /// Panel supply enable.
    pub en: EN,
    /// Busy indication.
    pub busy: BUSY,
    busy_inverted: bool,
}

impl<CS0, CS1, DC, RST, EN, BUSY> EpdPins<CS0, CS1, DC, RST, EN, BUSY>
where
    CS0: OutputPin,
    CS1: OutputPin,
    DC: OutputPin,
    RST: OutputPin,
    EN: OutputPin,
    BUSY: InputPin,
{
    /// Bundles the control pins. Nothing is driven until the engine powers up.
    ///
    /// # Arguments
    /// - `cs1`: the slave select of a cascaded panel, `None` for a single controller
    /// - `busy_inverted`: `Some(true)` when the busy line reads high while busy
    pub fn new(
        cs0: CS0,
        cs1: Option<CS1>,
        dc: DC,
        rst: RST,
        en: EN,
        busy: BUSY,
        busy_inverted: Option<bool>,
    ) -> Self {
        Self {
            cs0,
            cs1,
            dc,
            rst,
            en,
            busy,
            busy_inverted: busy_inverted.unwrap_or(false),
        }
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), BusError> {
    if high {
        pin.set_high().map_err(|_| BusError::Pin)
    } else {
        pin.set_low().map_err(|_| BusError::Pin)
    }
}

impl<CS0, CS1, DC, RST, EN, BUSY> EpdControl for EpdPins<CS0, CS1, DC, RST, EN, BUSY>
where
    CS0: OutputPin,
    CS1: OutputPin,
    DC: OutputPin,
    RST: OutputPin,
    EN: OutputPin,
    BUSY: InputPin,
{
    fn select(&mut self, cascade: bool) -> Result<(), BusError> {
        drive(&mut self.cs0, false)?;
        if let (true, Some(cs1)) = (cascade, self.cs1.as_mut()) {
            drive(cs1, false)?;
        }
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), BusError> {
        drive(&mut self.cs0, true)?;
        if let Some(cs1) = self.cs1.as_mut() {
            drive(cs1, true)?;
        }
        Ok(())
    }

    fn set_command_mode(&mut self, command: bool) -> Result<(), BusError> {
        drive(&mut self.dc, !command)
    }

    fn set_reset(&mut self, asserted: bool) -> Result<(), BusError> {
        drive(&mut self.rst, !asserted)
    }

    fn set_power(&mut self, on: bool) -> Result<(), BusError> {
        drive(&mut self.en, !on)
    }

    fn is_busy(&mut self) -> Result<bool, BusError> {
        let high = self.busy.is_high().map_err(|_| BusError::Pin)?;
        Ok(high == self.busy_inverted)
    }

    fn park(&mut self) -> Result<(), BusError> {
        drive(&mut self.cs0, false)?;
        if let Some(cs1) = self.cs1.as_mut() {
            drive(cs1, false)?;
        }
        drive(&mut self.dc, false)?;
        drive(&mut self.rst, false)
    }
}

/// Tunables of the transfer engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct EpdConfig {
    /// VCOM DC calibration byte, programmed last during power up.
    pub vcom: u8,
    /// Give up on a busy panel after this long. `None` waits forever.
    pub busy_timeout_ms: Option<u32>,
}

impl Default for EpdConfig {
    fn default() -> Self {
        Self {
            vcom: 0x08,
            busy_timeout_ms: None,
        }
    }
}

/// The panel transfer engine.
#[derive(Debug)]
pub struct Epd<SPI, C> {
    spi: SPI,
    ctl: C,
    config: EpdConfig,
    cascade: bool,
    powered: bool,
    refresh_battery_mv: Option<u16>,
}

impl<SPI, C> Epd<SPI, C>
where
    SPI: SpiBus<u8>,
    C: EpdControl,
{
    /// Creates the engine for a cascaded pair of controllers.
    pub fn new(spi: SPI, ctl: C, config: EpdConfig) -> Self {
        Self {
            spi,
            ctl,
            config,
            cascade: true,
            powered: false,
            refresh_battery_mv: None,
        }
    }

    /// Creates the engine for a panel with a single controller.
    pub fn new_single(spi: SPI, ctl: C, config: EpdConfig) -> Self {
        Self {
            cascade: false,
            ..Self::new(spi, ctl, config)
        }
    }

    /// Returns the bus and the control lines.
    pub fn release(self) -> (SPI, C) {
        (self.spi, self.ctl)
    }

    /// Whether the panel is powered and configured.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Lowest battery voltage seen during the last refresh.
    pub fn refresh_battery_mv(&self) -> Option<u16> {
        self.refresh_battery_mv
    }

    /// The engine settings.
    pub fn config(&self) -> &EpdConfig {
        &self.config
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), DisplayError> {
        self.spi.write(bytes).map_err(|_| BusError::Spi)?;
        self.spi.flush().map_err(|_| BusError::Spi)?;
        Ok(())
    }

    fn command(&mut self, command: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.ctl.select(self.cascade)?;
        self.ctl.set_command_mode(true)?;
        self.write(&[command])?;
        self.ctl.set_command_mode(false)?;
        if !data.is_empty() {
            self.write(data)?;
        }
        self.ctl.deselect()?;
        Ok(())
    }

    /// Replays a `[count][command][data..]` table to all controllers.
    pub fn send_table(&mut self, table: &[u8]) -> Result<(), DisplayError> {
        for (command, data) in cmd::entries(table) {
            self.command(command, data)?;
        }
        Ok(())
    }

    fn wait_busy_while<D: DelayNs>(
        &mut self,
        delay: &mut D,
        busy: bool,
        step_ms: u32,
        mut on_poll: impl FnMut(),
    ) -> Result<(), DisplayError> {
        let mut waited: u32 = 0;
        while self.ctl.is_busy()? == busy {
            if self.config.busy_timeout_ms.is_some_and(|limit| waited >= limit) {
                warn!("epd: busy line stuck after {} ms", waited);
                return Err(DisplayError::BusyTimeout);
            }
            delay.delay_ms(step_ms);
            waited = waited.saturating_add(step_ms);
            on_poll();
        }
        Ok(())
    }

    /// Powers and configures the panel unless it already is.
    ///
    /// Supply on, bus attached, reset released, power-up table, power on,
    /// setup table with the waveform tables, and finally the VCOM byte.
    pub fn power_up_if_needed<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), DisplayError> {
        if self.powered {
            return Ok(());
        }
        // set first so a failed power up can still be shut down
        self.powered = true;
        debug!("epd: power up");

        self.ctl.deselect()?;
        self.ctl.set_power(true)?;
        self.ctl.attach_bus()?;
        delay.delay_ms(EPD_SETTLE_MS);
        self.ctl.set_reset(false)?;
        delay.delay_ms(EPD_SETTLE_MS);
        self.wait_busy_while(delay, true, BUSY_POLL_MS, || {})?;

        self.send_table(cmd::POWER_UP)?;
        self.command(cmd::POWER_ON, &[])?;
        // the busy pulse may already be over by the first poll
        for _ in 0..EPD_SETTLE_MS {
            if self.ctl.is_busy()? {
                break;
            }
            delay.delay_ms(BUSY_POLL_MS);
        }
        self.wait_busy_while(delay, true, BUSY_POLL_MS, || {})?;

        self.send_table(cmd::SETUP)?;
        self.command(cmd::VCOM_DC_SETTING, &[self.config.vcom])?;
        trace!("epd: vcom {:#x}", self.config.vcom);
        Ok(())
    }

    /// Powers the panel down and parks its lines. Does nothing when already off.
    pub fn shutdown(&mut self) -> Result<(), DisplayError> {
        if !self.powered {
            return Ok(());
        }
        debug!("epd: shutdown");
        self.send_table(cmd::POWER_OFF_SEQUENCE)?;
        self.ctl.detach_bus()?;
        self.ctl.park()?;
        self.ctl.set_power(false)?;
        self.powered = false;
        Ok(())
    }

    /// Starts transmission of `plane`, powering up first if needed.
    pub fn start_transfer<D: DelayNs>(
        &mut self,
        delay: &mut D,
        plane: Plane,
    ) -> Result<(), DisplayError> {
        self.power_up_if_needed(delay)?;
        let command = match plane {
            Plane::Mono => cmd::START_TRANSMISSION_DTM1,
            Plane::Accent => cmd::START_TRANSMISSION_DTM2,
        };
        trace!("epd: start transfer {:#x}", command);
        self.command(command, &[])
    }

    /// Selects the master controller for a run of [`Epd::send_byte`] calls.
    pub fn begin_data(&mut self) -> Result<(), DisplayError> {
        self.ctl.select(false)?;
        self.ctl.set_command_mode(false)?;
        Ok(())
    }

    /// Sends one data byte once the previous one has left the bus.
    pub fn send_byte(&mut self, byte: u8) -> Result<(), DisplayError> {
        self.spi.flush().map_err(|_| BusError::Spi)?;
        self.spi.write(&[byte]).map_err(|_| BusError::Spi)?;
        Ok(())
    }

    /// Ends a data run.
    pub fn end_data(&mut self) -> Result<(), DisplayError> {
        self.spi.flush().map_err(|_| BusError::Spi)?;
        self.ctl.deselect()?;
        Ok(())
    }

    /// Refreshes the panel, sleeps while it is busy and shuts it down.
    ///
    /// The battery is sampled after every sleep, and at least once; the
    /// lowest reading becomes [`Epd::refresh_battery_mv`].
    ///
    /// # Returns
    /// `Err(DisplayError::BusyTimeout)` if a busy timeout is configured and
    /// exceeded. The panel is shut down either way.
    pub fn refresh_and_sleep<D, B>(&mut self, delay: &mut D, battery: &mut B) -> Result<(), DisplayError>
    where
        D: DelayNs,
        B: VoltageMonitor + ?Sized,
    {
        info!("epd: refresh");
        self.send_table(cmd::START_REFRESH)?;
        let mut lowest = MinTracker::new();
        let waited = self.wait_busy_while(delay, true, REFRESH_POLL_MS, || lowest.sample(battery));
        if lowest.lowest_raw().is_none() {
            lowest.sample(battery);
        }
        if let Some(mv) = lowest.lowest_millivolts(battery) {
            self.refresh_battery_mv = Some(mv);
        }
        let shut = self.shutdown();
        waited?;
        shut?;
        info!("epd: refresh done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeBattery, FakeControl, RecordingSpi, table_bytes};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    #[test]
    fn test_command_toggles_dc_and_both_selects() {
        let spi = SpiMock::new(&[
            SpiTransaction::write_vec(vec![0x82]),
            SpiTransaction::flush(),
            SpiTransaction::write_vec(vec![0x08]),
            SpiTransaction::flush(),
        ]);
        let cs0 = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let cs1 = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let dc = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let rst = PinMock::new(&[]);
        let en = PinMock::new(&[]);
        let busy = PinMock::new(&[]);
        let pins = EpdPins::new(cs0, Some(cs1), dc, rst, en, busy, None);
        let mut epd = Epd::new(spi, pins, EpdConfig::default());

        assert_eq!(epd.send_table(&[2, 0x82, 0x08, 0]), Ok(()));

        let (mut spi, pins) = epd.release();
        spi.done();
        pins_done(pins);
    }

    type MockPins = EpdPins<PinMock, PinMock, PinMock, PinMock, PinMock, PinMock>;

    fn busy_pins(level: PinState, inverted: Option<bool>) -> MockPins {
        EpdPins::new(
            PinMock::new(&[]),
            None,
            PinMock::new(&[]),
            PinMock::new(&[]),
            PinMock::new(&[]),
            PinMock::new(&[PinTransaction::get(level)]),
            inverted,
        )
    }

    fn pins_done(mut pins: MockPins) {
        pins.cs0.done();
        let _ = pins.cs1.as_mut().map(|cs1| cs1.done());
        pins.dc.done();
        pins.rst.done();
        pins.en.done();
        pins.busy.done();
    }

    #[test]
    fn test_busy_polarity() {
        let mut active_low = busy_pins(PinState::Low, None);
        assert_eq!(active_low.is_busy(), Ok(true));
        pins_done(active_low);

        let mut active_high = busy_pins(PinState::Low, Some(true));
        assert_eq!(active_high.is_busy(), Ok(false));
        pins_done(active_high);
    }

    #[test]
    fn test_park_drives_lines_low() {
        let low = || PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let mut pins: MockPins =
            EpdPins::new(low(), Some(low()), low(), low(), PinMock::new(&[]), PinMock::new(&[]), None);
        assert_eq!(pins.park(), Ok(()));
        pins_done(pins);
    }

    #[test]
    fn test_power_up_sequence() {
        let mut ctl = FakeControl::new();
        ctl.script_busy(&[true, false, true, true, false]);
        let mut epd = Epd::new(RecordingSpi::new(), ctl, EpdConfig { vcom: 0x1c, ..EpdConfig::default() });
        let mut delay = NoopDelay::new();

        assert_eq!(epd.power_up_if_needed(&mut delay), Ok(()));
        assert!(epd.is_powered());
        // second call is a no-op
        assert_eq!(epd.power_up_if_needed(&mut delay), Ok(()));

        let (spi, ctl) = epd.release();
        let mut expected = table_bytes(cmd::POWER_UP);
        expected.push(cmd::POWER_ON);
        expected.extend(table_bytes(cmd::SETUP));
        expected.extend([cmd::VCOM_DC_SETTING, 0x1c]);
        assert_eq!(spi.written, expected);
        assert!(ctl.powered);
        assert!(ctl.attached);
        assert!(!ctl.reset_asserted);
        assert_eq!(ctl.power_cycles, 1);
        assert_eq!(ctl.cascade_selects, 2 + 1 + 13 + 1);
    }

    #[test]
    fn test_shutdown_parks_and_is_idempotent() {
        let mut epd = Epd::new(RecordingSpi::new(), FakeControl::new(), EpdConfig::default());
        let mut delay = NoopDelay::new();
        assert_eq!(epd.shutdown(), Ok(()));
        assert_eq!(epd.power_up_if_needed(&mut delay), Ok(()));
        assert_eq!(epd.shutdown(), Ok(()));
        assert_eq!(epd.shutdown(), Ok(()));
        assert!(!epd.is_powered());

        let (spi, ctl) = epd.release();
        assert!(spi.written.ends_with(&table_bytes(cmd::POWER_OFF_SEQUENCE)));
        assert!(!ctl.powered);
        assert!(ctl.parked);
        assert!(!ctl.attached);
        assert_eq!(ctl.power_cycles, 1);
    }

    #[test]
    fn test_start_transfer_picks_buffer() {
        let mut epd = Epd::new_single(RecordingSpi::new(), FakeControl::new(), EpdConfig::default());
        let mut delay = NoopDelay::new();
        assert_eq!(epd.start_transfer(&mut delay, Plane::Accent), Ok(()));
        assert_eq!(epd.begin_data(), Ok(()));
        assert_eq!(epd.send_byte(0xa5), Ok(()));
        assert_eq!(epd.end_data(), Ok(()));
        let (spi, ctl) = epd.release();
        assert!(spi.written.ends_with(&[cmd::START_TRANSMISSION_DTM2, 0xa5]));
        assert_eq!(ctl.cascade_selects, 0);
        assert!(!ctl.selected);
    }

    #[test]
    fn test_refresh_samples_battery_until_idle() {
        let mut epd = Epd::new(RecordingSpi::new(), FakeControl::new(), EpdConfig::default());
        let mut delay = NoopDelay::new();
        let mut battery = FakeBattery::new(&[820, 790, 805]);
        assert_eq!(epd.power_up_if_needed(&mut delay), Ok(()));
        epd.ctl.script_busy(&[true, true, true, false]);

        assert_eq!(epd.refresh_and_sleep(&mut delay, &mut battery), Ok(()));
        assert_eq!(epd.refresh_battery_mv(), Some(2370));
        assert!(!epd.is_powered());
    }

    #[test]
    fn test_refresh_times_out_and_still_shuts_down() {
        let config = EpdConfig {
            busy_timeout_ms: Some(200),
            ..EpdConfig::default()
        };
        let mut epd = Epd::new(RecordingSpi::new(), FakeControl::new(), config);
        let mut delay = NoopDelay::new();
        let mut battery = FakeBattery::new(&[800]);
        assert_eq!(epd.power_up_if_needed(&mut delay), Ok(()));
        epd.ctl.script_busy(&[true; 16]);

        assert_eq!(
            epd.refresh_and_sleep(&mut delay, &mut battery),
            Err(DisplayError::BusyTimeout)
        );
        assert!(!epd.is_powered());
        assert_eq!(epd.refresh_battery_mv(), Some(2400));
    }

    #[test]
    fn test_refresh_samples_battery_when_never_busy() {
        let mut epd = Epd::new(RecordingSpi::new(), FakeControl::new(), EpdConfig::default());
        let mut delay = NoopDelay::new();
        let mut battery = FakeBattery::new(&[810, 700]);
        assert_eq!(epd.power_up_if_needed(&mut delay), Ok(()));
        epd.ctl.script_busy(&[]);

        assert_eq!(epd.refresh_and_sleep(&mut delay, &mut battery), Ok(()));
        assert_eq!(epd.refresh_battery_mv(), Some(2430));

        // a second refresh replaces the reading instead of keeping it
        assert_eq!(epd.power_up_if_needed(&mut delay), Ok(()));
        epd.ctl.script_busy(&[]);
        assert_eq!(epd.refresh_and_sleep(&mut delay, &mut battery), Ok(()));
        assert_eq!(epd.refresh_battery_mv(), Some(2100));
    }
}

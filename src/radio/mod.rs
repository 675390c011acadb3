//! Sub-GHz radio link.
//!
//! [`Radio`] is the surface the protocol layer talks to: channel and power
//! programming, synchronous transmit, and asynchronous receive through the
//! three-slot [`RxRing`]. It sits on a [`Transceiver`], which is either the
//! CC1110 radio core of a tag or a [`Cc1101`] on the access point's SPI bus.
//!
//! ## State machine
//!
//! ```text
//!         enable_rx(true, _), free slot           transmit()
//!   Idle  ─────────────────────────────▶  RX  ─────────────────▶  TX
//!    ▲                                     ▲                       │
//!    └─── enable_rx(false, _) ─────────────┴─── re-armed if rx_on ─┘
//! ```
//!
//! - RX is armed only while receive is enabled and the ring has a free slot.
//! - The RX-complete interrupt ([`Radio::on_rx_complete`]) accepts a frame
//!   only when its length fits and the CRC-ok bit is set, then re-arms.
//!   With auto-ACK on, acknowledgement frames are recorded instead of queued.
//! - TX always stops RX first and is never interrupted by it.
//!
//! Every public operation first checks, in order, that [`Radio::init`] has
//! run, the chip is present, configured and enabled, and fails with the first
//! unmet condition.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chroma_tag::radio::{Radio, RadioConfig};
//!
//! let mut radio = Radio::new(chip, RadioConfig::default());
//! radio.init()?;
//! radio.set_channel(203)?;
//! radio.enable_rx(true, false)?;
//! loop {
//!     match radio.receive() {
//!         Ok(frame) => handle(frame.payload()),
//!         Err(nb::Error::WouldBlock) => {}
//!         Err(nb::Error::Other(e)) => return Err(e),
//!     }
//! }
//! ```

mod cc1101;
#[cfg(feature = "global-irq")]
pub mod isr;
pub mod regs;
mod ring;
mod transceiver;

pub use cc1101::Cc1101;
pub use regs::{Band, ChannelSettings, RfSetting, RfTable};
pub use ring::{RxRing, RxSlot};
pub use transceiver::{Strobe, Transceiver};

use crate::battery::{MinTracker, VoltageMonitor};
use crate::consts::{
    FRAME_TYPE_ACK, FRAME_TYPE_MASK, RADIO_MAX_PACKET_LEN_USIZE, RX_SLOT_LEN, RX_STATUS_LQI_MASK,
};
use crate::error::RadioError;
use heapless::Vec;

/// Construction-time settings of a [`Radio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioConfig {
    /// RF table applied by [`Radio::init`].
    pub table: RfTable,
    /// Output power programmed by [`Radio::init`], in dBm.
    pub tx_power_dbm: i8,
    /// Channel programmed by [`Radio::init`]; `None` keeps the table's frequency.
    pub channel: Option<u8>,
    /// Upper bound on status polls while waiting for the chip. `None` waits forever.
    pub poll_limit: Option<u32>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            table: regs::LEGACY_250K_915,
            tx_power_dbm: 10,
            channel: None,
            poll_limit: None,
        }
    }
}

/// Flags gating the public radio operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct RadioState {
    /// [`Radio::init`] got an answer to the identity check.
    pub checked: bool,
    /// The chip answered the identity check.
    pub present: bool,
    /// A configuration table has been applied since the last chip reset.
    pub initialized: bool,
    /// [`Radio::init`] completed.
    pub enabled: bool,
    /// Receive is enabled by the caller.
    pub rx_on: bool,
    /// Acknowledgement frames are recorded instead of queued.
    pub auto_ack: bool,
    /// The carrier test is running.
    pub freq_test: bool,
    /// An edge interrupt flagged a received frame that has not been serviced.
    pub rx_irq_raised: bool,
}

/// A received frame with its link metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct RxFrame {
    payload: Vec<u8, RADIO_MAX_PACKET_LEN_USIZE>,
    /// Link quality, 0..=255.
    pub lqi: u8,
    /// Signal strength in dBm.
    pub rssi: i16,
}

impl RxFrame {
    /// The frame payload, without length byte or status bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Scales the raw LQI status byte: lower raw values are better links.
fn link_quality(raw: u8) -> u8 {
    let lqi = 148 - (raw & RX_STATUS_LQI_MASK);
    if lqi >= 127 { 255 } else { lqi * 2 }
}

/// Converts the raw RSSI status byte (half-dB, two's complement) to dBm.
fn signal_strength(raw: u8) -> i16 {
    i16::from((raw as i8) >> 1) - 77
}

/// Sequence number of an 802.15.4-style acknowledgement frame.
fn ack_sequence(payload: &[u8]) -> Option<u8> {
    match payload {
        [fc, _, seq, ..] if fc & FRAME_TYPE_MASK == FRAME_TYPE_ACK => Some(*seq),
        _ => None,
    }
}

/// The radio link on top of a [`Transceiver`].
#[derive(Debug)]
pub struct Radio<T> {
    chip: T,
    config: RadioConfig,
    state: RadioState,
    ring: RxRing,
    table: RfTable,
    pa_code: u8,
    last_ack: Option<u8>,
    last_lqi: u8,
    last_rssi: i16,
    tx_battery_mv: Option<u16>,
    /// Frames accepted into the ring.
    pub rx_good: u16,
    /// Frames dropped for a bad length or CRC.
    pub rx_bad: u16,
    /// Valid frames dropped because the ring had no free slot.
    pub rx_overflow: u16,
    /// Completed transmissions.
    pub tx_good: u16,
}

impl<T: Transceiver> Radio<T> {
    /// Wraps `chip`. Nothing is sent to the chip before [`Radio::init`].
    pub fn new(chip: T, config: RadioConfig) -> Self {
        Self {
            chip,
            table: config.table,
            pa_code: regs::power_code(config.tx_power_dbm),
            config,
            state: RadioState::default(),
            ring: RxRing::new(),
            last_ack: None,
            last_lqi: 0,
            last_rssi: 0,
            tx_battery_mv: None,
            rx_good: 0,
            rx_bad: 0,
            rx_overflow: 0,
            tx_good: 0,
        }
    }

    /// Detects, resets and configures the chip, then enables the link.
    ///
    /// # Returns
    /// - `Err(RadioError::ChipNotFound)` when the identity check fails; every
    ///   other operation reports the same until `init` succeeds
    /// - `Err(RadioError::Timeout)` when the chip never reports idle after reset
    ///
    /// # Notes
    /// Receive stays off; call [`Radio::enable_rx`] to start listening.
    pub fn init(&mut self) -> Result<(), RadioError> {
        self.state = RadioState::default();
        let found = self.chip.is_present()?;
        self.state.checked = true;
        if !found {
            warn!("radio: transceiver not found");
            return Err(RadioError::ChipNotFound);
        }
        self.state.present = true;

        self.reset_chip()?;
        self.table = self.config.table;
        self.apply_table(self.table)?;
        self.pa_code = regs::power_code(self.config.tx_power_dbm);
        self.chip.write_pa(self.pa_code)?;
        if let Some(ch) = self.config.channel {
            self.program_channel(ch)?;
        }
        self.ring.reset();
        self.last_ack = None;
        self.state.enabled = true;
        info!("radio: ready, pa {:#x}", self.pa_code);
        Ok(())
    }

    /// Switches to another RF table, e.g. on a band change.
    ///
    /// The chip is reset, `table` applied and the current output power
    /// restored. Listening resumes if receive was enabled.
    pub fn select_config(&mut self, table: RfTable) -> Result<(), RadioError> {
        self.check_state()?;
        self.stop_rx()?;
        self.reset_chip()?;
        self.apply_table(table)?;
        self.table = table;
        self.chip.write_pa(self.pa_code)?;
        self.start_listen_if_needed()
    }

    /// Tunes to tag channel `ch`.
    ///
    /// See [`ChannelSettings::for_channel`] for the channel plan.
    pub fn set_channel(&mut self, ch: u8) -> Result<(), RadioError> {
        self.check_state()?;
        self.stop_rx()?;
        self.program_channel(ch)?;
        self.start_listen_if_needed()
    }

    /// Sets the output power, clamped to `[-30, 10]` dBm.
    pub fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        self.check_state()?;
        self.pa_code = regs::power_code(dbm);
        debug!("radio: tx power {} dBm, pa {:#x}", dbm, self.pa_code);
        self.chip.write_pa(self.pa_code)?;
        Ok(())
    }

    /// Sends `frame` (`[len][payload..len]`) and waits until it has left the air.
    ///
    /// # Arguments
    /// - `frame`: length byte followed by at least that many payload bytes
    /// - `battery`: sampled on every poll of the done flag; the lowest
    ///   reading is kept as [`Radio::tx_battery_mv`]
    ///
    /// # Returns
    /// - `Err(RadioError::InvalidFrame)` if the length byte exceeds the packet
    ///   length or the buffer
    /// - `Err(RadioError::TestModeActive)` during the carrier test
    /// - `Err(RadioError::TransmitFailed)` when a poll limit is configured and
    ///   the done flag never came up
    ///
    /// # Notes
    /// Receive is stopped for the duration and re-armed afterwards if enabled.
    pub fn transmit<B>(&mut self, frame: &[u8], battery: &mut B) -> Result<(), RadioError>
    where
        B: VoltageMonitor + ?Sized,
    {
        self.check_state()?;
        if self.state.freq_test {
            return Err(RadioError::TestModeActive);
        }
        let len = frame.first().map(|&l| usize::from(l)).unwrap_or(0);
        if frame.is_empty() || len > RADIO_MAX_PACKET_LEN_USIZE || len + 1 > frame.len() {
            return Err(RadioError::InvalidFrame(frame.len()));
        }
        trace!("radio: tx {} bytes", len);

        self.stop_rx()?;
        self.chip.load_tx(&frame[..=len])?;
        self.chip.strobe(Strobe::Stx)?;

        let mut lowest = MinTracker::new();
        let mut polls: u32 = 0;
        let outcome = loop {
            if self.chip.tx_done()? {
                break Ok(());
            }
            lowest.sample(battery);
            polls = polls.saturating_add(1);
            if self.config.poll_limit.is_some_and(|limit| polls >= limit) {
                warn!("radio: tx done flag never set");
                break Err(RadioError::TransmitFailed);
            }
        };

        self.chip.abort_dma()?;
        if outcome.is_ok() {
            self.tx_good = self.tx_good.wrapping_add(1);
        }
        if let Some(mv) = lowest.lowest_millivolts(battery) {
            self.tx_battery_mv = Some(mv);
        }
        self.start_listen_if_needed()?;
        outcome
    }

    /// Turns receive on or off.
    ///
    /// Turning off always stops the chip and clears pending interrupt flags;
    /// turning on only arms the receiver if it was off.
    ///
    /// With `auto_ack` set, acknowledgement frames are kept for
    /// [`Radio::rx_ack_get_last`] instead of taking a ring slot.
    pub fn enable_rx(&mut self, on: bool, auto_ack: bool) -> Result<(), RadioError> {
        self.check_state()?;
        self.state.auto_ack = on && auto_ack;
        if !on {
            self.stop_rx()?;
            self.state.rx_on = false;
        } else if !self.state.rx_on {
            self.state.rx_on = true;
            self.start_listen_if_needed()?;
        }
        Ok(())
    }

    /// Takes the oldest received frame.
    ///
    /// # Returns
    /// - `Ok(frame)` with payload and link metrics
    /// - `Err(nb::Error::WouldBlock)` when nothing is waiting (or during the carrier test)
    ///
    /// # Notes
    /// The slot is handed back to the receiver only after the payload has
    /// been copied; if the ring had been full, listening resumes.
    pub fn receive(&mut self) -> nb::Result<RxFrame, RadioError> {
        self.check_state()?;
        if self.state.freq_test {
            return Err(nb::Error::WouldBlock);
        }
        if self.state.rx_irq_raised {
            self.on_rx_complete()?;
        }

        let Some(slot) = self.ring.read_slot() else {
            return Err(nb::Error::WouldBlock);
        };
        let len = usize::from(slot[0]).min(RADIO_MAX_PACKET_LEN_USIZE);
        let lqi = link_quality(slot[len + 2]);
        let rssi = signal_strength(slot[len + 1]);
        let payload =
            Vec::from_slice(&slot[1..=len]).map_err(|_| RadioError::InvalidFrame(len))?;

        self.last_lqi = lqi;
        self.last_rssi = rssi;
        if self.ring.release_read() == 0 {
            self.start_listen_if_needed()?;
        }
        trace!("radio: rx {} bytes lqi {} rssi {}", len, lqi, rssi);
        Ok(RxFrame { payload, lqi, rssi })
    }

    /// Drops every frame waiting in the ring.
    pub fn flush(&mut self) -> Result<(), RadioError> {
        self.check_state()?;
        if self.ring.flush() == 0 {
            self.start_listen_if_needed()?;
        }
        Ok(())
    }

    /// Sequence number of the last acknowledgement received, if any.
    pub fn rx_ack_get_last(&self) -> Option<u8> {
        self.last_ack
    }

    /// Forgets the last acknowledgement.
    pub fn rx_ack_reset(&mut self) {
        self.last_ack = None;
    }

    /// Starts or stops the unmodulated carrier test on `band`.
    ///
    /// While it runs, [`Radio::transmit`] fails with
    /// [`RadioError::TestModeActive`] and [`Radio::receive`] reports nothing.
    /// Stopping resets the chip and re-applies the active table.
    pub fn frequency_test(&mut self, band: Band, start: bool) -> Result<(), RadioError> {
        self.check_state()?;
        if start {
            info!("radio: starting carrier test");
            self.stop_rx()?;
            self.reset_chip()?;
            self.apply_table(regs::CARRIER_WAVE)?;
            self.apply_table(band.table())?;
            self.chip.write_pa(self.pa_code)?;
            self.chip.load_tx(&[])?;
            self.chip.strobe(Strobe::Stx)?;
            self.state.freq_test = true;
        } else {
            info!("radio: ending carrier test");
            self.state.freq_test = false;
            self.reset_chip()?;
            self.apply_table(self.table)?;
            self.chip.write_pa(self.pa_code)?;
            self.start_listen_if_needed()?;
        }
        Ok(())
    }

    /// Interrupt body for "receive complete".
    ///
    /// Moves the finished frame into the write slot, accepts it if it is
    /// valid, and re-arms the receiver. With auto-ACK on, acknowledgements
    /// are recorded for [`Radio::rx_ack_get_last`] instead of taking a slot.
    ///
    /// A frame that arrives while the ring is full is read off the chip and
    /// counted in [`Radio::rx_overflow`]; the receiver stays disarmed.
    pub fn on_rx_complete(&mut self) -> Result<(), RadioError> {
        self.state.rx_irq_raised = false;
        if !self.state.rx_on || self.state.freq_test {
            return Ok(());
        }
        if self.ring.is_full() {
            let mut spill: RxSlot = [0; RX_SLOT_LEN];
            if self.chip.read_frame(&mut spill)? {
                self.count_overflow();
            }
            return Ok(());
        }
        let slot = self.ring.write_slot();
        if self.chip.read_frame(slot)? {
            match RxRing::frame_len(slot) {
                Some(len) => {
                    let ack = if self.state.auto_ack {
                        ack_sequence(&slot[1..=len])
                    } else {
                        None
                    };
                    if let Some(seq) = ack {
                        self.last_ack = Some(seq);
                    } else if self.ring.commit_write() {
                        self.rx_good = self.rx_good.wrapping_add(1);
                    } else {
                        self.count_overflow();
                    }
                }
                None => {
                    self.rx_bad = self.rx_bad.wrapping_add(1);
                    debug!("radio: dropped frame, len {}", slot[0]);
                }
            }
        }
        self.start_listen_if_needed()
    }

    /// Records an RX edge interrupt to be serviced by the next [`Radio::receive`].
    ///
    /// For platforms whose interrupt handler may not touch the bus.
    pub fn signal_rx_irq(&mut self) {
        self.state.rx_irq_raised = true;
    }

    /// Current gating flags.
    pub fn state(&self) -> RadioState {
        self.state
    }

    /// The active RF table.
    pub fn table(&self) -> RfTable {
        self.table
    }

    /// Lowest battery voltage seen during the last transmission.
    pub fn tx_battery_mv(&self) -> Option<u16> {
        self.tx_battery_mv
    }

    /// LQI of the last frame returned by [`Radio::receive`].
    pub fn last_lqi(&self) -> u8 {
        self.last_lqi
    }

    /// RSSI of the last frame returned by [`Radio::receive`], in dBm.
    pub fn last_rssi(&self) -> i16 {
        self.last_rssi
    }

    /// Read access to the receive ring.
    pub fn ring(&self) -> &RxRing {
        &self.ring
    }

    /// Direct access to the transceiver, e.g. for register dumps.
    pub fn chip_mut(&mut self) -> &mut T {
        &mut self.chip
    }

    /// Returns the transceiver.
    pub fn release(self) -> T {
        self.chip
    }

    fn count_overflow(&mut self) {
        self.rx_overflow = self.rx_overflow.wrapping_add(1);
        warn!("radio: ring full, frame dropped");
    }

    fn check_state(&self) -> Result<(), RadioError> {
        let err = if !self.state.checked {
            RadioError::NotInitialized
        } else if !self.state.present {
            RadioError::ChipNotFound
        } else if !self.state.initialized {
            RadioError::NotInitialized
        } else if !self.state.enabled {
            RadioError::NotEnabled
        } else {
            return Ok(());
        };
        debug!("radio: rejected, {:?}", err);
        Err(err)
    }

    fn wait_idle(&mut self) -> Result<(), RadioError> {
        let mut polls: u32 = 0;
        while !self.chip.is_idle()? {
            polls = polls.saturating_add(1);
            if self.config.poll_limit.is_some_and(|limit| polls >= limit) {
                return Err(RadioError::Timeout);
            }
        }
        Ok(())
    }

    fn reset_chip(&mut self) -> Result<(), RadioError> {
        self.state.initialized = false;
        self.chip.reset()?;
        self.wait_idle()
    }

    fn apply_table(&mut self, table: RfTable) -> Result<(), RadioError> {
        for setting in regs::settings(table) {
            self.chip.write_reg(setting.addr, setting.value)?;
        }
        self.state.initialized = true;
        Ok(())
    }

    fn program_channel(&mut self, ch: u8) -> Result<(), RadioError> {
        let settings = ChannelSettings::for_channel(ch);
        debug!("radio: channel {} -> chan {}", ch, settings.channr);
        for setting in settings.writes() {
            self.chip.write_reg(setting.addr, setting.value)?;
        }
        Ok(())
    }

    fn go_idle(&mut self) -> Result<(), RadioError> {
        self.chip.strobe(Strobe::Sidle)?;
        self.wait_idle()
    }

    fn stop_rx(&mut self) -> Result<(), RadioError> {
        self.chip.abort_dma()?;
        self.go_idle()?;
        self.chip.clear_irqs()?;
        Ok(())
    }

    fn start_listen_if_needed(&mut self) -> Result<(), RadioError> {
        if !self.state.rx_on || self.state.freq_test || self.ring.is_full() {
            return Ok(());
        }
        self.go_idle()?;
        self.chip.clear_irqs()?;
        self.chip.arm_rx()?;
        self.chip.strobe(Strobe::Srx)?;
        Ok(())
    }
}

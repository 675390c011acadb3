//! Battery sampling hooks used by the radio and display busy-waits.
//!
//! Both long busy-waits in this crate (radio transmit-done and panel refresh)
//! sample the supply while they spin. The lowest reading under load is what
//! tells a tag its cell is worn out, so the waits keep a running minimum and
//! hand it back scaled to millivolts.

/// A battery voltage ADC channel.
pub trait VoltageMonitor {
    /// Takes one raw conversion.
    fn sample_raw(&mut self) -> u16;

    /// Scales a raw conversion to millivolts.
    fn to_millivolts(&self, raw: u16) -> u16;
}

/// Running minimum of raw battery samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinTracker {
    lowest: u16,
    samples: u32,
}

impl Default for MinTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MinTracker {
    /// Creates an empty tracker.
    pub const fn new() -> Self {
        Self {
            lowest: u16::MAX,
            samples: 0,
        }
    }

    /// Takes one sample from `monitor` and keeps it if it is the lowest so far.
    pub fn sample<B: VoltageMonitor + ?Sized>(&mut self, monitor: &mut B) {
        let raw = monitor.sample_raw();
        if raw < self.lowest {
            self.lowest = raw;
        }
        self.samples = self.samples.saturating_add(1);
    }

    /// Lowest raw value seen, or `None` when nothing was sampled.
    pub fn lowest_raw(&self) -> Option<u16> {
        (self.samples > 0).then_some(self.lowest)
    }

    /// Lowest value seen, scaled by `monitor`.
    pub fn lowest_millivolts<B: VoltageMonitor + ?Sized>(&self, monitor: &B) -> Option<u16> {
        self.lowest_raw().map(|raw| monitor.to_millivolts(raw))
    }
}

//! Sharing one [`Radio`] between the main loop and the RX interrupt.
//!
//! The radio lives in a `static` guarded by a [`critical_section::Mutex`].
//! The interrupt handler services the "receive complete" event through
//! [`global_radio_rx_irq`] (or [`radio_rx_irq!`](crate::radio_rx_irq)); the
//! main loop reaches the same instance with [`with_global_radio`].
//!
//! ```rust,ignore
//! use chroma_tag::{init_radio, radio_rx_irq, setup_radio};
//!
//! init_radio!(MyChip);
//!
//! fn main() {
//!     setup_radio!(Radio::new(chip, RadioConfig::default()));
//!     // ...
//! }
//!
//! #[interrupt]
//! fn RF() {
//!     radio_rx_irq!();
//! }
//! ```

use super::{Radio, Transceiver};
use core::cell::RefCell;
use critical_section::Mutex;

/// The storage type of a global radio.
pub type GlobalRadio<T> = Mutex<RefCell<Option<Radio<T>>>>;

/// Creates an empty global radio slot, usable in a `static` initializer.
///
/// # Example
/// ```rust,ignore
/// static RADIO: GlobalRadio<MyChip> = global_radio_init::<MyChip>();
/// ```
pub const fn global_radio_init<T: Transceiver>() -> GlobalRadio<T> {
    Mutex::new(RefCell::new(None))
}

/// Moves `radio` into the global slot, replacing any previous instance.
pub fn global_radio_setup<T: Transceiver>(global: &'static GlobalRadio<T>, radio: Radio<T>) {
    critical_section::with(|cs| {
        let _ = global.borrow(cs).replace(Some(radio));
    });
}

/// Interrupt body: moves a completed frame into the ring and re-arms.
///
/// Does nothing until [`global_radio_setup`] has run. Errors cannot be
/// returned from an interrupt; they are logged and dropped.
pub fn global_radio_rx_irq<T: Transceiver>(global: &'static GlobalRadio<T>) {
    critical_section::with(|cs| {
        if let Some(radio) = global.borrow(cs).borrow_mut().as_mut() {
            if let Err(e) = radio.on_rx_complete() {
                error!("radio: rx interrupt failed: {:?}", e);
            }
        }
    });
}

/// Runs `f` on the global radio inside a critical section.
///
/// # Returns
/// `None` if the radio has not been set up yet.
pub fn with_global_radio<T, R>(
    global: &'static GlobalRadio<T>,
    f: impl FnOnce(&mut Radio<T>) -> R,
) -> Option<R>
where
    T: Transceiver,
{
    critical_section::with(|cs| global.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Declares the global `RADIO` slot for transceiver type `$chip`.
///
/// # Example
/// ```rust,ignore
/// init_radio!(Cc1101<Spi1, PA4>);
/// ```
#[macro_export]
macro_rules! init_radio {
    ( $chip:ty ) => {
        pub static RADIO: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$crate::radio::Radio<$chip>>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
}

/// Stores a configured [`Radio`](crate::radio::Radio) in the `RADIO` slot
/// declared by [`init_radio!`](crate::init_radio).
#[macro_export]
macro_rules! setup_radio {
    ( $radio:expr ) => {
        $crate::critical_section::with(|cs| {
            let _ = RADIO.borrow(cs).replace(Some($radio));
        })
    };
}

/// Services the RX-complete interrupt on the `RADIO` slot.
///
/// Does nothing before [`setup_radio!`](crate::setup_radio); errors are
/// logged like in [`global_radio_rx_irq`].
#[macro_export]
macro_rules! radio_rx_irq {
    () => {
        $crate::radio::isr::global_radio_rx_irq(&RADIO)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::RX_BUFFER_NUM;
    use crate::radio::RadioConfig;
    use crate::testutil::FakeChip;

    fn listening() -> Radio<FakeChip> {
        let mut radio = Radio::new(FakeChip::new(), RadioConfig::default());
        assert_eq!(radio.init(), Ok(()));
        assert_eq!(radio.enable_rx(true, false), Ok(()));
        radio
    }

    #[test]
    fn test_irq_before_setup_is_ignored() {
        static GLOBAL: GlobalRadio<FakeChip> = global_radio_init::<FakeChip>();
        global_radio_rx_irq(&GLOBAL);
        assert_eq!(with_global_radio(&GLOBAL, |r| r.rx_good), None);
    }

    #[test]
    fn test_irq_fills_global_ring() {
        static GLOBAL: GlobalRadio<FakeChip> = global_radio_init::<FakeChip>();
        let mut radio = listening();
        radio.chip_mut().queue_frame(&[7, 7, 7], 0, 0x80);
        global_radio_setup(&GLOBAL, radio);

        global_radio_rx_irq(&GLOBAL);
        assert_eq!(
            with_global_radio(&GLOBAL, |r| r.ring().num_free()),
            Some(RX_BUFFER_NUM - 1)
        );
        let payload = with_global_radio(&GLOBAL, |r| r.receive().map(|f| f.len()));
        assert_eq!(payload, Some(Ok(3)));
    }

    mod macros {
        use super::*;

        crate::init_radio!(FakeChip);

        #[test]
        fn test_macros_drive_the_radio_slot() {
            let mut radio = listening();
            radio.chip_mut().queue_frame(&[1], 0, 0x80);
            crate::radio_rx_irq!();
            crate::setup_radio!(radio);
            crate::radio_rx_irq!();
            assert_eq!(with_global_radio(&RADIO, |r| r.rx_good), Some(1));

            // a failing read is swallowed, the radio stays in its slot
            let _ = with_global_radio(&RADIO, |r| {
                r.chip_mut().fail_reads = true;
                r.chip_mut().queue_frame(&[2], 0, 0x80);
            });
            crate::radio_rx_irq!();
            assert_eq!(
                with_global_radio(&RADIO, |r| (r.rx_good, r.rx_bad, r.ring().num_free())),
                Some((1, 0, RX_BUFFER_NUM - 1))
            );
        }
    }
}

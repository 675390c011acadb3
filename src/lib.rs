//! # chroma-tag
//!
//! A portable, no_std core for sub-GHz electronic shelf labels: the radio
//! link of a CC1110 tag (or a CC1101 access point) and the e-paper renderer
//! that streams a frame to the panel in small parts.
//!
//! The crate is built on:
//! - `embedded-hal` 1.0 traits for SPI, GPIO and delays
//! - `critical-section` for the one counter shared with the receive interrupt
//! - `heapless` for fixed-capacity buffers
//! - `nb` for the non-blocking receive call
//!
//! ## Crate features
//! | Feature                | Description |
//! |------------------------|-------------|
//! | `std`                  | Builds against `std` instead of `#![no_std]` |
//! | `global-irq` (default) | Enables [`radio::isr`]: a global radio slot and interrupt glue macros |
//! | `defmt-0-3`            | Uses `defmt` logging |
//! | `log`                  | Uses `log` logging |
//!
//! ## Modules
//!
//! - [`radio`]: transceiver driver, three-slot receive ring, channel and power plans
//! - [`display`]: panel transfer engine and part-streaming compositor
//! - [`settings`]: the tag settings block kept in external flash
//! - [`flash`]: the serial flash contract and a JEDEC SPI implementation
//! - [`battery`]: battery sampling used while the radio and the panel busy-wait
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chroma_tag::radio::{Cc1101, Radio, RadioConfig};
//!
//! chroma_tag::init_radio!(Cc1101<Spi, Cs>);
//!
//! let mut radio = Radio::new(Cc1101::new(spi, cs), RadioConfig::default());
//! radio.init()?;
//! radio.enable_rx(true, false)?;
//! chroma_tag::setup_radio!(radio);
//!
//! #[interrupt]
//! fn GDO0() {
//!     chroma_tag::radio_rx_irq!();
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - Only one radio and one display context should exist per device.
//! - Radio transmit and panel refresh busy-wait; they are expected to be
//!   called from the same main loop, never concurrently.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub use critical_section;
pub use heapless;
pub use nb;

#[macro_use]
mod fmt;

pub mod battery;
pub mod consts;
pub mod display;
pub mod error;
pub mod flash;
pub mod radio;
pub mod settings;

#[cfg(test)]
mod testutil;

pub use fmt::HexDump;

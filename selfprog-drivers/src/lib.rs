//! Output hook implementations
//!
//! Concrete [`selfprog_hal::NibbleOutput`] implementations used to show a
//! stored value on a board without any other I/O:
//!
//! - LED blink indicator (nibble N = N pulses)

#![no_std]
#![deny(unsafe_code)]

pub mod indicator;

pub use indicator::{BlinkIndicator, BlinkTiming};

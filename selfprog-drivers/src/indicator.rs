//! LED blink indicator
//!
//! Shows each nibble as a burst of short pulses, one per unit of value,
//! followed by a pause. Zero has no pulses to count, so it is shown as a
//! single long pulse. A value of 0x1234 reads as 1, 2, 3 and 4 blinks;
//! an erased word (0xFFFF) as four bursts of 15.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use selfprog_hal::NibbleOutput;

/// Blink timing in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlinkTiming {
    /// LED on time of one pulse
    pub on_ms: u16,
    /// LED off time between pulses
    pub off_ms: u16,
    /// LED on time of the zero pulse
    pub zero_ms: u16,
    /// Pause after each nibble
    pub gap_ms: u16,
}

impl Default for BlinkTiming {
    fn default() -> Self {
        Self {
            on_ms: 150,
            off_ms: 250,
            zero_ms: 800,
            gap_ms: 1200,
        }
    }
}

/// Blinks nibbles on an LED
pub struct BlinkIndicator<P, D> {
    pin: P,
    delay: D,
    timing: BlinkTiming,
    /// If true, LED on = pin LOW
    inverted: bool,
}

impl<P: OutputPin, D: DelayNs> BlinkIndicator<P, D> {
    /// Create a new indicator
    ///
    /// # Arguments
    /// - `pin`: The LED pin
    /// - `delay`: Delay provider for pulse timing
    /// - `inverted`: If true, the LED is lit when the pin is LOW
    pub fn new(pin: P, delay: D, timing: BlinkTiming, inverted: bool) -> Self {
        let mut indicator = Self {
            pin,
            delay,
            timing,
            inverted,
        };
        // Ensure LED starts off
        indicator.led(false);
        indicator
    }

    /// Create an indicator with an active-high LED and default timing
    pub fn new_active_high(pin: P, delay: D) -> Self {
        Self::new(pin, delay, BlinkTiming::default(), false)
    }

    /// Give the pin and delay back
    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }

    fn led(&mut self, on: bool) {
        // Pin errors are ignored: there is nowhere to report them
        let _ = if on != self.inverted {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
    }

    fn pulse(&mut self, on_ms: u16) {
        self.led(true);
        self.delay.delay_ms(on_ms as u32);
        self.led(false);
        self.delay.delay_ms(self.timing.off_ms as u32);
    }
}

impl<P: OutputPin, D: DelayNs> NibbleOutput for BlinkIndicator<P, D> {
    fn notify_nibble(&mut self, value: u8) {
        let value = value & 0xF;

        #[cfg(feature = "defmt")]
        defmt::trace!("blink nibble {=u8}", value);

        if value == 0 {
            self.pulse(self.timing.zero_ms);
        } else {
            for _ in 0..value {
                self.pulse(self.timing.on_ms);
            }
        }
        self.delay.delay_ms(self.timing.gap_ms as u32);
    }
}

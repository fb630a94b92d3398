//! Value output hook
//!
//! A stored 16-bit value is shown one nibble at a time, most significant
//! first. What "showing" means is up to the board: blink an LED, toggle a
//! test pin, or nothing at all.

/// Receives the nibbles of a displayed value
pub trait NibbleOutput {
    /// Show one nibble (0..=15)
    fn notify_nibble(&mut self, value: u8);

    /// Show all four nibbles of `value`, most significant first
    fn show_word(&mut self, value: u16) {
        for shift in [12u8, 8, 4, 0] {
            self.notify_nibble(((value >> shift) & 0xF) as u8);
        }
    }
}

/// Output that discards everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoopOutput;

impl NibbleOutput for NoopOutput {
    fn notify_nibble(&mut self, _value: u8) {}
}

impl<T: NibbleOutput + ?Sized> NibbleOutput for &mut T {
    fn notify_nibble(&mut self, value: u8) {
        (**self).notify_nibble(value)
    }
}

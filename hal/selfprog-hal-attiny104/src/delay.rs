//! Busy-loop delay
//!
//! There is no spare timer on the diagnostic build, so delays are counted in
//! loop iterations derived from the CPU clock. Accuracy is a few percent,
//! enough to make blink counts readable.

use embedded_hal::delay::DelayNs;

/// Approximate cycles spent per loop iteration
///
/// One `nop` plus the 32-bit counter update, compare and branch, which take
/// four instructions each on an 8-bit core.
pub const CYCLES_PER_ITERATION: u32 = 12;

/// Cycle-counted delay
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleDelay {
    cpu_hz: u32,
}

impl CycleDelay {
    /// Create a delay for a core running at `cpu_hz`
    pub const fn new(cpu_hz: u32) -> Self {
        Self { cpu_hz }
    }

    /// Loop iterations needed for `us` microseconds
    pub const fn iterations_for_us(&self, us: u32) -> u32 {
        let cycles_per_us = self.cpu_hz / 1_000_000;
        let cycles = if cycles_per_us == 0 {
            // Sub-MHz clocks: work in kHz to keep precision
            us.saturating_mul(self.cpu_hz / 1_000) / 1_000
        } else {
            us.saturating_mul(cycles_per_us)
        };
        cycles / CYCLES_PER_ITERATION
    }

    fn spin(iterations: u32) {
        for _ in 0..iterations {
            pause();
        }
    }
}

#[cfg(target_arch = "avr")]
#[inline(always)]
fn pause() {
    // SAFETY: nop has no effect
    unsafe { core::arch::asm!("nop", options(nomem, nostack, preserves_flags)) }
}

#[cfg(not(target_arch = "avr"))]
#[inline(always)]
fn pause() {
    core::hint::spin_loop();
}

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        // Round up so tiny delays are not dropped entirely
        self.delay_us(ns.div_ceil(1_000));
    }

    fn delay_us(&mut self, us: u32) {
        Self::spin(self.iterations_for_us(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}

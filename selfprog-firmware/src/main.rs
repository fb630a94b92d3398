//! selfprog - ATtiny104 flash self-programming diagnostic
//!
//! Runs the erase-trigger scenarios once against the first word of the
//! reserved block, blinking every value it reads back, then halts.
//!
//! Expected blinks on a fresh part (each value is four nibble bursts):
//!
//! ```text
//! 1111 1111   low-byte erase trigger is ignored
//! 2222 FFFF   high-byte trigger erases the page
//! 3333 FFFF   any high byte in the page will do
//! ```
//!
//! With the `show-stored` feature the persisted value is shown first:
//! 0xFFFF right after programming, 0xFFFF again after a power cycle since the
//! last scenario leaves the page erased.

#![no_std]
#![no_main]
#![feature(asm_experimental_arch)]

use core::arch::asm;

use panic_halt as _;

use selfprog_core::{Diagnostics, FlashGeometry, ReservedBlock, Scenario};
use selfprog_drivers::{BlinkIndicator, BlinkTiming};
use selfprog_hal_attiny104::delay::CycleDelay;
use selfprog_hal_attiny104::gpio::{parse_pin_string, PortPin};
use selfprog_hal_attiny104::nvm::Attiny104Nvm;
use selfprog_hal_attiny104::regs::SREG;

/// Constants generated from target.toml
mod target {
    include!(concat!(env!("OUT_DIR"), "/geometry.rs"));
}

const GEOMETRY: FlashGeometry = match FlashGeometry::new(
    target::MEMMAP_FLASH_START,
    target::FLASH_SIZE,
    target::PAGE_SIZE,
) {
    Ok(geometry) => geometry,
    Err(_) => panic!("invalid flash geometry in target.toml"),
};

const BLOCK: ReservedBlock = match ReservedBlock::at_end(GEOMETRY, target::RESERVED_PAGES) {
    Ok(block) => block,
    Err(_) => panic!("invalid reserved block in target.toml"),
};

/// Critical section by masking the global interrupt flag
struct SregCriticalSection;
critical_section::set_impl!(SregCriticalSection);

unsafe impl critical_section::Impl for SregCriticalSection {
    unsafe fn acquire() -> critical_section::RawRestoreState {
        let sreg: u8;
        asm!(
            "in {sreg}, {addr}",
            "cli",
            sreg = out(reg) sreg,
            addr = const SREG,
            options(nostack),
        );
        sreg
    }

    unsafe fn release(sreg: critical_section::RawRestoreState) {
        asm!(
            "out {addr}, {sreg}",
            sreg = in(reg) sreg,
            addr = const SREG,
            options(nostack),
        );
    }
}

#[no_mangle]
pub extern "C" fn main() -> ! {
    // build.rs has already checked the pin name
    let Some(led) = parse_pin_string(target::LED_PIN) else {
        halt()
    };
    let indicator = BlinkIndicator::new(
        PortPin::new(led),
        CycleDelay::new(target::CPU_HZ),
        BlinkTiming::default(),
        led.inverted,
    );

    // SAFETY: the only NVM handle in the program; this code lives in the
    // first pages of flash, well below the reserved block
    let nvm = unsafe { Attiny104Nvm::steal() };
    let Ok(mut diag) = Diagnostics::new(nvm, indicator, &BLOCK) else {
        halt()
    };

    #[cfg(feature = "show-stored")]
    diag.run(Scenario::ShowStored);

    diag.run_all(&Scenario::DEFAULT_RUN);

    halt()
}

fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

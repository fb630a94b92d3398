//! NVM controller for the ATtiny104
//!
//! Self-programming sequence (datasheet 20.4/20.5):
//!
//! 1. write the command to NVMCMD
//! 2. write the SPM signature 0xE7 to CCP
//! 3. within four cycles, store into the target page to trigger
//! 4. two `nop`s, then poll NVMBSY in NVMCSR
//!
//! Steps 1 to 4 are one `asm!` block inside a critical section so nothing can
//! be scheduled between the CCP write and the trigger store.
//!
//! The controller decodes the trigger store address: a page erase only starts
//! when the store hits the high byte of a word. A store to the low byte is
//! accepted by the CPU and does nothing.

use core::arch::asm;

use selfprog_hal::{MemoryAccess, NvmCommand, NvmController};

use crate::regs::{self, CCP, CCP_SPM, NVMBSY, NVMCMD, NVMCSR};

/// Handle to the ATtiny104 NVM controller
pub struct Attiny104Nvm {
    _private: (),
}

impl Attiny104Nvm {
    /// Take the NVM controller
    ///
    /// # Safety
    /// Only one handle may exist. The SELFPROGEN fuse must be programmed and
    /// the code issuing NVM commands must not live in the page being erased.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl MemoryAccess for Attiny104Nvm {
    #[inline]
    fn read_byte(&mut self, address: u16) -> u8 {
        // SAFETY: the caller picks the address; loads from data space have no
        // side effect beyond the load on this core
        unsafe { regs::read(address) }
    }

    #[inline]
    fn write_byte(&mut self, address: u16, value: u8) {
        // SAFETY: plain store with no NVM command armed
        unsafe { regs::write(address, value) }
    }
}

impl NvmController for Attiny104Nvm {
    fn start_page_erase(&mut self, address: u16) {
        critical_section::with(|_| {
            // SAFETY: the handle is unique; the dummy store goes to the flash
            // page selected by Z and only arms an erase there
            unsafe {
                asm!(
                    "out {nvmcmd}, {cmd}",
                    "ldi {cmd}, {sig}",
                    "out {ccp}, {cmd}",
                    "st Z+, {zero}",
                    "nop",
                    "nop",
                    cmd = inout(reg_upper) NvmCommand::PageErase.code() => _,
                    zero = in(reg) 0u8,
                    sig = const CCP_SPM,
                    nvmcmd = const NVMCMD,
                    ccp = const CCP,
                    inout("Z") address => _,
                    options(nostack),
                );
            }
        });
    }

    fn start_word_write(&mut self, address: u16, word: u16) {
        let [low, high] = word.to_le_bytes();
        critical_section::with(|_| {
            // SAFETY: the handle is unique; the two stores fill the write
            // latch and the second one commits it
            unsafe {
                asm!(
                    "out {nvmcmd}, {cmd}",
                    "ldi {cmd}, {sig}",
                    "out {ccp}, {cmd}",
                    "st Z+, {low}",
                    "st Z, {high}",
                    "nop",
                    "nop",
                    cmd = inout(reg_upper) NvmCommand::WordWrite.code() => _,
                    low = in(reg) low,
                    high = in(reg) high,
                    sig = const CCP_SPM,
                    nvmcmd = const NVMCMD,
                    ccp = const CCP,
                    inout("Z") address => _,
                    options(nostack),
                );
            }
        });
    }

    #[inline]
    fn is_busy(&mut self) -> bool {
        // SAFETY: NVMCSR is a read-only status register for our purposes
        unsafe { regs::read(NVMCSR) & (1 << NVMBSY) != 0 }
    }
}

//! ATtiny104 register map
//!
//! On the reduced core the I/O space is mapped 1:1 at the bottom of data
//! space, so every address here works both as an `in`/`out` operand and as a
//! data-space pointer.

/// NVM control and status register
pub const NVMCSR: u16 = 0x32;
/// NVM command register
pub const NVMCMD: u16 = 0x33;
/// Configuration change protection
pub const CCP: u16 = 0x3C;
/// Status register
pub const SREG: u16 = 0x3F;

/// NVMCSR: NVM busy
pub const NVMBSY: u8 = 7;

/// CCP signature enabling self-programming for four cycles
pub const CCP_SPM: u8 = 0xE7;

/// Port A data direction
pub const DDRA: u16 = 0x01;
/// Port A data
pub const PORTA: u16 = 0x02;
/// Port B data direction
pub const DDRB: u16 = 0x05;
/// Port B data
pub const PORTB: u16 = 0x06;

/// Volatile register read
///
/// # Safety
/// `address` must be a readable I/O or data-space location.
#[inline(always)]
pub unsafe fn read(address: u16) -> u8 {
    core::ptr::read_volatile(address as usize as *const u8)
}

/// Volatile register write
///
/// # Safety
/// `address` must be a writable I/O or data-space location, and the write
/// must not break an invariant the rest of the program relies on.
#[inline(always)]
pub unsafe fn write(address: u16, value: u8) {
    core::ptr::write_volatile(address as usize as *mut u8, value)
}

/// Volatile read-modify-write
///
/// # Safety
/// Same as [`read`] and [`write`]. Not atomic with respect to interrupts.
#[inline(always)]
pub unsafe fn modify(address: u16, f: impl FnOnce(u8) -> u8) {
    write(address, f(read(address)))
}

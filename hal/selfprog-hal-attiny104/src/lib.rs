//! ATtiny104-specific HAL for flash self-programming
//!
//! This crate provides the register-level implementation of the
//! `selfprog-hal` traits for the ATtiny104 (AVRrc reduced core, 1KB flash in
//! 64 pages of 8 words).
//!
//! # Modules
//!
//! - [`regs`] - Register constants and volatile access (all targets)
//! - [`nvm`] - NVM controller commit sequences (AVR only)
//! - [`gpio`] - Port pin parsing (all targets) and output pins (AVR only)
//! - [`delay`] - Busy-loop delay calibrated from the CPU clock
//!
//! # Requirements
//!
//! The SELFPROGEN fuse must be programmed, otherwise every NVM command is
//! silently ignored. The NVM sequences run inside
//! `critical_section::with`, so the final binary must provide a
//! `critical-section` implementation.
//!
//! The AVR parts need a nightly compiler (`asm_experimental_arch`).

#![no_std]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

pub mod delay;
pub mod gpio;
#[cfg(target_arch = "avr")]
pub mod nvm;
pub mod regs;

// Re-export shared types from selfprog-hal
pub use selfprog_hal::{MemoryAccess, NvmCommand, NvmController, NvmError};

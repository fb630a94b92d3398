//! Self-programming Hardware Abstraction Layer
//!
//! This crate defines the traits that sit between the flash self-programming
//! logic and a concrete NVM controller. Chip crates implement them with real
//! register sequences; `selfprog-core` implements them with a simulator so the
//! same logic can be exercised on the host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Diagnostics / store (selfprog-core)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  selfprog-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ selfprog-hal- │       │ SimulatedNvm  │
//! │   attiny104   │       │ (host model)  │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`nvm::MemoryAccess`] - Raw byte loads and stores in data space
//! - [`nvm::NvmController`] - Page erase and word write commit sequences
//! - [`output::NibbleOutput`] - Output hook used to display stored values

#![no_std]
#![deny(unsafe_code)]

pub mod nvm;
pub mod output;

// Re-export key traits at crate root for convenience
pub use nvm::{MemoryAccess, NvmCommand, NvmController, NvmError};
pub use output::{NibbleOutput, NoopOutput};

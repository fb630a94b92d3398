//! Board-agnostic flash self-programming logic
//!
//! This crate contains everything that does not depend on a specific NVM
//! controller implementation:
//!
//! - Address translation between data-space byte addresses and flash
//!   page/word addresses ([`layout`])
//! - Checked access to the reserved storage block ([`store`])
//! - A host model of the NVM controller with its hardware quirks ([`sim`])
//! - The diagnostic scenarios that demonstrate those quirks ([`diag`])

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod diag;
pub mod layout;
pub mod sim;
pub mod store;

pub use diag::{Diagnostics, RecordingOutput, Scenario, ScenarioReport};
pub use layout::{ByteSelect, FlashAddress, FlashGeometry, LayoutError, ReservedBlock};
pub use sim::SimulatedNvm;
pub use store::NvmStore;

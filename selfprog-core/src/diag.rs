//! Self-programming diagnostics
//!
//! Scripted erase/write/read-back sequences, each showing one behaviour of
//! the NVM controller. Every displayed value goes to the [`NibbleOutput`]
//! hook, four nibbles per value, most significant first.
//!
//! The byte values and trigger offsets are fixed so the blink pattern on a
//! board can be compared against [`Scenario::expected`].

use heapless::Vec;
use selfprog_hal::{NibbleOutput, NvmController, NvmError};

use crate::layout::ReservedBlock;

/// Maximum values one scenario displays
pub const MAX_DISPLAYED: usize = 4;

/// Diagnostic scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Scenario {
    /// Show whatever is stored (0xFFFF right after programming the chip)
    ShowStored,
    /// Erase and write 0x7310
    EraseWrite,
    /// Erase and write 0x1111, then erase and write 0x2222
    Rewrite,
    /// Erase and write 0x3300, then write 0x1111 without erasing: 0x1100
    AndAccumulate,
    /// Erase and write 0x1111, then erase via the low byte: still 0x1111
    LowByteEraseIgnored,
    /// Erase and write 0x2222, then erase via the high byte (+1): 0xFFFF
    HighByteErase,
    /// Erase and write 0x3333, then erase via the next word's high byte (+3): 0xFFFF
    AdjacentWordErase,
}

impl Scenario {
    /// Every scenario, in order
    pub const ALL: [Scenario; 7] = [
        Scenario::ShowStored,
        Scenario::EraseWrite,
        Scenario::Rewrite,
        Scenario::AndAccumulate,
        Scenario::LowByteEraseIgnored,
        Scenario::HighByteErase,
        Scenario::AdjacentWordErase,
    ];

    /// The erase-trigger scenarios run by the diagnostic firmware
    pub const DEFAULT_RUN: [Scenario; 3] = [
        Scenario::LowByteEraseIgnored,
        Scenario::HighByteErase,
        Scenario::AdjacentWordErase,
    ];

    /// Values the scenario should display, `None` when it depends on flash contents
    pub const fn expected(self) -> Option<&'static [u16]> {
        match self {
            Scenario::ShowStored => None,
            Scenario::EraseWrite => Some(&[0x7310]),
            Scenario::Rewrite => Some(&[0x1111, 0x2222]),
            Scenario::AndAccumulate => Some(&[0x3300, 0x1100]),
            Scenario::LowByteEraseIgnored => Some(&[0x1111, 0x1111]),
            Scenario::HighByteErase => Some(&[0x2222, 0xFFFF]),
            Scenario::AdjacentWordErase => Some(&[0x3333, 0xFFFF]),
        }
    }
}

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScenarioReport {
    pub scenario: Scenario,
    /// Values shown, in order
    pub displayed: Vec<u16, MAX_DISPLAYED>,
}

impl ScenarioReport {
    /// Whether the displayed values match the expectation
    ///
    /// `ShowStored` passes as long as one value was shown.
    pub fn passed(&self) -> bool {
        match self.scenario.expected() {
            Some(expected) => self.displayed.as_slice() == expected,
            None => self.displayed.len() == 1,
        }
    }

    /// Last value shown
    pub fn last(&self) -> Option<u16> {
        self.displayed.last().copied()
    }
}

/// Runs diagnostic scenarios against one word of the reserved block
pub struct Diagnostics<C, O> {
    nvm: C,
    output: O,
    block: ReservedBlock,
    address: u16,
}

impl<C: NvmController, O: NibbleOutput> Diagnostics<C, O> {
    /// Run scenarios against the first word of `block`
    pub fn new(nvm: C, output: O, block: &ReservedBlock) -> Result<Self, NvmError> {
        Self::at(nvm, output, block, block.base())
    }

    /// Run scenarios against an arbitrary word of `block`
    ///
    /// The word and the following one must share a page, since
    /// [`Scenario::AdjacentWordErase`] triggers through `address + 3`.
    pub fn at(nvm: C, output: O, block: &ReservedBlock, address: u16) -> Result<Self, NvmError> {
        let flash = block.check_word(address)?;
        if flash.word_in_page() + 1 >= block.geometry().words_per_page() {
            return Err(NvmError::OutOfRange { address });
        }
        Ok(Self {
            nvm,
            output,
            block: *block,
            address,
        })
    }

    /// Word the scenarios operate on
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Access the controller
    pub fn nvm(&mut self) -> &mut C {
        &mut self.nvm
    }

    /// Access the output hook
    pub fn output(&mut self) -> &mut O {
        &mut self.output
    }

    /// Take the controller and output back
    pub fn release(self) -> (C, O) {
        (self.nvm, self.output)
    }

    /// Read the word at `address` and send it to the output
    pub fn show_value(&mut self, address: u16) -> u16 {
        let low = self.nvm.read_byte(address);
        let high = self.nvm.read_byte(address.wrapping_add(1));
        let value = u16::from_le_bytes([low, high]);
        self.output.show_word(value);
        value
    }

    /// Erase the page holding `address`, program `value`, and show the result
    ///
    /// `address` must be a word of the reserved block; the erase is
    /// triggered at `address + 1`. Nothing is touched when it is rejected.
    pub fn erase_write_and_show(&mut self, address: u16, value: u16) -> Result<u16, NvmError> {
        let flash = self.block.check_word(address)?;
        Ok(self.ews(flash.address(), value))
    }

    /// Run one scenario
    pub fn run(&mut self, scenario: Scenario) -> ScenarioReport {
        #[cfg(feature = "defmt")]
        defmt::info!("scenario {} at {=u16:#x}", scenario, self.address);

        let a = self.address;
        let mut displayed: Vec<u16, MAX_DISPLAYED> = Vec::new();
        let mut record = |value: u16| {
            // Never more than MAX_DISPLAYED per scenario
            let _ = displayed.push(value);
        };

        match scenario {
            Scenario::ShowStored => record(self.show_value(a)),
            Scenario::EraseWrite => record(self.ews(a, 0x7310)),
            Scenario::Rewrite => {
                record(self.ews(a, 0x1111));
                record(self.ews(a, 0x2222));
            }
            Scenario::AndAccumulate => {
                record(self.ews(a, 0x3300));
                self.nvm.write_word(a, 0x1111);
                record(self.show_value(a));
            }
            Scenario::LowByteEraseIgnored => {
                record(self.ews(a, 0x1111));
                self.nvm.erase_page(a);
                record(self.show_value(a));
            }
            Scenario::HighByteErase => {
                record(self.ews(a, 0x2222));
                self.nvm.erase_page(a + 1);
                record(self.show_value(a));
            }
            Scenario::AdjacentWordErase => {
                record(self.ews(a, 0x3333));
                self.nvm.erase_page(a + 3);
                record(self.show_value(a));
            }
        }

        let report = ScenarioReport {
            scenario,
            displayed,
        };

        #[cfg(feature = "defmt")]
        if report.passed() {
            defmt::info!("scenario {} ok: {=[u16]:#x}", scenario, report.displayed.as_slice());
        } else {
            defmt::warn!("scenario {} mismatch: {=[u16]:#x}", scenario, report.displayed.as_slice());
        }

        report
    }

    /// Run scenarios in order, returning how many passed
    pub fn run_all(&mut self, scenarios: &[Scenario]) -> usize {
        scenarios
            .iter()
            .filter(|&&scenario| self.run(scenario).passed())
            .count()
    }

    /// `erase_write_and_show` on the (already aligned) scenario word
    fn ews(&mut self, address: u16, value: u16) -> u16 {
        self.nvm.erase_page(address | 1);
        self.nvm.write_word(address, value);
        self.show_value(address)
    }
}

/// Output hook that records nibbles, for checking a run without a board
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput<const N: usize> {
    nibbles: Vec<u8, N>,
    overflowed: bool,
}

impl<const N: usize> RecordingOutput<N> {
    pub fn new() -> Self {
        Self {
            nibbles: Vec::new(),
            overflowed: false,
        }
    }

    /// Nibbles received so far
    pub fn nibbles(&self) -> &[u8] {
        &self.nibbles
    }

    /// Whether nibbles were lost because the buffer filled up
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Reassemble the recorded nibbles into words
    pub fn words(&self) -> impl Iterator<Item = u16> + '_ {
        self.nibbles
            .chunks_exact(4)
            .map(|n| n.iter().fold(0u16, |acc, &nibble| (acc << 4) | nibble as u16))
    }

    pub fn clear(&mut self) {
        self.nibbles.clear();
        self.overflowed = false;
    }
}

impl<const N: usize> NibbleOutput for RecordingOutput<N> {
    fn notify_nibble(&mut self, value: u8) {
        if self.nibbles.push(value).is_err() {
            self.overflowed = true;
        }
    }
}

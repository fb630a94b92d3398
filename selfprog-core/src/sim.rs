//! Host model of the NVM controller
//!
//! Reproduces what the self-programming code can observe on the real part:
//!
//! - NVMCMD holds the pending command; writing the SPM signature to CCP arms
//!   it for the next store only.
//! - Page erase triggers on a store to the high byte of a word. A store to
//!   the low byte consumes the window and erases nothing.
//! - Word write goes through a two-byte latch. A store to an even address
//!   fills the low half; a store to an odd address fills the high half and
//!   commits. Programming ANDs the latch into the cell.
//! - NVMBSY stays set for a configurable number of polls. The effect lands
//!   when the flag clears; until then reads return the old contents and
//!   flash stores and new commands are dropped. Flash stores left in the
//!   same sequence after the trigger are dropped too, even with zero polls.
//! - A plain store into flash with nothing armed ANDs into the cell.
//!
//! The flash image survives [`SimulatedNvm::restart`], everything else is
//! reset, which is how persistence across a power cycle is modelled.

use selfprog_hal::{MemoryAccess, NvmCommand, NvmController};

use crate::layout::{FlashGeometry, LayoutError};

/// CCP signature that arms a self-programming command
pub const CCP_SPM: u8 = 0xE7;

/// Size of the SRAM window backing non-flash stores
pub const SRAM_WINDOW: usize = 32;

/// ATtiny104-sized simulator
pub type Attiny104Sim = SimulatedNvm<1024>;

/// Busy durations, in polls of NVMBSY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SimTiming {
    pub erase_polls: u8,
    pub write_polls: u8,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            erase_polls: 4,
            write_polls: 2,
        }
    }
}

/// Counters for what the controller saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SimStats {
    /// Page erases that took effect
    pub erases: u32,
    /// Word writes that took effect
    pub writes: u32,
    /// Armed stores that did not trigger (low-byte erase trigger)
    pub ignored_triggers: u32,
    /// Commands or flash stores issued while busy
    pub dropped_while_busy: u32,
    /// NVMBSY reads
    pub polls: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Erase { page_base: u16 },
    Write { word: u16, value: u16 },
}

/// Simulated NVM controller with an `N`-byte flash section
#[derive(Debug, Clone)]
pub struct SimulatedNvm<const N: usize> {
    geometry: FlashGeometry,
    flash: [u8; N],
    sram_start: u16,
    sram: [u8; SRAM_WINDOW],
    nvmcmd: NvmCommand,
    armed: bool,
    latch: [u8; 2],
    /// A trigger fired in the sequence being issued
    committed: bool,
    pending: Option<Pending>,
    busy_polls: u8,
    timing: SimTiming,
    stats: SimStats,
}

impl Attiny104Sim {
    /// Fresh ATtiny104 with erased flash and SRAM at 0x0040
    pub fn attiny104() -> Self {
        Self::from_parts(FlashGeometry::ATTINY104, [0xFF; 1024], 0x0040)
    }
}

impl<const N: usize> SimulatedNvm<N> {
    /// Create a simulator with erased flash
    pub fn new(geometry: FlashGeometry, sram_start: u16) -> Result<Self, LayoutError> {
        Self::from_image(geometry, [0xFF; N], sram_start)
    }

    /// Create a simulator whose flash holds `image`, as after power-up
    pub fn from_image(
        geometry: FlashGeometry,
        image: [u8; N],
        sram_start: u16,
    ) -> Result<Self, LayoutError> {
        geometry.validate()?;
        if geometry.flash_size as usize != N {
            return Err(LayoutError::ImageSize);
        }
        Ok(Self::from_parts(geometry, image, sram_start))
    }

    fn from_parts(geometry: FlashGeometry, flash: [u8; N], sram_start: u16) -> Self {
        Self {
            geometry,
            flash,
            sram_start,
            sram: [0; SRAM_WINDOW],
            nvmcmd: NvmCommand::NoOperation,
            armed: false,
            latch: [0xFF; 2],
            committed: false,
            pending: None,
            busy_polls: 0,
            timing: SimTiming::default(),
            stats: SimStats::default(),
        }
    }

    /// Builder: set busy durations
    pub fn with_timing(mut self, timing: SimTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Power cycle: keep the flash image, reset everything else
    ///
    /// An operation still in flight is lost.
    pub fn restart(self) -> Self {
        Self::from_parts(self.geometry, self.flash, self.sram_start).with_timing(self.timing)
    }

    /// Flash geometry
    pub fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    /// Current flash contents
    pub fn image(&self) -> &[u8; N] {
        &self.flash
    }

    /// Controller counters
    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// Command currently loaded in NVMCMD
    pub fn command(&self) -> NvmCommand {
        self.nvmcmd
    }

    /// Whether an operation is in flight (without counting a poll)
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn flash_index(&self, address: u16) -> Option<usize> {
        if self.geometry.contains(address) {
            Some((address - self.geometry.memmap_start) as usize)
        } else {
            None
        }
    }

    fn sram_index(&self, address: u16) -> Option<usize> {
        let index = address.checked_sub(self.sram_start)? as usize;
        (index < SRAM_WINDOW).then_some(index)
    }

    /// OUT NVMCMD
    fn load_command(&mut self, command: NvmCommand) {
        if self.busy_polls > 0 {
            self.stats.dropped_while_busy += 1;
            return;
        }
        self.nvmcmd = command;
        self.armed = false;
    }

    /// OUT CCP
    fn write_ccp(&mut self, signature: u8) {
        self.armed = signature == CCP_SPM && self.nvmcmd != NvmCommand::NoOperation;
    }

    /// The four-cycle window after the CCP write has passed
    fn close_window(&mut self) {
        self.armed = false;
        self.committed = false;
        self.latch = [0xFF; 2];
    }

    /// ST to data space, as the CPU issues it
    fn store(&mut self, address: u16, value: u8) {
        if let Some(index) = self.flash_index(address) {
            if self.busy_polls > 0 || self.committed {
                self.stats.dropped_while_busy += 1;
            } else if self.armed {
                self.armed_store(address, value);
            } else {
                self.flash[index] &= value;
            }
        } else if let Some(index) = self.sram_index(address) {
            self.sram[index] = value;
        }
    }

    fn armed_store(&mut self, address: u16, value: u8) {
        let high = address & 1 == 1;
        match self.nvmcmd {
            NvmCommand::PageErase => {
                self.armed = false;
                if high {
                    let page_mask = self.geometry.page_size - 1;
                    let offset = address - self.geometry.memmap_start;
                    let page_base = address - (offset & page_mask);
                    self.trigger(Pending::Erase { page_base }, self.timing.erase_polls);
                } else {
                    self.stats.ignored_triggers += 1;
                }
            }
            NvmCommand::WordWrite => {
                if high {
                    self.latch[1] = value;
                    let value = u16::from_le_bytes(self.latch);
                    self.armed = false;
                    self.trigger(
                        Pending::Write {
                            word: address & !1,
                            value,
                        },
                        self.timing.write_polls,
                    );
                } else {
                    self.latch[0] = value;
                }
            }
            NvmCommand::NoOperation => self.armed = false,
        }
    }

    fn trigger(&mut self, pending: Pending, polls: u8) {
        self.nvmcmd = NvmCommand::NoOperation;
        self.committed = true;
        self.pending = Some(pending);
        self.busy_polls = polls;
        if polls == 0 {
            self.complete();
        }
    }

    fn complete(&mut self) {
        match self.pending.take() {
            Some(Pending::Erase { page_base }) => {
                let start = (page_base - self.geometry.memmap_start) as usize;
                let end = start + self.geometry.page_size as usize;
                self.flash[start..end].fill(0xFF);
                self.stats.erases += 1;
            }
            Some(Pending::Write { word, value }) => {
                let index = (word - self.geometry.memmap_start) as usize;
                let [low, high] = value.to_le_bytes();
                self.flash[index] &= low;
                self.flash[index + 1] &= high;
                self.stats.writes += 1;
            }
            None => {}
        }
    }
}

impl<const N: usize> MemoryAccess for SimulatedNvm<N> {
    fn read_byte(&mut self, address: u16) -> u8 {
        if let Some(index) = self.flash_index(address) {
            self.flash[index]
        } else if let Some(index) = self.sram_index(address) {
            self.sram[index]
        } else {
            // Unmapped
            0x00
        }
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        self.store(address, value);
    }
}

impl<const N: usize> NvmController for SimulatedNvm<N> {
    fn start_page_erase(&mut self, address: u16) {
        self.load_command(NvmCommand::PageErase);
        self.write_ccp(CCP_SPM);
        if self.armed {
            self.store(address, 0x00);
        }
        self.close_window();
    }

    fn start_word_write(&mut self, address: u16, word: u16) {
        let [low, high] = word.to_le_bytes();
        self.load_command(NvmCommand::WordWrite);
        self.write_ccp(CCP_SPM);
        if self.armed {
            self.store(address, low);
            self.store(address.wrapping_add(1), high);
        }
        self.close_window();
    }

    fn is_busy(&mut self) -> bool {
        self.stats.polls += 1;
        match self.busy_polls {
            0 => false,
            n => {
                self.busy_polls = n - 1;
                if self.busy_polls == 0 {
                    self.complete();
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: u16 = 0x43E0;

    #[test]
    fn test_fresh_flash_is_erased() {
        let mut sim = Attiny104Sim::attiny104();
        assert_eq!(sim.read_word(0x4000), 0xFFFF);
        assert_eq!(sim.read_word(0x43FE), 0xFFFF);
        assert_eq!(sim.command(), NvmCommand::NoOperation);
    }

    #[test]
    fn test_write_then_read() {
        let mut sim = Attiny104Sim::attiny104();
        sim.write_word(A, 0x7310);
        assert_eq!(sim.read_word(A), 0x7310);
        assert_eq!(sim.read_byte(A), 0x10);
        assert_eq!(sim.read_byte(A + 1), 0x73);
        assert_eq!(sim.stats().writes, 1);
    }

    #[test]
    fn test_write_ands_into_programmed_word() {
        let mut sim = Attiny104Sim::attiny104();
        sim.write_word(A, 0x3300);
        sim.write_word(A, 0x1111);
        assert_eq!(sim.read_word(A), 0x1100);
    }

    #[test]
    fn test_erase_needs_high_byte_trigger() {
        let mut sim = Attiny104Sim::attiny104();
        sim.write_word(A, 0x1111);

        sim.erase_page(A);
        assert_eq!(sim.read_word(A), 0x1111);
        assert_eq!(sim.stats().ignored_triggers, 1);
        assert_eq!(sim.stats().erases, 0);

        sim.erase_page(A + 1);
        assert_eq!(sim.read_word(A), 0xFFFF);
        assert_eq!(sim.stats().erases, 1);
    }

    #[test]
    fn test_erase_covers_whole_page_only() {
        let mut sim = Attiny104Sim::attiny104();
        for word in 0..8 {
            sim.write_word(A + word * 2, 0x0000);
        }
        sim.write_word(A + 16, 0x1234); // first word of next page
        sim.write_word(A - 2, 0x5678); // last word of previous page

        sim.erase_page(A + 7);

        for word in 0..8 {
            assert_eq!(sim.read_word(A + word * 2), 0xFFFF);
        }
        assert_eq!(sim.read_word(A + 16), 0x1234);
        assert_eq!(sim.read_word(A - 2), 0x5678);
    }

    #[test]
    fn test_busy_defers_effect() {
        let mut sim = Attiny104Sim::attiny104().with_timing(SimTiming {
            erase_polls: 3,
            write_polls: 2,
        });
        sim.start_word_write(A, 0x0F0F);
        assert!(sim.is_pending());
        assert_eq!(sim.read_word(A), 0xFFFF);

        assert!(sim.is_busy());
        assert!(sim.is_busy());
        assert!(!sim.is_busy());
        assert!(!sim.is_pending());
        assert_eq!(sim.read_word(A), 0x0F0F);
        assert_eq!(sim.stats().polls, 3);
    }

    #[test]
    fn test_command_dropped_while_busy() {
        let mut sim = Attiny104Sim::attiny104();
        sim.start_word_write(A, 0x1234);
        sim.start_page_erase(A + 1);
        sim.wait_ready();

        assert_eq!(sim.read_word(A), 0x1234);
        assert_eq!(sim.stats().dropped_while_busy, 1);
        assert_eq!(sim.stats().erases, 0);
    }

    #[test]
    fn test_odd_write_address_commits_on_first_store() {
        let mut sim = Attiny104Sim::attiny104();
        // Low byte lands in the high latch of word A and commits it at once;
        // the high byte then hits the next word while busy and is dropped
        sim.write_word(A + 1, 0xAB12);
        assert_eq!(sim.read_word(A), 0x12FF);
        assert_eq!(sim.read_word(A + 2), 0xFFFF);
    }

    #[test]
    fn test_odd_write_address_without_busy_time() {
        let mut sim = Attiny104Sim::attiny104().with_timing(SimTiming {
            erase_polls: 0,
            write_polls: 0,
        });
        sim.write_word(A + 1, 0x00AB);
        assert_eq!(sim.read_word(A), 0xABFF);
        assert_eq!(sim.read_word(A + 2), 0xFFFF);
        assert_eq!(sim.stats().writes, 1);
        assert_eq!(sim.stats().dropped_while_busy, 1);

        // The window closes with the sequence; plain stores AND again
        sim.write_byte(A + 2, 0x0F);
        assert_eq!(sim.read_byte(A + 2), 0x0F);
    }

    #[test]
    fn test_raw_store_to_flash_ands() {
        let mut sim = Attiny104Sim::attiny104();
        sim.write_byte(A, 0xF0);
        sim.write_byte(A, 0x3C);
        assert_eq!(sim.read_byte(A), 0x30);
    }

    #[test]
    fn test_sram_and_unmapped() {
        let mut sim = Attiny104Sim::attiny104();
        sim.write_byte(0x0040, 0xAA);
        sim.write_byte(0x0040, 0x55);
        assert_eq!(sim.read_byte(0x0040), 0x55);
        sim.write_byte(0x1000, 0x12);
        assert_eq!(sim.read_byte(0x1000), 0x00);
    }

    #[test]
    fn test_restart_keeps_flash_only() {
        let mut sim = Attiny104Sim::attiny104();
        sim.write_word(A, 0x1234);
        sim.write_byte(0x0041, 0x99);
        sim.start_word_write(A + 2, 0x0000);

        let mut sim = sim.restart();
        assert_eq!(sim.read_word(A), 0x1234);
        assert_eq!(sim.read_word(A + 2), 0xFFFF); // in flight, lost
        assert_eq!(sim.read_byte(0x0041), 0x00);
        assert!(!sim.is_busy());
    }

    #[test]
    fn test_image_size_must_match() {
        let sim = SimulatedNvm::<512>::new(FlashGeometry::ATTINY104, 0x0040);
        assert_eq!(sim.err(), Some(LayoutError::ImageSize));

        let geo = FlashGeometry::new(0x4000, 512, 16).unwrap();
        assert!(SimulatedNvm::<512>::new(geo, 0x0040).is_ok());
    }
}

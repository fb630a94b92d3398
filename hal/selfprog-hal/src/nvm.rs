//! NVM controller abstractions
//!
//! The flash section of a reduced-core AVR is mapped into data space and can
//! be read with ordinary loads. Changing it needs the NVM controller: load a
//! command into NVMCMD, arm it through the CCP register, then trigger it with
//! a store into the target page within four cycles.
//!
//! Each trigger is modelled here as a single indivisible `start_*` call so
//! the timing window never spans more than one trait method. Completion is
//! observed separately through [`NvmController::is_busy`].

/// Commands accepted by the NVMCMD register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NvmCommand {
    /// No operation, the idle state of NVMCMD
    NoOperation = 0x00,
    /// Erase the page addressed by the trigger store
    PageErase = 0x18,
    /// Program the word held in the write latch
    WordWrite = 0x1D,
}

impl NvmCommand {
    /// Get the command as its register value
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Errors from checked NVM operations
///
/// The controller itself never reports an error: a bad sequence simply does
/// nothing. These are raised by the checked APIs before anything reaches the
/// hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvmError {
    /// Address lies outside the region the operation is allowed to touch
    OutOfRange { address: u16 },
    /// Page, word or byte index past the end of the region
    IndexOutOfRange { index: u16 },
    /// Word operation on an odd byte address
    Misaligned { address: u16 },
    /// Address is not inside the memory-mapped flash section
    NotFlash { address: u16 },
}

/// Raw data-space access
///
/// Plain loads and stores with no NVM command attached. Implementations must
/// use volatile accesses so they are never merged or reordered around an NVM
/// sequence.
pub trait MemoryAccess {
    /// Load one byte from an absolute data-space address
    fn read_byte(&mut self, address: u16) -> u8;

    /// Store one byte to an absolute data-space address
    ///
    /// Intended for SRAM and I/O. A store into flash is not an overwrite:
    /// the stored bits are ANDed into the cell.
    fn write_byte(&mut self, address: u16, value: u8);

    /// Load a little-endian word (low byte at `address`, high byte at `address + 1`)
    fn read_word(&mut self, address: u16) -> u16 {
        let low = self.read_byte(address);
        let high = self.read_byte(address.wrapping_add(1));
        u16::from_le_bytes([low, high])
    }
}

/// NVM controller handle
///
/// Represents the single NVM controller of the chip. Pass it explicitly to
/// everything that touches flash; there is exactly one per device.
///
/// # Quirks preserved by every implementation
///
/// - Page erase is triggered by a store to the *high* byte of a word in the
///   page. A store to the low byte arms nothing and the page is left intact.
/// - Word write ANDs the new value into the cell. Bits only go from 1 to 0
///   without an intervening page erase.
pub trait NvmController: MemoryAccess {
    /// Issue the page-erase sequence with `address` as the trigger store
    ///
    /// Returns as soon as the trigger has been issued. The erase is still in
    /// progress while [`is_busy`](Self::is_busy) reports `true`.
    fn start_page_erase(&mut self, address: u16);

    /// Issue the word-write sequence storing `word` low byte first at `address`
    ///
    /// The second store (the high byte at `address + 1`) commits the write.
    fn start_word_write(&mut self, address: u16, word: u16);

    /// Read the NVMBSY flag
    fn is_busy(&mut self) -> bool;

    /// Block until the controller reports idle
    fn wait_ready(&mut self) {
        while self.is_busy() {
            core::hint::spin_loop();
        }
    }

    /// Erase the page containing `address` and wait for completion
    ///
    /// `address` must be the high (odd) byte of a word inside the page.
    fn erase_page(&mut self, address: u16) {
        self.wait_ready();
        self.start_page_erase(address);
        self.wait_ready();
    }

    /// Program `word` at `address` and wait for completion
    fn write_word(&mut self, address: u16, word: u16) {
        self.wait_ready();
        self.start_word_write(address, word);
        self.wait_ready();
    }
}

impl<T: MemoryAccess + ?Sized> MemoryAccess for &mut T {
    fn read_byte(&mut self, address: u16) -> u8 {
        (**self).read_byte(address)
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        (**self).write_byte(address, value)
    }
}

impl<T: NvmController + ?Sized> NvmController for &mut T {
    fn start_page_erase(&mut self, address: u16) {
        (**self).start_page_erase(address)
    }

    fn start_word_write(&mut self, address: u16, word: u16) {
        (**self).start_word_write(address, word)
    }

    fn is_busy(&mut self) -> bool {
        (**self).is_busy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records calls, busy for a fixed number of polls after each trigger
    struct Recorder {
        busy_polls: u8,
        polls: u32,
        erases: [Option<u16>; 4],
        writes: [Option<(u16, u16)>; 4],
        bytes: [u8; 4],
    }

    impl Recorder {
        fn new(busy_polls: u8) -> Self {
            Self {
                busy_polls,
                polls: 0,
                erases: [None; 4],
                writes: [None; 4],
                bytes: [0x12, 0x34, 0x56, 0x78],
            }
        }
    }

    impl MemoryAccess for Recorder {
        fn read_byte(&mut self, address: u16) -> u8 {
            self.bytes[address as usize % 4]
        }

        fn write_byte(&mut self, address: u16, value: u8) {
            self.bytes[address as usize % 4] = value;
        }
    }

    impl NvmController for Recorder {
        fn start_page_erase(&mut self, address: u16) {
            let slot = self.erases.iter_mut().find(|e| e.is_none()).unwrap();
            *slot = Some(address);
            self.busy_polls = 3;
        }

        fn start_word_write(&mut self, address: u16, word: u16) {
            let slot = self.writes.iter_mut().find(|w| w.is_none()).unwrap();
            *slot = Some((address, word));
            self.busy_polls = 2;
        }

        fn is_busy(&mut self) -> bool {
            self.polls += 1;
            if self.busy_polls > 0 {
                self.busy_polls -= 1;
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(NvmCommand::PageErase.code(), 0x18);
        assert_eq!(NvmCommand::WordWrite.code(), 0x1D);
        assert_eq!(NvmCommand::NoOperation.code(), 0x00);
    }

    #[test]
    fn test_read_word_is_little_endian() {
        let mut rec = Recorder::new(0);
        assert_eq!(rec.read_word(0), 0x3412);
        assert_eq!(rec.read_word(2), 0x7856);
    }

    #[test]
    fn test_erase_waits_before_and_after() {
        let mut rec = Recorder::new(1);
        rec.erase_page(0x43E1);

        assert_eq!(rec.erases[0], Some(0x43E1));
        // 1 busy + 1 idle before, 3 busy + 1 idle after
        assert_eq!(rec.polls, 6);
        assert!(!rec.is_busy());
    }

    #[test]
    fn test_write_through_mut_ref() {
        fn drive<C: NvmController>(mut nvm: C) {
            nvm.write_word(0x43E0, 0x7310);
        }

        let mut rec = Recorder::new(0);
        drive(&mut rec);
        assert_eq!(rec.writes[0], Some((0x43E0, 0x7310)));
    }
}

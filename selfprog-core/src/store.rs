//! Checked access to the reserved block
//!
//! The raw controller primitives accept any address and fail silently. This
//! wrapper only lets callers touch words inside the reserved block, rejects
//! odd word addresses, and always erases through a high-byte trigger.

use selfprog_hal::{NvmController, NvmError};

use crate::layout::ReservedBlock;

/// NVM controller bound to the reserved block
pub struct NvmStore<C> {
    nvm: C,
    block: ReservedBlock,
}

impl<C: NvmController> NvmStore<C> {
    /// Bind a controller to a block
    pub fn new(nvm: C, block: ReservedBlock) -> Self {
        Self { nvm, block }
    }

    /// The block this store manages
    pub fn block(&self) -> &ReservedBlock {
        &self.block
    }

    /// Access the controller directly
    pub fn nvm(&mut self) -> &mut C {
        &mut self.nvm
    }

    /// Give the controller back
    pub fn release(self) -> C {
        self.nvm
    }

    /// Read word `index` of the block
    pub fn read(&mut self, index: u16) -> Result<u16, NvmError> {
        let address = self.block.word_address(index)?;
        Ok(self.nvm.read_word(address))
    }

    /// Read the persisted value (word 0)
    ///
    /// 0xFFFF when nothing has been written since the last erase.
    pub fn load(&mut self) -> u16 {
        self.nvm.read_word(self.block.base())
    }

    /// Erase every page of the block
    pub fn erase(&mut self) {
        for page in 0..self.block.page_count() {
            if let Ok(trigger) = self.block.erase_trigger(page) {
                #[cfg(feature = "defmt")]
                defmt::debug!("erase page via {=u16:#x}", trigger);
                self.nvm.erase_page(trigger);
            }
        }
    }

    /// Erase the page holding word `index`
    ///
    /// All other words of that page are erased too.
    pub fn erase_page_of(&mut self, index: u16) -> Result<(), NvmError> {
        let address = self.block.word_address(index)?;
        let flash = self.block.check_word(address)?;
        self.nvm.erase_page(flash.high_byte());
        Ok(())
    }

    /// Program word `index` without erasing
    ///
    /// The result is the AND of the old and new value.
    pub fn program(&mut self, index: u16, value: u16) -> Result<u16, NvmError> {
        let address = self.block.word_address(index)?;
        #[cfg(feature = "defmt")]
        defmt::debug!("program {=u16:#x} <- {=u16:#x}", address, value);
        self.nvm.write_word(address, value);
        Ok(self.nvm.read_word(address))
    }

    /// Erase the page holding word `index`, then program it
    ///
    /// Returns the value read back.
    pub fn store(&mut self, index: u16, value: u16) -> Result<u16, NvmError> {
        self.erase_page_of(index)?;
        self.program(index, value)
    }

    /// Replace the persisted value (word 0)
    pub fn save(&mut self, value: u16) -> u16 {
        let base = self.block.base();
        self.nvm.erase_page(base | 1);
        self.nvm.write_word(base, value);
        self.nvm.read_word(base)
    }

    /// Check word `index` holds `expected`
    pub fn verify(&mut self, index: u16, expected: u16) -> Result<bool, NvmError> {
        Ok(self.read(index)? == expected)
    }
}

#[cfg(test)]
mod tests {
    use selfprog_hal::MemoryAccess;

    use super::*;
    use crate::layout::FlashGeometry;
    use crate::sim::Attiny104Sim;

    fn store(pages: u16) -> NvmStore<Attiny104Sim> {
        let block = ReservedBlock::at_end(FlashGeometry::ATTINY104, pages).unwrap();
        NvmStore::new(Attiny104Sim::attiny104(), block)
    }

    #[test]
    fn test_save_and_load() {
        let mut store = store(1);
        assert_eq!(store.load(), 0xFFFF);
        assert_eq!(store.save(0x1234), 0x1234);
        assert_eq!(store.save(0x4321), 0x4321);
        assert_eq!(store.load(), 0x4321);
        assert_eq!(store.nvm().read_word(0x43F0), 0x4321);
    }

    #[test]
    fn test_program_ands() {
        let mut store = store(1);
        assert_eq!(store.program(3, 0x3300), Ok(0x3300));
        assert_eq!(store.program(3, 0x1111), Ok(0x1100));
        assert_eq!(store.verify(3, 0x1100), Ok(true));
    }

    #[test]
    fn test_store_erases_page_neighbours() {
        let mut store = store(2);
        store.program(0, 0x0000).unwrap();
        store.program(7, 0x0000).unwrap();
        store.program(8, 0x0000).unwrap(); // second page

        assert_eq!(store.store(7, 0xA5A5), Ok(0xA5A5));
        assert_eq!(store.read(0), Ok(0xFFFF));
        assert_eq!(store.read(8), Ok(0x0000));
    }

    #[test]
    fn test_erase_whole_block() {
        let mut store = store(2);
        for index in 0..16 {
            store.program(index, index).unwrap();
        }
        store.erase();
        for index in 0..16 {
            assert_eq!(store.read(index), Ok(0xFFFF));
        }
        assert_eq!(store.release().stats().erases, 2);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut store = store(1);
        assert_eq!(store.read(8), Err(NvmError::IndexOutOfRange { index: 8 }));
        assert_eq!(
            store.program(8, 0),
            Err(NvmError::IndexOutOfRange { index: 8 })
        );
        assert_eq!(store.nvm().stats().writes, 0);
    }
}

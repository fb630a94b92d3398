//! Flash layout and address translation
//!
//! The data space is byte addressed, the flash section is word addressed and
//! organised in pages. A data-space address inside the flash map splits into:
//!
//! ```text
//!  15 ........ 10 | 9 ...... 4 | 3 .... 1 | 0
//!  map base       | PADDR      | WADDR    | byte select
//! ```
//!
//! (bit positions for the ATtiny104: 16-byte pages, 64 pages)
//!
//! Everything here is `const fn` so a bad geometry can be rejected while
//! compiling, e.g. `const BLOCK: ReservedBlock = match ... { Err(_) => panic!() }`.

use selfprog_hal::NvmError;

/// Geometry misconfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// Page size is not a power of two of at least one word
    PageSize,
    /// Flash size is zero or not a whole number of pages
    FlashSize,
    /// Flash map does not start on a page boundary
    MapMisaligned,
    /// Flash map runs past the end of the 16-bit data space
    MapOverflow,
    /// Reserved block is empty or larger than the flash section
    ReservedSize,
    /// Simulator image length does not match the flash size
    ImageSize,
}

/// Flash section geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashGeometry {
    /// Data-space address where the flash section is mapped
    pub memmap_start: u16,
    /// Flash section size in bytes
    pub flash_size: u16,
    /// Page size in bytes
    pub page_size: u16,
}

impl FlashGeometry {
    /// ATtiny104: 1KB mapped at 0x4000, 64 pages of 8 words
    pub const ATTINY104: Self = Self {
        memmap_start: 0x4000,
        flash_size: 1024,
        page_size: 16,
    };

    /// Create a validated geometry
    pub const fn new(memmap_start: u16, flash_size: u16, page_size: u16) -> Result<Self, LayoutError> {
        let geometry = Self {
            memmap_start,
            flash_size,
            page_size,
        };
        match geometry.validate() {
            Ok(()) => Ok(geometry),
            Err(e) => Err(e),
        }
    }

    /// Check the geometry is self-consistent
    pub const fn validate(&self) -> Result<(), LayoutError> {
        if self.page_size < 2 || !self.page_size.is_power_of_two() {
            return Err(LayoutError::PageSize);
        }
        if self.flash_size == 0 || self.flash_size % self.page_size != 0 {
            return Err(LayoutError::FlashSize);
        }
        if self.memmap_start % self.page_size != 0 {
            return Err(LayoutError::MapMisaligned);
        }
        if self.memmap_start as u32 + self.flash_size as u32 > 0x1_0000 {
            return Err(LayoutError::MapOverflow);
        }
        Ok(())
    }

    /// Number of pages
    pub const fn page_count(&self) -> u16 {
        self.flash_size / self.page_size
    }

    /// Words per page
    pub const fn words_per_page(&self) -> u16 {
        self.page_size / 2
    }

    /// Last data-space address of the flash map
    pub const fn memmap_end(&self) -> u16 {
        self.memmap_start + (self.flash_size - 1)
    }

    /// Check whether a data-space address falls in the flash map
    pub const fn contains(&self, address: u16) -> bool {
        address >= self.memmap_start && address <= self.memmap_end()
    }

    /// Data-space address of the first byte of page `page`
    pub const fn page_address(&self, page: u16) -> Result<u16, NvmError> {
        if page >= self.page_count() {
            return Err(NvmError::IndexOutOfRange { index: page });
        }
        Ok(self.memmap_start + page * self.page_size)
    }

    /// Translate a data-space address into its flash components
    pub const fn translate(&self, address: u16) -> Result<FlashAddress, NvmError> {
        if !self.contains(address) {
            return Err(NvmError::NotFlash { address });
        }
        Ok(FlashAddress {
            address,
            offset: address - self.memmap_start,
            page_shift: self.page_size.trailing_zeros() as u8,
        })
    }
}

impl Default for FlashGeometry {
    fn default() -> Self {
        Self::ATTINY104
    }
}

/// Which byte of a flash word an address selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ByteSelect {
    Low,
    High,
}

/// A data-space address resolved against the flash geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashAddress {
    address: u16,
    offset: u16,
    page_shift: u8,
}

impl FlashAddress {
    /// Data-space address as given
    pub const fn address(&self) -> u16 {
        self.address
    }

    /// Byte offset from the start of the flash section
    pub const fn offset(&self) -> u16 {
        self.offset
    }

    /// Absolute word address in the flash section (PADDR:WADDR)
    pub const fn word(&self) -> u16 {
        self.offset >> 1
    }

    /// Page address (PADDR)
    pub const fn page(&self) -> u16 {
        self.offset >> self.page_shift
    }

    /// Word address within the page (WADDR)
    pub const fn word_in_page(&self) -> u16 {
        let page_mask = (1u16 << self.page_shift) - 1;
        (self.offset & page_mask) >> 1
    }

    /// Low or high byte of the word
    pub const fn byte_select(&self) -> ByteSelect {
        if self.offset & 1 == 0 {
            ByteSelect::Low
        } else {
            ByteSelect::High
        }
    }

    /// Whether this address can trigger a page erase
    pub const fn is_high_byte(&self) -> bool {
        matches!(self.byte_select(), ByteSelect::High)
    }

    /// Data-space address of the low byte of the same word
    pub const fn low_byte(&self) -> u16 {
        self.address & !1
    }

    /// Data-space address of the high byte of the same word
    pub const fn high_byte(&self) -> u16 {
        self.address | 1
    }

    /// Data-space address of the first byte of the page
    pub const fn page_base(&self) -> u16 {
        let page_mask = (1u16 << self.page_shift) - 1;
        self.address - (self.offset & page_mask)
    }
}

/// Block of whole pages reserved at the end of flash for persisted data
///
/// The block is fixed at build time and never moves. Word 0 at [`base`]
/// holds the persisted value, low byte first.
///
/// [`base`]: ReservedBlock::base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReservedBlock {
    geometry: FlashGeometry,
    base: u16,
    len: u16,
}

impl ReservedBlock {
    /// Reserve the last `pages` pages of flash
    pub const fn at_end(geometry: FlashGeometry, pages: u16) -> Result<Self, LayoutError> {
        if let Err(e) = geometry.validate() {
            return Err(e);
        }
        if pages == 0 || pages > geometry.page_count() {
            return Err(LayoutError::ReservedSize);
        }
        let len = pages * geometry.page_size;
        Ok(Self {
            geometry,
            base: geometry.memmap_start + (geometry.flash_size - len),
            len,
        })
    }

    /// Geometry this block was laid out in
    pub const fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    /// Data-space address of the first byte
    pub const fn base(&self) -> u16 {
        self.base
    }

    /// Block length in bytes
    pub const fn len_bytes(&self) -> u16 {
        self.len
    }

    /// Number of pages in the block
    pub const fn page_count(&self) -> u16 {
        self.len / self.geometry.page_size
    }

    /// Number of words in the block
    pub const fn word_count(&self) -> u16 {
        self.len / 2
    }

    /// Check whether a data-space address falls in the block
    pub const fn contains(&self, address: u16) -> bool {
        address >= self.base && address - self.base < self.len
    }

    /// Absolute data-space address of byte `offset` in the block
    pub const fn address(&self, offset: u16) -> Result<u16, NvmError> {
        if offset >= self.len {
            return Err(NvmError::IndexOutOfRange { index: offset });
        }
        Ok(self.base + offset)
    }

    /// Absolute data-space address of word `index` in the block
    pub const fn word_address(&self, index: u16) -> Result<u16, NvmError> {
        if index >= self.word_count() {
            return Err(NvmError::IndexOutOfRange { index });
        }
        Ok(self.base + index * 2)
    }

    /// Address that triggers an erase of page `page` of the block
    ///
    /// The high byte of the first word, since the low byte does not trigger.
    pub const fn erase_trigger(&self, page: u16) -> Result<u16, NvmError> {
        if page >= self.page_count() {
            return Err(NvmError::IndexOutOfRange { index: page });
        }
        Ok(self.base + page * self.geometry.page_size + 1)
    }

    /// Validate a word address supplied by a caller
    pub const fn check_word(&self, address: u16) -> Result<FlashAddress, NvmError> {
        if !self.contains(address) {
            return Err(NvmError::OutOfRange { address });
        }
        if address & 1 != 0 {
            return Err(NvmError::Misaligned { address });
        }
        self.geometry.translate(address)
    }
}

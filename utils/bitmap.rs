//! Simple bitmap implementation
//!
//! Fixed-size bitmap used to track interrupt ownership, pending and
//! enabled sources. Sized in bits at compile time, stored inline.

use crate::config::CLIC_MAX_INTERRUPTS;

const WORD_BITS: usize = u64::BITS as usize;

/// Number of words needed by a bitmap covering every CLIC source
pub const IRQ_BITMAP_WORDS: usize = CLIC_MAX_INTERRUPTS / WORD_BITS;

/// Bitmap covering `WORDS * 64` bits
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap<const WORDS: usize> {
    words: [u64; WORDS],
}

/// Bitmap large enough for every CLIC source
pub type IrqBitmap = Bitmap<IRQ_BITMAP_WORDS>;

impl<const WORDS: usize> Bitmap<WORDS> {
    /// Create an empty bitmap
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Get the number of bits
    pub const fn bits(&self) -> usize {
        WORDS * WORD_BITS
    }

    /// Test if a bit is set. Out-of-range indices read as clear.
    pub fn get(&self, index: usize) -> bool {
        if index >= self.bits() {
            return false;
        }
        (self.words[index / WORD_BITS] >> (index % WORD_BITS)) & 1 == 1
    }

    /// Set or clear a bit. Returns `false` if `index` is out of range.
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        if index >= self.bits() {
            return false;
        }
        let word = &mut self.words[index / WORD_BITS];
        let mask = 1u64 << (index % WORD_BITS);
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
        true
    }

    /// Iterate over the indices of set bits, in ascending order
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bits()).filter(move |&i| self.get(i))
    }

    /// Check if no bit is set
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }
}

impl<const WORDS: usize> Default for Bitmap<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> core::fmt::Debug for Bitmap<WORDS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter_set()).finish()
    }
}

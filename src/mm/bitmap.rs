//! Bitmap primitive used by the frame pools.
//!
//! Bit = 0: free, bit = 1: in use.

use alloc::vec;
use alloc::vec::Vec;

const BITS_PER_WORD: usize = u64::BITS as usize;

/// A fixed-length bitmap.
#[derive(Debug, Clone)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// Create a bitmap of `len` bits, all clear.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(BITS_PER_WORD)],
            len,
        }
    }

    /// Check if a bit is set. Out of range counts as set.
    #[inline]
    pub fn is_set(&self, bit: usize) -> bool {
        if bit >= self.len {
            return true;
        }
        (self.words[bit / BITS_PER_WORD] >> (bit % BITS_PER_WORD)) & 1 == 1
    }

    /// Set a bit. Out of range is ignored.
    #[inline]
    pub fn set(&mut self, bit: usize) {
        if bit < self.len {
            self.words[bit / BITS_PER_WORD] |= 1 << (bit % BITS_PER_WORD);
        }
    }

    /// Clear a bit. Out of range is ignored.
    #[inline]
    pub fn clear(&mut self, bit: usize) {
        if bit < self.len {
            self.words[bit / BITS_PER_WORD] &= !(1 << (bit % BITS_PER_WORD));
        }
    }

    /// Index of the first clear bit, if any.
    pub fn find_first_free(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|&(_, &word)| word != u64::MAX)
            .map(|(i, &word)| i * BITS_PER_WORD + (!word).trailing_zeros() as usize)
            .filter(|&bit| bit < self.len)
    }
}

//! Word and Buffer Primitives
//!
//! The executive addresses storage in 36-bit words. A word is carried in
//! the low bits of a `u64`; anything above bit 35 is noise and is masked
//! off whenever a word crosses a device boundary.
//!
//! Buffers handed to the I/O manager are shared between the caller, the
//! request tracker and the I/O processor executing a channel program, so
//! they are reference counted and guarded by a spinlock.
//!
//! # Transfer Formats
//!
//! Tape blocks are recorded as bytes. The transfer format decides how many
//! bytes a word occupies on the medium:
//! - **Packed**: two words in nine bytes
//! - **QuarterWord**: one 9-bit quarter word per byte, four bytes per word
//! - **SixthWord**: one 6-bit character per byte, six bytes per word

use core::fmt;
use spin::{Mutex, MutexGuard};
use std::sync::Arc;

/// A 36-bit word held in a u64
pub type Word = u64;

/// Significant bits of a word
pub const WORD_MASK: Word = 0o777_777_777_777;

/// Channel transfer format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransferFormat {
    /// Two words packed into nine bytes
    #[default]
    Packed = 0,
    /// Four bytes per word, 9-bit quarter words
    QuarterWord = 1,
    /// Six bytes per word, 6-bit characters
    SixthWord = 2,
}

impl TransferFormat {
    /// Number of bytes `words` words occupy on the medium
    pub const fn encoded_bytes(self, words: usize) -> usize {
        match self {
            // An odd trailing word still takes a half-byte, rounded up
            Self::Packed => words.saturating_mul(9).saturating_add(1) / 2,
            Self::QuarterWord => words.saturating_mul(4),
            Self::SixthWord => words.saturating_mul(6),
        }
    }

    /// Single-letter format name used in diagnostics
    pub const fn letter(self) -> char {
        match self {
            Self::Packed => 'P',
            Self::QuarterWord => 'Q',
            Self::SixthWord => 'S',
        }
    }
}

/// Shared word buffer
///
/// Cloning yields another handle onto the same storage.
#[derive(Clone)]
pub struct WordBuffer(Arc<Mutex<Vec<Word>>>);

impl WordBuffer {
    /// Create a zero-filled buffer of `len` words
    pub fn new(len: usize) -> Self {
        Self(Arc::new(Mutex::new(vec![0; len])))
    }

    /// Wrap existing words
    pub fn from_words(words: Vec<Word>) -> Self {
        Self(Arc::new(Mutex::new(words)))
    }

    /// Buffer length in words
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock the buffer contents
    pub fn lock(&self) -> MutexGuard<'_, Vec<Word>> {
        self.0.lock()
    }

    /// Copy the contents out
    pub fn to_vec(&self) -> Vec<Word> {
        self.0.lock().clone()
    }
}

impl fmt::Debug for WordBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordBuffer").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_bytes() {
        assert_eq!(TransferFormat::Packed.encoded_bytes(2), 9);
        assert_eq!(TransferFormat::Packed.encoded_bytes(1), 5);
        assert_eq!(TransferFormat::QuarterWord.encoded_bytes(3), 12);
        assert_eq!(TransferFormat::SixthWord.encoded_bytes(3), 18);
    }

    #[test]
    fn test_buffer_shares_storage() {
        let a = WordBuffer::new(4);
        let b = a.clone();
        b.lock()[2] = 0o17;
        assert_eq!(a.to_vec(), vec![0, 0, 0o17, 0]);
        assert_eq!(WordBuffer::new(4).to_vec(), vec![0; 4]);
    }

    #[test]
    fn test_encoded_bytes_saturate() {
        assert_eq!(TransferFormat::SixthWord.encoded_bytes(usize::MAX), usize::MAX);
        assert_eq!(TransferFormat::Packed.encoded_bytes(usize::MAX), usize::MAX / 2);
    }
}

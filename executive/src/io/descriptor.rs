//! Transfer Descriptor Lists
//!
//! A descriptor list is a gather/scatter description over one word
//! buffer: a sequence of (location, length, addressing mode) segments.
//! Channel programs carry a descriptor list rather than a flat range so
//! the caller's own list can be handed to a device unchanged, or cut into
//! block-sized pieces for mass storage.
//!
//! # Addressing Modes
//!
//! - **Increment**: consecutive words upward from the location
//! - **Decrement**: consecutive words downward from the location
//! - **NoChange**: every word maps onto the same location
//! - **Skip**: words are consumed but not stored (input) or supplied as
//!   zero (output)

use super::word::{Word, WORD_MASK};

/// Addressing mode of one descriptor segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AddressMode {
    #[default]
    Increment = 0,
    Decrement = 1,
    NoChange = 2,
    Skip = 3,
}

/// One gather/scatter segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferDescriptor {
    /// Buffer index of the first word
    pub location: usize,
    /// Words covered by this segment
    pub count: usize,
    /// How the location moves per word
    pub mode: AddressMode,
}

impl TransferDescriptor {
    pub const fn new(location: usize, count: usize, mode: AddressMode) -> Self {
        Self { location, count, mode }
    }

    /// Increment-mode segment, the common case
    pub const fn increment(location: usize, count: usize) -> Self {
        Self::new(location, count, AddressMode::Increment)
    }

    /// Buffer index touched by the `index`th word of this segment
    fn address(&self, index: usize) -> Option<usize> {
        match self.mode {
            AddressMode::Increment => self.location.checked_add(index),
            AddressMode::Decrement => self.location.checked_sub(index),
            AddressMode::NoChange => Some(self.location),
            AddressMode::Skip => None,
        }
    }

    /// The same segment with its first `words` words dropped
    fn advance(&self, words: usize) -> Self {
        let location = match self.mode {
            AddressMode::Increment => self.location.saturating_add(words),
            AddressMode::Decrement => self.location.saturating_sub(words),
            AddressMode::NoChange | AddressMode::Skip => self.location,
        };
        Self::new(location, self.count - words, self.mode)
    }

    /// True if every address this segment touches lies inside `buffer_len`
    fn fits(&self, buffer_len: usize) -> bool {
        if self.count == 0 {
            return true;
        }
        match self.mode {
            AddressMode::Increment => self
                .location
                .checked_add(self.count)
                .is_some_and(|end| end <= buffer_len),
            AddressMode::Decrement => self.location < buffer_len && self.location >= self.count - 1,
            AddressMode::NoChange => self.location < buffer_len,
            AddressMode::Skip => true,
        }
    }
}

/// Ordered list of transfer descriptors
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorList(Vec<TransferDescriptor>);

impl DescriptorList {
    pub fn new(descriptors: Vec<TransferDescriptor>) -> Self {
        Self(descriptors)
    }

    /// Single increment segment covering `[location, location + count)`
    pub fn contiguous(location: usize, count: usize) -> Self {
        Self(vec![TransferDescriptor::increment(location, count)])
    }

    pub fn descriptors(&self) -> &[TransferDescriptor] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.total_words() == 0
    }

    /// Total words described, saturating at `usize::MAX`
    pub fn total_words(&self) -> usize {
        self.0.iter().fold(0usize, |total, d| total.saturating_add(d.count))
    }

    /// Check every segment against a buffer length
    ///
    /// A list whose word total does not fit in a `usize` never fits.
    pub fn fits(&self, buffer_len: usize) -> bool {
        let total = self
            .0
            .iter()
            .try_fold(0usize, |total, d| total.checked_add(d.count));
        total.is_some() && self.0.iter().all(|d| d.fits(buffer_len))
    }

    /// Exact sub-range of `words` words starting `start` words in
    ///
    /// Segments straddling either edge are split. A list shorter than
    /// `start + words` yields whatever remains.
    pub fn sub_range(&self, start: usize, words: usize) -> DescriptorList {
        let mut result = Vec::new();
        let mut skip = start;
        let mut wanted = words;

        for desc in &self.0 {
            if wanted == 0 {
                break;
            }
            if skip >= desc.count {
                skip -= desc.count;
                continue;
            }
            let tail = desc.advance(skip);
            skip = 0;
            let take = tail.count.min(wanted);
            result.push(TransferDescriptor::new(tail.location, take, tail.mode));
            wanted -= take;
        }

        DescriptorList(result)
    }

    /// Collect the words this list describes out of `buffer`
    pub fn gather(&self, buffer: &[Word]) -> Vec<Word> {
        let mut words = Vec::with_capacity(self.total_words());
        for desc in &self.0 {
            for index in 0..desc.count {
                let word = desc
                    .address(index)
                    .and_then(|addr| buffer.get(addr).copied())
                    .unwrap_or(0);
                words.push(word & WORD_MASK);
            }
        }
        words
    }

    /// Store `data` into `buffer` along this list
    ///
    /// Returns the number of words consumed from `data`, which stops early
    /// if `data` runs out.
    pub fn scatter(&self, buffer: &mut [Word], data: &[Word]) -> usize {
        let mut source = data.iter();
        let mut consumed = 0;
        for desc in &self.0 {
            for index in 0..desc.count {
                let Some(&word) = source.next() else {
                    return consumed;
                };
                consumed += 1;
                if let Some(slot) = desc.address(index).and_then(|addr| buffer.get_mut(addr)) {
                    *slot = word & WORD_MASK;
                }
            }
        }
        consumed
    }
}

impl From<Vec<TransferDescriptor>> for DescriptorList {
    fn from(descriptors: Vec<TransferDescriptor>) -> Self {
        Self(descriptors)
    }
}

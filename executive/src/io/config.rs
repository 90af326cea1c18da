//! I/O Manager Configuration
//!
//! Tunables default to the constants below; hosts override them through
//! the builder methods before handing the config to the manager.

use core::time::Duration;

/// Words per mass storage track
pub const WORDS_PER_TRACK: usize = 1792;

/// Scratch buffers allocated at startup
pub const DEFAULT_CHILD_BUFFER_COUNT: usize = 8;

/// Largest tape block a write may carry (the 18-bit word count limit)
pub const MAX_TAPE_TRANSFER_WORDS: usize = 0o377_777;

/// Worker sleep after a pass that changed nothing
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(10);

/// I/O manager tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoConfig {
    /// Scratch buffers in the child buffer pool
    pub child_buffer_count: usize,
    /// Words per track, and so per scratch buffer
    pub words_per_track: usize,
    /// Upper bound on a tape write
    pub max_tape_transfer_words: usize,
    /// Worker idle sleep
    pub idle_wait: Duration,
}

impl IoConfig {
    pub const fn new() -> Self {
        Self {
            child_buffer_count: DEFAULT_CHILD_BUFFER_COUNT,
            words_per_track: WORDS_PER_TRACK,
            max_tape_transfer_words: MAX_TAPE_TRANSFER_WORDS,
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }

    pub const fn with_child_buffers(mut self, count: usize) -> Self {
        self.child_buffer_count = count;
        self
    }

    pub const fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self::new()
    }
}

//! Space and Translation Authority Interface
//!
//! The master file directory (MFD) owns file space. The I/O manager asks
//! it to allocate tracks ahead of a write, to translate file-relative
//! track ids into physical (pack, device track) pairs, to describe a pack,
//! and to retire a track after the operator condemns it.

use core::fmt;
use thiserror::Error;

use super::channel::DeviceId;

/// MFD handle of an assigned mass storage file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MfdFileId(pub u64);

/// Index of a logical disk pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackIndex(pub u32);

impl fmt::Display for PackIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LDAT{:04o}", self.0)
    }
}

/// Physical location of one track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicalTrack {
    pub pack: PackIndex,
    /// Track number relative to the start of the pack's device
    pub device_track: u64,
}

/// Device and geometry of a mounted pack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackInfo {
    /// Unit the pack is mounted on
    pub device: DeviceId,
    /// Words per physical block
    pub prep_factor: usize,
}

/// Failures reported by the space authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MfdError {
    #[error("insufficient mass storage for allocation")]
    InsufficientSpace,
    #[error("allocation exceeds the file's maximum granules")]
    MaximumSizeExceeded,
    #[error("file is not known to the directory")]
    FileNotFound,
    #[error("directory failure")]
    DirectoryError,
}

/// Calls the I/O manager makes against the MFD
pub trait SpaceAuthority: Send + Sync {
    /// Ensure file tracks `[first_track, first_track + track_count)` are allocated
    fn allocate(&self, file: MfdFileId, first_track: u64, track_count: u64) -> Result<(), MfdError>;

    /// Physical location of a file-relative track, `None` if unallocated
    fn translate(&self, file: MfdFileId, file_track: u64) -> Option<PhysicalTrack>;

    /// Device and prep factor of a pack, `None` if the pack is not available
    fn pack_info(&self, pack: PackIndex) -> Option<PackInfo>;

    /// Remove a track from service
    fn mark_bad_track(&self, track: PhysicalTrack);
}

//! System Faults
//!
//! A system fault is raised when the I/O manager finds its own shared
//! structures inconsistent. Unlike a per-request failure it cannot be
//! written into a request's status: it means the pending-tracker list or
//! the buffer pool can no longer be trusted, so the worker stops polling
//! and hands the fault to the host.
//!
//! Each fault carries a STOP code in the style of a bug check so host
//! logs can be matched against a fixed table.

use thiserror::Error;

pub mod codes {
    //! STOP codes reported with system faults

    /// A request reached dispatch with a facility that is neither disk nor tape
    pub const UNCLASSIFIED_FACILITY: u32 = 0x0000_0101;

    /// A child buffer was released while the pool recorded it as available
    pub const CHILD_BUFFER_NOT_IN_USE: u32 = 0x0000_0102;

    /// A merged scratch block was due for write-back with no buffer attached
    pub const CHILD_BUFFER_MISSING: u32 = 0x0000_0103;
}

/// Whole-system fault
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SystemFault {
    #[error("facility {facility} is neither mass storage nor tape")]
    UnclassifiedFacility { facility: String },

    #[error("child buffer {index} released while not in use")]
    ChildBufferNotInUse { index: usize },

    #[error("write-back for {facility} has no child buffer attached")]
    ChildBufferMissing { facility: String },
}

impl SystemFault {
    pub const fn stop_code(&self) -> u32 {
        match self {
            Self::UnclassifiedFacility { .. } => codes::UNCLASSIFIED_FACILITY,
            Self::ChildBufferNotInUse { .. } => codes::CHILD_BUFFER_NOT_IN_USE,
            Self::ChildBufferMissing { .. } => codes::CHILD_BUFFER_MISSING,
        }
    }
}

//! I/O Manager (io)
//!
//! The I/O manager turns file I/O requests into physical channel
//! operations:
//!
//! - **Requests**: caller-owned descriptions of one transfer
//! - **Facilities**: the assigned file or tape reel a request targets
//! - **Trackers**: per-request state machines driven by the poll pass
//! - **Child buffers**: track-sized scratch space for partial blocks
//! - **Channel programs**: single physical operations run by an IOP
//!
//! # I/O Flow
//!
//! 1. Caller submits an `IoRequest`
//! 2. Manager creates a mass storage or tape tracker
//! 3. Tracker validates, allocates and translates (disk), and builds a
//!    channel program
//! 4. Program is routed to an I/O processor and runs asynchronously
//! 5. Outcome is classified: success, end condition, silent retry, or an
//!    operator prompt
//! 6. Tracker completes, is reaped, and the caller is woken
//!
//! # Key Structures
//!
//! - `IoRequest`: function, address, buffer and descriptor list
//! - `DescriptorList`: gather/scatter segments over a word buffer
//! - `ChannelProgram`: command, device, block and completion status
//! - `ChildBufferPool`: fixed scratch buffer arena
//! - `IoManager`: pending trackers and pool under one lock

pub mod channel;
pub mod classify;
pub mod config;
pub mod descriptor;
pub mod facility;
pub mod manager;
pub mod pool;
pub mod request;
pub mod space;
pub mod tracker;
pub mod word;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main structures and types
pub use channel::{
    ChannelCommand,
    ChannelProgram,
    ChannelProgramHandle,
    ChannelRoute,
    ChannelStatus,
    DeviceId,
    DevicePathResolver,
    DeviceStatus,
    IoProcessor,
    ProcessorId,
};

pub use classify::{classify_mass_storage, classify_tape, Disposition, ErrorClass};

pub use config::{
    IoConfig,
    DEFAULT_CHILD_BUFFER_COUNT,
    DEFAULT_IDLE_WAIT,
    MAX_TAPE_TRANSFER_WORDS,
    WORDS_PER_TRACK,
};

pub use descriptor::{AddressMode, DescriptorList, TransferDescriptor};

pub use facility::{
    FacilityItem,
    FacilityKind,
    FacilityVariant,
    MassStorageFacility,
    TapeFacility,
};

pub use manager::{Collaborators, IoManager, IoStats, Lifecycle, LifecycleError};
pub use pool::{ChildBufferId, ChildBufferPool, ChildBufferStats};
pub use request::{IoFunction, IoRequest, IoResult, IoStatus};
pub use space::{MfdError, MfdFileId, PackIndex, PackInfo, PhysicalTrack, SpaceAuthority};
pub use tracker::{TrackerSnapshot, TrackerState};
pub use word::{TransferFormat, Word, WordBuffer, WORD_MASK};
pub use worker::IoWorker;

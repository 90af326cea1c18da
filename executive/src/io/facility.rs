//! Facility Items
//!
//! A facility item is the in-memory record of a file currently assigned to
//! a run. The I/O manager only needs two things from it: what kind of
//! device backs the file, and the per-kind state used while driving a
//! request.
//!
//! The kind is decided once when a request is accepted and carried as
//! data from then on. Mass storage items expose the file handle the space
//! authority translates against; tape items expose the assigned unit,
//! recording format, noise threshold and the lost-position condition.

use super::channel::DeviceId;
use super::space::MfdFileId;
use super::word::TransferFormat;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capability tag of a facility item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FacilityKind {
    MassStorage = 0,
    Tape = 1,
    /// Assigned but neither disk nor tape (e.g. an absolute device)
    Unclassified = 2,
}

/// Mass storage specific state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MassStorageFacility {
    /// Handle the space authority knows this file by
    pub file: MfdFileId,
}

/// Tape specific state
#[derive(Debug)]
pub struct TapeFacility {
    /// Unit the reel is mounted on
    pub device: DeviceId,
    /// Blocks of this many encoded bytes or fewer are treated as noise
    pub noise_constant: usize,
    /// Recording format
    pub format: TransferFormat,
    /// Set when the operator gives up on a tape error; cleared by rewind
    position_lost: AtomicBool,
}

impl TapeFacility {
    pub fn new(device: DeviceId, noise_constant: usize, format: TransferFormat) -> Self {
        Self {
            device,
            noise_constant,
            format,
            position_lost: AtomicBool::new(false),
        }
    }

    pub fn is_position_lost(&self) -> bool {
        self.position_lost.load(Ordering::Acquire)
    }

    pub fn set_position_lost(&self) {
        self.position_lost.store(true, Ordering::Release);
    }

    pub fn clear_position_lost(&self) {
        self.position_lost.store(false, Ordering::Release);
    }
}

/// Per-kind facility state
#[derive(Debug, Clone)]
pub enum FacilityVariant {
    MassStorage(MassStorageFacility),
    Tape(Arc<TapeFacility>),
    Unclassified,
}

/// Assigned file
#[derive(Debug)]
pub struct FacilityItem {
    /// File qualifier
    pub qualifier: String,
    /// File name
    pub filename: String,
    variant: FacilityVariant,
}

impl FacilityItem {
    pub fn mass_storage(qualifier: &str, filename: &str, file: MfdFileId) -> Self {
        Self {
            qualifier: qualifier.to_string(),
            filename: filename.to_string(),
            variant: FacilityVariant::MassStorage(MassStorageFacility { file }),
        }
    }

    pub fn tape(qualifier: &str, filename: &str, tape: TapeFacility) -> Self {
        Self {
            qualifier: qualifier.to_string(),
            filename: filename.to_string(),
            variant: FacilityVariant::Tape(Arc::new(tape)),
        }
    }

    pub fn unclassified(qualifier: &str, filename: &str) -> Self {
        Self {
            qualifier: qualifier.to_string(),
            filename: filename.to_string(),
            variant: FacilityVariant::Unclassified,
        }
    }

    pub fn kind(&self) -> FacilityKind {
        match self.variant {
            FacilityVariant::MassStorage(_) => FacilityKind::MassStorage,
            FacilityVariant::Tape(_) => FacilityKind::Tape,
            FacilityVariant::Unclassified => FacilityKind::Unclassified,
        }
    }

    pub fn variant(&self) -> &FacilityVariant {
        &self.variant
    }
}

impl fmt::Display for FacilityItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.qualifier, self.filename)
    }
}

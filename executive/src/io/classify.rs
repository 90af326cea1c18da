//! Channel Outcome Classification
//!
//! When a child operation finishes, its (channel status, device status)
//! pair decides what the tracker does next:
//!
//! | Outcome                         | Disposition                        |
//! |---------------------------------|------------------------------------|
//! | channel successful              | success                            |
//! | tape end condition              | complete with end status           |
//! | channel out of buffers          | silent retry                       |
//! | channel cancelled               | complete with cancelled status     |
//! | bad route / device fault        | escalate to the operator           |
//!
//! Device faults are looked up in a table per facility kind. Each entry
//! gives the console mnemonic, the responses the operator may give, and
//! the status the request completes with if the operator gives up. Every
//! disk class, route class included, has a mnemonic no tape class uses,
//! so a console log alone tells which kind of unit failed.

use super::channel::{ChannelStatus, DeviceStatus};
use super::request::IoStatus;
use crate::ex::ResponseSet;

const RETRY: ResponseSet = ResponseSet::RETRY;
const MARK: ResponseSet = ResponseSet::MARK;
const ABORT: ResponseSet = ResponseSet::ABORT;
const DIAGNOSE: ResponseSet = ResponseSet::DIAGNOSE;

/// How an escalated fault is presented and resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    /// Short console mnemonic
    pub mnemonic: &'static str,
    /// Responses the operator may give
    pub responses: ResponseSet,
    /// Status the request completes with if the operator fails it
    pub pending_status: IoStatus,
}

impl ErrorClass {
    const fn new(mnemonic: &'static str, responses: ResponseSet, pending_status: IoStatus) -> Self {
        Self {
            mnemonic,
            responses,
            pending_status,
        }
    }
}

struct ErrorTableEntry {
    device_status: DeviceStatus,
    class: ErrorClass,
}

const fn entry(
    device_status: DeviceStatus,
    mnemonic: &'static str,
    responses: ResponseSet,
    pending_status: IoStatus,
) -> ErrorTableEntry {
    ErrorTableEntry {
        device_status,
        class: ErrorClass::new(mnemonic, responses, pending_status),
    }
}

static DISK_ERROR_TABLE: [ErrorTableEntry; 6] = [
    entry(DeviceStatus::NotReady, "NRDY", RETRY.union(ABORT).union(DIAGNOSE), IoStatus::DeviceNotReady),
    entry(DeviceStatus::DataCheck, "DCHK", ResponseSet::all(), IoStatus::DataCheck),
    entry(DeviceStatus::WriteProtected, "WPRT", RETRY.union(ABORT).union(DIAGNOSE), IoStatus::WriteProtected),
    entry(DeviceStatus::InvalidBlockId, "IBID", ABORT.union(DIAGNOSE), IoStatus::InvalidAddress),
    entry(DeviceStatus::InvalidBlockCount, "IBCT", ABORT.union(DIAGNOSE), IoStatus::InvalidAddress),
    entry(DeviceStatus::ControllerCheck, "CTLR", RETRY.union(ABORT).union(DIAGNOSE), IoStatus::DeviceError),
];

static DISK_DEFAULT: ErrorClass =
    ErrorClass::new("DERR", RETRY.union(ABORT).union(DIAGNOSE), IoStatus::DeviceError);

static TAPE_ERROR_TABLE: [ErrorTableEntry; 5] = [
    entry(DeviceStatus::NotReady, "OFFL", RETRY.union(ABORT).union(DIAGNOSE), IoStatus::DeviceNotReady),
    entry(DeviceStatus::DataCheck, "PARI", ResponseSet::all(), IoStatus::DataCheck),
    entry(DeviceStatus::WriteProtected, "NRNG", RETRY.union(ABORT).union(DIAGNOSE), IoStatus::WriteProtected),
    entry(DeviceStatus::LostPosition, "LPOS", MARK.union(ABORT).union(DIAGNOSE), IoStatus::LostPosition),
    entry(DeviceStatus::ControllerCheck, "TCTL", ResponseSet::all(), IoStatus::DeviceError),
];

static TAPE_DEFAULT: ErrorClass = ErrorClass::new("TERR", ResponseSet::all(), IoStatus::DeviceError);

/// Channel could not reach a disk unit along the chosen route
static DISK_ROUTE_ERROR: ErrorClass =
    ErrorClass::new("DROU", RETRY.union(ABORT).union(DIAGNOSE), IoStatus::DeviceNotAvailable);

/// Channel could not reach a tape unit along the chosen route
static TAPE_ROUTE_ERROR: ErrorClass =
    ErrorClass::new("TROU", RETRY.union(ABORT).union(DIAGNOSE), IoStatus::DeviceNotAvailable);

/// Next step after a child operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    /// Tape end condition; data moved, request ends with this status
    EndCondition(IoStatus),
    /// Transient channel resource shortage; dispatch again unprompted
    SilentRetry,
    Escalate(ErrorClass),
    /// Terminal without operator involvement
    Fatal(IoStatus),
}

fn lookup(table: &[ErrorTableEntry], default: &ErrorClass, device: DeviceStatus) -> ErrorClass {
    table
        .iter()
        .find(|e| e.device_status == device)
        .map(|e| e.class)
        .unwrap_or(*default)
}

/// Channel-level faults; `route` is the class for an unreachable unit
fn classify_channel(channel: ChannelStatus, route: ErrorClass) -> Option<Disposition> {
    match channel {
        ChannelStatus::Successful => Some(Disposition::Success),
        ChannelStatus::InsufficientBuffers => Some(Disposition::SilentRetry),
        ChannelStatus::Cancelled => Some(Disposition::Fatal(IoStatus::OperationCancelled)),
        // In-progress is never classified; treat a stray one like a bad route
        ChannelStatus::InvalidRoute | ChannelStatus::InProgress => {
            Some(Disposition::Escalate(route))
        }
        ChannelStatus::DeviceError => None,
    }
}

/// Classify a mass storage child operation
pub fn classify_mass_storage(channel: ChannelStatus, device: DeviceStatus) -> Disposition {
    classify_channel(channel, DISK_ROUTE_ERROR).unwrap_or_else(|| {
        Disposition::Escalate(lookup(&DISK_ERROR_TABLE, &DISK_DEFAULT, device))
    })
}

/// A disk child that ended successfully but moved fewer words than its
/// descriptor list covers
pub fn classify_short_transfer() -> Disposition {
    Disposition::Escalate(DISK_DEFAULT)
}

/// Classify a tape operation
pub fn classify_tape(channel: ChannelStatus, device: DeviceStatus) -> Disposition {
    if matches!(channel, ChannelStatus::Successful | ChannelStatus::DeviceError) {
        match device {
            DeviceStatus::EndOfFile => return Disposition::EndCondition(IoStatus::EndOfFile),
            DeviceStatus::EndOfTape => return Disposition::EndCondition(IoStatus::EndOfTape),
            DeviceStatus::LoadPoint => return Disposition::EndCondition(IoStatus::LoadPoint),
            _ => {}
        }
    }
    classify_channel(channel, TAPE_ROUTE_ERROR).unwrap_or_else(|| {
        Disposition::Escalate(lookup(&TAPE_ERROR_TABLE, &TAPE_DEFAULT, device))
    })
}

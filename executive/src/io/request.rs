//! I/O Requests
//!
//! An `IoRequest` is what a running program hands the I/O manager: a
//! function code, a starting file-relative word address, a descriptor list
//! over the caller's buffer, the owning activity and the facility item.
//! The request is owned by the caller; trackers hold a reference and write
//! the outcome into its result fields.
//!
//! # Completion
//!
//! The status is authoritative as soon as a tracker completes. The caller
//! is woken when the manager reaps the tracker on its following pass;
//! `wait_for_completion` parks the calling thread until then.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;
use std::sync::Arc;
use std::thread::{self, Thread};

use super::descriptor::DescriptorList;
use super::facility::{FacilityItem, FacilityKind};
use super::space::MfdError;
use super::word::WordBuffer;
use crate::ex::activity::Activity;

/// I/O function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IoFunction {
    Write = 0o10,
    WriteEndOfFile = 0o11,
    Read = 0o20,
    ReadBackward = 0o21,
    MoveForward = 0o30,
    MoveBackward = 0o31,
    Rewind = 0o40,
    RewindInterlock = 0o41,
}

impl IoFunction {
    /// Decode a raw function code
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0o10 => Some(Self::Write),
            0o11 => Some(Self::WriteEndOfFile),
            0o20 => Some(Self::Read),
            0o21 => Some(Self::ReadBackward),
            0o30 => Some(Self::MoveForward),
            0o31 => Some(Self::MoveBackward),
            0o40 => Some(Self::Rewind),
            0o41 => Some(Self::RewindInterlock),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Console mnemonic
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Write => "W",
            Self::WriteEndOfFile => "WEF",
            Self::Read => "R",
            Self::ReadBackward => "BR",
            Self::MoveForward => "MF",
            Self::MoveBackward => "MB",
            Self::Rewind => "REW",
            Self::RewindInterlock => "RWI",
        }
    }

    /// Functions that put data or marks onto the medium
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::WriteEndOfFile)
    }

    /// Functions that reposition a tape to load point
    pub const fn is_rewind(self) -> bool {
        matches!(self, Self::Rewind | Self::RewindInterlock)
    }

    /// Whether a facility of `kind` accepts this function
    pub const fn accepted_by(self, kind: FacilityKind) -> bool {
        match kind {
            FacilityKind::MassStorage => matches!(self, Self::Read | Self::Write),
            FacilityKind::Tape => true,
            FacilityKind::Unclassified => false,
        }
    }
}

/// Request completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum IoStatus {
    #[default]
    InProgress = 0o77,
    Successful = 0o00,
    EndOfFile = 0o01,
    EndOfTape = 0o02,
    LoadPoint = 0o03,
    NonIntegralBlock = 0o04,
    LostPosition = 0o05,
    DeviceNotReady = 0o10,
    DataCheck = 0o11,
    WriteProtected = 0o12,
    DeviceError = 0o13,
    InvalidAddress = 0o14,
    InvalidFunction = 0o20,
    InvalidBuffer = 0o21,
    WriteTooSmall = 0o22,
    BlockTooLarge = 0o23,
    AddressTranslation = 0o30,
    RegionNotAllocated = 0o31,
    MassStorageOverflow = 0o32,
    MaximumSizeExceeded = 0o33,
    PackUnavailable = 0o34,
    DeviceNotAvailable = 0o35,
    OperationCancelled = 0o40,
    TaskAbort = 0o41,
    InternalError = 0o42,
}

impl IoStatus {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl From<MfdError> for IoStatus {
    fn from(error: MfdError) -> Self {
        match error {
            MfdError::InsufficientSpace => Self::MassStorageOverflow,
            MfdError::MaximumSizeExceeded => Self::MaximumSizeExceeded,
            MfdError::FileNotFound => Self::AddressTranslation,
            MfdError::DirectoryError => Self::InternalError,
        }
    }
}

impl fmt::Display for IoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:03o})", self, self.code())
    }
}

/// Output fields of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoResult {
    pub status: IoStatus,
    /// Words moved on behalf of the caller
    pub word_count: usize,
    /// Trailing partial-word frames (tape reads)
    pub abnormal_frame_count: usize,
}

/// Caller-owned I/O request
pub struct IoRequest {
    /// Raw function code, validated against the facility kind
    pub function_code: u8,
    /// File-relative starting word address (mass storage)
    pub word_address: u64,
    /// Caller's buffer
    pub buffer: WordBuffer,
    /// Gather/scatter list over `buffer`
    pub descriptors: DescriptorList,
    pub activity: Arc<Activity>,
    pub facility: Arc<FacilityItem>,

    result: Mutex<IoResult>,
    complete: AtomicBool,
    waiter: Mutex<Option<Thread>>,
}

impl IoRequest {
    pub fn new(
        activity: Arc<Activity>,
        facility: Arc<FacilityItem>,
        function_code: u8,
        word_address: u64,
        buffer: WordBuffer,
        descriptors: DescriptorList,
    ) -> Self {
        Self {
            function_code,
            word_address,
            buffer,
            descriptors,
            activity,
            facility,
            result: Mutex::new(IoResult::default()),
            complete: AtomicBool::new(false),
            waiter: Mutex::new(None),
        }
    }

    /// Request covering the whole of `buffer` in increment mode
    pub fn contiguous(
        activity: Arc<Activity>,
        facility: Arc<FacilityItem>,
        function: IoFunction,
        word_address: u64,
        buffer: WordBuffer,
    ) -> Self {
        let descriptors = DescriptorList::contiguous(0, buffer.len());
        Self::new(activity, facility, function.code(), word_address, buffer, descriptors)
    }

    /// Decoded function, `None` for an unknown code
    pub fn function(&self) -> Option<IoFunction> {
        IoFunction::from_code(self.function_code)
    }

    pub fn result(&self) -> IoResult {
        *self.result.lock()
    }

    pub fn status(&self) -> IoStatus {
        self.result.lock().status
    }

    /// True once the issuing caller has been woken
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Park the calling thread until the request is complete
    pub fn wait_for_completion(&self) -> IoResult {
        *self.waiter.lock() = Some(thread::current());
        while !self.is_complete() {
            thread::park();
        }
        self.result()
    }

    pub(crate) fn set_result(&self, status: IoStatus, word_count: usize, abnormal_frame_count: usize) {
        *self.result.lock() = IoResult {
            status,
            word_count,
            abnormal_frame_count,
        };
    }

    /// Mark complete and wake the issuing caller
    pub(crate) fn signal_complete(&self) {
        self.complete.store(true, Ordering::Release);
        if let Some(waiter) = self.waiter.lock().take() {
            waiter.unpark();
        }
    }
}

impl fmt::Debug for IoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoRequest")
            .field("function_code", &format_args!("{:03o}", self.function_code))
            .field("word_address", &self.word_address)
            .field("facility", &self.facility.to_string())
            .field("run_id", &self.activity.run_id())
            .field("result", &self.result())
            .finish()
    }
}

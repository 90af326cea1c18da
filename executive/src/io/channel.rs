//! Channel Programs and Device Paths
//!
//! A channel program describes one physical operation: command, target
//! device, device-relative block address, the buffer and descriptor list
//! data moves through, and the recording format. After the I/O processor
//! finishes it, the same structure carries back channel status, device
//! status, transfer counts and any raw sense bytes.
//!
//! A tracker owns exactly one channel program and reuses it for every
//! child operation. The program is shared with the I/O processor through a
//! `ChannelProgramHandle`; completion is observed by polling its status,
//! never by callback.
//!
//! # Paths
//!
//! ```text
//! IOP ──> channel module ──> controller ──> device
//! ```
//!
//! The device path resolver maps a device to a route and a processor id to
//! the node that accepts channel programs for it.

use core::fmt;
use spin::{Mutex, MutexGuard};
use std::sync::Arc;

use super::descriptor::DescriptorList;
use super::word::{TransferFormat, WordBuffer};

/// Logical device identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

/// I/O processor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorId(pub u32);

/// Physical route to a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRoute {
    pub processor: ProcessorId,
    pub channel_module: u32,
    pub controller: u32,
    pub device: DeviceId,
    /// Operator-facing device name
    pub device_name: String,
}

impl fmt::Display for ChannelRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IOP{}/CM{}/CU{}",
            self.processor.0, self.channel_module, self.controller
        )
    }
}

/// Channel command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ChannelCommand {
    #[default]
    Read = 0,
    Write = 1,
    ReadBackward = 2,
    WriteEndOfFile = 3,
    Rewind = 4,
    RewindInterlock = 5,
    MoveBlockForward = 6,
    MoveBlockBackward = 7,
}

/// Channel level outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ChannelStatus {
    /// Program finished cleanly
    #[default]
    Successful = 0,
    /// Program dispatched and not yet finished
    InProgress = 1,
    /// Program was cancelled before completion
    Cancelled = 2,
    /// Channel had no buffers to stage the transfer
    InsufficientBuffers = 3,
    /// Route did not lead to the addressed device
    InvalidRoute = 4,
    /// Device reported a fault; see the device status
    DeviceError = 5,
}

/// Device level outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DeviceStatus {
    #[default]
    Normal = 0,
    NotReady = 1,
    DataCheck = 2,
    WriteProtected = 3,
    InvalidBlockId = 4,
    InvalidBlockCount = 5,
    EndOfFile = 6,
    EndOfTape = 7,
    LoadPoint = 8,
    LostPosition = 9,
    ControllerCheck = 10,
    SystemException = 11,
}

/// One physical operation
#[derive(Debug)]
pub struct ChannelProgram {
    pub command: ChannelCommand,
    pub device: DeviceId,
    /// Device-relative block address (mass storage only)
    pub block_address: u64,
    /// Buffer the descriptors index into
    pub buffer: WordBuffer,
    pub descriptors: DescriptorList,
    pub format: TransferFormat,

    // Filled in by the I/O processor
    pub channel_status: ChannelStatus,
    pub device_status: DeviceStatus,
    pub words_transferred: usize,
    pub bytes_transferred: usize,
    /// Trailing frames that did not make up a whole word (tape)
    pub abnormal_frame_count: usize,
    /// Raw status bytes reported with a fault
    pub sense_bytes: Vec<u8>,
}

impl ChannelProgram {
    pub fn new() -> Self {
        Self {
            command: ChannelCommand::Read,
            device: DeviceId(0),
            block_address: 0,
            buffer: WordBuffer::new(0),
            descriptors: DescriptorList::default(),
            format: TransferFormat::default(),
            channel_status: ChannelStatus::Successful,
            device_status: DeviceStatus::Normal,
            words_transferred: 0,
            bytes_transferred: 0,
            abnormal_frame_count: 0,
            sense_bytes: Vec::new(),
        }
    }

    /// Clear completion fields and mark the program in flight
    pub fn mark_in_progress(&mut self) {
        self.channel_status = ChannelStatus::InProgress;
        self.device_status = DeviceStatus::Normal;
        self.words_transferred = 0;
        self.bytes_transferred = 0;
        self.abnormal_frame_count = 0;
        self.sense_bytes.clear();
    }

    /// Record completion (called by the I/O processor)
    pub fn complete(&mut self, channel: ChannelStatus, device: DeviceStatus, words: usize) {
        self.channel_status = channel;
        self.device_status = device;
        self.words_transferred = words;
        self.bytes_transferred = self.format.encoded_bytes(words);
    }

    pub fn is_in_progress(&self) -> bool {
        self.channel_status == ChannelStatus::InProgress
    }
}

impl Default for ChannelProgram {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle onto a tracker's channel program
#[derive(Debug, Clone)]
pub struct ChannelProgramHandle(Arc<Mutex<ChannelProgram>>);

impl ChannelProgramHandle {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ChannelProgram::new())))
    }

    pub fn lock(&self) -> MutexGuard<'_, ChannelProgram> {
        self.0.lock()
    }

    pub fn is_in_progress(&self) -> bool {
        self.0.lock().is_in_progress()
    }
}

impl Default for ChannelProgramHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts channel programs for asynchronous execution
pub trait IoProcessor: Send + Sync {
    /// Begin executing `program` along `route`
    ///
    /// Must not wait for the operation; completion is reported through the
    /// program's status fields.
    fn start_io(&self, route: &ChannelRoute, program: ChannelProgramHandle);
}

/// Device topology lookups
pub trait DevicePathResolver: Send + Sync {
    /// Currently usable route to `device`, if any
    fn route(&self, device: DeviceId) -> Option<ChannelRoute>;

    /// Dispatch node for an I/O processor
    fn io_processor(&self, processor: ProcessorId) -> Option<Arc<dyn IoProcessor>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_lifecycle() {
        let handle = ChannelProgramHandle::new();
        assert!(!handle.is_in_progress());

        {
            let mut program = handle.lock();
            program.sense_bytes.push(0x40);
            program.mark_in_progress();
            assert!(program.sense_bytes.is_empty());
        }
        assert!(handle.is_in_progress());

        handle
            .lock()
            .complete(ChannelStatus::Successful, DeviceStatus::Normal, 2);
        let program = handle.lock();
        assert!(!program.is_in_progress());
        assert_eq!(program.bytes_transferred, 9);
    }

    #[test]
    fn test_route_display() {
        let route = ChannelRoute {
            processor: ProcessorId(0),
            channel_module: 1,
            controller: 2,
            device: DeviceId(5),
            device_name: "DISK5".to_string(),
        };
        assert_eq!(route.to_string(), "IOP0/CM1/CU2");
    }
}

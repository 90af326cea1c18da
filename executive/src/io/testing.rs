//! In-crate collaborators for scenario tests
//!
//! - [`FakeSpace`]: allocation and translation over a map of tracks
//! - [`FakeIop`]: disk packs and tape reels held in memory
//! - [`FakeConsole`]: records prompts and status lines

use spin::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::ex::{ConsoleCollaborator, ReadReplyMessage};
use crate::io::channel::{
    ChannelCommand, ChannelProgramHandle, ChannelRoute, ChannelStatus, DeviceId,
    DevicePathResolver, DeviceStatus, IoProcessor, ProcessorId,
};
use crate::io::space::{MfdError, MfdFileId, PackIndex, PackInfo, PhysicalTrack, SpaceAuthority};
use crate::io::word::Word;

#[derive(Default)]
struct SpaceState {
    tracks: HashMap<(MfdFileId, u64), PhysicalTrack>,
    packs: HashMap<PackIndex, PackInfo>,
    default_pack: Option<PackIndex>,
    next_device_track: u64,
    allocate_error: Option<MfdError>,
    /// Allocation succeeds but maps no tracks
    allocate_unmapped: bool,
    allocations: Vec<(MfdFileId, u64, u64)>,
    bad_tracks: Vec<PhysicalTrack>,
}

/// Space authority that hands out device tracks in order on the first pack
#[derive(Default)]
pub struct FakeSpace {
    state: Mutex<SpaceState>,
}

impl FakeSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pack(&self, pack: PackIndex, device: DeviceId, prep_factor: usize) {
        let mut state = self.state.lock();
        state.packs.insert(pack, PackInfo { device, prep_factor });
        state.default_pack.get_or_insert(pack);
    }

    pub fn map_track(&self, file: MfdFileId, file_track: u64, physical: PhysicalTrack) {
        self.state.lock().tracks.insert((file, file_track), physical);
    }

    pub fn fail_allocation(&self, error: MfdError) {
        self.state.lock().allocate_error = Some(error);
    }

    /// Accept allocations without mapping the tracks they cover
    pub fn allocate_unmapped(&self) {
        self.state.lock().allocate_unmapped = true;
    }

    pub fn allocations(&self) -> Vec<(MfdFileId, u64, u64)> {
        self.state.lock().allocations.clone()
    }

    pub fn bad_tracks(&self) -> Vec<PhysicalTrack> {
        self.state.lock().bad_tracks.clone()
    }
}

impl SpaceAuthority for FakeSpace {
    fn allocate(&self, file: MfdFileId, first_track: u64, track_count: u64) -> Result<(), MfdError> {
        let mut state = self.state.lock();
        state.allocations.push((file, first_track, track_count));
        if let Some(error) = state.allocate_error {
            return Err(error);
        }
        if state.allocate_unmapped {
            return Ok(());
        }
        let pack = state.default_pack.ok_or(MfdError::InsufficientSpace)?;
        for track in first_track..first_track + track_count {
            if !state.tracks.contains_key(&(file, track)) {
                let device_track = state.next_device_track;
                state.next_device_track += 1;
                state.tracks.insert((file, track), PhysicalTrack { pack, device_track });
            }
        }
        Ok(())
    }

    fn translate(&self, file: MfdFileId, file_track: u64) -> Option<PhysicalTrack> {
        self.state.lock().tracks.get(&(file, file_track)).copied()
    }

    fn pack_info(&self, pack: PackIndex) -> Option<PackInfo> {
        self.state.lock().packs.get(&pack).copied()
    }

    fn mark_bad_track(&self, track: PhysicalTrack) {
        self.state.lock().bad_tracks.push(track);
    }
}

/// One record on a fake reel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapeBlock {
    Data { words: Vec<Word>, frames: usize },
    FileMark,
}

#[derive(Default)]
struct Reel {
    blocks: Vec<TapeBlock>,
    position: usize,
}

/// One operation as the processor saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedIo {
    pub command: ChannelCommand,
    pub device: DeviceId,
    pub block_address: u64,
    pub words: usize,
}

#[derive(Default)]
struct IopState {
    /// Disk contents by (device, block address)
    disks: HashMap<(DeviceId, u64), Vec<Word>>,
    /// Words per block of each disk unit
    disk_devices: HashMap<DeviceId, usize>,
    reels: HashMap<DeviceId, Reel>,
    down: HashSet<DeviceId>,
    manual: bool,
    pending: Vec<ChannelProgramHandle>,
    faults: VecDeque<(ChannelStatus, DeviceStatus)>,
    /// Word counts reported by the next successful disk operations
    short: VecDeque<usize>,
    started: Vec<StartedIo>,
}

/// I/O processor and path resolver over in-memory media
#[derive(Default)]
pub struct FakeIop {
    state: Mutex<IopState>,
}

impl FakeIop {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_disk(&self, device: DeviceId, prep_factor: usize) {
        self.state.lock().disk_devices.insert(device, prep_factor);
    }

    pub fn add_tape(&self, device: DeviceId, blocks: Vec<TapeBlock>) {
        self.state.lock().reels.insert(device, Reel { blocks, position: 0 });
    }

    /// Hold programs until [`FakeIop::complete_pending`] runs them
    pub fn set_manual(&self, manual: bool) {
        self.state.lock().manual = manual;
    }

    pub fn set_route_down(&self, device: DeviceId, down: bool) {
        let mut state = self.state.lock();
        if down {
            state.down.insert(device);
        } else {
            state.down.remove(&device);
        }
    }

    /// Fail the next operation with the given statuses
    pub fn inject_fault(&self, channel: ChannelStatus, device: DeviceStatus) {
        self.state.lock().faults.push_back((channel, device));
    }

    /// Report at most `words` moved on the next successful disk operation
    pub fn inject_short_transfer(&self, words: usize) {
        self.state.lock().short.push_back(words);
    }

    pub fn complete_pending(&self) -> usize {
        let pending = core::mem::take(&mut self.state.lock().pending);
        for program in &pending {
            self.execute(program);
        }
        pending.len()
    }

    pub fn started(&self) -> Vec<StartedIo> {
        self.state.lock().started.clone()
    }

    pub fn disk_block(&self, device: DeviceId, block: u64) -> Option<Vec<Word>> {
        self.state.lock().disks.get(&(device, block)).cloned()
    }

    pub fn set_disk_block(&self, device: DeviceId, block: u64, words: Vec<Word>) {
        self.state.lock().disks.insert((device, block), words);
    }

    pub fn tape_blocks(&self, device: DeviceId) -> Vec<TapeBlock> {
        self.state
            .lock()
            .reels
            .get(&device)
            .map(|r| r.blocks.clone())
            .unwrap_or_default()
    }

    fn execute(&self, handle: &ChannelProgramHandle) {
        let mut program = handle.lock();
        let mut state = self.state.lock();
        let device = program.device;
        let words = program.descriptors.total_words();
        state.started.push(StartedIo {
            command: program.command,
            device,
            block_address: program.block_address,
            words,
        });

        if let Some((channel, status)) = state.faults.pop_front() {
            program.sense_bytes = vec![0x40, status as u8];
            program.complete(channel, status, 0);
            return;
        }

        let buffer = program.buffer.clone();
        if let Some(&prep) = state.disk_devices.get(&device) {
            let first = program.block_address;
            match program.command {
                ChannelCommand::Write => {
                    let data = program.descriptors.gather(&buffer.lock());
                    for (block, chunk) in (first..).zip(data.chunks(prep)) {
                        let mut stored = chunk.to_vec();
                        stored.resize(prep, 0);
                        state.disks.insert((device, block), stored);
                    }
                }
                _ => {
                    let mut data = Vec::with_capacity(words);
                    let mut block = first;
                    while data.len() < words {
                        match state.disks.get(&(device, block)) {
                            Some(stored) => data.extend_from_slice(stored),
                            None => data.resize(data.len() + prep, 0),
                        }
                        block += 1;
                    }
                    data.truncate(words);
                    program.descriptors.scatter(&mut buffer.lock(), &data);
                }
            }
            let moved = state.short.pop_front().map_or(words, |limit| limit.min(words));
            program.complete(ChannelStatus::Successful, DeviceStatus::Normal, moved);
            return;
        }

        let Some(reel) = state.reels.get_mut(&device) else {
            program.complete(ChannelStatus::InvalidRoute, DeviceStatus::Normal, 0);
            return;
        };
        let (status, moved, frames) = match program.command {
            ChannelCommand::Write => {
                let data = program.descriptors.gather(&buffer.lock());
                reel.blocks.truncate(reel.position);
                reel.blocks.push(TapeBlock::Data { words: data, frames: 0 });
                reel.position += 1;
                (DeviceStatus::Normal, words, 0)
            }
            ChannelCommand::WriteEndOfFile => {
                reel.blocks.truncate(reel.position);
                reel.blocks.push(TapeBlock::FileMark);
                reel.position += 1;
                (DeviceStatus::Normal, 0, 0)
            }
            ChannelCommand::Rewind | ChannelCommand::RewindInterlock => {
                reel.position = 0;
                (DeviceStatus::Normal, 0, 0)
            }
            ChannelCommand::Read | ChannelCommand::MoveBlockForward => {
                match reel.blocks.get(reel.position).cloned() {
                    None => (DeviceStatus::EndOfTape, 0, 0),
                    Some(TapeBlock::FileMark) => {
                        reel.position += 1;
                        (DeviceStatus::EndOfFile, 0, 0)
                    }
                    Some(TapeBlock::Data { words: data, frames }) => {
                        reel.position += 1;
                        if program.command == ChannelCommand::Read {
                            let moved = program.descriptors.scatter(&mut buffer.lock(), &data);
                            (DeviceStatus::Normal, moved, frames)
                        } else {
                            (DeviceStatus::Normal, 0, 0)
                        }
                    }
                }
            }
            ChannelCommand::ReadBackward | ChannelCommand::MoveBlockBackward => {
                if reel.position == 0 {
                    (DeviceStatus::LoadPoint, 0, 0)
                } else {
                    reel.position -= 1;
                    (DeviceStatus::Normal, 0, 0)
                }
            }
        };
        let channel = if status == DeviceStatus::Normal {
            ChannelStatus::Successful
        } else {
            ChannelStatus::DeviceError
        };
        program.complete(channel, status, moved);
        program.abnormal_frame_count = frames;
    }
}

impl IoProcessor for FakeIop {
    fn start_io(&self, _route: &ChannelRoute, program: ChannelProgramHandle) {
        let mut state = self.state.lock();
        if state.manual {
            state.pending.push(program);
            return;
        }
        drop(state);
        self.execute(&program);
    }
}

/// Resolves every device that is not marked down to the one fake processor
pub struct FakePaths {
    pub iop: Arc<FakeIop>,
}

impl DevicePathResolver for FakePaths {
    fn route(&self, device: DeviceId) -> Option<ChannelRoute> {
        if self.iop.state.lock().down.contains(&device) {
            return None;
        }
        Some(ChannelRoute {
            processor: ProcessorId(0),
            channel_module: 1,
            controller: device.0 / 8,
            device,
            device_name: format!("UNIT{:02}", device.0),
        })
    }

    fn io_processor(&self, processor: ProcessorId) -> Option<Arc<dyn IoProcessor>> {
        (processor == ProcessorId(0)).then(|| Arc::clone(&self.iop) as Arc<dyn IoProcessor>)
    }
}

/// Console that records everything posted to it
#[derive(Default)]
pub struct FakeConsole {
    prompts: Mutex<Vec<Arc<ReadReplyMessage>>>,
    status: Mutex<Vec<String>>,
}

impl FakeConsole {
    pub fn prompts(&self) -> Vec<Arc<ReadReplyMessage>> {
        self.prompts.lock().clone()
    }

    pub fn last_prompt(&self) -> Option<Arc<ReadReplyMessage>> {
        self.prompts.lock().last().cloned()
    }

    pub fn status_lines(&self) -> Vec<String> {
        self.status.lock().clone()
    }
}

impl ConsoleCollaborator for FakeConsole {
    fn post_read_reply(&self, message: Arc<ReadReplyMessage>) {
        self.prompts.lock().push(message);
    }

    fn post_status(&self, text: &str) {
        self.status.lock().push(text.to_string());
    }
}

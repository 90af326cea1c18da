//! Mass Storage Tracker
//!
//! Splits a word-addressed file transfer into block-sized child
//! operations, in strictly increasing file address order.
//!
//! For every child the tracker allocates space (writes, once for the
//! whole transfer), translates the file-relative track to a pack and
//! device track, and looks up the pack's prep factor. Whole blocks up to
//! the end of the track are moved straight to or from the caller's buffer
//! through a sub-range of the caller's descriptor list, as one child. A
//! block the transfer only partly covers goes through a scratch buffer:
//!
//! - **Prime**: read the whole block into the scratch buffer
//! - read requests copy the covered words out and are done with the block
//! - write requests move to **WriteBack**: the caller's words are laid over
//!   the primed block and the whole block is written back
//!
//! The scratch buffer is held from Prime through WriteBack and returned
//! before the next block is set up.
//!
//! A direct child covers as many whole blocks as remain on the current
//! track, not a single block. Child addresses still advance strictly and
//! never cross a track boundary, so a two-track aligned transfer is
//! exactly two children.
//!
//! A child that reports success but moved fewer words than its descriptor
//! list covers is put to the operator as a device error. Transfers whose
//! end address does not fit in a word address complete with
//! `InvalidAddress` before any space is allocated.

use log::{debug, trace};
use std::sync::Arc;

use super::{ConsoleStep, TrackerCommon, TrackerContext, TrackerState};
use crate::ex::SystemFault;
use crate::io::channel::{ChannelCommand, DeviceId};
use crate::io::classify::{classify_mass_storage, classify_short_transfer, Disposition};
use crate::io::descriptor::DescriptorList;
use crate::io::facility::FacilityKind;
use crate::io::pool::ChildBufferId;
use crate::io::request::{IoFunction, IoRequest, IoStatus};
use crate::io::space::{MfdFileId, PhysicalTrack};
use crate::io::word::TransferFormat;

/// Where the current child operation stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildPhase {
    /// Whole block straight through the caller's descriptors
    Direct,
    /// Scratch read of a partly covered block outstanding
    Prime,
    /// Scratch block primed and merged; write pending
    WriteBack,
}

pub(crate) struct MassStorageTracker {
    pub(super) common: TrackerCommon,
    file: MfdFileId,

    start_address: u64,
    next_address: u64,
    remaining_words: usize,
    total_words: usize,
    /// Caller words completed so far
    words_done: usize,
    /// Words of the caller's descriptor list already consumed
    cursor: usize,
    allocated: bool,

    phase: ChildPhase,
    child_buffer: Option<ChildBufferId>,
    device: DeviceId,
    prep_factor: usize,
    physical: Option<PhysicalTrack>,
    block_address: u64,
    /// Word offset of the transfer within the current block
    block_offset: usize,
    /// Caller words the current child operation covers
    pending_words: usize,
}

impl MassStorageTracker {
    pub fn new(request: Arc<IoRequest>, file: MfdFileId) -> Self {
        Self {
            common: TrackerCommon::new(request),
            file,
            start_address: 0,
            next_address: 0,
            remaining_words: 0,
            total_words: 0,
            words_done: 0,
            cursor: 0,
            allocated: false,
            phase: ChildPhase::Direct,
            child_buffer: None,
            device: DeviceId(0),
            prep_factor: 0,
            physical: None,
            block_address: 0,
            block_offset: 0,
            pending_words: 0,
        }
    }

    pub fn remaining_words(&self) -> usize {
        self.remaining_words
    }

    pub fn has_child_buffer(&self) -> bool {
        self.child_buffer.is_some()
    }

    pub fn step(&mut self, ctx: &mut TrackerContext<'_>) -> Result<(), SystemFault> {
        match self.common.state {
            TrackerState::New => self.start(),
            TrackerState::ChildIoSetup => self.setup(ctx),
            TrackerState::ChildIoReady => self.ready(ctx),
            TrackerState::ChildIoInProgress => {
                self.common.await_completion();
                Ok(())
            }
            TrackerState::ChildIoDone => self.done(ctx),
            TrackerState::ConsolePending => self.console(ctx),
            TrackerState::Completed => Ok(()),
        }
    }

    /// Release any scratch buffer, then complete
    fn finish(&mut self, ctx: &mut TrackerContext<'_>, status: IoStatus) -> Result<(), SystemFault> {
        self.release_buffer(ctx)?;
        self.common.complete(status, self.words_done, 0);
        Ok(())
    }

    fn release_buffer(&mut self, ctx: &mut TrackerContext<'_>) -> Result<(), SystemFault> {
        if let Some(id) = self.child_buffer.take() {
            ctx.pool.release(id)?;
            trace!("[IO] {} released child buffer {}", self.common.request.facility, id.index());
        }
        Ok(())
    }

    /// Caller words now finished
    fn commit(&mut self, words: usize) {
        self.cursor += words;
        self.next_address += words as u64;
        self.remaining_words -= words;
        self.words_done += words;
    }

    /// `New`: validate and size the transfer
    fn start(&mut self) -> Result<(), SystemFault> {
        let request = Arc::clone(&self.common.request);
        let function = match request.function() {
            Some(f) if f.accepted_by(FacilityKind::MassStorage) => f,
            _ => {
                self.common.complete(IoStatus::InvalidFunction, 0, 0);
                return Ok(());
            }
        };
        self.common.function = Some(function);

        if !request.descriptors.fits(request.buffer.len()) {
            self.common.complete(IoStatus::InvalidBuffer, 0, 0);
            return Ok(());
        }

        let total_words = request.descriptors.total_words();
        if request.word_address.checked_add(total_words as u64).is_none() {
            self.common.complete(IoStatus::InvalidAddress, 0, 0);
            return Ok(());
        }

        self.start_address = request.word_address;
        self.next_address = request.word_address;
        self.total_words = total_words;
        self.remaining_words = total_words;
        self.common.set_state(TrackerState::ChildIoSetup);
        Ok(())
    }

    /// `ChildIoSetup`: plan the next child operation
    fn setup(&mut self, ctx: &mut TrackerContext<'_>) -> Result<(), SystemFault> {
        if self.common.owner_terminated() {
            return self.finish(ctx, IoStatus::TaskAbort);
        }
        if self.remaining_words == 0 {
            return self.finish(ctx, IoStatus::Successful);
        }

        let function = self.common.function();
        let is_write = function.is_write();
        let words_per_track = ctx.config.words_per_track as u64;

        if is_write && !self.allocated {
            let first_track = self.start_address / words_per_track;
            let end_address = self.start_address + self.total_words as u64;
            let end_track = end_address.div_ceil(words_per_track);
            if let Err(error) = ctx.space.allocate(self.file, first_track, end_track - first_track) {
                return self.finish(ctx, error.into());
            }
            self.allocated = true;
        }

        let file_track = self.next_address / words_per_track;
        let track_offset = (self.next_address % words_per_track) as usize;

        let Some(physical) = ctx.space.translate(self.file, file_track) else {
            let status = if is_write {
                IoStatus::AddressTranslation
            } else {
                IoStatus::RegionNotAllocated
            };
            return self.finish(ctx, status);
        };
        self.physical = Some(physical);

        let info = match ctx.space.pack_info(physical.pack) {
            Some(info)
                if info.prep_factor > 0 && ctx.config.words_per_track % info.prep_factor == 0 =>
            {
                info
            }
            _ => return self.finish(ctx, IoStatus::PackUnavailable),
        };
        let prep = info.prep_factor;
        self.device = info.device;
        self.prep_factor = prep;

        let blocks_per_track = (ctx.config.words_per_track / prep) as u64;
        let block_in_track = (track_offset / prep) as u64;
        self.block_offset = track_offset % prep;
        self.block_address = physical.device_track * blocks_per_track + block_in_track;

        let needs_child = self.block_offset != 0 || self.remaining_words < prep;
        {
            let mut program = self.common.program.lock();
            program.device = self.device;
            program.block_address = self.block_address;
            program.format = TransferFormat::Packed;

            if needs_child {
                self.phase = ChildPhase::Prime;
                self.pending_words = (prep - self.block_offset).min(self.remaining_words);
                program.command = ChannelCommand::Read;
            } else {
                // Whole blocks, never past the end of the track
                let whole_blocks = self.remaining_words - self.remaining_words % prep;
                self.phase = ChildPhase::Direct;
                self.pending_words = whole_blocks.min(ctx.config.words_per_track - track_offset);
                program.command = if is_write {
                    ChannelCommand::Write
                } else {
                    ChannelCommand::Read
                };
                program.buffer = self.common.request.buffer.clone();
                program.descriptors = self
                    .common
                    .request
                    .descriptors
                    .sub_range(self.cursor, self.pending_words);
            }
        }

        debug!(
            "[IO] {} child {:?} track {} -> {} block {:o} offset {} words {}",
            self.common.request.facility,
            self.phase,
            file_track,
            physical.pack,
            self.block_address,
            self.block_offset,
            self.pending_words
        );
        self.common.set_state(TrackerState::ChildIoReady);
        Ok(())
    }

    /// `ChildIoReady`: attach a scratch buffer if needed, then dispatch
    fn ready(&mut self, ctx: &mut TrackerContext<'_>) -> Result<(), SystemFault> {
        if self.common.owner_terminated() {
            return self.finish(ctx, IoStatus::TaskAbort);
        }

        if self.phase != ChildPhase::Direct && self.child_buffer.is_none() {
            if self.phase == ChildPhase::WriteBack {
                return Err(SystemFault::ChildBufferMissing {
                    facility: self.common.request.facility.to_string(),
                });
            }
            let Some(id) = ctx.pool.try_acquire() else {
                ctx.counters.buffer_wait();
                return Ok(());
            };
            trace!("[IO] {} attached child buffer {}", self.common.request.facility, id.index());
            self.child_buffer = Some(id);
            let mut program = self.common.program.lock();
            program.buffer = ctx.pool.buffer(id).clone();
            program.descriptors = DescriptorList::contiguous(0, self.prep_factor);
        }

        if self.phase == ChildPhase::WriteBack {
            self.overlay_caller_words();
        }

        if !self.common.dispatch(ctx, self.device) {
            return self.finish(ctx, IoStatus::DeviceNotAvailable);
        }
        Ok(())
    }

    /// Lay the caller's words for this block over the primed scratch block
    fn overlay_caller_words(&self) {
        let request = &self.common.request;
        let words = request
            .descriptors
            .sub_range(self.cursor, self.pending_words)
            .gather(&request.buffer.lock());
        let program = self.common.program.lock();
        let mut scratch = program.buffer.lock();
        scratch[self.block_offset..self.block_offset + words.len()].copy_from_slice(&words);
    }

    /// Copy the covered words of a primed block out to the caller
    fn deliver_scratch_words(&self) {
        let words = {
            let program = self.common.program.lock();
            let scratch = program.buffer.lock();
            scratch[self.block_offset..self.block_offset + self.pending_words].to_vec()
        };
        let request = &self.common.request;
        request
            .descriptors
            .sub_range(self.cursor, self.pending_words)
            .scatter(&mut request.buffer.lock(), &words);
    }

    /// `ChildIoDone`: act on the child's outcome
    fn done(&mut self, ctx: &mut TrackerContext<'_>) -> Result<(), SystemFault> {
        let (channel, device, transferred, expected) = {
            let program = self.common.program.lock();
            (
                program.channel_status,
                program.device_status,
                program.words_transferred,
                program.descriptors.total_words(),
            )
        };

        let disposition = match classify_mass_storage(channel, device) {
            Disposition::Success if transferred < expected => {
                debug!(
                    "[IO] {} short transfer: {} of {} words",
                    self.common.request.facility, transferred, expected
                );
                classify_short_transfer()
            }
            other => other,
        };
        match disposition {
            Disposition::Success => self.child_succeeded(ctx),
            Disposition::SilentRetry => {
                self.common.silent_retry(ctx);
                Ok(())
            }
            Disposition::Escalate(class) => {
                self.common.escalate(ctx, class);
                Ok(())
            }
            Disposition::EndCondition(status) | Disposition::Fatal(status) => {
                self.finish(ctx, status)
            }
        }
    }

    fn child_succeeded(&mut self, ctx: &mut TrackerContext<'_>) -> Result<(), SystemFault> {
        match self.phase {
            ChildPhase::Direct => {
                self.commit(self.pending_words);
                self.common.set_state(TrackerState::ChildIoSetup);
            }
            ChildPhase::Prime if self.common.function() == IoFunction::Write => {
                self.phase = ChildPhase::WriteBack;
                self.common.program.lock().command = ChannelCommand::Write;
                self.common.set_state(TrackerState::ChildIoReady);
            }
            ChildPhase::Prime => {
                self.deliver_scratch_words();
                self.release_buffer(ctx)?;
                self.commit(self.pending_words);
                self.common.set_state(TrackerState::ChildIoSetup);
            }
            ChildPhase::WriteBack => {
                self.release_buffer(ctx)?;
                self.commit(self.pending_words);
                self.phase = ChildPhase::Direct;
                self.common.set_state(TrackerState::ChildIoSetup);
            }
        }
        Ok(())
    }

    /// `ConsolePending`
    fn console(&mut self, ctx: &mut TrackerContext<'_>) -> Result<(), SystemFault> {
        match self.common.console_step(ctx) {
            ConsoleStep::Idle | ConsoleStep::Retry => Ok(()),
            ConsoleStep::Cancelled => self.finish(ctx, IoStatus::TaskAbort),
            ConsoleStep::Mark => {
                if let Some(track) = self.physical {
                    debug!(
                        "[IO] marking {} track {:o} bad",
                        track.pack, track.device_track
                    );
                    ctx.space.mark_bad_track(track);
                }
                let status = self.common.pending_status;
                self.finish(ctx, status)
            }
            ConsoleStep::Abort => {
                let status = self.common.pending_status;
                self.finish(ctx, status)
            }
            ConsoleStep::Diagnose => {
                let extra = match self.physical {
                    Some(track) => format!(
                        "PACK {} TRACK {:o} BLOCK {:o} PREP {} OFFSET {}",
                        track.pack, track.device_track, self.block_address, self.prep_factor,
                        self.block_offset
                    ),
                    None => "PACK NONE".to_string(),
                };
                self.common.diagnose(ctx, extra);
                Ok(())
            }
        }
    }
}

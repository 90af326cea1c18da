//! Tape Tracker
//!
//! A tape request is one channel operation: the caller's descriptor list
//! is handed to the unit as-is and the block is recorded in the reel's
//! format. There is no splitting, allocation or scratch staging.
//!
//! Writes are checked before anything reaches the unit: a block whose
//! encoded length does not exceed the reel's noise constant would read
//! back as noise, and the unit cannot write more than the maximum block.
//! Once the operator has given up on a reel's position, everything except
//! a rewind is refused until a rewind succeeds.

use log::debug;
use std::sync::Arc;

use super::{ConsoleStep, TrackerCommon, TrackerContext, TrackerState};
use crate::ex::SystemFault;
use crate::io::channel::ChannelCommand;
use crate::io::classify::{classify_tape, Disposition};
use crate::io::facility::{FacilityKind, TapeFacility};
use crate::io::request::{IoFunction, IoRequest, IoStatus};

/// Channel command for a tape function
fn command_for(function: IoFunction) -> ChannelCommand {
    match function {
        IoFunction::Read => ChannelCommand::Read,
        IoFunction::ReadBackward => ChannelCommand::ReadBackward,
        IoFunction::Write => ChannelCommand::Write,
        IoFunction::WriteEndOfFile => ChannelCommand::WriteEndOfFile,
        IoFunction::Rewind => ChannelCommand::Rewind,
        IoFunction::RewindInterlock => ChannelCommand::RewindInterlock,
        IoFunction::MoveForward => ChannelCommand::MoveBlockForward,
        IoFunction::MoveBackward => ChannelCommand::MoveBlockBackward,
    }
}

pub(crate) struct TapeTracker {
    pub(super) common: TrackerCommon,
    tape: Arc<TapeFacility>,
    total_words: usize,
    words_transferred: usize,
    abnormal_frames: usize,
    /// Status to finish with once the operation has gone through
    outcome: Option<IoStatus>,
}

impl TapeTracker {
    pub fn new(request: Arc<IoRequest>, tape: Arc<TapeFacility>) -> Self {
        Self {
            common: TrackerCommon::new(request),
            tape,
            total_words: 0,
            words_transferred: 0,
            abnormal_frames: 0,
            outcome: None,
        }
    }

    pub fn remaining_words(&self) -> usize {
        if self.outcome.is_some() {
            0
        } else {
            self.total_words
        }
    }

    pub fn step(&mut self, ctx: &mut TrackerContext<'_>) -> Result<(), SystemFault> {
        match self.common.state {
            TrackerState::New => self.start(ctx),
            TrackerState::ChildIoSetup => self.setup(),
            TrackerState::ChildIoReady => self.ready(ctx),
            TrackerState::ChildIoInProgress => self.common.await_completion(),
            TrackerState::ChildIoDone => self.done(ctx),
            TrackerState::ConsolePending => self.console(ctx),
            TrackerState::Completed => {}
        }
        Ok(())
    }

    fn finish(&mut self, status: IoStatus) {
        self.common
            .complete(status, self.words_transferred, self.abnormal_frames);
    }

    /// `New`: validate function, position and block size
    fn start(&mut self, ctx: &TrackerContext<'_>) {
        let request = Arc::clone(&self.common.request);
        let function = match request.function() {
            Some(f) if f.accepted_by(FacilityKind::Tape) => f,
            _ => return self.finish(IoStatus::InvalidFunction),
        };
        self.common.function = Some(function);

        if !request.descriptors.fits(request.buffer.len()) {
            return self.finish(IoStatus::InvalidBuffer);
        }
        if self.tape.is_position_lost() && !function.is_rewind() {
            return self.finish(IoStatus::LostPosition);
        }

        self.total_words = request.descriptors.total_words();
        if function == IoFunction::Write {
            if self.tape.format.encoded_bytes(self.total_words) <= self.tape.noise_constant {
                return self.finish(IoStatus::WriteTooSmall);
            }
            if self.total_words > ctx.config.max_tape_transfer_words {
                return self.finish(IoStatus::BlockTooLarge);
            }
        }
        self.common.set_state(TrackerState::ChildIoSetup);
    }

    /// `ChildIoSetup`: load the channel program, or finish if already done
    fn setup(&mut self) {
        if self.common.owner_terminated() {
            return self.finish(IoStatus::TaskAbort);
        }
        if let Some(status) = self.outcome {
            return self.finish(status);
        }

        let request = &self.common.request;
        {
            let mut program = self.common.program.lock();
            program.command = command_for(self.common.function());
            program.device = self.tape.device;
            program.block_address = 0;
            program.format = self.tape.format;
            program.buffer = request.buffer.clone();
            program.descriptors = request.descriptors.clone();
        }
        self.common.set_state(TrackerState::ChildIoReady);
    }

    /// `ChildIoReady`
    fn ready(&mut self, ctx: &TrackerContext<'_>) {
        if self.common.owner_terminated() {
            return self.finish(IoStatus::TaskAbort);
        }
        if !self.common.dispatch(ctx, self.tape.device) {
            self.finish(IoStatus::DeviceNotAvailable);
        }
    }

    fn record_counts(&mut self) {
        let program = self.common.program.lock();
        self.words_transferred = program.words_transferred;
        self.abnormal_frames = program.abnormal_frame_count;
    }

    /// `ChildIoDone`
    fn done(&mut self, ctx: &TrackerContext<'_>) {
        let (channel, device) = {
            let program = self.common.program.lock();
            (program.channel_status, program.device_status)
        };

        match classify_tape(channel, device) {
            Disposition::Success => {
                self.record_counts();
                if self.common.function().is_rewind() {
                    self.tape.clear_position_lost();
                }
                self.outcome = Some(if self.abnormal_frames > 0 {
                    IoStatus::NonIntegralBlock
                } else {
                    IoStatus::Successful
                });
                self.common.set_state(TrackerState::ChildIoSetup);
            }
            Disposition::EndCondition(status) => {
                self.record_counts();
                self.finish(status);
            }
            Disposition::SilentRetry => self.common.silent_retry(ctx),
            Disposition::Escalate(class) => self.common.escalate(ctx, class),
            Disposition::Fatal(status) => self.finish(status),
        }
    }

    /// `ConsolePending`
    fn console(&mut self, ctx: &TrackerContext<'_>) {
        match self.common.console_step(ctx) {
            ConsoleStep::Idle | ConsoleStep::Retry => {}
            ConsoleStep::Cancelled => self.finish(IoStatus::TaskAbort),
            ConsoleStep::Mark => {
                debug!("[IO] {} position lost", self.common.request.facility);
                self.tape.set_position_lost();
                let status = self.common.pending_status;
                self.finish(status);
            }
            ConsoleStep::Abort => {
                let status = self.common.pending_status;
                self.finish(status);
            }
            ConsoleStep::Diagnose => {
                let extra = {
                    let program = self.common.program.lock();
                    format!(
                        "FORMAT {} BYTES {} FRAMES {} POSITION {}",
                        program.format.letter(),
                        program.bytes_transferred,
                        program.abnormal_frame_count,
                        if self.tape.is_position_lost() { "LOST" } else { "KNOWN" }
                    )
                };
                self.common.diagnose(ctx, extra);
            }
        }
    }
}

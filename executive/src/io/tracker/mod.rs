//! Request Trackers
//!
//! A tracker drives one request from submission to completion. The I/O
//! manager advances every tracker by at most one state per poll pass:
//!
//! ```text
//!  New ──> ChildIoSetup ──> ChildIoReady ──> ChildIoInProgress ──> ChildIoDone
//!   │           │  ^             │  ^                                  │
//!   │           │  └─────────────┼──┼──────────── success ─────────────┤
//!   │           │                │  └──── silent retry / operator R ───┤
//!   │           │                │                                     v
//!   │           │                │                              ConsolePending
//!   v           v                v                                     │
//!  Completed <──────────────────────────────────────── fail / abort ────┘
//! ```
//!
//! Mass storage and tape requests share the state set and the operator
//! protocol but differ in setup (track splitting and scratch buffers for
//! disk, a single whole-block operation for tape), in the error table, and
//! in what "fail with side effect" does. The two variants are a sum type
//! matched explicitly in every handler.

pub mod mass_storage;
pub mod tape;

use core::fmt;
use log::{debug, warn};
use std::sync::Arc;

use self::mass_storage::MassStorageTracker;
use self::tape::TapeTracker;
use super::channel::{ChannelProgramHandle, ChannelRoute, DeviceId, DevicePathResolver};
use super::classify::ErrorClass;
use super::config::IoConfig;
use super::facility::{FacilityKind, FacilityVariant};
use super::manager::IoCounters;
use super::pool::ChildBufferPool;
use super::request::{IoFunction, IoRequest, IoStatus};
use super::space::SpaceAuthority;
use crate::ex::{ConsoleCollaborator, ConsoleExchange, ExchangeState, OperatorResponse, SystemFault};

/// Tracker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackerState {
    New = 0,
    ChildIoSetup = 1,
    ChildIoReady = 2,
    ChildIoInProgress = 3,
    ChildIoDone = 4,
    ConsolePending = 5,
    Completed = 6,
}

/// Everything a tracker may touch during one step
pub(crate) struct TrackerContext<'a> {
    pub pool: &'a mut ChildBufferPool,
    pub space: &'a dyn SpaceAuthority,
    pub paths: &'a dyn DevicePathResolver,
    pub console: &'a dyn ConsoleCollaborator,
    pub config: &'a IoConfig,
    pub counters: &'a IoCounters,
}

/// Outcome of inspecting a pending operator exchange
pub(crate) enum ConsoleStep {
    /// Nothing to act on this pass
    Idle,
    /// Exchange withdrawn or owner terminated
    Cancelled,
    Retry,
    Mark,
    Abort,
    Diagnose,
}

/// State shared by both tracker variants
pub(crate) struct TrackerCommon {
    pub request: Arc<IoRequest>,
    /// Decoded in `New`; `None` until then
    pub function: Option<IoFunction>,
    pub state: TrackerState,
    /// Status the request ends with if the operator fails it
    pub pending_status: IoStatus,
    /// Next dispatch repeats a failed operation
    pub retry: bool,
    pub program: ChannelProgramHandle,
    /// Route of the most recent dispatch
    pub route: Option<ChannelRoute>,
    pub exchange: Option<ConsoleExchange>,
}

impl TrackerCommon {
    fn new(request: Arc<IoRequest>) -> Self {
        Self {
            request,
            function: None,
            state: TrackerState::New,
            pending_status: IoStatus::InProgress,
            retry: false,
            program: ChannelProgramHandle::new(),
            route: None,
            exchange: None,
        }
    }

    pub fn set_state(&mut self, next: TrackerState) {
        if self.state != next {
            debug!(
                "[IO] {} {:?} -> {:?}",
                self.request.facility, self.state, next
            );
            self.state = next;
        }
    }

    /// Validated function; only valid after `New`
    pub fn function(&self) -> IoFunction {
        self.function.unwrap_or(IoFunction::Read)
    }

    pub fn function_mnemonic(&self) -> &'static str {
        self.function.map_or("??", IoFunction::mnemonic)
    }

    pub fn owner_terminated(&self) -> bool {
        self.request.activity.is_terminated()
    }

    /// Write the outcome into the request and enter `Completed`
    pub fn complete(&mut self, status: IoStatus, word_count: usize, abnormal_frames: usize) {
        self.exchange = None;
        self.request.set_result(status, word_count, abnormal_frames);
        if status != IoStatus::Successful {
            warn!(
                "[IO] {} {} for run {} completed with {}",
                self.request.facility,
                self.function_mnemonic(),
                self.request.activity.run_id(),
                status
            );
        }
        self.set_state(TrackerState::Completed);
    }

    /// Resolve a route and hand the channel program to its processor
    ///
    /// Returns false if no route or processor is available.
    pub fn dispatch(&mut self, ctx: &TrackerContext<'_>, device: DeviceId) -> bool {
        let Some(route) = ctx.paths.route(device) else {
            return false;
        };
        let Some(processor) = ctx.paths.io_processor(route.processor) else {
            return false;
        };

        if self.retry {
            debug!("[IO] {} retrying on {}", self.request.facility, route);
            self.retry = false;
        }

        self.program.lock().mark_in_progress();
        processor.start_io(&route, self.program.clone());
        ctx.counters.child_operation();
        self.route = Some(route);
        self.set_state(TrackerState::ChildIoInProgress);
        true
    }

    /// `ChildIoInProgress`: wait for the processor to finish
    pub fn await_completion(&mut self) {
        if !self.program.is_in_progress() {
            self.set_state(TrackerState::ChildIoDone);
        }
    }

    pub fn silent_retry(&mut self, ctx: &TrackerContext<'_>) {
        ctx.counters.silent_retry();
        self.retry = true;
        self.set_state(TrackerState::ChildIoReady);
    }

    fn device_name(&self) -> &str {
        self.route.as_ref().map_or("?", |r| r.device_name.as_str())
    }

    /// Put a fault to the operator and enter `ConsolePending`
    pub fn escalate(&mut self, ctx: &TrackerContext<'_>, class: ErrorClass) {
        self.pending_status = class.pending_status;
        let route = self
            .route
            .as_ref()
            .map_or_else(|| "-".to_string(), ChannelRoute::to_string);
        let text = format!(
            "{} {} {} {} {} ANS {}",
            self.device_name(),
            route,
            class.mnemonic,
            self.function_mnemonic(),
            self.request.activity.run_id(),
            class.responses.hint()
        );
        warn!("[IO] operator escalation: {}", text);
        ctx.counters.escalation();
        self.exchange = Some(ConsoleExchange::post(ctx.console, text, class.responses));
        self.set_state(TrackerState::ConsolePending);
    }

    /// `ConsolePending`: inspect the exchange and act on what can be
    /// handled without knowing the variant
    pub fn console_step(&mut self, ctx: &TrackerContext<'_>) -> ConsoleStep {
        if self.owner_terminated() {
            return ConsoleStep::Cancelled;
        }
        let Some(exchange) = self.exchange.as_mut() else {
            // Nothing outstanding; treat like a withdrawn prompt
            return ConsoleStep::Cancelled;
        };
        match exchange.state() {
            ExchangeState::Waiting => ConsoleStep::Idle,
            ExchangeState::Cancelled => ConsoleStep::Cancelled,
            ExchangeState::NotUnderstood => {
                exchange.repost_not_understood(ctx.console);
                ConsoleStep::Idle
            }
            ExchangeState::Answered(OperatorResponse::Retry) => {
                self.exchange = None;
                self.retry = true;
                self.set_state(TrackerState::ChildIoReady);
                ConsoleStep::Retry
            }
            ExchangeState::Answered(OperatorResponse::Mark) => ConsoleStep::Mark,
            ExchangeState::Answered(OperatorResponse::Abort) => ConsoleStep::Abort,
            ExchangeState::Answered(OperatorResponse::Diagnose) => ConsoleStep::Diagnose,
        }
    }

    /// Emit the diagnostic block and ask the original question again
    pub fn diagnose(&mut self, ctx: &TrackerContext<'_>, extra: String) {
        let route = self
            .route
            .as_ref()
            .map_or_else(|| "-".to_string(), ChannelRoute::to_string);
        let lines = {
            let program = self.program.lock();
            let sense = if program.sense_bytes.is_empty() {
                "NONE".to_string()
            } else {
                program
                    .sense_bytes
                    .iter()
                    .map(|b| format!("{:02X}", b))
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            [
                format!("{} {} DIAGNOSTIC", self.device_name(), route),
                format!(
                    "RUN {} {} FILE {} FUNCTION {}",
                    self.request.activity.run_id(),
                    self.request.activity.name(),
                    self.request.facility,
                    self.function_mnemonic()
                ),
                format!(
                    "CHANNEL {:?} DEVICE {:?} COMMAND {:?}",
                    program.channel_status, program.device_status, program.command
                ),
                format!("SENSE {}", sense),
                extra,
            ]
        };
        for line in &lines {
            ctx.console.post_status(line);
        }
        if let Some(exchange) = self.exchange.as_mut() {
            exchange.repost(ctx.console);
        }
    }
}

/// Per-request state machine
pub(crate) enum RequestTracker {
    MassStorage(MassStorageTracker),
    Tape(TapeTracker),
}

impl RequestTracker {
    /// Build the tracker matching the request's facility kind
    pub fn for_request(request: Arc<IoRequest>) -> Result<Self, SystemFault> {
        match request.facility.variant().clone() {
            FacilityVariant::MassStorage(item) => {
                Ok(Self::MassStorage(MassStorageTracker::new(request, item.file)))
            }
            FacilityVariant::Tape(tape) => Ok(Self::Tape(TapeTracker::new(request, tape))),
            FacilityVariant::Unclassified => Err(SystemFault::UnclassifiedFacility {
                facility: request.facility.to_string(),
            }),
        }
    }

    fn common(&self) -> &TrackerCommon {
        match self {
            Self::MassStorage(t) => &t.common,
            Self::Tape(t) => &t.common,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.common().state
    }

    pub fn request(&self) -> &Arc<IoRequest> {
        &self.common().request
    }

    /// Advance by one state; returns whether the state changed
    pub fn step(&mut self, ctx: &mut TrackerContext<'_>) -> Result<bool, SystemFault> {
        let before = self.state();
        match self {
            Self::MassStorage(t) => t.step(ctx)?,
            Self::Tape(t) => t.step(ctx)?,
        }
        Ok(self.state() != before)
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let common = self.common();
        let (kind, words_remaining, buffer_attached) = match self {
            Self::MassStorage(t) => (
                FacilityKind::MassStorage,
                t.remaining_words(),
                t.has_child_buffer(),
            ),
            Self::Tape(t) => (FacilityKind::Tape, t.remaining_words(), false),
        };
        TrackerSnapshot {
            kind,
            state: common.state,
            function: common.function,
            facility: common.request.facility.to_string(),
            run_id: common.request.activity.run_id().to_string(),
            words_remaining,
            buffer_attached,
            prompt: common.exchange.as_ref().map(|e| e.text().to_string()),
            retry: common.retry,
        }
    }
}

/// Point-in-time view of one pending tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub kind: FacilityKind,
    pub state: TrackerState,
    pub function: Option<IoFunction>,
    pub facility: String,
    pub run_id: String,
    pub words_remaining: usize,
    pub buffer_attached: bool,
    /// Text of the outstanding operator prompt, if any
    pub prompt: Option<String>,
    pub retry: bool,
}

impl fmt::Display for TrackerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} {} {:?} remaining={}",
            self.kind,
            self.run_id,
            self.facility,
            self.state,
            self.words_remaining
        )
    }
}

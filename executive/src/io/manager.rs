//! I/O Manager
//!
//! Owns the pending-tracker list and the child buffer pool and advances
//! every tracker on each poll pass.
//!
//! # Locking
//!
//! The tracker list, the pool and the lifecycle state sit behind one spin
//! lock. `submit` holds it long enough to append a tracker; `poll` holds
//! it for a whole pass. Channel programs and console prompts are never
//! waited on under the lock: a pass only inspects their status fields.
//!
//! # Pass
//!
//! 1. Trackers that completed on an earlier pass are removed and their
//!    callers woken.
//! 2. Every remaining tracker advances by at most one state.
//!
//! A pass reports whether any tracker changed state; the worker sleeps
//! after a pass that changed nothing.
//!
//! # Lifecycle
//!
//! ```text
//!  Stopped ──startup──> Running ──shutdown──> ShuttingDown
//!     ^                                            │
//!     └──────────── cleanup (no pending) ──────────┘
//! ```

use core::sync::atomic::{AtomicU64, Ordering};
use log::{error, info, trace};
use spin::Mutex;
use std::sync::Arc;
use thiserror::Error;

use super::channel::DevicePathResolver;
use super::config::IoConfig;
use super::pool::{ChildBufferPool, ChildBufferStats};
use super::request::{IoRequest, IoStatus};
use super::space::SpaceAuthority;
use super::tracker::{RequestTracker, TrackerContext, TrackerSnapshot, TrackerState};
use crate::ex::{ConsoleCollaborator, SystemFault};

/// Running counters, updated without the manager lock
#[derive(Debug, Default)]
pub(crate) struct IoCounters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    child_operations: AtomicU64,
    silent_retries: AtomicU64,
    escalations: AtomicU64,
    buffer_waits: AtomicU64,
}

impl IoCounters {
    pub fn child_operation(&self) {
        self.child_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn silent_retry(&self) {
        self.silent_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn buffer_wait(&self) {
        self.buffer_waits.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> IoStats {
        IoStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            child_operations: self.child_operations.load(Ordering::Relaxed),
            silent_retries: self.silent_retries.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            buffer_waits: self.buffer_waits.load(Ordering::Relaxed),
        }
    }
}

/// I/O manager statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    /// Requests accepted into the pending list
    pub submitted: u64,
    /// Requests failed at submission
    pub rejected: u64,
    /// Requests reaped and their callers woken
    pub completed: u64,
    /// Channel programs handed to an I/O processor
    pub child_operations: u64,
    /// Operations repeated without asking the operator
    pub silent_retries: u64,
    /// Faults put to the operator
    pub escalations: u64,
    /// Passes on which a tracker found the buffer pool empty
    pub buffer_waits: u64,
}

/// Services the manager calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub space: Arc<dyn SpaceAuthority>,
    pub paths: Arc<dyn DevicePathResolver>,
    pub console: Arc<dyn ConsoleCollaborator>,
}

/// Subsystem lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Lifecycle {
    #[default]
    Stopped = 0,
    Running = 1,
    ShuttingDown = 2,
}

/// Lifecycle transition refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("I/O manager already started")]
    AlreadyStarted,
    #[error("I/O manager is not running")]
    NotRunning,
    #[error("I/O manager is still accepting requests")]
    StillRunning,
    #[error("{0} requests still pending")]
    RequestsPending(usize),
}

struct ManagerInner {
    lifecycle: Lifecycle,
    trackers: Vec<RequestTracker>,
    pool: ChildBufferPool,
}

pub struct IoManager {
    config: IoConfig,
    collaborators: Collaborators,
    inner: Mutex<ManagerInner>,
    counters: IoCounters,
}

impl IoManager {
    pub fn new(config: IoConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            inner: Mutex::new(ManagerInner {
                lifecycle: Lifecycle::Stopped,
                trackers: Vec::new(),
                pool: ChildBufferPool::default(),
            }),
            counters: IoCounters::default(),
        }
    }

    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lock().lifecycle
    }

    /// Allocate the buffer pool and start accepting requests
    pub fn startup(&self) -> Result<(), LifecycleError> {
        let mut inner = self.inner.lock();
        if inner.lifecycle != Lifecycle::Stopped {
            return Err(LifecycleError::AlreadyStarted);
        }
        inner.pool = ChildBufferPool::new(self.config.child_buffer_count, self.config.words_per_track);
        inner.lifecycle = Lifecycle::Running;
        info!(
            "[IO] startup: {} child buffers of {} words",
            self.config.child_buffer_count, self.config.words_per_track
        );
        Ok(())
    }

    /// Stop accepting requests; requests already pending run to completion
    pub fn shutdown(&self) -> Result<(), LifecycleError> {
        let mut inner = self.inner.lock();
        if inner.lifecycle != Lifecycle::Running {
            return Err(LifecycleError::NotRunning);
        }
        inner.lifecycle = Lifecycle::ShuttingDown;
        info!("[IO] shutdown: {} requests pending", inner.trackers.len());
        Ok(())
    }

    /// Free the buffer pool once nothing is pending
    pub fn cleanup(&self) -> Result<(), LifecycleError> {
        let mut inner = self.inner.lock();
        if inner.lifecycle == Lifecycle::Running {
            return Err(LifecycleError::StillRunning);
        }
        if !inner.trackers.is_empty() {
            return Err(LifecycleError::RequestsPending(inner.trackers.len()));
        }
        inner.pool = ChildBufferPool::default();
        inner.lifecycle = Lifecycle::Stopped;
        info!("[IO] cleanup: buffer pool released");
        Ok(())
    }

    /// Queue a request
    ///
    /// Outside `Running` the request is failed with `InternalError` and
    /// its caller woken at once. A facility that is neither disk nor tape
    /// is a system fault; the request is failed the same way first.
    pub fn submit(&self, request: Arc<IoRequest>) -> Result<(), SystemFault> {
        let mut inner = self.inner.lock();
        if inner.lifecycle != Lifecycle::Running {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            trace!("[IO] {} rejected: manager {:?}", request.facility, inner.lifecycle);
            request.set_result(IoStatus::InternalError, 0, 0);
            request.signal_complete();
            return Ok(());
        }

        let tracker = match RequestTracker::for_request(Arc::clone(&request)) {
            Ok(tracker) => tracker,
            Err(fault) => {
                error!("[IO] STOP {:#06x}: {}", fault.stop_code(), fault);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                request.set_result(IoStatus::InternalError, 0, 0);
                request.signal_complete();
                return Err(fault);
            }
        };
        inner.trackers.push(tracker);
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Run one pass; returns whether any tracker changed state
    pub fn poll(&self) -> Result<bool, SystemFault> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let before = inner.trackers.len();
        inner.trackers.retain(|tracker| {
            if tracker.state() == TrackerState::Completed {
                tracker.request().signal_complete();
                false
            } else {
                true
            }
        });
        let reaped = before - inner.trackers.len();
        self.counters.completed.fetch_add(reaped as u64, Ordering::Relaxed);

        let mut ctx = TrackerContext {
            pool: &mut inner.pool,
            space: self.collaborators.space.as_ref(),
            paths: self.collaborators.paths.as_ref(),
            console: self.collaborators.console.as_ref(),
            config: &self.config,
            counters: &self.counters,
        };

        let mut changed = false;
        for tracker in inner.trackers.iter_mut() {
            match tracker.step(&mut ctx) {
                Ok(stepped) => changed |= stepped,
                Err(fault) => {
                    error!("[IO] STOP {:#06x}: {}", fault.stop_code(), fault);
                    return Err(fault);
                }
            }
        }
        debug_assert!(inner.pool.is_consistent());

        if before > 0 {
            trace!(
                "[IO] pass: {} pending, {} reaped, changed={}",
                inner.trackers.len(),
                reaped,
                changed
            );
        }
        Ok(changed)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().trackers.len()
    }

    pub fn stats(&self) -> IoStats {
        self.counters.snapshot()
    }

    pub fn pool_stats(&self) -> ChildBufferStats {
        self.inner.lock().pool.stats()
    }

    /// One snapshot per pending tracker, in list order
    pub fn snapshots(&self) -> Vec<TrackerSnapshot> {
        self.inner
            .lock()
            .trackers
            .iter()
            .map(RequestTracker::snapshot)
            .collect()
    }
}

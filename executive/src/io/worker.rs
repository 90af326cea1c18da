//! I/O Worker Thread
//!
//! One dedicated thread drives [`IoManager::poll`]. After a pass that
//! changed no tracker it sleeps for the configured idle wait; otherwise it
//! polls again at once.
//!
//! A system fault ends the loop. The fault is logged and held until the
//! host calls [`IoWorker::stop`].

use core::sync::atomic::{AtomicBool, Ordering};
use log::{error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::manager::IoManager;
use crate::ex::SystemFault;

pub struct IoWorker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Option<SystemFault>>>,
}

impl IoWorker {
    /// Spawn the poll thread for `manager`
    pub fn start(manager: Arc<IoManager>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let idle_wait = manager.config().idle_wait;

        let thread = thread::Builder::new()
            .name("io-worker".into())
            .spawn(move || {
                info!("[IO] worker started");
                while !flag.load(Ordering::Acquire) {
                    match manager.poll() {
                        Ok(true) => {}
                        Ok(false) => thread::sleep(idle_wait),
                        Err(fault) => {
                            error!("[IO] worker halted by STOP {:#06x}", fault.stop_code());
                            return Some(fault);
                        }
                    }
                }
                info!("[IO] worker stopped");
                None
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// True while the poll loop has not exited
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop polling and join the thread; returns the fault that ended the
    /// loop, if any
    pub fn stop(mut self) -> Option<SystemFault> {
        self.halt()
    }

    fn halt(&mut self) -> Option<SystemFault> {
        self.stop.store(true, Ordering::Release);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(fault) => fault,
            Err(_) => {
                error!("[IO] worker thread panicked");
                None
            }
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        self.halt();
    }
}

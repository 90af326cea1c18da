//! Activities
//!
//! An activity is a thread of control inside a run. The I/O manager only
//! needs the run identity (for operator messages) and whether the activity
//! has been terminated, which trackers check cooperatively.

use core::sync::atomic::{AtomicBool, Ordering};

/// Owning activity of an I/O request
#[derive(Debug)]
pub struct Activity {
    run_id: String,
    name: String,
    terminated: AtomicBool,
}

impl Activity {
    pub fn new(run_id: &str, name: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            name: name.to_string(),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request termination; outstanding I/O notices on its next step
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

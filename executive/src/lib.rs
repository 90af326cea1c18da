//! Executive I/O Engine
//!
//! Schedules and completes file I/O requests for running programs on a
//! word-addressed mainframe executive.
//!
//! # Architecture Overview
//!
//! - **ex** - Executive support: activities, operator console, STOP codes
//! - **io** - I/O manager: requests, trackers, channel programs, buffer pool
//!
//! # Flow
//!
//! 1. An activity builds an [`io::IoRequest`] and calls [`io::IoManager::submit`]
//! 2. The manager wraps it in a mass storage or tape tracker
//! 3. The [`io::IoWorker`] polls; each pass advances every tracker one state
//! 4. Trackers issue channel programs and, on hardware faults, operator prompts
//! 5. The finished request is reaped on the next pass and its caller woken
//!
//! The library installs no logger; hosts choose a `log` backend.

pub mod ex;
pub mod io;

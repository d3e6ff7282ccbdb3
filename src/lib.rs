//! Records how long browser tabs are actually looked at. The browser extension reports tab,
//! window and idle events to a native host, which turns them into viewing sessions and uploads
//! the finished ones to a spreadsheet while keeping a local copy that can be queried from a
//! terminal.
//!

pub mod cli;
pub mod daemon;
pub mod tracker;
pub mod utils;

//! Receives messages from the browser extension and forwards them to the tracking module.

pub mod collector;
pub mod message;
pub mod source;

//! clicksync - networked click playback library
//!
//! provides library elements to create a click server, which runs a look-ahead
//! metronome and answers clock sync probes, and calibration clients, which
//! estimate their offset to the server clock and play each click at the
//! compensated local instant.
extern crate json;

pub mod client;
pub mod common;
pub mod server;

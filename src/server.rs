//! things used to make the click server
pub mod calibration_store;
pub mod click_server;
pub mod connection;
pub mod metronome;
pub mod params;

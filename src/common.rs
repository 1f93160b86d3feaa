//! These modules are shared among the server, client and control executables.
pub mod box_error;
pub mod bus_message;
pub mod bus_socket;
pub mod clock;
pub mod clock_sync;
pub mod config;
pub mod event_bus;
pub mod micro_timer;

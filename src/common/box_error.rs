//! error type shared by the server, client and control components.
//!
//! Boxed so errors from the websocket, json and file layers can all travel
//! through `?` and be handed across the connection threads.
pub type BoxError = std::boxed::Box<
    dyn std::error::Error // must implement Error to satisfy ?
        + std::marker::Send // needed for threads
        + std::marker::Sync, // needed for threads
>;

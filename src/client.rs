//! things used to make the calibration client
pub mod audio_output;
pub mod calibration_client;
pub mod click_client;
pub mod click_renderer;
pub mod click_track;
pub mod control;

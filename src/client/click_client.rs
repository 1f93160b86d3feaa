//! entry point called by main to run a calibration client
//!
//! One thread does everything: it probes the server clock on a [`MicroTimer`],
//! reads the socket with a short timeout and fires the clicks that came due.
use std::time::Duration;

use log::info;

use crate::{
    client::{
        audio_output::{AudioOutput, LogOutput, WavOutput},
        calibration_client::CalibrationClient,
        click_track::SAMPLE_RATE,
    },
    common::{
        box_error::BoxError,
        bus_message::CompensationProfile,
        bus_socket::BusSocket,
        clock::{micros_to_secs, secs_to_micros, Clock, MonotonicClock},
        clock_sync::ClockSync,
        config::Config,
        micro_timer::MicroTimer,
    },
};

/// how long a socket read may block the loop
const READ_TIMEOUT: Duration = Duration::from_millis(1);
const STATUS_INTERVAL: u128 = 10_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub url: String,
    /// "internal" or "external"
    pub output: String,
    pub user_agent: String,
    /// profile found in the local settings file, if any
    pub profile: Option<CompensationProfile>,
    pub audio_active: bool,
    /// send the profile to the server once connected
    pub store: bool,
    /// render into this wav file instead of logging clicks
    pub wav_file: Option<String>,
    /// seconds, None runs until the connection drops
    pub run_for: Option<f64>,
}

impl ClientSettings {
    pub fn default_params() -> json::JsonValue {
        json::object! {
            "url": "ws://localhost:3000",
            "output": "internal",
            "user_agent": default_user_agent()
        }
    }

    pub fn from_config(config: &Config) -> Result<ClientSettings, BoxError> {
        let output = config.get_str_value("output", None)?;
        Ok(ClientSettings {
            url: config.get_str_value("url", None)?,
            profile: profile_from_config(config, &output),
            output,
            user_agent: config.get_str_value("user_agent", None)?,
            audio_active: false,
            store: false,
            wav_file: None,
            run_for: None,
        })
    }
}

pub fn default_user_agent() -> String {
    format!(
        "clicksync/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// `<output>.delay` and `<output>.gain`, when the settings file has either
pub fn profile_from_config(config: &Config, output: &str) -> Option<CompensationProfile> {
    let delay_key = format!("{}.delay", output);
    let gain_key = format!("{}.gain", output);
    if !config.has_setting(&delay_key) && !config.has_setting(&gain_key) {
        return None;
    }
    Some(CompensationProfile {
        delay: config.get_f64_value(&delay_key, Some(0.0)).unwrap_or(0.0),
        gain: config.get_f64_value(&gain_key, Some(0.0)).unwrap_or(0.0),
    })
}

/// write the profile of `output` back into the local settings file
pub fn save_profile(config: &mut Config, output: &str, profile: &CompensationProfile) -> Result<(), BoxError> {
    config.set_value(&format!("{}.delay", output), profile.delay)?;
    config.set_value(&format!("{}.gain", output), profile.gain)?;
    config.save_settings()?;
    info!("saved {} calibration to {}", output, config.get_filename());
    Ok(())
}

/// To start a client, call this function with its settings.
///
/// Returns when `run_for` has elapsed or the server goes away.
pub fn run(settings: &ClientSettings) -> Result<(), BoxError> {
    info!("click client settings: {:?}", settings);
    match &settings.wav_file {
        Some(path) => run_with(settings, WavOutput::create(path, SAMPLE_RATE)?),
        None => run_with(settings, LogOutput::new()),
    }
}

fn run_with<O: AudioOutput>(settings: &ClientSettings, output: O) -> Result<(), BoxError> {
    let mut sock = BusSocket::connect(&settings.url, READ_TIMEOUT)?;
    info!("connected to {}", settings.url);

    let clock = MonotonicClock::new();
    let sync = ClockSync::new();
    // first probe goes out right away
    let mut probe_timer = MicroTimer::build(0, 0);
    let mut status_timer = MicroTimer::build(clock.now_micros(), STATUS_INTERVAL);
    let mut client = CalibrationClient::new(&settings.user_agent, &settings.output, sync, output);

    match settings.profile {
        Some(profile) => {
            info!("using local {} calibration: {:?}", settings.output, profile);
            client.set_profile(&settings.output, profile);
        }
        None => sock.send(&client.params_request())?,
    }
    if settings.store {
        sock.send(&client.params_store())?;
    }
    client.set_audio_active(settings.audio_active, clock.now_secs());

    let end = settings.run_for.map(secs_to_micros);
    let result = loop {
        let now = clock.now_micros();
        if end.map_or(false, |e| now >= e) {
            break Ok(());
        }
        if !sock.is_connected() {
            info!("server closed the connection");
            break Ok(());
        }
        if probe_timer.expired(now) {
            // T1 as close to the write as possible
            let request = client.sync_request(clock.now_secs());
            if let Err(e) = sock.send(&request) {
                break Err(e);
            }
            probe_timer.reset(now);
            probe_timer.set_interval(secs_to_micros(client.get_sync().probe_interval()));
        }
        match sock.get_message() {
            Ok(Some(msg)) => client.handle_message(msg, clock.now_secs()),
            Ok(None) => {}
            Err(e) => break Err(e),
        }
        client.fire_due(clock.now_secs());
        if status_timer.expired(now) {
            status_timer.reset(now);
            info!("{}", client);
        }
    };

    client.finish();
    info!("client stopped after {:.3} s: {}", micros_to_secs(clock.now_micros()), client);
    sock.close();
    result
}

#[cfg(test)]
mod test_click_client {
    use super::*;

    fn temp_config(name: &str) -> String {
        format!("clicksync_client_{}_{}.json", name, std::process::id())
    }

    #[test]
    fn defaults_have_no_profile() {
        let config = Config::build(temp_config("defaults"), ClientSettings::default_params()).unwrap();
        let settings = ClientSettings::from_config(&config).unwrap();
        assert_eq!(settings.url, "ws://localhost:3000");
        assert_eq!(settings.output, "internal");
        assert!(settings.user_agent.starts_with("clicksync/"));
        assert_eq!(settings.profile, None);
        assert!(!settings.audio_active);
    }

    #[test]
    fn saved_profile_is_restored() {
        let name = temp_config("profile");
        let mut config = Config::build(name.clone(), ClientSettings::default_params()).unwrap();
        let profile = CompensationProfile {
            delay: 0.012,
            gain: -2.5,
        };
        save_profile(&mut config, "external", &profile).unwrap();

        let reloaded = Config::build(name.clone(), ClientSettings::default_params()).unwrap();
        assert_eq!(profile_from_config(&reloaded, "external"), Some(profile));
        assert_eq!(profile_from_config(&reloaded, "internal"), None);
        let _ = std::fs::remove_file(&name);
    }
}

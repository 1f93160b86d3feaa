use clap::Parser;
use clicksync::{
    client::click_client::{self, save_profile, ClientSettings},
    common::{box_error::BoxError, bus_message::CompensationProfile, config::Config},
};
use log::info;

/// Sync to a click server and play its clicks on time
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// settings file, json
    #[arg(short, long, default_value = "click_client.json")]
    config: String,

    /// server url, ws://host:port
    #[arg(short, long)]
    url: Option<String>,

    /// output channel the calibration applies to (internal or external)
    #[arg(short, long)]
    output: Option<String>,

    /// measured device latency in seconds
    #[arg(long, allow_hyphen_values = true)]
    delay: Option<f64>,

    /// measured device gain in dB
    #[arg(long, allow_hyphen_values = true)]
    gain: Option<f64>,

    /// keep the calibration locally and on the server
    #[arg(long)]
    store: bool,

    /// play clicks (only sync otherwise)
    #[arg(long)]
    audio_active: bool,

    /// render clicks into this wav file
    #[arg(long)]
    wav: Option<String>,

    /// stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,
}

fn main() -> Result<(), BoxError> {
    env_logger::init();
    let args = Args::parse();
    let mut config = Config::build(args.config.clone(), ClientSettings::default_params())?;
    let mut settings = ClientSettings::from_config(&config)?;

    if let Some(url) = args.url {
        settings.url = url;
    }
    if let Some(output) = args.output {
        settings.output = output;
        settings.profile = click_client::profile_from_config(&config, &settings.output);
    }
    if args.delay.is_some() || args.gain.is_some() {
        let current = settings.profile.unwrap_or_default();
        settings.profile = Some(CompensationProfile {
            delay: args.delay.unwrap_or(current.delay),
            gain: args.gain.unwrap_or(current.gain),
        });
    }
    if args.store {
        match &settings.profile {
            Some(profile) => {
                save_profile(&mut config, &settings.output, profile)?;
                settings.store = true;
            }
            None => info!("nothing to store, give --delay and/or --gain"),
        }
    }
    settings.audio_active = args.audio_active;
    settings.wav_file = args.wav;
    settings.run_for = args.seconds;

    click_client::run(&settings)?;
    Ok(())
}

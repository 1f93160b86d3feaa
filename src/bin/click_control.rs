use std::time::Duration;

use clap::Parser;
use clicksync::{
    client::control::{send_update, ParamsUpdate},
    common::box_error::BoxError,
};

/// Change the click server's metronome and print its state
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// server url, ws://host:port
    #[arg(short, long, default_value = "ws://localhost:3000")]
    url: String,

    /// start or stop the metronome
    #[arg(long)]
    active: Option<bool>,

    /// look-ahead delay, ms
    #[arg(long)]
    delay: Option<f64>,

    /// click gain, dB
    #[arg(long, allow_hyphen_values = true)]
    gain: Option<f64>,

    /// ms between clicks
    #[arg(long)]
    period: Option<f64>,

    /// clicks to play, -1 for no end
    #[arg(long, allow_hyphen_values = true)]
    number: Option<i64>,

    /// click duration, ms
    #[arg(long)]
    duration: Option<f64>,

    /// seconds to wait for the server
    #[arg(long, default_value_t = 5.0)]
    timeout: f64,
}

fn main() -> Result<(), BoxError> {
    env_logger::init();
    let args = Args::parse();
    let update = ParamsUpdate {
        active: args.active,
        delay: args.delay,
        gain: args.gain,
        period: args.period,
        number: args.number,
        duration: args.duration,
    };
    let state = send_update(&args.url, &update, Duration::from_secs_f64(args.timeout.max(0.0)))?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

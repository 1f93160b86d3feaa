use clap::Parser;
use clicksync::{common::box_error::BoxError, server::click_server};

/// Run the metronome and answer clock sync probes
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// settings file, json
    #[arg(short, long, default_value = "click_server.json")]
    config: String,

    /// listen on this port instead of the configured one
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> Result<(), BoxError> {
    env_logger::init();
    let args = Args::parse();
    click_server::run(&args.config, args.port)?;
    Ok(())
}

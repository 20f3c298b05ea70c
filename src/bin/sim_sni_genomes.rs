use std::process::ExitCode;

use clap::Parser;

use sni_peaks::{run_batch, DriverParams, HudsonEngine, RunSettings};

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let params = DriverParams::parse();
    // Table draws use OS entropy; each segment's coalescent
    // is seeded from its own index.
    let mut rng = rand::rngs::OsRng;
    match run_batch(&params, &RunSettings::default(), &HudsonEngine, &mut rng) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

//! emu-driver - drives a Ledger device emulator for end-to-end tests
//!
//! Starts the emulator, writes the control port to the given file, then
//! answers every operation shown on the device until interrupted or until
//! stdin closes.

use std::path::PathBuf;

use clap::Parser;
use emu_driver::common::{config::Config, logging};
use emu_driver::driver::{shutdown, Session};

#[derive(Parser)]
#[command(name = "emu-driver", about = "Drive a Ledger device emulator for end-to-end tests")]
#[command(version, long_about = None)]
struct Cli {
    /// File the control server's port is written to
    port_file: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let log_guard = logging::init(config.logging.file.as_deref());

    let mut session = Session::new(config, cli.port_file);

    let outcome = tokio::select! {
        result = session.run() => match result {
            Err(e) => Err(e),
            Ok(never) => match never {},
        },
        trigger = shutdown::wait_for_trigger() => trigger,
    };

    session.close().await;

    match outcome {
        Ok(trigger) => {
            tracing::debug!("Shut down on {}", trigger);
            drop(log_guard);
            std::process::exit(0);
        }
        Err(e) => {
            let stage = if e.is_startup() { "startup" } else { "driver loop" };
            tracing::debug!(stage, "Shut down on error");
            eprintln!("Error: {e}");
            drop(log_guard);
            std::process::exit(1);
        }
    }
}

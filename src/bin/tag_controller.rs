//! tag_controller daemon
//!
//! ```text
//! tag_controller [--config controller.toml] [--url udp:0.0.0.0:14540] [--simulate] [--log-level debug]
//! ```
//!
//! Runs until SIGINT/SIGTERM, then stops every pipeline process before
//! exiting. Startup failures exit non-zero.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tag_controller::core::logging;
use tag_controller::{Controller, ControllerConfig};

#[derive(Parser, Debug)]
#[command(name = "tag_controller", version, about = "Drone radio-tag detection controller")]
struct Args {
    /// TOML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MAVLink link, overriding `[link] url`
    /// (`udp:<bind>`, `udpout:<remote>`, `serial:<path>:<baud>`)
    #[arg(short, long)]
    url: Option<String>,

    /// Send simulated pulses instead of waiting for detectors
    #[arg(long)]
    simulate: bool,

    /// Log filter, e.g. `debug` or `tag_controller=trace`
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match ControllerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("tag_controller: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ControllerConfig::default(),
    };
    if let Some(url) = args.url {
        config.link.url = url;
    }
    if args.simulate {
        config.simulator.enabled = true;
    }

    logging::init(args.log_level.as_deref().or(config.log_level.as_deref()));
    if let Some(path) = &args.config {
        tag_controller::log_info!("Config: {}", path.display());
    }

    let controller = match Controller::start(&config) {
        Ok(controller) => controller,
        Err(e) => {
            tag_controller::log_error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    }) {
        tag_controller::log_error!("Failed to install signal handler: {}", e);
        controller.shutdown();
        return ExitCode::FAILURE;
    }

    let _ = shutdown_rx.recv();
    tag_controller::log_info!("Received shutdown signal");
    controller.shutdown();
    ExitCode::SUCCESS
}

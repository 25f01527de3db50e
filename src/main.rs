//! rat-link - run either end of the RAT control link
//!
//! - `rat-link device`: serve a simulated RAT on the configured bind address
//! - `rat-link operator`: read actions from stdin and drive the RAT
//!
//! Operator input, one per line:
//!
//! | Input | Effect |
//! |-------|--------|
//! | `forward`, `backward`, `faster`, `slower` | Drive and speed flags |
//! | `yaw-right`, `yaw-left`, `pitch-up`, `pitch-down` | Camera flags |
//! | `scan` | Replace the command with the scan sequence |
//! | `send` | Send the current command and print telemetry |
//! | `reconnect` | Start a new connect window after a timeout |
//! | `quit` | Exit |

use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use rat_link::config::Config;
use rat_link::core::types::Action;
use rat_link::devices::SimulatedRat;
use rat_link::error::{Error, Result};
use rat_link::{DeviceEndpoint, LogPresentation, OperatorEndpoint, PolicyState};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG: &str = "rat-link.toml";

/// Control and telemetry link for the RAT
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve a simulated RAT
    Device {
        /// Listen address (overrides network.bind_address)
        #[arg(short, long)]
        bind: Option<String>,

        /// Length of the simulated tube in millimetres
        #[arg(long, default_value = "10000")]
        tube_length_mm: u32,
    },
    /// Drive a RAT from stdin
    Operator {
        /// Device address (overrides network.address)
        #[arg(short, long)]
        address: Option<String>,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(DEFAULT_CONFIG),
        None => Ok(Config::default()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("rat-link v{} starting...", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => log::info!("Using config: {}", path.display()),
        None => log::info!("Using config: {} (or defaults)", DEFAULT_CONFIG),
    }

    match args.mode {
        Mode::Device {
            bind,
            tube_length_mm,
        } => run_device(&config, bind, tube_length_mm),
        Mode::Operator { address } => run_operator(&config, address),
    }
}

fn run_device(config: &Config, bind: Option<String>, tube_length_mm: u32) -> Result<()> {
    let bind_address = bind.unwrap_or_else(|| config.network.bind_address.clone());

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    // One simulated RAT acts as both actuator sink and sensor source
    let rat = Arc::new(Mutex::new(SimulatedRat::new(tube_length_mm)));
    let mut endpoint = DeviceEndpoint::bind(&bind_address, Arc::clone(&rat), Arc::clone(&rat))?
        .with_poll_interval(config.link.poll_interval());

    endpoint.run(&running)?;

    let rat = rat.lock();
    log::info!(
        "Simulated RAT: {} commands, {} scans, stopped at {} mm",
        rat.commands(),
        rat.scans(),
        rat.position_mm()
    );
    Ok(())
}

fn run_operator(config: &Config, address: Option<String>) -> Result<()> {
    let address = address.unwrap_or_else(|| config.network.address.clone());
    log::info!(
        "Operator for {} (connect window {} ms)",
        address,
        config.link.connect_timeout_ms
    );

    let mut operator =
        OperatorEndpoint::new(address, config.link.connect_options(), LogPresentation);

    for line in io::stdin().lock().lines() {
        let line = line?;
        let input = line.trim();
        match input {
            "" => continue,
            "quit" | "exit" => break,
            "send" => {
                if let Err(e) = operator.send_and_await_telemetry() {
                    log::error!("Send failed: {}", e);
                    if operator.state() == PolicyState::TimedOut {
                        log::warn!("Device unreachable; type `reconnect` to try again");
                    }
                }
            }
            "reconnect" => {
                operator.restart();
                if let Err(e) = operator.connect() {
                    log::error!("Reconnect failed: {}", e);
                }
            }
            other => match other.parse::<Action>() {
                Ok(action) => {
                    operator.update_command(action);
                }
                Err(e) => log::warn!("{}", e),
            },
        }
        log::debug!("Link state: {:?}", operator.state());
    }

    log::info!(
        "Operator exiting ({} reconnects)",
        operator.policy().reconnects()
    );
    Ok(())
}

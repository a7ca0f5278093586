//! LADB - a local shell through the debug bridge
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use ladb_app::config::{default_config_path, init_config};
use ladb_core::prelude::*;
use ladb_core::PairingRequest;
use ladb_shell::{Options, Startup};

/// LADB - a local shell through the debug bridge
#[derive(Parser, Debug)]
#[command(name = "ladb")]
#[command(about = "Supervise a debug bridge connection and attach a shell", long_about = None)]
struct Args {
    /// Bridge binary (default: [bridge] path from config, then adb on PATH)
    #[arg(long, value_name = "PATH")]
    bridge: Option<PathBuf>,

    /// Settings file (default: <config dir>/ladb/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sandbox directory for the transcript, state and shell home
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Debug port to connect with if none is remembered or discovered
    #[arg(long)]
    port: Option<u16>,

    /// Pairing code shown on-device, used if pairing is needed
    #[arg(long, value_name = "CODE")]
    pair_code: Option<String>,

    /// Pairing port shown on-device (default: the discovered one)
    #[arg(long, requires = "pair_code")]
    pair_port: Option<u16>,

    /// Script to run once the shell is ready
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Reset the session, delete the sandbox and exit
    #[arg(long)]
    reset: bool,

    /// Run in headless mode (NDJSON events on stdout)
    #[arg(long)]
    headless: bool,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        let path = args
            .config
            .or_else(default_config_path)
            .ok_or_else(|| Error::config("No config directory available, pass --config"))?;
        if init_config(&path)? {
            eprintln!("Wrote {}", path.display());
        } else {
            eprintln!("{} already exists", path.display());
        }
        return Ok(());
    }

    let options = Options {
        config_path: args.config,
        data_dir: args.data_dir,
        bridge: args.bridge,
        startup: Startup {
            port: args.port,
            pairing: args
                .pair_code
                .map(|code| PairingRequest::new(args.pair_port, code)),
            script: args.script,
        },
        reset: args.reset,
        headless: args.headless,
    };

    ladb_shell::run(options).await
}

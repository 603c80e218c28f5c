mod peripheral;

use clap::Parser;
use core::cell::RefCell;
use md40_core::utils::controllers::{Md40, Md40Command, Md40Config, Md40Error, PollPolicy, Report};
use md40_core::utils::DEFAULT_ADDRESS;
use peripheral::SimulatedMd40;
use serde::Serialize;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::num::ParseIntError;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// I2C address of the simulated board (decimal or 0x-prefixed hex)
    #[clap(long, default_value_t = DEFAULT_ADDRESS, value_parser = parse_address)]
    address: u8,
    /// give up on a busy board after this many polls instead of waiting forever
    #[clap(long)]
    max_polls: Option<u32>,
    /// busy polls the simulated board answers after each command
    #[clap(long, default_value_t = 0)]
    busy_polls: u32,
    /// JSON-lines command script, stdin when omitted
    #[clap(long)]
    script: Option<PathBuf>,
}

fn parse_address(s: &str) -> Result<u8, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// One line of output: the script line a report answers.
#[derive(Serialize)]
struct Outcome {
    line: usize,
    #[serde(flatten)]
    report: Report,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts: Opts = Opts::parse();

    let board = SimulatedMd40::new(opts.address).with_busy_polls(opts.busy_polls);
    let i2c_bus = RefCell::new(board);
    let config = Md40Config {
        address: opts.address,
        poll_policy: PollPolicy {
            max_polls: opts.max_polls,
        },
    };
    let mut md40 = Md40::new(&i2c_bus, config);
    md40.init()?;
    info!(version = %md40.firmware_version()?, name = %md40.name()?, "MD40 ready");

    let input: Box<dyn BufRead> = match &opts.script {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };

    for (n, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command: Md40Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(line = n + 1, "Skipping malformed command: {}", e);
                continue;
            }
        };
        info!("Received MD40 Command: {:?}", command);
        match md40.execute_command(command) {
            Ok(Some(report)) => {
                println!("{}", serde_json::to_string(&Outcome { line: n + 1, report })?);
            }
            Ok(None) => info!("MD40 command executed successfully"),
            Err(e @ Md40Error::InvalidChannel(_)) => error!(line = n + 1, "{}", e),
            // Bus faults leave the board in an unknown state: stop here.
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

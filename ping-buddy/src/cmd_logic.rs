use anyhow::Result;
use clap::{Args, Subcommand};
use echo_prober::ProbeConfig;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::report::OutputFormat;

pub mod from_file;
pub mod one_shot;

pub fn handle(cmd: Commands, config: ProbeConfig, stop_rx: CancellationToken) -> Result<()> {
    let command_result = match cmd {
        Commands::OneShot(params) => one_shot::handle(params, config, stop_rx),
        Commands::FromFile(params) => from_file::handle(params, config, stop_rx),
    };
    debug!("Finished command execution. Result: {:?}", command_result);
    command_result
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe the given addresses and prefixes once and print which of them answered.
    OneShot(one_shot::Params),

    /// Probe every target listed in a file, one address or prefix per line.
    FromFile(from_file::Params),
}

#[derive(Args, Clone)]
pub struct OutputParams {
    /// Print JSON lines instead of tab-separated text
    #[arg(long)]
    json: bool,
}

impl OutputParams {
    fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

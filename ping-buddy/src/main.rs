use anyhow::Result;
use clap::Parser;

use alive_crab::helpers::{bootstrap, logging, stop};
use echo_prober::config::{self, ProbeConfig};

mod cmd_logic;
/// Prints scan results as they come in.
mod report;
/// Turns command-line and file input into probe targets.
mod targets;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[clap(flatten)]
    logging: logging::Params,

    #[clap(flatten)]
    prober: config::Params,

    #[command(subcommand)]
    command: cmd_logic::Commands,
}

fn main() -> Result<()> {
    bootstrap::run(Cli::parse, |cli: &Cli| &cli.logging, do_run)
}

fn do_run(cli: Cli) -> Result<()> {
    let config = ProbeConfig::try_from(&cli.prober)?;

    let sig_handler = stop::new();
    let stop_rx = sig_handler.subscribe_stop();
    tokio::spawn(sig_handler.wait_for_signal());

    cmd_logic::handle(cli.command, config, stop_rx)
}

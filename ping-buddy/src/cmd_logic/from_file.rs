use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use echo_prober::ProbeConfig;
use tokio_util::sync::CancellationToken;

use crate::cmd_logic::OutputParams;
use crate::{report, targets};

#[derive(Args)]
pub struct Params {
    #[clap(flatten)]
    output: OutputParams,

    /// One address or prefix per line, # at start of line to comment it out
    #[arg(value_name = "FILE")]
    path: PathBuf,
}

pub fn handle(params: Params, config: ProbeConfig, stop_rx: CancellationToken) -> Result<()> {
    let addresses = targets::read_from(&params.path)
        .with_context(|| format!("while reading targets from {:?}", params.path))?;
    report::scan_and_print(addresses, config, params.output.format(), stop_rx)
}

use anyhow::Result;
use clap::Args;
use echo_prober::ProbeConfig;
use tokio_util::sync::CancellationToken;

use crate::cmd_logic::OutputParams;
use crate::{report, targets};

#[derive(Args)]
pub struct Params {
    #[clap(flatten)]
    output: OutputParams,

    /// Addresses (192.0.2.1, 2001:db8::1) or prefixes (192.0.2.0/28) to probe
    #[arg(required = true)]
    targets: Vec<String>,
}

pub fn handle(params: Params, config: ProbeConfig, stop_rx: CancellationToken) -> Result<()> {
    let addresses = targets::expand_all(&params.targets)?;
    report::scan_and_print(addresses, config, params.output.format(), stop_rx)
}

use std::io::{self, BufWriter, Write};
use std::net::IpAddr;

use alive_crab::helpers::stop::flatten;
use anyhow::{Context, Result};
use echo_prober::scan::{BatchFailure, BatchReachability};
use echo_prober::{ProbeConfig, ScanStreams, Scanner};
use futures::executor;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::select;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `<address>\t<alive|silent>`
    Text,
    /// `{"address": "...", "reachable": bool}`
    Json,
}

#[derive(Serialize)]
struct ReachabilityLine {
    address: IpAddr,
    reachable: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub alive: usize,
    pub silent: usize,
    pub failed_batches: usize,
    pub unprobed: usize,
    pub interrupted: bool,
}

/// Writes one line per address as batch results arrive.
pub struct Reporter<W: Write> {
    addresses: Vec<IpAddr>,
    format: OutputFormat,
    out: W,
    summary: Summary,
}

pub fn scan_and_print(
    addresses: Vec<IpAddr>,
    config: ProbeConfig,
    format: OutputFormat,
    stop_rx: CancellationToken,
) -> Result<()> {
    if addresses.is_empty() {
        warn!("Nothing to probe");
        return Ok(());
    }
    info!("Probing {} addresses", addresses.len());

    let mut scanner = Scanner::new(config);
    let streams = scanner.scan(addresses.clone());
    let mut reporter = Reporter::new(addresses, format, BufWriter::new(io::stdout()));
    let handle = tokio::spawn(async move { reporter.run(streams, stop_rx).await });
    let summary = executor::block_on(flatten(handle))?;

    info!(
        "Done: {} alive, {} silent, {} failed batches ({} addresses){}",
        summary.alive,
        summary.silent,
        summary.failed_batches,
        summary.unprobed,
        if summary.interrupted { ", interrupted" } else { "" }
    );
    Ok(())
}

impl<W: Write> Reporter<W> {
    pub fn new(addresses: Vec<IpAddr>, format: OutputFormat, out: W) -> Self {
        Self {
            addresses,
            format,
            out,
            summary: Summary::default(),
        }
    }

    pub async fn run(&mut self, mut streams: ScanStreams, stop_rx: CancellationToken) -> Result<Summary> {
        let mut results_open = true;
        let mut failures_open = true;
        while results_open || failures_open {
            select! {
                biased; // Stop should take prio
                _ = stop_rx.cancelled() => {
                    info!("Stopping before the scan is complete");
                    self.summary.interrupted = true;
                    break;
                }
                batch_opt = streams.results.recv(), if results_open => {
                    if let Some(batch) = batch_opt {
                        self.print_batch(batch)?;
                    } else {
                        debug!("Scan closed the result stream");
                        results_open = false;
                    }
                }
                failure_opt = streams.failures.recv(), if failures_open => {
                    if let Some(failure) = failure_opt {
                        self.log_failure(failure);
                    } else {
                        debug!("Scan closed the failure stream");
                        failures_open = false;
                    }
                }
            }
        }
        self.out.flush().context("while flushing scan output")?;
        Ok(self.summary.clone())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print_batch(&mut self, batch: BatchReachability) -> Result<()> {
        let addresses = &self.addresses[batch.offset..batch.offset + batch.reachable.len()];
        for (address, reachable) in addresses.iter().zip(batch.reachable) {
            let line = format_line(self.format, *address, reachable)?;
            writeln!(self.out, "{}", line).context("while writing scan output")?;
            if reachable {
                self.summary.alive += 1;
            } else {
                self.summary.silent += 1;
            }
        }
        self.out.flush().context("while flushing scan output")
    }

    fn log_failure(&mut self, failure: BatchFailure) {
        let first = self.addresses.get(failure.offset);
        error!(
            "Unable to probe {} addresses starting at {:?}: {:#}",
            failure.len,
            first,
            anyhow::Error::from(failure.error)
        );
        self.summary.failed_batches += 1;
        self.summary.unprobed += failure.len;
    }
}

fn format_line(format: OutputFormat, address: IpAddr, reachable: bool) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => {
            let verdict = if reachable { "alive" } else { "silent" };
            format!("{}\t{}", address, verdict)
        }
        OutputFormat::Json => serde_json::to_string(&ReachabilityLine { address, reachable })
            .context("while serialising a result line")?,
    })
}

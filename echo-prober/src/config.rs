use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;

use crate::batch::MAX_BATCH_SIZE;

pub const SMALL_SCAN_THRESHOLD: usize = 100;
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(3);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5);
pub const SEND_ROUNDS: u8 = 3;
pub const HANDOFF_INTERVAL: Duration = Duration::from_secs(1);
pub const READ_DEADLINE: Duration = Duration::from_millis(100);

/// How a scan is cut into batches and how long each batch may take.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Batches are never larger than this (nor than [MAX_BATCH_SIZE]).
    pub max_batch_size: usize,
    /// Scans with at most this many remaining addresses get the [ProbeConfig::short_timeout].
    pub small_scan_threshold: usize,
    pub short_timeout: Duration,
    pub long_timeout: Duration,
    pub timing: ProbeTiming,
}

/// Pacing inside a single probe task.
#[derive(Debug, Clone)]
pub struct ProbeTiming {
    /// Echo requests sent to each address at most.
    pub send_rounds: u8,
    /// How often the receiver hands confirmed addresses over to the sender.
    /// Also spaces the send rounds.
    pub handoff_interval: Duration,
    /// Upper bound for a single socket read, i.e. how quickly the receiver notices it should stop.
    pub read_deadline: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            small_scan_threshold: SMALL_SCAN_THRESHOLD,
            short_timeout: SHORT_TIMEOUT,
            long_timeout: LONG_TIMEOUT,
            timing: ProbeTiming::default(),
        }
    }
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            send_rounds: SEND_ROUNDS,
            handoff_interval: HANDOFF_INTERVAL,
            read_deadline: READ_DEADLINE,
        }
    }
}

#[derive(Args, Clone, Debug)]
#[group(id = "prober")]
pub struct Params {
    /// How many addresses share one raw socket and one ICMP identifier (at most 1024)
    #[arg(long, default_value = "1024", env = "PROBE_MAX_BATCH_SIZE")]
    max_batch_size: usize,

    /// Scans (and scan remainders) up to this size use the short timeout
    #[arg(long, default_value = "100", env = "PROBE_SMALL_SCAN_THRESHOLD")]
    small_scan_threshold: usize,

    /// Deadline for small batches, in milliseconds
    #[arg(long, default_value = "3000", env = "PROBE_SHORT_TIMEOUT_MS")]
    short_timeout_ms: u64,

    /// Deadline for all other batches, in milliseconds
    #[arg(long, default_value = "5000", env = "PROBE_LONG_TIMEOUT_MS")]
    long_timeout_ms: u64,

    /// How many echo requests each silent address gets at most
    #[arg(long, default_value = "3", env = "PROBE_SEND_ROUNDS")]
    send_rounds: u8,

    /// How often confirmed addresses are collected, in milliseconds. Also spaces the send rounds.
    #[arg(long, default_value = "1000", env = "PROBE_HANDOFF_INTERVAL_MS")]
    handoff_interval_ms: u64,

    /// Upper bound for a single socket read, in milliseconds
    #[arg(long, default_value = "100", env = "PROBE_READ_DEADLINE_MS")]
    read_deadline_ms: u64,
}

impl TryFrom<&Params> for ProbeConfig {
    type Error = anyhow::Error;

    fn try_from(params: &Params) -> Result<Self> {
        if params.max_batch_size == 0 || params.max_batch_size > MAX_BATCH_SIZE {
            bail!(
                "batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE,
                params.max_batch_size
            );
        }
        if params.send_rounds == 0 {
            bail!("need at least one send round, otherwise nothing would ever be probed");
        }
        let millis = [
            ("short timeout", params.short_timeout_ms),
            ("long timeout", params.long_timeout_ms),
            ("handoff interval", params.handoff_interval_ms),
            ("read deadline", params.read_deadline_ms),
        ];
        if let Some((name, _)) = millis.iter().find(|(_, value)| *value == 0) {
            bail!("{} must be positive", name);
        }
        // confirmations only reach the sender once per handoff interval
        let handoff = params.handoff_interval_ms;
        for (name, timeout) in &millis[..2] {
            if *timeout <= handoff {
                bail!(
                    "{} ({}ms) must be longer than the handoff interval ({}ms), \
                    otherwise no answer could ever be counted",
                    name,
                    timeout,
                    handoff
                );
            }
        }
        if params.read_deadline_ms >= handoff {
            bail!(
                "read deadline ({}ms) must be shorter than the handoff interval ({}ms)",
                params.read_deadline_ms,
                handoff
            );
        }
        Ok(Self {
            max_batch_size: params.max_batch_size,
            small_scan_threshold: params.small_scan_threshold,
            short_timeout: Duration::from_millis(params.short_timeout_ms),
            long_timeout: Duration::from_millis(params.long_timeout_ms),
            timing: ProbeTiming {
                send_rounds: params.send_rounds,
                handoff_interval: Duration::from_millis(params.handoff_interval_ms),
                read_deadline: Duration::from_millis(params.read_deadline_ms),
            },
        })
    }
}

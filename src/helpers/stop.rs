use std::io;

use anyhow::{anyhow, Result};
use log::{error, info};
use tokio::select;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Turns the usual termination signals into a [CancellationToken].
pub struct SignalHandler {
    tok: CancellationToken,
}

pub fn new() -> SignalHandler {
    SignalHandler {
        tok: CancellationToken::new(),
    }
}

impl SignalHandler {
    pub fn subscribe_stop(&self) -> CancellationToken {
        self.tok.clone()
    }

    pub async fn wait_for_signal(self) {
        let (mut sigterm, mut sigint, mut sighup) = match register_all() {
            Ok(signals) => signals,
            Err(e) => {
                error!("Unable to register signal handlers, Ctrl+C won't stop cleanly: {}", e);
                return;
            }
        };

        select! {
            _ = sigterm.recv() => info!("Terminated; stopping..."),
            _ = sigint.recv() => info!("Interrupted; stopping..."),
            _ = sighup.recv() => info!("Hangup received; stopping..."), // used by tmux apparently
        }
        self.tok.cancel();
    }
}

fn register_all() -> io::Result<(Signal, Signal, Signal)> {
    Ok((
        signal(SignalKind::terminate())?,
        signal(SignalKind::interrupt())?,
        signal(SignalKind::hangup())?,
    ))
}

pub async fn flatten<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(Ok(it)) => Ok(it),
        Ok(Err(err)) => Err(err),
        Err(err) => Err(anyhow!(err)),
    }
}

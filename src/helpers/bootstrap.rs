use std::time::Duration;

use anyhow::{Context, Result};
use human_panic::setup_panic;
use log::debug;

use crate::helpers::logging;

/// How long spawned tasks get to finish after the command returned.
/// Probe tasks never outlive their own deadline, which is far below this.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Runs a binary of this workspace: installs the panic handler, loads `.env`, parses the CLI,
/// configures logging, and executes `fn_run` inside an entered multi-threaded Tokio runtime.
pub fn run<CliType>(
    fn_cli_parse: fn() -> CliType,
    fn_extract_logging: fn(&CliType) -> &logging::Params,
    fn_run: fn(CliType) -> Result<()>,
) -> Result<()> {
    setup_panic!();
    let env_missing = match dotenvy::dotenv() {
        Ok(_) => false,
        Err(env_err) if env_err.not_found() => true,
        Err(env_err) => return Err(env_err).with_context(|| "Failed to load `.env` file"),
    };

    let cli = fn_cli_parse();
    let logger_handle = logging::configure_from(fn_extract_logging(&cli))?;
    if env_missing {
        debug!("No `.env` file found (recursively), using process environment only.");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("alive-crab-worker")
        .build()
        .with_context(|| "Failed to start Tokio runtime")?;
    let guard = runtime.enter();

    let command_result = fn_run(cli);

    debug!("Waiting up to {:?} for remaining tasks to finish", SHUTDOWN_GRACE);
    drop(guard);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    // Important with non-direct write mode
    // Handle needs to be kept alive until end of program
    logger_handle.flush();

    command_result
}

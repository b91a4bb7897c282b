pub mod cli;
mod error;
pub mod runtime;

pub use crate::runtime::BakeoffRuntime;

use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "bakeoff=info,bakeoff_runtime=info";

/// Logs go to stderr so stdout stays reserved for the envelope. Colours only
/// when stderr is a terminal, since a collector's stderr ends up in an envelope.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

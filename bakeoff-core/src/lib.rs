//! Shared vocabulary of a bakeoff run: the resolved configuration handed to the
//! collector, the per-call samples it records and the summary it persists.
mod config;
mod constants;
mod data;
pub mod resolve;
mod stats;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use resolve::{resolve, Params, ResolveError, Resolved};
pub use stats::*;

//! Helper library for native maple-sync applications.
//!
//! - [Log] configures the tracing subscriber from the command line or environment.
//! - [Config] loads the synchronization and device settings from a TOML file.

mod config;
mod log;

pub use config::*;
pub use log::*;

// Re-export these crates.
pub use maple_sync;

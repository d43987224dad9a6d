use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging options shared by every binary.
#[derive(Args, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
	/// The level to log at, unless overridden by RUST_LOG.
	#[arg(id = "log-level", long = "log-level", default_value = "info", env = "MAPLE_LOG_LEVEL")]
	pub level: String,
}

impl Default for Log {
	fn default() -> Self {
		Self { level: "info".into() }
	}
}

impl Log {
	pub fn level(&self) -> LevelFilter {
		self.level.parse().unwrap_or(LevelFilter::INFO)
	}

	/// Install the global subscriber, writing to stderr.
	///
	/// Does nothing if a subscriber was already installed.
	pub fn init(&self) {
		let filter = EnvFilter::builder()
			.with_default_directive(self.level().into())
			.from_env_lossy();

		let fmt_layer = tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.with_filter(filter);

		let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_level() {
		let log = Log { level: "debug".into() };
		assert_eq!(log.level(), LevelFilter::DEBUG);

		let log = Log { level: "loud".into() };
		assert_eq!(log.level(), LevelFilter::INFO);
	}
}

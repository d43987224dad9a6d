use std::path::Path;

use anyhow::Context;
use maple_sync::{DeviceConfig, SyncConfig};
use serde::{Deserialize, Serialize};

use crate::Log;

/// Everything a binary reads from its TOML file.
///
/// ```toml
/// [log]
/// level = "debug"
///
/// [sync]
/// fallback_timeout = "1s"
/// stale_frames = 10
///
/// [device]
/// refresh_rate_hz = 90.0
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
	pub log: Log,
	pub sync: SyncConfig,
	pub device: DeviceConfig,
}

impl Config {
	/// Load and validate a config file.
	///
	/// A missing file falls back to the defaults, with a warning.
	pub fn load(path: &Path) -> anyhow::Result<Self> {
		let contents = match std::fs::read_to_string(path) {
			Ok(contents) => contents,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				tracing::warn!(path = %path.display(), "config file not found, using defaults");
				return Ok(Self::default());
			}
			Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
		};

		Self::parse(&contents).with_context(|| format!("invalid config: {}", path.display()))
	}

	pub fn parse(contents: &str) -> anyhow::Result<Self> {
		let config: Self = toml::from_str(contents)?;
		config.sync.validate()?;
		Ok(config)
	}

	pub fn to_toml(&self) -> anyhow::Result<String> {
		Ok(toml::to_string_pretty(self)?)
	}
}

#[cfg(test)]
mod tests {
	use std::{io::Write, time::Duration};

	use super::*;

	#[test]
	fn test_parse() {
		let config = Config::parse(
			r#"
			[log]
			level = "debug"

			[sync]
			fallback_timeout = "500ms"
			stale_frames = 4

			[device]
			refresh_rate_hz = 90.0
			"#,
		)
		.unwrap();

		assert_eq!(config.log.level, "debug");
		assert_eq!(config.sync.fallback_timeout, Duration::from_millis(500));
		assert_eq!(config.sync.stale_frames, 4);
		assert_eq!(config.sync.latency_window, Duration::from_secs(3));
		assert_eq!(config.device.refresh_rate_hz, 90.0);
	}

	#[test]
	fn test_unknown_field() {
		assert!(Config::parse("[sync]\nbogus = 1\n").is_err());
	}

	#[test]
	fn test_invalid() {
		assert!(Config::parse("[sync]\nlatency_window = \"0s\"\n").is_err());
	}

	#[test]
	fn test_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let config = Config::load(&dir.path().join("missing.toml")).unwrap();
		assert_eq!(config.sync, SyncConfig::default());
	}

	#[test]
	fn test_load_roundtrip() {
		let config = Config::default();
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

		let loaded = Config::load(file.path()).unwrap();
		assert_eq!(loaded.sync, config.sync);
		assert_eq!(loaded.device, config.device);
	}
}

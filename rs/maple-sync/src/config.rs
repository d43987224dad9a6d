use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, MAX_EXTENSION_SIZE, Time};

/// Tuning for the synchronization and latency control loops.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[serde(deny_unknown_fields, default)]
pub struct SyncConfig {
	/// The header extension id carrying the frame record.
	#[cfg_attr(feature = "clap", arg(long = "sync-extension-id", default_value_t = 1))]
	pub extension_id: u8,

	/// Records larger than this are dropped with an error.
	#[cfg_attr(feature = "clap", arg(long = "sync-max-record", default_value_t = MAX_EXTENSION_SIZE))]
	pub max_record_size: usize,

	/// Reuse the last record for frames without one, but only for this long after it arrived.
	#[cfg_attr(feature = "clap", arg(long = "sync-fallback-timeout", default_value = "1s", value_parser = humantime::parse_duration))]
	#[serde(with = "humantime_serde")]
	pub fallback_timeout: Duration,

	/// After this many consecutive frames without a fresh record, stop reusing the last one.
	#[cfg_attr(feature = "clap", arg(long = "sync-stale-frames", default_value_t = 10))]
	pub stale_frames: u32,

	/// How often the average frame latency is computed.
	#[cfg_attr(feature = "clap", arg(long = "sync-latency-window", default_value = "3s", value_parser = humantime::parse_duration))]
	#[serde(with = "humantime_serde")]
	pub latency_window: Duration,

	/// Target jitter buffer depth as a multiple of the average latency.
	#[cfg_attr(feature = "clap", arg(long = "sync-jitter-multiplier", default_value_t = 1.5))]
	pub jitter_multiplier: f64,

	/// How much the jitter buffer depth may shrink per update.
	#[cfg_attr(feature = "clap", arg(long = "sync-jitter-step", default_value = "10ms", value_parser = humantime::parse_duration))]
	#[serde(with = "humantime_serde")]
	pub jitter_step: Duration,

	/// The jitter buffer depth before the first update.
	#[cfg_attr(feature = "clap", arg(long = "sync-jitter-initial", default_value = "200ms", value_parser = humantime::parse_duration))]
	#[serde(with = "humantime_serde")]
	pub jitter_initial: Duration,

	/// How often the encoder bitrate tier is reevaluated.
	#[cfg_attr(feature = "clap", arg(long = "sync-bitrate-window", default_value = "5s", value_parser = humantime::parse_duration))]
	#[serde(with = "humantime_serde")]
	pub bitrate_window: Duration,

	/// Bitrate tiers, ordered by ascending latency threshold.
	#[cfg_attr(feature = "clap", arg(skip = default_tiers()))]
	pub bitrate_tiers: Vec<BitrateTier>,

	/// The bitrate used when the latency exceeds every tier.
	#[cfg_attr(feature = "clap", arg(long = "sync-bitrate-floor", default_value_t = 2048))]
	pub bitrate_floor_kbps: u32,

	/// How long to wait for the event loop thread on shutdown.
	#[cfg_attr(feature = "clap", arg(long = "sync-shutdown-timeout", default_value = "2s", value_parser = humantime::parse_duration))]
	#[serde(with = "humantime_serde")]
	pub shutdown_timeout: Duration,
}

/// Use `kbps` while the window's maximum latency stays below `below`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BitrateTier {
	#[serde(with = "humantime_serde")]
	pub below: Duration,
	pub kbps: u32,
}

fn default_tiers() -> Vec<BitrateTier> {
	vec![
		BitrateTier {
			below: Duration::from_millis(100),
			kbps: 16_384,
		},
		BitrateTier {
			below: Duration::from_millis(200),
			kbps: 8_192,
		},
		BitrateTier {
			below: Duration::from_millis(300),
			kbps: 4_096,
		},
	]
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			extension_id: 1,
			max_record_size: MAX_EXTENSION_SIZE,
			fallback_timeout: Duration::from_secs(1),
			stale_frames: 10,
			latency_window: Duration::from_secs(3),
			jitter_multiplier: 1.5,
			jitter_step: Duration::from_millis(10),
			jitter_initial: Duration::from_millis(200),
			bitrate_window: Duration::from_secs(5),
			bitrate_tiers: default_tiers(),
			bitrate_floor_kbps: 2_048,
			shutdown_timeout: Duration::from_secs(2),
		}
	}
}

impl SyncConfig {
	pub fn validate(&self) -> Result<(), Error> {
		if self.extension_id == 0 {
			return Err(Error::InvalidExtensionId(0));
		}

		if self.max_record_size == 0 || self.max_record_size > MAX_EXTENSION_SIZE {
			return Err(invalid(format!(
				"max_record_size must be within 1..={MAX_EXTENSION_SIZE}"
			)));
		}

		if !(self.jitter_multiplier.is_finite() && self.jitter_multiplier > 0.0) {
			return Err(invalid("jitter_multiplier must be positive"));
		}

		if self.latency_window.is_zero() || self.bitrate_window.is_zero() {
			return Err(invalid("control windows must be non-zero"));
		}

		if !self.bitrate_tiers.windows(2).all(|pair| pair[0].below < pair[1].below) {
			return Err(invalid("bitrate_tiers must have ascending thresholds"));
		}

		// Everything below is converted to signed nanoseconds.
		for duration in [
			self.fallback_timeout,
			self.latency_window,
			self.jitter_step,
			self.jitter_initial,
			self.bitrate_window,
		] {
			Time::try_from(duration)?;
		}

		Ok(())
	}
}

fn invalid(reason: impl Into<String>) -> Error {
	Error::Config(reason.into().into())
}

/// Field of view of one eye, in radians.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Fov {
	pub left: f32,
	pub right: f32,
	pub up: f32,
	pub down: f32,
}

/// The headset the server renders for.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DeviceConfig {
	pub refresh_rate_hz: f32,

	/// Native per-eye resolution.
	pub eye_width: u32,
	pub eye_height: u32,

	/// Encoded stream resolution, both eyes side by side.
	pub stream_width: u32,
	pub stream_height: u32,

	/// Interpupillary distance in meters.
	pub ipd: f32,

	/// `[left, right]`
	pub fov: [Fov; 2],
}

impl Default for DeviceConfig {
	fn default() -> Self {
		Self {
			refresh_rate_hz: 72.0,
			eye_width: 1680,
			eye_height: 1760,
			stream_width: 1680,
			stream_height: 880,
			ipd: 0.063,
			fov: [
				Fov {
					left: -0.942,
					right: 0.698,
					up: 0.768,
					down: -0.960,
				},
				Fov {
					left: -0.698,
					right: 0.942,
					up: 0.768,
					down: -0.960,
				},
			],
		}
	}
}

impl DeviceConfig {
	/// The interval between displayed frames.
	pub fn frame_interval(&self) -> Duration {
		match self.refresh_rate_hz > 0.0 {
			true => Duration::from_secs_f32(1.0 / self.refresh_rate_hz),
			false => Duration::ZERO,
		}
	}
}

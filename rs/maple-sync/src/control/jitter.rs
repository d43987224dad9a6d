use crate::{SyncConfig, Time};

/// Sizes the receive jitter buffer from the average frame latency.
///
/// The depth grows to the target immediately but shrinks by at most one step per update,
/// so a latency spike is absorbed at once while recovery is gradual.
#[derive(Clone, Debug)]
pub struct JitterController {
	depth: Time,
	multiplier: f64,
	step: Time,
}

impl JitterController {
	pub fn new(config: &SyncConfig) -> Self {
		Self {
			depth: Time::try_from(config.jitter_initial).unwrap_or(Time::ZERO),
			multiplier: config.jitter_multiplier,
			step: Time::try_from(config.jitter_step).unwrap_or(Time::ZERO),
		}
	}

	pub fn with_depth(mut self, depth: Time) -> Self {
		self.depth = depth;
		self
	}

	/// The current depth.
	pub fn depth(&self) -> Time {
		self.depth
	}

	/// The depth an average latency calls for.
	pub fn target(&self, average: Time) -> Time {
		average.mul_f64(self.multiplier)
	}

	/// Feed one window's average latency and return the new depth.
	pub fn update(&mut self, average: Time) -> Time {
		let target = self.target(average);
		self.update_target(target)
	}

	/// Move toward an explicit target depth and return the new depth.
	pub fn update_target(&mut self, target: Time) -> Time {
		let decayed = self.depth - self.step;
		self.depth = decayed.max(target).max(Time::ZERO);
		self.depth
	}
}

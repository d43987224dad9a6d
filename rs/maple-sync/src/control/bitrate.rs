use crate::{BitrateTier, SyncConfig, Time};

/// A bitrate change decided at the end of a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitrateDecision {
	pub kbps: u32,

	/// The worst decode-to-display latency seen in the window.
	pub max_latency: Time,

	/// False if the tier did not change.
	pub changed: bool,
}

/// Picks an encoder bitrate tier from client-reported decode-to-display latency.
///
/// Uses the maximum over each window rather than the average, so a single good frame does not
/// trigger an upgrade and a single bad one is never averaged away.
#[derive(Clone, Debug)]
pub struct BitrateController {
	tiers: Vec<(Time, u32)>,
	floor: u32,
	window: Time,

	window_start: Option<Time>,
	max: Option<Time>,
	current: u32,
}

impl BitrateController {
	pub fn new(config: &SyncConfig) -> Self {
		let tiers: Vec<(Time, u32)> = config
			.bitrate_tiers
			.iter()
			.map(|BitrateTier { below, kbps }| (Time::try_from(*below).unwrap_or(Time::MAX), *kbps))
			.collect();

		let current = tiers.first().map(|(_, kbps)| *kbps).unwrap_or(config.bitrate_floor_kbps);

		Self {
			tiers,
			floor: config.bitrate_floor_kbps,
			window: Time::try_from(config.bitrate_window).unwrap_or(Time::MAX),
			window_start: None,
			max: None,
			current,
		}
	}

	/// Override the starting bitrate, ex. from the command line.
	pub fn with_current(mut self, kbps: u32) -> Self {
		self.current = kbps;
		self
	}

	pub fn current(&self) -> u32 {
		self.current
	}

	/// The tier for a latency.
	pub fn tier(&self, latency: Time) -> u32 {
		self.tiers
			.iter()
			.find(|(below, _)| latency < *below)
			.map(|(_, kbps)| *kbps)
			.unwrap_or(self.floor)
	}

	/// Record one client-reported latency.
	pub fn observe(&mut self, latency: Time) {
		self.max = Some(self.max.map_or(latency, |max| max.max(latency)));
	}

	/// At the end of a window, pick a tier from the window's maximum and start a new window.
	///
	/// Returns None while the window is open, or if nothing was observed during it.
	pub fn maybe_evaluate(&mut self, now: Time) -> Option<BitrateDecision> {
		let start = *self.window_start.get_or_insert(now);
		if now - start < self.window {
			return None;
		}

		self.window_start = Some(now);
		let max = self.max.take()?;

		let kbps = self.tier(max);
		let changed = kbps != self.current;
		self.current = kbps;

		Some(BitrateDecision {
			kbps,
			max_latency: max,
			changed,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn controller() -> BitrateController {
		let mut controller = BitrateController::new(&SyncConfig::default());
		controller.maybe_evaluate(Time::ZERO);
		controller
	}

	#[test]
	fn test_tiers() {
		let controller = controller();
		assert_eq!(controller.tier(Time::from_millis(50)), 16_384);
		assert_eq!(controller.tier(Time::from_millis(100)), 8_192);
		assert_eq!(controller.tier(Time::from_millis(199)), 8_192);
		assert_eq!(controller.tier(Time::from_millis(250)), 4_096);
		assert_eq!(controller.tier(Time::from_millis(900)), 2_048);
	}

	#[test]
	fn test_uses_window_max() {
		let mut controller = controller();

		controller.observe(Time::from_millis(20));
		controller.observe(Time::from_millis(150));
		controller.observe(Time::from_millis(30));

		assert_eq!(controller.maybe_evaluate(Time::from_secs(4)), None);

		let decision = controller.maybe_evaluate(Time::from_secs(5)).unwrap();
		assert_eq!(decision.kbps, 8_192);
		assert_eq!(decision.max_latency, Time::from_millis(150));
		assert!(decision.changed);
		assert_eq!(controller.current(), 8_192);
	}

	#[test]
	fn test_windows_reset() {
		let mut controller = controller();

		controller.observe(Time::from_millis(250));
		assert_eq!(controller.maybe_evaluate(Time::from_secs(5)).unwrap().kbps, 4_096);

		controller.observe(Time::from_millis(40));
		let decision = controller.maybe_evaluate(Time::from_secs(10)).unwrap();
		assert_eq!(decision.kbps, 16_384);
		assert!(decision.changed);

		controller.observe(Time::from_millis(60));
		let decision = controller.maybe_evaluate(Time::from_secs(15)).unwrap();
		assert!(!decision.changed);
	}

	#[test]
	fn test_empty_window_keeps_tier() {
		let mut controller = controller().with_current(4_096);
		assert_eq!(controller.maybe_evaluate(Time::from_secs(5)), None);
		assert_eq!(controller.current(), 4_096);
	}
}

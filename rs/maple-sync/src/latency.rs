use parking_lot::Mutex;

use crate::Time;

/// Averages latency samples over fixed, non-overlapping windows.
///
/// The window is bounded by time, not by count: a slow stream just produces fewer samples.
pub struct LatencyEstimator {
	window: Time,
	state: Mutex<State>,
}

struct State {
	samples: Vec<Time>,

	// None until the first flush check, which starts the first window.
	last_flush: Option<Time>,
}

/// The result of a flushed window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyWindow {
	pub average: Time,
	pub max: Time,
	pub samples: usize,
}

impl LatencyEstimator {
	pub fn new(window: Time) -> Self {
		Self {
			window,
			state: Mutex::new(State {
				samples: Vec::new(),
				last_flush: None,
			}),
		}
	}

	/// Add a sample to the current window.
	pub fn record(&self, delta: Time) {
		self.state.lock().samples.push(delta);
	}

	/// Start the first window at `now` if it has not started yet.
	pub fn start(&self, now: Time) {
		self.state.lock().last_flush.get_or_insert(now);
	}

	/// If the window has elapsed, drain it and return its average.
	pub fn maybe_flush(&self, now: Time) -> Option<Time> {
		self.maybe_flush_window(now).map(|window| window.average)
	}

	/// Like [Self::maybe_flush], but with the maximum and sample count too.
	pub fn maybe_flush_window(&self, now: Time) -> Option<LatencyWindow> {
		let samples = {
			let mut state = self.state.lock();
			let last = *state.last_flush.get_or_insert(now);

			if now - last < self.window {
				return None;
			}

			state.last_flush = Some(now);
			std::mem::take(&mut state.samples)
		};

		// Summed outside the lock.
		Some(Self::summarize(&samples))
	}

	fn summarize(samples: &[Time]) -> LatencyWindow {
		if samples.is_empty() {
			return LatencyWindow {
				average: Time::ZERO,
				max: Time::ZERO,
				samples: 0,
			};
		}

		let sum: i128 = samples.iter().map(|s| s.as_nanos() as i128).sum();
		let average = Time::from_nanos((sum / samples.len() as i128) as i64);
		let max = samples.iter().copied().max().unwrap_or(Time::ZERO);

		LatencyWindow {
			average,
			max,
			samples: samples.len(),
		}
	}

	/// Samples recorded in the current window.
	pub fn len(&self) -> usize {
		self.state.lock().samples.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drop the current window's samples.
	pub fn reset(&self) {
		let mut state = self.state.lock();
		state.samples.clear();
		state.last_flush = None;
	}
}

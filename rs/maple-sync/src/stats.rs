//! Lightweight counters for the synchronization path.
//!
//! Every hook is called from a real-time thread, so implementations must be fast and
//! non-blocking (atomics, not locks).

use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

use crate::Delivery;

/// A sink for synchronization events.
pub trait Stats: Send + Sync + 'static {
	/// A record was staged for the next outgoing packet.
	fn record_staged(&self) {}

	/// A record was dropped because the previous one had not been embedded yet.
	fn stage_conflict(&self) {}

	/// A record was copied into a packet extension.
	fn record_embedded(&self) {}

	/// A record exceeded the extension size bound and was dropped.
	fn record_oversized(&self) {}

	/// A record was read from a packet extension into the holding slot.
	fn record_extracted(&self) {}

	/// A packet extension was ignored because the holding slot was still occupied.
	fn extract_conflict(&self) {}

	/// A held record was attached to a reassembled buffer.
	fn record_reattached(&self) {}

	/// A decoded frame was published, and whether it replaced an untaken frame.
	fn frame_published(&self, _delivery: Delivery, _replaced: bool) {}

	/// The render loop found nothing to take.
	fn frame_skipped(&self) {}

	/// A latency sample was recorded.
	fn latency_sampled(&self) {}

	/// A frame's latency could not be measured because the clock offset was unknown.
	fn latency_unavailable(&self) {}
}

/// Default stats sink that does nothing.
#[derive(Default)]
pub struct NoopStats;

impl Stats for NoopStats {}

/// Thread-safe counters for every [Stats] hook.
#[derive(Clone, Default)]
pub struct Counters {
	inner: Arc<CountersInner>,
}

#[derive(Default)]
struct CountersInner {
	staged: AtomicU64,
	stage_conflicts: AtomicU64,
	embedded: AtomicU64,
	oversized: AtomicU64,
	extracted: AtomicU64,
	extract_conflicts: AtomicU64,
	reattached: AtomicU64,
	fresh: AtomicU64,
	reused: AtomicU64,
	missing: AtomicU64,
	replaced: AtomicU64,
	skipped: AtomicU64,
	latency_samples: AtomicU64,
	latency_unavailable: AtomicU64,
}

/// A point-in-time copy of [Counters].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CountersSnapshot {
	pub staged: u64,
	pub stage_conflicts: u64,
	pub embedded: u64,
	pub oversized: u64,
	pub extracted: u64,
	pub extract_conflicts: u64,
	pub reattached: u64,
	pub fresh: u64,
	pub reused: u64,
	pub missing: u64,
	pub replaced: u64,
	pub skipped: u64,
	pub latency_samples: u64,
	pub latency_unavailable: u64,
}

impl Counters {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn snapshot(&self) -> CountersSnapshot {
		let i = &self.inner;
		CountersSnapshot {
			staged: i.staged.load(Ordering::Relaxed),
			stage_conflicts: i.stage_conflicts.load(Ordering::Relaxed),
			embedded: i.embedded.load(Ordering::Relaxed),
			oversized: i.oversized.load(Ordering::Relaxed),
			extracted: i.extracted.load(Ordering::Relaxed),
			extract_conflicts: i.extract_conflicts.load(Ordering::Relaxed),
			reattached: i.reattached.load(Ordering::Relaxed),
			fresh: i.fresh.load(Ordering::Relaxed),
			reused: i.reused.load(Ordering::Relaxed),
			missing: i.missing.load(Ordering::Relaxed),
			replaced: i.replaced.load(Ordering::Relaxed),
			skipped: i.skipped.load(Ordering::Relaxed),
			latency_samples: i.latency_samples.load(Ordering::Relaxed),
			latency_unavailable: i.latency_unavailable.load(Ordering::Relaxed),
		}
	}
}

impl Stats for Counters {
	fn record_staged(&self) {
		self.inner.staged.fetch_add(1, Ordering::Relaxed);
	}

	fn stage_conflict(&self) {
		self.inner.stage_conflicts.fetch_add(1, Ordering::Relaxed);
	}

	fn record_embedded(&self) {
		self.inner.embedded.fetch_add(1, Ordering::Relaxed);
	}

	fn record_oversized(&self) {
		self.inner.oversized.fetch_add(1, Ordering::Relaxed);
	}

	fn record_extracted(&self) {
		self.inner.extracted.fetch_add(1, Ordering::Relaxed);
	}

	fn extract_conflict(&self) {
		self.inner.extract_conflicts.fetch_add(1, Ordering::Relaxed);
	}

	fn record_reattached(&self) {
		self.inner.reattached.fetch_add(1, Ordering::Relaxed);
	}

	fn frame_published(&self, delivery: Delivery, replaced: bool) {
		let counter = match delivery {
			Delivery::Fresh => &self.inner.fresh,
			Delivery::Reused => &self.inner.reused,
			Delivery::Missing => &self.inner.missing,
		};
		counter.fetch_add(1, Ordering::Relaxed);

		if replaced {
			self.inner.replaced.fetch_add(1, Ordering::Relaxed);
		}
	}

	fn frame_skipped(&self) {
		self.inner.skipped.fetch_add(1, Ordering::Relaxed);
	}

	fn latency_sampled(&self) {
		self.inner.latency_samples.fetch_add(1, Ordering::Relaxed);
	}

	fn latency_unavailable(&self) {
		self.inner.latency_unavailable.fetch_add(1, Ordering::Relaxed);
	}
}

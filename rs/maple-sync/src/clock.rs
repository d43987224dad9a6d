use std::sync::{
	Arc, LazyLock,
	atomic::{AtomicI64, Ordering},
};

use crate::Time;

/// A source of nanosecond timestamps in one clock domain.
pub trait Clock: Send + Sync + 'static {
	fn now(&self) -> Time;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
	fn now(&self) -> Time {
		(**self).now()
	}
}

// There's no zero Instant, so we need to use a reference point.
static MONOTONIC_ANCHOR: LazyLock<std::time::Instant> = LazyLock::new(std::time::Instant::now);

/// The process monotonic clock, as nanoseconds since the first call.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
	fn now(&self) -> Time {
		let elapsed = MONOTONIC_ANCHOR.elapsed();
		Time::try_from(elapsed).unwrap_or(Time::MAX)
	}
}

/// A running-time clock: another clock minus a base time.
///
/// This is how a media pipeline derives its running time from its clock.
#[derive(Clone)]
pub struct RunningClock<C: Clock> {
	clock: C,
	base: Time,
}

impl<C: Clock> RunningClock<C> {
	/// Start counting from the clock's current time.
	pub fn start(clock: C) -> Self {
		let base = clock.now();
		Self { clock, base }
	}

	pub fn with_base(clock: C, base: Time) -> Self {
		Self { clock, base }
	}

	pub fn base(&self) -> Time {
		self.base
	}
}

impl<C: Clock> Clock for RunningClock<C> {
	fn now(&self) -> Time {
		self.clock.now() - self.base
	}
}

/// A clock that only moves when told to.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
	now: Arc<AtomicI64>,
}

impl ManualClock {
	pub fn new(start: Time) -> Self {
		Self {
			now: Arc::new(AtomicI64::new(start.as_nanos())),
		}
	}

	pub fn set(&self, now: Time) {
		self.now.store(now.as_nanos(), Ordering::Relaxed);
	}

	pub fn advance(&self, by: Time) {
		self.now.fetch_add(by.as_nanos(), Ordering::Relaxed);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Time {
		Time::from_nanos(self.now.load(Ordering::Relaxed))
	}
}

/// The two receiver-side clocks every session reads.
#[derive(Clone)]
pub struct Clocks {
	/// The local monotonic clock.
	pub wall: Arc<dyn Clock>,

	/// The media pipeline's clock, slaved to the sender's over the network.
	pub pipeline: Arc<dyn Clock>,
}

impl Clocks {
	/// The process monotonic clock, and a pipeline clock counting from now.
	pub fn system() -> Self {
		Self {
			wall: Arc::new(MonotonicClock),
			pipeline: Arc::new(RunningClock::start(MonotonicClock)),
		}
	}

	/// Both clocks driven by hand.
	pub fn manual(wall: ManualClock, pipeline: ManualClock) -> Self {
		Self {
			wall: Arc::new(wall),
			pipeline: Arc::new(pipeline),
		}
	}
}

/// Maps sender timestamps into receiver-local time.
///
/// A trusted time-sync channel can supply the offset via [Self::set_authoritative], after
/// which it is returned unchanged. Until then it is estimated per frame as
/// `(receiver_wall - receiver_pipeline) - (sender_wall - sender_pipeline)`, using the
/// sender's half embedded in each record. The estimate holds while both pipelines are slaved
/// to the same network clock.
///
/// An offset of zero means "unknown"; callers skip anything derived from it.
#[derive(Debug, Default)]
pub struct ClockTranslator {
	authoritative: AtomicI64,
}

impl ClockTranslator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Install the offset reported by the external clock-sync channel.
	///
	/// Zero clears it, falling back to the per-frame estimate.
	pub fn set_authoritative(&self, offset: Time) {
		self.authoritative.store(offset.as_nanos(), Ordering::Release);
		tracing::debug!(?offset, "authoritative clock offset");
	}

	pub fn authoritative(&self) -> Option<Time> {
		match self.authoritative.load(Ordering::Acquire) {
			0 => None,
			nanos => Some(Time::from_nanos(nanos)),
		}
	}

	/// The current offset, or None if neither path can produce one.
	///
	/// `sender_wall_pipeline` is the sender's `wallclock - pipeline_clock`; zero means the
	/// sender did not provide it.
	pub fn offset(&self, local_wall: Time, local_pipeline: Time, sender_wall_pipeline: Time) -> Option<Time> {
		if let Some(offset) = self.authoritative() {
			return Some(offset);
		}

		if sender_wall_pipeline.is_zero() {
			return None;
		}

		let local = local_wall.checked_sub(local_pipeline).ok()?;
		let offset = local.checked_sub(sender_wall_pipeline).ok()?;

		match offset.is_zero() {
			true => None,
			false => Some(offset),
		}
	}

	/// Express a sender timestamp in receiver-local time.
	pub fn translate(offset: Time, sender: Time) -> Time {
		offset + sender
	}
}

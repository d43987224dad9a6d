use std::sync::{
	Arc,
	atomic::{AtomicBool, AtomicU32, Ordering},
};

use parking_lot::Mutex;

use crate::{Clock, Error, FrameRecord, NoopStats, Stats, SyncConfig, Time, record::Pose};

/// How a delivered frame got its metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Delivery {
	/// Recovered from this frame's own packets.
	Fresh,

	/// This frame arrived without a record; the last one was reused.
	Reused,

	/// No usable record.
	Missing,
}

/// A decoded record plus the receive-side context computed for it.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
	pub record: Arc<FrameRecord>,

	/// Receiver monotonic time the record was extracted.
	pub receive_time: Time,

	/// The record's render-begin time in receiver time, if the clock offset was known.
	pub server_render_begin: Option<Time>,

	/// The record's push time in receiver time, if the clock offset was known.
	pub server_push: Option<Time>,
}

impl Metadata {
	pub fn new(record: FrameRecord, receive_time: Time) -> Self {
		Self {
			record: Arc::new(record),
			receive_time,
			server_render_begin: None,
			server_push: None,
		}
	}
}

/// A decoded frame handed to the render loop.
///
/// Dropping it releases the frame.
#[derive(Debug)]
pub struct DecodedFrame<F> {
	pub frame: F,
	pub metadata: Option<Metadata>,
	pub delivery: Delivery,

	/// Receiver monotonic time decoding finished.
	pub decode_end: Time,

	/// Receiver monotonic time the render loop took the frame.
	pub render_begin: Time,
}

impl<F> DecodedFrame<F> {
	pub fn record(&self) -> Option<&FrameRecord> {
		self.metadata.as_ref().map(|m| m.record.as_ref())
	}

	pub fn sequence(&self) -> u64 {
		self.record().map(|r| r.sequence).unwrap_or_default()
	}

	/// The eye poses the frame was rendered with, identity where unknown.
	pub fn views(&self) -> [Pose; 2] {
		let views = self.record().map(|r| r.views).unwrap_or_default();
		views.map(Option::unwrap_or_default)
	}
}

// Producer-only state for the missing-metadata policy.
#[derive(Default)]
struct Fallback {
	last: Option<Metadata>,
	last_fresh: Time,

	// Consecutive frames published without a fresh record.
	stale: u32,
}

/// Hands the latest decoded frame from the pipeline thread to the render loop.
///
/// A single slot: publishing replaces any frame that was not taken, and the producer never
/// waits. Frames without a record reuse the last one until it is older than the fallback
/// timeout, or until the configured number of consecutive frames went without one.
pub struct DeliveryBuffer<F> {
	slot: Mutex<Option<DecodedFrame<F>>>,
	fallback: Mutex<Fallback>,
	skipped: AtomicU32,
	closed: AtomicBool,

	timeout: Time,
	stale_frames: u32,

	clock: Arc<dyn Clock>,
	stats: Arc<dyn Stats>,
}

impl<F> DeliveryBuffer<F> {
	pub fn new(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
		Self {
			slot: Mutex::new(None),
			fallback: Default::default(),
			skipped: AtomicU32::new(0),
			closed: AtomicBool::new(false),
			timeout: Time::try_from(config.fallback_timeout).unwrap_or(Time::MAX),
			stale_frames: config.stale_frames,
			clock,
			stats: Arc::new(NoopStats),
		}
	}

	pub fn with_stats(mut self, stats: Arc<dyn Stats>) -> Self {
		self.stats = stats;
		self
	}

	/// Publish a decoded frame, replacing any frame the render loop has not taken yet.
	///
	/// Returns how the frame's metadata was resolved. Frames published after [Self::close]
	/// are dropped.
	pub fn publish(&self, frame: F, metadata: Option<Metadata>, decode_end: Time) -> Delivery {
		if self.is_closed() {
			return Delivery::Missing;
		}

		let (metadata, delivery) = self.resolve(metadata, decode_end);

		let decoded = DecodedFrame {
			frame,
			metadata,
			delivery,
			decode_end,
			render_begin: Time::ZERO,
		};

		let old = {
			let mut slot = self.slot.lock();

			// close() may have run since the check above; it takes the slot after setting the flag.
			if self.is_closed() {
				drop(slot);
				drop(decoded);
				return Delivery::Missing;
			}

			slot.replace(decoded)
		};
		let replaced = old.is_some();

		// Release the old frame outside the lock.
		drop(old);

		self.stats.frame_published(delivery, replaced);
		tracing::trace!(?delivery, replaced, "published frame");

		delivery
	}

	fn resolve(&self, metadata: Option<Metadata>, now: Time) -> (Option<Metadata>, Delivery) {
		let mut fallback = self.fallback.lock();

		if let Some(metadata) = metadata {
			fallback.last = Some(metadata.clone());
			fallback.last_fresh = now;
			fallback.stale = 0;
			return (Some(metadata), Delivery::Fresh);
		}

		fallback.stale = fallback.stale.saturating_add(1);

		let Some(last) = &fallback.last else {
			return (None, Delivery::Missing);
		};

		if now - fallback.last_fresh >= self.timeout {
			tracing::trace!("last record too old, delivering without metadata");
			return (None, Delivery::Missing);
		}

		if fallback.stale >= self.stale_frames {
			tracing::trace!(stale = fallback.stale, "too many frames without a record");
			return (None, Delivery::Missing);
		}

		(Some(last.clone()), Delivery::Reused)
	}

	/// Take the latest frame, if one was published since the last take.
	///
	/// Returns [Error::Closed] once the pipeline stopped; the caller should stop pulling.
	pub fn try_take(&self) -> Result<Option<DecodedFrame<F>>, Error> {
		if self.is_closed() {
			return Err(Error::Closed);
		}

		let Some(mut frame) = self.slot.lock().take() else {
			let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
			self.stats.frame_skipped();

			if skipped == self.stale_frames {
				tracing::debug!(skipped, "render loop starved of frames");
			}

			return Ok(None);
		};

		self.skipped.store(0, Ordering::Relaxed);
		frame.render_begin = self.clock.now();

		Ok(Some(frame))
	}

	/// Consecutive [Self::try_take] calls that found nothing.
	pub fn skipped(&self) -> u32 {
		self.skipped.load(Ordering::Relaxed)
	}

	/// Invalidate the slot and the fallback record. Further takes return [Error::Closed].
	pub fn close(&self) {
		self.closed.store(true, Ordering::Release);

		let old = self.slot.lock().take();
		*self.fallback.lock() = Fallback::default();
		drop(old);
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}
}

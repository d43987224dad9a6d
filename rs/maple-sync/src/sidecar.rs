use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{Annotated, Annotation, Clock, Error, ExtensionSlot, NoopStats, Stats, SyncConfig};

/// The outcome of [Sidecar::stage].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Staged {
	/// The record will ride on the next outgoing packet.
	Pending,

	/// A previous record has not been embedded yet; this one was dropped.
	Dropped,
}

/// Carries one serialized record across a pipeline stage without touching the payload.
///
/// Sending: [Self::stage] before the encoder output reaches the packetizer, then
/// [Self::take_and_embed] from the packetizer's input hook.
/// Receiving: [Self::extract] from the depacketizer's input hook, then [Self::reattach]
/// from its output hook.
///
/// Both slots are first-wins: while a slot is occupied, new records are dropped rather than
/// replacing it, so a record is never split across frames. Under bursts this can pair a
/// record with a later frame than the one it was produced for.
///
/// Each slot has its own lock, held only to move a [Bytes] handle in or out.
///
/// After [Self::close] both slots stay empty: staging fails with [Error::Closed] and the
/// pad hooks do nothing.
pub struct Sidecar {
	extension_id: u8,
	max_size: usize,

	stage: Mutex<Option<Bytes>>,
	holding: Mutex<Option<Annotation>>,
	closed: AtomicBool,

	clock: Arc<dyn Clock>,
	stats: Arc<dyn Stats>,
}

impl Sidecar {
	pub fn new(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
		Self {
			extension_id: config.extension_id,
			max_size: config.max_record_size,
			stage: Default::default(),
			holding: Default::default(),
			closed: AtomicBool::new(false),
			clock,
			stats: Arc::new(NoopStats),
		}
	}

	pub fn with_stats(mut self, stats: Arc<dyn Stats>) -> Self {
		self.stats = stats;
		self
	}

	/// Stage a serialized record for the next outgoing packet.
	///
	/// Returns [Error::RecordTooLarge] if it cannot fit in one extension element.
	pub fn stage(&self, record: Bytes) -> Result<Staged, Error> {
		if record.len() > self.max_size {
			self.stats.record_oversized();
			tracing::error!(size = record.len(), max = self.max_size, "frame record too large, dropped");
			return Err(Error::RecordTooLarge {
				size: record.len(),
				max: self.max_size,
			});
		}

		let mut stage = self.stage.lock();
		if self.is_closed() {
			return Err(Error::Closed);
		}

		if stage.is_some() {
			drop(stage);
			self.stats.stage_conflict();
			tracing::debug!("previous record not yet embedded, dropping new record");
			return Ok(Staged::Dropped);
		}

		*stage = Some(record);
		drop(stage);

		self.stats.record_staged();
		Ok(Staged::Pending)
	}

	/// Move the staged record, if any, into the packet's extension.
	///
	/// Returns true if a record was embedded. A packet without a record is normal.
	pub fn take_and_embed<P: ExtensionSlot + ?Sized>(&self, packet: &mut P) -> Result<bool, Error> {
		if self.is_closed() {
			return Ok(false);
		}

		let Some(record) = self.stage.lock().take() else {
			return Ok(false);
		};

		packet.set_extension(self.extension_id, record)?;
		self.stats.record_embedded();
		tracing::trace!("embedded frame record");

		Ok(true)
	}

	/// Copy the packet's extension, if any, into the holding slot.
	///
	/// Returns true if the holding slot was filled.
	pub fn extract<P: ExtensionSlot + ?Sized>(&self, packet: &P) -> bool {
		let Some(record) = packet.extension(self.extension_id) else {
			return false;
		};

		let receive_time = self.clock.now();

		let mut holding = self.holding.lock();
		if self.is_closed() {
			return false;
		}

		if holding.is_some() {
			drop(holding);
			self.stats.extract_conflict();
			tracing::debug!("previous record not yet reattached, ignoring extension");
			return false;
		}

		*holding = Some(Annotation { record, receive_time });
		drop(holding);

		self.stats.record_extracted();
		true
	}

	/// Move the held record onto a reassembled buffer.
	///
	/// Returns true if the buffer was annotated.
	pub fn reattach<B: Annotated + ?Sized>(&self, buffer: &mut B) -> bool {
		let Some(annotation) = self.holding.lock().take() else {
			return false;
		};

		buffer.set_annotation(annotation);
		self.stats.record_reattached();
		true
	}

	/// Drop anything staged or held.
	pub fn clear(&self) {
		self.stage.lock().take();
		self.holding.lock().take();
	}

	/// Clear both slots and keep them empty.
	pub fn close(&self) {
		self.closed.store(true, Ordering::Release);
		self.clear();
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	pub fn is_staged(&self) -> bool {
		self.stage.lock().is_some()
	}

	pub fn is_holding(&self) -> bool {
		self.holding.lock().is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		Counters, FrameRecord, MAX_EXTENSION_SIZE, ManualClock, MediaBuffer, RtpPacket, Time,
		record::{Pose, Quat, Vec3},
	};

	fn sidecar() -> (Sidecar, ManualClock, Counters) {
		let clock = ManualClock::new(Time::from_secs(1));
		let counters = Counters::new();
		let sidecar =
			Sidecar::new(&SyncConfig::default(), Arc::new(clock.clone())).with_stats(Arc::new(counters.clone()));
		(sidecar, clock, counters)
	}

	#[test]
	fn test_first_wins() {
		let (sidecar, _, counters) = sidecar();

		assert_eq!(sidecar.stage(Bytes::from_static(b"one")).unwrap(), Staged::Pending);
		assert_eq!(sidecar.stage(Bytes::from_static(b"two")).unwrap(), Staged::Dropped);
		assert_eq!(sidecar.stage(Bytes::from_static(b"three")).unwrap(), Staged::Dropped);

		let mut packet = RtpPacket::default();
		assert!(sidecar.take_and_embed(&mut packet).unwrap());
		assert_eq!(packet.extension(1), Some(Bytes::from_static(b"one")));
		assert_eq!(packet.extensions.len(), 1);

		// The stage is free again.
		assert_eq!(sidecar.stage(Bytes::from_static(b"four")).unwrap(), Staged::Pending);

		let snapshot = counters.snapshot();
		assert_eq!(snapshot.staged, 2);
		assert_eq!(snapshot.stage_conflicts, 2);
		assert_eq!(snapshot.embedded, 1);
	}

	#[test]
	fn test_nothing_staged() {
		let (sidecar, _, _) = sidecar();
		let mut packet = RtpPacket::default();
		assert!(!sidecar.take_and_embed(&mut packet).unwrap());
		assert!(packet.extensions.is_empty());
	}

	#[test]
	fn test_oversized() {
		let (sidecar, _, counters) = sidecar();
		let err = sidecar.stage(Bytes::from(vec![0u8; 256])).unwrap_err();
		assert!(matches!(err, Error::RecordTooLarge { size: 256, max: 255 }));
		assert!(!sidecar.is_staged());
		assert_eq!(counters.snapshot().oversized, 1);
	}

	#[test]
	fn test_holding_first_wins() {
		let (sidecar, _, counters) = sidecar();

		let mut first = RtpPacket::default();
		first.set_extension(1, Bytes::from_static(b"a")).unwrap();
		let mut second = RtpPacket::default();
		second.set_extension(1, Bytes::from_static(b"b")).unwrap();

		assert!(sidecar.extract(&first));
		assert!(!sidecar.extract(&second));
		assert!(!sidecar.extract(&RtpPacket::default()));

		let mut buffer = MediaBuffer::default();
		assert!(sidecar.reattach(&mut buffer));
		assert_eq!(buffer.annotation.unwrap().record, Bytes::from_static(b"a"));
		assert_eq!(counters.snapshot().extract_conflicts, 1);

		let mut empty = MediaBuffer::default();
		assert!(!sidecar.reattach(&mut empty));
		assert!(empty.annotation.is_none());
	}

	#[test]
	fn test_round_trip() {
		let (sender, _, _) = sidecar();
		let (receiver, clock, _) = sidecar();

		let head = Pose::new(Quat::new(0.0, 0.2588, 0.0, 0.9659), Vec3::new(0.1, 1.62, -0.05));
		let eye = |x: f32| Some(head.compose(&Pose::new(Quat::IDENTITY, Vec3::new(x, 0.0, 0.0))));
		let hand = |x: f32| Some(Pose::new(Quat::new(0.5, -0.5, 0.5, 0.5), Vec3::new(x, 1.1, -0.3)));

		let record = FrameRecord {
			sequence: 17,
			views: [eye(-0.0315), eye(0.0315)],
			head: Some(head),
			grip: [hand(-0.2), hand(0.2)],
			aim: [hand(-0.21), hand(0.21)],
			render_begin: Time::from_millis(100),
			push: Time::from_millis(108),
			push_clock: Time::from_millis(40),
			wall_pipeline_offset: Time::from_millis(-3),
			..FrameRecord::new(17)
		};

		let bytes = record.to_bytes();
		assert!(bytes.len() <= MAX_EXTENSION_SIZE);
		assert_eq!(sender.stage(bytes.clone()).unwrap(), Staged::Pending);

		let mut packet = RtpPacket::new(1, 3000, Bytes::from_static(b"payload"));
		sender.take_and_embed(&mut packet).unwrap();

		clock.set(Time::from_secs(2));
		receiver.extract(&packet);

		// A different buffer than the packet that carried it.
		let mut buffer = MediaBuffer::new(3000, Bytes::from_static(b"decoded"));
		receiver.reattach(&mut buffer);

		let annotation = buffer.annotation.unwrap();
		assert_eq!(annotation.receive_time, Time::from_secs(2));
		assert_eq!(annotation.record, bytes);
		assert_eq!(FrameRecord::from_bytes(&annotation.record).unwrap(), record);
		assert_eq!(buffer.payload, Bytes::from_static(b"decoded"));
	}

	#[test]
	fn test_clear() {
		let (sidecar, _, _) = sidecar();
		sidecar.stage(Bytes::from_static(b"x")).unwrap();

		let mut packet = RtpPacket::default();
		packet.set_extension(1, Bytes::from_static(b"y")).unwrap();
		sidecar.extract(&packet);

		sidecar.clear();
		assert!(!sidecar.is_staged());
		assert!(!sidecar.is_holding());
	}

	#[test]
	fn test_closed() {
		let (sidecar, _, _) = sidecar();
		sidecar.stage(Bytes::from_static(b"x")).unwrap();

		let mut packet = RtpPacket::default();
		packet.set_extension(1, Bytes::from_static(b"y")).unwrap();
		sidecar.extract(&packet);

		sidecar.close();
		assert!(!sidecar.is_staged());
		assert!(!sidecar.is_holding());

		assert!(matches!(sidecar.stage(Bytes::from_static(b"z")), Err(Error::Closed)));
		assert!(!sidecar.extract(&packet));

		let mut out = RtpPacket::default();
		assert!(!sidecar.take_and_embed(&mut out).unwrap());
		assert!(out.extensions.is_empty());

		let mut buffer = MediaBuffer::default();
		assert!(!sidecar.reattach(&mut buffer));
		assert!(buffer.annotation.is_none());
	}
}

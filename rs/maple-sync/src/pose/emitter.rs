use crate::{
	DeviceConfig, FrameRecord, Time,
	record::{Pose, Quat, TrackingReport, Vec3},
};

use super::PoseHistory;

/// Produces the [FrameRecord] for each frame the server renders.
///
/// Sequence ids start at 1 and increase by one per frame.
#[derive(Debug)]
pub struct PoseEmitter {
	next: u64,
	eyes: [Pose; 2],
}

impl PoseEmitter {
	pub fn new(device: &DeviceConfig) -> Self {
		let half = device.ipd / 2.0;
		Self {
			next: 1,
			eyes: [
				Pose::new(Quat::IDENTITY, Vec3::new(-half, 0.0, 0.0)),
				Pose::new(Quat::IDENTITY, Vec3::new(half, 0.0, 0.0)),
			],
		}
	}

	/// Start a frame: predict the head pose for `display_time` and derive both eye views.
	///
	/// Controller poses are copied from the latest tracking report.
	pub fn begin(
		&mut self,
		history: &PoseHistory,
		tracking: Option<&TrackingReport>,
		display_time: Time,
		render_begin: Time,
	) -> FrameRecord {
		let sequence = self.next;
		self.next += 1;

		let head = history.predict(display_time);
		let views = match head {
			Some(head) => [Some(head.compose(&self.eyes[0])), Some(head.compose(&self.eyes[1]))],
			None => [None, None],
		};

		let mut record = FrameRecord {
			sequence,
			views,
			head,
			render_begin,
			..Default::default()
		};

		if let Some(tracking) = tracking {
			record.grip = tracking.grip;
			record.aim = tracking.aim;
		}

		record
	}

	/// Stamp the push time in both clocks, just before staging.
	pub fn finish(record: &mut FrameRecord, push: Time, push_clock: Time) {
		record.push = push;
		record.push_clock = push_clock;
		record.wall_pipeline_offset = push - push_clock;
	}

	/// The id the next frame will get.
	pub fn next_sequence(&self) -> u64 {
		self.next
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sequence() {
		let mut emitter = PoseEmitter::new(&DeviceConfig::default());
		let history = PoseHistory::default();

		let a = emitter.begin(&history, None, Time::ZERO, Time::ZERO);
		let b = emitter.begin(&history, None, Time::ZERO, Time::ZERO);
		assert_eq!(a.sequence, 1);
		assert_eq!(b.sequence, 2);
		assert_eq!(emitter.next_sequence(), 3);

		// No tracking yet, so no poses.
		assert!(!a.has_views());
		assert_eq!(a.head, None);
	}

	#[test]
	fn test_views() {
		let mut emitter = PoseEmitter::new(&DeviceConfig::default());
		let mut history = PoseHistory::default();
		history.push(Time::ZERO, Pose::new(Quat::IDENTITY, Vec3::new(0.0, 1.6, 0.0)));

		let tracking = TrackingReport {
			grip: [Some(Pose::IDENTITY), None],
			..Default::default()
		};

		let mut record = emitter.begin(&history, Some(&tracking), Time::from_millis(30), Time::from_millis(5));
		assert!(record.has_views());
		assert_eq!(record.grip[0], Some(Pose::IDENTITY));
		assert_eq!(record.render_begin, Time::from_millis(5));

		let [left, right] = record.views.map(|view| view.unwrap().position);
		assert!((right.x - left.x - 0.063).abs() < 1e-6);
		assert_eq!(left.y, 1.6);

		PoseEmitter::finish(&mut record, Time::from_millis(12), Time::from_millis(2));
		assert_eq!(record.push, Time::from_millis(12));
		assert_eq!(record.push_clock, Time::from_millis(2));
		assert_eq!(record.wall_pipeline_offset, Time::from_millis(10));

		// Views and controllers still fit in one extension element.
		assert!(record.to_bytes().len() <= crate::MAX_EXTENSION_SIZE);
	}
}

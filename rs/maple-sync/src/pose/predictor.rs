use std::collections::VecDeque;

use crate::{
	Time,
	record::{Pose, Quat},
};

/// Recent head poses, used to predict where the head will be when a frame is displayed.
///
/// Prediction extrapolates the last two samples at constant linear and angular velocity,
/// never further ahead than the horizon.
#[derive(Clone, Debug)]
pub struct PoseHistory {
	samples: VecDeque<(Time, Pose)>,
	capacity: usize,
	horizon: Time,
}

impl Default for PoseHistory {
	fn default() -> Self {
		Self::new(16, Time::from_millis(100))
	}
}

impl PoseHistory {
	pub fn new(capacity: usize, horizon: Time) -> Self {
		Self {
			samples: VecDeque::with_capacity(capacity),
			capacity: capacity.max(2),
			horizon,
		}
	}

	/// Add a sample. Samples not newer than the latest are ignored.
	pub fn push(&mut self, time: Time, pose: Pose) -> bool {
		if self.samples.back().is_some_and(|(last, _)| time <= *last) {
			return false;
		}

		if self.samples.len() == self.capacity {
			self.samples.pop_front();
		}

		self.samples.push_back((time, pose));
		true
	}

	pub fn latest(&self) -> Option<(Time, Pose)> {
		self.samples.back().copied()
	}

	pub fn len(&self) -> usize {
		self.samples.len()
	}

	pub fn is_empty(&self) -> bool {
		self.samples.is_empty()
	}

	pub fn clear(&mut self) {
		self.samples.clear();
	}

	/// The predicted pose at `at`, or None without any samples.
	pub fn predict(&self, at: Time) -> Option<Pose> {
		let mut recent = self.samples.iter().rev();
		let &(t1, p1) = recent.next()?;
		let Some(&(t0, p0)) = recent.next() else {
			return Some(p1);
		};

		let dt = (t1 - t0).as_nanos() as f32 / 1e9;
		let ahead = (at - t1).max(Time::ZERO).min(self.horizon);
		let ahead = ahead.as_nanos() as f32 / 1e9;

		let velocity = p1.position.sub(p0.position).scale(1.0 / dt);
		let position = p1.position.add(velocity.scale(ahead));

		let delta = p1.orientation.mul(p0.orientation.conjugate()).normalize();
		let omega = delta.to_rotation_vector().scale(1.0 / dt);
		let orientation = Quat::from_rotation_vector(omega.scale(ahead))
			.mul(p1.orientation)
			.normalize();

		Some(Pose { orientation, position })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::Vec3;

	fn at(x: f32) -> Pose {
		Pose::new(Quat::IDENTITY, Vec3::new(x, 1.6, 0.0))
	}

	#[test]
	fn test_empty() {
		assert_eq!(PoseHistory::default().predict(Time::ZERO), None);
	}

	#[test]
	fn test_single_sample() {
		let mut history = PoseHistory::default();
		history.push(Time::from_millis(10), at(1.0));
		assert_eq!(history.predict(Time::from_millis(50)), Some(at(1.0)));
	}

	#[test]
	fn test_linear() {
		let mut history = PoseHistory::default();
		history.push(Time::from_millis(0), at(0.0));
		history.push(Time::from_millis(10), at(0.1));

		// 10 m/s, 20ms ahead
		let pose = history.predict(Time::from_millis(30)).unwrap();
		assert!((pose.position.x - 0.3).abs() < 1e-4, "{pose:?}");
	}

	#[test]
	fn test_horizon() {
		let mut history = PoseHistory::new(4, Time::from_millis(50));
		history.push(Time::from_millis(0), at(0.0));
		history.push(Time::from_millis(10), at(0.1));

		let pose = history.predict(Time::from_secs(10)).unwrap();
		assert!((pose.position.x - 0.6).abs() < 1e-4, "{pose:?}");

		// Never predicts backwards.
		let pose = history.predict(Time::ZERO).unwrap();
		assert!((pose.position.x - 0.1).abs() < 1e-6, "{pose:?}");
	}

	#[test]
	fn test_angular() {
		let axis = Vec3::new(0.0, 1.0, 0.0);
		let mut history = PoseHistory::default();
		history.push(Time::from_millis(0), Pose::new(Quat::IDENTITY, Vec3::ZERO));
		history.push(Time::from_millis(10), Pose::new(Quat::from_axis_angle(axis, 0.1), Vec3::ZERO));

		let pose = history.predict(Time::from_millis(20)).unwrap();
		let angle = pose.orientation.to_rotation_vector();
		assert!((angle.y - 0.2).abs() < 1e-4, "{angle:?}");
	}

	#[test]
	fn test_out_of_order() {
		let mut history = PoseHistory::new(2, Time::from_millis(50));
		assert!(history.push(Time::from_millis(10), at(0.0)));
		assert!(!history.push(Time::from_millis(10), at(1.0)));
		assert!(!history.push(Time::from_millis(5), at(1.0)));
		assert!(history.push(Time::from_millis(20), at(1.0)));
		assert!(history.push(Time::from_millis(30), at(2.0)));
		assert_eq!(history.len(), 2);
		assert_eq!(history.latest(), Some((Time::from_millis(30), at(2.0))));
	}
}

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
	Time,
	coding::{Decode, DecodeError, Encode, Version},
};

use super::{HandJoints, Pose};

/// Client tracking state sampled once per display frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackingReport {
	/// The client's predicted display time this sample was located at.
	pub sample_time: Time,

	pub head: Option<Pose>,
	pub grip: [Option<Pose>; 2],
	pub aim: [Option<Pose>; 2],

	/// Analog inputs in `[0, 1]`, `[left, right]`.
	pub grip_value: [f32; 2],
	pub trigger_value: [f32; 2],

	pub hands: [Option<HandJoints>; 2],
}

/// Client-side timing for one received frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
	pub sequence: u64,
	pub decode_complete: Time,
	pub begin_frame: Time,
	pub display: Time,
}

impl FrameReport {
	pub fn decode_to_display(&self) -> Time {
		self.display - self.decode_complete
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
enum Kind {
	Tracking = 1,
	Frame = 2,
}

/// A message from the client to the server over the reliable side channel.
#[derive(Clone, Debug, PartialEq)]
pub enum UpMessage {
	Tracking(TrackingReport),
	Frame(FrameReport),
}

/// An [UpMessage] with its id.
#[derive(Clone, Debug, PartialEq)]
pub struct UpEnvelope {
	pub id: u64,
	pub message: UpMessage,
}

impl UpEnvelope {
	pub fn to_bytes(&self) -> Bytes {
		let mut buf = BytesMut::new();
		Version::CURRENT.encode(&mut buf, ());
		self.encode(&mut buf, Version::CURRENT);
		buf.freeze()
	}

	pub fn from_bytes(mut buf: &[u8]) -> Result<Self, DecodeError> {
		let version = Version::decode(&mut buf, ())?;
		let envelope = Self::decode(&mut buf, version)?;

		match buf.has_remaining() {
			true => Err(DecodeError::Long),
			false => Ok(envelope),
		}
	}
}

/// Hands out message ids, starting at 1.
#[derive(Debug)]
pub struct MessageIds(AtomicU64);

impl Default for MessageIds {
	fn default() -> Self {
		Self(AtomicU64::new(1))
	}
}

impl MessageIds {
	pub fn next(&self) -> u64 {
		self.0.fetch_add(1, Ordering::Relaxed)
	}

	pub fn wrap(&self, message: UpMessage) -> UpEnvelope {
		UpEnvelope {
			id: self.next(),
			message,
		}
	}
}

fn pose_bits(poses: &[&Option<Pose>]) -> u8 {
	poses
		.iter()
		.enumerate()
		.filter(|(_, pose)| pose.is_some())
		.fold(0, |acc, (i, _)| acc | (1 << i))
}

impl Encode<Version> for TrackingReport {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		let poses = [&self.head, &self.grip[0], &self.grip[1], &self.aim[0], &self.aim[1]];
		let hands = (self.hands[0].is_some() as u8) | ((self.hands[1].is_some() as u8) << 1);

		pose_bits(&poses).encode(w, version);
		hands.encode(w, version);
		self.sample_time.encode(w, version);

		for pose in poses.iter().copied().flatten() {
			pose.encode(w, version);
		}

		self.grip_value.encode(w, version);
		self.trigger_value.encode(w, version);

		for hand in self.hands.iter().flatten() {
			hand.encode(w, version);
		}
	}
}

impl Decode<Version> for TrackingReport {
	fn decode<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let bits = u8::decode(r, version)?;
		let hand_bits = u8::decode(r, version)?;
		if bits >> 5 != 0 || hand_bits >> 2 != 0 {
			return Err(DecodeError::InvalidValue);
		}

		let sample_time = Time::decode(r, version)?;

		let mut poses = [None; 5];
		for (i, pose) in poses.iter_mut().enumerate() {
			if bits & (1 << i) != 0 {
				*pose = Some(Pose::decode(r, version)?);
			}
		}

		let grip_value = <[f32; 2]>::decode(r, version)?;
		let trigger_value = <[f32; 2]>::decode(r, version)?;

		let mut hands = [None, None];
		for (i, hand) in hands.iter_mut().enumerate() {
			if hand_bits & (1 << i) != 0 {
				*hand = Some(HandJoints::decode(r, version)?);
			}
		}

		let [head, grip_left, grip_right, aim_left, aim_right] = poses;

		Ok(Self {
			sample_time,
			head,
			grip: [grip_left, grip_right],
			aim: [aim_left, aim_right],
			grip_value,
			trigger_value,
			hands,
		})
	}
}

impl<V: Copy> Encode<V> for FrameReport {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.sequence.encode(w, version);
		self.decode_complete.encode(w, version);
		self.begin_frame.encode(w, version);
		self.display.encode(w, version);
	}
}

impl<V: Copy> Decode<V> for FrameReport {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		Ok(Self {
			sequence: u64::decode(r, version)?,
			decode_complete: Time::decode(r, version)?,
			begin_frame: Time::decode(r, version)?,
			display: Time::decode(r, version)?,
		})
	}
}

impl Encode<Version> for UpEnvelope {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		let kind = match &self.message {
			UpMessage::Tracking(_) => Kind::Tracking,
			UpMessage::Frame(_) => Kind::Frame,
		};

		u8::from(kind).encode(w, version);
		self.id.encode(w, version);

		match &self.message {
			UpMessage::Tracking(report) => report.encode(w, version),
			UpMessage::Frame(report) => report.encode(w, version),
		}
	}
}

impl Decode<Version> for UpEnvelope {
	fn decode<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let kind = u8::decode(r, version)?;
		let kind = Kind::try_from(kind).map_err(|_| DecodeError::InvalidMessage(kind))?;
		let id = u64::decode(r, version)?;

		let message = match kind {
			Kind::Tracking => UpMessage::Tracking(TrackingReport::decode(r, version)?),
			Kind::Frame => UpMessage::Frame(FrameReport::decode(r, version)?),
		};

		Ok(Self { id, message })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::{Quat, Vec3};

	#[test]
	fn test_ids_start_at_one() {
		let ids = MessageIds::default();
		assert_eq!(ids.next(), 1);
		assert_eq!(ids.next(), 2);
	}

	#[test]
	fn test_frame_report() {
		let ids = MessageIds::default();
		let report = FrameReport {
			sequence: 99,
			decode_complete: Time::from_millis(10),
			begin_frame: Time::from_millis(12),
			display: Time::from_millis(25),
		};
		assert_eq!(report.decode_to_display(), Time::from_millis(15));

		let envelope = ids.wrap(UpMessage::Frame(report));
		assert_eq!(UpEnvelope::from_bytes(&envelope.to_bytes()).unwrap(), envelope);
	}

	#[test]
	fn test_tracking_report() {
		let mut hand = HandJoints::default();
		hand.joints_mut()[1].pose = Some(Pose::IDENTITY);

		let report = TrackingReport {
			sample_time: Time::from_millis(1234),
			head: Some(Pose::new(Quat::IDENTITY, Vec3::new(0.0, 1.7, 0.0))),
			grip: [Some(Pose::IDENTITY), None],
			aim: [None, Some(Pose::IDENTITY)],
			grip_value: [0.5, 0.0],
			trigger_value: [0.0, 1.0],
			hands: [Some(hand), None],
		};

		let envelope = UpEnvelope {
			id: 5,
			message: UpMessage::Tracking(report),
		};
		assert_eq!(UpEnvelope::from_bytes(&envelope.to_bytes()).unwrap(), envelope);
	}

	#[test]
	fn test_unknown_kind() {
		let mut bytes = MessageIds::default()
			.wrap(UpMessage::Frame(FrameReport::default()))
			.to_bytes()
			.to_vec();
		bytes[1] = 7;
		assert_eq!(UpEnvelope::from_bytes(&bytes), Err(DecodeError::InvalidMessage(7)));
	}
}

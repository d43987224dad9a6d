use bytes::{Buf, Bytes, BytesMut};

use crate::{
	Time,
	coding::{Decode, DecodeError, Encode, Version},
};

use super::{HandJoints, Pose};

// Presence bits, in encoding order.
const VIEW_LEFT: u16 = 1 << 0;
const VIEW_RIGHT: u16 = 1 << 1;
const HEAD: u16 = 1 << 2;
const GRIP_LEFT: u16 = 1 << 3;
const GRIP_RIGHT: u16 = 1 << 4;
const AIM_LEFT: u16 = 1 << 5;
const AIM_RIGHT: u16 = 1 << 6;
const HAND_LEFT: u16 = 1 << 7;
const HAND_RIGHT: u16 = 1 << 8;
const KNOWN: u16 = (1 << 9) - 1;

/// The metadata produced once per rendered frame and carried alongside it in the media stream.
///
/// Every pose is optional since tracking may be partial. `render_begin` and `push` are in the
/// sender's monotonic clock; see [crate::ClockTranslator] to bring them into receiver time.
/// `push_clock` is in the pipeline clock, which both ends share.
///
/// Arrays of two are indexed `[left, right]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameRecord {
	/// Strictly increasing per sender. Zero is reserved for "unset".
	pub sequence: u64,

	/// The eye poses the frame was rendered with.
	pub views: [Option<Pose>; 2],

	pub head: Option<Pose>,
	pub grip: [Option<Pose>; 2],
	pub aim: [Option<Pose>; 2],
	pub hands: [Option<HandJoints>; 2],

	/// When rendering of this frame began.
	pub render_begin: Time,

	/// When the encoded frame was pushed to the transport.
	pub push: Time,

	/// The same instant as `push`, read from the pipeline clock.
	pub push_clock: Time,

	/// The sender's `wallclock - pipeline_clock` at push time, or zero if unknown.
	pub wall_pipeline_offset: Time,
}

impl FrameRecord {
	pub fn new(sequence: u64) -> Self {
		Self {
			sequence,
			..Default::default()
		}
	}

	/// Both eye views are present.
	pub fn has_views(&self) -> bool {
		self.views.iter().all(Option::is_some)
	}

	/// Every present pose is finite, so the record will decode on the other end.
	pub fn is_finite(&self) -> bool {
		let poses = self.views.iter().chain([&self.head]).chain(&self.grip).chain(&self.aim);
		let hands = self.hands.iter().flatten().all(HandJoints::is_finite);

		hands && poses.flatten().all(Pose::is_finite)
	}

	fn presence(&self) -> u16 {
		let bits = [
			(self.views[0].is_some(), VIEW_LEFT),
			(self.views[1].is_some(), VIEW_RIGHT),
			(self.head.is_some(), HEAD),
			(self.grip[0].is_some(), GRIP_LEFT),
			(self.grip[1].is_some(), GRIP_RIGHT),
			(self.aim[0].is_some(), AIM_LEFT),
			(self.aim[1].is_some(), AIM_RIGHT),
			(self.hands[0].is_some(), HAND_LEFT),
			(self.hands[1].is_some(), HAND_RIGHT),
		];

		bits.iter().filter(|(present, _)| *present).fold(0, |acc, (_, bit)| acc | bit)
	}

	/// Serialize with a leading version byte.
	pub fn to_bytes(&self) -> Bytes {
		let mut buf = BytesMut::with_capacity(128);
		Version::CURRENT.encode(&mut buf, ());
		self.encode(&mut buf, Version::CURRENT);
		buf.freeze()
	}

	/// Parse a buffer produced by [Self::to_bytes]; trailing bytes are an error.
	pub fn from_bytes(mut buf: &[u8]) -> Result<Self, DecodeError> {
		let version = Version::decode(&mut buf, ())?;
		let record = Self::decode(&mut buf, version)?;

		match buf.has_remaining() {
			true => Err(DecodeError::Long),
			false => Ok(record),
		}
	}
}

fn encode_opt<T: Encode<Version>, W: bytes::BufMut>(value: &Option<T>, w: &mut W, version: Version) {
	if let Some(value) = value {
		value.encode(w, version);
	}
}

fn decode_opt<T: Decode<Version>, R: bytes::Buf>(
	flags: u16,
	bit: u16,
	r: &mut R,
	version: Version,
) -> Result<Option<T>, DecodeError> {
	match flags & bit {
		0 => Ok(None),
		_ => T::decode(r, version).map(Some),
	}
}

impl Encode<Version> for FrameRecord {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.presence().encode(w, version);
		self.sequence.encode(w, version);
		self.render_begin.encode(w, version);
		self.push.encode(w, version);
		self.push_clock.encode(w, version);
		self.wall_pipeline_offset.encode(w, version);

		for view in &self.views {
			encode_opt(view, w, version);
		}
		encode_opt(&self.head, w, version);
		for pose in self.grip.iter().chain(self.aim.iter()) {
			encode_opt(pose, w, version);
		}
		for hand in &self.hands {
			encode_opt(hand, w, version);
		}
	}
}

impl Decode<Version> for FrameRecord {
	fn decode<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let flags = u16::decode(r, version)?;
		if flags & !KNOWN != 0 {
			return Err(DecodeError::InvalidValue);
		}

		let sequence = u64::decode(r, version)?;
		let render_begin = Time::decode(r, version)?;
		let push = Time::decode(r, version)?;
		let push_clock = Time::decode(r, version)?;
		let wall_pipeline_offset = Time::decode(r, version)?;

		let views = [
			decode_opt(flags, VIEW_LEFT, r, version)?,
			decode_opt(flags, VIEW_RIGHT, r, version)?,
		];
		let head = decode_opt(flags, HEAD, r, version)?;
		let grip = [
			decode_opt(flags, GRIP_LEFT, r, version)?,
			decode_opt(flags, GRIP_RIGHT, r, version)?,
		];
		let aim = [
			decode_opt(flags, AIM_LEFT, r, version)?,
			decode_opt(flags, AIM_RIGHT, r, version)?,
		];
		let hands = [
			decode_opt(flags, HAND_LEFT, r, version)?,
			decode_opt(flags, HAND_RIGHT, r, version)?,
		];

		Ok(Self {
			sequence,
			views,
			head,
			grip,
			aim,
			hands,
			render_begin,
			push,
			push_clock,
			wall_pipeline_offset,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::{HandJoint, Quat, Vec3};

	fn pose(x: f32) -> Pose {
		Pose::new(Quat::new(0.0, 0.7071, 0.0, 0.7071), Vec3::new(x, 1.6, -0.25))
	}

	#[test]
	fn test_minimal() {
		let record = FrameRecord::new(7);
		let bytes = record.to_bytes();

		// version + flags + sequence + 4 timestamps
		assert_eq!(bytes.len(), 1 + 2 + 8 + 4 * 8);
		assert_eq!(FrameRecord::from_bytes(&bytes).unwrap(), record);
	}

	#[test]
	fn test_partial_tracking() {
		let record = FrameRecord {
			sequence: 42,
			views: [Some(pose(-0.032)), Some(pose(0.032))],
			head: Some(pose(0.0)),
			grip: [None, Some(pose(0.3))],
			aim: [Some(pose(-0.3)), None],
			render_begin: Time::from_millis(1_000),
			push: Time::from_millis(1_012),
			push_clock: Time::from_millis(40_012),
			wall_pipeline_offset: Time::from_secs(-5),
			..Default::default()
		};

		let decoded = FrameRecord::from_bytes(&record.to_bytes()).unwrap();
		assert_eq!(decoded, record);
		assert!(decoded.has_views());
		assert_eq!(decoded.grip[0], None);
	}

	#[test]
	fn test_hands() {
		let mut hand = HandJoints::default();
		hand.joints_mut()[3].pose = Some(pose(0.1));
		hand.joints_mut()[3].radius = 0.008;

		let record = FrameRecord {
			sequence: 1,
			hands: [None, Some(hand)],
			..Default::default()
		};

		assert_eq!(FrameRecord::from_bytes(&record.to_bytes()).unwrap(), record);
	}

	#[test]
	fn test_trailing_bytes() {
		let mut bytes = FrameRecord::new(1).to_bytes().to_vec();
		bytes.push(0);
		assert_eq!(FrameRecord::from_bytes(&bytes), Err(DecodeError::Long));
	}

	#[test]
	fn test_truncated() {
		let bytes = FrameRecord::new(1).to_bytes();
		assert_eq!(FrameRecord::from_bytes(&bytes[..10]), Err(DecodeError::Short));
	}

	#[test]
	fn test_unknown_version() {
		let mut bytes = FrameRecord::new(1).to_bytes().to_vec();
		bytes[0] = 9;
		assert_eq!(FrameRecord::from_bytes(&bytes), Err(DecodeError::Unsupported(9)));
	}

	#[test]
	fn test_unknown_flags() {
		let mut bytes = FrameRecord::new(1).to_bytes().to_vec();
		bytes[1] = 0x80;
		assert_eq!(FrameRecord::from_bytes(&bytes), Err(DecodeError::InvalidValue));
	}

	#[test]
	fn test_non_finite() {
		let mut record = FrameRecord::new(1);
		record.head = Some(pose(0.0));
		assert!(record.is_finite());

		record.aim[1] = Some(pose(f32::NAN));
		assert!(!record.is_finite());
		assert_eq!(FrameRecord::from_bytes(&record.to_bytes()), Err(DecodeError::InvalidValue));

		record.aim[1] = None;
		let mut hand = HandJoints::default();
		hand.joints_mut()[3] = HandJoint {
			pose: Some(pose(0.1)),
			radius: f32::INFINITY,
		};
		record.hands[0] = Some(hand);
		assert!(!record.is_finite());
	}
}

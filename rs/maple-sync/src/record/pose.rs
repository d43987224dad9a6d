use crate::coding::{Decode, DecodeError, Encode};

/// Number of tracked joints per hand.
pub const HAND_JOINT_COUNT: usize = 26;

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Vec3 {
	pub x: f32,
	pub y: f32,
	pub z: f32,
}

impl Vec3 {
	pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

	pub const fn new(x: f32, y: f32, z: f32) -> Self {
		Self { x, y, z }
	}

	pub fn add(self, rhs: Self) -> Self {
		Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
	}

	pub fn sub(self, rhs: Self) -> Self {
		Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
	}

	pub fn scale(self, s: f32) -> Self {
		Self::new(self.x * s, self.y * s, self.z * s)
	}

	pub fn cross(self, rhs: Self) -> Self {
		Self::new(
			self.y * rhs.z - self.z * rhs.y,
			self.z * rhs.x - self.x * rhs.z,
			self.x * rhs.y - self.y * rhs.x,
		)
	}

	pub fn length(self) -> f32 {
		(self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
	}

	pub fn is_finite(self) -> bool {
		self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
	}
}

/// A unit quaternion, `w` last.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Quat {
	pub x: f32,
	pub y: f32,
	pub z: f32,
	pub w: f32,
}

impl Default for Quat {
	fn default() -> Self {
		Self::IDENTITY
	}
}

impl Quat {
	pub fn is_finite(self) -> bool {
		[self.x, self.y, self.z, self.w].iter().all(|v| v.is_finite())
	}

	pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

	pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
		Self { x, y, z, w }
	}

	/// A rotation of `angle` radians around the unit `axis`.
	pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
		let (s, c) = (angle * 0.5).sin_cos();
		Self::new(axis.x * s, axis.y * s, axis.z * s, c)
	}

	/// A rotation vector: axis scaled by angle in radians.
	pub fn from_rotation_vector(v: Vec3) -> Self {
		let angle = v.length();
		if angle < f32::EPSILON {
			return Self::IDENTITY;
		}
		Self::from_axis_angle(v.scale(1.0 / angle), angle)
	}

	/// The inverse of [Self::from_rotation_vector], taking the shortest path.
	pub fn to_rotation_vector(self) -> Vec3 {
		let q = match self.w < 0.0 {
			true => Self::new(-self.x, -self.y, -self.z, -self.w),
			false => self,
		};

		let axis = Vec3::new(q.x, q.y, q.z);
		let s = axis.length();
		if s < f32::EPSILON {
			return Vec3::ZERO;
		}

		let angle = 2.0 * s.atan2(q.w);
		axis.scale(angle / s)
	}

	pub fn conjugate(self) -> Self {
		Self::new(-self.x, -self.y, -self.z, self.w)
	}

	pub fn mul(self, rhs: Self) -> Self {
		Self::new(
			self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
			self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
			self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
			self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
		)
	}

	pub fn normalize(self) -> Self {
		let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
		if len < f32::EPSILON {
			return Self::IDENTITY;
		}
		Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
	}

	pub fn rotate(self, v: Vec3) -> Vec3 {
		let u = Vec3::new(self.x, self.y, self.z);
		let t = u.cross(v).scale(2.0);
		v.add(t.scale(self.w)).add(u.cross(t))
	}
}

/// A rigid transform: orientation then position.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pose {
	pub orientation: Quat,
	pub position: Vec3,
}

impl Pose {
	pub const IDENTITY: Self = Self {
		orientation: Quat::IDENTITY,
		position: Vec3::ZERO,
	};

	pub const fn new(orientation: Quat, position: Vec3) -> Self {
		Self { orientation, position }
	}

	/// NaN and infinities cannot be decoded, so they must never be sent.
	pub fn is_finite(&self) -> bool {
		self.orientation.is_finite() && self.position.is_finite()
	}

	/// Apply `local`, expressed in this pose's space.
	pub fn compose(&self, local: &Pose) -> Pose {
		Pose {
			orientation: self.orientation.mul(local.orientation).normalize(),
			position: self.position.add(self.orientation.rotate(local.position)),
		}
	}
}

/// One tracked hand joint.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HandJoint {
	/// None when the runtime did not report a valid pose for this joint.
	pub pose: Option<Pose>,
	pub radius: f32,
}

/// All joints of one hand, indexed by joint id.
#[derive(Clone, Debug, PartialEq)]
pub struct HandJoints(pub Box<[HandJoint; HAND_JOINT_COUNT]>);

impl Default for HandJoints {
	fn default() -> Self {
		Self(Box::new([HandJoint::default(); HAND_JOINT_COUNT]))
	}
}

impl HandJoints {
	pub fn joints(&self) -> &[HandJoint; HAND_JOINT_COUNT] {
		&self.0
	}

	pub fn joints_mut(&mut self) -> &mut [HandJoint; HAND_JOINT_COUNT] {
		&mut self.0
	}

	/// Every present joint has a finite pose and radius.
	pub fn is_finite(&self) -> bool {
		self.0
			.iter()
			.filter_map(|joint| joint.pose.map(|pose| (pose, joint.radius)))
			.all(|(pose, radius)| pose.is_finite() && radius.is_finite())
	}

	fn presence(&self) -> u32 {
		self.0
			.iter()
			.enumerate()
			.filter(|(_, joint)| joint.pose.is_some())
			.fold(0, |mask, (i, _)| mask | (1 << i))
	}
}

impl<V: Copy> Encode<V> for Vec3 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.x.encode(w, version);
		self.y.encode(w, version);
		self.z.encode(w, version);
	}
}

impl<V: Copy> Decode<V> for Vec3 {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		Ok(Self::new(
			f32::decode(r, version)?,
			f32::decode(r, version)?,
			f32::decode(r, version)?,
		))
	}
}

impl<V: Copy> Encode<V> for Quat {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.x.encode(w, version);
		self.y.encode(w, version);
		self.z.encode(w, version);
		self.w.encode(w, version);
	}
}

impl<V: Copy> Decode<V> for Quat {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		Ok(Self::new(
			f32::decode(r, version)?,
			f32::decode(r, version)?,
			f32::decode(r, version)?,
			f32::decode(r, version)?,
		))
	}
}

impl<V: Copy> Encode<V> for Pose {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.orientation.encode(w, version);
		self.position.encode(w, version);
	}
}

impl<V: Copy> Decode<V> for Pose {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		let orientation = Quat::decode(r, version)?;
		let position = Vec3::decode(r, version)?;
		Ok(Self { orientation, position })
	}
}

// A presence mask followed by pose + radius for each present joint.
impl<V: Copy> Encode<V> for HandJoints {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.presence().encode(w, version);
		for joint in self.0.iter() {
			if let Some(pose) = &joint.pose {
				pose.encode(w, version);
				joint.radius.encode(w, version);
			}
		}
	}
}

impl<V: Copy> Decode<V> for HandJoints {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		let mask = u32::decode(r, version)?;
		if mask >> HAND_JOINT_COUNT != 0 {
			return Err(DecodeError::BoundsExceeded);
		}

		let mut hand = HandJoints::default();
		for (i, joint) in hand.0.iter_mut().enumerate() {
			if mask & (1 << i) != 0 {
				joint.pose = Some(Pose::decode(r, version)?);
				joint.radius = f32::decode(r, version)?;
			}
		}

		Ok(hand)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn approx(a: Vec3, b: Vec3) -> bool {
		a.sub(b).length() < 1e-5
	}

	#[test]
	fn test_rotate() {
		let q = Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), std::f32::consts::FRAC_PI_2);
		let v = q.rotate(Vec3::new(1.0, 0.0, 0.0));
		assert!(approx(v, Vec3::new(0.0, 0.0, -1.0)), "{v:?}");
	}

	#[test]
	fn test_rotation_vector() {
		let v = Vec3::new(0.1, -0.2, 0.3);
		let q = Quat::from_rotation_vector(v);
		assert!(approx(q.to_rotation_vector(), v));
		assert_eq!(Quat::IDENTITY.to_rotation_vector(), Vec3::ZERO);
	}

	#[test]
	fn test_compose() {
		let head = Pose::new(
			Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), std::f32::consts::PI),
			Vec3::new(0.0, 1.6, 0.0),
		);
		let eye = Pose::new(Quat::IDENTITY, Vec3::new(0.032, 0.0, 0.0));
		let view = head.compose(&eye);
		assert!(approx(view.position, Vec3::new(-0.032, 1.6, 0.0)), "{view:?}");
	}

	#[test]
	fn test_hand_presence() {
		let mut hand = HandJoints::default();
		hand.joints_mut()[0].pose = Some(Pose::IDENTITY);
		hand.joints_mut()[25].pose = Some(Pose::IDENTITY);
		hand.joints_mut()[25].radius = 0.01;

		let bytes = hand.encode_bytes(());
		// mask + 2 * (pose + radius)
		assert_eq!(bytes.len(), 4 + 2 * 32);

		let mut buf = bytes.clone();
		let decoded = HandJoints::decode(&mut buf, ()).unwrap();
		assert_eq!(decoded, hand);
	}

	#[test]
	fn test_hand_mask_out_of_range() {
		let mut buf: &[u8] = &(1u32 << 30).to_be_bytes();
		assert_eq!(HandJoints::decode(&mut buf, ()), Err(DecodeError::BoundsExceeded));
	}
}

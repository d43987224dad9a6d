use crate::coding::*;

use std::fmt;

/// The layout version written as the first byte of every record and report.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u8);

impl Version {
	pub const V1: Self = Self(1);

	/// The version written by this build.
	pub const CURRENT: Self = Self::V1;
}

impl Default for Version {
	fn default() -> Self {
		Self::CURRENT
	}
}

impl<V> Decode<V> for Version {
	/// Decode the version number, rejecting anything newer than we understand.
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		let v = u8::decode(r, version)?;
		match v {
			1 => Ok(Self(v)),
			_ => Err(DecodeError::Unsupported(v)),
		}
	}
}

impl<V> Encode<V> for Version {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.0.encode(w, version);
	}
}

impl fmt::Debug for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "v{}", self.0)
	}
}

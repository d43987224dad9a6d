use thiserror::Error;

/// Read the value from the buffer using the given version.
///
/// If [DecodeError::Short] is returned, the buffer was truncated.
pub trait Decode<V>: Sized {
	/// Decode the value from the given buffer.
	fn decode<B: bytes::Buf>(buf: &mut B, version: V) -> Result<Self, DecodeError>;
}

/// A decode error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("short buffer")]
	Short,

	#[error("long buffer")]
	Long,

	#[error("invalid message: {0:?}")]
	InvalidMessage(u8),

	#[error("invalid value")]
	InvalidValue,

	#[error("bounds exceeded")]
	BoundsExceeded,

	#[error("unsupported version: {0}")]
	Unsupported(u8),
}

impl<V> Decode<V> for bool {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		match u8::decode(r, version)? {
			0 => Ok(false),
			1 => Ok(true),
			_ => Err(DecodeError::InvalidValue),
		}
	}
}

impl<V> Decode<V> for u8 {
	fn decode<R: bytes::Buf>(r: &mut R, _: V) -> Result<Self, DecodeError> {
		match r.has_remaining() {
			true => Ok(r.get_u8()),
			false => Err(DecodeError::Short),
		}
	}
}

impl<V> Decode<V> for u16 {
	fn decode<R: bytes::Buf>(r: &mut R, _: V) -> Result<Self, DecodeError> {
		match r.remaining() >= 2 {
			true => Ok(r.get_u16()),
			false => Err(DecodeError::Short),
		}
	}
}

impl<V> Decode<V> for u32 {
	fn decode<R: bytes::Buf>(r: &mut R, _: V) -> Result<Self, DecodeError> {
		match r.remaining() >= 4 {
			true => Ok(r.get_u32()),
			false => Err(DecodeError::Short),
		}
	}
}

impl<V> Decode<V> for u64 {
	fn decode<R: bytes::Buf>(r: &mut R, _: V) -> Result<Self, DecodeError> {
		match r.remaining() >= 8 {
			true => Ok(r.get_u64()),
			false => Err(DecodeError::Short),
		}
	}
}

impl<V> Decode<V> for i64 {
	fn decode<R: bytes::Buf>(r: &mut R, _: V) -> Result<Self, DecodeError> {
		match r.remaining() >= 8 {
			true => Ok(r.get_i64()),
			false => Err(DecodeError::Short),
		}
	}
}

impl<V> Decode<V> for f32 {
	fn decode<R: bytes::Buf>(r: &mut R, _: V) -> Result<Self, DecodeError> {
		if r.remaining() < 4 {
			return Err(DecodeError::Short);
		}

		// NaN would poison every pose computation downstream.
		let v = r.get_f32();
		match v.is_finite() {
			true => Ok(v),
			false => Err(DecodeError::InvalidValue),
		}
	}
}

impl<V: Copy, T: Decode<V> + Default + Copy, const N: usize> Decode<V> for [T; N] {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		let mut out = [T::default(); N];
		for item in out.iter_mut() {
			*item = T::decode(r, version)?;
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_short() {
		let mut buf: &[u8] = &[0x01, 0x02, 0x03];
		assert_eq!(u32::decode(&mut buf, ()), Err(DecodeError::Short));
	}

	#[test]
	fn test_bool_invalid() {
		let mut buf: &[u8] = &[0x02];
		assert_eq!(bool::decode(&mut buf, ()), Err(DecodeError::InvalidValue));
	}

	#[test]
	fn test_f32_rejects_nan() {
		let bits = f32::NAN.to_be_bytes();
		let mut buf: &[u8] = &bits;
		assert_eq!(f32::decode(&mut buf, ()), Err(DecodeError::InvalidValue));
	}

	#[test]
	fn test_i64_negative() {
		let bytes = (-42i64).to_be_bytes();
		let mut buf: &[u8] = &bytes;
		assert_eq!(i64::decode(&mut buf, ()), Ok(-42));
	}
}

use crate::coding::{Decode, DecodeError, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("time overflow")]
pub struct TimeOverflow;

/// A signed nanosecond value in some clock domain.
///
/// The same type is used for instants (monotonic, pipeline running-time) and for the
/// deltas between them, since clock offsets and latencies can both be negative.
/// Which clock an instant belongs to is tracked by the field that holds it, not the type.
///
/// This is [std::time::Instant] and [std::time::Duration] merged into one type for simplicity.
#[derive(Clone, Default, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Time(i64);

impl Time {
	pub const ZERO: Self = Self(0);
	pub const MAX: Self = Self(i64::MAX);
	pub const MIN: Self = Self(i64::MIN);

	pub const fn from_nanos(nanos: i64) -> Self {
		Self(nanos)
	}

	pub const fn from_micros(micros: i64) -> Self {
		Self(micros.saturating_mul(1_000))
	}

	pub const fn from_millis(millis: i64) -> Self {
		Self(millis.saturating_mul(1_000_000))
	}

	pub const fn from_secs(secs: i64) -> Self {
		Self(secs.saturating_mul(1_000_000_000))
	}

	pub const fn as_nanos(self) -> i64 {
		self.0
	}

	/// Get the value as whole milliseconds, rounding toward zero.
	pub const fn as_millis(self) -> i64 {
		self.0 / 1_000_000
	}

	pub fn as_millis_f64(self) -> f64 {
		self.0 as f64 / 1_000_000.0
	}

	pub const fn as_secs(self) -> i64 {
		self.0 / 1_000_000_000
	}

	pub const fn is_zero(self) -> bool {
		self.0 == 0
	}

	pub const fn max(self, other: Self) -> Self {
		if self.0 > other.0 { self } else { other }
	}

	pub const fn min(self, other: Self) -> Self {
		if self.0 < other.0 { self } else { other }
	}

	pub const fn checked_add(self, rhs: Self) -> Result<Self, TimeOverflow> {
		match self.0.checked_add(rhs.0) {
			Some(v) => Ok(Self(v)),
			None => Err(TimeOverflow),
		}
	}

	pub const fn checked_sub(self, rhs: Self) -> Result<Self, TimeOverflow> {
		match self.0.checked_sub(rhs.0) {
			Some(v) => Ok(Self(v)),
			None => Err(TimeOverflow),
		}
	}

	pub const fn saturating_add(self, rhs: Self) -> Self {
		Self(self.0.saturating_add(rhs.0))
	}

	pub const fn saturating_sub(self, rhs: Self) -> Self {
		Self(self.0.saturating_sub(rhs.0))
	}

	/// Scale by a floating point factor, saturating at the bounds.
	pub fn mul_f64(self, factor: f64) -> Self {
		Self((self.0 as f64 * factor) as i64)
	}
}

impl TryFrom<std::time::Duration> for Time {
	type Error = TimeOverflow;

	fn try_from(duration: std::time::Duration) -> Result<Self, Self::Error> {
		match i64::try_from(duration.as_nanos()) {
			Ok(nanos) => Ok(Self(nanos)),
			Err(_) => Err(TimeOverflow),
		}
	}
}

impl std::fmt::Debug for Time {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let nanos = self.0;

		// Choose the largest unit where we don't need decimal places
		if nanos != 0 && nanos % 1_000_000_000 == 0 {
			write!(f, "{}s", nanos / 1_000_000_000)
		} else if nanos != 0 && nanos % 1_000_000 == 0 {
			write!(f, "{}ms", nanos / 1_000_000)
		} else if nanos != 0 && nanos % 1_000 == 0 {
			write!(f, "{}µs", nanos / 1_000)
		} else {
			write!(f, "{}ns", nanos)
		}
	}
}

impl std::ops::Add for Time {
	type Output = Self;

	fn add(self, rhs: Self) -> Self {
		self.saturating_add(rhs)
	}
}

impl std::ops::AddAssign for Time {
	fn add_assign(&mut self, rhs: Self) {
		*self = *self + rhs;
	}
}

impl std::ops::Sub for Time {
	type Output = Self;

	fn sub(self, rhs: Self) -> Self {
		self.saturating_sub(rhs)
	}
}

impl std::ops::SubAssign for Time {
	fn sub_assign(&mut self, rhs: Self) {
		*self = *self - rhs;
	}
}

impl std::ops::Neg for Time {
	type Output = Self;

	fn neg(self) -> Self {
		Self(self.0.saturating_neg())
	}
}

impl<V> Decode<V> for Time {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		Ok(Self(i64::decode(r, version)?))
	}
}

impl<V> Encode<V> for Time {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.0.encode(w, version)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_from_millis() {
		let time = Time::from_millis(5000);
		assert_eq!(time.as_secs(), 5);
		assert_eq!(time.as_millis(), 5000);
		assert_eq!(time.as_nanos(), 5_000_000_000);
	}

	#[test]
	fn test_negative() {
		let time = Time::from_millis(10) - Time::from_millis(25);
		assert!(time < Time::ZERO);
		assert_eq!(time.as_millis(), -15);
		assert_eq!(-time, Time::from_millis(15));
	}

	#[test]
	fn test_saturating() {
		assert_eq!(Time::MAX + Time::from_nanos(1), Time::MAX);
		assert_eq!(Time::MIN - Time::from_nanos(1), Time::MIN);
		assert_eq!(Time::MAX.checked_add(Time::from_nanos(1)), Err(TimeOverflow));
	}

	#[test]
	fn test_millis_f64() {
		assert_eq!(Time::from_millis(30).mul_f64(1.5), Time::from_millis(45));
		assert_eq!(Time::from_micros(2500).as_millis_f64(), 2.5);
	}

	#[test]
	fn test_duration() {
		let time = Time::try_from(std::time::Duration::from_millis(1500)).unwrap();
		assert_eq!(time, Time::from_millis(1500));
		assert_eq!(Time::try_from(std::time::Duration::MAX), Err(TimeOverflow));
	}

	#[test]
	fn test_debug() {
		assert_eq!(format!("{:?}", Time::from_secs(3)), "3s");
		assert_eq!(format!("{:?}", Time::from_millis(-20)), "-20ms");
		assert_eq!(format!("{:?}", Time::from_micros(1500)), "1500µs");
		assert_eq!(format!("{:?}", Time::from_nanos(7)), "7ns");
		assert_eq!(format!("{:?}", Time::ZERO), "0ns");
	}
}

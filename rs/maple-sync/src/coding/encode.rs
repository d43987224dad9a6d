use bytes::{Bytes, BytesMut};

/// Write the value to the buffer using the given version.
pub trait Encode<V>: Sized {
	/// Encode the value to the given writer.
	///
	/// This will panic if the [bytes::BufMut] does not have enough capacity.
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V);

	/// Encode the value into a [Bytes] buffer.
	///
	/// NOTE: This will allocate.
	fn encode_bytes(&self, v: V) -> Bytes {
		let mut buf = BytesMut::new();
		self.encode(&mut buf, v);
		buf.freeze()
	}
}

impl<V> Encode<V> for bool {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, _: V) {
		w.put_u8(*self as u8);
	}
}

impl<V> Encode<V> for u8 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, _: V) {
		w.put_u8(*self);
	}
}

impl<V> Encode<V> for u16 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, _: V) {
		w.put_u16(*self);
	}
}

impl<V> Encode<V> for u32 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, _: V) {
		w.put_u32(*self);
	}
}

impl<V> Encode<V> for u64 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, _: V) {
		w.put_u64(*self);
	}
}

impl<V> Encode<V> for i64 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, _: V) {
		w.put_i64(*self);
	}
}

impl<V> Encode<V> for f32 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, _: V) {
		w.put_f32(*self);
	}
}

impl<V: Copy, T: Encode<V>, const N: usize> Encode<V> for [T; N] {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		for item in self.iter() {
			item.encode(w, version);
		}
	}
}

//! The transport buffers the pad hooks observe.
//!
//! The media pipeline owns the real buffers; these traits are the only surface the
//! synchronization core touches. [RtpPacket] and [MediaBuffer] are in-memory implementations
//! used by tests, the simulator, and bindings that copy buffers across.

use bytes::Bytes;
use derive_more::Debug;

use crate::{Error, Time};

/// The largest payload of a two-byte header extension element (RFC 8285).
pub const MAX_EXTENSION_SIZE: usize = 255;

/// A transport packet with header extension elements.
pub trait ExtensionSlot {
	/// The data of the first extension element with the given id.
	fn extension(&self, id: u8) -> Option<Bytes>;

	/// Add an extension element.
	fn set_extension(&mut self, id: u8, data: Bytes) -> Result<(), Error>;
}

/// A reassembled buffer that can carry an out-of-band annotation.
pub trait Annotated {
	fn annotation(&self) -> Option<&Annotation>;
	fn set_annotation(&mut self, annotation: Annotation);
	fn take_annotation(&mut self) -> Option<Annotation>;
}

/// A record recovered from the packet extension, attached to the reassembled buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
	/// The serialized record, untouched.
	#[debug("{} bytes", record.len())]
	pub record: Bytes,

	/// Receiver monotonic time when the extension was extracted.
	pub receive_time: Time,
}

/// One two-byte header extension element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderExtension {
	pub id: u8,

	#[debug("{} bytes", data.len())]
	pub data: Bytes,
}

impl HeaderExtension {
	pub fn new(id: u8, data: Bytes) -> Result<Self, Error> {
		// Zero is padding in the two-byte form.
		if id == 0 {
			return Err(Error::InvalidExtensionId(id));
		}

		if data.len() > MAX_EXTENSION_SIZE {
			return Err(Error::RecordTooLarge {
				size: data.len(),
				max: MAX_EXTENSION_SIZE,
			});
		}

		Ok(Self { id, data })
	}
}

/// An RTP packet, reduced to the fields the pad hooks care about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RtpPacket {
	pub sequence: u16,
	pub timestamp: u32,

	/// Set on the last packet of a frame.
	pub marker: bool,

	pub extensions: Vec<HeaderExtension>,

	#[debug("{} bytes", payload.len())]
	pub payload: Bytes,
}

impl RtpPacket {
	pub fn new(sequence: u16, timestamp: u32, payload: Bytes) -> Self {
		Self {
			sequence,
			timestamp,
			payload,
			..Default::default()
		}
	}
}

impl ExtensionSlot for RtpPacket {
	fn extension(&self, id: u8) -> Option<Bytes> {
		self.extensions.iter().find(|ext| ext.id == id).map(|ext| ext.data.clone())
	}

	fn set_extension(&mut self, id: u8, data: Bytes) -> Result<(), Error> {
		let ext = HeaderExtension::new(id, data)?;
		self.extensions.push(ext);
		Ok(())
	}
}

/// A depacketized media buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaBuffer {
	/// RTP timestamp of the packets this buffer was assembled from.
	pub timestamp: u32,

	#[debug("{} bytes", payload.len())]
	pub payload: Bytes,

	pub annotation: Option<Annotation>,
}

impl MediaBuffer {
	pub fn new(timestamp: u32, payload: Bytes) -> Self {
		Self {
			timestamp,
			payload,
			annotation: None,
		}
	}
}

impl Annotated for MediaBuffer {
	fn annotation(&self) -> Option<&Annotation> {
		self.annotation.as_ref()
	}

	fn set_annotation(&mut self, annotation: Annotation) {
		self.annotation = Some(annotation);
	}

	fn take_annotation(&mut self) -> Option<Annotation> {
		self.annotation.take()
	}
}

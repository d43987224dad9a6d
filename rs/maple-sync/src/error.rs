use std::sync::Arc;

use crate::{TimeOverflow, coding::DecodeError};

#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
	#[error("closed")]
	Closed,

	#[error("record too large: {size} bytes > {max}")]
	RecordTooLarge { size: usize, max: usize },

	#[error("record has a non-finite pose")]
	NonFinite,

	#[error("invalid extension id: {0}")]
	InvalidExtensionId(u8),

	#[error("decode error: {0}")]
	Decode(#[from] DecodeError),

	#[error("pipeline error: {0}")]
	Pipeline(Arc<str>),

	#[error("property {element}.{property} rejected: {reason}")]
	Property {
		element: &'static str,
		property: &'static str,
		reason: Arc<str>,
	},

	#[error("spawn failed: {0}")]
	Spawn(Arc<std::io::Error>),

	#[error("invalid config: {0}")]
	Config(Arc<str>),

	#[error("timed out")]
	Timeout,

	#[error("time overflow")]
	TimeOverflow(#[from] TimeOverflow),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::Spawn(Arc::new(err))
	}
}

//! Slow control loops fed by measured latency.

mod bitrate;
mod jitter;

pub use bitrate::*;
pub use jitter::*;

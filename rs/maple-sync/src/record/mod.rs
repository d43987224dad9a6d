//! The records exchanged between client and server.
//!
//! - [FrameRecord]: server to client, one per video frame, carried in the packet extension.
//! - [UpEnvelope]: client to server over the side channel, tracking and frame timing.

mod frame;
mod pose;
mod report;

pub use frame::*;
pub use pose::*;
pub use report::*;

//! # maple-sync: frame and pose synchronization for XR streaming
//!
//! A server renders frames for a headset client and streams them as RTP video. Each frame
//! carries a small [FrameRecord] (the poses it was rendered with, and when) in a packet header
//! extension, so the client can match what it displays to what it predicted.
//!
//! The server side:
//! - [ServerSession::handle_up] ingests client tracking and frame timing reports.
//! - [ServerSession::begin_frame] predicts the head pose and builds the record.
//! - [ServerSession::push_frame] stamps and stages the record; [ServerSession::on_pay_input]
//!   embeds it into the next outgoing packet via the [Sidecar].
//! - [ServerSession::poll_control] picks an encoder bitrate tier from the reported latency.
//!
//! The client side:
//! - [ClientSession::on_depay_input] and [ClientSession::on_depay_output] carry the record
//!   across the depacketizer.
//! - [ClientSession::on_decoded] publishes each decoded frame to a single-slot [DeliveryBuffer].
//! - [ClientSession::try_take] hands the latest frame to the render loop and retunes the
//!   jitter buffer from the measured latency.
//!
//! Pipeline bus messages are dispatched on an [EventLoop] thread.

mod buffer;
mod clock;
mod config;
mod control;
mod delivery;
mod error;
mod latency;
mod pipeline;
mod pose;
mod session;
mod sidecar;
mod stats;
mod time;

pub mod coding;
pub mod record;

pub use buffer::*;
pub use clock::*;
pub use config::*;
pub use control::*;
pub use delivery::*;
pub use error::*;
pub use latency::*;
pub use pipeline::*;
pub use pose::*;
pub use record::FrameRecord;
pub use session::*;
pub use sidecar::*;
pub use stats::*;
pub use time::*;

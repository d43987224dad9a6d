//! Owned session contexts wiring the pad hooks, buffers and control loops together.
//!
//! Each session is constructed explicitly and shared with the pipeline threads via [Arc].
//! Notable changes are reported on an [Event] channel instead of callbacks.

mod client;
mod event_loop;
mod server;

pub use client::*;
pub use event_loop::*;
pub use server::*;

use std::{
	ops::ControlFlow,
	sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{BitrateDecision, BusMessage, Error, LatencyWindow, Pipeline, PipelineState, Time};

/// The signaling connection state, as reported to the application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ConnectionStatus {
	#[default]
	#[display("idle")]
	IdleNotConnected,
	#[display("connecting")]
	Connecting,
	#[display("websocket failed")]
	WebsocketFailed,
	#[display("negotiating")]
	Negotiating,
	#[display("connected, no data")]
	ConnectedNoData,
	#[display("connected")]
	Connected,
	#[display("disconnected: error")]
	DisconnectedError,
	#[display("disconnected: remote closed")]
	DisconnectedRemoteClose,
}

/// Something the application may want to react to.
#[derive(Clone, Debug)]
pub enum Event {
	Status(ConnectionStatus),
	State(PipelineState),

	/// A latency window was flushed.
	Latency(LatencyWindow),

	/// The jitter buffer depth was updated.
	JitterDepth(Time),

	/// The encoder bitrate tier was reevaluated.
	Bitrate(BitrateDecision),

	/// The pipeline failed; the session is finished.
	Error(Error),
}

/// The receiving end of a session's events.
///
/// Holds at most [EVENT_CAPACITY] undelivered events; newer ones are dropped until it is
/// drained. Dropping it is fine.
pub type Events = mpsc::Receiver<Event>;

/// Undelivered events kept per session.
pub const EVENT_CAPACITY: usize = 64;

fn next_id() -> u64 {
	static NEXT: AtomicU64 = AtomicU64::new(0);
	NEXT.fetch_add(1, Ordering::Relaxed)
}

// State shared by both session kinds.
struct Lifecycle {
	id: u64,
	state: Mutex<(PipelineState, ConnectionStatus)>,
	events: mpsc::Sender<Event>,
}

impl Lifecycle {
	fn new() -> (Self, Events) {
		let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
		let lifecycle = Self {
			id: next_id(),
			state: Mutex::new(Default::default()),
			events: tx,
		};
		(lifecycle, rx)
	}

	fn emit(&self, event: Event) {
		match self.events.try_send(event) {
			Err(mpsc::error::TrySendError::Full(event)) => {
				tracing::debug!(id = self.id, ?event, "event queue full, dropping event")
			}
			// Nobody listening is fine.
			Err(mpsc::error::TrySendError::Closed(_)) | Ok(()) => {}
		}
	}

	fn state(&self) -> PipelineState {
		self.state.lock().0
	}

	fn status(&self) -> ConnectionStatus {
		self.state.lock().1
	}

	/// Returns false if already in that state, or if a terminal state would be left.
	fn set_state(&self, next: PipelineState) -> bool {
		{
			let mut state = self.state.lock();
			if state.0 == next || state.0.is_terminal() {
				return false;
			}
			state.0 = next;
		}

		tracing::debug!(id = self.id, state = ?next, "pipeline state");
		self.emit(Event::State(next));
		true
	}

	fn set_status(&self, next: ConnectionStatus) {
		{
			let mut state = self.state.lock();
			if state.1 == next {
				return;
			}
			state.1 = next;
		}

		tracing::info!(id = self.id, status = %next, "connection status");
		self.emit(Event::Status(next));
	}

	/// Apply a bus message. `invalidate` runs once when the session reaches a terminal state.
	fn handle_bus(&self, message: BusMessage, pipeline: &dyn Pipeline, invalidate: impl FnOnce()) -> ControlFlow<()> {
		let terminal = match message {
			BusMessage::Error(err) => {
				tracing::error!(id = self.id, %err, "pipeline error");
				if self.set_state(PipelineState::Failed) {
					self.emit(Event::Error(Error::Pipeline(err)));
				}
				true
			}
			BusMessage::Eos => {
				tracing::info!(id = self.id, "end of stream");
				self.set_state(PipelineState::Stopped);
				true
			}
			BusMessage::Warning(warning) => {
				tracing::warn!(id = self.id, %warning, "pipeline warning");
				false
			}
			BusMessage::Latency => {
				tracing::debug!(id = self.id, "recalculating pipeline latency");
				pipeline.recalculate_latency();
				false
			}
			BusMessage::StateChanged(next) => {
				self.set_state(next);
				next.is_terminal()
			}
		};

		match terminal {
			true => {
				invalidate();
				ControlFlow::Break(())
			}
			false => ControlFlow::Continue(()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_events_bounded() {
		let (lifecycle, mut events) = Lifecycle::new();

		for _ in 0..EVENT_CAPACITY + 10 {
			lifecycle.emit(Event::JitterDepth(Time::from_millis(10)));
		}

		let mut received = 0;
		while events.try_recv().is_ok() {
			received += 1;
		}
		assert_eq!(received, EVENT_CAPACITY);

		// Room again once drained.
		lifecycle.set_status(ConnectionStatus::Connecting);
		assert!(matches!(events.try_recv(), Ok(Event::Status(ConnectionStatus::Connecting))));
	}

	#[test]
	fn test_events_dropped() {
		let (lifecycle, events) = Lifecycle::new();
		drop(events);

		assert!(lifecycle.set_state(PipelineState::Playing));
		assert_eq!(lifecycle.state(), PipelineState::Playing);
	}
}

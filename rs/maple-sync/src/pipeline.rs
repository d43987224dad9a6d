use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::Error;

/// The receive-side jitter buffer element and its depth property, in milliseconds.
pub const JITTER_ELEMENT: &str = "jitter";
pub const JITTER_LATENCY: &str = "latency";

/// The encoder element and its bitrate property, in kbit/s.
pub const ENCODER_ELEMENT: &str = "encoder";
pub const ENCODER_BITRATE: &str = "bitrate";

/// The external media pipeline, as seen by the control loops.
///
/// Implementations must tolerate calls from any thread while the pipeline is streaming.
pub trait Pipeline: Send + Sync + 'static {
	/// Set a numeric property on a named element. Setting the current value again is harmless.
	fn set_property(&self, element: &'static str, property: &'static str, value: i64) -> Result<(), Error>;

	/// Ask the pipeline to redistribute its end-to-end latency, after a latency message.
	fn recalculate_latency(&self) {}
}

impl<P: Pipeline + ?Sized> Pipeline for Arc<P> {
	fn set_property(&self, element: &'static str, property: &'static str, value: i64) -> Result<(), Error> {
		(**self).set_property(element, property, value)
	}

	fn recalculate_latency(&self) {
		(**self).recalculate_latency()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
	#[default]
	Idle,
	Playing,

	/// Stopped on request or end of stream. Every slot is invalid.
	Stopped,

	/// Stopped by a fatal pipeline error.
	Failed,
}

impl PipelineState {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Stopped | Self::Failed)
	}
}

/// Messages posted by the pipeline to its bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusMessage {
	Error(Arc<str>),
	Warning(Arc<str>),
	Eos,

	/// Some element's latency changed; the pipeline latency should be recalculated.
	Latency,

	StateChanged(PipelineState),
}

/// A property update observed by [RecordingPipeline].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyUpdate {
	pub element: &'static str,
	pub property: &'static str,
	pub value: i64,
}

/// A [Pipeline] that records what it was asked to do.
///
/// Used by tests and the simulator in place of a live pipeline.
#[derive(Clone, Default)]
pub struct RecordingPipeline {
	state: Arc<Mutex<Recorded>>,
}

#[derive(Default)]
struct Recorded {
	updates: Vec<PropertyUpdate>,
	values: HashMap<(&'static str, &'static str), i64>,
	recalculations: usize,
}

impl RecordingPipeline {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn updates(&self) -> Vec<PropertyUpdate> {
		self.state.lock().updates.clone()
	}

	/// The last value set for a property.
	pub fn value(&self, element: &'static str, property: &'static str) -> Option<i64> {
		self.state.lock().values.get(&(element, property)).copied()
	}

	pub fn recalculations(&self) -> usize {
		self.state.lock().recalculations
	}
}

impl Pipeline for RecordingPipeline {
	fn set_property(&self, element: &'static str, property: &'static str, value: i64) -> Result<(), Error> {
		let mut state = self.state.lock();
		state.updates.push(PropertyUpdate {
			element,
			property,
			value,
		});
		state.values.insert((element, property), value);
		Ok(())
	}

	fn recalculate_latency(&self) {
		self.state.lock().recalculations += 1;
	}
}

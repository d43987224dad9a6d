use std::{ops::ControlFlow, sync::Arc};

use parking_lot::Mutex;

use crate::{
	Annotated, Annotation, BusHandler, BusMessage, ClockTranslator, Clocks, DecodedFrame, Delivery, DeliveryBuffer,
	Error, ExtensionSlot, FrameRecord, JITTER_ELEMENT, JITTER_LATENCY, JitterController, LatencyEstimator, Metadata,
	NoopStats, Pipeline, PipelineState, Sidecar, Stats, SyncConfig, Time,
	record::{FrameReport, MessageIds, TrackingReport, UpEnvelope, UpMessage},
};

use super::{ConnectionStatus, Events, Lifecycle};

/// The receiving side of a stream: recovers records, measures latency, and hands frames to the
/// render loop.
///
/// Threading:
/// - [Self::on_depay_input], [Self::on_depay_output] and [Self::on_decoded] run on pipeline threads.
/// - [Self::try_take] and everything it drives run on the render thread.
/// - [BusHandler::handle] runs on the [crate::EventLoop] thread.
pub struct ClientSession<F> {
	lifecycle: Lifecycle,
	config: SyncConfig,

	sidecar: Sidecar,
	delivery: DeliveryBuffer<F>,
	translator: ClockTranslator,
	latency: LatencyEstimator,
	jitter: Mutex<JitterController>,
	ids: MessageIds,

	clocks: Clocks,
	pipeline: Arc<dyn Pipeline>,
	stats: Arc<dyn Stats>,
}

impl<F: Send + 'static> ClientSession<F> {
	pub fn new(config: SyncConfig, clocks: Clocks, pipeline: Arc<dyn Pipeline>) -> (Arc<Self>, Events) {
		Self::with_stats(config, clocks, pipeline, Arc::new(NoopStats))
	}

	pub fn with_stats(
		config: SyncConfig,
		clocks: Clocks,
		pipeline: Arc<dyn Pipeline>,
		stats: Arc<dyn Stats>,
	) -> (Arc<Self>, Events) {
		let (lifecycle, events) = Lifecycle::new();

		let sidecar = Sidecar::new(&config, clocks.wall.clone()).with_stats(stats.clone());
		let delivery = DeliveryBuffer::new(&config, clocks.wall.clone()).with_stats(stats.clone());
		let latency = LatencyEstimator::new(Time::try_from(config.latency_window).unwrap_or(Time::MAX));
		let jitter = Mutex::new(JitterController::new(&config));

		let session = Self {
			lifecycle,
			config,
			sidecar,
			delivery,
			translator: ClockTranslator::new(),
			latency,
			jitter,
			ids: MessageIds::default(),
			clocks,
			pipeline,
			stats,
		};

		(Arc::new(session), events)
	}

	pub fn id(&self) -> u64 {
		self.lifecycle.id
	}

	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	/// Mark the pipeline as playing and push the initial jitter buffer depth.
	#[tracing::instrument("client", skip_all, fields(id = self.lifecycle.id))]
	pub fn start(&self) -> Result<(), Error> {
		let depth = self.jitter.lock().depth();
		self.pipeline.set_property(JITTER_ELEMENT, JITTER_LATENCY, depth.as_millis())?;

		self.latency.start(self.clocks.wall.now());
		self.lifecycle.set_state(PipelineState::Playing);
		self.lifecycle.set_status(ConnectionStatus::ConnectedNoData);

		tracing::info!(?depth, "client session started");
		Ok(())
	}

	/// Depacketizer input hook: hold the record carried by this packet, if any.
	pub fn on_depay_input<P: ExtensionSlot + ?Sized>(&self, packet: &P) -> bool {
		self.sidecar.extract(packet)
	}

	/// Depacketizer output hook: attach the held record to the reassembled buffer.
	pub fn on_depay_output<B: Annotated + ?Sized>(&self, buffer: &mut B) -> bool {
		self.sidecar.reattach(buffer)
	}

	/// Decoder output: recover the record, account latency, and publish the frame.
	///
	/// Once stopped, the frame is dropped without touching its record.
	pub fn on_decoded(&self, frame: F, annotation: Option<Annotation>) -> Delivery {
		if self.delivery.is_closed() {
			return Delivery::Missing;
		}

		let decode_end = self.clocks.wall.now();
		let metadata = annotation.and_then(|annotation| self.recover(annotation));

		if metadata.is_some() && self.lifecycle.status() == ConnectionStatus::ConnectedNoData {
			self.lifecycle.set_status(ConnectionStatus::Connected);
		}

		self.delivery.publish(frame, metadata, decode_end)
	}

	// Decode the record and translate its timestamps. No locks are held here.
	fn recover(&self, annotation: Annotation) -> Option<Metadata> {
		let record = match FrameRecord::from_bytes(&annotation.record) {
			Ok(record) => record,
			Err(err) => {
				tracing::warn!(%err, "failed to decode frame record");
				return None;
			}
		};

		let wall = self.clocks.wall.now();
		let pipeline = self.clocks.pipeline.now();

		let mut metadata = Metadata::new(record, annotation.receive_time);
		let record = &metadata.record;

		let Some(offset) = self.translator.offset(wall, pipeline, record.wall_pipeline_offset) else {
			self.stats.latency_unavailable();
			tracing::trace!(sequence = record.sequence, "clock offset unknown, skipping latency");
			return Some(metadata);
		};

		let server_render_begin = ClockTranslator::translate(offset, record.render_begin);
		let server_push = ClockTranslator::translate(offset, record.push);

		if !record.push_clock.is_zero() {
			let latency = pipeline - record.push_clock;
			self.latency.record(latency);
			self.stats.latency_sampled();
			tracing::trace!(sequence = record.sequence, ?latency, "frame latency");
		}

		metadata.server_render_begin = Some(server_render_begin);
		metadata.server_push = Some(server_push);

		Some(metadata)
	}

	/// Render loop: take the latest frame, and run the latency control loop.
	///
	/// Returns [Error::Closed] once the pipeline stopped.
	pub fn try_take(&self) -> Result<Option<DecodedFrame<F>>, Error> {
		let frame = self.delivery.try_take()?;
		self.poll_control();
		Ok(frame)
	}

	/// Flush the latency window if due and retune the jitter buffer.
	pub fn poll_control(&self) {
		let now = self.clocks.wall.now();
		let Some(window) = self.latency.maybe_flush_window(now) else {
			return;
		};

		tracing::info!(average = ?window.average, max = ?window.max, samples = window.samples, "average frame latency");
		self.lifecycle.emit(super::Event::Latency(window));

		// Nothing was measured, so there is nothing to react to.
		if window.samples == 0 {
			return;
		}

		let depth = self.jitter.lock().update(window.average);
		if let Err(err) = self.pipeline.set_property(JITTER_ELEMENT, JITTER_LATENCY, depth.as_millis()) {
			tracing::warn!(%err, "failed to update jitter buffer depth");
			return;
		}

		tracing::debug!(?depth, "jitter buffer depth");
		self.lifecycle.emit(super::Event::JitterDepth(depth));
	}

	/// Install the offset from the external clock-sync channel.
	pub fn set_clock_offset(&self, offset: Time) {
		self.translator.set_authoritative(offset);
	}

	/// Build the timing report for a frame the application displayed.
	pub fn frame_report(&self, frame: &DecodedFrame<F>, display: Time) -> UpEnvelope {
		self.ids.wrap(UpMessage::Frame(FrameReport {
			sequence: frame.sequence(),
			decode_complete: frame.decode_end,
			begin_frame: frame.render_begin,
			display,
		}))
	}

	/// Wrap a tracking sample for the server.
	pub fn tracking_report(&self, report: TrackingReport) -> UpEnvelope {
		self.ids.wrap(UpMessage::Tracking(report))
	}

	pub fn set_status(&self, status: ConnectionStatus) {
		self.lifecycle.set_status(status);
	}

	pub fn status(&self) -> ConnectionStatus {
		self.lifecycle.status()
	}

	pub fn state(&self) -> PipelineState {
		self.lifecycle.state()
	}

	pub fn jitter_depth(&self) -> Time {
		self.jitter.lock().depth()
	}

	pub fn skipped(&self) -> u32 {
		self.delivery.skipped()
	}

	/// Stop the session: every slot is invalidated and the render loop should stop pulling.
	#[tracing::instrument("client", skip_all, fields(id = self.lifecycle.id))]
	pub fn stop(&self) {
		self.lifecycle.set_state(PipelineState::Stopped);
		self.invalidate();
		tracing::info!("client session stopped");
	}

	fn invalidate(&self) {
		self.delivery.close();
		self.sidecar.close();
		self.latency.reset();
	}
}

impl<F: Send + 'static> BusHandler for ClientSession<F> {
	fn handle(&self, message: BusMessage) -> ControlFlow<()> {
		let terminal = matches!(message, BusMessage::Error(_));
		let flow = self.lifecycle.handle_bus(message, self.pipeline.as_ref(), || self.invalidate());

		if terminal {
			self.lifecycle.set_status(ConnectionStatus::DisconnectedError);
		}

		flow
	}
}

use std::{ops::ControlFlow, sync::Arc};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
	BitrateController, BusHandler, BusMessage, Clocks, DeviceConfig, ENCODER_BITRATE, ENCODER_ELEMENT, Error,
	ExtensionSlot, FrameRecord, NoopStats, Pipeline, PipelineState, PoseEmitter, PoseHistory, Sidecar, Staged, Stats,
	SyncConfig, Time,
	record::{TrackingReport, UpEnvelope, UpMessage},
};

use super::{ConnectionStatus, Event, Events, Lifecycle};

/// The sending side of a stream: predicts poses, stamps each frame's record, and adapts the
/// encoder bitrate to what the client reports.
pub struct ServerSession {
	lifecycle: Lifecycle,
	device: DeviceConfig,

	sidecar: Sidecar,
	history: Mutex<PoseHistory>,
	tracking: Mutex<Option<TrackingReport>>,
	emitter: Mutex<PoseEmitter>,
	bitrate: Mutex<BitrateController>,

	clocks: Clocks,
	pipeline: Arc<dyn Pipeline>,
	stats: Arc<dyn Stats>,
}

impl ServerSession {
	pub fn new(
		config: SyncConfig,
		device: DeviceConfig,
		clocks: Clocks,
		pipeline: Arc<dyn Pipeline>,
	) -> (Arc<Self>, Events) {
		Self::with_stats(config, device, clocks, pipeline, Arc::new(NoopStats))
	}

	pub fn with_stats(
		config: SyncConfig,
		device: DeviceConfig,
		clocks: Clocks,
		pipeline: Arc<dyn Pipeline>,
		stats: Arc<dyn Stats>,
	) -> (Arc<Self>, Events) {
		let (lifecycle, events) = Lifecycle::new();

		let session = Self {
			lifecycle,
			sidecar: Sidecar::new(&config, clocks.wall.clone()).with_stats(stats.clone()),
			history: Default::default(),
			tracking: Default::default(),
			emitter: Mutex::new(PoseEmitter::new(&device)),
			bitrate: Mutex::new(BitrateController::new(&config)),
			device,
			clocks,
			pipeline,
			stats,
		};

		(Arc::new(session), events)
	}

	pub fn id(&self) -> u64 {
		self.lifecycle.id
	}

	pub fn device(&self) -> &DeviceConfig {
		&self.device
	}

	/// Mark the pipeline as playing and push the initial encoder bitrate.
	#[tracing::instrument("server", skip_all, fields(id = self.lifecycle.id))]
	pub fn start(&self) -> Result<(), Error> {
		let kbps = self.bitrate.lock().current();
		self.pipeline.set_property(ENCODER_ELEMENT, ENCODER_BITRATE, kbps.into())?;

		self.bitrate.lock().maybe_evaluate(self.clocks.wall.now());
		self.lifecycle.set_state(PipelineState::Playing);
		self.lifecycle.set_status(ConnectionStatus::ConnectedNoData);

		tracing::info!(kbps, "server session started");
		Ok(())
	}

	/// Apply a message from the client's side channel.
	pub fn handle_up(&self, message: &[u8]) -> Result<(), Error> {
		if self.state().is_terminal() {
			return Err(Error::Closed);
		}

		let envelope = UpEnvelope::from_bytes(message)?;
		tracing::trace!(id = envelope.id, "up message");

		match envelope.message {
			UpMessage::Tracking(report) => {
				if let Some(head) = report.head {
					if !self.history.lock().push(report.sample_time, head) {
						tracing::debug!(sample_time = ?report.sample_time, "out of order tracking sample");
					}
				}

				*self.tracking.lock() = Some(report);
				self.lifecycle.set_status(ConnectionStatus::Connected);
			}
			UpMessage::Frame(report) => {
				let latency = report.decode_to_display();
				tracing::trace!(sequence = report.sequence, ?latency, "frame report");
				self.bitrate.lock().observe(latency);
			}
		}

		Ok(())
	}

	/// The display time of the newest tracking sample, the natural target for the next frame.
	pub fn latest_sample_time(&self) -> Option<Time> {
		self.history.lock().latest().map(|(time, _)| time)
	}

	/// Start rendering a frame that will be displayed at `display_time`.
	pub fn begin_frame(&self, display_time: Time) -> FrameRecord {
		let render_begin = self.clocks.wall.now();
		let history = self.history.lock();
		let tracking = self.tracking.lock();

		self.emitter
			.lock()
			.begin(&history, tracking.as_ref(), display_time, render_begin)
	}

	/// The encoded frame is about to be pushed: stamp the record and stage it for the packetizer.
	///
	/// Returns [Error::NonFinite] for a record the client could not decode, and [Error::Closed]
	/// once stopped.
	pub fn push_frame(&self, mut record: FrameRecord) -> Result<Staged, Error> {
		if !record.is_finite() {
			tracing::error!(sequence = record.sequence, "frame record has a non-finite pose, dropped");
			return Err(Error::NonFinite);
		}

		PoseEmitter::finish(&mut record, self.clocks.wall.now(), self.clocks.pipeline.now());
		self.stage(record.to_bytes())
	}

	/// Stage an already serialized record.
	pub fn stage(&self, record: Bytes) -> Result<Staged, Error> {
		self.sidecar.stage(record)
	}

	/// Packetizer input hook: embed the staged record, if any.
	pub fn on_pay_input<P: ExtensionSlot + ?Sized>(&self, packet: &mut P) -> Result<bool, Error> {
		self.sidecar.take_and_embed(packet)
	}

	/// Reevaluate the encoder bitrate if the window elapsed.
	pub fn poll_control(&self) {
		let now = self.clocks.wall.now();
		let Some(decision) = self.bitrate.lock().maybe_evaluate(now) else {
			return;
		};

		tracing::debug!(kbps = decision.kbps, max = ?decision.max_latency, "bitrate window");

		if decision.changed {
			if let Err(err) = self.pipeline.set_property(ENCODER_ELEMENT, ENCODER_BITRATE, decision.kbps.into()) {
				tracing::warn!(%err, "failed to update encoder bitrate");
				return;
			}
			tracing::info!(kbps = decision.kbps, "encoder bitrate");
		}

		self.lifecycle.emit(Event::Bitrate(decision));
	}

	pub fn bitrate(&self) -> u32 {
		self.bitrate.lock().current()
	}

	pub fn next_sequence(&self) -> u64 {
		self.emitter.lock().next_sequence()
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

	pub fn stats(&self) -> &Arc<dyn Stats> {
		&self.stats
	}

	#[tracing::instrument("server", skip_all, fields(id = self.lifecycle.id))]
	pub fn stop(&self) {
		self.lifecycle.set_state(PipelineState::Stopped);
		self.invalidate();
		tracing::info!("server session stopped");
	}

	fn invalidate(&self) {
		self.sidecar.close();
		self.history.lock().clear();
		self.tracking.lock().take();
	}
}

impl BusHandler for ServerSession {
	fn handle(&self, message: BusMessage) -> ControlFlow<()> {
		let terminal = matches!(message, BusMessage::Error(_));
		let flow = self.lifecycle.handle_bus(message, self.pipeline.as_ref(), || self.invalidate());

		if terminal {
			self.lifecycle.set_status(ConnectionStatus::DisconnectedError);
		}

		flow
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		Clock, ManualClock, RecordingPipeline, RtpPacket,
		record::{FrameReport, MessageIds, Pose, Vec3},
	};

	struct Harness {
		session: Arc<ServerSession>,
		events: Events,
		wall: ManualClock,
		pipeline: RecordingPipeline,
	}

	fn harness() -> Harness {
		let wall = ManualClock::new(Time::from_secs(50));
		let pipeline_clock = ManualClock::new(Time::from_secs(20));
		let pipeline = RecordingPipeline::new();

		let (session, events) = ServerSession::new(
			SyncConfig::default(),
			DeviceConfig::default(),
			Clocks::manual(wall.clone(), pipeline_clock),
			Arc::new(pipeline.clone()),
		);

		Harness {
			session,
			events,
			wall,
			pipeline,
		}
	}

	fn tracking(ids: &MessageIds, at: Time, x: f32) -> Bytes {
		let report = TrackingReport {
			sample_time: at,
			head: Some(Pose::new(Default::default(), Vec3::new(x, 1.6, 0.0))),
			grip: [Some(Pose::IDENTITY), None],
			..Default::default()
		};
		ids.wrap(UpMessage::Tracking(report)).to_bytes()
	}

	fn frame_report(ids: &MessageIds, sequence: u64, latency: Time) -> Bytes {
		let report = FrameReport {
			sequence,
			decode_complete: Time::from_secs(1),
			begin_frame: Time::from_secs(1),
			display: Time::from_secs(1) + latency,
		};
		ids.wrap(UpMessage::Frame(report)).to_bytes()
	}

	#[test]
	fn test_frame_record() {
		let h = harness();
		h.session.start().unwrap();

		let ids = MessageIds::default();
		h.session.handle_up(&tracking(&ids, Time::from_secs(1), 0.0)).unwrap();
		assert_eq!(h.session.status(), ConnectionStatus::Connected);

		assert_eq!(h.session.latest_sample_time(), Some(Time::from_secs(1)));

		let record = h.session.begin_frame(Time::from_secs(1));
		assert_eq!(record.sequence, 1);
		assert!(record.has_views());
		assert_eq!(record.grip[0], Some(Pose::IDENTITY));
		assert_eq!(record.render_begin, Time::from_secs(50));

		h.wall.advance(Time::from_millis(4));
		assert_eq!(h.session.push_frame(record).unwrap(), Staged::Pending);

		let mut packet = RtpPacket::default();
		assert!(h.session.on_pay_input(&mut packet).unwrap());

		let record = FrameRecord::from_bytes(&packet.extension(1).unwrap()).unwrap();
		assert_eq!(record.push, Time::from_secs(50) + Time::from_millis(4));
		assert_eq!(record.push_clock, Time::from_secs(20));
		assert_eq!(record.wall_pipeline_offset, Time::from_secs(30) + Time::from_millis(4));

		// Nothing staged for the next packet.
		let mut packet = RtpPacket::default();
		assert!(!h.session.on_pay_input(&mut packet).unwrap());
		assert!(packet.extensions.is_empty());
	}

	#[test]
	fn test_without_tracking() {
		let h = harness();
		let record = h.session.begin_frame(Time::from_secs(1));
		assert!(!record.has_views());
		assert_eq!(h.session.next_sequence(), 2);
	}

	#[test]
	fn test_first_record_wins() {
		let h = harness();

		let first = h.session.begin_frame(Time::ZERO);
		let second = h.session.begin_frame(Time::ZERO);
		assert_eq!(h.session.push_frame(first).unwrap(), Staged::Pending);
		assert_eq!(h.session.push_frame(second).unwrap(), Staged::Dropped);

		let mut packet = RtpPacket::default();
		h.session.on_pay_input(&mut packet).unwrap();
		let record = FrameRecord::from_bytes(&packet.extension(1).unwrap()).unwrap();
		assert_eq!(record.sequence, 1);
	}

	#[test]
	fn test_oversized() {
		let h = harness();
		let err = h.session.stage(Bytes::from(vec![0u8; 256])).unwrap_err();
		assert!(matches!(err, Error::RecordTooLarge { size: 256, max: 255 }));
	}

	#[test]
	fn test_non_finite_rejected() {
		let h = harness();

		let mut record = h.session.begin_frame(Time::ZERO);
		record.head = Some(Pose::new(Default::default(), Vec3::new(f32::INFINITY, 1.6, 0.0)));
		assert!(matches!(h.session.push_frame(record), Err(Error::NonFinite)));

		let mut packet = RtpPacket::default();
		assert!(!h.session.on_pay_input(&mut packet).unwrap());
		assert!(packet.extensions.is_empty());
	}

	#[test]
	fn test_stopped_stages_nothing() {
		let h = harness();
		h.session.start().unwrap();
		h.session.stop();

		let record = h.session.begin_frame(Time::ZERO);
		assert!(matches!(h.session.push_frame(record), Err(Error::Closed)));

		let mut packet = RtpPacket::default();
		assert!(!h.session.on_pay_input(&mut packet).unwrap());
		assert!(packet.extensions.is_empty());

		let ids = MessageIds::default();
		assert!(matches!(
			h.session.handle_up(&tracking(&ids, Time::from_secs(1), 0.0)),
			Err(Error::Closed)
		));
		assert_eq!(h.session.latest_sample_time(), None);
	}

	#[test]
	fn test_bad_up_message() {
		let h = harness();
		assert!(matches!(h.session.handle_up(b"\x01"), Err(Error::Decode(_))));
	}

	#[test]
	fn test_bitrate_tiers() {
		let mut h = harness();
		h.session.start().unwrap();
		assert_eq!(h.pipeline.value(ENCODER_ELEMENT, ENCODER_BITRATE), Some(16384));

		let ids = MessageIds::default();
		h.session.handle_up(&frame_report(&ids, 1, Time::from_millis(40))).unwrap();
		h.session.handle_up(&frame_report(&ids, 2, Time::from_millis(250))).unwrap();
		h.session.handle_up(&frame_report(&ids, 3, Time::from_millis(60))).unwrap();

		h.session.poll_control();
		assert_eq!(h.session.bitrate(), 16384);

		h.wall.advance(Time::from_secs(5));
		h.session.poll_control();

		// The window's worst frame decides.
		assert_eq!(h.session.bitrate(), 4096);
		assert_eq!(h.pipeline.value(ENCODER_ELEMENT, ENCODER_BITRATE), Some(4096));

		let mut decision = None;
		while let Ok(event) = h.events.try_recv() {
			if let Event::Bitrate(d) = event {
				decision = Some(d);
			}
		}
		let decision = decision.unwrap();
		assert!(decision.changed);
		assert_eq!(decision.max_latency, Time::from_millis(250));

		// An empty window changes nothing.
		h.wall.advance(Time::from_secs(5));
		h.session.poll_control();
		assert_eq!(h.session.bitrate(), 4096);
		assert_eq!(h.pipeline.updates().len(), 2);
	}

	#[test]
	fn test_eos() {
		let h = harness();
		h.session.start().unwrap();
		h.session.begin_frame(Time::ZERO);
		h.session.push_frame(FrameRecord::new(9)).unwrap();

		assert!(h.session.handle(BusMessage::Eos).is_break());
		assert_eq!(h.session.state(), PipelineState::Stopped);

		let mut packet = RtpPacket::default();
		assert!(!h.session.on_pay_input(&mut packet).unwrap());
	}
}

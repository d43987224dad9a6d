use std::{sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use clap::Args;
use maple_sync::{
	Annotated, ClientSession, Clock, Clocks, Counters, CountersSnapshot, DeviceConfig, ENCODER_BITRATE,
	ENCODER_ELEMENT, Error, Event, EventLoop, Events, JITTER_ELEMENT, JITTER_LATENCY, MediaBuffer, MonotonicClock,
	RecordingPipeline, RtpPacket, RunningClock, ServerSession, Staged, SyncConfig, Time,
	record::{Pose, Quat, TrackingReport, Vec3},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use tokio::{
	sync::mpsc,
	time::{Instant, MissedTickBehavior},
};

/// RTP video clock rate.
const VIDEO_CLOCK_RATE: u32 = 90_000;

const PACKET_SIZE: usize = 1200;

#[derive(Args, Clone, Debug)]
pub struct LinkArgs {
	/// One-way delay of the simulated link.
	#[arg(long, default_value = "30ms", value_parser = humantime::parse_duration)]
	pub delay: Duration,

	/// Up to this much extra delay, picked at random per frame.
	#[arg(long, default_value = "20ms", value_parser = humantime::parse_duration)]
	pub jitter: Duration,

	/// Probability that each packet is lost.
	#[arg(long, default_value_t = 0.01)]
	pub loss: f64,

	/// How far the server's wall clock runs ahead of the client's.
	#[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
	pub skew: Duration,

	/// Seed the link's randomness for a reproducible run.
	#[arg(long)]
	pub seed: Option<u64>,
}

#[derive(Serialize)]
struct Summary {
	jitter_depth_ms: i64,
	bitrate_kbps: i64,
	server: CountersSnapshot,
	client: CountersSnapshot,
}

pub async fn simulate(sync: SyncConfig, device: DeviceConfig, link: LinkArgs, duration: Duration) -> anyhow::Result<()> {
	let interval = device.frame_interval();
	anyhow::ensure!(!interval.is_zero(), "refresh rate must be positive");
	anyhow::ensure!((0.0..=1.0).contains(&link.loss), "loss must be within 0..=1");

	let shutdown_timeout = sync.shutdown_timeout;

	// Both pipelines are slaved to one clock, while the wall clocks disagree.
	let pipeline_clock: Arc<dyn Clock> = Arc::new(RunningClock::start(MonotonicClock));
	let skew = Time::try_from(link.skew)?;

	let server_clocks = Clocks {
		wall: Arc::new(RunningClock::with_base(MonotonicClock, -skew)),
		pipeline: pipeline_clock.clone(),
	};
	let client_clocks = Clocks {
		wall: Arc::new(MonotonicClock),
		pipeline: pipeline_clock,
	};
	let client_wall = client_clocks.wall.clone();

	let server_pipeline = RecordingPipeline::new();
	let client_pipeline = RecordingPipeline::new();
	let server_stats = Counters::new();
	let client_stats = Counters::new();

	let (server, server_events) = ServerSession::with_stats(
		sync.clone(),
		device,
		server_clocks,
		Arc::new(server_pipeline.clone()),
		Arc::new(server_stats.clone()),
	);
	let (client, client_events) = ClientSession::<u64>::with_stats(
		sync,
		client_clocks,
		Arc::new(client_pipeline.clone()),
		Arc::new(client_stats.clone()),
	);

	let server_bus = EventLoop::spawn("server-bus", server.clone())?;
	let client_bus = EventLoop::spawn("client-bus", client.clone())?;

	tokio::spawn(log_events("server", server_events));
	tokio::spawn(log_events("client", client_events));

	server.start()?;
	client.start()?;

	let (down_tx, down_rx) = mpsc::unbounded_channel();
	let (up_tx, up_rx) = mpsc::unbounded_channel();

	let rng = match link.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_os_rng(),
	};
	let link = Link::new(link, rng, down_tx);

	tracing::info!(?duration, ?interval, "simulating");

	let run = async {
		tokio::try_join!(
			run_server(server.clone(), link, up_rx, interval),
			run_depay(client.clone(), down_rx),
			run_render(client.clone(), client_wall, up_tx, interval),
		)
	};

	tokio::select! {
		res = run => { res?; },
		_ = tokio::time::sleep(duration) => {},
	}

	let _ = server_bus.bus().send(maple_sync::BusMessage::Eos);
	let _ = client_bus.bus().send(maple_sync::BusMessage::Eos);

	if let Err(err) = server_bus.shutdown(shutdown_timeout) {
		tracing::warn!(%err, "server bus did not stop");
	}
	if let Err(err) = client_bus.shutdown(shutdown_timeout) {
		tracing::warn!(%err, "client bus did not stop");
	}

	server.stop();
	client.stop();

	let summary = Summary {
		jitter_depth_ms: client_pipeline.value(JITTER_ELEMENT, JITTER_LATENCY).unwrap_or_default(),
		bitrate_kbps: server_pipeline.value(ENCODER_ELEMENT, ENCODER_BITRATE).unwrap_or_default(),
		server: server_stats.snapshot(),
		client: client_stats.snapshot(),
	};

	print!("{}", toml::to_string_pretty(&summary)?);

	Ok(())
}

// Delivers packets after a delay, in order, dropping some.
struct Link {
	args: LinkArgs,
	rng: StdRng,
	tx: mpsc::UnboundedSender<RtpPacket>,
	last_arrival: Instant,
}

impl Link {
	fn new(args: LinkArgs, rng: StdRng, tx: mpsc::UnboundedSender<RtpPacket>) -> Self {
		Self {
			args,
			rng,
			tx,
			last_arrival: Instant::now(),
		}
	}

	fn packets(&mut self) -> usize {
		self.rng.random_range(1..=4)
	}

	fn send(&mut self, packets: Vec<RtpPacket>) {
		let loss = self.args.loss;
		let packets: Vec<_> = packets.into_iter().filter(|_| !self.rng.random_bool(loss)).collect();

		let jitter = self.args.jitter.as_micros() as u64;
		let extra = Duration::from_micros(self.rng.random_range(0..=jitter));

		let arrival = (Instant::now() + self.args.delay + extra).max(self.last_arrival);
		self.last_arrival = arrival;

		let tx = self.tx.clone();
		tokio::spawn(async move {
			tokio::time::sleep_until(arrival).await;
			for packet in packets {
				if tx.send(packet).is_err() {
					return;
				}
			}
		});
	}
}

async fn run_server(
	server: Arc<ServerSession>,
	mut link: Link,
	mut up: mpsc::UnboundedReceiver<Bytes>,
	interval: Duration,
) -> anyhow::Result<()> {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

	let step = (VIDEO_CLOCK_RATE as f64 * interval.as_secs_f64()) as u32;
	let mut timestamp = 0u32;
	let mut sequence = 0u16;

	loop {
		tokio::select! {
			Some(message) = up.recv() => {
				if let Err(err) = server.handle_up(&message) {
					tracing::warn!(%err, "invalid up message");
				}
			}
			_ = ticker.tick() => {
				let target = server.latest_sample_time().unwrap_or_default();
				let record = server.begin_frame(target);

				match server.push_frame(record) {
					Ok(Staged::Pending) => {}
					Ok(Staged::Dropped) => tracing::debug!("previous record still staged"),
					Err(err) => tracing::warn!(%err, "failed to stage record"),
				}

				let count = link.packets();
				let mut packets = Vec::with_capacity(count);

				for i in 0..count {
					let mut packet = RtpPacket::new(sequence, timestamp, Bytes::from(vec![0u8; PACKET_SIZE]));
					packet.marker = i + 1 == count;
					server.on_pay_input(&mut packet)?;

					sequence = sequence.wrapping_add(1);
					packets.push(packet);
				}

				link.send(packets);
				timestamp = timestamp.wrapping_add(step);

				server.poll_control();
			}
		}
	}
}

async fn run_depay(client: Arc<ClientSession<u64>>, mut down: mpsc::UnboundedReceiver<RtpPacket>) -> anyhow::Result<()> {
	let mut payload = BytesMut::new();
	let mut current = None;
	let mut frames = 0;

	while let Some(packet) = down.recv().await {
		// A lost marker: start over with the new frame.
		if current.is_some_and(|timestamp| timestamp != packet.timestamp) {
			payload.clear();
		}
		current = Some(packet.timestamp);

		client.on_depay_input(&packet);
		payload.extend_from_slice(&packet.payload);

		if !packet.marker {
			continue;
		}

		let mut buffer = MediaBuffer::new(packet.timestamp, payload.split().freeze());
		client.on_depay_output(&mut buffer);
		current = None;

		frames += 1;
		client.on_decoded(frames, buffer.take_annotation());
	}

	Ok(())
}

async fn run_render(
	client: Arc<ClientSession<u64>>,
	wall: Arc<dyn Clock>,
	up: mpsc::UnboundedSender<Bytes>,
	interval: Duration,
) -> anyhow::Result<()> {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

	let ahead = Time::try_from(interval)?.mul_f64(2.0);

	loop {
		ticker.tick().await;

		let now = wall.now();
		let display = now + ahead;

		let report = TrackingReport {
			sample_time: display,
			head: Some(head_pose(display)),
			..Default::default()
		};

		if up.send(client.tracking_report(report).to_bytes()).is_err() {
			return Ok(());
		}

		let frame = match client.try_take() {
			Ok(Some(frame)) => frame,
			Ok(None) => continue,
			Err(Error::Closed) => return Ok(()),
			Err(err) => return Err(err.into()),
		};

		tracing::trace!(sequence = frame.sequence(), delivery = ?frame.delivery, "render");

		if up.send(client.frame_report(&frame, display).to_bytes()).is_err() {
			return Ok(());
		}
	}
}

// Standing, slowly looking left and right.
fn head_pose(at: Time) -> Pose {
	let secs = at.as_millis_f64() / 1000.0;
	let yaw = (secs * 0.5).sin() as f32 * 0.5;
	Pose::new(Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), yaw), Vec3::new(0.0, 1.6, 0.0))
}

async fn log_events(side: &'static str, mut events: Events) {
	while let Some(event) = events.recv().await {
		match event {
			Event::JitterDepth(depth) => tracing::info!(side, ?depth, "jitter depth"),
			Event::Bitrate(decision) if decision.changed => {
				tracing::info!(side, kbps = decision.kbps, max = ?decision.max_latency, "bitrate")
			}
			Event::Error(err) => tracing::error!(side, %err, "session failed"),
			event => tracing::debug!(side, ?event, "event"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_simulate() {
		let link = LinkArgs {
			delay: Duration::from_millis(5),
			jitter: Duration::from_millis(5),
			loss: 0.1,
			skew: Duration::from_secs(5),
			seed: Some(7),
		};

		let sync = SyncConfig {
			shutdown_timeout: Duration::from_millis(500),
			..Default::default()
		};

		simulate(sync, DeviceConfig::default(), link, Duration::from_millis(300))
			.await
			.unwrap();
	}

	#[test]
	fn test_head_pose() {
		let pose = head_pose(Time::ZERO);
		assert_eq!(pose.position, Vec3::new(0.0, 1.6, 0.0));
	}
}

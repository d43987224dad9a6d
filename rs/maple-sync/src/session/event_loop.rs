use std::{
	ops::ControlFlow,
	sync::{Arc, mpsc as std_mpsc},
	thread::JoinHandle,
	time::Duration,
};

use tokio::sync::{mpsc, oneshot};

use crate::{BusMessage, Error};

/// Reacts to pipeline bus messages on the event loop thread.
pub trait BusHandler: Send + Sync + 'static {
	/// Handle one message. Returning [ControlFlow::Break] stops the loop.
	fn handle(&self, message: BusMessage) -> ControlFlow<()>;
}

impl<H: BusHandler + ?Sized> BusHandler for Arc<H> {
	fn handle(&self, message: BusMessage) -> ControlFlow<()> {
		(**self).handle(message)
	}
}

/// Posts messages to an [EventLoop] from any thread.
pub type Bus = mpsc::UnboundedSender<BusMessage>;

/// A background thread dispatching pipeline bus messages to a [BusHandler].
///
/// The loop ends when the handler breaks, every [Bus] is dropped, or [Self::shutdown] is called.
pub struct EventLoop {
	bus: Bus,
	quit: Option<oneshot::Sender<()>>,
	done: std_mpsc::Receiver<()>,
	thread: Option<JoinHandle<()>>,
}

impl EventLoop {
	pub fn spawn(name: &str, handler: impl BusHandler) -> Result<Self, Error> {
		let (bus, mut messages) = mpsc::unbounded_channel();
		let (quit, mut quit_rx) = oneshot::channel::<()>();
		let (done_tx, done) = std_mpsc::channel();

		let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;

		let thread = std::thread::Builder::new().name(name.into()).spawn(move || {
			runtime.block_on(async move {
				loop {
					tokio::select! {
						_ = &mut quit_rx => break,
						message = messages.recv() => {
							let Some(message) = message else { break };
							if handler.handle(message).is_break() {
								break;
							}
						}
					}
				}
			});

			tracing::debug!("event loop finished");
			let _ = done_tx.send(());
		})?;

		Ok(Self {
			bus,
			quit: Some(quit),
			done,
			thread: Some(thread),
		})
	}

	/// A handle for posting bus messages.
	pub fn bus(&self) -> Bus {
		self.bus.clone()
	}

	/// True once the loop thread has exited.
	pub fn is_finished(&self) -> bool {
		self.thread.as_ref().is_none_or(|thread| thread.is_finished())
	}

	/// Stop the loop and wait for the thread, but no longer than `timeout`.
	///
	/// On timeout the thread is detached and [Error::Timeout] is returned.
	pub fn shutdown(mut self, timeout: Duration) -> Result<(), Error> {
		if let Some(quit) = self.quit.take() {
			let _ = quit.send(());
		}

		match self.done.recv_timeout(timeout) {
			Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => self.join_thread(),
			Err(std_mpsc::RecvTimeoutError::Timeout) => {
				tracing::warn!(?timeout, "event loop did not stop in time, detaching");
				self.thread.take();
				Err(Error::Timeout)
			}
		}
	}

	/// Wait for the loop to end on its own, without asking it to stop.
	pub fn join(mut self) -> Result<(), Error> {
		self.join_thread()
	}

	fn join_thread(&mut self) -> Result<(), Error> {
		match self.thread.take().map(JoinHandle::join) {
			Some(Err(_)) => Err(Error::Pipeline("event loop panicked".into())),
			_ => Ok(()),
		}
	}
}

impl Drop for EventLoop {
	fn drop(&mut self) {
		if let Some(quit) = self.quit.take() {
			let _ = quit.send(());
		}
	}
}

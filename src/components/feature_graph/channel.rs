//! Message protocol between the layout engine and the main thread.
//!
//! ```text
//! main thread                          engine host
//! ───────────                          ───────────
//! Command::Init/Pin/AlphaTarget/...  ─▶ LayoutWorker::handle
//!                                       LayoutWorker::step (own timer)
//! SimulationChannel::poll           ◀─ Event::Tick { flat [x0,y0,x1,y1,..] }
//! ```
//!
//! Commands are unbounded (they are tiny and rare). Ticks go through a bounded
//! queue; when it is full the worker holds on to the newest frame only and
//! retries, so a stalled render loop never makes the queue grow.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, unbounded};
use thiserror::Error;

use super::config::SimulationConfig;
use super::layout::{LayoutEngine, LayoutInput};
use super::state::RenderState;
use super::types::{GraphData, Point2};

pub const EVENT_QUEUE_CAPACITY: usize = 4;

#[derive(Debug, Error)]
pub enum ChannelError {
	#[error("failed to spawn layout thread: {0}")]
	Spawn(#[from] std::io::Error),
	#[error("layout engine is not running")]
	NotRunning,
	#[error("layout engine disconnected")]
	Disconnected,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
	Init {
		input: LayoutInput,
		config: SimulationConfig,
	},
	Pin {
		index: usize,
		position: Option<Point2>,
	},
	AlphaTarget(f32),
	Restart,
	Config(SimulationConfig),
	Stop,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TickFrame {
	pub seq: u64,
	pub alpha: f32,
	pub positions: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
	Tick(TickFrame),
	Settled { alpha: f32 },
	Stopped,
}

/// Engine side of the protocol, independent of where it runs.
pub struct LayoutWorker {
	engine: Option<LayoutEngine>,
	events: Sender<Event>,
	pending: Option<TickFrame>,
	seq: u64,
	dirty: bool,
	stopped: bool,
	settled_reported: bool,
	coalesced: u64,
}

impl LayoutWorker {
	pub fn new(events: Sender<Event>) -> Self {
		Self {
			engine: None,
			events,
			pending: None,
			seq: 0,
			dirty: false,
			stopped: false,
			settled_reported: false,
			coalesced: 0,
		}
	}

	pub fn is_stopped(&self) -> bool {
		self.stopped
	}

	/// Frames dropped in favour of a newer one.
	pub fn coalesced(&self) -> u64 {
		self.coalesced
	}

	pub fn interval(&self) -> Duration {
		let ms = self
			.engine
			.as_ref()
			.map(|e| e.config().tick_interval_ms)
			.unwrap_or(16);
		Duration::from_millis(ms.max(1))
	}

	/// Whether the host should keep calling `step` on its timer.
	pub fn wants_tick(&self) -> bool {
		match &self.engine {
			Some(engine) if !self.stopped => {
				!engine.is_settled()
					|| self.dirty || self.pending.is_some()
					|| !self.settled_reported
			}
			_ => false,
		}
	}

	pub fn handle(&mut self, command: Command) {
		match command {
			Command::Init { input, config } => {
				log::debug!("layout init: {} nodes, {} links", input.nodes.len(), input.links.len());
				self.engine = Some(LayoutEngine::new(input, config));
				self.pending = None;
				self.seq = 0;
				self.dirty = true;
				self.stopped = false;
				self.settled_reported = false;
			}
			Command::Stop => {
				if !self.stopped {
					self.stopped = true;
					let _ = self.events.try_send(Event::Stopped);
				}
			}
			command => {
				let Some(engine) = self.engine.as_mut() else {
					log::debug!("layout command before init ignored: {command:?}");
					return;
				};
				match command {
					Command::Pin { index, position } => {
						self.dirty |= engine.pin(index, position);
					}
					Command::AlphaTarget(target) => engine.set_alpha_target(target),
					Command::Restart => engine.restart(),
					Command::Config(config) => engine.set_config(config),
					Command::Init { .. } | Command::Stop => unreachable!(),
				}
				self.settled_reported = false;
			}
		}
	}

	/// One timer tick: advance the simulation if it is warm and publish.
	pub fn step(&mut self) -> Result<(), ChannelError> {
		if self.stopped {
			return Ok(());
		}
		let Some(engine) = self.engine.as_mut() else {
			return Ok(());
		};
		if !engine.is_settled() || self.dirty {
			if !engine.is_settled() {
				engine.tick();
			}
			self.dirty = false;
			self.seq += 1;
			let frame = TickFrame {
				seq: self.seq,
				alpha: engine.alpha(),
				positions: engine.positions(),
			};
			if self.pending.replace(frame).is_some() {
				self.coalesced += 1;
			}
		}
		let alpha = engine.alpha();
		let settled = engine.is_settled();

		if let Some(frame) = self.pending.take() {
			match self.events.try_send(Event::Tick(frame)) {
				Ok(()) => {}
				Err(TrySendError::Full(Event::Tick(frame))) => self.pending = Some(frame),
				Err(TrySendError::Full(_)) => {}
				Err(TrySendError::Disconnected(_)) => return Err(ChannelError::Disconnected),
			}
		}

		if settled && self.pending.is_none() && !self.settled_reported {
			match self.events.try_send(Event::Settled { alpha }) {
				Ok(()) => self.settled_reported = true,
				Err(TrySendError::Full(_)) => {}
				Err(TrySendError::Disconnected(_)) => return Err(ChannelError::Disconnected),
			}
		}
		Ok(())
	}
}

#[cfg(not(target_arch = "wasm32"))]
fn run_thread(mut worker: LayoutWorker, commands: Receiver<Command>) {
	use crossbeam_channel::RecvTimeoutError;
	use std::time::Instant;

	let mut next_tick = Instant::now();
	'run: loop {
		loop {
			match commands.try_recv() {
				Ok(command) => worker.handle(command),
				Err(TryRecvError::Empty) => break,
				Err(TryRecvError::Disconnected) => break 'run,
			}
		}
		if worker.is_stopped() {
			break;
		}

		if worker.wants_tick() {
			let now = Instant::now();
			if now >= next_tick {
				if worker.step().is_err() {
					break;
				}
				next_tick = now + worker.interval();
			}
			match commands.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
				Ok(command) => worker.handle(command),
				Err(RecvTimeoutError::Timeout) => {}
				Err(RecvTimeoutError::Disconnected) => break,
			}
		} else {
			// settled: sleep until someone reheats us
			match commands.recv() {
				Ok(command) => {
					worker.handle(command);
					next_tick = Instant::now();
				}
				Err(_) => break,
			}
		}
	}
	log::debug!("layout thread exiting after {} coalesced frames", worker.coalesced());
}

enum Host {
	#[cfg(not(target_arch = "wasm32"))]
	Thread(std::thread::JoinHandle<()>),
	/// No OS threads on wasm32: the worker is stepped from the animation frame.
	#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
	Inline {
		worker: Box<LayoutWorker>,
		commands: Receiver<Command>,
	},
}

impl Host {
	#[cfg(not(target_arch = "wasm32"))]
	fn spawn(worker: LayoutWorker, commands: Receiver<Command>) -> Result<Self, ChannelError> {
		let handle = std::thread::Builder::new()
			.name("layout-engine".into())
			.spawn(move || run_thread(worker, commands))?;
		Ok(Host::Thread(handle))
	}

	#[cfg(target_arch = "wasm32")]
	fn spawn(worker: LayoutWorker, commands: Receiver<Command>) -> Result<Self, ChannelError> {
		Ok(Host::Inline {
			worker: Box::new(worker),
			commands,
		})
	}

	fn pump(&mut self) {
		if let Host::Inline { worker, commands } = self {
			while let Ok(command) = commands.try_recv() {
				worker.handle(command);
			}
			if worker.wants_tick() {
				if let Err(err) = worker.step() {
					// receiver gone, same exit as the thread host
					log::debug!("inline layout host stopping: {err}");
					worker.stopped = true;
				}
			}
		}
	}

	fn terminate(self) {
		match self {
			#[cfg(not(target_arch = "wasm32"))]
			Host::Thread(handle) => {
				if handle.join().is_err() {
					log::warn!("layout thread panicked before shutdown");
				}
			}
			Host::Inline { .. } => {}
		}
	}
}

struct LiveEngine {
	commands: Sender<Command>,
	events: Receiver<Event>,
	host: Host,
	node_count: usize,
}

/// What one `poll` observed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PollOutcome {
	/// Tick frames drained this call.
	pub ticks: usize,
	/// Latest alpha seen, if any tick arrived.
	pub alpha: Option<f32>,
	/// First tick with a finite node since `init`. Fires once.
	pub ready: bool,
	pub settled: bool,
	pub disconnected: bool,
}

/// Main-thread handle owning at most one live layout engine.
#[derive(Default)]
pub struct SimulationChannel {
	live: Option<LiveEngine>,
	ready: bool,
	last_seq: u64,
	alpha: f32,
	settled: bool,
}

impl SimulationChannel {
	/// Handle with no engine.
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts a fresh engine for `data`, tearing down the previous one first.
	pub fn init(&mut self, data: &GraphData, config: SimulationConfig) -> Result<(), ChannelError> {
		self.destroy();

		let (command_tx, command_rx) = unbounded();
		let (event_tx, event_rx) = bounded(EVENT_QUEUE_CAPACITY);
		let input = LayoutInput::from_graph(data);
		let node_count = input.nodes.len();
		self.alpha = config.initial_alpha;
		command_tx
			.send(Command::Init { input, config })
			.map_err(|_| ChannelError::Disconnected)?;

		let host = Host::spawn(LayoutWorker::new(event_tx), command_rx)?;
		self.live = Some(LiveEngine {
			commands: command_tx,
			events: event_rx,
			host,
			node_count,
		});
		self.ready = false;
		self.last_seq = 0;
		self.settled = false;
		log::info!("layout engine started for {node_count} nodes");
		Ok(())
	}

	/// True between `init` and `destroy`.
	pub fn is_live(&self) -> bool {
		self.live.is_some()
	}

	/// Nodes in the live engine, 0 without one.
	pub fn node_count(&self) -> usize {
		self.live.as_ref().map(|l| l.node_count).unwrap_or(0)
	}

	/// Alpha of the newest tick seen.
	pub fn alpha(&self) -> f32 {
		self.alpha
	}

	/// True once the engine reported it settled.
	pub fn is_settled(&self) -> bool {
		self.settled
	}

	fn send(&self, command: Command) -> Result<(), ChannelError> {
		let live = self.live.as_ref().ok_or(ChannelError::NotRunning)?;
		live.commands.send(command).map_err(|_| ChannelError::Disconnected)
	}

	/// `None` releases the node.
	pub fn pin(&self, index: usize, position: Option<Point2>) -> Result<(), ChannelError> {
		self.send(Command::Pin { index, position })
	}

	/// Sets how warm the layout is kept.
	pub fn set_alpha_target(&self, target: f32) -> Result<(), ChannelError> {
		self.send(Command::AlphaTarget(target))
	}

	/// Warms the layout for a drag.
	pub fn reheat(&self) -> Result<(), ChannelError> {
		self.set_alpha_target(SimulationConfig::REHEAT_TARGET)
	}

	/// Lets the layout cool down again.
	pub fn cool(&self) -> Result<(), ChannelError> {
		self.set_alpha_target(0.0)
	}

	/// Kicks alpha back up to `restart_alpha`.
	pub fn restart(&self) -> Result<(), ChannelError> {
		self.send(Command::Restart)
	}

	/// Hot-swaps the tunables.
	pub fn update_config(&self, config: SimulationConfig) -> Result<(), ChannelError> {
		self.send(Command::Config(config))
	}

	/// Halts ticking but keeps the engine alive.
	pub fn stop(&self) -> Result<(), ChannelError> {
		self.send(Command::Stop)
	}

	/// Drains every queued event and copies the newest positions into `state`.
	pub fn poll(&mut self, state: &mut RenderState) -> PollOutcome {
		let mut outcome = PollOutcome::default();
		let Some(live) = self.live.as_mut() else {
			return outcome;
		};
		live.host.pump();

		let mut latest: Option<TickFrame> = None;
		loop {
			match live.events.try_recv() {
				Ok(Event::Tick(frame)) => {
					if frame.seq <= self.last_seq {
						log::debug!("stale tick {} after {}", frame.seq, self.last_seq);
						continue;
					}
					self.last_seq = frame.seq;
					self.settled = false;
					outcome.ticks += 1;
					latest = Some(frame);
				}
				Ok(Event::Settled { alpha }) => {
					self.settled = true;
					self.alpha = alpha;
				}
				Ok(Event::Stopped) => {}
				Err(TryRecvError::Empty) => break,
				Err(TryRecvError::Disconnected) => {
					outcome.disconnected = true;
					break;
				}
			}
		}

		if let Some(frame) = latest {
			let finite = state.apply_positions(&frame.positions);
			self.alpha = frame.alpha;
			outcome.alpha = Some(frame.alpha);
			if !self.ready && finite > 0 {
				self.ready = true;
				outcome.ready = true;
			}
		}
		outcome.settled = self.settled;
		outcome
	}

	/// Graceful stop, then hard teardown. Safe to call any number of times.
	pub fn destroy(&mut self) {
		let Some(LiveEngine {
			commands,
			events,
			host,
			..
		}) = self.live.take()
		else {
			return;
		};
		if commands.send(Command::Stop).is_err() {
			log::debug!("layout engine already gone");
		}
		drop(commands);
		drop(events);
		host.terminate();
		log::info!("layout engine destroyed");
	}
}

impl Drop for SimulationChannel {
	fn drop(&mut self) {
		self.destroy();
	}
}

//! One-way capture of a stable layout for the 3D view.
//!
//! ```text
//! Unfrozen ──(alpha below stable / Settled / watchdog)──▶ Frozen
//! ```
//!
//! Once frozen the layout engine is destroyed and the snapshot never changes.

use std::f32::consts::TAU;
use std::sync::Arc;

use super::camera::BoundingSphere;
use super::channel::{PollOutcome, SimulationChannel};
use super::config::FreezeConfig;
use super::state::RenderState;
use super::types::{ColorToken, Node, NodeKind, Point2, ResolvedLink};

/// Depth spread of minor nodes around the major plane.
pub const MINOR_DEPTH: f32 = 60.0;
const GOLDEN: f32 = 0.618_034;
const FALLBACK_RING: f32 = 220.0;
const FALLBACK_SATELLITE: f32 = 45.0;

#[derive(Clone, Debug, PartialEq)]
pub struct FrozenNode {
	pub id: String,
	pub kind: NodeKind,
	pub group: String,
	pub radius: f32,
	pub color: ColorToken,
	pub position: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrozenGraph {
	nodes: Vec<FrozenNode>,
	links: Vec<ResolvedLink>,
}

impl FrozenGraph {
	/// Snapshots `nodes` at `positions`, lifting minors off the plane by a depth
	/// derived from their index.
	pub fn capture(nodes: &[Node], positions: &[Point2], links: &[ResolvedLink]) -> Arc<Self> {
		let nodes = nodes
			.iter()
			.zip(positions)
			.enumerate()
			.map(|(i, (node, p))| FrozenNode {
				id: node.id.clone(),
				kind: node.kind,
				group: node.group.clone(),
				radius: node.radius,
				color: node.color.clone(),
				position: [p.x, p.y, depth_of(node.kind, i)],
			})
			.collect::<Vec<_>>();
		let count = nodes.len();
		let links = links
			.iter()
			.filter(|l| l.source < count && l.target < count)
			.copied()
			.collect();
		Arc::new(Self { nodes, links })
	}

	pub fn nodes(&self) -> &[FrozenNode] {
		&self.nodes
	}

	pub fn links(&self) -> &[ResolvedLink] {
		&self.links
	}

	pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
		BoundingSphere::from_points(self.nodes.iter().map(|n| (n.position, n.radius)))
	}
}

fn depth_of(kind: NodeKind, index: usize) -> f32 {
	match kind {
		NodeKind::Major => 0.0,
		NodeKind::Minor => ((index as f32 * GOLDEN).fract() - 0.5) * MINOR_DEPTH,
	}
}

/// Ring of majors with each group's minors on a small ring around their major.
/// Used when the simulation never produced a layout.
pub fn fallback_layout(nodes: &[Node]) -> Vec<Point2> {
	let majors: Vec<usize> = (0..nodes.len())
		.filter(|&i| nodes[i].kind == NodeKind::Major)
		.collect();
	let mut out = vec![Point2::default(); nodes.len()];
	for (slot, &m) in majors.iter().enumerate() {
		let angle = TAU * slot as f32 / majors.len() as f32;
		let ring = if majors.len() == 1 { 0.0 } else { FALLBACK_RING };
		out[m] = Point2::new(ring * angle.cos(), ring * angle.sin());
	}

	// one satellite list per major, plus a last one for minors without a major
	let mut satellites: Vec<Vec<usize>> = vec![Vec::new(); majors.len() + 1];
	for i in (0..nodes.len()).filter(|&i| nodes[i].kind == NodeKind::Minor) {
		let slot = majors
			.iter()
			.position(|&m| nodes[m].group == nodes[i].group)
			.unwrap_or(majors.len());
		satellites[slot].push(i);
	}
	for (slot, members) in satellites.iter().enumerate() {
		let (anchor, r) = match majors.get(slot) {
			Some(&m) => (out[m], FALLBACK_SATELLITE),
			None => (Point2::default(), FALLBACK_RING * 0.5),
		};
		for (k, &i) in members.iter().enumerate() {
			let angle = TAU * k as f32 / members.len() as f32;
			out[i] = Point2::new(anchor.x + r * angle.cos(), anchor.y + r * angle.sin());
		}
	}
	out
}

/// Why the 3D view froze.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FreezeReason {
	/// Alpha dropped under `stable_alpha`.
	Stable,
	/// The engine reported it had settled.
	Settled,
	/// The watchdog expired first.
	Watchdog,
}

#[derive(Clone, Debug)]
enum Phase {
	Unfrozen { armed_at: Option<f64> },
	Frozen { graph: Arc<FrozenGraph>, reason: FreezeReason },
}

/// Decides when the 3D view stops following the simulation.
#[derive(Clone, Debug)]
pub struct FreezeController {
	phase: Phase,
	config: FreezeConfig,
}

impl FreezeController {
	/// Unarmed controller.
	pub fn new(config: FreezeConfig) -> Self {
		Self {
			phase: Phase::Unfrozen { armed_at: None },
			config,
		}
	}

	/// Starts the watchdog. Only the first call counts.
	pub fn arm(&mut self, now_ms: f64) {
		if let Phase::Unfrozen { armed_at } = &mut self.phase {
			armed_at.get_or_insert(now_ms);
		}
	}

	/// True after the freeze frame.
	pub fn is_frozen(&self) -> bool {
		matches!(self.phase, Phase::Frozen { .. })
	}

	/// The snapshot, once frozen.
	pub fn graph(&self) -> Option<&Arc<FrozenGraph>> {
		match &self.phase {
			Phase::Frozen { graph, .. } => Some(graph),
			Phase::Unfrozen { .. } => None,
		}
	}

	/// Which trigger froze the view.
	pub fn reason(&self) -> Option<FreezeReason> {
		match &self.phase {
			Phase::Frozen { reason, .. } => Some(*reason),
			Phase::Unfrozen { .. } => None,
		}
	}

	/// Feeds one frame's poll result. Returns the snapshot on the frame that
	/// freezes, `None` before and after.
	pub fn observe(
		&mut self,
		now_ms: f64,
		outcome: &PollOutcome,
		state: &RenderState,
		channel: &mut SimulationChannel,
	) -> Option<Arc<FrozenGraph>> {
		let Phase::Unfrozen { armed_at } = self.phase else {
			return None;
		};
		let placed = !state.nodes.is_empty() && state.nodes.iter().all(|n| n.position.is_some());

		let reason = if placed && outcome.settled {
			FreezeReason::Settled
		} else if placed && outcome.alpha.is_some_and(|a| a < self.config.stable_alpha) {
			FreezeReason::Stable
		} else if armed_at.is_some_and(|t| now_ms - t >= self.config.watchdog_ms) {
			FreezeReason::Watchdog
		} else {
			return None;
		};

		let positions: Vec<Point2> = if placed {
			state
				.nodes
				.iter()
				.filter_map(|n| n.position)
				.collect()
		} else {
			log::warn!("layout never stabilised, freezing fallback ring layout");
			fallback_layout(&state.nodes)
		};
		if reason == FreezeReason::Watchdog && placed {
			log::warn!("freeze watchdog fired, keeping last simulated positions");
		}

		let graph = FrozenGraph::capture(&state.nodes, &positions, &state.links);
		channel.destroy();
		log::info!("graph frozen ({reason:?}) with {} nodes", graph.nodes().len());
		self.phase = Phase::Frozen {
			graph: Arc::clone(&graph),
			reason,
		};
		Some(graph)
	}
}

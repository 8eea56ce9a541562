//! Force-directed layout with alpha cooling.
//!
//! Forces per tick, all scaled by alpha:
//! - many-body repulsion between every pair (O(n²), fine for a few hundred nodes)
//! - springs along links with per-kind rest length and stiffness
//! - pull toward the origin
//! - collision separation proportional to radii
//!
//! Pinned nodes still push and pull on others but never move.

use std::f32::consts::PI;

use super::config::SimulationConfig;
use super::types::{GraphData, LinkKind, Point2};

const INITIAL_RADIUS: f32 = 10.0;
const MIN_DISTANCE_SQ: f32 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct SimNode {
	pub radius: f32,
	pub position: Option<Point2>,
	pub pinned: Option<Point2>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimLink {
	pub source: usize,
	pub target: usize,
	pub kind: LinkKind,
}

/// Numeric payload handed to the engine; ids are already resolved to indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutInput {
	/// Bodies in node order.
	pub nodes: Vec<SimNode>,
	/// Out-of-range endpoints are dropped by the engine.
	pub links: Vec<SimLink>,
}

impl LayoutInput {
	/// Strips a graph down to radii, positions and resolved links.
	pub fn from_graph(data: &GraphData) -> Self {
		Self {
			nodes: data
				.nodes
				.iter()
				.map(|n| SimNode {
					radius: n.radius,
					position: n.position,
					pinned: n.pinned,
				})
				.collect(),
			links: data
				.resolved_links()
				.into_iter()
				.map(|l| SimLink {
					source: l.source,
					target: l.target,
					kind: l.kind,
				})
				.collect(),
		}
	}
}

#[derive(Clone, Debug)]
struct Body {
	x: f32,
	y: f32,
	vx: f32,
	vy: f32,
	radius: f32,
	pinned: Option<Point2>,
}

/// Owns the bodies and steps them one tick at a time.
pub struct LayoutEngine {
	bodies: Vec<Body>,
	links: Vec<SimLink>,
	/// Source-side share of each link's correction, from endpoint degrees.
	bias: Vec<f32>,
	config: SimulationConfig,
	alpha: f32,
	alpha_target: f32,
	jiggle_state: u32,
	ticks: u64,
}

impl LayoutEngine {
	/// Nodes without a usable position are seeded on a phyllotaxis spiral.
	pub fn new(input: LayoutInput, config: SimulationConfig) -> Self {
		let golden = PI * (3.0 - 5.0f32.sqrt());
		let bodies = input
			.nodes
			.iter()
			.enumerate()
			.map(|(i, node)| {
				let seeded = node.pinned.or(node.position).filter(Point2::is_finite).unwrap_or_else(|| {
					let radius = INITIAL_RADIUS * (0.5 + i as f32).sqrt();
					let angle = i as f32 * golden;
					Point2::new(radius * angle.cos(), radius * angle.sin())
				});
				Body {
					x: seeded.x,
					y: seeded.y,
					vx: 0.0,
					vy: 0.0,
					radius: node.radius,
					pinned: node.pinned,
				}
			})
			.collect::<Vec<_>>();

		let links: Vec<SimLink> = input
			.links
			.into_iter()
			.filter(|l| l.source < bodies.len() && l.target < bodies.len())
			.collect();
		let mut degree = vec![0u32; bodies.len()];
		for link in &links {
			degree[link.source] += 1;
			degree[link.target] += 1;
		}
		let bias = links
			.iter()
			.map(|l| {
				let (s, t) = (degree[l.source] as f32, degree[l.target] as f32);
				s / (s + t)
			})
			.collect();

		Self {
			bodies,
			links,
			bias,
			alpha: config.initial_alpha,
			alpha_target: config.alpha_target,
			config,
			jiggle_state: 0x9e37_79b9,
			ticks: 0,
		}
	}

	/// Number of bodies.
	pub fn len(&self) -> usize {
		self.bodies.len()
	}

	/// True with no bodies.
	pub fn is_empty(&self) -> bool {
		self.bodies.is_empty()
	}

	/// Current temperature.
	pub fn alpha(&self) -> f32 {
		self.alpha
	}

	/// Temperature alpha decays toward.
	pub fn alpha_target(&self) -> f32 {
		self.alpha_target
	}

	/// Ticks run since construction or the last restart.
	pub fn ticks(&self) -> u64 {
		self.ticks
	}

	/// Active tunables.
	pub fn config(&self) -> &SimulationConfig {
		&self.config
	}

	/// True once alpha has cooled below `alpha_min` and nothing keeps it warm.
	pub fn is_settled(&self) -> bool {
		self.alpha < self.config.alpha_min && self.alpha_target < self.config.alpha_min
	}

	/// Position of one body.
	pub fn position(&self, index: usize) -> Option<Point2> {
		self.bodies.get(index).map(|b| Point2::new(b.x, b.y))
	}

	/// Keeps the layout warm while above `alpha_min`.
	pub fn set_alpha_target(&mut self, target: f32) {
		self.alpha_target = target.max(0.0);
	}

	/// Re-energize without touching positions.
	pub fn restart(&mut self) {
		self.alpha = self.config.restart_alpha;
	}

	/// Swaps tunables without touching positions.
	pub fn set_config(&mut self, config: SimulationConfig) {
		// a live reheat survives a swap that leaves the configured target alone
		if config.alpha_target != self.config.alpha_target {
			self.alpha_target = config.alpha_target;
		}
		self.config = config;
	}

	/// Sets or clears the pinned position. Returns false for an unknown index.
	pub fn pin(&mut self, index: usize, position: Option<Point2>) -> bool {
		let Some(body) = self.bodies.get_mut(index) else {
			return false;
		};
		body.pinned = position;
		if let Some(p) = position {
			body.x = p.x;
			body.y = p.y;
			body.vx = 0.0;
			body.vy = 0.0;
		}
		true
	}

	/// Flat `[x0, y0, x1, y1, ...]` copy in node order.
	pub fn write_positions(&self, out: &mut Vec<f32>) {
		out.clear();
		out.reserve(self.bodies.len() * 2);
		for body in &self.bodies {
			out.push(body.x);
			out.push(body.y);
		}
	}

	/// Flat `[x0, y0, x1, y1, ...]` in node order.
	pub fn positions(&self) -> Vec<f32> {
		let mut out = Vec::new();
		self.write_positions(&mut out);
		out
	}

	/// Applies every force once, then integrates.
	pub fn tick(&mut self) {
		self.alpha += (self.alpha_target - self.alpha) * self.config.alpha_decay;
		self.ticks += 1;

		self.apply_links();
		self.apply_charge();
		self.apply_center();
		self.apply_collision();

		let keep = 1.0 - self.config.velocity_decay;
		for body in &mut self.bodies {
			if let Some(p) = body.pinned {
				body.x = p.x;
				body.y = p.y;
				body.vx = 0.0;
				body.vy = 0.0;
			} else {
				body.vx *= keep;
				body.vy *= keep;
				body.x += body.vx;
				body.y += body.vy;
			}
		}
	}

	fn jiggle(&mut self) -> f32 {
		// xorshift32, so coincident nodes separate the same way every run
		let mut s = self.jiggle_state;
		s ^= s << 13;
		s ^= s >> 17;
		s ^= s << 5;
		self.jiggle_state = s;
		((s as f32 / u32::MAX as f32) - 0.5) * 1e-6
	}

	fn apply_links(&mut self) {
		for i in 0..self.links.len() {
			let link = self.links[i];
			let (s, t) = (link.source, link.target);
			if s == t {
				continue;
			}
			let mut dx = self.bodies[t].x + self.bodies[t].vx - self.bodies[s].x - self.bodies[s].vx;
			let mut dy = self.bodies[t].y + self.bodies[t].vy - self.bodies[s].y - self.bodies[s].vy;
			if dx == 0.0 {
				dx = self.jiggle();
			}
			if dy == 0.0 {
				dy = self.jiggle();
			}
			let len = (dx * dx + dy * dy).sqrt();
			let rest = self.config.link_distance * link.kind.distance_factor();
			let stiffness = self.config.link_stiffness * link.kind.stiffness_factor();
			let k = (len - rest) / len * self.alpha * stiffness;
			let (fx, fy) = (dx * k, dy * k);
			let bias = self.bias[i];
			self.bodies[t].vx -= fx * bias;
			self.bodies[t].vy -= fy * bias;
			self.bodies[s].vx += fx * (1.0 - bias);
			self.bodies[s].vy += fy * (1.0 - bias);
		}
	}

	fn apply_charge(&mut self) {
		let strength = self.config.charge_strength * self.alpha;
		let n = self.bodies.len();
		for i in 0..n {
			for j in (i + 1)..n {
				let mut dx = self.bodies[j].x - self.bodies[i].x;
				let mut dy = self.bodies[j].y - self.bodies[i].y;
				if dx == 0.0 {
					dx = self.jiggle();
				}
				if dy == 0.0 {
					dy = self.jiggle();
				}
				let l2 = (dx * dx + dy * dy).max(MIN_DISTANCE_SQ);
				let w = strength / l2;
				self.bodies[i].vx += dx * w;
				self.bodies[i].vy += dy * w;
				self.bodies[j].vx -= dx * w;
				self.bodies[j].vy -= dy * w;
			}
		}
	}

	fn apply_center(&mut self) {
		let k = self.config.center_strength * self.alpha;
		for body in &mut self.bodies {
			body.vx -= body.x * k;
			body.vy -= body.y * k;
		}
	}

	fn apply_collision(&mut self) {
		let n = self.bodies.len();
		let padding = self.config.collision_padding;
		let strength = self.config.collision_strength;
		for i in 0..n {
			for j in (i + 1)..n {
				let (a, b) = (&self.bodies[i], &self.bodies[j]);
				let reach = a.radius + b.radius + padding;
				let mut dx = (a.x + a.vx) - (b.x + b.vx);
				let mut dy = (a.y + a.vy) - (b.y + b.vy);
				let l2 = dx * dx + dy * dy;
				if l2 >= reach * reach {
					continue;
				}
				let (ra2, rb2) = (a.radius * a.radius, b.radius * b.radius);
				if dx == 0.0 {
					dx = self.jiggle();
				}
				if dy == 0.0 {
					dy = self.jiggle();
				}
				let len = (dx * dx + dy * dy).sqrt();
				let push = (reach - len) / len * strength;
				let (px, py) = (dx * push, dy * push);
				let share = rb2 / (ra2 + rb2);
				self.bodies[i].vx += px * share;
				self.bodies[i].vy += py * share;
				self.bodies[j].vx -= px * (1.0 - share);
				self.bodies[j].vy -= py * (1.0 - share);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	fn chain(n: usize) -> LayoutInput {
		LayoutInput {
			nodes: (0..n)
				.map(|i| SimNode {
					radius: if i % 5 == 0 { 16.0 } else { 6.0 },
					position: None,
					pinned: None,
				})
				.collect(),
			links: (1..n)
				.map(|i| SimLink {
					source: i,
					target: (i - 1) / 5 * 5,
					kind: LinkKind::Subfeature,
				})
				.collect(),
		}
	}

	#[test]
	fn seeds_distinct_finite_positions() {
		let engine = LayoutEngine::new(chain(20), SimulationConfig::default());
		let positions = engine.positions();
		assert_eq!(positions.len(), 40);
		assert!(positions.iter().all(|v| v.is_finite()));
		assert_ne!(engine.position(1), engine.position(2));
	}

	#[test]
	fn alpha_strictly_decreases_and_converges() {
		let mut engine = LayoutEngine::new(chain(200), SimulationConfig::default());
		let mut previous = engine.alpha();
		let mut ticks = 0;
		while engine.alpha() >= 0.001 {
			engine.tick();
			assert!(engine.alpha() < previous, "alpha rose at tick {ticks}");
			previous = engine.alpha();
			ticks += 1;
			assert!(ticks <= 400, "alpha did not converge");
		}
		assert!(engine.is_settled());
		assert!(engine.positions().iter().all(|v| v.is_finite()));
	}

	#[test]
	fn reheat_raises_settled_alpha() {
		let mut engine = LayoutEngine::new(chain(30), SimulationConfig::default());
		while !engine.is_settled() {
			engine.tick();
		}
		let cold = engine.alpha();
		engine.set_alpha_target(SimulationConfig::REHEAT_TARGET);
		assert!(!engine.is_settled());
		engine.tick();
		assert!(engine.alpha() > cold);
	}

	#[test]
	fn restart_keeps_positions() {
		let mut engine = LayoutEngine::new(chain(10), SimulationConfig::default());
		for _ in 0..50 {
			engine.tick();
		}
		let before = engine.positions();
		engine.restart();
		assert_eq!(engine.alpha(), SimulationConfig::default().restart_alpha);
		assert_eq!(engine.positions(), before);
	}

	#[test]
	fn linked_nodes_end_near_rest_length() {
		let input = LayoutInput {
			nodes: vec![
				SimNode { radius: 5.0, position: Some(Point2::new(-200.0, 0.0)), pinned: None },
				SimNode { radius: 5.0, position: Some(Point2::new(200.0, 0.0)), pinned: None },
			],
			links: vec![SimLink { source: 0, target: 1, kind: LinkKind::Subfeature }],
		};
		let mut engine = LayoutEngine::new(input, SimulationConfig::default());
		for _ in 0..300 {
			engine.tick();
		}
		let (a, b) = (engine.position(0).unwrap(), engine.position(1).unwrap());
		assert!(a.distance(b) < 200.0);
	}

	#[test]
	fn config_hot_swap_applies() {
		let mut engine = LayoutEngine::new(chain(5), SimulationConfig::default());
		let config = SimulationConfig { link_distance: 90.0, ..SimulationConfig::default() };
		engine.set_config(config);
		assert_eq!(engine.config().link_distance, 90.0);
	}

	#[test]
	fn pin_rejects_unknown_index() {
		let mut engine = LayoutEngine::new(chain(3), SimulationConfig::default());
		assert!(!engine.pin(7, Some(Point2::new(1.0, 1.0))));
	}

	proptest! {
		#[test]
		fn pinned_nodes_never_move(
			index in 0usize..25,
			x in -300.0f32..300.0,
			y in -300.0f32..300.0,
			ticks in 1usize..120,
		) {
			let mut engine = LayoutEngine::new(chain(25), SimulationConfig::default());
			engine.pin(index, Some(Point2::new(x, y)));
			engine.set_alpha_target(SimulationConfig::REHEAT_TARGET);
			for _ in 0..ticks {
				engine.tick();
				prop_assert_eq!(engine.position(index), Some(Point2::new(x, y)));
			}
		}
	}
}

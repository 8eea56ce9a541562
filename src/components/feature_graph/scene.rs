//! CPU-side geometry for the 3D view: curved link tubes, glow tubes, node
//! markers and the particle pool. Built once from a [`FrozenGraph`].

use std::f32::consts::{PI, TAU};

use bytemuck::{Pod, Zeroable};

use super::camera::{BoundingSphere, cross, length, normalize, sub};
use super::frozen::FrozenGraph;
use super::types::{LinkKind, NodeKind};

const TUBE_SEGMENTS: usize = 16;
const TUBE_SIDES: usize = 6;
const GLOW_SCALE: f32 = 2.6;
const GLOW_ALPHA: f32 = 0.16;
/// Lift as a share of link length, capped at `MAX_LIFT`.
const LIFT_FACTOR: f32 = 0.25;
pub const MAX_LIFT: f32 = 80.0;
const SPHERE_RINGS: usize = 10;
const SPHERE_SECTORS: usize = 16;
const PARTICLE_SIZE: f32 = 2.2;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
	pub position: [f32; 3],
	pub normal: [f32; 3],
	pub color: [f32; 4],
}

/// Per-instance data for sphere markers and particles.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Instance {
	pub center: [f32; 3],
	pub radius: f32,
	pub color: [f32; 4],
	pub emissive: f32,
	pub _padding: [f32; 3],
}

impl Instance {
	fn new(center: [f32; 3], radius: f32, color: [f32; 4], emissive: f32) -> Self {
		Self {
			center,
			radius,
			color,
			emissive,
			_padding: [0.0; 3],
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
	pub vertices: Vec<MeshVertex>,
	pub indices: Vec<u32>,
}

impl Mesh {
	pub fn is_empty(&self) -> bool {
		self.indices.is_empty()
	}

	fn append(&mut self, other: Mesh) {
		let base = self.vertices.len() as u32;
		self.vertices.extend(other.vertices);
		self.indices.extend(other.indices.into_iter().map(|i| i + base));
	}
}

/// Quadratic Bezier from source through a z-lifted midpoint to target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkCurve {
	pub start: [f32; 3],
	pub control: [f32; 3],
	pub end: [f32; 3],
	pub kind: LinkKind,
}

impl LinkCurve {
	pub fn new(start: [f32; 3], end: [f32; 3], kind: LinkKind) -> Self {
		let lift = (length(sub(end, start)) * LIFT_FACTOR).min(MAX_LIFT);
		let mid = [
			(start[0] + end[0]) / 2.0,
			(start[1] + end[1]) / 2.0,
			(start[2] + end[2]) / 2.0,
		];
		// a quadratic reaches half its control offset at t = 0.5
		let control = [mid[0], mid[1], mid[2] + 2.0 * lift];
		Self {
			start,
			control,
			end,
			kind,
		}
	}

	pub fn point(&self, t: f32) -> [f32; 3] {
		let u = 1.0 - t;
		let mut out = [0.0; 3];
		for axis in 0..3 {
			out[axis] =
				u * u * self.start[axis] + 2.0 * u * t * self.control[axis] + t * t * self.end[axis];
		}
		out
	}

	pub fn tangent(&self, t: f32) -> [f32; 3] {
		let mut out = [0.0; 3];
		for axis in 0..3 {
			out[axis] = 2.0 * (1.0 - t) * (self.control[axis] - self.start[axis])
				+ 2.0 * t * (self.end[axis] - self.control[axis]);
		}
		normalize(out)
	}
}

fn tube_radius(kind: LinkKind) -> f32 {
	match kind {
		LinkKind::Subfeature => 0.8,
		LinkKind::Orchestrator => 1.8,
		LinkKind::Overlap => 1.0,
	}
}

fn tube_color(kind: LinkKind) -> [f32; 4] {
	match kind {
		LinkKind::Subfeature => [0.59, 0.63, 0.73, 0.85],
		LinkKind::Orchestrator => [0.39, 0.71, 1.0, 0.95],
		LinkKind::Overlap => [1.0, 0.65, 0.31, 0.85],
	}
}

/// Extrudes a ring of `TUBE_SIDES` vertices along `curve`.
pub fn tube_mesh(curve: &LinkCurve, radius: f32, color: [f32; 4]) -> Mesh {
	let mut mesh = Mesh::default();
	for s in 0..=TUBE_SEGMENTS {
		let t = s as f32 / TUBE_SEGMENTS as f32;
		let center = curve.point(t);
		let tangent = curve.tangent(t);
		let reference = if tangent[2].abs() < 0.9 { [0.0, 0.0, 1.0] } else { [1.0, 0.0, 0.0] };
		let u = normalize(cross(tangent, reference));
		let v = cross(tangent, u);
		for side in 0..TUBE_SIDES {
			let a = TAU * side as f32 / TUBE_SIDES as f32;
			let normal = [
				u[0] * a.cos() + v[0] * a.sin(),
				u[1] * a.cos() + v[1] * a.sin(),
				u[2] * a.cos() + v[2] * a.sin(),
			];
			mesh.vertices.push(MeshVertex {
				position: [
					center[0] + normal[0] * radius,
					center[1] + normal[1] * radius,
					center[2] + normal[2] * radius,
				],
				normal,
				color,
			});
		}
	}
	let sides = TUBE_SIDES as u32;
	for s in 0..TUBE_SEGMENTS as u32 {
		for side in 0..sides {
			let a = s * sides + side;
			let b = s * sides + (side + 1) % sides;
			let (c, d) = (a + sides, b + sides);
			mesh.indices.extend_from_slice(&[a, c, b, b, c, d]);
		}
	}
	mesh
}

/// Unit UV sphere, instanced for markers and particles.
pub fn sphere_mesh() -> Mesh {
	let mut mesh = Mesh::default();
	for ring in 0..=SPHERE_RINGS {
		let phi = PI * ring as f32 / SPHERE_RINGS as f32;
		for sector in 0..=SPHERE_SECTORS {
			let theta = TAU * sector as f32 / SPHERE_SECTORS as f32;
			let n = [phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin()];
			mesh.vertices.push(MeshVertex {
				position: n,
				normal: n,
				color: [1.0; 4],
			});
		}
	}
	let row = SPHERE_SECTORS as u32 + 1;
	for ring in 0..SPHERE_RINGS as u32 {
		for sector in 0..SPHERE_SECTORS as u32 {
			let a = ring * row + sector;
			let b = a + row;
			mesh.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
		}
	}
	mesh
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
	pub curve: usize,
	pub offset: f32,
	pub speed: f32,
}

/// Fixed-size pool; particles never spawn or die, they only wrap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticlePool {
	particles: Vec<Particle>,
}

impl ParticlePool {
	pub fn new(size: usize, curves: usize, speed: f32) -> Self {
		if curves == 0 {
			return Self::default();
		}
		let particles = (0..size)
			.map(|i| Particle {
				curve: i % curves,
				offset: (i as f32 * 0.618_034).fract(),
				speed: speed * (0.7 + 0.6 * ((i * 13) % 17) as f32 / 17.0),
			})
			.collect();
		Self { particles }
	}

	pub fn len(&self) -> usize {
		self.particles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.particles.is_empty()
	}

	pub fn particles(&self) -> &[Particle] {
		&self.particles
	}

	pub fn advance(&mut self, dt_secs: f32) {
		for p in &mut self.particles {
			p.offset = (p.offset + p.speed * dt_secs).fract();
		}
	}

	pub fn instances(&self, curves: &[LinkCurve]) -> Vec<Instance> {
		self.particles
			.iter()
			.filter_map(|p| {
				let curve = curves.get(p.curve)?;
				let mut color = tube_color(curve.kind);
				color[3] = 1.0;
				Some(Instance::new(curve.point(p.offset), PARTICLE_SIZE, color, 1.0))
			})
			.collect()
	}
}

/// Everything the GPU backend uploads for one frozen graph.
#[derive(Clone, Debug)]
pub struct Scene3d {
	/// One curve per link.
	pub curves: Vec<LinkCurve>,
	/// Tube geometry for every curve.
	pub tubes: Mesh,
	/// Wider, translucent shell drawn around the tubes.
	pub glow: Mesh,
	/// Unit sphere shared by every marker instance.
	pub sphere: Mesh,
	/// One sphere instance per node.
	pub markers: Vec<Instance>,
	/// Fixed pool riding the curves.
	pub particles: ParticlePool,
	/// `None` for an empty graph.
	pub bounds: Option<BoundingSphere>,
}

impl Scene3d {
	/// Meshes and instances for a frozen graph.
	pub fn build(graph: &FrozenGraph, pool_size: usize, particle_speed: f32) -> Self {
		let nodes = graph.nodes();
		let curves: Vec<LinkCurve> = graph
			.links()
			.iter()
			.map(|l| LinkCurve::new(nodes[l.source].position, nodes[l.target].position, l.kind))
			.collect();

		let mut tubes = Mesh::default();
		let mut glow = Mesh::default();
		for curve in &curves {
			let radius = tube_radius(curve.kind);
			let color = tube_color(curve.kind);
			tubes.append(tube_mesh(curve, radius, color));
			glow.append(tube_mesh(
				curve,
				radius * GLOW_SCALE,
				[color[0], color[1], color[2], GLOW_ALPHA],
			));
		}

		let markers = nodes
			.iter()
			.map(|n| {
				let emissive = match n.kind {
					NodeKind::Major => 0.6,
					NodeKind::Minor => 0.25,
				};
				Instance::new(n.position, n.radius * 0.5, n.color.rgba(), emissive)
			})
			.collect();

		log::debug!(
			"scene built: {} curves, {} tube vertices, {} markers",
			curves.len(),
			tubes.vertices.len(),
			nodes.len()
		);
		Self {
			particles: ParticlePool::new(pool_size, curves.len(), particle_speed),
			curves,
			tubes,
			glow,
			sphere: sphere_mesh(),
			markers,
			bounds: graph.bounding_sphere(),
		}
	}

	/// Current particle positions as GPU instances.
	pub fn particle_instances(&self) -> Vec<Instance> {
		self.particles.instances(&self.curves)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::feature_graph::types::{ColorToken, Node, Point2, ResolvedLink};

	fn close(a: [f32; 3], b: [f32; 3]) -> bool {
		(0..3).all(|i| (a[i] - b[i]).abs() < 1e-3)
	}

	#[test]
	fn curve_passes_through_lifted_midpoint() {
		let curve = LinkCurve::new([0.0, 0.0, 0.0], [100.0, 0.0, 0.0], LinkKind::Overlap);
		assert!(close(curve.point(0.0), [0.0, 0.0, 0.0]));
		assert!(close(curve.point(1.0), [100.0, 0.0, 0.0]));
		assert!(close(curve.point(0.5), [50.0, 0.0, 25.0]));
	}

	#[test]
	fn lift_is_capped() {
		let curve = LinkCurve::new([0.0, 0.0, 0.0], [10_000.0, 0.0, 0.0], LinkKind::Subfeature);
		assert!((curve.point(0.5)[2] - MAX_LIFT).abs() < 1e-2);
	}

	#[test]
	fn tube_indices_stay_in_range() {
		let curve = LinkCurve::new([0.0, 0.0, 0.0], [40.0, 30.0, 0.0], LinkKind::Orchestrator);
		let mesh = tube_mesh(&curve, 2.0, [1.0; 4]);
		assert_eq!(mesh.vertices.len(), (TUBE_SEGMENTS + 1) * TUBE_SIDES);
		assert_eq!(mesh.indices.len(), TUBE_SEGMENTS * TUBE_SIDES * 6);
		assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
		for v in &mesh.vertices {
			assert!((length(v.normal) - 1.0).abs() < 1e-3);
		}
	}

	#[test]
	fn pool_size_is_fixed_and_offsets_wrap() {
		let curves = [LinkCurve::new([0.0; 3], [10.0, 0.0, 0.0], LinkKind::Overlap)];
		let mut pool = ParticlePool::new(32, curves.len(), 0.9);
		for _ in 0..500 {
			pool.advance(0.016);
		}
		assert_eq!(pool.len(), 32);
		assert!(pool.particles().iter().all(|p| (0.0..1.0).contains(&p.offset)));
		assert_eq!(pool.instances(&curves).len(), 32);
		assert!(ParticlePool::new(32, 0, 0.9).is_empty());
	}

	#[test]
	fn scene_from_frozen_graph() {
		let node = |id: &str, kind| Node {
			id: id.into(),
			kind,
			group: "g".into(),
			radius: 10.0,
			color: ColorToken::palette(2),
			position: None,
			pinned: None,
		};
		let nodes = vec![node("g", NodeKind::Major), node("m", NodeKind::Minor)];
		let positions = [Point2::new(0.0, 0.0), Point2::new(60.0, 0.0)];
		let links = [ResolvedLink { source: 1, target: 0, kind: LinkKind::Subfeature }];
		let graph = FrozenGraph::capture(&nodes, &positions, &links);

		let scene = Scene3d::build(&graph, 16, 0.3);
		assert_eq!(scene.curves.len(), 1);
		assert_eq!(scene.tubes.vertices.len(), scene.glow.vertices.len());
		assert!(scene.glow.vertices.iter().all(|v| v.color[3] == GLOW_ALPHA));
		assert_eq!(scene.markers.len(), 2);
		assert!(scene.markers[0].emissive > scene.markers[1].emissive);
		assert_eq!(scene.particle_instances().len(), 16);
		assert!(scene.bounds.is_some());
		assert_eq!(std::mem::size_of::<Instance>(), 48);
	}
}

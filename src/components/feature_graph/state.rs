use std::collections::{HashMap, HashSet};

use super::camera::{AutoFit, Bounds2, ViewTransform, fit_transform};
use super::config::{CameraConfig, LodConfig, ParticleConfig, ViewerConfig};
use super::lod::{LodState, LodTransition};
use super::types::{GraphData, Node, NodeInspection, NodeMetrics, Point2, ResolvedLink};

/// World-space hit slop added to a node's radius.
pub const HIT_SLOP: f64 = 4.0;
/// Padding around the derived viewbox.
pub const VIEWBOX_PADDING: f32 = 40.0;
const TRAIL_LEN: usize = 6;
const FPS_WINDOW_MS: f64 = 500.0;

#[derive(Clone, Debug, Default)]
pub struct DragState {
	pub active: bool,
	pub node_idx: Option<usize>,
	pub start_x: f64,
	pub start_y: f64,
	pub node_start: Point2,
	/// Set once the pointer travelled far enough to count as a drag, not a click.
	pub moved: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PanState {
	pub active: bool,
	pub start_x: f64,
	pub start_y: f64,
	pub transform_start_x: f64,
	pub transform_start_y: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowParticle {
	pub link: usize,
	pub t: f32,
	pub speed: f32,
	pub trail: Vec<Point2>,
}

#[derive(Clone, Debug, Default)]
pub struct FpsCounter {
	pub fps: f64,
	pub frames_total: u64,
	frames: u32,
	window_ms: f64,
}

impl FpsCounter {
	pub fn record(&mut self, dt_ms: f64) {
		self.frames += 1;
		self.frames_total += 1;
		self.window_ms += dt_ms.max(0.0);
		if self.window_ms >= FPS_WINDOW_MS {
			self.fps = self.frames as f64 * 1000.0 / self.window_ms;
			self.frames = 0;
			self.window_ms = 0.0;
		}
	}
}

/// Everything the main thread draws from. The layout engine never sees this;
/// it only supplies positions through the channel.
pub struct RenderState {
	/// Node data; positions are copied in from the layout.
	pub nodes: Vec<Node>,
	/// Links that resolved to two nodes.
	pub links: Vec<ResolvedLink>,
	/// Links as handed in, before dangling ones were dropped.
	pub built_link_count: usize,
	index: HashMap<String, usize>,
	neighbors: Vec<Vec<usize>>,
	/// Viewport width in CSS pixels.
	pub width: f64,
	/// Viewport height in CSS pixels.
	pub height: f64,
	/// What is drawn this frame.
	pub transform: ViewTransform,
	/// What `transform` eases toward.
	pub target: ViewTransform,
	/// Node drag in progress.
	pub drag: DragState,
	/// Background pan in progress.
	pub pan: PanState,
	/// Node under the pointer.
	pub hover: Option<usize>,
	/// Node shown in the inspector.
	pub selected: Option<usize>,
	/// Lowercased and trimmed.
	pub search_query: String,
	/// Ids matching `search_query`.
	pub search_matches: HashSet<String>,
	/// Groups toggled off.
	pub hidden_groups: HashSet<String>,
	/// Neighbors of the selected node, or of the hovered one.
	pub highlighted: HashSet<String>,
	/// Cluster state for far zoom levels.
	pub lod: LodState,
	/// Backend metrics by node id.
	pub metrics: HashMap<String, NodeMetrics>,
	/// Particles riding links.
	pub particles: Vec<FlowParticle>,
	/// Frame rate over a rolling window.
	pub fps: FpsCounter,
	/// Padded bounds of the visible nodes, refreshed by the layout pass.
	pub viewbox: Option<Bounds2>,
	/// Seconds, drives the dash offset.
	pub flow_time: f64,
	/// Clustering thresholds.
	pub lod_config: LodConfig,
	/// Fit and zoom limits.
	pub camera_config: CameraConfig,
	layout_pending: bool,
	layout_passes: u64,
	fit: AutoFit,
	/// Set by the first finite positions; nothing is framed before that.
	fit_armed: bool,
	/// Cleared once the user moves the camera, restored by `reset_view`.
	fit_follow: bool,
	framed: bool,
}

impl RenderState {
	/// State with the default config.
	pub fn new(data: &GraphData, width: f64, height: f64) -> Self {
		Self::with_config(data, width, height, &ViewerConfig::default())
	}

	/// State for `data`, centred on the viewport until the first positions arrive.
	pub fn with_config(data: &GraphData, width: f64, height: f64, config: &ViewerConfig) -> Self {
		let links = data.resolved_links();
		let mut neighbors = vec![Vec::new(); data.nodes.len()];
		for link in &links {
			neighbors[link.source].push(link.target);
			neighbors[link.target].push(link.source);
		}
		let mut state = Self {
			nodes: data.nodes.clone(),
			built_link_count: data.links.len(),
			links,
			index: data
				.nodes
				.iter()
				.enumerate()
				.map(|(i, n)| (n.id.clone(), i))
				.collect(),
			neighbors,
			width,
			height,
			transform: ViewTransform {
				x: width / 2.0,
				y: height / 2.0,
				k: 1.0,
			},
			target: ViewTransform {
				x: width / 2.0,
				y: height / 2.0,
				k: 1.0,
			},
			drag: DragState::default(),
			pan: PanState::default(),
			hover: None,
			selected: None,
			search_query: String::new(),
			search_matches: HashSet::new(),
			hidden_groups: HashSet::new(),
			highlighted: HashSet::new(),
			lod: LodState::default(),
			metrics: HashMap::new(),
			particles: Vec::new(),
			fps: FpsCounter::default(),
			viewbox: None,
			flow_time: 0.0,
			lod_config: config.lod.clone(),
			camera_config: config.camera.clone(),
			layout_pending: true,
			layout_passes: 0,
			fit: AutoFit::new(config.camera.fit_mode),
			fit_armed: false,
			fit_follow: true,
			framed: false,
		};
		state.seed_particles(&config.particles);
		state
	}

	/// Index of a node id.
	pub fn index_of(&self, id: &str) -> Option<usize> {
		self.index.get(id).copied()
	}

	/// Indices linked to `idx`; empty when out of range.
	pub fn neighbors(&self, idx: usize) -> &[usize] {
		self.neighbors.get(idx).map(Vec::as_slice).unwrap_or(&[])
	}

	/// False for unknown indices and for nodes in hidden groups.
	pub fn is_visible(&self, idx: usize) -> bool {
		self.nodes
			.get(idx)
			.is_some_and(|n| !self.hidden_groups.contains(&n.group))
	}

	/// Nodes outside hidden groups.
	pub fn visible_count(&self) -> usize {
		(0..self.nodes.len()).filter(|&i| self.is_visible(i)).count()
	}

	/// Copies a flat `[x0, y0, ...]` buffer into node positions, replacing
	/// non-finite coordinates with 0. Returns how many nodes arrived finite.
	pub fn apply_positions(&mut self, flat: &[f32]) -> usize {
		let mut finite = 0;
		let mut repaired = 0;
		for (node, xy) in self.nodes.iter_mut().zip(flat.chunks_exact(2)) {
			let (x, y) = (xy[0], xy[1]);
			if x.is_finite() && y.is_finite() {
				finite += 1;
			} else {
				repaired += 1;
			}
			let safe = |v: f32| if v.is_finite() { v } else { 0.0 };
			node.position = Some(Point2::new(safe(x), safe(y)));
		}
		if repaired > 0 {
			log::warn!("replaced non-finite positions on {repaired} nodes");
		}
		self.fit_armed |= finite > 0;
		self.request_layout();
		finite
	}

	/// Schedules one layout pass for the next frame. Returns false when one is
	/// already pending, so any number of ticks per frame costs a single pass.
	pub fn request_layout(&mut self) -> bool {
		!std::mem::replace(&mut self.layout_pending, true)
	}

	/// True while a pass is scheduled.
	pub fn layout_pending(&self) -> bool {
		self.layout_pending
	}

	/// Passes run so far; at most one per frame.
	pub fn layout_passes(&self) -> u64 {
		self.layout_passes
	}

	/// Per-frame bookkeeping before drawing: the coalesced layout pass, auto-fit,
	/// camera easing, fps, flow particles and the LOD decision.
	pub fn begin_frame(&mut self, dt_ms: f64) {
		let dt = dt_ms / 1000.0;
		if std::mem::take(&mut self.layout_pending) {
			self.layout_passes += 1;
			self.viewbox = self.visible_bounds();
			self.refresh_clusters();
			self.follow_fit();
		}

		self.fps.record(dt_ms);
		self.flow_time += dt;
		self.transform
			.ease_toward(&self.target, self.camera_config.easing_rate, dt);
		self.advance_particles(dt as f32);
		self.update_lod();
	}

	/// Padded bounds of every visible placed node.
	fn visible_bounds(&self) -> Option<Bounds2> {
		Bounds2::from_points(
			self.nodes
				.iter()
				.enumerate()
				.filter(|(i, _)| self.is_visible(*i))
				.filter_map(|(_, n)| n.position.map(|p| (p, n.radius))),
		)
		.map(|b| b.padded(VIEWBOX_PADDING))
	}

	fn follow_fit(&mut self) {
		if !self.fit_armed || !self.fit_follow || self.drag.active {
			return;
		}
		let Some(viewbox) = self.viewbox else {
			return;
		};
		let Some(view) = self
			.fit
			.observe(&viewbox, self.width, self.height, &self.camera_config)
		else {
			return;
		};
		if self.framed {
			self.target = view;
		} else {
			// first framing jumps, later ones ease
			self.transform = view;
			self.target = view;
			self.framed = true;
		}
	}

	/// Refit on the next frame once the layout has come to rest.
	pub fn settle_fit(&mut self) {
		self.fit.invalidate();
		self.request_layout();
	}

	/// Eases back to a framing of the current layout and resumes following it.
	pub fn reset_view(&mut self) -> Option<ViewTransform> {
		self.fit_follow = true;
		self.fit.invalidate();
		// a frozen fit survives invalidation and is reused as is
		let view = self.fit.fitted().or_else(|| self.fit_view())?;
		self.target = view;
		self.framed = true;
		self.request_layout();
		Some(view)
	}

	/// Whether auto-fit still drives the camera.
	pub fn follows_layout(&self) -> bool {
		self.fit_follow
	}

	/// Forms or dissolves clusters for the current scale.
	pub fn update_lod(&mut self) -> LodTransition {
		let hidden = &self.hidden_groups;
		let nodes = &self.nodes;
		self.lod.update(
			self.transform.k,
			nodes,
			|i| !hidden.contains(&nodes[i].group),
			&self.lod_config,
		)
	}

	fn refresh_clusters(&mut self) {
		if !self.lod.is_active() {
			return;
		}
		let hidden = &self.hidden_groups;
		let nodes = &self.nodes;
		self.lod.recompute(
			self.transform.k,
			nodes,
			|i| !hidden.contains(&nodes[i].group),
			&self.lod_config,
		);
	}

	/// Maps a screen point through the drawn transform.
	pub fn screen_to_world(&self, sx: f64, sy: f64) -> Point2 {
		self.transform.screen_to_world(sx, sy)
	}

	/// Topmost visible, unclustered node under a screen point.
	pub fn node_at(&self, sx: f64, sy: f64) -> Option<usize> {
		let p = self.screen_to_world(sx, sy);
		(0..self.nodes.len()).rev().find(|&i| {
			let node = &self.nodes[i];
			self.is_visible(i)
				&& self.lod.cluster_of(i).is_none()
				&& node
					.position
					.is_some_and(|pos| (pos.distance(p) as f64) < node.radius as f64 + HIT_SLOP)
		})
	}

	/// Cluster under a screen point.
	pub fn cluster_at(&self, sx: f64, sy: f64) -> Option<usize> {
		let p = self.screen_to_world(sx, sy);
		self.lod
			.clusters()
			.iter()
			.position(|c| (c.centroid.distance(p) as f64) < cluster_radius(c.members.len()) as f64 + HIT_SLOP)
	}

	/// Zooms in on a cluster far enough that it dissolves immediately.
	pub fn expand_cluster(&mut self, cluster: usize) -> bool {
		let Some(centroid) = self.lod.clusters().get(cluster).map(|c| c.centroid) else {
			return false;
		};
		let k = self.transform.k.max(self.lod_config.exit_scale);
		let focus = ViewTransform {
			x: self.width / 2.0 - centroid.x as f64 * k,
			y: self.height / 2.0 - centroid.y as f64 * k,
			k,
		};
		self.transform = focus;
		self.target = focus;
		self.fit_follow = false;
		self.update_lod();
		true
	}

	/// Zoom about a screen point; the transform eases toward the new target.
	pub fn zoom_at(&mut self, sx: f64, sy: f64, factor: f64) {
		let new_k = (self.target.k * factor)
			.clamp(self.camera_config.min_scale, self.camera_config.max_scale);
		let ratio = new_k / self.target.k;
		self.target.x = sx - (sx - self.target.x) * ratio;
		self.target.y = sy - (sy - self.target.y) * ratio;
		self.target.k = new_k;
		self.fit_follow = false;
	}

	/// Jump straight to a transform, no easing. Stops auto-fit from following.
	pub fn set_view(&mut self, view: ViewTransform) {
		self.transform = view;
		self.target = view;
		self.fit_follow = false;
	}

	/// Framing that encloses every visible node, padding included.
	pub fn fit_view(&self) -> Option<ViewTransform> {
		let bounds = self.visible_bounds()?;
		Some(fit_transform(&bounds, self.width, self.height, &self.camera_config))
	}

	/// Out-of-range indices clear the selection.
	pub fn select(&mut self, idx: Option<usize>) -> Option<NodeInspection> {
		self.selected = idx.filter(|&i| i < self.nodes.len());
		self.refresh_highlight();
		self.selected.map(|i| self.inspect(i))
	}

	/// Hover drives the highlight when nothing is selected.
	pub fn set_hover(&mut self, idx: Option<usize>) {
		if self.hover != idx {
			self.hover = idx;
			self.refresh_highlight();
		}
	}

	fn refresh_highlight(&mut self) {
		self.highlighted.clear();
		if let Some(focus) = self.selected.or(self.hover) {
			for &n in &self.neighbors[focus] {
				self.highlighted.insert(self.nodes[n].id.clone());
			}
		}
	}

	/// Inspector payload for an in-range index.
	pub fn inspect(&self, idx: usize) -> NodeInspection {
		let node = &self.nodes[idx];
		NodeInspection {
			id: node.id.clone(),
			kind: node.kind,
			group: node.group.clone(),
			neighbors: self.neighbors[idx]
				.iter()
				.map(|&n| self.nodes[n].id.clone())
				.collect(),
			metrics: self.metrics.get(&node.id).cloned(),
		}
	}

	/// Case-insensitive substring match on id and group. Empty clears.
	pub fn set_search(&mut self, query: &str) {
		let query = query.trim().to_lowercase();
		self.search_matches.clear();
		if !query.is_empty() {
			for node in &self.nodes {
				if node.id.to_lowercase().contains(&query) || node.group.to_lowercase().contains(&query) {
					self.search_matches.insert(node.id.clone());
				}
			}
		}
		self.search_query = query;
	}

	/// True with a non-empty query.
	pub fn search_active(&self) -> bool {
		!self.search_query.is_empty()
	}

	/// Hides or shows a group; a change schedules a layout pass.
	pub fn set_group_hidden(&mut self, group: &str, hidden: bool) {
		let changed = if hidden {
			self.hidden_groups.insert(group.to_string())
		} else {
			self.hidden_groups.remove(group)
		};
		if changed {
			self.request_layout();
		}
	}

	/// Merges backend metrics; ids that are not in the graph are ignored.
	pub fn merge_metrics(&mut self, metrics: HashMap<String, NodeMetrics>) {
		for (id, m) in metrics {
			if self.index.contains_key(&id) {
				self.metrics.insert(id, m);
			}
		}
	}

	/// New viewport size. The next frame refits unless the view is frozen.
	pub fn resize(&mut self, width: f64, height: f64) {
		self.width = width;
		self.height = height;
		self.fit.invalidate();
		self.request_layout();
	}

	/// World position of a particle riding `link` at parameter `t`.
	pub fn point_on_link(&self, link: usize, t: f32) -> Option<Point2> {
		let link = self.links.get(link)?;
		let a = self.nodes[link.source].position?;
		let b = self.nodes[link.target].position?;
		Some(Point2::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t))
	}

	fn seed_particles(&mut self, config: &ParticleConfig) {
		if self.links.is_empty() {
			return;
		}
		self.particles = (0..config.flow_count)
			.map(|i| FlowParticle {
				link: i % self.links.len(),
				t: (i as f32 * 0.618_034).fract(),
				speed: config.speed * (0.75 + 0.5 * ((i * 7) % 10) as f32 / 10.0),
				trail: Vec::with_capacity(TRAIL_LEN),
			})
			.collect();
	}

	fn advance_particles(&mut self, dt: f32) {
		for i in 0..self.particles.len() {
			let (link, t) = {
				let p = &mut self.particles[i];
				p.t = (p.t + p.speed * dt).fract();
				(p.link, p.t)
			};
			let point = self.point_on_link(link, t);
			let p = &mut self.particles[i];
			match point {
				Some(point) => {
					if p.trail.len() == TRAIL_LEN {
						p.trail.remove(0);
					}
					p.trail.push(point);
				}
				None => p.trail.clear(),
			}
		}
	}
}

/// Marker radius for a cluster of `members` nodes.
pub fn cluster_radius(members: usize) -> f32 {
	8.0 + (members as f32).sqrt() * 4.0
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::feature_graph::builder::{FeatureList, GraphSpec, MajorGroup, OverlapPair};
	use crate::components::feature_graph::camera::FitMode;
	use crate::components::feature_graph::types::{BuildStatus, Link, LinkKind};

	const SPREAD: [f32; 10] = [0.0, 0.0, 2000.0, 0.0, -200.0, 100.0, -200.0, -100.0, 2200.0, 150.0];

	fn data() -> GraphData {
		let mut data = GraphSpec {
			majors: vec![
				MajorGroup { id: "api".into(), color: None, hub: false },
				MajorGroup { id: "web".into(), color: None, hub: false },
			],
			features: vec![
				FeatureList { group: "api".into(), features: vec!["auth".into(), "billing".into()] },
				FeatureList { group: "web".into(), features: vec!["Search".into()] },
			],
			overlaps: vec![OverlapPair("auth".into(), "Search".into())],
		}
		.build();
		data.links.push(Link { source: "auth".into(), target: "gone".into(), kind: LinkKind::Overlap });
		data
	}

	fn placed() -> RenderState {
		let mut state = RenderState::new(&data(), 800.0, 600.0);
		state.apply_positions(&[0.0, 0.0, 200.0, 0.0, -20.0, 10.0, -20.0, -10.0, 220.0, 15.0]);
		state
	}

	#[test]
	fn dangling_links_never_reach_render_state() {
		let state = RenderState::new(&data(), 800.0, 600.0);
		assert_eq!(state.built_link_count, 6);
		assert_eq!(state.links.len(), 5);
	}

	#[test]
	fn non_finite_positions_are_zeroed() {
		let mut state = RenderState::new(&data(), 800.0, 600.0);
		let finite = state.apply_positions(&[
			f32::NAN, 1.0, 2.0, f32::INFINITY, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0,
		]);
		assert_eq!(finite, 3);
		assert_eq!(state.nodes[0].position, Some(Point2::new(0.0, 1.0)));
		assert_eq!(state.nodes[1].position, Some(Point2::new(2.0, 0.0)));
	}

	#[test]
	fn short_buffers_only_touch_covered_nodes() {
		let mut state = RenderState::new(&data(), 800.0, 600.0);
		assert_eq!(state.apply_positions(&[1.0, 2.0, 3.0]), 1);
		assert!(state.nodes[1].position.is_none());
	}

	#[test]
	fn many_ticks_coalesce_into_one_layout_pass() {
		let mut state = placed();
		state.begin_frame(16.0);
		let passes = state.layout_passes();
		for _ in 0..10 {
			state.apply_positions(&[1.0; 10]);
		}
		assert!(!state.request_layout());
		state.begin_frame(16.0);
		assert_eq!(state.layout_passes(), passes + 1);
		state.begin_frame(16.0);
		assert_eq!(state.layout_passes(), passes + 1);
	}

	#[test]
	fn selection_highlights_neighbors_and_reports_metrics() {
		let mut state = placed();
		let mut metrics = HashMap::new();
		metrics.insert("auth".to_string(), NodeMetrics { build: Some(BuildStatus::Failing), ticket: None });
		metrics.insert("unknown".to_string(), NodeMetrics::default());
		state.merge_metrics(metrics);
		assert_eq!(state.metrics.len(), 1);

		let auth = state.index_of("auth").unwrap();
		let info = state.select(Some(auth)).unwrap();
		assert_eq!(info.neighbors, vec!["api".to_string(), "Search".to_string()]);
		assert_eq!(info.metrics.unwrap().build, Some(BuildStatus::Failing));
		assert!(state.highlighted.contains("api") && state.highlighted.contains("Search"));

		assert!(state.select(None).is_none());
		assert!(state.highlighted.is_empty());
	}

	#[test]
	fn search_matches_id_and_group_case_insensitively() {
		let mut state = placed();
		state.set_search("SEARCH");
		assert_eq!(state.search_matches, HashSet::from(["Search".to_string()]));
		state.set_search("api");
		assert_eq!(state.search_matches.len(), 3);
		state.set_search("  ");
		assert!(!state.search_active());
	}

	#[test]
	fn hidden_groups_are_not_hit() {
		let mut state = placed();
		let (sx, sy) = state.transform.world_to_screen(Point2::new(200.0, 0.0));
		assert_eq!(state.node_at(sx, sy), Some(1));
		state.set_group_hidden("web", true);
		assert_eq!(state.node_at(sx, sy), None);
		assert_eq!(state.visible_count(), 3);
	}

	#[test]
	fn cluster_click_dissolves_cluster() {
		let mut state = placed();
		state.set_view(ViewTransform { x: 400.0, y: 300.0, k: 0.4 });
		state.begin_frame(16.0);
		assert!(state.lod.is_active());
		assert_eq!(state.lod.clusters().len(), 1);

		let centroid = state.lod.clusters()[0].centroid;
		let (sx, sy) = state.transform.world_to_screen(centroid);
		let hit = state.cluster_at(sx, sy).unwrap();
		assert!(state.expand_cluster(hit));
		assert!(state.transform.k >= state.lod_config.exit_scale);
		assert!(!state.lod.is_active());
		assert!(state.lod.clusters().is_empty());
	}

	#[test]
	fn particles_wrap_and_keep_short_trails() {
		let mut state = placed();
		for _ in 0..200 {
			state.begin_frame(16.0);
		}
		assert!(!state.particles.is_empty());
		for p in &state.particles {
			assert!((0.0..1.0).contains(&p.t));
			assert!(p.trail.len() <= TRAIL_LEN);
		}
		assert!(state.fps.fps > 0.0);
	}

	#[test]
	fn fit_view_covers_visible_nodes() {
		let state = placed();
		let fit = state.fit_view().unwrap();
		let (lx, _) = fit.world_to_screen(Point2::new(-20.0 - 6.0, 0.0));
		let (rx, _) = fit.world_to_screen(Point2::new(220.0 + 6.0, 0.0));
		assert!(lx >= 0.0 && rx <= 800.0);
	}

	#[test]
	fn first_positions_frame_the_view_then_follow_growth() {
		let mut state = RenderState::new(&data(), 800.0, 600.0);
		assert!(state.reset_view().is_none());

		state.apply_positions(&[0.0, 0.0, 200.0, 0.0, -20.0, 10.0, -20.0, -10.0, 220.0, 15.0]);
		state.begin_frame(16.0);
		let first = state.target;
		assert_eq!(state.transform, first);

		state.apply_positions(&SPREAD);
		state.begin_frame(16.0);
		assert!(state.target.k < first.k);
		assert_eq!(Some(state.target), state.fit_view());
		// later refits ease instead of jumping
		assert_ne!(state.transform, state.target);
	}

	#[test]
	fn resize_refits_and_reset_recovers_after_manual_pan() {
		let mut state = placed();
		state.begin_frame(16.0);
		let before = state.target;

		state.resize(400.0, 300.0);
		state.begin_frame(16.0);
		assert!(state.target.k < before.k);
		assert_eq!(Some(state.target), state.fit_view());

		state.set_view(ViewTransform { x: 10.0, y: 10.0, k: 3.0 });
		assert!(!state.follows_layout());
		state.resize(800.0, 600.0);
		state.begin_frame(16.0);
		assert_eq!(state.target.k, 3.0);

		let reset = state.reset_view().unwrap();
		assert!(state.follows_layout());
		assert_eq!(state.target, reset);
		assert_eq!(Some(reset), state.fit_view());
	}

	#[test]
	fn frozen_fit_ignores_later_growth() {
		let mut config = ViewerConfig::default();
		config.camera.fit_mode = FitMode::Frozen;
		let mut state = RenderState::with_config(&data(), 800.0, 600.0, &config);
		state.apply_positions(&[0.0, 0.0, 200.0, 0.0, -20.0, 10.0, -20.0, -10.0, 220.0, 15.0]);
		state.begin_frame(16.0);
		let first = state.target;

		state.apply_positions(&SPREAD);
		state.begin_frame(16.0);
		assert_eq!(state.target, first);
		assert_eq!(state.reset_view(), Some(first));
	}

	#[test]
	fn dragging_holds_the_framing() {
		let mut state = placed();
		state.begin_frame(16.0);
		let first = state.target;
		state.drag.active = true;
		state.apply_positions(&SPREAD);
		state.begin_frame(16.0);
		assert_eq!(state.target, first);

		state.drag.active = false;
		state.settle_fit();
		state.begin_frame(16.0);
		assert!(state.target.k < first.k);
	}
}

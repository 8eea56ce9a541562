use std::f64::consts::PI;

use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

use super::state::{RenderState, cluster_radius};
use super::types::{ColorToken, LinkKind, NodeKind, Point2};

const BACKGROUND: &str = "#1a1a2e";
const DIMMED_ALPHA: f64 = 0.18;

/// The handful of immediate-mode drawing calls the 2D view needs.
pub trait Canvas2d {
	/// Fills the viewport.
	fn clear(&mut self, color: &str, width: f64, height: f64);
	/// Saves state, then translates and scales.
	fn push_transform(&mut self, x: f64, y: f64, k: f64);
	/// Restores the state saved by `push_transform`.
	fn pop_transform(&mut self);
	/// Global alpha for what follows.
	fn set_alpha(&mut self, alpha: f64);
	/// Stroke style and line width.
	fn set_stroke(&mut self, style: &str, width: f64);
	/// Fill style.
	fn set_fill(&mut self, style: &str);
	/// Empty slice means solid.
	fn set_dash(&mut self, segments: &[f64]);
	/// Strokes one segment.
	fn line(&mut self, from: (f64, f64), to: (f64, f64));
	/// Full circle, filled and/or stroked.
	fn circle(&mut self, x: f64, y: f64, r: f64, fill: bool, stroke: bool);
	/// Radial falloff from `inner` to `outer`.
	fn glow(&mut self, x: f64, y: f64, inner: f64, outer: f64, rgba: [f32; 4], alpha: f64);
	/// Centered on `(x, y)`.
	fn text(&mut self, text: &str, x: f64, y: f64, size: f64);
}

impl Canvas2d for CanvasRenderingContext2d {
	fn clear(&mut self, color: &str, width: f64, height: f64) {
		self.set_fill_style_str(color);
		self.fill_rect(0.0, 0.0, width, height);
	}

	fn push_transform(&mut self, x: f64, y: f64, k: f64) {
		self.save();
		let _ = self.translate(x, y);
		let _ = self.scale(k, k);
	}

	fn pop_transform(&mut self) {
		self.restore();
	}

	fn set_alpha(&mut self, alpha: f64) {
		self.set_global_alpha(alpha);
	}

	fn set_stroke(&mut self, style: &str, width: f64) {
		self.set_stroke_style_str(style);
		self.set_line_width(width);
	}

	fn set_fill(&mut self, style: &str) {
		self.set_fill_style_str(style);
	}

	fn set_dash(&mut self, segments: &[f64]) {
		let array = js_sys::Array::new();
		for s in segments {
			array.push(&JsValue::from_f64(*s));
		}
		let _ = self.set_line_dash(&array);
	}

	fn line(&mut self, from: (f64, f64), to: (f64, f64)) {
		self.begin_path();
		self.move_to(from.0, from.1);
		self.line_to(to.0, to.1);
		self.stroke();
	}

	fn circle(&mut self, x: f64, y: f64, r: f64, fill: bool, stroke: bool) {
		self.begin_path();
		let _ = self.arc(x, y, r, 0.0, 2.0 * PI);
		if fill {
			self.fill();
		}
		if stroke {
			self.stroke();
		}
	}

	fn glow(&mut self, x: f64, y: f64, inner: f64, outer: f64, rgba: [f32; 4], alpha: f64) {
		let Ok(gradient) = self.create_radial_gradient(x, y, inner, x, y, outer) else {
			return;
		};
		let [r, g, b, _] = rgba.map(|c| (c * 255.0) as u8);
		let stops = [
			(0.0, format!("rgba({r}, {g}, {b}, {alpha})")),
			(0.6, format!("rgba({r}, {g}, {b}, {})", alpha * 0.3)),
			(1.0, format!("rgba({r}, {g}, {b}, 0)")),
		];
		for (offset, color) in &stops {
			if gradient.add_color_stop(*offset, color).is_err() {
				return;
			}
		}
		self.begin_path();
		let _ = self.arc(x, y, outer, 0.0, 2.0 * PI);
		#[allow(deprecated)]
		self.set_fill_style(&gradient);
		self.fill();
	}

	fn text(&mut self, text: &str, x: f64, y: f64, size: f64) {
		self.set_font(&format!("{size}px sans-serif"));
		let _ = self.fill_text(text, x, y);
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
	pub links_drawn: usize,
	pub nodes_drawn: usize,
	pub clusters_drawn: usize,
	pub particles_drawn: usize,
}

struct LinkStyle {
	rgb: &'static str,
	width: f64,
	dashed: bool,
}

fn link_style(kind: LinkKind) -> LinkStyle {
	match kind {
		LinkKind::Subfeature => LinkStyle { rgb: "150, 160, 185", width: 1.0, dashed: false },
		LinkKind::Orchestrator => LinkStyle { rgb: "100, 180, 255", width: 2.5, dashed: false },
		LinkKind::Overlap => LinkStyle { rgb: "255, 165, 80", width: 1.2, dashed: true },
	}
}

/// Draws one frame from scratch. Nothing is retained between calls.
pub fn render<C: Canvas2d>(state: &RenderState, canvas: &mut C) -> FrameStats {
	let mut stats = FrameStats::default();
	canvas.clear(BACKGROUND, state.width, state.height);
	canvas.push_transform(state.transform.x, state.transform.y, state.transform.k);
	draw_links(state, canvas, &mut stats);
	draw_particles(state, canvas, &mut stats);
	draw_clusters(state, canvas, &mut stats);
	draw_nodes(state, canvas, &mut stats);
	canvas.pop_transform();
	canvas.set_alpha(1.0);
	stats
}

/// Where an endpoint is drawn: its own position, or its cluster's centroid.
fn anchor(state: &RenderState, idx: usize) -> Option<(Point2, Option<usize>)> {
	if !state.is_visible(idx) {
		return None;
	}
	match state.lod.cluster_of(idx) {
		Some(c) => state.lod.clusters().get(c).map(|cl| (cl.centroid, Some(c))),
		None => state.nodes[idx].position.map(|p| (p, None)),
	}
}

fn in_view(state: &RenderState, p: Point2, r: f64) -> bool {
	let (sx, sy) = state.transform.world_to_screen(p);
	let margin = r * state.transform.k;
	sx >= -margin && sy >= -margin && sx <= state.width + margin && sy <= state.height + margin
}

fn draw_links<C: Canvas2d>(state: &RenderState, canvas: &mut C, stats: &mut FrameStats) {
	let k = state.transform.k;
	let focus = state.selected.or(state.hover);
	for link in &state.links {
		let (Some((a, ca)), Some((b, cb))) = (anchor(state, link.source), anchor(state, link.target))
		else {
			continue;
		};
		if ca.is_some() && ca == cb {
			continue;
		}
		let style = link_style(link.kind);
		let touches_focus = focus.is_some_and(|f| f == link.source || f == link.target);
		let alpha = match (focus, touches_focus) {
			(_, true) => 0.95,
			(Some(_), false) => 0.25,
			(None, _) => 0.6,
		};
		canvas.set_stroke(&format!("rgba({}, {alpha})", style.rgb), style.width / k);
		if style.dashed {
			canvas.set_dash(&[6.0 / k, 4.0 / k]);
		} else {
			canvas.set_dash(&[]);
		}
		canvas.line((a.x as f64, a.y as f64), (b.x as f64, b.y as f64));
		stats.links_drawn += 1;
	}
	canvas.set_dash(&[]);
}

fn draw_particles<C: Canvas2d>(state: &RenderState, canvas: &mut C, stats: &mut FrameStats) {
	let k = state.transform.k;
	for particle in &state.particles {
		let Some(link) = state.links.get(particle.link) else {
			continue;
		};
		let hidden = [link.source, link.target]
			.iter()
			.any(|&i| !state.is_visible(i) || state.lod.cluster_of(i).is_some());
		if hidden || particle.trail.is_empty() {
			continue;
		}
		canvas.set_fill(&format!("rgba({}, 1)", link_style(link.kind).rgb));
		let len = particle.trail.len() as f64;
		for (i, p) in particle.trail.iter().enumerate() {
			let fade = (i + 1) as f64 / len;
			canvas.set_alpha(0.8 * fade);
			canvas.circle(p.x as f64, p.y as f64, (1.0 + 1.5 * fade) / k, true, false);
		}
		stats.particles_drawn += 1;
	}
	canvas.set_alpha(1.0);
}

fn draw_clusters<C: Canvas2d>(state: &RenderState, canvas: &mut C, stats: &mut FrameStats) {
	let k = state.transform.k;
	for cluster in state.lod.clusters() {
		let r = cluster_radius(cluster.members.len()) as f64;
		let (x, y) = (cluster.centroid.x as f64, cluster.centroid.y as f64);
		let color = cluster
			.members
			.first()
			.map(|&m| state.nodes[m].color.clone())
			.unwrap_or_else(|| ColorToken::palette(0));
		canvas.glow(x, y, r * 0.5, r * 2.0, color.rgba(), 0.3);
		canvas.set_fill(color.css());
		canvas.set_stroke("rgba(255, 255, 255, 0.8)", 1.5 / k);
		canvas.circle(x, y, r, true, true);
		canvas.set_fill("white");
		canvas.text(&cluster.members.len().to_string(), x - r * 0.35, y + r * 0.35, 11.0 / k);
		stats.clusters_drawn += 1;
	}
}

fn draw_nodes<C: Canvas2d>(state: &RenderState, canvas: &mut C, stats: &mut FrameStats) {
	let k = state.transform.k;
	let searching = state.search_active();
	for (idx, node) in state.nodes.iter().enumerate() {
		if !state.is_visible(idx) || state.lod.cluster_of(idx).is_some() {
			continue;
		}
		let Some(p) = node.position else {
			continue;
		};
		let r = node.radius as f64;
		if !in_view(state, p, r * 3.0) {
			continue;
		}
		let (x, y) = (p.x as f64, p.y as f64);
		let dimmed = searching && !state.search_matches.contains(&node.id);
		canvas.set_alpha(if dimmed { DIMMED_ALPHA } else { 1.0 });

		if !dimmed {
			let halo = if node.kind == NodeKind::Major { 2.4 } else { 1.8 };
			canvas.glow(x, y, r * 0.4, r * halo, node.color.rgba(), 0.35);
		}
		canvas.set_fill(node.color.css());
		canvas.circle(x, y, r, true, false);

		if state.selected == Some(idx) {
			canvas.set_stroke("white", 2.5 / k);
			canvas.circle(x, y, r + 3.0 / k, false, true);
		} else if state.highlighted.contains(&node.id) {
			canvas.set_stroke("rgba(255, 230, 120, 0.9)", 1.5 / k);
			canvas.circle(x, y, r + 2.0 / k, false, true);
		}

		if let Some(metrics) = state.metrics.get(&node.id) {
			let (bx, by) = (x + r * 0.75, y - r * 0.75);
			let badge = (r * 0.35).max(3.0 / k);
			if let Some(build) = metrics.build {
				canvas.set_fill(build.css());
				canvas.set_stroke(BACKGROUND, 1.0 / k);
				canvas.circle(bx, by, badge, true, true);
			}
			if let Some(ticket) = metrics.ticket.as_ref().filter(|t| t.open > 0) {
				canvas.set_fill("rgba(255, 255, 255, 0.9)");
				canvas.text(&ticket.open.to_string(), bx + badge + 1.0 / k, by + badge, 9.0 / k);
			}
		}

		if node.kind == NodeKind::Major || k > 1.6 {
			canvas.set_fill(&format!("rgba(255, 255, 255, {})", if dimmed { 0.3 } else { 0.85 }));
			canvas.text(&node.id, x + r + 3.0 / k, y + 3.0 / k, 10.0 / k.max(0.5));
		}
		stats.nodes_drawn += 1;
	}
	canvas.set_alpha(1.0);
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;
	use crate::components::feature_graph::builder::{FeatureList, GraphSpec, MajorGroup, OverlapPair};
	use crate::components::feature_graph::camera::ViewTransform;
	use crate::components::feature_graph::types::{BuildStatus, NodeMetrics, TicketInfo};

	#[derive(Clone, Debug, PartialEq)]
	pub enum Op {
		Clear,
		Push(f64),
		Pop,
		Alpha(f64),
		Stroke(String),
		Fill(String),
		Dash(usize),
		Line,
		Circle { fill: bool, stroke: bool },
		Glow,
		Text(String),
	}

	/// Canvas that remembers every call instead of drawing.
	#[derive(Default)]
	pub struct RecordingCanvas {
		pub ops: Vec<Op>,
	}

	impl RecordingCanvas {
		pub fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
			self.ops.iter().filter(|op| pred(op)).count()
		}
	}

	impl Canvas2d for RecordingCanvas {
		fn clear(&mut self, _: &str, _: f64, _: f64) {
			self.ops.push(Op::Clear);
		}
		fn push_transform(&mut self, _: f64, _: f64, k: f64) {
			self.ops.push(Op::Push(k));
		}
		fn pop_transform(&mut self) {
			self.ops.push(Op::Pop);
		}
		fn set_alpha(&mut self, alpha: f64) {
			self.ops.push(Op::Alpha(alpha));
		}
		fn set_stroke(&mut self, style: &str, _: f64) {
			self.ops.push(Op::Stroke(style.to_string()));
		}
		fn set_fill(&mut self, style: &str) {
			self.ops.push(Op::Fill(style.to_string()));
		}
		fn set_dash(&mut self, segments: &[f64]) {
			self.ops.push(Op::Dash(segments.len()));
		}
		fn line(&mut self, _: (f64, f64), _: (f64, f64)) {
			self.ops.push(Op::Line);
		}
		fn circle(&mut self, _: f64, _: f64, _: f64, fill: bool, stroke: bool) {
			self.ops.push(Op::Circle { fill, stroke });
		}
		fn glow(&mut self, _: f64, _: f64, _: f64, _: f64, _: [f32; 4], _: f64) {
			self.ops.push(Op::Glow);
		}
		fn text(&mut self, text: &str, _: f64, _: f64, _: f64) {
			self.ops.push(Op::Text(text.to_string()));
		}
	}

	fn state() -> RenderState {
		let data = GraphSpec {
			majors: vec![
				MajorGroup { id: "api".into(), color: None, hub: false },
				MajorGroup { id: "web".into(), color: None, hub: false },
			],
			features: vec![
				FeatureList { group: "api".into(), features: vec!["auth".into(), "billing".into()] },
				FeatureList { group: "web".into(), features: vec!["search".into()] },
			],
			overlaps: vec![OverlapPair("auth".into(), "search".into())],
		}
		.build();
		let mut state = RenderState::new(&data, 800.0, 600.0);
		state.apply_positions(&[-100.0, 0.0, 100.0, 0.0, -120.0, 10.0, -120.0, -10.0, 130.0, 10.0]);
		state.begin_frame(16.0);
		state
	}

	#[test]
	fn draws_every_visible_link_and_node() {
		let state = state();
		let mut canvas = RecordingCanvas::default();
		let stats = render(&state, &mut canvas);
		assert_eq!(stats.links_drawn, 5);
		assert_eq!(stats.nodes_drawn, 5);
		assert_eq!(stats.clusters_drawn, 0);
		assert_eq!(canvas.ops.first(), Some(&Op::Clear));
		assert_eq!(canvas.count(|op| *op == Op::Line), 5);
		// only the overlap link is dashed
		assert_eq!(canvas.count(|op| *op == Op::Dash(2)), 1);
		assert_eq!(canvas.count(|op| *op == Op::Text("api".into())), 1);
	}

	#[test]
	fn hidden_groups_drop_nodes_and_incident_links() {
		let mut state = state();
		state.set_group_hidden("web", true);
		let stats = render(&state, &mut RecordingCanvas::default());
		assert_eq!(stats.nodes_drawn, 3);
		assert_eq!(stats.links_drawn, 2);
	}

	#[test]
	fn clustered_links_are_redirected_or_skipped() {
		let mut state = state();
		state.set_view(ViewTransform { x: 400.0, y: 300.0, k: 0.4 });
		state.begin_frame(16.0);
		assert_eq!(state.lod.clusters().len(), 1);

		let mut canvas = RecordingCanvas::default();
		let stats = render(&state, &mut canvas);
		assert_eq!(stats.clusters_drawn, 1);
		assert_eq!(stats.nodes_drawn, 3);
		// auth/billing -> api now start at the cluster, nothing is internal
		assert_eq!(stats.links_drawn, 5);
		assert!(stats.links_drawn <= state.built_link_count);
		assert_eq!(canvas.count(|op| *op == Op::Text("2".into())), 1);
	}

	#[test]
	fn search_dims_non_matching_nodes() {
		let mut state = state();
		state.set_search("search");
		let mut canvas = RecordingCanvas::default();
		render(&state, &mut canvas);
		assert_eq!(canvas.count(|op| *op == Op::Alpha(DIMMED_ALPHA)), 4);
		// dimmed nodes lose their halo
		assert_eq!(canvas.count(|op| *op == Op::Glow), 1);
	}

	#[test]
	fn selection_outline_neighbor_rings_and_badges() {
		let mut state = state();
		let mut metrics = HashMap::new();
		metrics.insert(
			"auth".to_string(),
			NodeMetrics {
				build: Some(BuildStatus::Failing),
				ticket: Some(TicketInfo { key: "FG-1".into(), title: "flaky".into(), open: 3 }),
			},
		);
		state.merge_metrics(metrics);
		state.select(state.index_of("auth"));

		let mut canvas = RecordingCanvas::default();
		render(&state, &mut canvas);
		assert_eq!(canvas.count(|op| *op == Op::Stroke("white".into())), 1);
		assert_eq!(canvas.count(|op| *op == Op::Stroke("rgba(255, 230, 120, 0.9)".into())), 2);
		assert_eq!(canvas.count(|op| *op == Op::Fill(BuildStatus::Failing.css().into())), 1);
		assert_eq!(canvas.count(|op| *op == Op::Text("3".into())), 1);
	}

	#[test]
	fn particles_stay_off_clustered_links() {
		let mut state = state();
		for _ in 0..10 {
			state.begin_frame(16.0);
		}
		let before = render(&state, &mut RecordingCanvas::default()).particles_drawn;
		assert!(before > 0);

		state.set_view(ViewTransform { x: 400.0, y: 300.0, k: 0.4 });
		state.begin_frame(16.0);
		let after = render(&state, &mut RecordingCanvas::default()).particles_drawn;
		assert!(after < before);
	}
}

//! Level-of-detail clustering for zoomed-out views.
//!
//! ```text
//!   scale:  0 ─────── enter ════ band ════ exit ─────── ∞
//!                       ▲ clusters form      ▲ clusters dissolve
//! ```
//!
//! Inside the band the decided state is kept, whichever side it came from.

use std::collections::HashMap;

use super::config::LodConfig;
use super::types::{Node, NodeKind, Point2};

/// Synthetic marker standing in for several minor nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
	pub id: String,
	pub members: Vec<usize>,
	pub centroid: Point2,
	pub group: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LodTransition {
	Unchanged,
	Entered,
	Exited,
}

#[derive(Clone, Debug, Default)]
pub struct LodState {
	active: bool,
	clusters: Vec<Cluster>,
	member_of: HashMap<usize, usize>,
}

impl LodState {
	pub fn is_active(&self) -> bool {
		self.active
	}

	pub fn clusters(&self) -> &[Cluster] {
		&self.clusters
	}

	/// Index of the cluster that swallowed `node`, if any.
	pub fn cluster_of(&self, node: usize) -> Option<usize> {
		self.member_of.get(&node).copied()
	}

	/// Applies the hysteresis rule for the current camera scale.
	pub fn update<F: Fn(usize) -> bool>(
		&mut self,
		scale: f64,
		nodes: &[Node],
		visible: F,
		config: &LodConfig,
	) -> LodTransition {
		if !self.active && scale < config.enter_scale {
			self.active = true;
			self.recompute(scale, nodes, visible, config);
			log::debug!("lod on at scale {scale:.2}: {} clusters", self.clusters.len());
			LodTransition::Entered
		} else if self.active && scale >= config.exit_scale {
			self.dissolve();
			log::debug!("lod off at scale {scale:.2}");
			LodTransition::Exited
		} else {
			LodTransition::Unchanged
		}
	}

	pub fn dissolve(&mut self) {
		self.active = false;
		self.clusters.clear();
		self.member_of.clear();
	}

	/// Regroups members after positions moved. No-op while inactive.
	pub fn recompute<F: Fn(usize) -> bool>(
		&mut self,
		scale: f64,
		nodes: &[Node],
		visible: F,
		config: &LodConfig,
	) {
		self.clusters.clear();
		self.member_of.clear();
		if !self.active {
			return;
		}

		// membership inside the band is frozen at the enter scale
		let effective = scale.min(config.enter_scale).max(f64::EPSILON);
		let world_radius = (config.neighbor_radius_px / effective) as f32;

		let candidates: Vec<(usize, Point2)> = nodes
			.iter()
			.enumerate()
			.filter(|(i, n)| n.kind == NodeKind::Minor && visible(*i))
			.filter_map(|(i, n)| n.position.filter(Point2::is_finite).map(|p| (i, p)))
			.collect();

		let mut taken = vec![false; candidates.len()];
		for a in 0..candidates.len() {
			if taken[a] {
				continue;
			}
			let (seed, seed_pos) = candidates[a];
			let mut members = vec![a];
			for b in (a + 1)..candidates.len() {
				if !taken[b] && seed_pos.distance(candidates[b].1) <= world_radius {
					members.push(b);
				}
			}
			if members.len() < config.min_members.max(2) {
				continue;
			}

			let mut centroid = Point2::default();
			for &m in &members {
				taken[m] = true;
				centroid.x += candidates[m].1.x;
				centroid.y += candidates[m].1.y;
			}
			centroid.x /= members.len() as f32;
			centroid.y /= members.len() as f32;

			let cluster_index = self.clusters.len();
			let members: Vec<usize> = members.into_iter().map(|m| candidates[m].0).collect();
			for &m in &members {
				self.member_of.insert(m, cluster_index);
			}
			self.clusters.push(Cluster {
				id: format!("cluster:{}", nodes[seed].id),
				members,
				centroid,
				group: nodes[seed].group.clone(),
			});
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::feature_graph::types::ColorToken;

	fn minor(id: &str, x: f32, y: f32) -> Node {
		Node {
			id: id.into(),
			kind: NodeKind::Minor,
			group: "g".into(),
			radius: 6.0,
			color: ColorToken::palette(0),
			position: Some(Point2::new(x, y)),
			pinned: None,
		}
	}

	fn nodes() -> Vec<Node> {
		vec![
			minor("a", 0.0, 0.0),
			minor("b", 30.0, 0.0),
			minor("c", 0.0, 30.0),
			minor("far", 2000.0, 2000.0),
			Node { kind: NodeKind::Major, ..minor("major", 5.0, 5.0) },
		]
	}

	#[test]
	fn hysteresis_band_never_flips_state() {
		let config = LodConfig::default();
		let nodes = nodes();
		let mut lod = LodState::default();

		assert_eq!(lod.update(1.0, &nodes, |_| true, &config), LodTransition::Unchanged);
		assert_eq!(lod.update(0.7, &nodes, |_| true, &config), LodTransition::Unchanged);
		assert!(!lod.is_active());

		assert_eq!(lod.update(0.4, &nodes, |_| true, &config), LodTransition::Entered);
		let decided = lod.clusters().to_vec();
		assert_eq!(decided.len(), 1);

		for scale in [0.61, 0.7, 0.8, 0.849] {
			assert_eq!(lod.update(scale, &nodes, |_| true, &config), LodTransition::Unchanged);
			assert!(lod.is_active());
			assert_eq!(lod.clusters(), &decided[..]);
		}

		assert_eq!(lod.update(0.85, &nodes, |_| true, &config), LodTransition::Exited);
		assert!(lod.clusters().is_empty());
		assert_eq!(lod.update(0.7, &nodes, |_| true, &config), LodTransition::Unchanged);
		assert!(!lod.is_active());
	}

	#[test]
	fn only_visible_minor_nodes_merge() {
		let config = LodConfig::default();
		let nodes = nodes();
		let mut lod = LodState::default();
		lod.update(0.4, &nodes, |i| i != 2, &config);

		let cluster = &lod.clusters()[0];
		assert_eq!(cluster.members, vec![0, 1]);
		assert_eq!(cluster.centroid, Point2::new(15.0, 0.0));
		assert_eq!(lod.cluster_of(1), Some(0));
		assert_eq!(lod.cluster_of(4), None);
		assert_eq!(lod.cluster_of(3), None);
	}

	#[test]
	fn band_membership_uses_enter_scale() {
		let config = LodConfig::default();
		let nodes = nodes();
		let mut lod = LodState::default();
		lod.update(0.5, &nodes, |_| true, &config);
		let at_entry = lod.clusters().to_vec();
		lod.recompute(0.8, &nodes, |_| true, &config);
		assert_eq!(lod.clusters(), &at_entry[..]);
	}
}

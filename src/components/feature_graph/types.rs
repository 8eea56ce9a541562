use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Categorical palette used when a group has no explicit color token.
pub const PALETTE: &[&str] = &[
	"#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
	"#bcbd22", "#17becf",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
	pub x: f32,
	pub y: f32,
}

impl Point2 {
	pub const fn new(x: f32, y: f32) -> Self {
		Self { x, y }
	}

	pub fn is_finite(&self) -> bool {
		self.x.is_finite() && self.y.is_finite()
	}

	pub fn distance(&self, other: Point2) -> f32 {
		let (dx, dy) = (self.x - other.x, self.y - other.y);
		(dx * dx + dy * dy).sqrt()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
	Major,
	Minor,
}

/// Role of a link, which sets its rest length and stiffness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
	/// Minor feature -> owning major group.
	Subfeature,
	/// Hub major -> every other major.
	Orchestrator,
	/// Declared cross-cutting pair.
	Overlap,
}

impl LinkKind {
	/// Multiplier applied to the configured link distance.
	pub fn distance_factor(self) -> f32 {
		match self {
			LinkKind::Subfeature => 1.0,
			LinkKind::Orchestrator => 3.0,
			LinkKind::Overlap => 2.2,
		}
	}

	/// Multiplier applied to the configured link stiffness.
	pub fn stiffness_factor(self) -> f32 {
		match self {
			LinkKind::Subfeature => 1.0,
			LinkKind::Orchestrator => 0.6,
			LinkKind::Overlap => 0.15,
		}
	}
}

/// A color token: `#rrggbb` or a palette slot such as `palette:3`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorToken(pub String);

impl ColorToken {
	pub fn palette(slot: usize) -> Self {
		Self(PALETTE[slot % PALETTE.len()].to_string())
	}

	/// CSS string usable by a 2D canvas.
	pub fn css(&self) -> &str {
		if self.0.starts_with('#') {
			&self.0
		} else {
			self.0
				.strip_prefix("palette:")
				.and_then(|s| s.parse::<usize>().ok())
				.map(|slot| PALETTE[slot % PALETTE.len()])
				.unwrap_or(PALETTE[0])
		}
	}

	/// Linear-ish RGBA in 0..1, for GPU materials.
	pub fn rgba(&self) -> [f32; 4] {
		let hex = self.css().trim_start_matches('#');
		let channel = |i: usize| {
			hex.get(i..i + 2)
				.and_then(|c| u8::from_str_radix(c, 16).ok())
				.map(|c| c as f32 / 255.0)
				.unwrap_or(0.5)
		};
		[channel(0), channel(2), channel(4), 1.0]
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
	pub id: String,
	pub kind: NodeKind,
	pub group: String,
	pub radius: f32,
	pub color: ColorToken,
	#[serde(default)]
	pub position: Option<Point2>,
	#[serde(default)]
	pub pinned: Option<Point2>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
	pub source: String,
	pub target: String,
	pub kind: LinkKind,
}

/// Nodes plus id-addressed links, as built or as supplied by the host page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
	/// Nodes in build order.
	pub nodes: Vec<Node>,
	/// Links by node id.
	pub links: Vec<Link>,
}

impl GraphData {
	/// Map of node id to its index in `nodes`.
	pub fn index(&self) -> HashMap<&str, usize> {
		self.nodes
			.iter()
			.enumerate()
			.map(|(i, n)| (n.id.as_str(), i))
			.collect()
	}

	/// Links with both endpoints resolved to node indices; dangling links are skipped.
	pub fn resolved_links(&self) -> Vec<ResolvedLink> {
		let index = self.index();
		self.links
			.iter()
			.filter_map(|link| {
				match (index.get(link.source.as_str()), index.get(link.target.as_str())) {
					(Some(&source), Some(&target)) => Some(ResolvedLink {
						source,
						target,
						kind: link.kind,
					}),
					_ => {
						log::debug!("skipping dangling link {} -> {}", link.source, link.target);
						None
					}
				}
			})
			.collect()
	}
}

/// A link whose endpoints are indices into the node array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedLink {
	pub source: usize,
	pub target: usize,
	pub kind: LinkKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
	Passing,
	Failing,
	Running,
	Unknown,
}

impl BuildStatus {
	pub fn css(self) -> &'static str {
		match self {
			BuildStatus::Passing => "#2ecc71",
			BuildStatus::Failing => "#e74c3c",
			BuildStatus::Running => "#f1c40f",
			BuildStatus::Unknown => "#95a5a6",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketInfo {
	pub key: String,
	pub title: String,
	pub open: u32,
}

/// Live per-node metrics supplied by the dashboard backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetrics {
	#[serde(default)]
	pub build: Option<BuildStatus>,
	#[serde(default)]
	pub ticket: Option<TicketInfo>,
}

/// What the inspector panel shows for a selected node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeInspection {
	pub id: String,
	pub kind: NodeKind,
	pub group: String,
	pub neighbors: Vec<String>,
	pub metrics: Option<NodeMetrics>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn color_tokens_resolve() {
		assert_eq!(ColorToken("#ff0000".into()).rgba(), [1.0, 0.0, 0.0, 1.0]);
		assert_eq!(ColorToken("palette:1".into()).css(), PALETTE[1]);
		assert_eq!(ColorToken("nonsense".into()).css(), PALETTE[0]);
	}

	#[test]
	fn dangling_links_are_not_resolved() {
		let node = |id: &str| Node {
			id: id.into(),
			kind: NodeKind::Major,
			group: id.into(),
			radius: 10.0,
			color: ColorToken::palette(0),
			position: None,
			pinned: None,
		};
		let data = GraphData {
			nodes: vec![node("a"), node("b")],
			links: vec![
				Link { source: "a".into(), target: "b".into(), kind: LinkKind::Overlap },
				Link { source: "a".into(), target: "ghost".into(), kind: LinkKind::Overlap },
			],
		};
		let resolved = data.resolved_links();
		assert_eq!(resolved.len(), 1);
		assert_eq!((resolved[0].source, resolved[0].target), (0, 1));
	}
}

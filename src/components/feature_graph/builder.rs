//! Turns the dashboard's static group/feature/overlap description into nodes and links.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::types::{ColorToken, GraphData, Link, LinkKind, Node, NodeKind};

pub const MINOR_RADIUS: f32 = 6.0;
const MAJOR_BASE_RADIUS: f32 = 14.0;
const MAJOR_RADIUS_PER_SQRT_FEATURE: f32 = 2.5;

/// A top-level group; becomes a major node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MajorGroup {
	/// Also the group name its features point at.
	pub id: String,
	/// Falls back to a palette slot by position.
	#[serde(default)]
	pub color: Option<ColorToken>,
	/// Marks the major every other major links to.
	#[serde(default)]
	pub hub: bool,
}

/// Minor features owned by one group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureList {
	/// Id of the owning major.
	pub group: String,
	/// Feature ids, in drawing order.
	pub features: Vec<String>,
}

/// Two feature ids that share work across groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapPair(pub String, pub String);

/// Static description of the graph, usually loaded from configuration data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
	/// Group nodes.
	pub majors: Vec<MajorGroup>,
	/// Features per group.
	#[serde(default)]
	pub features: Vec<FeatureList>,
	/// Cross-group pairs.
	#[serde(default)]
	pub overlaps: Vec<OverlapPair>,
}

impl GraphSpec {
	/// Reads the description from JSON.
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(json)
	}

	/// See [`build_graph`].
	pub fn build(&self) -> GraphData {
		build_graph(&self.majors, &self.features, &self.overlaps)
	}
}

/// Builds the node/link set. Same input, same output, same order.
pub fn build_graph(
	majors: &[MajorGroup],
	features: &[FeatureList],
	overlaps: &[OverlapPair],
) -> GraphData {
	let mut seen: HashSet<&str> = HashSet::new();
	let mut nodes = Vec::new();
	let mut links = Vec::new();

	let major_ids: Vec<&MajorGroup> = majors.iter().filter(|m| seen.insert(m.id.as_str())).collect();

	for (slot, major) in major_ids.iter().enumerate() {
		let feature_count: usize = features
			.iter()
			.filter(|f| f.group == major.id)
			.map(|f| f.features.len())
			.sum();
		nodes.push(Node {
			id: major.id.clone(),
			kind: NodeKind::Major,
			group: major.id.clone(),
			radius: MAJOR_BASE_RADIUS
				+ (feature_count as f32).sqrt() * MAJOR_RADIUS_PER_SQRT_FEATURE,
			color: major.color.clone().unwrap_or_else(|| ColorToken::palette(slot)),
			position: None,
			pinned: None,
		});
	}

	for list in features {
		let Some(owner) = major_ids.iter().find(|m| m.id == list.group) else {
			log::debug!("dropping features of unknown group {}", list.group);
			continue;
		};
		let color = nodes
			.iter()
			.find(|n| n.id == owner.id)
			.map(|n| n.color.clone())
			.unwrap_or_else(|| ColorToken::palette(0));
		for feature in &list.features {
			if !seen.insert(feature.as_str()) {
				log::debug!("duplicate node id {feature}, keeping first");
				continue;
			}
			nodes.push(Node {
				id: feature.clone(),
				kind: NodeKind::Minor,
				group: owner.id.clone(),
				radius: MINOR_RADIUS,
				color: color.clone(),
				position: None,
				pinned: None,
			});
			links.push(Link {
				source: feature.clone(),
				target: owner.id.clone(),
				kind: LinkKind::Subfeature,
			});
		}
	}

	let hub = major_ids.iter().find(|m| m.hub).or(major_ids.first());
	if let Some(hub) = hub {
		for major in major_ids.iter().filter(|m| m.id != hub.id) {
			links.push(Link {
				source: hub.id.clone(),
				target: major.id.clone(),
				kind: LinkKind::Orchestrator,
			});
		}
	}

	let mut declared: HashSet<(&str, &str)> = HashSet::new();
	for OverlapPair(a, b) in overlaps {
		if a == b || !seen.contains(a.as_str()) || !seen.contains(b.as_str()) {
			log::debug!("dropping overlap {a} <-> {b}");
			continue;
		}
		if !declared.insert((a.as_str(), b.as_str())) {
			continue;
		}
		links.push(Link {
			source: a.clone(),
			target: b.clone(),
			kind: LinkKind::Overlap,
		});
	}

	GraphData { nodes, links }
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	fn sample() -> GraphSpec {
		GraphSpec {
			majors: vec![
				MajorGroup { id: "core".into(), color: None, hub: false },
				MajorGroup { id: "ui".into(), color: None, hub: true },
				MajorGroup { id: "ops".into(), color: None, hub: false },
			],
			features: vec![
				FeatureList { group: "core".into(), features: vec!["parser".into(), "eval".into()] },
				FeatureList { group: "ui".into(), features: vec!["canvas".into()] },
				FeatureList { group: "missing".into(), features: vec!["orphan".into()] },
			],
			overlaps: vec![
				OverlapPair("parser".into(), "canvas".into()),
				OverlapPair("parser".into(), "nowhere".into()),
				OverlapPair("eval".into(), "eval".into()),
			],
		}
	}

	#[test]
	fn builds_all_link_kinds() {
		let graph = sample().build();
		let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
		assert_eq!(ids, ["core", "ui", "ops", "parser", "eval", "canvas"]);

		let count = |kind| graph.links.iter().filter(|l| l.kind == kind).count();
		assert_eq!(count(LinkKind::Subfeature), 3);
		assert_eq!(count(LinkKind::Orchestrator), 2);
		assert_eq!(count(LinkKind::Overlap), 1);

		// hub flag wins over position
		assert!(graph
			.links
			.iter()
			.filter(|l| l.kind == LinkKind::Orchestrator)
			.all(|l| l.source == "ui"));
	}

	#[test]
	fn every_link_endpoint_exists() {
		let graph = sample().build();
		assert_eq!(graph.resolved_links().len(), graph.links.len());
	}

	#[test]
	fn majors_grow_with_features() {
		let graph = sample().build();
		assert!(graph.nodes[0].radius > graph.nodes[2].radius);
		assert_eq!(graph.nodes[3].radius, MINOR_RADIUS);
		assert_eq!(graph.nodes[3].color, graph.nodes[0].color);
	}

	#[test]
	fn parses_json_description() {
		let spec = GraphSpec::from_json(
			r##"{
				"majors": [{ "id": "a", "color": "#102030" }, { "id": "b" }],
				"features": [{ "group": "a", "features": ["a1"] }],
				"overlaps": [["a1", "b"]]
			}"##,
		)
		.unwrap();
		let graph = spec.build();
		assert_eq!(graph.nodes.len(), 3);
		assert_eq!(graph.links.len(), 3);
		assert_eq!(graph.nodes[0].color.css(), "#102030");
	}

	fn arb_spec() -> impl Strategy<Value = GraphSpec> {
		let majors = prop::collection::vec("[a-e]", 1..6);
		let features = prop::collection::vec(("[a-e]", prop::collection::vec("[f-p]{1,2}", 0..5)), 0..6);
		let overlaps = prop::collection::vec(("[a-p]{1,2}", "[a-p]{1,2}"), 0..10);
		(majors, features, overlaps).prop_map(|(majors, features, overlaps)| GraphSpec {
			majors: majors
				.into_iter()
				.map(|id| MajorGroup { id, color: None, hub: false })
				.collect(),
			features: features
				.into_iter()
				.map(|(group, features)| FeatureList { group, features })
				.collect(),
			overlaps: overlaps.into_iter().map(|(a, b)| OverlapPair(a, b)).collect(),
		})
	}

	proptest! {
		#[test]
		fn build_is_deterministic(spec in arb_spec()) {
			prop_assert_eq!(spec.build(), spec.build());
		}

		#[test]
		fn built_links_never_dangle(spec in arb_spec()) {
			let graph = spec.build();
			prop_assert_eq!(graph.resolved_links().len(), graph.links.len());
			let unique: HashSet<_> = graph.nodes.iter().map(|n| &n.id).collect();
			prop_assert_eq!(unique.len(), graph.nodes.len());
		}
	}
}

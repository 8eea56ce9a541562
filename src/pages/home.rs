use std::collections::HashMap;

use leptos::prelude::*;

use crate::components::feature_graph::{
	BuildStatus, FeatureGraph3d, FeatureGraphCanvas, GraphData, GraphSpec, NodeInspection, NodeMetrics,
	TicketInfo, ViewerConfig,
};

/// Dashboard layout shipped with the demo page.
const SAMPLE_GRAPH: &str = r##"{
	"majors": [
		{ "id": "platform", "hub": true },
		{ "id": "auth", "color": "#e94560" },
		{ "id": "billing" },
		{ "id": "search" },
		{ "id": "reporting" },
		{ "id": "mobile" }
	],
	"features": [
		{ "group": "platform", "features": ["feature-flags", "audit-log", "rate-limits", "webhooks", "jobs"] },
		{ "group": "auth", "features": ["sso", "mfa", "sessions", "api-keys", "roles"] },
		{ "group": "billing", "features": ["invoices", "plans", "usage-metering", "tax", "refunds"] },
		{ "group": "search", "features": ["indexer", "query-parser", "facets", "synonyms", "ranking"] },
		{ "group": "reporting", "features": ["dashboards", "exports", "scheduled-reports", "alerts", "charts"] },
		{ "group": "mobile", "features": ["push", "offline-sync", "deep-links", "biometrics", "crash-reports"] }
	],
	"overlaps": [
		["sso", "sessions"],
		["api-keys", "rate-limits"],
		["roles", "audit-log"],
		["mfa", "biometrics"],
		["usage-metering", "rate-limits"],
		["usage-metering", "dashboards"],
		["invoices", "exports"],
		["tax", "invoices"],
		["plans", "feature-flags"],
		["indexer", "jobs"],
		["ranking", "facets"],
		["query-parser", "synonyms"],
		["dashboards", "charts"],
		["alerts", "push"],
		["alerts", "webhooks"],
		["scheduled-reports", "jobs"],
		["offline-sync", "sessions"],
		["deep-links", "sso"],
		["crash-reports", "audit-log"],
		["facets", "dashboards"]
	]
}"##;

fn sample_metrics() -> HashMap<String, NodeMetrics> {
	let build = |status| NodeMetrics {
		build: Some(status),
		ticket: None,
	};
	let mut metrics = HashMap::new();
	metrics.insert("sso".to_string(), build(BuildStatus::Passing));
	metrics.insert("invoices".to_string(), build(BuildStatus::Failing));
	metrics.insert("indexer".to_string(), build(BuildStatus::Running));
	metrics.insert(
		"offline-sync".to_string(),
		NodeMetrics {
			build: Some(BuildStatus::Failing),
			ticket: Some(TicketInfo {
				key: "MOB-212".into(),
				title: "Conflicts lost on reconnect".into(),
				open: 3,
			}),
		},
	);
	metrics
}

#[component]
fn Inspector(selected: ReadSignal<Option<NodeInspection>>) -> impl IntoView {
	move || {
		selected.get().map(|node| {
			let build = node
				.metrics
				.as_ref()
				.and_then(|m| m.build)
				.map(|b| format!("{b:?}"))
				.unwrap_or_else(|| "n/a".into());
			let ticket = node.metrics.as_ref().and_then(|m| m.ticket.clone());
			view! {
				<aside class="inspector">
					<h2>{node.id.clone()}</h2>
					<p>{format!("{:?} in {}", node.kind, node.group)}</p>
					<p>"Build: " {build}</p>
					{ticket.map(|t| view! { <p>{format!("{} ({} open): {}", t.key, t.open, t.title)}</p> })}
					<ul>
						{node.neighbors.into_iter().map(|n| view! { <li>{n}</li> }).collect_view()}
					</ul>
				</aside>
			}
		})
	}
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let spec = GraphSpec::from_json(SAMPLE_GRAPH);
	let majors: Vec<String> = spec
		.as_ref()
		.map(|s| s.majors.iter().map(|m| m.id.clone()).collect())
		.unwrap_or_default();
	let graph_data: Signal<GraphData> = {
		let data = spec.as_ref().map(GraphSpec::build).unwrap_or_default();
		Signal::derive(move || data.clone())
	};
	let load_error = spec.err().map(|e| e.to_string());

	let (search, set_search) = signal(String::new());
	let hidden = RwSignal::new(Vec::<String>::new());
	let reset = RwSignal::new(0u32);
	let relayout = RwSignal::new(0u32);
	let three_d = RwSignal::new(false);
	let (selected, set_selected) = signal(None::<NodeInspection>);
	let on_select = Callback::new(move |node: Option<NodeInspection>| set_selected.set(node));

	let toggles = majors
		.into_iter()
		.map(|group| {
			let label = group.clone();
			let is_hidden = {
				let group = group.clone();
				move || hidden.with(|h| h.contains(&group))
			};
			let toggle = move |_| {
				hidden.update(|h| match h.iter().position(|g| *g == group) {
					Some(i) => {
						h.remove(i);
					}
					None => h.push(group.clone()),
				})
			};
			view! {
				<button class="group-toggle" class:off=is_hidden on:click=toggle>
					{label}
				</button>
			}
		})
		.collect_view();

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>
			{load_error.map(|e| view! { <p class="error">"Could not load graph: " {e}</p> })}

			<div class="fullscreen-graph">
				<Show
					when=move || three_d.get()
					fallback=move || {
						view! {
							<FeatureGraphCanvas
								data=graph_data
								config=ViewerConfig::default()
								search=search
								hidden_groups=hidden
								metrics=sample_metrics()
								reset=reset
								relayout=relayout
								on_select=on_select
								fullscreen=true
							/>
						}
					}
				>
					<FeatureGraph3d data=graph_data reset=reset />
				</Show>

				<div class="graph-overlay">
					<h1>"Feature Graph"</h1>
					<p class="subtitle">
						"Drag nodes to reposition. Scroll to zoom. Drag background to pan."
					</p>
					<input
						type="search"
						placeholder="Search features"
						prop:value=search
						on:input=move |ev| set_search.set(event_target_value(&ev))
					/>
					<div class="group-toggles">{toggles}</div>
					<button on:click=move |_| reset.update(|n| *n += 1)>"Reset view"</button>
					<button on:click=move |_| relayout.update(|n| *n += 1)>"Re-layout"</button>
					<button on:click=move |_| three_d.update(|v| *v = !*v)>
						{move || if three_d.get() { "2D view" } else { "3D view" }}
					</button>
				</div>
				<Inspector selected=selected />
			</div>
		</ErrorBoundary>
	}
}

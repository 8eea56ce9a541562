use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent, WheelEvent, Window};

use super::camera::ViewTransform;
use super::channel::{ChannelError, SimulationChannel};
use super::config::ViewerConfig;
use super::render;
use super::state::RenderState;
use super::types::{GraphData, NodeInspection, NodeMetrics, Point2};

/// Screen distance past which a press becomes a drag instead of a click.
const CLICK_SLOP: f64 = 4.0;

struct Runtime {
	state: RenderState,
	channel: SimulationChannel,
	ctx: CanvasRenderingContext2d,
	last_frame: Option<f64>,
}

/// Everything the canvas owns outside Leptos. `teardown` breaks the
/// frame-closure cycle and stops the engine.
#[derive(Default)]
struct CanvasView {
	runtime: RefCell<Option<Runtime>>,
	animate: RefCell<Option<Closure<dyn FnMut(f64)>>>,
	frame: Cell<Option<i32>>,
	resize: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl CanvasView {
	fn teardown(&self) {
		if let Some(window) = web_sys::window() {
			if let Some(id) = self.frame.take() {
				let _ = window.cancel_animation_frame(id);
			}
			if let Some(cb) = self.resize.borrow_mut().take() {
				let _ = window.remove_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			}
		}
		self.animate.borrow_mut().take();
		if let Some(mut rt) = self.runtime.borrow_mut().take() {
			rt.channel.destroy();
		}
	}

	fn request_frame(&self) {
		let Some(window) = web_sys::window() else {
			return;
		};
		if let Some(cb) = self.animate.borrow().as_ref() {
			self.frame
				.set(window.request_animation_frame(cb.as_ref().unchecked_ref()).ok());
		}
	}

	fn with<R>(&self, f: impl FnOnce(&mut Runtime) -> R) -> Option<R> {
		self.runtime.borrow_mut().as_mut().map(f)
	}
}

fn post(result: Result<(), ChannelError>) {
	if let Err(err) = result {
		log::debug!("layout message dropped: {err}");
	}
}

fn viewport_size(window: &Window, canvas: &HtmlCanvasElement, fullscreen: bool) -> (f64, f64) {
	let inner = |v: Result<JsValue, JsValue>, fallback| v.ok().and_then(|v| v.as_f64()).unwrap_or(fallback);
	if fullscreen {
		(inner(window.inner_width(), 800.0), inner(window.inner_height(), 600.0))
	} else {
		let parent = canvas.parent_element();
		(
			parent.as_ref().map(|p| p.client_width() as f64).filter(|w| *w > 0.0).unwrap_or(800.0),
			parent.as_ref().map(|p| p.client_height() as f64).filter(|h| *h > 0.0).unwrap_or(600.0),
		)
	}
}

fn pointer(canvas_ref: NodeRef<leptos::html::Canvas>, ev: &MouseEvent) -> Option<(f64, f64)> {
	let canvas: HtmlCanvasElement = canvas_ref.get_untracked()?.into();
	let rect = canvas.get_bounding_client_rect();
	Some((ev.client_x() as f64 - rect.left(), ev.client_y() as f64 - rect.top()))
}

fn frame(rt: &mut Runtime, now: f64) {
	let dt = rt.last_frame.map(|t| now - t).unwrap_or(16.0).clamp(0.0, 100.0);
	rt.last_frame = Some(now);

	let outcome = rt.channel.poll(&mut rt.state);
	if outcome.settled {
		rt.state.settle_fit();
	}
	rt.state.begin_frame(dt);
	render::render(&rt.state, &mut rt.ctx);
}

/// 2D force-directed view of a feature graph.
#[component]
pub fn FeatureGraphCanvas(
	#[prop(into)] data: Signal<GraphData>,
	#[prop(optional)] config: ViewerConfig,
	#[prop(into, optional)] search: MaybeProp<String>,
	#[prop(into, optional)] hidden_groups: MaybeProp<Vec<String>>,
	#[prop(into, optional)] metrics: MaybeProp<HashMap<String, NodeMetrics>>,
	/// Bump to ease back to the auto-fit framing.
	#[prop(into, optional)]
	reset: MaybeProp<u32>,
	/// Bump to restart the simulation from the current positions.
	#[prop(into, optional)]
	relayout: MaybeProp<u32>,
	#[prop(optional)] on_select: Option<Callback<Option<NodeInspection>>>,
	#[prop(default = false)] fullscreen: bool,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let view = Rc::new(CanvasView::default());

	let cleanup = StoredValue::new_local(view.clone());
	on_cleanup(move || {
		if let Some(view) = cleanup.try_get_value() {
			view.teardown();
		}
	});

	let view_init = view.clone();
	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let graph = data.get();
		let canvas: HtmlCanvasElement = canvas.into();
		let Some(window) = web_sys::window() else {
			return;
		};
		let (w, h) = viewport_size(&window, &canvas, fullscreen);
		canvas.set_width(w as u32);
		canvas.set_height(h as u32);

		let ctx = match canvas.get_context("2d") {
			Ok(Some(ctx)) => match ctx.dyn_into::<CanvasRenderingContext2d>() {
				Ok(ctx) => ctx,
				Err(_) => return,
			},
			_ => {
				log::warn!("2d canvas context unavailable");
				return;
			}
		};

		view_init.teardown();
		let mut state = RenderState::with_config(&graph, w, h, &config);
		state.set_search(&search.get_untracked().unwrap_or_default());
		for group in hidden_groups.get_untracked().unwrap_or_default() {
			state.set_group_hidden(&group, true);
		}
		state.merge_metrics(metrics.get_untracked().unwrap_or_default());
		let mut channel = SimulationChannel::new();
		if let Err(err) = channel.init(&graph, config.simulation.clone()) {
			log::warn!("layout engine failed to start: {err}");
		}
		*view_init.runtime.borrow_mut() = Some(Runtime {
			state,
			channel,
			ctx,
			last_frame: None,
		});

		if fullscreen {
			let (view_resize, canvas_resize) = (view_init.clone(), canvas.clone());
			let cb = Closure::<dyn FnMut()>::new(move || {
				let Some(win) = web_sys::window() else {
					return;
				};
				let (nw, nh) = viewport_size(&win, &canvas_resize, true);
				canvas_resize.set_width(nw as u32);
				canvas_resize.set_height(nh as u32);
				view_resize.with(|rt| rt.state.resize(nw, nh));
			});
			let _ = window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			*view_init.resize.borrow_mut() = Some(cb);
		}

		let view_anim = view_init.clone();
		*view_init.animate.borrow_mut() = Some(Closure::new(move |now: f64| {
			view_anim.with(|rt| frame(rt, now));
			view_anim.request_frame();
		}));
		view_init.request_frame();
	});

	let view_search = view.clone();
	Effect::new(move |_| {
		let query = search.get().unwrap_or_default();
		view_search.with(|rt| rt.state.set_search(&query));
	});

	let view_groups = view.clone();
	Effect::new(move |_| {
		let wanted: HashSet<String> = hidden_groups.get().unwrap_or_default().into_iter().collect();
		view_groups.with(|rt| {
			let current = rt.state.hidden_groups.clone();
			for group in current.difference(&wanted) {
				rt.state.set_group_hidden(group, false);
			}
			for group in wanted.difference(&current) {
				rt.state.set_group_hidden(group, true);
			}
		});
	});

	let view_metrics = view.clone();
	Effect::new(move |_| {
		let incoming = metrics.get().unwrap_or_default();
		view_metrics.with(|rt| rt.state.merge_metrics(incoming));
	});

	let view_reset = view.clone();
	Effect::new(move |prev: Option<u32>| {
		let n = reset.get().unwrap_or_default();
		if prev.is_some_and(|p| p != n) {
			view_reset.with(|rt| {
				if rt.state.reset_view().is_none() {
					log::debug!("nothing placed yet, reset ignored");
				}
			});
		}
		n
	});

	let view_relayout = view.clone();
	Effect::new(move |prev: Option<u32>| {
		let n = relayout.get().unwrap_or_default();
		if prev.is_some_and(|p| p != n) {
			view_relayout.with(|rt| post(rt.channel.restart()));
		}
		n
	});

	let view_md = view.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let Some((x, y)) = pointer(canvas_ref, &ev) else {
			return;
		};
		view_md.with(|rt| {
			let s = &mut rt.state;
			if let Some(idx) = s.node_at(x, y) {
				let start = s.nodes[idx].position.unwrap_or_default();
				s.drag.active = true;
				s.drag.node_idx = Some(idx);
				s.drag.start_x = x;
				s.drag.start_y = y;
				s.drag.node_start = start;
				s.drag.moved = false;
				s.nodes[idx].pinned = Some(start);
				post(rt.channel.pin(idx, Some(start)));
				post(rt.channel.reheat());
			} else if let Some(cluster) = s.cluster_at(x, y) {
				s.expand_cluster(cluster);
			} else {
				s.pan.active = true;
				s.pan.start_x = x;
				s.pan.start_y = y;
				s.pan.transform_start_x = s.transform.x;
				s.pan.transform_start_y = s.transform.y;
			}
		});
	};

	let view_mm = view.clone();
	let on_mousemove = move |ev: MouseEvent| {
		let Some((x, y)) = pointer(canvas_ref, &ev) else {
			return;
		};
		view_mm.with(|rt| {
			let s = &mut rt.state;
			if s.drag.active {
				let Some(idx) = s.drag.node_idx else {
					return;
				};
				let (dx, dy) = (x - s.drag.start_x, y - s.drag.start_y);
				if dx.hypot(dy) > CLICK_SLOP {
					s.drag.moved = true;
				}
				let k = s.transform.k;
				let p = Point2::new(
					s.drag.node_start.x + (dx / k) as f32,
					s.drag.node_start.y + (dy / k) as f32,
				);
				s.nodes[idx].position = Some(p);
				s.nodes[idx].pinned = Some(p);
				s.request_layout();
				post(rt.channel.pin(idx, Some(p)));
			} else if s.pan.active {
				let tx = s.pan.transform_start_x + (x - s.pan.start_x);
				let ty = s.pan.transform_start_y + (y - s.pan.start_y);
				let k = s.transform.k;
				s.set_view(ViewTransform { x: tx, y: ty, k });
			} else {
				let hovered = s.node_at(x, y);
				s.set_hover(hovered);
			}
		});
	};

	let release = {
		let view = view.clone();
		move |click: Option<(f64, f64)>| -> Option<Option<NodeInspection>> {
			view.with(|rt| {
				let s = &mut rt.state;
				let mut selection = None;
				if s.drag.active {
					if let Some(idx) = s.drag.node_idx {
						s.nodes[idx].pinned = None;
						post(rt.channel.pin(idx, None));
						post(rt.channel.cool());
						if !s.drag.moved && click.is_some() {
							selection = Some(s.select(Some(idx)));
						}
					}
				} else if s.pan.active {
					if let Some((x, y)) = click {
						let travelled = (x - s.pan.start_x).hypot(y - s.pan.start_y);
						if travelled <= CLICK_SLOP && s.selected.is_some() {
							selection = Some(s.select(None));
						}
					}
				}
				s.drag.active = false;
				s.drag.node_idx = None;
				s.pan.active = false;
				selection
			})
			.flatten()
		}
	};

	let release_up = release.clone();
	let on_mouseup = move |ev: MouseEvent| {
		let click = pointer(canvas_ref, &ev);
		if let (Some(selection), Some(cb)) = (release_up(click), on_select) {
			cb.run(selection);
		}
	};

	let view_ml = view.clone();
	let on_mouseleave = move |_: MouseEvent| {
		release(None);
		view_ml.with(|rt| rt.state.set_hover(None));
	};

	let view_wh = view.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let Some((x, y)) = pointer(canvas_ref, &ev) else {
			return;
		};
		let factor = if ev.delta_y() > 0.0 { 0.9 } else { 1.1 };
		view_wh.with(|rt| rt.state.zoom_at(x, y, factor));
	};

	view! {
		<canvas
			node_ref=canvas_ref
			class="feature-graph-canvas"
			on:mousedown=on_mousedown
			on:mousemove=on_mousemove
			on:mouseup=on_mouseup
			on:mouseleave=on_mouseleave
			on:wheel=on_wheel
			style="display: block; cursor: grab;"
		/>
	}
}

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::prelude::*;
use web_sys::{HtmlCanvasElement, HtmlDivElement, MouseEvent, WheelEvent};

use super::camera::OrbitCamera;
use super::channel::SimulationChannel;
use super::config::ViewerConfig;
use super::frozen::FreezeController;
use super::gpu::{GpuBackend, SceneRenderer, WgpuRenderer};
use super::scene::Scene3d;
use super::state::RenderState;
use super::types::GraphData;

struct Runtime3d<R = WgpuRenderer> {
	/// Headless: only receives positions until the graph freezes.
	state: RenderState,
	channel: SimulationChannel,
	freeze: FreezeController,
	scene: Option<Scene3d>,
	camera: OrbitCamera,
	gpu: Option<GpuBackend<R>>,
	uploaded: bool,
	last_frame: Option<f64>,
	config: ViewerConfig,
	/// Drawing buffer size in pixels.
	size: (u32, u32),
}

impl<R: SceneRenderer> Runtime3d<R> {
	fn new(
		data: &GraphData,
		config: &ViewerConfig,
		channel: SimulationChannel,
		freeze: FreezeController,
		(width, height): (u32, u32),
	) -> Self {
		let mut camera = OrbitCamera::new(&config.camera);
		camera.set_aspect(width as f32, height as f32);
		Self {
			state: RenderState::with_config(data, width as f64, height as f64, config),
			channel,
			freeze,
			scene: None,
			camera,
			gpu: None,
			uploaded: false,
			last_frame: None,
			config: config.clone(),
			size: (width, height),
		}
	}

	/// `created` is the size the backend was built at; a resize that landed
	/// while it was initialising is applied here.
	fn attach_gpu(&mut self, mut gpu: GpuBackend<R>, created: (u32, u32)) {
		if created != self.size {
			gpu.resize(self.size.0, self.size.1);
		}
		self.gpu = Some(gpu);
		self.uploaded = false;
	}

	fn resize(&mut self, width: u32, height: u32) {
		if (width, height) == self.size || width == 0 || height == 0 {
			return;
		}
		self.size = (width, height);
		self.camera.set_aspect(width as f32, height as f32);
		self.state.resize(width as f64, height as f64);
		if let Some(gpu) = self.gpu.as_mut() {
			gpu.resize(width, height);
			log::debug!("3d surface resized to {width}x{height} on {:?}", gpu.kind());
		}
	}

	fn frame(&mut self, now: f64) -> bool {
		let dt = self.last_frame.map(|t| now - t).unwrap_or(16.0).clamp(0.0, 100.0);
		self.last_frame = Some(now);

		let mut froze = false;
		if !self.freeze.is_frozen() {
			let outcome = self.channel.poll(&mut self.state);
			if let Some(graph) = self.freeze.observe(now, &outcome, &self.state, &mut self.channel) {
				let scene =
					Scene3d::build(&graph, self.config.particles.pool_size, self.config.particles.speed);
				if let Some(bounds) = scene.bounds {
					self.camera.fit_sphere(
						bounds,
						self.config.camera.fill_fraction as f32,
						self.config.camera.pan_bound_factor,
					);
				}
				self.scene = Some(scene);
				self.uploaded = false;
				froze = true;
			}
		}

		if let (Some(scene), Some(gpu)) = (self.scene.as_mut(), self.gpu.as_mut()) {
			if !self.uploaded {
				gpu.upload(scene);
				self.uploaded = true;
			}
			scene.particles.advance((dt / 1000.0) as f32);
			if let Err(err) = gpu.draw(&self.camera, &scene.particle_instances()) {
				log::warn!("3d frame skipped: {err}");
			}
		}
		froze
	}

	fn teardown(&mut self) {
		self.channel.destroy();
		if let Some(gpu) = self.gpu.as_mut() {
			gpu.release();
		}
	}
}

#[derive(Default)]
struct SceneView {
	runtime: RefCell<Option<Runtime3d>>,
	animate: RefCell<Option<Closure<dyn FnMut(f64)>>>,
	frame: Cell<Option<i32>>,
	resize: RefCell<Option<Closure<dyn FnMut()>>>,
	/// Bumped on teardown so late GPU initialisations can tell they are stale.
	generation: Cell<u64>,
}

impl SceneView {
	fn teardown(&self) {
		self.generation.set(self.generation.get() + 1);
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
			rt.teardown();
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

	fn with<R>(&self, f: impl FnOnce(&mut Runtime3d) -> R) -> Option<R> {
		self.runtime.borrow_mut().as_mut().map(f)
	}
}

// looked up each time: the GPU fallback may have swapped the element
fn host_canvas(host: &HtmlDivElement) -> Option<HtmlCanvasElement> {
	host.query_selector("canvas")
		.ok()
		.flatten()
		.and_then(|el| el.dyn_into::<HtmlCanvasElement>().ok())
}

fn host_size(host: &HtmlDivElement) -> (u32, u32) {
	(
		Some(host.client_width()).filter(|w| *w > 0).unwrap_or(800) as u32,
		Some(host.client_height()).filter(|h| *h > 0).unwrap_or(600) as u32,
	)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Drag {
	Orbit,
	Pan,
}

/// Starts the GPU backend in the background and hands it to the runtime.
#[cfg(target_arch = "wasm32")]
fn start_gpu(view: Rc<SceneView>, canvas: HtmlCanvasElement, width: u32, height: u32) {
	use super::gpu::{BackendKind, select_with_fallback};

	let generation = view.generation.get();
	leptos::task::spawn_local(async move {
		let current = RefCell::new(canvas);
		let attempts = Cell::new(0u32);
		let selected = select_with_fallback(BackendKind::WebGpu, |kind| {
			// a canvas that already handed out a context cannot switch APIs
			if attempts.replace(attempts.get() + 1) > 0 {
				let fresh = current
					.borrow()
					.clone_node()
					.ok()
					.and_then(|n| n.dyn_into::<HtmlCanvasElement>().ok());
				if let Some(fresh) = fresh {
					let _ = current.borrow().replace_with_with_node_1(&fresh);
					*current.borrow_mut() = fresh;
				}
			}
			let target = wgpu::SurfaceTarget::Canvas(current.borrow().clone());
			async move { WgpuRenderer::new(kind, target, width, height).await }
		})
		.await;

		match selected {
			Ok((kind, renderer)) => {
				let mut backend = GpuBackend::new(kind, renderer);
				if view.generation.get() != generation {
					backend.release();
					return;
				}
				view.with(|rt| rt.attach_gpu(backend, (width, height)));
			}
			Err(err) => log::warn!("3d view disabled, no GPU backend: {err}"),
		}
	});
}

#[cfg(not(target_arch = "wasm32"))]
fn start_gpu(_view: Rc<SceneView>, _canvas: HtmlCanvasElement, _width: u32, _height: u32) {
	log::debug!("3d view needs a browser GPU context");
}

/// 3D view: links as glowing curved tubes over a frozen snapshot of the layout.
#[component]
pub fn FeatureGraph3d(
	#[prop(into)] data: Signal<GraphData>,
	#[prop(optional)] config: ViewerConfig,
	/// Bump to return the camera to its fitted pose.
	#[prop(into, optional)]
	reset: MaybeProp<u32>,
) -> impl IntoView {
	let host_ref = NodeRef::<leptos::html::Div>::new();
	let view = Rc::new(SceneView::default());
	let frozen = RwSignal::new(false);

	let cleanup = StoredValue::new_local(view.clone());
	on_cleanup(move || {
		if let Some(view) = cleanup.try_get_value() {
			view.teardown();
		}
	});

	let view_init = view.clone();
	Effect::new(move |_| {
		let Some(host) = host_ref.get() else {
			return;
		};
		let graph = data.get();
		let Some(canvas) = host_canvas(&host) else {
			return;
		};
		let Some(window) = web_sys::window() else {
			return;
		};
		let (w, h) = host_size(&host);
		canvas.set_width(w);
		canvas.set_height(h);

		view_init.teardown();
		frozen.set(false);

		let mut channel = SimulationChannel::new();
		if let Err(err) = channel.init(&graph, config.simulation.clone()) {
			log::warn!("layout engine failed to start: {err}");
		}
		let mut freeze = FreezeController::new(config.freeze.clone());
		freeze.arm(window.performance().map(|p| p.now()).unwrap_or_default());
		*view_init.runtime.borrow_mut() = Some(Runtime3d::new(&graph, &config, channel, freeze, (w, h)));
		start_gpu(view_init.clone(), canvas, w, h);

		let view_resize = view_init.clone();
		let cb = Closure::<dyn FnMut()>::new(move || {
			let (nw, nh) = host_size(&host);
			if let Some(canvas) = host_canvas(&host) {
				canvas.set_width(nw);
				canvas.set_height(nh);
			}
			view_resize.with(|rt| rt.resize(nw, nh));
		});
		let _ = window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
		*view_init.resize.borrow_mut() = Some(cb);

		let view_anim = view_init.clone();
		*view_init.animate.borrow_mut() = Some(Closure::new(move |now: f64| {
			if view_anim.with(|rt| rt.frame(now)) == Some(true) {
				frozen.set(true);
			}
			view_anim.request_frame();
		}));
		view_init.request_frame();
	});

	let view_reset = view.clone();
	Effect::new(move |prev: Option<u32>| {
		let n = reset.get().unwrap_or_default();
		if prev.is_some_and(|p| p != n) {
			view_reset.with(|rt| rt.camera.reset());
		}
		n
	});

	let drag: Rc<Cell<Option<(Drag, f64, f64)>>> = Rc::new(Cell::new(None));

	let drag_md = drag.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let mode = if ev.button() == 2 || ev.shift_key() { Drag::Pan } else { Drag::Orbit };
		drag_md.set(Some((mode, ev.client_x() as f64, ev.client_y() as f64)));
	};

	let (drag_mm, view_mm) = (drag.clone(), view.clone());
	let on_mousemove = move |ev: MouseEvent| {
		let Some((mode, x, y)) = drag_mm.get() else {
			return;
		};
		let (nx, ny) = (ev.client_x() as f64, ev.client_y() as f64);
		let (dx, dy) = ((nx - x) as f32, (ny - y) as f32);
		view_mm.with(|rt| match mode {
			Drag::Orbit => rt.camera.orbit(dx, dy),
			Drag::Pan => rt.camera.pan(dx, dy),
		});
		drag_mm.set(Some((mode, nx, ny)));
	};

	let drag_mu = drag.clone();
	let on_mouseup = move |_: MouseEvent| drag_mu.set(None);
	let on_mouseleave = move |_: MouseEvent| drag.set(None);

	let view_wh = view.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let delta = if ev.delta_y() > 0.0 { -1.0 } else { 1.0 };
		view_wh.with(|rt| rt.camera.zoom(delta));
	};

	view! {
		<div
			node_ref=host_ref
			class="feature-graph-3d"
			style="position: relative; width: 100%; height: 100%;"
			on:mousedown=on_mousedown
			on:mousemove=on_mousemove
			on:mouseup=on_mouseup
			on:mouseleave=on_mouseleave
			on:wheel=on_wheel
			on:contextmenu=|ev: MouseEvent| ev.prevent_default()
		>
			<canvas style="display: block;" />
			<Show when=move || !frozen.get()>
				<div class="graph-overlay">"Settling layout..."</div>
			</Show>
		</div>
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::feature_graph::gpu::{BackendError, BackendKind};
	use crate::components::feature_graph::scene::Instance;

	#[derive(Clone, Default)]
	struct Sizes(Rc<RefCell<Vec<(u32, u32)>>>);

	impl SceneRenderer for Sizes {
		fn upload(&mut self, _: &Scene3d) {}
		fn resize(&mut self, width: u32, height: u32) {
			self.0.borrow_mut().push((width, height));
		}
		fn draw(&mut self, _: &OrbitCamera, _: &[Instance]) -> Result<(), BackendError> {
			Ok(())
		}
		fn release(&mut self) {}
	}

	fn runtime() -> Runtime3d<Sizes> {
		let config = ViewerConfig::default();
		let freeze = FreezeController::new(config.freeze.clone());
		Runtime3d::new(&GraphData::default(), &config, SimulationChannel::new(), freeze, (800, 600))
	}

	#[test]
	fn resize_reaches_camera_and_surface() {
		let sizes = Sizes::default();
		let mut rt = runtime();
		rt.attach_gpu(GpuBackend::new(BackendKind::WebGl, sizes.clone()), (800, 600));
		assert!(sizes.0.borrow().is_empty());

		rt.resize(1200, 600);
		rt.resize(1200, 600);
		rt.resize(0, 600);
		assert_eq!(rt.camera.aspect, 2.0);
		assert_eq!((rt.state.width, rt.state.height), (1200.0, 600.0));
		assert_eq!(*sizes.0.borrow(), [(1200, 600)]);
	}

	#[test]
	fn late_backend_catches_up_with_resize() {
		let sizes = Sizes::default();
		let mut rt = runtime();
		rt.resize(1024, 768);
		rt.attach_gpu(GpuBackend::new(BackendKind::WebGpu, sizes.clone()), (800, 600));
		assert_eq!(*sizes.0.borrow(), [(1024, 768)]);
	}

	#[test]
	fn released_backend_ignores_resize() {
		let sizes = Sizes::default();
		let mut rt = runtime();
		rt.attach_gpu(GpuBackend::new(BackendKind::WebGl, sizes.clone()), (800, 600));
		rt.teardown();
		rt.resize(640, 480);
		assert!(sizes.0.borrow().is_empty());
		assert_eq!(rt.size, (640, 480));
	}
}

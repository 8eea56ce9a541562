//! GPU backends for the 3D view.
//!
//! Both variants drive the same wgpu renderer over a different browser API:
//! WebGPU with lit shading, or WebGL2 with flat shading. Selection tries the
//! preferred variant first and falls back once on any initialisation failure.

use std::future::Future;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;
use wgpu::util::DeviceExt;

use super::camera::OrbitCamera;
use super::scene::{Instance, Mesh, MeshVertex, Scene3d};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CLEAR: wgpu::Color = wgpu::Color {
	r: 0.102,
	g: 0.102,
	b: 0.180,
	a: 1.0,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
	WebGpu,
	WebGl,
}

impl BackendKind {
	pub fn backends(self) -> wgpu::Backends {
		match self {
			BackendKind::WebGpu => wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::PRIMARY,
			BackendKind::WebGl => wgpu::Backends::GL,
		}
	}

	pub fn fallback(self) -> Option<BackendKind> {
		match self {
			BackendKind::WebGpu => Some(BackendKind::WebGl),
			BackendKind::WebGl => None,
		}
	}

	/// The fallback path skips lighting.
	pub fn lit(self) -> bool {
		self == BackendKind::WebGpu
	}

	fn limits(self) -> wgpu::Limits {
		match self {
			BackendKind::WebGpu => wgpu::Limits::default(),
			BackendKind::WebGl => wgpu::Limits::downlevel_webgl2_defaults(),
		}
	}
}

#[derive(Debug, Error)]
pub enum BackendError {
	#[error("could not create surface: {0}")]
	Surface(#[from] wgpu::CreateSurfaceError),
	#[error("no {0:?} adapter available")]
	NoAdapter(BackendKind),
	#[error("device request failed: {0}")]
	Device(#[from] wgpu::RequestDeviceError),
	#[error("surface does not support the adapter")]
	Unsupported,
	#[error("could not acquire frame: {0}")]
	Frame(#[from] wgpu::SurfaceError),
	#[error("render target unavailable: {0}")]
	Target(String),
}

/// Runs `init` for `preferred`, then for its fallback if that fails.
pub async fn select_with_fallback<B, F, Fut>(
	preferred: BackendKind,
	mut init: F,
) -> Result<(BackendKind, B), BackendError>
where
	F: FnMut(BackendKind) -> Fut,
	Fut: Future<Output = Result<B, BackendError>>,
{
	let mut kind = preferred;
	loop {
		match init(kind).await {
			Ok(backend) => {
				log::info!("3d view using {kind:?}");
				return Ok((kind, backend));
			}
			Err(err) => match kind.fallback() {
				Some(next) => {
					log::warn!("{kind:?} initialisation failed ({err}), falling back to {next:?}");
					kind = next;
				}
				None => return Err(err),
			},
		}
	}
}

/// What the 3D component needs from a renderer, whichever API is behind it.
pub trait SceneRenderer {
	fn upload(&mut self, scene: &Scene3d);
	fn resize(&mut self, width: u32, height: u32);
	fn draw(&mut self, camera: &OrbitCamera, particles: &[Instance]) -> Result<(), BackendError>;
	/// Frees GPU memory. Further draws are no-ops.
	fn release(&mut self);
}

/// Tagged union over the two browser GPU APIs.
pub enum GpuBackend<R = WgpuRenderer> {
	WebGpu(R),
	WebGl(R),
	Released,
}

impl<R: SceneRenderer> GpuBackend<R> {
	pub fn new(kind: BackendKind, renderer: R) -> Self {
		match kind {
			BackendKind::WebGpu => GpuBackend::WebGpu(renderer),
			BackendKind::WebGl => GpuBackend::WebGl(renderer),
		}
	}

	pub fn kind(&self) -> Option<BackendKind> {
		match self {
			GpuBackend::WebGpu(_) => Some(BackendKind::WebGpu),
			GpuBackend::WebGl(_) => Some(BackendKind::WebGl),
			GpuBackend::Released => None,
		}
	}

	fn renderer(&mut self) -> Option<&mut R> {
		match self {
			GpuBackend::WebGpu(r) | GpuBackend::WebGl(r) => Some(r),
			GpuBackend::Released => None,
		}
	}

	pub fn upload(&mut self, scene: &Scene3d) {
		if let Some(r) = self.renderer() {
			r.upload(scene);
		}
	}

	pub fn resize(&mut self, width: u32, height: u32) {
		if let Some(r) = self.renderer() {
			r.resize(width, height);
		}
	}

	pub fn draw(&mut self, camera: &OrbitCamera, particles: &[Instance]) -> Result<(), BackendError> {
		match self.renderer() {
			Some(r) => r.draw(camera, particles),
			None => Ok(()),
		}
	}

	/// Safe to call repeatedly.
	pub fn release(&mut self) {
		if let Some(r) = self.renderer() {
			r.release();
			log::info!("gpu resources released");
		}
		*self = GpuBackend::Released;
	}
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Uniforms {
	view_proj: [[f32; 4]; 4],
	camera_pos: [f32; 3],
	lit: f32,
}

struct GpuMesh {
	vertices: wgpu::Buffer,
	indices: wgpu::Buffer,
	count: u32,
}

impl GpuMesh {
	fn upload(device: &wgpu::Device, mesh: &Mesh, label: &str) -> Option<Self> {
		if mesh.is_empty() {
			return None;
		}
		let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
			label: Some(label),
			contents: bytemuck::cast_slice(&mesh.vertices),
			usage: wgpu::BufferUsages::VERTEX,
		});
		let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
			label: Some(label),
			contents: bytemuck::cast_slice(&mesh.indices),
			usage: wgpu::BufferUsages::INDEX,
		});
		Some(Self {
			vertices,
			indices,
			count: mesh.indices.len() as u32,
		})
	}

	fn destroy(&self) {
		self.vertices.destroy();
		self.indices.destroy();
	}
}

struct SceneBuffers {
	tubes: Option<GpuMesh>,
	glow: Option<GpuMesh>,
	sphere: Option<GpuMesh>,
	markers: wgpu::Buffer,
	marker_count: u32,
	particles: wgpu::Buffer,
	particle_capacity: usize,
}

impl SceneBuffers {
	fn destroy(&self) {
		for mesh in [&self.tubes, &self.glow, &self.sphere].into_iter().flatten() {
			mesh.destroy();
		}
		self.markers.destroy();
		self.particles.destroy();
	}
}

/// wgpu renderer shared by both backend variants.
pub struct WgpuRenderer {
	surface: wgpu::Surface<'static>,
	device: wgpu::Device,
	queue: wgpu::Queue,
	config: wgpu::SurfaceConfiguration,
	solid: wgpu::RenderPipeline,
	glow: wgpu::RenderPipeline,
	instanced: wgpu::RenderPipeline,
	uniforms: wgpu::Buffer,
	bind_group: wgpu::BindGroup,
	depth: wgpu::Texture,
	depth_view: wgpu::TextureView,
	scene: Option<SceneBuffers>,
	lit: bool,
	released: bool,
}

impl WgpuRenderer {
	pub async fn new(
		kind: BackendKind,
		target: impl Into<wgpu::SurfaceTarget<'static>>,
		width: u32,
		height: u32,
	) -> Result<Self, BackendError> {
		let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
			backends: kind.backends(),
			..Default::default()
		});
		let surface = instance.create_surface(target)?;
		let adapter = instance
			.request_adapter(&wgpu::RequestAdapterOptions {
				power_preference: wgpu::PowerPreference::default(),
				force_fallback_adapter: false,
				compatible_surface: Some(&surface),
			})
			.await
			.ok_or(BackendError::NoAdapter(kind))?;
		let (device, queue) = adapter
			.request_device(
				&wgpu::DeviceDescriptor {
					label: Some("feature graph device"),
					required_features: wgpu::Features::empty(),
					required_limits: kind.limits().using_resolution(adapter.limits()),
					memory_hints: wgpu::MemoryHints::default(),
				},
				None,
			)
			.await?;

		let config = surface
			.get_default_config(&adapter, width.max(1), height.max(1))
			.ok_or(BackendError::Unsupported)?;
		surface.configure(&device, &config);

		let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
			label: Some("scene uniforms"),
			size: std::mem::size_of::<Uniforms>() as wgpu::BufferAddress,
			usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
			mapped_at_creation: false,
		});
		let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
			label: Some("scene uniforms layout"),
			entries: &[wgpu::BindGroupLayoutEntry {
				binding: 0,
				visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
				ty: wgpu::BindingType::Buffer {
					ty: wgpu::BufferBindingType::Uniform,
					has_dynamic_offset: false,
					min_binding_size: None,
				},
				count: None,
			}],
		});
		let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
			label: Some("scene uniforms"),
			layout: &layout,
			entries: &[wgpu::BindGroupEntry {
				binding: 0,
				resource: uniforms.as_entire_binding(),
			}],
		});

		let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
			label: Some("scene shader"),
			source: wgpu::ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
		});
		let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
			label: Some("scene pipeline layout"),
			bind_group_layouts: &[&layout],
			push_constant_ranges: &[],
		});
		let builder = PipelineBuilder {
			device: &device,
			layout: &pipeline_layout,
			shader: &shader,
			format: config.format,
		};
		let solid = builder.build("tubes", "vs_mesh", &[MESH_LAYOUT], true);
		let glow = builder.build("glow tubes", "vs_mesh", &[MESH_LAYOUT], false);
		let instanced = builder.build("markers", "vs_instanced", &[MESH_LAYOUT, INSTANCE_LAYOUT], true);

		let (depth, depth_view) = depth_target(&device, config.width, config.height);
		log::debug!("{kind:?} surface configured at {}x{}", config.width, config.height);
		Ok(Self {
			surface,
			device,
			queue,
			config,
			solid,
			glow,
			instanced,
			uniforms,
			bind_group,
			depth,
			depth_view,
			scene: None,
			lit: kind.lit(),
			released: false,
		})
	}
}

impl SceneRenderer for WgpuRenderer {
	fn upload(&mut self, scene: &Scene3d) {
		if self.released {
			return;
		}
		if let Some(old) = self.scene.take() {
			old.destroy();
		}
		let markers = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
			label: Some("marker instances"),
			contents: bytemuck::cast_slice(&scene.markers),
			usage: wgpu::BufferUsages::VERTEX,
		});
		let particle_capacity = scene.particles.len().max(1);
		let particles = self.device.create_buffer(&wgpu::BufferDescriptor {
			label: Some("particle instances"),
			size: (particle_capacity * std::mem::size_of::<Instance>()) as wgpu::BufferAddress,
			usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
			mapped_at_creation: false,
		});
		self.scene = Some(SceneBuffers {
			tubes: GpuMesh::upload(&self.device, &scene.tubes, "link tubes"),
			glow: GpuMesh::upload(&self.device, &scene.glow, "glow tubes"),
			sphere: GpuMesh::upload(&self.device, &scene.sphere, "marker sphere"),
			markers,
			marker_count: scene.markers.len() as u32,
			particles,
			particle_capacity,
		});
	}

	fn resize(&mut self, width: u32, height: u32) {
		if self.released || width == 0 || height == 0 {
			return;
		}
		self.config.width = width;
		self.config.height = height;
		self.surface.configure(&self.device, &self.config);
		self.depth.destroy();
		let (depth, view) = depth_target(&self.device, width, height);
		self.depth = depth;
		self.depth_view = view;
	}

	fn draw(&mut self, camera: &OrbitCamera, particles: &[Instance]) -> Result<(), BackendError> {
		if self.released {
			return Ok(());
		}
		let uniforms = Uniforms {
			view_proj: camera.view_projection_matrix(),
			camera_pos: camera.position(),
			lit: if self.lit { 1.0 } else { 0.0 },
		};
		self.queue
			.write_buffer(&self.uniforms, 0, bytemuck::cast_slice(&[uniforms]));

		let particle_count = match &self.scene {
			Some(scene) => {
				let n = particles.len().min(scene.particle_capacity);
				if n > 0 {
					self.queue
						.write_buffer(&scene.particles, 0, bytemuck::cast_slice(&particles[..n]));
				}
				n as u32
			}
			None => 0,
		};

		let frame = self.surface.get_current_texture()?;
		let view = frame
			.texture
			.create_view(&wgpu::TextureViewDescriptor::default());
		let mut encoder = self
			.device
			.create_command_encoder(&wgpu::CommandEncoderDescriptor {
				label: Some("scene frame"),
			});
		{
			let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
				label: Some("scene pass"),
				color_attachments: &[Some(wgpu::RenderPassColorAttachment {
					view: &view,
					resolve_target: None,
					ops: wgpu::Operations {
						load: wgpu::LoadOp::Clear(CLEAR),
						store: wgpu::StoreOp::Store,
					},
				})],
				depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
					view: &self.depth_view,
					depth_ops: Some(wgpu::Operations {
						load: wgpu::LoadOp::Clear(1.0),
						store: wgpu::StoreOp::Store,
					}),
					stencil_ops: None,
				}),
				timestamp_writes: None,
				occlusion_query_set: None,
			});
			pass.set_bind_group(0, &self.bind_group, &[]);

			if let Some(scene) = &self.scene {
				if let Some(tubes) = &scene.tubes {
					pass.set_pipeline(&self.solid);
					draw_mesh(&mut pass, tubes, None);
				}
				if let Some(sphere) = &scene.sphere {
					pass.set_pipeline(&self.instanced);
					if scene.marker_count > 0 {
						draw_mesh(&mut pass, sphere, Some((&scene.markers, scene.marker_count)));
					}
					if particle_count > 0 {
						draw_mesh(&mut pass, sphere, Some((&scene.particles, particle_count)));
					}
				}
				// transparent last, without depth writes
				if let Some(glow) = &scene.glow {
					pass.set_pipeline(&self.glow);
					draw_mesh(&mut pass, glow, None);
				}
			}
		}
		self.queue.submit(Some(encoder.finish()));
		frame.present();
		Ok(())
	}

	fn release(&mut self) {
		if std::mem::replace(&mut self.released, true) {
			return;
		}
		if let Some(scene) = self.scene.take() {
			scene.destroy();
		}
		self.uniforms.destroy();
		self.depth.destroy();
	}
}

fn draw_mesh(pass: &mut wgpu::RenderPass<'_>, mesh: &GpuMesh, instances: Option<(&wgpu::Buffer, u32)>) {
	pass.set_vertex_buffer(0, mesh.vertices.slice(..));
	pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
	match instances {
		Some((buffer, count)) => {
			pass.set_vertex_buffer(1, buffer.slice(..));
			pass.draw_indexed(0..mesh.count, 0, 0..count);
		}
		None => pass.draw_indexed(0..mesh.count, 0, 0..1),
	}
}

fn depth_target(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
	let texture = device.create_texture(&wgpu::TextureDescriptor {
		label: Some("scene depth"),
		size: wgpu::Extent3d {
			width: width.max(1),
			height: height.max(1),
			depth_or_array_layers: 1,
		},
		mip_level_count: 1,
		sample_count: 1,
		dimension: wgpu::TextureDimension::D2,
		format: DEPTH_FORMAT,
		usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
		view_formats: &[],
	});
	let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
	(texture, view)
}

const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
	wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x4];
// center + radius packed in one vec4
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
	wgpu::vertex_attr_array![3 => Float32x4, 4 => Float32x4, 5 => Float32];

const MESH_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
	array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
	step_mode: wgpu::VertexStepMode::Vertex,
	attributes: &MESH_ATTRIBUTES,
};

const INSTANCE_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
	array_stride: std::mem::size_of::<Instance>() as wgpu::BufferAddress,
	step_mode: wgpu::VertexStepMode::Instance,
	attributes: &INSTANCE_ATTRIBUTES,
};

struct PipelineBuilder<'a> {
	device: &'a wgpu::Device,
	layout: &'a wgpu::PipelineLayout,
	shader: &'a wgpu::ShaderModule,
	format: wgpu::TextureFormat,
}

impl PipelineBuilder<'_> {
	fn build(
		&self,
		label: &str,
		vertex_entry: &str,
		buffers: &[wgpu::VertexBufferLayout<'_>],
		depth_write: bool,
	) -> wgpu::RenderPipeline {
		self.device
			.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
				label: Some(label),
				layout: Some(self.layout),
				vertex: wgpu::VertexState {
					module: self.shader,
					entry_point: Some(vertex_entry),
					buffers,
					compilation_options: Default::default(),
				},
				fragment: Some(wgpu::FragmentState {
					module: self.shader,
					entry_point: Some("fs_main"),
					targets: &[Some(wgpu::ColorTargetState {
						format: self.format,
						blend: Some(wgpu::BlendState::ALPHA_BLENDING),
						write_mask: wgpu::ColorWrites::ALL,
					})],
					compilation_options: Default::default(),
				}),
				primitive: wgpu::PrimitiveState {
					topology: wgpu::PrimitiveTopology::TriangleList,
					cull_mode: None,
					..Default::default()
				},
				depth_stencil: Some(wgpu::DepthStencilState {
					format: DEPTH_FORMAT,
					depth_write_enabled: depth_write,
					depth_compare: wgpu::CompareFunction::Less,
					stencil: wgpu::StencilState::default(),
					bias: wgpu::DepthBiasState::default(),
				}),
				multisample: wgpu::MultisampleState::default(),
				multiview: None,
				cache: None,
			})
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::*;

	#[derive(Clone, Default)]
	struct Calls(Rc<RefCell<Vec<&'static str>>>);

	impl Calls {
		fn log(&self) -> Vec<&'static str> {
			self.0.borrow().clone()
		}
	}

	struct FakeRenderer {
		calls: Calls,
	}

	impl SceneRenderer for FakeRenderer {
		fn upload(&mut self, _: &Scene3d) {
			self.calls.0.borrow_mut().push("upload");
		}
		fn resize(&mut self, _: u32, _: u32) {
			self.calls.0.borrow_mut().push("resize");
		}
		fn draw(&mut self, _: &OrbitCamera, _: &[Instance]) -> Result<(), BackendError> {
			self.calls.0.borrow_mut().push("draw");
			Ok(())
		}
		fn release(&mut self) {
			self.calls.0.borrow_mut().push("release");
		}
	}

	#[test]
	fn falls_back_when_preferred_fails() {
		let attempts = RefCell::new(Vec::new());
		let result = pollster::block_on(select_with_fallback(BackendKind::WebGpu, |kind| {
			attempts.borrow_mut().push(kind);
			async move {
				match kind {
					BackendKind::WebGpu => Err(BackendError::NoAdapter(kind)),
					BackendKind::WebGl => Ok("gl"),
				}
			}
		}));
		let (kind, backend) = result.unwrap();
		assert_eq!((kind, backend), (BackendKind::WebGl, "gl"));
		assert_eq!(*attempts.borrow(), [BackendKind::WebGpu, BackendKind::WebGl]);
	}

	#[test]
	fn preferred_success_skips_fallback() {
		let mut attempts = 0;
		let (kind, _) = pollster::block_on(select_with_fallback(BackendKind::WebGpu, |kind| {
			attempts += 1;
			async move { Ok::<_, BackendError>(kind) }
		}))
		.unwrap();
		assert_eq!(kind, BackendKind::WebGpu);
		assert_eq!(attempts, 1);
	}

	#[test]
	fn exhausted_fallback_reports_last_error() {
		let result = pollster::block_on(select_with_fallback(BackendKind::WebGpu, |kind| async move {
			Err::<(), _>(BackendError::NoAdapter(kind))
		}));
		assert!(matches!(result, Err(BackendError::NoAdapter(BackendKind::WebGl))));
	}

	#[test]
	fn release_is_idempotent_and_silences_the_backend() {
		let calls = Calls::default();
		let mut backend = GpuBackend::new(BackendKind::WebGl, FakeRenderer { calls: calls.clone() });
		assert_eq!(backend.kind(), Some(BackendKind::WebGl));
		backend.resize(10, 10);
		backend.draw(&OrbitCamera::default(), &[]).unwrap();

		backend.release();
		backend.release();
		backend.draw(&OrbitCamera::default(), &[]).unwrap();
		assert_eq!(backend.kind(), None);
		assert_eq!(calls.log(), ["resize", "draw", "release"]);
	}

	#[test]
	fn only_webgpu_is_lit() {
		assert!(BackendKind::WebGpu.lit());
		assert!(!BackendKind::WebGl.lit());
		assert_eq!(BackendKind::WebGl.fallback(), None);
		assert_eq!(std::mem::size_of::<Uniforms>(), 80);
	}
}

//! Camera framing for both views.
//!
//! 2D: a translate/scale transform eased toward a target, plus auto-fit over the
//! axis-aligned bounds of visible nodes. 3D: an orbital camera framed on the
//! bounding sphere of the frozen graph.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use super::config::CameraConfig;
use super::types::Point2;

/// 2D pan and zoom: screen = world * k + (x, y).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
	/// Horizontal offset in screen pixels.
	pub x: f64,
	/// Vertical offset in screen pixels.
	pub y: f64,
	/// Scale.
	pub k: f64,
}

impl Default for ViewTransform {
	fn default() -> Self {
		Self { x: 0.0, y: 0.0, k: 1.0 }
	}
}

impl ViewTransform {
	/// Exponential approach toward `target`; `rate` is per second.
	pub fn ease_toward(&mut self, target: &ViewTransform, rate: f64, dt_secs: f64) {
		let t = 1.0 - (-rate * dt_secs.max(0.0)).exp();
		self.x += (target.x - self.x) * t;
		self.y += (target.y - self.y) * t;
		self.k += (target.k - self.k) * t;
		if (target.k - self.k).abs() < 1e-4 {
			self.k = target.k;
		}
	}

	/// Inverse of `world_to_screen`.
	pub fn screen_to_world(&self, sx: f64, sy: f64) -> Point2 {
		Point2::new(((sx - self.x) / self.k) as f32, ((sy - self.y) / self.k) as f32)
	}

	/// Applies the transform to a world point.
	pub fn world_to_screen(&self, p: Point2) -> (f64, f64) {
		(p.x as f64 * self.k + self.x, p.y as f64 * self.k + self.y)
	}
}

/// Axis-aligned bounds in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds2 {
	pub min: Point2,
	pub max: Point2,
}

impl Bounds2 {
	pub fn from_points<I: IntoIterator<Item = (Point2, f32)>>(points: I) -> Option<Self> {
		let mut bounds: Option<Bounds2> = None;
		for (p, r) in points {
			if !p.is_finite() {
				continue;
			}
			let b = bounds.get_or_insert(Bounds2 { min: p, max: p });
			b.min.x = b.min.x.min(p.x - r);
			b.min.y = b.min.y.min(p.y - r);
			b.max.x = b.max.x.max(p.x + r);
			b.max.y = b.max.y.max(p.y + r);
		}
		bounds
	}

	pub fn padded(&self, pad: f32) -> Self {
		Self {
			min: Point2::new(self.min.x - pad, self.min.y - pad),
			max: Point2::new(self.max.x + pad, self.max.y + pad),
		}
	}

	pub fn width(&self) -> f32 {
		self.max.x - self.min.x
	}

	pub fn height(&self) -> f32 {
		self.max.y - self.min.y
	}

	pub fn center(&self) -> Point2 {
		Point2::new((self.min.x + self.max.x) / 2.0, (self.min.y + self.max.y) / 2.0)
	}
}

/// Transform that centers `bounds` and makes it cover `fill_fraction` of the viewport.
pub fn fit_transform(bounds: &Bounds2, width: f64, height: f64, config: &CameraConfig) -> ViewTransform {
	let (bw, bh) = (bounds.width().max(1.0) as f64, bounds.height().max(1.0) as f64);
	let k = (width * config.fill_fraction / bw)
		.min(height * config.fill_fraction / bh)
		.clamp(config.min_scale, config.max_scale);
	let c = bounds.center();
	ViewTransform {
		x: width / 2.0 - c.x as f64 * k,
		y: height / 2.0 - c.y as f64 * k,
		k,
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
	/// Fit once, reuse the result for every reset.
	Frozen,
	/// Refit whenever the viewbox drifts away from the one last fitted.
	#[default]
	Live,
}

/// Share of the fitted extent the viewbox may drift before a live refit.
pub const REFIT_TOLERANCE: f32 = 0.1;

/// Remembers the auto-fit framing and decides when to recompute it.
#[derive(Clone, Debug)]
pub struct AutoFit {
	mode: FitMode,
	cached: Option<ViewTransform>,
	basis: Option<Bounds2>,
}

impl AutoFit {
	pub fn new(mode: FitMode) -> Self {
		Self {
			mode,
			cached: None,
			basis: None,
		}
	}

	pub fn fitted(&self) -> Option<ViewTransform> {
		self.cached
	}

	/// Returns a new framing for `viewbox` when one should be applied.
	pub fn observe(
		&mut self,
		viewbox: &Bounds2,
		width: f64,
		height: f64,
		config: &CameraConfig,
	) -> Option<ViewTransform> {
		let refit = match (self.mode, self.cached, self.basis) {
			(_, None, _) | (_, _, None) => true,
			(FitMode::Frozen, Some(_), Some(_)) => false,
			(FitMode::Live, Some(_), Some(basis)) => drifted(&basis, viewbox),
		};
		if !refit {
			return None;
		}
		let fit = fit_transform(viewbox, width, height, config);
		self.cached = Some(fit);
		self.basis = Some(*viewbox);
		Some(fit)
	}

	/// Drops a live fit so the next `observe` recomputes (window resize, settle).
	pub fn invalidate(&mut self) {
		if self.mode == FitMode::Live {
			self.cached = None;
		}
	}
}

fn drifted(basis: &Bounds2, now: &Bounds2) -> bool {
	let extent = basis.width().max(basis.height()).max(1.0);
	let limit = extent * REFIT_TOLERANCE;
	(now.width() - basis.width()).abs() > limit
		|| (now.height() - basis.height()).abs() > limit
		|| now.center().distance(basis.center()) > limit
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
	pub center: [f32; 3],
	pub radius: f32,
}

impl BoundingSphere {
	/// Centroid-centered sphere enclosing every point plus its radius.
	pub fn from_points<I: IntoIterator<Item = ([f32; 3], f32)> + Clone>(points: I) -> Option<Self> {
		let mut sum = [0.0f32; 3];
		let mut count = 0usize;
		for (p, _) in points.clone() {
			for axis in 0..3 {
				sum[axis] += p[axis];
			}
			count += 1;
		}
		if count == 0 {
			return None;
		}
		let center = [sum[0] / count as f32, sum[1] / count as f32, sum[2] / count as f32];
		let radius = points
			.into_iter()
			.map(|(p, r)| length(sub(p, center)) + r)
			.fold(0.0f32, f32::max)
			.max(1.0);
		Some(Self { center, radius })
	}
}

/// Orbit controls around a target, with clamped zoom and pan.
#[derive(Clone, Debug)]
pub struct OrbitCamera {
	pub target: [f32; 3],
	pub distance: f32,
	pub azimuth: f32,
	pub elevation: f32,
	pub fov: f32,
	pub near: f32,
	pub far: f32,
	pub aspect: f32,
	pub orbit_sensitivity: f32,
	pub zoom_sensitivity: f32,
	pub pan_sensitivity: f32,
	pub min_distance: f32,
	pub max_distance: f32,
	/// Target may not leave this sphere.
	pub pan_bounds: BoundingSphere,
	home: Option<(BoundingSphere, f32)>,
}

impl Default for OrbitCamera {
	fn default() -> Self {
		Self {
			target: [0.0, 0.0, 0.0],
			distance: 500.0,
			azimuth: 0.0,
			elevation: PI / 3.0,
			fov: PI / 4.0,
			near: 1.0,
			far: 20000.0,
			aspect: 1.0,
			orbit_sensitivity: 0.005,
			zoom_sensitivity: 0.1,
			pan_sensitivity: 0.5,
			min_distance: 20.0,
			max_distance: 5000.0,
			pan_bounds: BoundingSphere {
				center: [0.0; 3],
				radius: f32::MAX,
			},
			home: None,
		}
	}
}

impl OrbitCamera {
	pub fn new(config: &CameraConfig) -> Self {
		Self {
			min_distance: config.min_distance,
			max_distance: config.max_distance,
			..Self::default()
		}
	}

	pub fn set_aspect(&mut self, width: f32, height: f32) {
		if height > 0.0 {
			self.aspect = width / height;
		}
	}

	/// Frames `sphere` so it fills `fill` of the narrower field of view and
	/// records it as the home view used by `reset`.
	pub fn fit_sphere(&mut self, sphere: BoundingSphere, fill: f32, pan_bound_factor: f32) {
		let vertical = self.fov / 2.0;
		let horizontal = (vertical.tan() * self.aspect).atan();
		let half_fov = vertical.min(horizontal);
		let distance = sphere.radius / half_fov.sin() / fill.clamp(0.1, 1.0);
		self.max_distance = self.max_distance.max(distance * 2.0);
		self.far = self.far.max(distance * 4.0);
		self.pan_bounds = BoundingSphere {
			center: sphere.center,
			radius: sphere.radius * pan_bound_factor,
		};
		self.home = Some((sphere, distance));
		self.reset();
	}

	/// Back to the fitted home view (or the default pose before any fit).
	pub fn reset(&mut self) {
		let (target, distance) = match self.home {
			Some((sphere, distance)) => (sphere.center, distance),
			None => ([0.0; 3], 500.0),
		};
		self.target = target;
		self.distance = distance.clamp(self.min_distance, self.max_distance);
		self.azimuth = 0.0;
		self.elevation = PI / 3.0;
	}

	pub fn position(&self) -> [f32; 3] {
		[
			self.target[0] + self.distance * self.elevation.sin() * self.azimuth.sin(),
			self.target[1] + self.distance * self.elevation.cos(),
			self.target[2] + self.distance * self.elevation.sin() * self.azimuth.cos(),
		]
	}

	/// Column-major look-at matrix.
	pub fn view_matrix(&self) -> [[f32; 4]; 4] {
		let eye = self.position();
		let forward = normalize(sub(self.target, eye));
		let right = normalize(cross(forward, [0.0, 1.0, 0.0]));
		let up = cross(right, forward);
		[
			[right[0], up[0], -forward[0], 0.0],
			[right[1], up[1], -forward[1], 0.0],
			[right[2], up[2], -forward[2], 0.0],
			[-dot(right, eye), -dot(up, eye), dot(forward, eye), 1.0],
		]
	}

	/// Right-handed perspective with a 0..1 depth range.
	pub fn projection_matrix(&self) -> [[f32; 4]; 4] {
		let f = 1.0 / (self.fov / 2.0).tan();
		let range = self.near - self.far;
		[
			[f / self.aspect, 0.0, 0.0, 0.0],
			[0.0, f, 0.0, 0.0],
			[0.0, 0.0, self.far / range, -1.0],
			[0.0, 0.0, self.near * self.far / range, 0.0],
		]
	}

	pub fn view_projection_matrix(&self) -> [[f32; 4]; 4] {
		mat4_mul(self.projection_matrix(), self.view_matrix())
	}

	pub fn orbit(&mut self, dx: f32, dy: f32) {
		self.azimuth = (self.azimuth - dx * self.orbit_sensitivity).rem_euclid(PI * 2.0);
		self.elevation = (self.elevation - dy * self.orbit_sensitivity).clamp(0.01, PI - 0.01);
	}

	pub fn zoom(&mut self, delta: f32) {
		self.distance = (self.distance * (1.0 - delta * self.zoom_sensitivity))
			.clamp(self.min_distance, self.max_distance);
	}

	pub fn pan(&mut self, dx: f32, dy: f32) {
		let forward = normalize(sub(self.target, self.position()));
		let right = normalize(cross(forward, [0.0, 1.0, 0.0]));
		let up = cross(right, forward);
		let scale = self.distance * self.pan_sensitivity * 0.001;
		for axis in 0..3 {
			self.target[axis] -= right[axis] * dx * scale - up[axis] * dy * scale;
		}
		let offset = sub(self.target, self.pan_bounds.center);
		let len = length(offset);
		if len > self.pan_bounds.radius {
			let k = self.pan_bounds.radius / len;
			for axis in 0..3 {
				self.target[axis] = self.pan_bounds.center[axis] + offset[axis] * k;
			}
		}
	}
}

pub(crate) fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
	[a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
	a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
	[
		a[1] * b[2] - a[2] * b[1],
		a[2] * b[0] - a[0] * b[2],
		a[0] * b[1] - a[1] * b[0],
	]
}

pub(crate) fn length(v: [f32; 3]) -> f32 {
	dot(v, v).sqrt()
}

pub(crate) fn normalize(v: [f32; 3]) -> [f32; 3] {
	let len = length(v);
	if len > 0.0001 {
		[v[0] / len, v[1] / len, v[2] / len]
	} else {
		[0.0, 0.0, 1.0]
	}
}

/// `a * b` for column-major matrices.
fn mat4_mul(a: [[f32; 4]; 4], b: [[f32; 4]; 4]) -> [[f32; 4]; 4] {
	let mut out = [[0.0f32; 4]; 4];
	for col in 0..4 {
		for row in 0..4 {
			out[col][row] = (0..4).map(|k| a[k][row] * b[col][k]).sum();
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn project(m: [[f32; 4]; 4], p: [f32; 3]) -> [f32; 3] {
		let v = [p[0], p[1], p[2], 1.0];
		let mut out = [0.0f32; 4];
		for row in 0..4 {
			out[row] = (0..4).map(|col| m[col][row] * v[col]).sum();
		}
		[out[0] / out[3], out[1] / out[3], out[2] / out[3]]
	}

	#[test]
	fn fit_centers_and_scales_bounds() {
		let bounds = Bounds2 {
			min: Point2::new(-100.0, -50.0),
			max: Point2::new(100.0, 50.0),
		};
		let config = CameraConfig::default();
		let t = fit_transform(&bounds, 800.0, 600.0, &config);
		assert!((t.k - 3.4).abs() < 1e-9);
		let (cx, cy) = t.world_to_screen(Point2::new(0.0, 0.0));
		assert!((cx - 400.0).abs() < 1e-6 && (cy - 300.0).abs() < 1e-6);
	}

	#[test]
	fn bounds_skip_non_finite_points() {
		let b = Bounds2::from_points([
			(Point2::new(0.0, 0.0), 1.0),
			(Point2::new(f32::NAN, 3.0), 1.0),
			(Point2::new(10.0, 5.0), 1.0),
		])
		.unwrap();
		assert_eq!(b.min, Point2::new(-1.0, -1.0));
		assert_eq!(b.max, Point2::new(11.0, 6.0));
		assert!(Bounds2::from_points(std::iter::empty()).is_none());
	}

	#[test]
	fn frozen_fit_runs_once_live_fit_follows_drift() {
		let config = CameraConfig::default();
		let small = Bounds2 { min: Point2::new(-10.0, -10.0), max: Point2::new(10.0, 10.0) };
		let nudged = Bounds2 { min: Point2::new(-10.5, -10.0), max: Point2::new(10.0, 10.5) };
		let grown = Bounds2 { min: Point2::new(-200.0, -150.0), max: Point2::new(180.0, 160.0) };

		let mut frozen = AutoFit::new(FitMode::Frozen);
		let first = frozen.observe(&small, 800.0, 600.0, &config).unwrap();
		assert_eq!(frozen.observe(&grown, 800.0, 600.0, &config), None);
		frozen.invalidate();
		assert_eq!(frozen.fitted(), Some(first));

		let mut live = AutoFit::new(FitMode::Live);
		assert!(live.observe(&small, 800.0, 600.0, &config).is_some());
		assert!(live.observe(&nudged, 800.0, 600.0, &config).is_none());
		let refit = live.observe(&grown, 800.0, 600.0, &config).unwrap();
		assert!(refit.k < first.k);
		assert_eq!(live.fitted(), Some(refit));

		live.invalidate();
		assert!(live.fitted().is_none());
		assert!(live.observe(&grown, 400.0, 300.0, &config).is_some());
	}

	#[test]
	fn easing_converges_on_target() {
		let mut t = ViewTransform::default();
		let target = ViewTransform { x: 100.0, y: -40.0, k: 2.0 };
		for _ in 0..300 {
			t.ease_toward(&target, 10.0, 1.0 / 60.0);
		}
		assert!((t.x - 100.0).abs() < 1e-3);
		assert_eq!(t.k, 2.0);
	}

	#[test]
	fn fitted_sphere_is_inside_the_frustum() {
		let mut camera = OrbitCamera::new(&CameraConfig::default());
		camera.set_aspect(800.0, 600.0);
		let sphere = BoundingSphere { center: [50.0, 0.0, 10.0], radius: 200.0 };
		camera.fit_sphere(sphere, 0.85, 1.5);
		let vp = camera.view_projection_matrix();
		for p in [[250.0, 0.0, 10.0], [-150.0, 0.0, 10.0], [50.0, 200.0, 10.0], [50.0, 0.0, 210.0]] {
			let ndc = project(vp, p);
			assert!(ndc[0].abs() <= 1.0 && ndc[1].abs() <= 1.0, "{p:?} -> {ndc:?}");
			assert!((0.0..=1.0).contains(&ndc[2]));
		}
	}

	#[test]
	fn zoom_and_pan_are_clamped_and_reset_restores_home() {
		let mut camera = OrbitCamera::new(&CameraConfig::default());
		let sphere = BoundingSphere { center: [0.0; 3], radius: 100.0 };
		camera.fit_sphere(sphere, 0.85, 1.5);
		let home = (camera.target, camera.distance);

		for _ in 0..200 {
			camera.zoom(5.0);
		}
		assert_eq!(camera.distance, camera.min_distance);
		for _ in 0..2000 {
			camera.pan(500.0, 0.0);
		}
		assert!(length(sub(camera.target, sphere.center)) <= 150.0 + 1e-3);

		camera.orbit(40.0, 10.0);
		camera.reset();
		assert_eq!((camera.target, camera.distance), home);
	}

	#[test]
	fn sphere_encloses_points() {
		let s = BoundingSphere::from_points(vec![([0.0, 0.0, 0.0], 1.0), ([10.0, 0.0, 0.0], 1.0)]).unwrap();
		assert_eq!(s.center, [5.0, 0.0, 0.0]);
		assert_eq!(s.radius, 6.0);
	}
}

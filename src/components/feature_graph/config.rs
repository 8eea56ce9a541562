//! Tunables for the simulation, clustering, camera and freeze stages.
//!
//! Every field has a default so a partial JSON document is enough.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::camera::FitMode;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid viewer config: {0}")]
	Parse(#[from] serde_json::Error),
	#[error("invalid viewer config: {0}")]
	Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
	/// Negative repels.
	pub charge_strength: f32,
	pub link_distance: f32,
	pub link_stiffness: f32,
	/// Added to the sum of two radii before they collide.
	pub collision_padding: f32,
	pub collision_strength: f32,
	pub center_strength: f32,
	pub velocity_decay: f32,
	/// Fraction of the gap to the target closed each tick.
	pub alpha_decay: f32,
	pub initial_alpha: f32,
	pub restart_alpha: f32,
	pub alpha_min: f32,
	pub alpha_target: f32,
	pub tick_interval_ms: u64,
}

impl Default for SimulationConfig {
	fn default() -> Self {
		Self {
			charge_strength: -180.0,
			link_distance: 45.0,
			link_stiffness: 0.6,
			collision_padding: 3.0,
			collision_strength: 0.7,
			center_strength: 0.04,
			velocity_decay: 0.4,
			// reaches alpha_min from 1.0 in ~300 ticks
			alpha_decay: 1.0 - 0.001f32.powf(1.0 / 300.0),
			initial_alpha: 1.0,
			restart_alpha: 0.8,
			alpha_min: 0.001,
			alpha_target: 0.0,
			tick_interval_ms: 16,
		}
	}
}

impl SimulationConfig {
	/// Alpha target used while a node is being dragged.
	pub const REHEAT_TARGET: f32 = 0.3;

	fn validate(&self) -> Result<(), ConfigError> {
		if !(self.alpha_decay > 0.0 && self.alpha_decay < 1.0) {
			return Err(ConfigError::Invalid(format!(
				"alpha_decay must be in (0, 1), got {}",
				self.alpha_decay
			)));
		}
		if !(0.0..=1.0).contains(&self.velocity_decay) {
			return Err(ConfigError::Invalid("velocity_decay must be in [0, 1]".into()));
		}
		if self.link_distance <= 0.0 {
			return Err(ConfigError::Invalid("link_distance must be positive".into()));
		}
		if self.tick_interval_ms == 0 {
			return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
		}
		Ok(())
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
	/// Clusters form when scale drops below this.
	pub enter_scale: f64,
	/// Clusters dissolve once scale reaches this.
	pub exit_scale: f64,
	pub neighbor_radius_px: f64,
	pub min_members: usize,
}

impl Default for LodConfig {
	fn default() -> Self {
		Self {
			enter_scale: 0.6,
			exit_scale: 0.85,
			neighbor_radius_px: 40.0,
			min_members: 2,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
	/// Share of the viewport the fitted content should cover.
	pub fill_fraction: f64,
	pub min_scale: f64,
	pub max_scale: f64,
	/// Per-second easing rate toward the target transform.
	pub easing_rate: f64,
	pub min_distance: f32,
	pub max_distance: f32,
	/// Pan bound as a multiple of the fitted bounding radius.
	pub pan_bound_factor: f32,
	/// Whether the 2D framing keeps following the layout or is fitted once.
	pub fit_mode: FitMode,
}

impl Default for CameraConfig {
	fn default() -> Self {
		Self {
			fill_fraction: 0.85,
			min_scale: 0.1,
			max_scale: 10.0,
			easing_rate: 10.0,
			min_distance: 20.0,
			max_distance: 5000.0,
			pan_bound_factor: 1.5,
			fit_mode: FitMode::Live,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreezeConfig {
	/// Alpha under which the layout counts as stable.
	pub stable_alpha: f32,
	pub watchdog_ms: f64,
}

impl Default for FreezeConfig {
	fn default() -> Self {
		Self {
			stable_alpha: 0.03,
			watchdog_ms: 6000.0,
		}
	}
}

/// Top-level config for both views.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
	/// Force tunables.
	pub simulation: SimulationConfig,
	/// Clustering.
	pub lod: LodConfig,
	/// 2D fit and 3D orbit limits.
	pub camera: CameraConfig,
	/// When the 3D view freezes.
	pub freeze: FreezeConfig,
	/// Flow particles in both views.
	pub particles: ParticleConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
	/// Fixed size of the 3D instanced pool.
	pub pool_size: usize,
	/// Particles riding links in the 2D view.
	pub flow_count: usize,
	pub speed: f32,
}

impl Default for ParticleConfig {
	fn default() -> Self {
		Self {
			pool_size: 256,
			flow_count: 48,
			speed: 0.35,
		}
	}
}

impl ViewerConfig {
	/// Parses and validates.
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		let config: Self = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	/// Rejects inverted bounds and out-of-range rates.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.simulation.validate()?;
		if self.lod.enter_scale >= self.lod.exit_scale {
			return Err(ConfigError::Invalid(format!(
				"lod.enter_scale ({}) must be below lod.exit_scale ({})",
				self.lod.enter_scale, self.lod.exit_scale
			)));
		}
		if self.lod.neighbor_radius_px <= 0.0 {
			return Err(ConfigError::Invalid("lod.neighbor_radius_px must be positive".into()));
		}
		if self.camera.min_scale <= 0.0 || self.camera.min_scale >= self.camera.max_scale {
			return Err(ConfigError::Invalid("camera scale bounds are inverted".into()));
		}
		if self.camera.min_distance <= 0.0 || self.camera.min_distance >= self.camera.max_distance {
			return Err(ConfigError::Invalid("camera distance bounds are inverted".into()));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_json_keeps_defaults() {
		let config = ViewerConfig::from_json(r#"{ "lod": { "enter_scale": 0.5 } }"#).unwrap();
		assert_eq!(config.lod.enter_scale, 0.5);
		assert_eq!(config.lod.exit_scale, LodConfig::default().exit_scale);
		assert_eq!(config.simulation, SimulationConfig::default());
		assert_eq!(config.camera.fit_mode, FitMode::Live);
	}

	#[test]
	fn fit_mode_reads_lowercase() {
		let config = ViewerConfig::from_json(r#"{ "camera": { "fit_mode": "frozen" } }"#).unwrap();
		assert_eq!(config.camera.fit_mode, FitMode::Frozen);
	}

	#[test]
	fn rejects_inverted_hysteresis_band() {
		let err = ViewerConfig::from_json(r#"{ "lod": { "enter_scale": 0.9, "exit_scale": 0.8 } }"#)
			.unwrap_err();
		assert!(matches!(err, ConfigError::Invalid(_)));
	}

	#[test]
	fn rejects_bad_decay() {
		let err = ViewerConfig::from_json(r#"{ "simulation": { "alpha_decay": 1.5 } }"#).unwrap_err();
		assert!(err.to_string().contains("alpha_decay"));
	}

	#[test]
	fn default_is_valid() {
		ViewerConfig::default().validate().unwrap();
	}
}

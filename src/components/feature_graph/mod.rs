//! Feature-dependency graph viewer: a live 2D canvas and a frozen 3D scene.

mod builder;
mod camera;
mod channel;
mod component;
mod component3d;
mod config;
mod frozen;
mod gpu;
mod layout;
mod lod;
mod render;
mod scene;
mod state;
mod types;

pub use builder::{FeatureList, GraphSpec, MajorGroup, OverlapPair};
pub use camera::ViewTransform;
pub use channel::SimulationChannel;
pub use component::FeatureGraphCanvas;
pub use component3d::FeatureGraph3d;
pub use config::ViewerConfig;
pub use frozen::{FreezeController, FreezeReason};
pub use layout::{LayoutEngine, LayoutInput};
pub use render::{Canvas2d, render};
pub use scene::Scene3d;
pub use state::RenderState;
pub use types::{BuildStatus, GraphData, LinkKind, NodeInspection, NodeMetrics, TicketInfo};

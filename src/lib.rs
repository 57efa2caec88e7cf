//! Prism Engine - A render pass graph-based 3D rendering engine
//!
//! Rendering work is organized as passes registered on a [`Renderer`]:
//! each pass declares the passes it depends on, the registry flattens the
//! declarations into a single dependency-respecting execution order, and
//! the frame driver runs every pass through a strict
//! init/begin/render/end/shutdown lifecycle.
//!
//! # Features
//! - Render pass graph with typed registration and stable flattening
//! - Deferred shading pipeline (G-buffer, lighting, post-processing)
//! - Debug line overlay for editor gizmos
//! - Opaque GPU device abstraction with a headless implementation for tests
//! - Background worker pool for non-GPU work

pub mod backend;
pub mod jobs;
pub mod pipeline;
pub mod render_graph;
pub mod renderer;
pub mod scene;

pub use backend::{DeviceError, DeviceResult, HeadlessDevice, RenderDevice};
pub use pipeline::{build_deferred_pipeline, DeferredConfig, DeferredPassHandles};
pub use render_graph::{
    GlobalRendererData, PassHandle, PassRegistry, RenderContext, RenderPass, RendererDataHandle,
};
pub use renderer::Renderer;
pub use scene::Camera;

/// Configuration for a renderer instance
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Maximum number of point + spot lights per frame
    pub max_lights: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self { max_lights: 1024 }
    }
}

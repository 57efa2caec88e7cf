//! Deferred rendering pipeline
//!
//! Wires the concrete passes into a renderer's graph:
//! 1. Geometry pass - scene geometry into the G-buffer
//! 2. Lighting pass - fullscreen deferred shading into an HDR target
//! 3. Post-process pass - bloom and tonemapping into the front buffer
//! 4. Debug overlay pass - optional line overlay on top of the composite

pub mod debug_overlay_pass;
pub mod geometry_pass;
pub mod lighting_pass;
pub mod post_process_pass;

pub use debug_overlay_pass::DebugOverlayPass;
pub use geometry_pass::GeometryPass;
pub use lighting_pass::LightingPass;
pub use post_process_pass::{PostProcessPass, TonemapOperator};

use crate::render_graph::PassHandle;
use crate::renderer::Renderer;

/// Configuration for the deferred pipeline
#[derive(Debug, Clone)]
pub struct DeferredConfig {
    /// Maximum number of point + spot lights per frame
    pub max_lights: u32,
    /// Enable the bloom chain in the post-process pass
    pub enable_bloom: bool,
    /// Register the debug line overlay
    pub enable_debug_overlay: bool,
    /// Tonemapping operator for the final composite
    pub tonemap: TonemapOperator,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            max_lights: 1024,
            enable_bloom: true,
            enable_debug_overlay: true,
            tonemap: TonemapOperator::default(),
        }
    }
}

/// Handles of the passes registered by [`build_deferred_pipeline`]
pub struct DeferredPassHandles {
    pub geometry: PassHandle,
    pub lighting: PassHandle,
    pub post_process: PassHandle,
    pub debug_overlay: Option<PassHandle>,
}

/// Register the deferred pipeline's passes on a renderer.
///
/// Must run before `Renderer::init`. Dependencies are declared through the
/// returned handles, so the flattened order is always geometry, lighting,
/// post-process, then the overlay.
pub fn build_deferred_pipeline(
    renderer: &mut Renderer,
    config: &DeferredConfig,
) -> DeferredPassHandles {
    let geometry = renderer.insert_pass(GeometryPass::new());
    let lighting = renderer.insert_pass(LightingPass::new(geometry, config.max_lights as usize));

    let mut post_process = PostProcessPass::new(lighting, config.enable_bloom);
    post_process.operator = config.tonemap;
    let post_process = renderer.insert_pass(post_process);

    let debug_overlay = config
        .enable_debug_overlay
        .then(|| renderer.insert_pass(DebugOverlayPass::new(post_process)));

    DeferredPassHandles {
        geometry,
        lighting,
        post_process,
        debug_overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RendererConfig;

    #[test]
    fn test_pipeline_flattened_order() {
        let mut renderer = Renderer::new(&RendererConfig::default());
        let handles = build_deferred_pipeline(&mut renderer, &DeferredConfig::default());

        let order: Vec<PassHandle> = renderer.registry().flattened_order().collect();
        assert_eq!(order[0], handles.geometry);
        assert_eq!(order[1], handles.lighting);
        assert_eq!(order[2], handles.post_process);
        assert_eq!(Some(order[3]), handles.debug_overlay);
    }

    #[test]
    fn test_overlay_optional() {
        let mut renderer = Renderer::new(&RendererConfig::default());
        let config = DeferredConfig {
            enable_debug_overlay: false,
            ..Default::default()
        };
        let handles = build_deferred_pipeline(&mut renderer, &config);
        assert!(handles.debug_overlay.is_none());
        assert_eq!(renderer.registry().len(), 3);
    }

    #[test]
    #[should_panic(expected = "not registered yet")]
    fn test_lighting_before_geometry_rejected() {
        let mut renderer = Renderer::new(&RendererConfig::default());
        // The handle refers to a slot nothing occupies yet.
        renderer.insert_pass(LightingPass::new(PassHandle(0), 16));
    }

    #[test]
    fn test_typed_lookup_after_build() {
        let mut renderer = Renderer::new(&RendererConfig::default());
        build_deferred_pipeline(&mut renderer, &DeferredConfig::default());

        assert!(renderer.pass::<GeometryPass>().is_some());
        assert!(renderer.pass::<LightingPass>().is_some());
        assert!(renderer.pass::<PostProcessPass>().is_some());
        assert!(renderer.pass::<DebugOverlayPass>().is_some());
    }
}

//! Frame driver
//!
//! [`Renderer`] owns one pass graph plus its global data block and drives
//! both through the frame protocol: `init` once, then
//! `begin` / `render` / `end` every frame, then `shutdown` once. The
//! embedding application supplies the device and the front buffer; meshes
//! and lights are handed in through the `submit_*` family between `begin`
//! and `render`.

use crate::backend::traits::{DeviceResult, FramebufferHandle, RenderDevice};
use crate::backend::types::{BufferDescriptor, BufferUsage, TextureDescriptor, TextureFormat, TextureUsage};
use crate::render_graph::{
    DebugLine, FrameStats, GlobalRendererData, PassHandle, PassRegistry, RenderPass,
    StaticSubmission,
};
use crate::scene::{Camera, DirectionalLight, PointLight, SpotLight};
use crate::RendererConfig;

const NOISE_TEXTURE_SIZE: u32 = 64;

/// Frame phase machine. Phases must advance Idle -> Began -> Rendered and
/// back to Idle; violations are programmer errors on a hot path, so the
/// checks are debug-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramePhase {
    Idle,
    Began,
    Rendered,
}

/// A renderer instance: one pass graph, one global data block.
///
/// Independent instances can coexist (a main 3D renderer and a debug
/// overlay renderer each own their graph and state).
pub struct Renderer {
    passes: PassRegistry,
    data: GlobalRendererData,
    phase: FramePhase,
    initialized: bool,
}

impl Renderer {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            passes: PassRegistry::new(),
            data: GlobalRendererData::new(config.max_lights as usize),
            phase: FramePhase::Idle,
            initialized: false,
        }
    }

    /// Register a pass. All registration must happen before [`init`](Self::init).
    pub fn insert_pass<P: RenderPass>(&mut self, pass: P) -> PassHandle {
        assert!(
            !self.initialized,
            "passes must be registered before Renderer::init"
        );
        self.passes.insert(pass)
    }

    /// Typed lookup of a registered pass.
    pub fn pass<P: RenderPass>(&self) -> Option<&P> {
        self.passes.get::<P>()
    }

    /// Typed mutable lookup of a registered pass.
    pub fn pass_mut<P: RenderPass>(&mut self) -> Option<&mut P> {
        self.passes.get_mut::<P>()
    }

    pub fn pass_handle<P: RenderPass>(&self) -> Option<PassHandle> {
        self.passes.handle_of::<P>()
    }

    pub fn registry(&self) -> &PassRegistry {
        &self.passes
    }

    pub fn data(&self) -> &GlobalRendererData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut GlobalRendererData {
        &mut self.data
    }

    pub fn stats(&self) -> FrameStats {
        self.data.stats
    }

    /// One-time renderer bring-up: creates the shared default resources and
    /// initializes every pass in flattened order.
    pub fn init(
        &mut self,
        device: &mut dyn RenderDevice,
        width: u32,
        height: u32,
    ) -> DeviceResult<()> {
        assert!(!self.initialized, "Renderer::init called twice");
        log::info!(
            "initializing renderer ({width}x{height}, {} passes)",
            self.passes.len()
        );

        self.data.width = width;
        self.data.height = height;

        // A tiny vertex buffer passes bind when an attributeless fullscreen
        // draw still needs a bound buffer.
        let blank = device.create_buffer(&BufferDescriptor {
            label: Some("blank_vertex_buffer".to_string()),
            size: 16,
            usage: BufferUsage::VERTEX,
        })?;
        self.data.blank_vertex_buffer = Some(blank);

        let noise = device.create_texture(&TextureDescriptor {
            label: Some("shared_noise".to_string()),
            width: NOISE_TEXTURE_SIZE,
            height: NOISE_TEXTURE_SIZE,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        device.write_texture(
            noise,
            &generate_noise_pixels(NOISE_TEXTURE_SIZE),
            NOISE_TEXTURE_SIZE,
            NOISE_TEXTURE_SIZE,
        );
        self.data.noise_view = Some(device.create_texture_view(noise)?);
        self.data.noise_texture = Some(noise);

        self.passes.on_init(device, &mut self.data)?;
        self.initialized = true;
        Ok(())
    }

    /// Start a frame: capture the camera, refresh per-pass data and prepare
    /// every render target for the given output dimensions.
    pub fn begin(
        &mut self,
        device: &mut dyn RenderDevice,
        width: u32,
        height: u32,
        camera: &Camera,
    ) {
        debug_assert!(self.initialized, "Renderer::begin before init");
        debug_assert_eq!(self.phase, FramePhase::Idle, "begin out of frame order");

        self.data.begin_frame(camera, width, height);
        self.passes.update_pass_data(device, &mut self.data);
        self.passes
            .on_renderer_begin(device, &mut self.data, width, height);
        self.phase = FramePhase::Began;
    }

    /// Execute every pass's draw work in flattened order.
    pub fn render(&mut self, device: &mut dyn RenderDevice) {
        debug_assert_eq!(self.phase, FramePhase::Began, "render out of frame order");
        self.passes.on_render(device, &mut self.data);
        self.phase = FramePhase::Rendered;
    }

    /// Finish the frame, compositing into the supplied front buffer, and
    /// drop everything submitted for this frame.
    pub fn end(&mut self, device: &mut dyn RenderDevice, front_buffer: FramebufferHandle) {
        debug_assert_eq!(self.phase, FramePhase::Rendered, "end out of frame order");
        self.passes
            .on_renderer_end(device, &mut self.data, front_buffer);
        self.data.clear_frame_queues();
        self.phase = FramePhase::Idle;
    }

    /// Tear down every pass (reverse flattened order) and the shared
    /// default resources.
    pub fn shutdown(&mut self, device: &mut dyn RenderDevice) {
        if !self.initialized {
            log::warn!("Renderer::shutdown on an uninitialized renderer");
            return;
        }
        debug_assert_eq!(self.phase, FramePhase::Idle, "shutdown mid-frame");
        log::info!("shutting down renderer");

        self.passes.on_shutdown(device, &mut self.data);

        if let Some(buffer) = self.data.blank_vertex_buffer.take() {
            device.destroy_buffer(buffer);
        }
        if let Some(texture) = self.data.noise_texture.take() {
            device.destroy_texture(texture);
        }
        self.data.noise_view = None;
        self.data.gbuffer = None;
        self.data.hdr_color = None;
        self.initialized = false;
    }

    // Submission API. Valid between `begin` and `render`; queues are
    // consumed by passes during `render`/`end` and cleared in `end`.

    pub fn submit_static(&mut self, submission: StaticSubmission) {
        self.data.submit_static(submission);
    }

    pub fn submit_directional_light(&mut self, light: DirectionalLight) {
        self.data.submit_directional_light(light);
    }

    pub fn submit_point_light(&mut self, light: PointLight) {
        self.data.submit_point_light(light);
    }

    pub fn submit_spot_light(&mut self, light: SpotLight) {
        self.data.submit_spot_light(light);
    }

    pub fn submit_debug_line(&mut self, line: DebugLine) {
        self.data.submit_debug_line(line);
    }
}

/// Deterministic RGBA noise used for dithering and sampling offsets.
fn generate_noise_pixels(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let mut state =
                x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263) ^ 0x9E37_79B9;
            for _ in 0..4 {
                // xorshift keeps this reproducible without an RNG dependency
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                pixels.push((state & 0xFF) as u8);
            }
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessDevice;
    use crate::render_graph::RenderContext;
    use std::any::Any;

    #[derive(Default)]
    struct ProbePass {
        deps: Vec<PassHandle>,
        init_calls: u32,
        begin_calls: u32,
        render_calls: u32,
        end_calls: u32,
        shutdown_calls: u32,
        init_before_begin: bool,
    }

    impl RenderPass for ProbePass {
        fn name(&self) -> &str {
            "ProbePass"
        }

        fn dependencies(&self) -> &[PassHandle] {
            &self.deps
        }

        fn on_init(&mut self, _ctx: &mut RenderContext) -> DeviceResult<()> {
            self.init_calls += 1;
            Ok(())
        }

        fn update_pass_data(&mut self, _ctx: &mut RenderContext) {}

        fn on_renderer_begin(&mut self, _ctx: &mut RenderContext, _w: u32, _h: u32) {
            if self.begin_calls == 0 {
                self.init_before_begin = self.init_calls == 1;
            }
            self.begin_calls += 1;
        }

        fn on_render(&mut self, _ctx: &mut RenderContext) {
            self.render_calls += 1;
        }

        fn on_renderer_end(&mut self, _ctx: &mut RenderContext, _front: FramebufferHandle) {
            self.end_calls += 1;
        }

        fn on_shutdown(&mut self, _ctx: &mut RenderContext) {
            self.shutdown_calls += 1;
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn renderer_with_probe() -> Renderer {
        let mut renderer = Renderer::new(&RendererConfig::default());
        renderer.insert_pass(ProbePass::default());
        renderer
    }

    #[test]
    fn test_init_runs_once_before_first_begin() {
        let mut device = HeadlessDevice::new();
        let mut renderer = renderer_with_probe();
        let front = device.create_front_buffer().unwrap();

        renderer.init(&mut device, 640, 480).unwrap();
        for _ in 0..3 {
            renderer.begin(&mut device, 640, 480, &Camera::default());
            renderer.render(&mut device);
            renderer.end(&mut device, front);
        }

        let probe = renderer.pass::<ProbePass>().unwrap();
        assert_eq!(probe.init_calls, 1);
        assert!(probe.init_before_begin);
        assert_eq!(probe.begin_calls, 3);
        assert_eq!(probe.render_calls, 3);
        assert_eq!(probe.end_calls, 3);
    }

    #[test]
    fn test_shutdown_runs_once_and_stops_dispatch() {
        let mut device = HeadlessDevice::new();
        let mut renderer = renderer_with_probe();
        renderer.init(&mut device, 640, 480).unwrap();
        renderer.shutdown(&mut device);

        let probe = renderer.pass::<ProbePass>().unwrap();
        assert_eq!(probe.shutdown_calls, 1);

        // A second shutdown is a logged no-op.
        renderer.shutdown(&mut device);
        assert_eq!(renderer.pass::<ProbePass>().unwrap().shutdown_calls, 1);
    }

    #[test]
    fn test_shared_defaults_released_on_shutdown() {
        let mut device = HeadlessDevice::new();
        let mut renderer = renderer_with_probe();
        renderer.init(&mut device, 640, 480).unwrap();
        assert!(device.live_buffers() > 0);
        assert!(device.live_textures() > 0);

        renderer.shutdown(&mut device);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    #[should_panic(expected = "out of frame order")]
    fn test_end_before_begin_asserts() {
        let mut device = HeadlessDevice::new();
        let mut renderer = renderer_with_probe();
        renderer.init(&mut device, 640, 480).unwrap();
        let front = device.create_front_buffer().unwrap();
        renderer.end(&mut device, front);
    }

    #[test]
    #[should_panic(expected = "before Renderer::init")]
    fn test_insert_after_init_asserts() {
        let mut device = HeadlessDevice::new();
        let mut renderer = renderer_with_probe();
        renderer.init(&mut device, 640, 480).unwrap();
        renderer.insert_pass(ProbePass::default());
    }

    #[test]
    fn test_queues_cleared_after_end() {
        let mut device = HeadlessDevice::new();
        let mut renderer = renderer_with_probe();
        renderer.init(&mut device, 640, 480).unwrap();
        let front = device.create_front_buffer().unwrap();

        renderer.begin(&mut device, 640, 480, &Camera::default());
        renderer.submit_point_light(PointLight::default());
        renderer.render(&mut device);
        renderer.end(&mut device, front);

        assert!(renderer.data().point_lights.is_empty());
    }

    #[test]
    fn test_noise_pixels_deterministic() {
        assert_eq!(generate_noise_pixels(8), generate_noise_pixels(8));
        assert_eq!(generate_noise_pixels(8).len(), 8 * 8 * 4);
    }
}

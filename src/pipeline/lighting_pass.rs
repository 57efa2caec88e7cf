//! Deferred lighting pass
//!
//! Consumes the G-buffer published by the geometry pass and the frame's
//! light queues, accumulating lit color into an HDR target. Runs as a
//! fullscreen pass; per-light work happens in the shader from a storage
//! buffer uploaded each frame.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::{
    PassHandle, RenderContext, RenderPass, RendererDataHandle, RendererDataTable,
};
use crate::scene::GpuLightData;
use bytemuck::{bytes_of, cast_slice, Pod, Zeroable};
use glam::Vec4;
use std::any::Any;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightingParams {
    /// xyz = ambient color, w = light count
    ambient_count: Vec4,
}

struct HdrTarget {
    width: u32,
    height: u32,
    color: TextureHandle,
    color_view: TextureViewHandle,
    framebuffer: FramebufferHandle,
}

impl HdrTarget {
    fn create(device: &mut dyn RenderDevice, width: u32, height: u32) -> DeviceResult<Self> {
        let color = device.create_texture(&TextureDescriptor::render_target(
            "hdr_color",
            width,
            height,
            TextureFormat::Rgba16Float,
        ))?;
        let color_view = device.create_texture_view(color)?;
        let framebuffer = device.create_framebuffer(&FramebufferDescriptor {
            label: Some("hdr".to_string()),
            color_attachments: vec![color_view],
            depth_attachment: None,
        })?;
        Ok(Self {
            width,
            height,
            color,
            color_view,
            framebuffer,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_texture(self.color);
    }
}

#[derive(Default)]
struct LightingPassData {
    target: Option<HdrTarget>,
    shader: Option<ShaderProgramHandle>,
    light_buffer: Option<BufferHandle>,
    params_buffer: Option<BufferHandle>,
    light_capacity: usize,
    handles: RendererDataTable,
}

/// Fullscreen deferred shading into the HDR target.
pub struct LightingPass {
    dependencies: [PassHandle; 1],
    max_lights: usize,
    /// Ambient term applied before any analytic light
    pub ambient: glam::Vec3,
    pass_data: LightingPassData,
}

impl LightingPass {
    pub fn new(geometry: PassHandle, max_lights: usize) -> Self {
        Self {
            dependencies: [geometry],
            max_lights,
            ambient: glam::Vec3::new(0.03, 0.03, 0.04),
            pass_data: LightingPassData::default(),
        }
    }

    /// Gather the frame's lights into GPU layout, bounded by `max_lights`.
    fn collect_lights(ctx: &RenderContext, max_lights: usize) -> Vec<GpuLightData> {
        let data = &ctx.data;
        let mut lights = Vec::with_capacity(
            data.directional_lights.len() + data.point_lights.len() + data.spot_lights.len(),
        );
        lights.extend(data.directional_lights.iter().map(|l| l.to_gpu_data()));
        lights.extend(data.point_lights.iter().map(|l| l.to_gpu_data()));
        lights.extend(data.spot_lights.iter().map(|l| l.to_gpu_data()));
        if lights.len() > max_lights {
            log::warn!(
                "frame submitted {} lights, clamping to {max_lights}",
                lights.len()
            );
            lights.truncate(max_lights);
        }
        lights
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &str {
        "lighting"
    }

    fn dependencies(&self) -> &[PassHandle] {
        &self.dependencies
    }

    fn on_init(&mut self, ctx: &mut RenderContext) -> DeviceResult<()> {
        let data = &mut self.pass_data;
        data.shader = Some(ctx.device.create_shader_program(
            "deferred_lighting",
            FULLSCREEN_VERTEX_SHADER,
            LIGHTING_FRAGMENT_SHADER,
        )?);
        data.light_capacity = self.max_lights.max(1);
        data.light_buffer = Some(ctx.device.create_buffer(&BufferDescriptor {
            label: Some("light_queue".to_string()),
            size: (data.light_capacity * std::mem::size_of::<GpuLightData>()) as u64,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        })?);
        data.params_buffer = Some(ctx.device.create_buffer(&BufferDescriptor {
            label: Some("lighting_params".to_string()),
            size: std::mem::size_of::<LightingParams>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?);
        Ok(())
    }

    fn update_pass_data(&mut self, _ctx: &mut RenderContext) {
        // Lights are not known yet at `begin`; the upload happens in
        // `on_render`, after the application has submitted the frame.
    }

    fn request_renderer_data(&mut self) -> RendererDataHandle {
        self.pass_data.handles.acquire()
    }

    fn delete_renderer_data(&mut self, handle: RendererDataHandle) {
        self.pass_data.handles.release(handle);
    }

    fn on_renderer_begin(&mut self, ctx: &mut RenderContext, width: u32, height: u32) {
        let data = &mut self.pass_data;
        let needs_rebuild = data
            .target
            .as_ref()
            .map(|t| t.width != width || t.height != height)
            .unwrap_or(true);

        if needs_rebuild {
            if let Some(old) = data.target.take() {
                old.destroy(ctx.device);
            }
            match HdrTarget::create(ctx.device, width, height) {
                Ok(target) => data.target = Some(target),
                Err(err) => {
                    log::warn!("failed to rebuild HDR target at {width}x{height}: {err}");
                    ctx.data.hdr_color = None;
                    return;
                }
            }
        }

        if let Some(target) = &data.target {
            ctx.data.hdr_color = Some(target.color_view);
        }
    }

    fn on_render(&mut self, ctx: &mut RenderContext) {
        let lights = Self::collect_lights(ctx, self.pass_data.light_capacity);
        let data = &mut self.pass_data;
        let (Some(target), Some(shader)) = (&data.target, data.shader) else {
            return;
        };
        // Without a G-buffer there is nothing to shade.
        let Some(gbuffer) = ctx.data.gbuffer else {
            log::trace!("lighting pass skipped: no G-buffer published");
            return;
        };

        ctx.data.stats.directional_lights = ctx.data.directional_lights.len() as u32;
        ctx.data.stats.point_lights = ctx.data.point_lights.len() as u32;
        ctx.data.stats.spot_lights = ctx.data.spot_lights.len() as u32;

        if let Some(light_buffer) = data.light_buffer {
            if !lights.is_empty() {
                ctx.device.write_buffer(light_buffer, 0, cast_slice(&lights));
            }
        }
        if let Some(params_buffer) = data.params_buffer {
            let params = LightingParams {
                ambient_count: self.ambient.extend(lights.len() as f32),
            };
            ctx.device.write_buffer(params_buffer, 0, bytes_of(&params));
        }

        ctx.device.begin_render_pass(&RenderPassDescriptor {
            label: Some("lighting".to_string()),
            framebuffer: target.framebuffer,
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
            clear_depth: None,
        });
        ctx.device
            .set_viewport(0.0, 0.0, target.width as f32, target.height as f32);
        ctx.device.bind_shader_program(shader);
        ctx.device.bind_texture(0, gbuffer.albedo);
        ctx.device.bind_texture(1, gbuffer.normal);
        ctx.device.bind_texture(2, gbuffer.material);
        ctx.device.bind_texture(3, gbuffer.depth);
        if let Some(noise) = ctx.data.noise_view {
            ctx.device.bind_texture(4, noise);
        }
        if let Some(light_buffer) = data.light_buffer {
            ctx.device.bind_storage_buffer(0, light_buffer);
        }
        if let Some(params_buffer) = data.params_buffer {
            ctx.device.bind_uniform_buffer(1, params_buffer);
        }
        if let Some(blank) = ctx.data.blank_vertex_buffer {
            ctx.device.bind_vertex_buffer(0, blank, 0);
        }

        // Fullscreen triangle; the vertex shader synthesizes positions.
        ctx.device.draw(PrimitiveTopology::TriangleList, 0..3, 0..1);
        ctx.data.stats.draw_calls += 1;

        ctx.device.end_render_pass();
    }

    fn on_renderer_end(&mut self, _ctx: &mut RenderContext, _front_buffer: FramebufferHandle) {}

    fn on_shutdown(&mut self, ctx: &mut RenderContext) {
        let data = &mut self.pass_data;
        if let Some(target) = data.target.take() {
            target.destroy(ctx.device);
        }
        if let Some(shader) = data.shader.take() {
            ctx.device.destroy_shader_program(shader);
        }
        for buffer in [data.light_buffer.take(), data.params_buffer.take()]
            .into_iter()
            .flatten()
        {
            ctx.device.destroy_buffer(buffer);
        }
        ctx.data.hdr_color = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) const FULLSCREEN_VERTEX_SHADER: &str = r#"
#version 450 core

layout(location = 0) out vec2 frag_uv;

void main() {
    // Single triangle covering the screen.
    float x = float((gl_VertexID << 1) & 2);
    float y = float(gl_VertexID & 2);
    frag_uv = vec2(x, 1.0 - y);
    gl_Position = vec4(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
}
"#;

const LIGHTING_FRAGMENT_SHADER: &str = r#"
#version 450 core

struct Light {
    vec4 position;        // xyz = position, w = radius
    vec4 color_intensity; // xyz = color, w = intensity
    vec4 direction_type;  // xyz = direction, w = type
    vec4 spot_params;     // x = cos(inner), y = cos(outer)
};

layout(binding = 0) uniform sampler2D gbuffer_albedo;
layout(binding = 1) uniform sampler2D gbuffer_normal;
layout(binding = 2) uniform sampler2D gbuffer_material;
layout(binding = 3) uniform sampler2D gbuffer_depth;
layout(binding = 4) uniform sampler2D noise;

layout(binding = 0, std430) readonly buffer Lights {
    Light lights[];
};

layout(binding = 1, std140) uniform Params {
    vec4 ambient_count;
} params;

layout(location = 0) in vec2 frag_uv;
layout(location = 0) out vec4 out_color;

void main() {
    vec3 albedo = texture(gbuffer_albedo, frag_uv).rgb;
    vec3 normal = normalize(texture(gbuffer_normal, frag_uv).xyz * 2.0 - 1.0);
    vec2 metallic_roughness = texture(gbuffer_material, frag_uv).rg;

    vec3 color = params.ambient_count.rgb * albedo;
    int count = int(params.ambient_count.w);
    for (int i = 0; i < count; i++) {
        Light light = lights[i];
        vec3 to_light;
        float attenuation = 1.0;
        if (light.direction_type.w > 1.5) {
            to_light = -normalize(light.direction_type.xyz);
        } else {
            // Point and spot fall off with the stored radius.
            to_light = normalize(light.position.xyz);
            attenuation = 1.0 / max(light.position.w, 0.001);
        }
        float ndotl = max(dot(normal, to_light), 0.0);
        color += albedo * light.color_intensity.rgb
               * light.color_intensity.w * ndotl * attenuation
               * (1.0 - metallic_roughness.x * 0.5);
    }

    out_color = vec4(color, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessDevice;
    use crate::render_graph::GlobalRendererData;
    use crate::scene::{Camera, DirectionalLight, PointLight};
    use glam::Vec3;

    fn init_pass(device: &mut HeadlessDevice, data: &mut GlobalRendererData) -> LightingPass {
        let mut pass = LightingPass::new(PassHandle::new(0), 16);
        pass.on_init(&mut RenderContext::new(device, data)).unwrap();
        pass
    }

    fn fake_gbuffer(device: &mut HeadlessDevice, data: &mut GlobalRendererData) {
        let mut geometry = crate::pipeline::GeometryPass::new();
        geometry
            .on_init(&mut RenderContext::new(device, data))
            .unwrap();
        geometry.on_renderer_begin(&mut RenderContext::new(device, data), 320, 240);
    }

    #[test]
    fn test_skips_without_gbuffer() {
        let mut device = HeadlessDevice::new();
        let mut data = GlobalRendererData::new(16);
        let mut pass = init_pass(&mut device, &mut data);

        data.begin_frame(&Camera::default(), 320, 240);
        pass.on_renderer_begin(
            &mut RenderContext::new(&mut device, &mut data),
            320,
            240,
        );
        device.reset_stats();
        pass.on_render(&mut RenderContext::new(&mut device, &mut data));
        assert_eq!(device.stats().draw_calls, 0);
    }

    #[test]
    fn test_shades_fullscreen_with_lights() {
        let mut device = HeadlessDevice::new();
        let mut data = GlobalRendererData::new(16);
        fake_gbuffer(&mut device, &mut data);
        let mut pass = init_pass(&mut device, &mut data);

        data.begin_frame(&Camera::default(), 320, 240);
        data.submit_directional_light(DirectionalLight::default());
        data.submit_point_light(PointLight {
            position: Vec3::new(1.0, 2.0, 0.0),
            ..Default::default()
        });

        pass.on_renderer_begin(
            &mut RenderContext::new(&mut device, &mut data),
            320,
            240,
        );
        device.reset_stats();
        pass.on_render(&mut RenderContext::new(&mut device, &mut data));

        assert_eq!(device.stats().draw_calls, 1);
        assert_eq!(device.stats().vertices, 3);
        assert_eq!(data.stats.directional_lights, 1);
        assert_eq!(data.stats.point_lights, 1);
        assert!(data.hdr_color.is_some());
    }

    #[test]
    fn test_light_clamp() {
        let mut device = HeadlessDevice::new();
        let mut data = GlobalRendererData::new(64);
        for _ in 0..5 {
            data.submit_point_light(PointLight::default());
        }
        let ctx = RenderContext::new(&mut device, &mut data);
        let lights = LightingPass::collect_lights(&ctx, 2);
        assert_eq!(lights.len(), 2);
    }

    #[test]
    fn test_shutdown_releases_resources() {
        let mut device = HeadlessDevice::new();
        let mut data = GlobalRendererData::new(16);
        let mut pass = init_pass(&mut device, &mut data);
        pass.on_renderer_begin(
            &mut RenderContext::new(&mut device, &mut data),
            320,
            240,
        );

        pass.on_shutdown(&mut RenderContext::new(&mut device, &mut data));
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_shader_programs(), 0);
        assert!(data.hdr_color.is_none());
    }
}

//! Post-processing pass
//!
//! Takes the HDR output of the lighting pass through a half-resolution
//! bloom chain and tonemaps the result into the externally supplied front
//! buffer during `on_renderer_end`.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::lighting_pass::FULLSCREEN_VERTEX_SHADER;
use crate::render_graph::{PassHandle, RenderContext, RenderPass};
use bytemuck::{bytes_of, Pod, Zeroable};
use std::any::Any;

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TonemapOperator {
    Reinhard,
    #[default]
    Aces,
    None,
}

impl TonemapOperator {
    fn shader_index(self) -> u32 {
        match self {
            TonemapOperator::Reinhard => 0,
            TonemapOperator::Aces => 1,
            TonemapOperator::None => 2,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PostProcessParams {
    exposure: f32,
    gamma: f32,
    bloom_strength: f32,
    operator: u32,
}

struct BloomTargets {
    width: u32,
    height: u32,
    downsample: TextureHandle,
    downsample_view: TextureViewHandle,
    downsample_fb: FramebufferHandle,
    upsample: TextureHandle,
    upsample_view: TextureViewHandle,
    upsample_fb: FramebufferHandle,
}

impl BloomTargets {
    /// Bloom runs at half resolution.
    fn create(device: &mut dyn RenderDevice, width: u32, height: u32) -> DeviceResult<Self> {
        let half_w = (width / 2).max(1);
        let half_h = (height / 2).max(1);

        let downsample = device.create_texture(&TextureDescriptor {
            label: Some("bloom_downsample".to_string()),
            width: half_w,
            height: half_h,
            mip_levels: 4,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        })?;
        let downsample_view = device.create_texture_view(downsample)?;
        let downsample_fb = device.create_framebuffer(&FramebufferDescriptor {
            label: Some("bloom_downsample".to_string()),
            color_attachments: vec![downsample_view],
            depth_attachment: None,
        })?;

        let upsample = device.create_texture(&TextureDescriptor {
            label: Some("bloom_upsample".to_string()),
            width: half_w,
            height: half_h,
            mip_levels: 4,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        })?;
        let upsample_view = device.create_texture_view(upsample)?;
        let upsample_fb = device.create_framebuffer(&FramebufferDescriptor {
            label: Some("bloom_upsample".to_string()),
            color_attachments: vec![upsample_view],
            depth_attachment: None,
        })?;

        Ok(Self {
            width,
            height,
            downsample,
            downsample_view,
            downsample_fb,
            upsample,
            upsample_view,
            upsample_fb,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_framebuffer(self.downsample_fb);
        device.destroy_framebuffer(self.upsample_fb);
        device.destroy_texture(self.downsample);
        device.destroy_texture(self.upsample);
    }
}

#[derive(Default)]
struct PostProcessPassData {
    bloom_targets: Option<BloomTargets>,
    bloom_shader: Option<ShaderProgramHandle>,
    tonemap_shader: Option<ShaderProgramHandle>,
    params_buffer: Option<BufferHandle>,
}

/// HDR resolve: bloom plus tonemapping into the front buffer.
pub struct PostProcessPass {
    dependencies: [PassHandle; 1],
    enable_bloom: bool,
    pub operator: TonemapOperator,
    pub exposure: f32,
    pub gamma: f32,
    pub bloom_strength: f32,
    pass_data: PostProcessPassData,
}

impl PostProcessPass {
    pub fn new(lighting: PassHandle, enable_bloom: bool) -> Self {
        Self {
            dependencies: [lighting],
            enable_bloom,
            operator: TonemapOperator::default(),
            exposure: 1.0,
            gamma: 2.2,
            bloom_strength: 0.04,
            pass_data: PostProcessPassData::default(),
        }
    }
}

impl RenderPass for PostProcessPass {
    fn name(&self) -> &str {
        "post_process"
    }

    fn dependencies(&self) -> &[PassHandle] {
        &self.dependencies
    }

    fn on_init(&mut self, ctx: &mut RenderContext) -> DeviceResult<()> {
        let data = &mut self.pass_data;
        if self.enable_bloom {
            data.bloom_shader = Some(ctx.device.create_shader_program(
                "bloom",
                FULLSCREEN_VERTEX_SHADER,
                BLOOM_FRAGMENT_SHADER,
            )?);
        }
        data.tonemap_shader = Some(ctx.device.create_shader_program(
            "tonemap",
            FULLSCREEN_VERTEX_SHADER,
            TONEMAP_FRAGMENT_SHADER,
        )?);
        data.params_buffer = Some(ctx.device.create_buffer(&BufferDescriptor {
            label: Some("post_process_params".to_string()),
            size: std::mem::size_of::<PostProcessParams>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?);
        Ok(())
    }

    fn update_pass_data(&mut self, ctx: &mut RenderContext) {
        if let Some(params_buffer) = self.pass_data.params_buffer {
            let params = PostProcessParams {
                exposure: self.exposure,
                gamma: self.gamma,
                bloom_strength: if self.enable_bloom {
                    self.bloom_strength
                } else {
                    0.0
                },
                operator: self.operator.shader_index(),
            };
            ctx.device.write_buffer(params_buffer, 0, bytes_of(&params));
        }
    }

    fn on_renderer_begin(&mut self, ctx: &mut RenderContext, width: u32, height: u32) {
        if !self.enable_bloom {
            return;
        }
        let data = &mut self.pass_data;
        let needs_rebuild = data
            .bloom_targets
            .as_ref()
            .map(|t| t.width != width || t.height != height)
            .unwrap_or(true);
        if needs_rebuild {
            if let Some(old) = data.bloom_targets.take() {
                old.destroy(ctx.device);
            }
            match BloomTargets::create(ctx.device, width, height) {
                Ok(targets) => data.bloom_targets = Some(targets),
                Err(err) => log::warn!("failed to rebuild bloom targets: {err}"),
            }
        }
    }

    fn on_render(&mut self, ctx: &mut RenderContext) {
        let data = &mut self.pass_data;
        let (Some(targets), Some(shader)) = (&data.bloom_targets, data.bloom_shader) else {
            return;
        };
        let Some(hdr) = ctx.data.hdr_color else {
            return;
        };

        // Downsample the bright end of the HDR image, then widen it back
        // up; both stages are fullscreen triangles over the half-res chain.
        ctx.device.begin_render_pass(&RenderPassDescriptor {
            label: Some("bloom_downsample".to_string()),
            framebuffer: targets.downsample_fb,
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
            clear_depth: None,
        });
        ctx.device.set_viewport(
            0.0,
            0.0,
            (targets.width / 2).max(1) as f32,
            (targets.height / 2).max(1) as f32,
        );
        ctx.device.bind_shader_program(shader);
        ctx.device.bind_texture(0, hdr);
        ctx.device.draw(PrimitiveTopology::TriangleList, 0..3, 0..1);
        ctx.device.end_render_pass();

        ctx.device.begin_render_pass(&RenderPassDescriptor {
            label: Some("bloom_upsample".to_string()),
            framebuffer: targets.upsample_fb,
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
            clear_depth: None,
        });
        ctx.device.set_viewport(
            0.0,
            0.0,
            (targets.width / 2).max(1) as f32,
            (targets.height / 2).max(1) as f32,
        );
        ctx.device.bind_shader_program(shader);
        ctx.device.bind_texture(0, targets.downsample_view);
        ctx.device.draw(PrimitiveTopology::TriangleList, 0..3, 0..1);
        ctx.device.end_render_pass();

        ctx.data.stats.draw_calls += 2;
    }

    fn on_renderer_end(&mut self, ctx: &mut RenderContext, front_buffer: FramebufferHandle) {
        let data = &mut self.pass_data;

        let Some(hdr) = ctx.data.hdr_color else {
            // Nothing was shaded this frame; still leave the front buffer
            // in a defined state.
            ctx.device.begin_render_pass(&RenderPassDescriptor {
                label: Some("tonemap_clear".to_string()),
                framebuffer: front_buffer,
                clear_color: Some([0.0, 0.0, 0.0, 1.0]),
                clear_depth: None,
            });
            ctx.device.end_render_pass();
            return;
        };
        let Some(shader) = data.tonemap_shader else {
            return;
        };

        ctx.device.begin_render_pass(&RenderPassDescriptor {
            label: Some("tonemap".to_string()),
            framebuffer: front_buffer,
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
            clear_depth: None,
        });
        ctx.device
            .set_viewport(0.0, 0.0, ctx.data.width as f32, ctx.data.height as f32);
        ctx.device.bind_shader_program(shader);
        ctx.device.bind_texture(0, hdr);
        if let Some(targets) = &data.bloom_targets {
            ctx.device.bind_texture(1, targets.upsample_view);
        }
        if let Some(params_buffer) = data.params_buffer {
            ctx.device.bind_uniform_buffer(0, params_buffer);
        }
        ctx.device.draw(PrimitiveTopology::TriangleList, 0..3, 0..1);
        ctx.device.end_render_pass();

        ctx.data.stats.draw_calls += 1;
    }

    fn on_shutdown(&mut self, ctx: &mut RenderContext) {
        let data = &mut self.pass_data;
        if let Some(targets) = data.bloom_targets.take() {
            targets.destroy(ctx.device);
        }
        for shader in [data.bloom_shader.take(), data.tonemap_shader.take()]
            .into_iter()
            .flatten()
        {
            ctx.device.destroy_shader_program(shader);
        }
        if let Some(buffer) = data.params_buffer.take() {
            ctx.device.destroy_buffer(buffer);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

const BLOOM_FRAGMENT_SHADER: &str = r#"
#version 450 core

layout(binding = 0) uniform sampler2D source;

layout(location = 0) in vec2 frag_uv;
layout(location = 0) out vec4 out_color;

void main() {
    // 4-tap box filter with a soft knee around 1.0.
    vec2 texel = 1.0 / vec2(textureSize(source, 0));
    vec3 color = vec3(0.0);
    color += texture(source, frag_uv + texel * vec2(-0.5, -0.5)).rgb;
    color += texture(source, frag_uv + texel * vec2( 0.5, -0.5)).rgb;
    color += texture(source, frag_uv + texel * vec2(-0.5,  0.5)).rgb;
    color += texture(source, frag_uv + texel * vec2( 0.5,  0.5)).rgb;
    color *= 0.25;
    float brightness = max(color.r, max(color.g, color.b));
    float knee = clamp(brightness - 1.0, 0.0, 1.0);
    out_color = vec4(color * knee, 1.0);
}
"#;

const TONEMAP_FRAGMENT_SHADER: &str = r#"
#version 450 core

layout(binding = 0) uniform sampler2D hdr_color;
layout(binding = 1) uniform sampler2D bloom;

layout(binding = 0, std140) uniform Params {
    float exposure;
    float gamma;
    float bloom_strength;
    uint op;
} params;

layout(location = 0) in vec2 frag_uv;
layout(location = 0) out vec4 out_color;

vec3 aces(vec3 x) {
    return clamp((x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14), 0.0, 1.0);
}

void main() {
    vec3 color = texture(hdr_color, frag_uv).rgb;
    color += texture(bloom, frag_uv).rgb * params.bloom_strength;
    color *= params.exposure;

    vec3 mapped;
    if (params.op == 0u) {
        mapped = color / (color + vec3(1.0));
    } else if (params.op == 1u) {
        mapped = aces(color);
    } else {
        mapped = clamp(color, 0.0, 1.0);
    }

    out_color = vec4(pow(mapped, vec3(1.0 / params.gamma)), 1.0);
}
"#;

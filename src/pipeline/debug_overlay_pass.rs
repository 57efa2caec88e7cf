//! Debug overlay pass
//!
//! Draws the frame's submitted debug lines over the composited front
//! buffer. Runs last so the overlay survives tonemapping; an empty line
//! queue makes the whole pass a no-op.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::{PassHandle, RenderContext, RenderPass};
use bytemuck::{bytes_of, cast_slice, Pod, Zeroable};
use glam::Vec3;
use std::any::Any;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LineVertex {
    position: Vec3,
    color: Vec3,
}

#[derive(Default)]
struct DebugOverlayPassData {
    shader: Option<ShaderProgramHandle>,
    camera_buffer: Option<BufferHandle>,
    vertex_buffer: Option<BufferHandle>,
    /// Capacity of `vertex_buffer` in vertices
    capacity: usize,
    /// Vertices uploaded for the current frame
    vertex_count: u32,
}

/// World-space line overlay for editor gizmos and physics debug draw.
pub struct DebugOverlayPass {
    dependencies: [PassHandle; 1],
    pass_data: DebugOverlayPassData,
}

impl DebugOverlayPass {
    pub fn new(post_process: PassHandle) -> Self {
        Self {
            dependencies: [post_process],
            pass_data: DebugOverlayPassData::default(),
        }
    }

    fn ensure_capacity(
        data: &mut DebugOverlayPassData,
        device: &mut dyn RenderDevice,
        vertices: usize,
    ) -> DeviceResult<BufferHandle> {
        if let Some(buffer) = data.vertex_buffer {
            if data.capacity >= vertices {
                return Ok(buffer);
            }
            device.destroy_buffer(buffer);
        }
        // Grow with headroom so a slowly increasing line count does not
        // reallocate every frame.
        let capacity = vertices.next_power_of_two().max(256);
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some("debug_lines".to_string()),
            size: (capacity * std::mem::size_of::<LineVertex>()) as u64,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        })?;
        data.vertex_buffer = Some(buffer);
        data.capacity = capacity;
        Ok(buffer)
    }
}

impl RenderPass for DebugOverlayPass {
    fn name(&self) -> &str {
        "debug_overlay"
    }

    fn dependencies(&self) -> &[PassHandle] {
        &self.dependencies
    }

    fn on_init(&mut self, ctx: &mut RenderContext) -> DeviceResult<()> {
        let data = &mut self.pass_data;
        data.shader = Some(ctx.device.create_shader_program(
            "debug_overlay",
            LINE_VERTEX_SHADER,
            LINE_FRAGMENT_SHADER,
        )?);
        data.camera_buffer = Some(ctx.device.create_buffer(&BufferDescriptor {
            label: Some("debug_overlay_camera".to_string()),
            size: std::mem::size_of::<crate::scene::CameraUniformData>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?);
        Ok(())
    }

    fn update_pass_data(&mut self, ctx: &mut RenderContext) {
        if let Some(camera_buffer) = self.pass_data.camera_buffer {
            ctx.device
                .write_buffer(camera_buffer, 0, bytes_of(&ctx.data.camera_uniform));
        }
    }

    fn on_renderer_begin(&mut self, _ctx: &mut RenderContext, _width: u32, _height: u32) {
        self.pass_data.vertex_count = 0;
    }

    fn on_render(&mut self, ctx: &mut RenderContext) {
        let data = &mut self.pass_data;
        if ctx.data.debug_lines.is_empty() {
            return;
        }

        let vertices: Vec<LineVertex> = ctx
            .data
            .debug_lines
            .iter()
            .flat_map(|line| {
                [
                    LineVertex {
                        position: line.start,
                        color: line.color,
                    },
                    LineVertex {
                        position: line.end,
                        color: line.color,
                    },
                ]
            })
            .collect();

        match Self::ensure_capacity(data, ctx.device, vertices.len()) {
            Ok(buffer) => {
                ctx.device.write_buffer(buffer, 0, cast_slice(&vertices));
                data.vertex_count = vertices.len() as u32;
            }
            Err(err) => {
                log::warn!("failed to grow debug line buffer: {err}");
                data.vertex_count = 0;
            }
        }
    }

    fn on_renderer_end(&mut self, ctx: &mut RenderContext, front_buffer: FramebufferHandle) {
        let data = &mut self.pass_data;
        let (Some(shader), Some(vertex_buffer)) = (data.shader, data.vertex_buffer) else {
            return;
        };
        if data.vertex_count == 0 {
            return;
        }

        // Load the composited image; the overlay draws on top of it.
        ctx.device.begin_render_pass(&RenderPassDescriptor {
            label: Some("debug_overlay".to_string()),
            framebuffer: front_buffer,
            clear_color: None,
            clear_depth: None,
        });
        ctx.device
            .set_viewport(0.0, 0.0, ctx.data.width as f32, ctx.data.height as f32);
        ctx.device.bind_shader_program(shader);
        if let Some(camera_buffer) = data.camera_buffer {
            ctx.device.bind_uniform_buffer(0, camera_buffer);
        }
        ctx.device.bind_vertex_buffer(0, vertex_buffer, 0);
        ctx.device
            .draw(PrimitiveTopology::LineList, 0..data.vertex_count, 0..1);
        ctx.device.end_render_pass();

        ctx.data.stats.draw_calls += 1;
    }

    fn on_shutdown(&mut self, ctx: &mut RenderContext) {
        let data = &mut self.pass_data;
        if let Some(shader) = data.shader.take() {
            ctx.device.destroy_shader_program(shader);
        }
        for buffer in [data.camera_buffer.take(), data.vertex_buffer.take()]
            .into_iter()
            .flatten()
        {
            ctx.device.destroy_buffer(buffer);
        }
        data.capacity = 0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

const LINE_VERTEX_SHADER: &str = r#"
#version 450 core

layout(location = 0) in vec3 in_position;
layout(location = 1) in vec3 in_color;

layout(binding = 0, std140) uniform Camera {
    mat4 view;
    mat4 proj;
    mat4 view_proj;
    mat4 inv_view;
    mat4 inv_proj;
    vec4 position;
    vec4 near_far;
} camera;

layout(location = 0) out vec3 frag_color;

void main() {
    frag_color = in_color;
    gl_Position = camera.view_proj * vec4(in_position, 1.0);
}
"#;

const LINE_FRAGMENT_SHADER: &str = r#"
#version 450 core

layout(location = 0) in vec3 frag_color;
layout(location = 0) out vec4 out_color;

void main() {
    out_color = vec4(frag_color, 1.0);
}
"#;

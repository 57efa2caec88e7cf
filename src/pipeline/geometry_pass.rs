//! G-buffer generation pass
//!
//! First stage of the deferred pipeline. Culls the frame's static
//! submissions against the camera frustum and renders the survivors into
//! multiple render targets:
//! - Albedo (base color)
//! - World-space normals (encoded)
//! - Material properties (metallic, roughness)
//! - Entity id (editor picking)
//! - Depth

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::{
    GBufferAttachments, PassHandle, RenderContext, RenderPass, RendererDataHandle,
    RendererDataTable,
};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat4, Vec4};
use std::any::Any;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ObjectParams {
    model: Mat4,
    normal_matrix: Mat4,
    /// x = entity id, yzw unused
    id: Vec4,
}

struct GBufferTargets {
    width: u32,
    height: u32,
    albedo: TextureHandle,
    albedo_view: TextureViewHandle,
    normal: TextureHandle,
    normal_view: TextureViewHandle,
    material: TextureHandle,
    material_view: TextureViewHandle,
    entity_id: TextureHandle,
    entity_id_view: TextureViewHandle,
    depth: TextureHandle,
    depth_view: TextureViewHandle,
    framebuffer: FramebufferHandle,
}

impl GBufferTargets {
    fn create(device: &mut dyn RenderDevice, width: u32, height: u32) -> DeviceResult<Self> {
        let albedo = device.create_texture(&TextureDescriptor::render_target(
            "gbuffer_albedo",
            width,
            height,
            TextureFormat::Rgba8Unorm,
        ))?;
        let albedo_view = device.create_texture_view(albedo)?;

        // Float target keeps normal precision through the lighting pass.
        let normal = device.create_texture(&TextureDescriptor::render_target(
            "gbuffer_normal",
            width,
            height,
            TextureFormat::Rgba16Float,
        ))?;
        let normal_view = device.create_texture_view(normal)?;

        let material = device.create_texture(&TextureDescriptor::render_target(
            "gbuffer_material",
            width,
            height,
            TextureFormat::Rgba8Unorm,
        ))?;
        let material_view = device.create_texture_view(material)?;

        let entity_id = device.create_texture(&TextureDescriptor::render_target(
            "gbuffer_entity_id",
            width,
            height,
            TextureFormat::R32Float,
        ))?;
        let entity_id_view = device.create_texture_view(entity_id)?;

        let depth = device.create_texture(&TextureDescriptor::render_target(
            "gbuffer_depth",
            width,
            height,
            TextureFormat::Depth32Float,
        ))?;
        let depth_view = device.create_texture_view(depth)?;

        let framebuffer = device.create_framebuffer(&FramebufferDescriptor {
            label: Some("gbuffer".to_string()),
            color_attachments: vec![albedo_view, normal_view, material_view, entity_id_view],
            depth_attachment: Some(depth_view),
        })?;

        Ok(Self {
            width,
            height,
            albedo,
            albedo_view,
            normal,
            normal_view,
            material,
            material_view,
            entity_id,
            entity_id_view,
            depth,
            depth_view,
            framebuffer,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_texture(self.albedo);
        device.destroy_texture(self.normal);
        device.destroy_texture(self.material);
        device.destroy_texture(self.entity_id);
        device.destroy_texture(self.depth);
    }

    fn attachments(&self) -> GBufferAttachments {
        GBufferAttachments {
            albedo: self.albedo_view,
            normal: self.normal_view,
            material: self.material_view,
            entity_id: self.entity_id_view,
            depth: self.depth_view,
        }
    }
}

/// Pass-private state, exclusively owned.
#[derive(Default)]
struct GeometryPassData {
    targets: Option<GBufferTargets>,
    shader: Option<ShaderProgramHandle>,
    camera_buffer: Option<BufferHandle>,
    object_buffer: Option<BufferHandle>,
    material_buffer: Option<BufferHandle>,
    handles: RendererDataTable,
}

/// Renders scene geometry into the G-buffer.
#[derive(Default)]
pub struct GeometryPass {
    pass_data: GeometryPassData,
}

impl GeometryPass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderPass for GeometryPass {
    fn name(&self) -> &str {
        "geometry"
    }

    fn dependencies(&self) -> &[PassHandle] {
        &[]
    }

    fn on_init(&mut self, ctx: &mut RenderContext) -> DeviceResult<()> {
        let data = &mut self.pass_data;
        data.shader = Some(ctx.device.create_shader_program(
            "geometry",
            GEOMETRY_VERTEX_SHADER,
            GEOMETRY_FRAGMENT_SHADER,
        )?);
        data.camera_buffer = Some(ctx.device.create_buffer(&BufferDescriptor {
            label: Some("geometry_camera".to_string()),
            size: std::mem::size_of::<crate::scene::CameraUniformData>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?);
        data.object_buffer = Some(ctx.device.create_buffer(&BufferDescriptor {
            label: Some("geometry_object".to_string()),
            size: std::mem::size_of::<ObjectParams>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?);
        data.material_buffer = Some(ctx.device.create_buffer(&BufferDescriptor {
            label: Some("geometry_material".to_string()),
            size: std::mem::size_of::<crate::render_graph::MaterialParams>() as u64,
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

    fn request_renderer_data(&mut self) -> RendererDataHandle {
        self.pass_data.handles.acquire()
    }

    fn delete_renderer_data(&mut self, handle: RendererDataHandle) {
        self.pass_data.handles.release(handle);
    }

    fn on_renderer_begin(&mut self, ctx: &mut RenderContext, width: u32, height: u32) {
        let data = &mut self.pass_data;
        let needs_rebuild = data
            .targets
            .as_ref()
            .map(|t| t.width != width || t.height != height)
            .unwrap_or(true);

        if needs_rebuild {
            if let Some(old) = data.targets.take() {
                old.destroy(ctx.device);
            }
            match GBufferTargets::create(ctx.device, width, height) {
                Ok(targets) => data.targets = Some(targets),
                Err(err) => {
                    // Creation can only fail on degenerate dimensions; skip
                    // the frame rather than crash mid-resize.
                    log::warn!("failed to rebuild G-buffer at {width}x{height}: {err}");
                    ctx.data.gbuffer = None;
                    return;
                }
            }
        }

        if let Some(targets) = &data.targets {
            ctx.data.gbuffer = Some(targets.attachments());
        }
    }

    fn on_render(&mut self, ctx: &mut RenderContext) {
        let data = &mut self.pass_data;
        let (Some(targets), Some(shader)) = (&data.targets, data.shader) else {
            return;
        };

        ctx.device.begin_render_pass(&RenderPassDescriptor {
            label: Some("geometry".to_string()),
            framebuffer: targets.framebuffer,
            clear_color: Some([0.0, 0.0, 0.0, 0.0]),
            clear_depth: Some(1.0),
        });
        ctx.device
            .set_viewport(0.0, 0.0, targets.width as f32, targets.height as f32);
        ctx.device.bind_shader_program(shader);
        if let Some(camera_buffer) = data.camera_buffer {
            ctx.device.bind_uniform_buffer(0, camera_buffer);
        }

        for submission in &ctx.data.static_queue {
            let bounds = &submission.bounds;
            if !ctx.data.frustum.contains_sphere(bounds.center, bounds.radius) {
                ctx.data.stats.culled_instances += 1;
                continue;
            }

            let object = ObjectParams {
                model: submission.transform,
                normal_matrix: submission.transform.inverse().transpose(),
                id: Vec4::new(submission.entity_id as f32, 0.0, 0.0, 0.0),
            };
            if let Some(object_buffer) = data.object_buffer {
                ctx.device.write_buffer(object_buffer, 0, bytes_of(&object));
                ctx.device.bind_uniform_buffer(1, object_buffer);
            }
            if let Some(material_buffer) = data.material_buffer {
                ctx.device
                    .write_buffer(material_buffer, 0, bytes_of(&submission.material));
                ctx.device.bind_uniform_buffer(2, material_buffer);
            }

            ctx.device
                .bind_vertex_buffer(0, submission.vertex_buffer, 0);
            ctx.device
                .bind_index_buffer(submission.index_buffer, IndexFormat::Uint32);
            ctx.device.draw_indexed(
                PrimitiveTopology::TriangleList,
                0..submission.index_count,
                0..1,
            );

            ctx.data.stats.draw_calls += 1;
            ctx.data.stats.triangles += (submission.index_count / 3) as u64;
        }

        ctx.device.end_render_pass();
    }

    fn on_renderer_end(&mut self, _ctx: &mut RenderContext, _front_buffer: FramebufferHandle) {
        // The G-buffer is consumed by downstream passes; nothing reaches
        // the front buffer from here.
    }

    fn on_shutdown(&mut self, ctx: &mut RenderContext) {
        let data = &mut self.pass_data;
        if let Some(targets) = data.targets.take() {
            targets.destroy(ctx.device);
        }
        if let Some(shader) = data.shader.take() {
            ctx.device.destroy_shader_program(shader);
        }
        for buffer in [
            data.camera_buffer.take(),
            data.object_buffer.take(),
            data.material_buffer.take(),
        ]
        .into_iter()
        .flatten()
        {
            ctx.device.destroy_buffer(buffer);
        }
        ctx.data.gbuffer = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

const GEOMETRY_VERTEX_SHADER: &str = r#"
#version 450 core

layout(location = 0) in vec3 in_position;
layout(location = 1) in vec3 in_normal;
layout(location = 2) in vec2 in_uv;

layout(binding = 0, std140) uniform Camera {
    mat4 view;
    mat4 proj;
    mat4 view_proj;
    mat4 inv_view;
    mat4 inv_proj;
    vec4 position;
    vec4 near_far;
} camera;

layout(binding = 1, std140) uniform Object {
    mat4 model;
    mat4 normal_matrix;
    vec4 id;
} object;

layout(location = 0) out vec3 frag_normal;
layout(location = 1) out vec2 frag_uv;

void main() {
    vec4 world_pos = object.model * vec4(in_position, 1.0);
    frag_normal = normalize(mat3(object.normal_matrix) * in_normal);
    frag_uv = in_uv;
    gl_Position = camera.view_proj * world_pos;
}
"#;

const GEOMETRY_FRAGMENT_SHADER: &str = r#"
#version 450 core

layout(binding = 1, std140) uniform Object {
    mat4 model;
    mat4 normal_matrix;
    vec4 id;
} object;

layout(binding = 2, std140) uniform Material {
    vec4 base_color;
    float metallic;
    float roughness;
    vec2 padding;
} material;

layout(location = 0) in vec3 frag_normal;
layout(location = 1) in vec2 frag_uv;

layout(location = 0) out vec4 out_albedo;
layout(location = 1) out vec4 out_normal;
layout(location = 2) out vec4 out_material;
layout(location = 3) out float out_entity_id;

void main() {
    out_albedo = material.base_color;
    out_normal = vec4(normalize(frag_normal) * 0.5 + 0.5, 1.0);
    out_material = vec4(material.metallic, material.roughness, 0.0, 1.0);
    out_entity_id = object.id.x;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessDevice;
    use crate::render_graph::{BoundingSphere, GlobalRendererData, MaterialParams, StaticSubmission};
    use crate::scene::Camera;
    use glam::Vec3;

    fn submission(device: &mut HeadlessDevice, center: Vec3) -> StaticSubmission {
        let vertex_buffer = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 1024,
                usage: BufferUsage::VERTEX,
            })
            .unwrap();
        let index_buffer = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 1024,
                usage: BufferUsage::INDEX,
            })
            .unwrap();
        StaticSubmission {
            vertex_buffer,
            index_buffer,
            index_count: 36,
            transform: Mat4::from_translation(center),
            bounds: BoundingSphere {
                center,
                radius: 1.0,
            },
            material: MaterialParams::default(),
            entity_id: 7,
        }
    }

    fn drive_frame(
        pass: &mut GeometryPass,
        device: &mut HeadlessDevice,
        data: &mut GlobalRendererData,
    ) {
        data.begin_frame(&Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO), 320, 240);
        pass.update_pass_data(&mut RenderContext::new(device, data));
        pass.on_renderer_begin(&mut RenderContext::new(device, data), 320, 240);
        pass.on_render(&mut RenderContext::new(device, data));
    }

    #[test]
    fn test_publishes_gbuffer_attachments() {
        let mut device = HeadlessDevice::new();
        let mut data = GlobalRendererData::new(16);
        let mut pass = GeometryPass::new();

        pass.on_init(&mut RenderContext::new(&mut device, &mut data))
        .unwrap();
        drive_frame(&mut pass, &mut device, &mut data);

        assert!(data.gbuffer.is_some());
    }

    #[test]
    fn test_culls_out_of_frustum_submissions() {
        let mut device = HeadlessDevice::new();
        let mut data = GlobalRendererData::new(16);
        let mut pass = GeometryPass::new();
        pass.on_init(&mut RenderContext::new(&mut device, &mut data))
        .unwrap();

        let visible = submission(&mut device, Vec3::ZERO);
        let behind_camera = submission(&mut device, Vec3::new(0.0, 0.0, 100.0));
        data.submit_static(visible);
        data.submit_static(behind_camera);

        drive_frame(&mut pass, &mut device, &mut data);

        assert_eq!(data.stats.draw_calls, 1);
        assert_eq!(data.stats.culled_instances, 1);
        assert_eq!(data.stats.triangles, 12);
    }

    #[test]
    fn test_empty_queue_is_noop_draw() {
        let mut device = HeadlessDevice::new();
        let mut data = GlobalRendererData::new(16);
        let mut pass = GeometryPass::new();
        pass.on_init(&mut RenderContext::new(&mut device, &mut data))
        .unwrap();

        drive_frame(&mut pass, &mut device, &mut data);
        assert_eq!(data.stats.draw_calls, 0);
    }

    #[test]
    fn test_targets_rebuilt_on_resize_only() {
        let mut device = HeadlessDevice::new();
        let mut data = GlobalRendererData::new(16);
        let mut pass = GeometryPass::new();
        pass.on_init(&mut RenderContext::new(&mut device, &mut data))
        .unwrap();

        pass.on_renderer_begin(
            &mut RenderContext::new(&mut device, &mut data),
            320,
            240,
        );
        let textures_after_first = device.live_textures();

        pass.on_renderer_begin(
            &mut RenderContext::new(&mut device, &mut data),
            320,
            240,
        );
        assert_eq!(device.live_textures(), textures_after_first);

        pass.on_renderer_begin(
            &mut RenderContext::new(&mut device, &mut data),
            640,
            480,
        );
        // Old targets are destroyed before the replacements are created.
        assert_eq!(device.live_textures(), textures_after_first);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut device = HeadlessDevice::new();
        let mut data = GlobalRendererData::new(16);
        let mut pass = GeometryPass::new();
        pass.on_init(&mut RenderContext::new(&mut device, &mut data))
        .unwrap();
        drive_frame(&mut pass, &mut device, &mut data);

        // Submission buffers belong to the caller; drop only pass resources.
        let caller_buffers = 0;
        pass.on_shutdown(&mut RenderContext::new(&mut device, &mut data));

        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_framebuffers(), 0);
        assert_eq!(device.live_shader_programs(), 0);
        assert_eq!(device.live_buffers(), caller_buffers);
        assert!(data.gbuffer.is_none());
    }

    #[test]
    fn test_renderer_data_roundtrip() {
        let mut pass = GeometryPass::new();
        let handle = pass.request_renderer_data();
        assert!(handle.is_valid());
        pass.delete_renderer_data(handle);
        pass.delete_renderer_data(handle);
        assert_eq!(pass.pass_data.handles.live_count(), 0);
    }
}

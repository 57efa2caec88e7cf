//! Global renderer state
//!
//! One [`GlobalRendererData`] exists per renderer instance and is visible to
//! every pass in that renderer's graph. It is mutated in place by the frame
//! driver and by individual passes; correctness relies on the flattened
//! execution order, not on locking, because exactly one thread drives the
//! frame.

use crate::backend::traits::{BufferHandle, TextureHandle, TextureViewHandle};
use crate::scene::{Camera, CameraUniformData, DirectionalLight, Frustum, PointLight, SpotLight};
use crate::scene::MAX_DIRECTIONAL_LIGHTS;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Material parameters carried with every static submission
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialParams {
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub _padding: [f32; 2],
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            _padding: [0.0; 2],
        }
    }
}

/// World-space bounding sphere used for frustum culling
#[derive(Debug, Clone, Copy)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// One already-uploaded mesh instance submitted for this frame
#[derive(Debug, Clone)]
pub struct StaticSubmission {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub transform: Mat4,
    pub bounds: BoundingSphere,
    pub material: MaterialParams,
    /// Editor-facing entity id written to the id attachment (-1 = none)
    pub entity_id: i32,
}

/// One debug line submitted for the overlay pass
#[derive(Debug, Clone, Copy)]
pub struct DebugLine {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Vec3,
}

/// G-buffer attachment views published by the geometry pass
#[derive(Debug, Clone, Copy)]
pub struct GBufferAttachments {
    pub albedo: TextureViewHandle,
    pub normal: TextureViewHandle,
    pub material: TextureViewHandle,
    pub entity_id: TextureViewHandle,
    pub depth: TextureViewHandle,
}

/// Per-frame renderer statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub submitted_instances: u32,
    pub culled_instances: u32,
    pub triangles: u64,
    pub directional_lights: u32,
    pub point_lights: u32,
    pub spot_lights: u32,
}

/// Data common to the whole renderer, shared by all passes in one graph.
pub struct GlobalRendererData {
    /// Camera captured at `begin`
    pub camera: Camera,
    /// Uniform payload derived from the camera at `begin`
    pub camera_uniform: CameraUniformData,
    /// Frustum rebuilt from the camera at `begin`
    pub frustum: Frustum,

    /// Output dimensions for the current frame
    pub width: u32,
    pub height: u32,

    /// Shared default resources created at renderer init
    pub blank_vertex_buffer: Option<BufferHandle>,
    pub noise_texture: Option<TextureHandle>,
    pub noise_view: Option<TextureViewHandle>,

    /// Intermediate views published by passes for cross-pass consumption
    pub gbuffer: Option<GBufferAttachments>,
    pub hdr_color: Option<TextureViewHandle>,

    /// Per-frame submission queues, cleared at `end`
    pub static_queue: Vec<StaticSubmission>,
    pub directional_lights: Vec<DirectionalLight>,
    pub point_lights: Vec<PointLight>,
    pub spot_lights: Vec<SpotLight>,
    pub debug_lines: Vec<DebugLine>,
    /// Index into `directional_lights` of the light driving shadows
    pub primary_light_index: Option<usize>,

    /// Upper bound on point + spot lights consumed per frame
    pub max_lights: usize,

    pub stats: FrameStats,
}

impl GlobalRendererData {
    pub fn new(max_lights: usize) -> Self {
        Self {
            camera: Camera::default(),
            camera_uniform: Camera::default().uniform_data(),
            frustum: Frustum::default(),
            width: 0,
            height: 0,
            blank_vertex_buffer: None,
            noise_texture: None,
            noise_view: None,
            gbuffer: None,
            hdr_color: None,
            static_queue: Vec::new(),
            directional_lights: Vec::new(),
            point_lights: Vec::new(),
            spot_lights: Vec::new(),
            debug_lines: Vec::new(),
            primary_light_index: None,
            max_lights,
            stats: FrameStats::default(),
        }
    }

    /// Capture the frame's camera state and reset statistics.
    pub(crate) fn begin_frame(&mut self, camera: &Camera, width: u32, height: u32) {
        self.camera = camera.clone();
        self.camera_uniform = camera.uniform_data();
        self.frustum = camera.frustum();
        self.width = width;
        self.height = height;
        self.stats = FrameStats::default();
    }

    /// Drop everything submitted for the frame that just ended.
    pub(crate) fn clear_frame_queues(&mut self) {
        self.static_queue.clear();
        self.directional_lights.clear();
        self.point_lights.clear();
        self.spot_lights.clear();
        self.debug_lines.clear();
        self.primary_light_index = None;
    }

    pub fn submit_static(&mut self, submission: StaticSubmission) {
        self.stats.submitted_instances += 1;
        self.static_queue.push(submission);
    }

    pub fn submit_directional_light(&mut self, light: DirectionalLight) {
        if self.directional_lights.len() >= MAX_DIRECTIONAL_LIGHTS {
            log::warn!(
                "directional light queue full ({MAX_DIRECTIONAL_LIGHTS}), dropping submission"
            );
            return;
        }
        if light.cast_shadows && self.primary_light_index.is_none() {
            self.primary_light_index = Some(self.directional_lights.len());
        }
        self.directional_lights.push(light);
    }

    pub fn submit_point_light(&mut self, light: PointLight) {
        if self.point_lights.len() + self.spot_lights.len() >= self.max_lights {
            log::warn!("light queue full ({}), dropping point light", self.max_lights);
            return;
        }
        self.point_lights.push(light);
    }

    pub fn submit_spot_light(&mut self, light: SpotLight) {
        if self.point_lights.len() + self.spot_lights.len() >= self.max_lights {
            log::warn!("light queue full ({}), dropping spot light", self.max_lights);
            return;
        }
        self.spot_lights.push(light);
    }

    pub fn submit_debug_line(&mut self, line: DebugLine) {
        self.debug_lines.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_queue_capped() {
        let mut data = GlobalRendererData::new(64);
        for _ in 0..MAX_DIRECTIONAL_LIGHTS + 3 {
            data.submit_directional_light(DirectionalLight::default());
        }
        assert_eq!(data.directional_lights.len(), MAX_DIRECTIONAL_LIGHTS);
    }

    #[test]
    fn test_primary_light_is_first_shadow_caster() {
        let mut data = GlobalRendererData::new(64);
        data.submit_directional_light(DirectionalLight::default());
        data.submit_directional_light(DirectionalLight {
            cast_shadows: true,
            ..Default::default()
        });
        data.submit_directional_light(DirectionalLight {
            cast_shadows: true,
            ..Default::default()
        });
        assert_eq!(data.primary_light_index, Some(1));
    }

    #[test]
    fn test_point_and_spot_share_budget() {
        let mut data = GlobalRendererData::new(2);
        data.submit_point_light(PointLight::default());
        data.submit_spot_light(SpotLight::default());
        data.submit_point_light(PointLight::default());
        assert_eq!(data.point_lights.len() + data.spot_lights.len(), 2);
    }

    #[test]
    fn test_clear_frame_queues() {
        let mut data = GlobalRendererData::new(64);
        data.submit_point_light(PointLight::default());
        data.submit_debug_line(DebugLine {
            start: Vec3::ZERO,
            end: Vec3::X,
            color: Vec3::ONE,
        });
        data.clear_frame_queues();
        assert!(data.point_lights.is_empty());
        assert!(data.debug_lines.is_empty());
        assert!(data.primary_light_index.is_none());
    }
}

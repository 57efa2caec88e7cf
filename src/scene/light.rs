//! Light types for the scene

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Point light
#[derive(Debug, Clone)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
        }
    }
}

impl PointLight {
    /// Convert to GPU data format
    pub fn to_gpu_data(&self) -> GpuLightData {
        GpuLightData {
            position: self.position.extend(self.radius),
            color_intensity: self.color.extend(self.intensity),
            direction_type: Vec4::new(0.0, 0.0, 0.0, 0.0), // type 0 = point
            spot_params: Vec4::ZERO,
        }
    }
}

/// Spot light
#[derive(Debug, Clone)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub inner_angle: f32, // radians
    pub outer_angle: f32, // radians
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: -Vec3::Y,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            inner_angle: 0.3,
            outer_angle: 0.5,
        }
    }
}

impl SpotLight {
    /// Convert to GPU data format
    pub fn to_gpu_data(&self) -> GpuLightData {
        GpuLightData {
            position: self.position.extend(self.radius),
            color_intensity: self.color.extend(self.intensity),
            direction_type: self.direction.normalize().extend(1.0), // type 1 = spot
            spot_params: Vec4::new(self.inner_angle.cos(), self.outer_angle.cos(), 0.0, 0.0),
        }
    }
}

/// Directional light (like the sun)
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub cast_shadows: bool,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            cast_shadows: false,
        }
    }
}

impl DirectionalLight {
    /// Convert to GPU data format
    pub fn to_gpu_data(&self) -> GpuLightData {
        GpuLightData {
            position: Vec4::new(0.0, 0.0, 0.0, f32::MAX),
            color_intensity: self.color.extend(self.intensity),
            direction_type: self.direction.normalize().extend(2.0), // type 2 = directional
            spot_params: Vec4::ZERO,
        }
    }
}

/// GPU-friendly light data structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuLightData {
    /// xyz = position, w = radius
    pub position: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
    /// xyz = direction, w = light type (0=point, 1=spot, 2=directional)
    pub direction_type: Vec4,
    /// x = cos(inner_angle), y = cos(outer_angle), zw = unused
    pub spot_params: Vec4,
}

/// Directional lights are kept in a small fixed queue.
pub const MAX_DIRECTIONAL_LIGHTS: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_light_gpu_data() {
        let light = PointLight {
            position: Vec3::new(1.0, 2.0, 3.0),
            radius: 4.0,
            ..Default::default()
        };
        let gpu = light.to_gpu_data();
        assert_eq!(gpu.position, Vec4::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(gpu.direction_type.w, 0.0);
    }

    #[test]
    fn test_spot_light_direction_normalized() {
        let light = SpotLight {
            direction: Vec3::new(0.0, -2.0, 0.0),
            ..Default::default()
        };
        let gpu = light.to_gpu_data();
        assert!((gpu.direction_type.y + 1.0).abs() < 1.0e-6);
        assert_eq!(gpu.direction_type.w, 1.0);
    }
}

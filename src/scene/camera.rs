//! Camera and view frustum

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

/// Camera projection type
#[derive(Debug, Clone, Copy)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(*fov_y, *aspect, *near, *far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(*left, *right, *bottom, *top, *near, *far),
        }
    }

    pub fn near(&self) -> f32 {
        match self {
            Projection::Perspective { near, .. } => *near,
            Projection::Orthographic { near, .. } => *near,
        }
    }

    pub fn far(&self) -> f32 {
        match self {
            Projection::Perspective { far, .. } => *far,
            Projection::Orthographic { far, .. } => *far,
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Camera for viewing the scene
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get the forward direction
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// Build camera uniform data for shaders
    pub fn uniform_data(&self) -> CameraUniformData {
        let view = self.view_matrix();
        let proj = self.projection_matrix();
        let view_proj = proj * view;

        CameraUniformData {
            view,
            proj,
            view_proj,
            inv_view: view.inverse(),
            inv_proj: proj.inverse(),
            position: self.position.extend(1.0),
            near_far: Vec4::new(self.projection.near(), self.projection.far(), 0.0, 0.0),
        }
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.projection.set_aspect(width / height);
    }

    /// Build the view frustum for the current camera state
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection_matrix())
    }
}

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub position: Vec4,
    pub near_far: Vec4,
}

/// View frustum as six inward-facing planes (xyz = normal, w = distance)
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Default for Frustum {
    fn default() -> Self {
        // A degenerate frustum that contains everything, so state created
        // before the first `begin` never culls.
        Self {
            planes: [Vec4::new(0.0, 0.0, 0.0, f32::INFINITY); 6],
        }
    }
}

impl Frustum {
    /// Extract the six planes from a view-projection matrix
    /// (Gribb-Hartmann row combinations).
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let m = view_proj.transpose();
        let rows = [m.x_axis, m.y_axis, m.z_axis, m.w_axis];

        let mut planes = [
            rows[3] + rows[0], // left
            rows[3] - rows[0], // right
            rows[3] + rows[1], // bottom
            rows[3] - rows[1], // top
            rows[3] + rows[2], // near
            rows[3] - rows[2], // far
        ];

        for plane in &mut planes {
            let length = plane.xyz().length();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    /// Test whether a sphere intersects the frustum
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.xyz().dot(center) + plane.w >= -radius)
    }

    /// Test whether an axis-aligned box intersects the frustum
    pub fn contains_aabb(&self, min: Vec3, max: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.xyz();
            // Furthest corner along the plane normal.
            let corner = Vec3::new(
                if normal.x >= 0.0 { max.x } else { min.x },
                if normal.y >= 0.0 { max.y } else { min.y },
                if normal.z >= 0.0 { max.z } else { min.z },
            );
            normal.dot(corner) + plane.w >= 0.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        camera.projection = Projection::perspective(60.0, 1.0, 0.1, 100.0);
        camera
    }

    #[test]
    fn test_frustum_contains_origin() {
        let frustum = test_camera().frustum();
        assert!(frustum.contains_sphere(Vec3::ZERO, 0.5));
    }

    #[test]
    fn test_frustum_rejects_behind_camera() {
        let frustum = test_camera().frustum();
        assert!(!frustum.contains_sphere(Vec3::new(0.0, 0.0, 50.0), 1.0));
    }

    #[test]
    fn test_frustum_rejects_beyond_far_plane() {
        let frustum = test_camera().frustum();
        assert!(!frustum.contains_sphere(Vec3::new(0.0, 0.0, -500.0), 1.0));
    }

    #[test]
    fn test_frustum_accepts_sphere_straddling_plane() {
        let frustum = test_camera().frustum();
        // Just past the near boundary but with a radius reaching inside.
        assert!(frustum.contains_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0));
    }

    #[test]
    fn test_frustum_aabb() {
        let frustum = test_camera().frustum();
        assert!(frustum.contains_aabb(Vec3::splat(-1.0), Vec3::splat(1.0)));
        assert!(!frustum.contains_aabb(Vec3::new(200.0, 0.0, 0.0), Vec3::new(201.0, 1.0, 1.0)));
    }

    #[test]
    fn test_default_frustum_contains_everything() {
        let frustum = Frustum::default();
        assert!(frustum.contains_sphere(Vec3::splat(1.0e6), 0.0));
    }

    #[test]
    fn test_camera_uniform_roundtrip() {
        let camera = test_camera();
        let uniform = camera.uniform_data();
        let identity = uniform.proj * uniform.inv_proj;
        assert!(identity.abs_diff_eq(Mat4::IDENTITY, 1.0e-4));
    }
}

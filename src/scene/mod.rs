//! Scene-facing data the renderer consumes
//!
//! The engine does not own scene or asset management; the embedding
//! application submits already-uploaded geometry and lights each frame.

pub mod camera;
pub mod light;

pub use camera::{Camera, CameraUniformData, Frustum, Projection};
pub use light::{
    DirectionalLight, GpuLightData, PointLight, SpotLight, MAX_DIRECTIONAL_LIGHTS,
};

//! Render device abstraction
//!
//! The render graph treats the GPU as an opaque capability: passes create,
//! bind and destroy buffers, textures, framebuffers and shader programs
//! through this trait and never see the underlying graphics API.

use crate::backend::types::*;
use std::ops::Range;
use thiserror::Error;

/// Device error type
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to initialize device: {0}")]
    InitializationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to compile shader program: {0}")]
    ShaderCreationFailed(String),
    #[error("Unknown resource handle")]
    UnknownHandle,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Handle to a framebuffer (a set of attachments that can be rendered into)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a compiled and linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderProgramHandle(pub(crate) u64);

/// Framebuffer descriptor
#[derive(Debug, Clone)]
pub struct FramebufferDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<TextureViewHandle>,
    pub depth_attachment: Option<TextureViewHandle>,
}

/// Render pass descriptor
///
/// `clear_color`/`clear_depth` of `None` means the attachment contents are
/// loaded rather than cleared.
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub framebuffer: FramebufferHandle,
    pub clear_color: Option<[f32; 4]>,
    pub clear_depth: Option<f32>,
}

/// Interface every render device must implement.
///
/// Object-safe so the graph can dispatch over `&mut dyn RenderDevice`. All
/// calls must happen on the thread owning the graphics context.
pub trait RenderDevice {
    // Resource creation

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> DeviceResult<BufferHandle>;

    /// Create a buffer with initial data
    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> DeviceResult<BufferHandle>;

    /// Write data to a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> DeviceResult<TextureHandle>;

    /// Create a view over a texture. Views are destroyed with their texture.
    fn create_texture_view(&mut self, texture: TextureHandle) -> DeviceResult<TextureViewHandle>;

    /// Write pixel data to a texture
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32);

    /// Create a framebuffer from previously created texture views
    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> DeviceResult<FramebufferHandle>;

    /// Compile and link a shader program from opaque source strings
    fn create_shader_program(
        &mut self,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> DeviceResult<ShaderProgramHandle>;

    // Command recording

    /// Begin a render pass targeting a framebuffer
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Set the viewport
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32);

    /// Bind a shader program
    fn bind_shader_program(&mut self, program: ShaderProgramHandle);

    /// Bind a texture view to a sampler slot
    fn bind_texture(&mut self, slot: u32, view: TextureViewHandle);

    /// Bind a uniform buffer to a binding slot
    fn bind_uniform_buffer(&mut self, slot: u32, buffer: BufferHandle);

    /// Bind a storage buffer to a binding slot
    fn bind_storage_buffer(&mut self, slot: u32, buffer: BufferHandle);

    /// Bind a vertex buffer
    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    /// Bind an index buffer
    fn bind_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat);

    /// Draw primitives
    fn draw(&mut self, topology: PrimitiveTopology, vertices: Range<u32>, instances: Range<u32>);

    /// Draw indexed primitives
    fn draw_indexed(
        &mut self,
        topology: PrimitiveTopology,
        indices: Range<u32>,
        instances: Range<u32>,
    );

    // Resource cleanup

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a texture and its views
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Destroy a framebuffer (attachments are not destroyed)
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Destroy a shader program
    fn destroy_shader_program(&mut self, program: ShaderProgramHandle);
}

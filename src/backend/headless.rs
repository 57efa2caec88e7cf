//! Headless render device
//!
//! Allocates handle-only resources and records command statistics instead of
//! talking to a GPU. Used by the test suite and the headless demo; also
//! handy for running the frame lifecycle in CI where no graphics context
//! exists.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

#[derive(Debug, Clone)]
struct TextureRecord {
    desc: TextureDescriptor,
    views: Vec<TextureViewHandle>,
}

/// Statistics recorded while replaying commands
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessStats {
    pub render_passes: u32,
    pub draw_calls: u32,
    pub vertices: u64,
    pub buffer_writes: u32,
}

/// A `RenderDevice` that never touches a GPU.
#[derive(Default)]
pub struct HeadlessDevice {
    next_handle: u64,
    buffers: HashMap<BufferHandle, BufferDescriptor>,
    textures: HashMap<TextureHandle, TextureRecord>,
    views: HashMap<TextureViewHandle, TextureHandle>,
    framebuffers: HashMap<FramebufferHandle, FramebufferDescriptor>,
    shader_programs: HashSet<ShaderProgramHandle>,
    in_render_pass: bool,
    stats: HeadlessStats,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_shader_programs(&self) -> usize {
        self.shader_programs.len()
    }

    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = HeadlessStats::default();
    }

    /// Create a framebuffer that stands in for an externally owned front
    /// buffer (a 1x1 color target is allocated behind it).
    pub fn create_front_buffer(&mut self) -> DeviceResult<FramebufferHandle> {
        let texture = self.create_texture(&TextureDescriptor::render_target(
            "front_buffer_color",
            1,
            1,
            TextureFormat::Rgba8Unorm,
        ))?;
        let view = self.create_texture_view(texture)?;
        self.create_framebuffer(&FramebufferDescriptor {
            label: Some("front_buffer".to_string()),
            color_attachments: vec![view],
            depth_attachment: None,
        })
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> DeviceResult<BufferHandle> {
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> DeviceResult<BufferHandle> {
        if data.len() as u64 > desc.size {
            return Err(DeviceError::BufferCreationFailed(format!(
                "initial data ({} bytes) exceeds buffer size ({} bytes)",
                data.len(),
                desc.size
            )));
        }
        self.create_buffer(desc)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        match self.buffers.get(&buffer) {
            Some(desc) => {
                if offset + data.len() as u64 > desc.size {
                    log::warn!(
                        "write_buffer overruns '{}' ({} + {} > {})",
                        desc.label.as_deref().unwrap_or("<unnamed>"),
                        offset,
                        data.len(),
                        desc.size
                    );
                    return;
                }
                self.stats.buffer_writes += 1;
            }
            None => log::warn!("write_buffer on unknown buffer handle"),
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> DeviceResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::TextureCreationFailed(format!(
                "zero-sized texture '{}'",
                desc.label.as_deref().unwrap_or("<unnamed>")
            )));
        }
        let handle = TextureHandle(self.next());
        self.textures.insert(
            handle,
            TextureRecord {
                desc: desc.clone(),
                views: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> DeviceResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture) {
            return Err(DeviceError::UnknownHandle);
        }
        let view = TextureViewHandle(self.next());
        if let Some(record) = self.textures.get_mut(&texture) {
            record.views.push(view);
        }
        self.views.insert(view, texture);
        Ok(view)
    }

    fn write_texture(&mut self, texture: TextureHandle, _data: &[u8], _width: u32, _height: u32) {
        if !self.textures.contains_key(&texture) {
            log::warn!("write_texture on unknown texture handle");
        }
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> DeviceResult<FramebufferHandle> {
        for view in desc
            .color_attachments
            .iter()
            .chain(desc.depth_attachment.iter())
        {
            if !self.views.contains_key(view) {
                return Err(DeviceError::FramebufferCreationFailed(format!(
                    "framebuffer '{}' references a destroyed texture view",
                    desc.label.as_deref().unwrap_or("<unnamed>")
                )));
            }
        }
        let handle = FramebufferHandle(self.next());
        self.framebuffers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_shader_program(
        &mut self,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> DeviceResult<ShaderProgramHandle> {
        if vertex_source.trim().is_empty() || fragment_source.trim().is_empty() {
            return Err(DeviceError::ShaderCreationFailed(format!(
                "empty shader source for '{label}'"
            )));
        }
        let handle = ShaderProgramHandle(self.next());
        self.shader_programs.insert(handle);
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        debug_assert!(!self.in_render_pass, "render pass already active");
        if !self.framebuffers.contains_key(&desc.framebuffer) {
            log::warn!(
                "begin_render_pass '{}' targets an unknown framebuffer",
                desc.label.as_deref().unwrap_or("<unnamed>")
            );
        }
        self.in_render_pass = true;
        self.stats.render_passes += 1;
    }

    fn end_render_pass(&mut self) {
        debug_assert!(self.in_render_pass, "no render pass active");
        self.in_render_pass = false;
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, _width: f32, _height: f32) {}

    fn bind_shader_program(&mut self, program: ShaderProgramHandle) {
        if !self.shader_programs.contains(&program) {
            log::warn!("bind_shader_program on unknown program handle");
        }
    }

    fn bind_texture(&mut self, _slot: u32, view: TextureViewHandle) {
        if !self.views.contains_key(&view) {
            log::warn!("bind_texture on unknown view handle");
        }
    }

    fn bind_uniform_buffer(&mut self, _slot: u32, buffer: BufferHandle) {
        if !self.buffers.contains_key(&buffer) {
            log::warn!("bind_uniform_buffer on unknown buffer handle");
        }
    }

    fn bind_storage_buffer(&mut self, _slot: u32, buffer: BufferHandle) {
        if !self.buffers.contains_key(&buffer) {
            log::warn!("bind_storage_buffer on unknown buffer handle");
        }
    }

    fn bind_vertex_buffer(&mut self, _slot: u32, buffer: BufferHandle, _offset: u64) {
        if !self.buffers.contains_key(&buffer) {
            log::warn!("bind_vertex_buffer on unknown buffer handle");
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, _format: IndexFormat) {
        if !self.buffers.contains_key(&buffer) {
            log::warn!("bind_index_buffer on unknown buffer handle");
        }
    }

    fn draw(&mut self, _topology: PrimitiveTopology, vertices: Range<u32>, instances: Range<u32>) {
        debug_assert!(self.in_render_pass, "draw outside a render pass");
        self.stats.draw_calls += 1;
        self.stats.vertices += (vertices.len() * instances.len()) as u64;
    }

    fn draw_indexed(
        &mut self,
        _topology: PrimitiveTopology,
        indices: Range<u32>,
        instances: Range<u32>,
    ) {
        debug_assert!(self.in_render_pass, "draw outside a render pass");
        self.stats.draw_calls += 1;
        self.stats.vertices += (indices.len() * instances.len()) as u64;
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("destroy_buffer on unknown or already destroyed handle");
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture) {
            Some(record) => {
                log::trace!(
                    "destroyed texture '{}'",
                    record.desc.label.as_deref().unwrap_or("<unnamed>")
                );
                for view in record.views {
                    self.views.remove(&view);
                }
            }
            None => log::warn!("destroy_texture on unknown or already destroyed handle"),
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer).is_none() {
            log::warn!("destroy_framebuffer on unknown or already destroyed handle");
        }
    }

    fn destroy_shader_program(&mut self, program: ShaderProgramHandle) {
        if !self.shader_programs.remove(&program) {
            log::warn!("destroy_shader_program on unknown or already destroyed handle");
        }
    }
}

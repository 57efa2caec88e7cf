//! Render pass contract
//!
//! A pass is a self-contained rendering stage driven through a fixed
//! lifecycle: `on_init` once, `update_pass_data` / `on_renderer_begin` /
//! `on_render` / `on_renderer_end` every frame, `on_shutdown` once. Passes
//! declare the passes they depend on at construction time; the registry
//! flattens those declarations into the per-frame execution order.

use crate::backend::traits::{DeviceResult, FramebufferHandle, RenderDevice};
use crate::render_graph::global::GlobalRendererData;
use std::any::Any;

/// Handle to a pass owned by a [`PassRegistry`](crate::render_graph::PassRegistry).
///
/// `PassHandle` is `Copy` and cheap to pass around. It is an index into the
/// registry's arena and is only valid for the registry that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassHandle(pub(crate) u32);

impl PassHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque integer handle to renderer-visible data a pass exposes
/// (for example a texture slot the editor samples for mouse picking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererDataHandle(pub i32);

impl RendererDataHandle {
    pub const INVALID: Self = Self(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

/// Slot table backing `request_renderer_data`/`delete_renderer_data`.
///
/// Releasing an invalid or already-released handle is a logged no-op, so
/// double-free from the embedding application cannot corrupt the table.
#[derive(Debug, Default)]
pub struct RendererDataTable {
    slots: Vec<bool>,
}

impl RendererDataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a new handle, reusing the first free slot.
    pub fn acquire(&mut self) -> RendererDataHandle {
        if let Some(index) = self.slots.iter().position(|live| !live) {
            self.slots[index] = true;
            return RendererDataHandle(index as i32);
        }
        self.slots.push(true);
        RendererDataHandle((self.slots.len() - 1) as i32)
    }

    /// Release a handle previously returned by [`acquire`](Self::acquire).
    pub fn release(&mut self, handle: RendererDataHandle) {
        let Ok(index) = usize::try_from(handle.0) else {
            log::warn!("released invalid renderer data handle {}", handle.0);
            return;
        };
        match self.slots.get_mut(index) {
            Some(live) if *live => *live = false,
            _ => log::warn!("released unknown or already freed renderer data handle {index}"),
        }
    }

    /// Number of handles currently handed out.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|live| **live).count()
    }
}

/// Context handed to every pass lifecycle call.
///
/// `data` is the per-renderer global block shared by all passes in one
/// graph; `device` is the opaque GPU capability. Both are borrowed for the
/// duration of a single lifecycle call, never stored.
pub struct RenderContext<'a> {
    pub device: &'a mut dyn RenderDevice,
    pub data: &'a mut GlobalRendererData,
}

impl<'a> RenderContext<'a> {
    pub fn new(device: &'a mut dyn RenderDevice, data: &'a mut GlobalRendererData) -> Self {
        Self { device, data }
    }
}

/// Trait every render pass implements.
///
/// At most one instance of each concrete pass type may live in a registry.
/// Cross-pass ordering comes exclusively from [`dependencies`](Self::dependencies);
/// passes with no edge between them must not assume any relative order.
pub trait RenderPass: Any {
    /// Pass name for logs and debugging
    fn name(&self) -> &str;

    /// Handles of the passes that must run before this one each frame.
    /// Fixed at construction; may only reference already-registered passes.
    fn dependencies(&self) -> &[PassHandle];

    /// One-time setup of the pass's own GPU resources.
    /// Called once, after registration, before any frame.
    fn on_init(&mut self, ctx: &mut RenderContext) -> DeviceResult<()>;

    /// Per-frame state refresh independent of the actual draw
    /// (for example recomputing matrices from the global block).
    fn update_pass_data(&mut self, ctx: &mut RenderContext);

    /// Hand out a handle to renderer-visible data this pass exposes.
    /// Safe to call any time after `on_init`; passes with nothing to
    /// expose return [`RendererDataHandle::INVALID`].
    fn request_renderer_data(&mut self) -> RendererDataHandle {
        RendererDataHandle::INVALID
    }

    /// Release a handle from `request_renderer_data`. Must tolerate
    /// invalid and already-released handles.
    fn delete_renderer_data(&mut self, handle: RendererDataHandle) {
        let _ = handle;
    }

    /// Prepare this pass's render targets for the given output dimensions.
    fn on_renderer_begin(&mut self, ctx: &mut RenderContext, width: u32, height: u32);

    /// Issue the actual draw/compute work. Outputs of earlier passes are
    /// available through the global block; an empty workload is a no-op.
    fn on_render(&mut self, ctx: &mut RenderContext);

    /// Finalize this pass's output for the frame, writing into the
    /// externally supplied front buffer where applicable.
    fn on_renderer_end(&mut self, ctx: &mut RenderContext, front_buffer: FramebufferHandle);

    /// Release every GPU resource the pass owns.
    fn on_shutdown(&mut self, ctx: &mut RenderContext);

    /// Allow downcasting for typed registry lookup
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_table_roundtrip() {
        let mut table = RendererDataTable::new();
        let handle = table.acquire();
        assert!(handle.is_valid());
        assert_eq!(table.live_count(), 1);

        table.release(handle);
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn test_data_table_double_free_guard() {
        let mut table = RendererDataTable::new();
        let handle = table.acquire();
        table.release(handle);
        table.release(handle);
        table.release(RendererDataHandle::INVALID);
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn test_data_table_slot_reuse() {
        let mut table = RendererDataTable::new();
        let first = table.acquire();
        let _second = table.acquire();
        table.release(first);

        let third = table.acquire();
        assert_eq!(third, first);
        assert_eq!(table.live_count(), 2);
    }
}

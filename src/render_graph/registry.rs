//! Pass registry and dependency flattening
//!
//! The registry owns every registered pass in an insertion-ordered arena,
//! enforces the one-instance-per-concrete-type invariant through a
//! `TypeId`-keyed map, and maintains the flattened execution order that all
//! lifecycle dispatch iterates.

use crate::backend::traits::{DeviceResult, FramebufferHandle, RenderDevice};
use crate::render_graph::global::GlobalRendererData;
use crate::render_graph::pass::{PassHandle, RenderContext, RenderPass};
use std::any::TypeId;
use std::collections::HashMap;

/// Owns all registered passes and their flattened execution order.
#[derive(Default)]
pub struct PassRegistry {
    /// Insertion-ordered arena. Passes reference each other by index
    /// ([`PassHandle`]), never by pointer.
    passes: Vec<Box<dyn RenderPass>>,
    type_to_index: HashMap<TypeId, usize>,
    /// Permutation of arena indices honoring every dependency edge.
    flattened: Vec<usize>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pass and re-flatten the graph.
    ///
    /// # Panics
    ///
    /// Registration is setup-time wiring, so misuse is a fatal
    /// configuration error: panics if a pass of the same concrete type is
    /// already registered, or if the pass declares a dependency handle
    /// that does not refer to an already-registered pass.
    pub fn insert<P: RenderPass>(&mut self, pass: P) -> PassHandle {
        let type_id = TypeId::of::<P>();
        assert!(
            !self.type_to_index.contains_key(&type_id),
            "a pass of type '{}' is already registered",
            pass.name()
        );
        for dependency in pass.dependencies() {
            assert!(
                dependency.index() < self.passes.len(),
                "pass '{}' depends on a pass that is not registered yet",
                pass.name()
            );
        }

        let index = self.passes.len();
        log::debug!("registering render pass '{}' at slot {index}", pass.name());
        self.passes.push(Box::new(pass));
        self.type_to_index.insert(type_id, index);
        self.reflatten();

        PassHandle::new(index as u32)
    }

    /// Typed lookup by concrete pass type.
    pub fn get<P: RenderPass>(&self) -> Option<&P> {
        let index = *self.type_to_index.get(&TypeId::of::<P>())?;
        self.passes[index].as_any().downcast_ref::<P>()
    }

    /// Typed mutable lookup by concrete pass type.
    pub fn get_mut<P: RenderPass>(&mut self) -> Option<&mut P> {
        let index = *self.type_to_index.get(&TypeId::of::<P>())?;
        self.passes[index].as_any_mut().downcast_mut::<P>()
    }

    /// Handle of the registered pass of type `P`, if any.
    pub fn handle_of<P: RenderPass>(&self) -> Option<PassHandle> {
        self.type_to_index
            .get(&TypeId::of::<P>())
            .map(|&index| PassHandle::new(index as u32))
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Current flattened execution order.
    pub fn flattened_order(&self) -> impl Iterator<Item = PassHandle> + '_ {
        self.flattened.iter().map(|&index| PassHandle::new(index as u32))
    }

    /// Name of a registered pass, for diagnostics.
    pub fn name_of(&self, handle: PassHandle) -> Option<&str> {
        self.passes.get(handle.index()).map(|pass| pass.name())
    }

    /// Recompute the flattened order from scratch.
    ///
    /// Repeated linear sweeps over the insertion-ordered arena: each sweep
    /// emits every pass whose dependencies have all been emitted. O(N²)
    /// worst case, which is fine — flattening runs at setup time over tens
    /// of passes, never mid-frame. Sweeping in insertion order makes the
    /// result a stable tie-break for passes with no edge between them.
    fn reflatten(&mut self) {
        let count = self.passes.len();
        let mut emitted = vec![false; count];
        self.flattened.clear();
        self.flattened.reserve(count);

        while self.flattened.len() < count {
            let mut progressed = false;
            for index in 0..count {
                if emitted[index] {
                    continue;
                }
                let ready = self.passes[index]
                    .dependencies()
                    .iter()
                    .all(|dep| emitted[dep.index()]);
                if ready {
                    emitted[index] = true;
                    self.flattened.push(index);
                    progressed = true;
                }
            }
            // Dependencies can only point at already-registered passes, so
            // a cycle cannot be built through the public API; detect one
            // anyway instead of spinning.
            assert!(progressed, "render pass graph contains a dependency cycle");
        }
    }

    // Lifecycle dispatch. Every phase iterates the flattened order;
    // shutdown runs it in reverse so teardown mirrors bring-up.

    pub fn on_init(
        &mut self,
        device: &mut dyn RenderDevice,
        data: &mut GlobalRendererData,
    ) -> DeviceResult<()> {
        for &index in &self.flattened {
            let pass = &mut self.passes[index];
            log::debug!("initializing render pass '{}'", pass.name());
            pass.on_init(&mut RenderContext::new(device, data))?;
        }
        Ok(())
    }

    pub fn update_pass_data(
        &mut self,
        device: &mut dyn RenderDevice,
        data: &mut GlobalRendererData,
    ) {
        for &index in &self.flattened {
            self.passes[index].update_pass_data(&mut RenderContext::new(device, data));
        }
    }

    pub fn on_renderer_begin(
        &mut self,
        device: &mut dyn RenderDevice,
        data: &mut GlobalRendererData,
        width: u32,
        height: u32,
    ) {
        for &index in &self.flattened {
            self.passes[index].on_renderer_begin(&mut RenderContext::new(device, data), width, height);
        }
    }

    pub fn on_render(&mut self, device: &mut dyn RenderDevice, data: &mut GlobalRendererData) {
        for &index in &self.flattened {
            self.passes[index].on_render(&mut RenderContext::new(device, data));
        }
    }

    pub fn on_renderer_end(
        &mut self,
        device: &mut dyn RenderDevice,
        data: &mut GlobalRendererData,
        front_buffer: FramebufferHandle,
    ) {
        for &index in &self.flattened {
            self.passes[index].on_renderer_end(&mut RenderContext::new(device, data), front_buffer);
        }
    }

    pub fn on_shutdown(&mut self, device: &mut dyn RenderDevice, data: &mut GlobalRendererData) {
        for &index in self.flattened.iter().rev() {
            let pass = &mut self.passes[index];
            log::debug!("shutting down render pass '{}'", pass.name());
            pass.on_shutdown(&mut RenderContext::new(device, data));
        }
    }
}

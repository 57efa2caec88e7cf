//! Render Pass Graph
//!
//! Rendering stages are registered as passes with declared dependencies,
//! flattened into a single dependency-respecting execution order, and driven
//! through a strict lifecycle each frame:
//!
//! - `on_init` — once per pass, before the first frame
//! - `update_pass_data`, `on_renderer_begin`, `on_render`, `on_renderer_end`
//!   — every frame, in flattened order
//! - `on_shutdown` — once per pass, in reverse flattened order
//!
//! The graph is strictly single-threaded: every lifecycle call happens on
//! the thread owning the graphics context.

pub mod global;
pub mod pass;
pub mod registry;

pub use global::*;
pub use pass::*;
pub use registry::*;

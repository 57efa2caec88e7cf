//! GPU device abstraction
//!
//! The engine talks to the GPU exclusively through the [`RenderDevice`]
//! trait; concrete graphics-API backends live outside this crate. The
//! built-in [`HeadlessDevice`] replays the command stream without a GPU and
//! backs the test suite.

pub mod headless;
pub mod traits;
pub mod types;

pub use headless::{HeadlessDevice, HeadlessStats};
pub use traits::*;
pub use types::*;

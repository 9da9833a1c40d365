// =============================================================================
// SPINNING TRIANGLE - Vulkan core
// =============================================================================
//
// One triangle, rotated on the CPU and redrawn every frame with a single
// frame in flight.
//
// FRAME FLOW:
// 1. Wait for the previous frame's fence, then reset it
// 2. Reset the command buffer
// 3. Acquire a swapchain image
// 4. Write the new vertex positions into mapped memory
// 5. Record and submit the draw
// 6. Present
//
// =============================================================================

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod teardown;

pub use engine::{Engine, EngineOptions};
pub use error::{EngineError, Result};

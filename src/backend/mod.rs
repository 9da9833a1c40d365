// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Each component creates its objects from the
// graphics device and hands back a releaser for ordered teardown.

pub mod command;
pub mod device;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod select;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use command::{CommandExecutor, DrawTarget};
pub use device::GraphicsDevice;
pub use memory::GeometryArena;
pub use pipeline::TrianglePipeline;
pub use render_pass::RenderTargetPass;
pub use swapchain::PresentationSurface;
pub use sync::SyncGroup;

// Engine - the owning context
//
// Builds every Vulkan component in dependency order, drives frames through
// `draw_frame`, and releases everything in reverse on drop.

use crate::backend::{
    CommandExecutor, DrawTarget, GeometryArena, GraphicsDevice, PresentationSurface,
    RenderTargetPass, SyncGroup, TrianglePipeline,
};
use crate::error::Result;
use crate::frame::{draw_frame, FrameTarget};
use crate::geometry::TriangleVertices;
use crate::teardown::{Stage, TeardownStack};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Startup choices made by the launcher.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Reported to the driver
    pub app_name: String,
    /// Enable the Khronos validation layer if it is installed
    pub enable_validation: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            app_name: "Spinning Triangle".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

// Everything created on top of the graphics device
struct Components {
    geometry: GeometryArena,
    surface: PresentationSurface,
    targets: RenderTargetPass,
    commands: CommandExecutor,
    sync: SyncGroup,
    pipeline: TrianglePipeline,
}

impl Components {
    /// Create each component, registering its teardown as soon as it exists.
    fn create(gpu: &GraphicsDevice, teardown: &mut TeardownStack<ash::Device>) -> Result<Self> {
        let geometry = GeometryArena::new(gpu)?;
        teardown.push(Stage::GeometryArena, geometry.releaser());

        let surface = PresentationSurface::new(gpu)?;
        teardown.push(Stage::Swapchain, surface.releaser());

        let targets = RenderTargetPass::new(gpu, &surface)?;
        teardown.push(Stage::RenderTargetSet, targets.releaser());

        let commands = CommandExecutor::new(gpu)?;
        teardown.push(Stage::CommandExecutor, commands.releaser());

        let sync = SyncGroup::new(gpu)?;
        teardown.push(Stage::SyncGroup, sync.releaser());

        let pipeline = TrianglePipeline::new(gpu, &surface, &targets)?;
        teardown.push(Stage::Pipeline, pipeline.releaser());

        Ok(Self {
            geometry,
            surface,
            targets,
            commands,
            sync,
            pipeline,
        })
    }
}

/// Vulkan state for drawing the spinning triangle into one window.
pub struct Engine {
    gpu: GraphicsDevice,
    parts: Components,
    teardown: TeardownStack<ash::Device>,
}

impl Engine {
    /// Initialize Vulkan for a window.
    ///
    /// The window behind `display`/`window` must outlive the engine. If any
    /// step fails, everything created so far is released before returning.
    pub fn new(
        display: RawDisplayHandle,
        window: RawWindowHandle,
        options: &EngineOptions,
    ) -> Result<Self> {
        let gpu = GraphicsDevice::new(display, window, &options.app_name, options.enable_validation)?;

        let mut teardown = TeardownStack::new();
        teardown.push(Stage::GraphicsDevice, gpu.releaser());

        let parts = match Components::create(&gpu, &mut teardown) {
            Ok(parts) => parts,
            Err(e) => {
                log::warn!("Initialization failed; releasing what was created");
                teardown.unwind(&gpu.device);
                return Err(e);
            }
        };

        log::info!("Engine ready");
        Ok(Self {
            gpu,
            parts,
            teardown,
        })
    }

    /// Render and present one frame with the triangle at phase `cycle` in [0, 1).
    pub fn draw(&mut self, cycle: f32) -> Result<()> {
        draw_frame(self, cycle).map(|_| ())
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.parts.surface.extent
    }
}

impl FrameTarget for Engine {
    fn wait_for_previous_frame(&mut self) -> Result<()> {
        self.parts.sync.wait(&self.gpu.device)
    }

    fn reset_frame_fence(&mut self) -> Result<()> {
        self.parts.sync.reset(&self.gpu.device)
    }

    fn reset_commands(&mut self) -> Result<()> {
        self.parts.commands.reset(&self.gpu.device)
    }

    fn acquire_image(&mut self) -> Result<u32> {
        self.parts
            .surface
            .acquire_next_image(self.parts.sync.image_acquired)
    }

    fn write_vertices(&mut self, vertices: &TriangleVertices) -> Result<()> {
        self.parts.geometry.write_vertices(vertices);
        Ok(())
    }

    fn record_commands(&mut self, image_index: u32) -> Result<()> {
        let parts = &self.parts;
        let target = DrawTarget {
            render_pass: parts.targets.render_pass,
            framebuffer: parts.targets.framebuffer(image_index)?,
            extent: parts.targets.extent,
            pipeline: parts.pipeline.pipeline,
            vertex_buffer: parts.geometry.buffer,
        };
        parts.commands.record(&self.gpu.device, &target)
    }

    fn submit(&mut self) -> Result<()> {
        let sync = &self.parts.sync;
        self.parts.commands.submit(
            &self.gpu.device,
            self.gpu.queue,
            sync.image_acquired,
            sync.render_complete,
            sync.fence,
        )
    }

    fn present(&mut self, image_index: u32) -> Result<()> {
        self.parts
            .surface
            .present(self.gpu.queue, image_index, self.parts.sync.render_complete)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.gpu.wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }

        self.teardown.unwind(&self.gpu.device);
        log::info!("Cleanup complete");
    }
}

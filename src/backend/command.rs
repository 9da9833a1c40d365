// Command recording and submission
//
// One pool, one primary command buffer. The buffer is reset and re-recorded
// every frame because the target framebuffer depends on the acquired image.

use super::GraphicsDevice;
use crate::config::CLEAR_COLOR;
use crate::error::{Result, VkResultExt};
use crate::geometry::VERTEX_COUNT;
use ash::vk;

/// Everything a frame's command buffer draws with
#[derive(Debug, Clone, Copy)]
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub vertex_buffer: vk::Buffer,
}

pub struct CommandExecutor {
    pub pool: vk::CommandPool,
    pub buffer: vk::CommandBuffer,
    // Submission waits on the acquire semaphore here
    wait_stages: [vk::PipelineStageFlags; 1],
}

impl CommandExecutor {
    pub fn new(gpu: &GraphicsDevice) -> Result<Self> {
        let device = &gpu.device;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(gpu.queue_family);

        let pool = unsafe { device.create_command_pool(&pool_info, None) }
            .during("vkCreateCommandPool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffer = match unsafe { device.allocate_command_buffers(&alloc_info) }
            .during("vkAllocateCommandBuffers")
        {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(e);
            }
        };

        log::info!("Created command pool on queue family {}", gpu.queue_family);

        Ok(Self {
            pool,
            buffer,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
        })
    }

    /// Return the command buffer to the initial state.
    ///
    /// The buffer must not be pending on the GPU.
    pub fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty()) }
            .during("vkResetCommandBuffer")
    }

    /// Record one frame: clear, bind the vertex buffer and pipeline, draw the
    /// triangle.
    pub fn record(&self, device: &ash::Device, target: &DrawTarget) -> Result<()> {
        let cmd = self.buffer;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(full_area(target.extent))
            .clear_values(&clear_values);

        unsafe {
            device
                .begin_command_buffer(cmd, &begin_info)
                .during("vkBeginCommandBuffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_vertex_buffers(cmd, 0, &[target.vertex_buffer], &[0]);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
            device.cmd_draw(cmd, VERTEX_COUNT as u32, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .during("vkEndCommandBuffer")
        }
    }

    /// Submit the recorded buffer.
    ///
    /// Execution waits on `wait` at color-attachment output, signals `signal`
    /// when done, and signals `fence` once the GPU has finished with it.
    pub fn submit(
        &self,
        device: &ash::Device,
        queue: vk::Queue,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let wait_semaphores = [wait];
        let signal_semaphores = [signal];
        let command_buffers = [self.buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { device.queue_submit(queue, &[submit_info.build()], fence) }
            .during("vkQueueSubmit")
    }

    /// Frees the command buffer, then destroys the pool.
    pub fn releaser(&self) -> impl FnOnce(&ash::Device) + 'static {
        let (pool, buffer) = (self.pool, self.buffer);
        move |device| unsafe {
            device.free_command_buffers(pool, &[buffer]);
            device.destroy_command_pool(pool, None);
        }
    }
}

/// Rectangle covering the whole extent.
pub fn full_area(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

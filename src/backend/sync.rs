// Synchronization primitives
//
// One fence and two semaphores for the single frame in flight.
// The fence starts signaled so the very first wait returns immediately.

use super::GraphicsDevice;
use crate::error::{Result, VkResultExt};
use ash::vk;

pub struct SyncGroup {
    /// Signaled when the GPU has finished the last submitted frame
    pub fence: vk::Fence,
    /// Signaled by the presentation engine when the acquired image is ready
    pub image_acquired: vk::Semaphore,
    /// Signaled when rendering is done; presentation waits on it
    pub render_complete: vk::Semaphore,
}

impl SyncGroup {
    pub fn new(gpu: &GraphicsDevice) -> Result<Self> {
        let device = &gpu.device;
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let fence =
            unsafe { device.create_fence(&fence_info, None) }.during("vkCreateFence")?;

        let image_acquired = match unsafe { device.create_semaphore(&semaphore_info, None) }
            .during("vkCreateSemaphore")
        {
            Ok(semaphore) => semaphore,
            Err(e) => {
                unsafe { device.destroy_fence(fence, None) };
                return Err(e);
            }
        };

        let render_complete = match unsafe { device.create_semaphore(&semaphore_info, None) }
            .during("vkCreateSemaphore")
        {
            Ok(semaphore) => semaphore,
            Err(e) => {
                unsafe {
                    device.destroy_semaphore(image_acquired, None);
                    device.destroy_fence(fence, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            fence,
            image_acquired,
            render_complete,
        })
    }

    /// Block until the previous frame's submission has completed.
    pub fn wait(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.wait_for_fences(&[self.fence], true, u64::MAX) }
            .during("vkWaitForFences")
    }

    pub fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_fences(&[self.fence]) }.during("vkResetFences")
    }

    /// Destroys the semaphores, then the fence.
    pub fn releaser(&self) -> impl FnOnce(&ash::Device) + 'static {
        let (fence, image_acquired, render_complete) =
            (self.fence, self.image_acquired, self.render_complete);

        move |device| unsafe {
            device.destroy_semaphore(render_complete, None);
            device.destroy_semaphore(image_acquired, None);
            device.destroy_fence(fence, None);
        }
    }
}

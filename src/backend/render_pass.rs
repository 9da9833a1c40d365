// Render pass and framebuffers
//
// A single color attachment (the swapchain image): cleared on load, stored,
// and left ready for presentation. One framebuffer per swapchain image.

use super::{GraphicsDevice, PresentationSurface};
use crate::error::{EngineError, Result, VkResultExt};
use ash::vk;

pub struct RenderTargetPass {
    pub render_pass: vk::RenderPass,
    /// Indexed like the swapchain images
    pub framebuffers: Vec<vk::Framebuffer>,
    pub extent: vk::Extent2D,
}

impl RenderTargetPass {
    pub fn new(gpu: &GraphicsDevice, surface: &PresentationSurface) -> Result<Self> {
        let device = &gpu.device;
        let render_pass = create_render_pass(device, surface.format.format)?;

        match create_framebuffers(device, &surface.image_views, render_pass, surface.extent) {
            Ok(framebuffers) => {
                log::info!("Created render pass with {} framebuffers", framebuffers.len());
                Ok(Self {
                    render_pass,
                    framebuffers,
                    extent: surface.extent,
                })
            }
            Err(e) => {
                unsafe { device.destroy_render_pass(render_pass, None) };
                Err(e)
            }
        }
    }

    /// Framebuffer wrapping the swapchain image at `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Result<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or(EngineError::ImageIndexOutOfRange {
                index: image_index,
                count: self.framebuffers.len(),
            })
    }

    /// Destroys the framebuffers, newest first, then the render pass.
    pub fn releaser(&self) -> impl FnOnce(&ash::Device) + 'static {
        let render_pass = self.render_pass;
        let framebuffers = self.framebuffers.clone();

        move |device| unsafe {
            for &framebuffer in framebuffers.iter().rev() {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_render_pass(render_pass, None);
        }
    }
}

/// Attachment, subpass and dependency descriptions for the color-only pass.
pub fn render_pass_layout(
    format: vk::Format,
) -> (vk::AttachmentDescription, vk::AttachmentReference, vk::SubpassDependency) {
    // Color attachment (the swapchain image)
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    // The layout transition at the start of the pass must wait until the
    // acquire semaphore has been waited on at this same stage
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    (color_attachment, color_attachment_ref, dependency)
}

fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let (color_attachment, color_attachment_ref, dependency) = render_pass_layout(format);

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }.during("vkCreateRenderPass")
}

fn create_framebuffers(
    device: &ash::Device,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for &image_view in image_views {
        let attachments = &[image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.create_framebuffer(&framebuffer_info, None) }
            .during("vkCreateFramebuffer")
        {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                unsafe {
                    for &framebuffer in framebuffers.iter().rev() {
                        device.destroy_framebuffer(framebuffer, None);
                    }
                }
                return Err(e);
            }
        }
    }

    Ok(framebuffers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn attachment_clears_and_ends_presentable() {
        let (attachment, reference, _) = render_pass_layout(vk::Format::B8G8R8A8_UNORM);

        assert_eq!(attachment.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(attachment.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        assert_eq!(reference.attachment, 0);
        assert_eq!(reference.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn external_dependency_guards_color_output() {
        let (_, _, dependency) = render_pass_layout(vk::Format::B8G8R8A8_UNORM);

        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        assert_eq!(
            dependency.src_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(dependency.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(
            dependency.dst_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            dependency.dst_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
    }

    #[test]
    fn framebuffer_lookup_follows_image_index() {
        let targets = RenderTargetPass {
            render_pass: vk::RenderPass::null(),
            framebuffers: vec![vk::Framebuffer::from_raw(10), vk::Framebuffer::from_raw(11)],
            extent: vk::Extent2D {
                width: 600,
                height: 600,
            },
        };

        assert_eq!(targets.framebuffer(1).unwrap(), vk::Framebuffer::from_raw(11));
        assert_eq!(targets.framebuffer(0).unwrap(), vk::Framebuffer::from_raw(10));
        assert!(matches!(
            targets.framebuffer(2),
            Err(EngineError::ImageIndexOutOfRange { index: 2, count: 2 })
        ));
    }
}

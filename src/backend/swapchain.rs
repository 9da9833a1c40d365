// Swapchain - Window presentation
//
// Manages the two images we render to and present to the screen.
// Fixed format, vsync present mode, no recreation.

use super::GraphicsDevice;
use crate::config::{
    DEFAULT_EXTENT, PREFERRED_PRESENT_MODE, PREFERRED_SURFACE_FORMAT, SWAPCHAIN_IMAGE_COUNT,
};
use crate::error::{EngineError, Result, VkResultExt};
use ash::extensions::khr;
use ash::vk;

pub struct PresentationSurface {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
}

impl PresentationSurface {
    pub fn new(gpu: &GraphicsDevice) -> Result<Self> {
        let physical_device = gpu.physical_device;
        let surface = gpu.surface;
        let surface_loader = &gpu.surface_loader;

        // Query surface capabilities
        let surface_caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
        }
        .during("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;

        // Query supported formats
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)
        }
        .during("vkGetPhysicalDeviceSurfaceFormatsKHR")?;

        // Query supported present modes
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)
        }
        .during("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let surface_format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&surface_caps);
        let image_count = choose_image_count(&surface_caps)?;

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        let swapchain_loader = khr::Swapchain::new(&gpu.instance, &gpu.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .during("vkCreateSwapchainKHR")?;

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .during("vkGetSwapchainImagesKHR")
        {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        log::info!("Created swapchain with {} images", images.len());

        // One view per image; on failure release the views made so far
        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            match create_image_view(&gpu.device, image, surface_format.format) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    unsafe {
                        for &view in image_views.iter().rev() {
                            gpu.device.destroy_image_view(view, None);
                        }
                        swapchain_loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views,
            format: surface_format,
            extent,
        })
    }

    /// Acquire next image for rendering, waiting as long as it takes
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
        .during("vkAcquireNextImageKHR")?;

        require_optimal("vkAcquireNextImageKHR", suboptimal)?;
        Ok(index)
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<()> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .during("vkQueuePresentKHR")?;

        require_optimal("vkQueuePresentKHR", suboptimal)
    }

    /// Destroys the image views, newest first, then the swapchain.
    pub fn releaser(&self) -> impl FnOnce(&ash::Device) + 'static {
        let loader = self.swapchain_loader.clone();
        let swapchain = self.swapchain;
        let image_views = self.image_views.clone();

        move |device| unsafe {
            for &view in image_views.iter().rev() {
                device.destroy_image_view(view, None);
            }
            loader.destroy_swapchain(swapchain, None);
        }
    }
}

fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.during("vkCreateImageView")
}

/// Treat a suboptimal swapchain like any other non-success status.
///
/// The swapchain is never recreated, so there is nothing to recover with.
pub fn require_optimal(op: &'static str, suboptimal: bool) -> Result<()> {
    if suboptimal {
        return Err(EngineError::Vulkan {
            op,
            result: vk::Result::SUBOPTIMAL_KHR,
        });
    }
    Ok(())
}

/// The preferred format/color space pair, or an error; there is no fallback.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .ok_or(EngineError::SurfaceFormatUnavailable {
            format: PREFERRED_SURFACE_FORMAT.format,
            color_space: PREFERRED_SURFACE_FORMAT.color_space,
        })
}

/// The preferred present mode if offered, otherwise FIFO (always supported).
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == PREFERRED_PRESENT_MODE)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's current extent, or the default window size when the surface
/// reports the `u32::MAX` "defined by the swapchain" sentinel.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    if caps.current_extent.width == u32::MAX && caps.current_extent.height == u32::MAX {
        DEFAULT_EXTENT
    } else {
        caps.current_extent
    }
}

/// Always two images; fails when the surface caps the count below that.
/// A maximum of 0 means unlimited.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> Result<u32> {
    if caps.max_image_count != 0 && caps.max_image_count < SWAPCHAIN_IMAGE_COUNT {
        return Err(EngineError::ImageCountUnsupported {
            requested: SWAPCHAIN_IMAGE_COUNT,
            max: caps.max_image_count,
        });
    }
    Ok(SWAPCHAIN_IMAGE_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps_with_max(max_image_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 1,
            max_image_count,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        }
    }

    #[test]
    fn suboptimal_status_is_an_error() {
        let err = require_optimal("vkQueuePresentKHR", true).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Vulkan {
                op: "vkQueuePresentKHR",
                result: vk::Result::SUBOPTIMAL_KHR
            }
        ));
        assert!(err.to_string().contains("SUBOPTIMAL_KHR"));
    }

    #[test]
    fn optimal_status_passes() {
        assert!(require_optimal("vkAcquireNextImageKHR", false).is_ok());
    }

    #[test]
    fn single_image_surface_is_rejected() {
        let err = choose_image_count(&caps_with_max(1)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ImageCountUnsupported { requested: 2, max: 1 }
        ));
    }

    #[test]
    fn unlimited_or_roomy_surfaces_get_two_images() {
        for max in [0, 2, 3, 8] {
            assert_eq!(choose_image_count(&caps_with_max(max)).unwrap(), 2, "max = {max}");
        }
    }

    #[test]
    fn format_must_match_exactly() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];
        assert!(matches!(
            choose_surface_format(&formats),
            Err(EngineError::SurfaceFormatUnavailable { .. })
        ));

        let mut with_preferred = formats.to_vec();
        with_preferred.push(PREFERRED_SURFACE_FORMAT);
        let chosen = choose_surface_format(&with_preferred).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn present_mode_prefers_fifo_and_falls_back_to_it() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);

        // Drivers must support FIFO even if they forget to list it
        let modes = [vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn undefined_extent_uses_default_window_size() {
        let mut caps = caps_with_max(0);
        caps.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        assert_eq!(choose_extent(&caps), DEFAULT_EXTENT);
    }

    #[test]
    fn defined_extent_is_used_as_is() {
        let caps = caps_with_max(0);
        assert_eq!(
            choose_extent(&caps),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }
}

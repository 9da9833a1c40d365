// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation (optionally with validation layers)
// - Window surface creation from raw display/window handles
// - Physical device + queue family selection (graphics and present)
// - Logical device + queue creation

use super::select::select_first;
use crate::error::{EngineError, Result, VkResultExt};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, c_void, CStr, CString};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device, queue and surface used by every other component.
///
/// Selected once; never changes afterwards.
pub struct GraphicsDevice {
    entry: Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    pub surface_loader: khr::Surface,
    pub surface: vk::SurfaceKHR,

    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,

    /// Supports both graphics and presentation to `surface`
    pub queue_family: u32,
    pub queue: vk::Queue,

    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl GraphicsDevice {
    /// Create the Vulkan device for a window.
    ///
    /// # Arguments
    /// * `display` / `window` - raw handles owned by the windowing layer; the
    ///   window must outlive the returned device
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable Vulkan validation layers if installed
    pub fn new(
        display: RawDisplayHandle,
        window: RawWindowHandle,
        app_name: &str,
        enable_validation: bool,
    ) -> Result<Self> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }?;

        // Step 2: Create instance (+ debug messenger)
        let enable_validation = enable_validation && Self::validation_available(&entry)?;
        let instance = Self::create_instance(&entry, display, app_name, enable_validation)?;
        let debug_utils = if enable_validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        // Step 3: Surface for the window
        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = match unsafe {
            ash_window::create_surface(&entry, &instance, display, window, None)
        }
        .during("vkCreateSurfaceKHR")
        {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { destroy_instance(&instance, debug_utils.as_ref()) };
                return Err(e);
            }
        };

        // Step 4: Pick physical device and queue family, open logical device
        let opened = Self::pick_physical_device(&instance, &surface_loader, surface).and_then(
            |(physical_device, queue_family)| {
                Self::create_logical_device(&instance, physical_device, queue_family)
                    .map(|device| (physical_device, queue_family, device))
            },
        );
        let (physical_device, queue_family, device) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    destroy_instance(&instance, debug_utils.as_ref());
                }
                return Err(e);
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        // Step 5: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}, queue family {}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version),
            queue_family
        );

        Ok(Self {
            entry,
            instance,
            debug_utils,
            surface_loader,
            surface,
            physical_device,
            device,
            queue_family,
            queue,
            memory_properties,
        })
    }

    fn validation_available(entry: &Entry) -> Result<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .during("vkEnumerateInstanceLayerProperties")?;
        let available = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
        if !available {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        Ok(available)
    }

    fn create_instance(
        entry: &Entry,
        display: RawDisplayHandle,
        app_name: &str,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        // Interior NULs cannot reach the driver; drop them
        let app_name_cstr = CString::new(app_name.replace('\0', "")).unwrap_or_default();
        let engine_name = c"spinning-triangle";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions = surface_extensions(display)?;

        let layer_names = if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        unsafe { entry.create_instance(&create_info, None) }.during("vkCreateInstance")
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .during("vkCreateDebugUtilsMessengerEXT")?;

        Ok((debug_utils, messenger))
    }

    /// First device with a queue family that can both draw and present.
    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices =
            unsafe { instance.enumerate_physical_devices() }.during("vkEnumeratePhysicalDevices")?;

        if devices.is_empty() {
            return Err(EngineError::NoPhysicalDevice);
        }

        let device_count = devices.len();
        select_first(devices, |device| {
            let families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };
            let family = find_queue_family(&families, |index| {
                unsafe {
                    surface_loader.get_physical_device_surface_support(device, index, surface)
                }
                .during("vkGetPhysicalDeviceSurfaceSupportKHR")
            })?;
            Ok::<_, EngineError>(family.map(|family| (device, family)))
        })?
        .ok_or(EngineError::NoQueueFamily {
            devices: device_count,
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions = [khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .during("vkCreateDevice")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.during("vkDeviceWaitIdle")
    }

    /// Destroys the logical device, the surface and the instance.
    ///
    /// The device passed in at teardown is this device's `ash::Device`.
    pub fn releaser(&self) -> impl FnOnce(&ash::Device) + 'static {
        let entry = self.entry.clone();
        let instance = self.instance.clone();
        let debug_utils = self.debug_utils.clone();
        let surface_loader = self.surface_loader.clone();
        let surface = self.surface;

        move |device| unsafe {
            device.destroy_device(None);
            surface_loader.destroy_surface(surface, None);
            destroy_instance(&instance, debug_utils.as_ref());
            // The loader library must stay open until the instance is gone
            drop(entry);
        }
    }
}

unsafe fn destroy_instance(
    instance: &ash::Instance,
    debug_utils: Option<&(DebugUtils, vk::DebugUtilsMessengerEXT)>,
) {
    if let Some((debug_utils, messenger)) = debug_utils {
        debug_utils.destroy_debug_utils_messenger(*messenger, None);
    }
    instance.destroy_instance(None);
}

/// First queue family with graphics support that can present to the surface.
pub fn find_queue_family<E>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> std::result::Result<bool, E>,
) -> std::result::Result<Option<u32>, E> {
    select_first(families.iter().zip(0u32..), |(family, index)| {
        if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            return Ok(None);
        }
        Ok(supports_present(index)?.then_some(index))
    })
}

/// Instance extensions needed to present to windows of this display server.
pub fn surface_extensions(display: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    match ash_window::enumerate_required_extensions(display) {
        Ok(extensions) => Ok(extensions.to_vec()),
        Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT) => Err(EngineError::UnsupportedWindowSystem),
        Err(result) => Err(EngineError::Vulkan {
            op: "enumerate_required_extensions",
            result,
        }),
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

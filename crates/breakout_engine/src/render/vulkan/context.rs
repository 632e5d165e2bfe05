//! Vulkan context bootstrap
//!
//! Brings up instance, debug messenger, surface, physical device, logical
//! device and allocator, in that order. Nothing here owns what it creates:
//! every object is pushed into the caller's destruction queue the moment it
//! exists, so teardown (and cleanup after a failed bootstrap) is a single
//! flush.

use std::ffi::{CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Entry};
use thiserror::Error;

use crate::core::config::RendererConfig;
use crate::render::vulkan::destroyer::{DeviceAnchor, InstanceAnchor, VulkanDestructionQueue};
use crate::render::vulkan::registry::Destroyable;
use crate::render::vulkan::window::Window;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A named native call returned a non-success status
    #[error("{operation} failed: {result:?}")]
    Call {
        /// The call that failed
        operation: &'static str,
        /// Status it returned
        result: vk::Result,
    },

    /// A wait did not complete within the configured timeout
    #[error("{operation} timed out on frame slot {slot}")]
    Timeout {
        /// The wait that timed out
        operation: &'static str,
        /// Frame slot being waited on
        slot: usize,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}

impl VulkanError {
    /// `map_err` adapter tagging a raw status with the call that produced it
    pub fn call(operation: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Call { operation, result }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Index of the graphics + present queue family
    pub graphics_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first device that supports Vulkan 1.3 rendering to `surface`
    pub fn select_suitable_device(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance.enumerate_physical_devices()
                .map_err(VulkanError::call("vkEnumeratePhysicalDevices"))?
        };

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader) {
                Ok(info) => {
                    log::info!("Device successfully chosen: {}", info.name());
                    return Ok(info);
                }
                Err(reason) => log::debug!("Skipping physical device: {reason}"),
            }
        }

        Err(VulkanError::InitializationFailed(
            "No GPU supports Vulkan 1.3 with synchronization2 and dynamic rendering".to_string(),
        ))
    }

    /// Reported device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn evaluate_device(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.api_version < vk::API_VERSION_1_3 {
            return Err(VulkanError::InitializationFailed("API version below 1.3".to_string()));
        }

        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut features13);
            unsafe { instance.get_physical_device_features2(device, &mut features2) };
        }
        if features13.synchronization2 == vk::FALSE || features13.dynamic_rendering == vk::FALSE {
            return Err(VulkanError::InitializationFailed(
                "synchronization2 or dynamic rendering unsupported".to_string(),
            ));
        }

        // One family must do both: the frame loop submits and presents on the same queue.
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let mut graphics_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            let present_support = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::call("vkGetPhysicalDeviceSurfaceSupportKHR"))?
            };
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present_support {
                graphics_family = Some(index);
                break;
            }
        }
        let graphics_family = graphics_family.ok_or_else(|| {
            VulkanError::InitializationFailed("No graphics queue family with present support".to_string())
        })?;

        let extensions = unsafe {
            instance.enumerate_device_extension_properties(device)
                .map_err(VulkanError::call("vkEnumerateDeviceExtensionProperties"))?
        };
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "VK_KHR_swapchain not supported".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            graphics_family,
        })
    }
}

/// Everything the rest of the renderer needs from bootstrap
///
/// Anchors are clones of what the destruction queue holds; they stay valid
/// until that queue is flushed.
pub struct VulkanContext {
    /// Instance with its extension loaders
    pub instance: InstanceAnchor,
    /// Presentation surface of the window
    pub surface: vk::SurfaceKHR,
    /// Selected physical device
    pub physical_device: PhysicalDeviceInfo,
    /// Logical device with its swapchain loader
    pub device: DeviceAnchor,
    /// Queue used for both rendering and presentation
    pub graphics_queue: vk::Queue,
    /// Family of `graphics_queue`
    pub graphics_family: u32,
}

impl VulkanContext {
    /// Bootstrap against `window`, registering each created object in `queue`
    ///
    /// On error the objects created so far are already in `queue`; flushing
    /// it releases them.
    pub fn new(
        entry: &Entry,
        window: &mut Window,
        config: &RendererConfig,
        queue: &mut VulkanDestructionQueue,
    ) -> VulkanResult<Self> {
        let enable_validation = config.validation_enabled() && validation_layer_available(entry);
        let instance = create_instance(entry, window, &config.application_name, enable_validation)?;
        let instance = InstanceAnchor {
            surface_loader: Surface::new(entry, &instance),
            debug_utils: DebugUtils::new(entry, &instance),
            instance,
        };
        queue.push(Destroyable::Instance(instance.clone()));
        log::info!("VkInstance created (validation {})", if enable_validation { "on" } else { "off" });

        if enable_validation {
            let messenger = create_debug_messenger(&instance.debug_utils)?;
            queue.push(Destroyable::DebugMessenger(messenger));
        }

        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {e}")))?;
        queue.push(Destroyable::Surface(surface));

        let physical_device =
            PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &instance.surface_loader)?;

        let device = create_device(&instance.instance, &physical_device)?;
        let device = DeviceAnchor {
            swapchain_loader: SwapchainLoader::new(&instance.instance, &device),
            device,
        };
        queue.push(Destroyable::LogicalDevice(device.clone()));
        let graphics_queue = unsafe { device.device.get_device_queue(physical_device.graphics_family, 0) };

        let allocator_info =
            vk_mem::AllocatorCreateInfo::new(&instance.instance, &device.device, physical_device.device);
        let allocator = vk_mem::Allocator::new(allocator_info)
            .map_err(VulkanError::call("vmaCreateAllocator"))?;
        queue.push(Destroyable::Allocator(allocator));
        log::info!("Logical device and allocator ready");

        Ok(Self {
            graphics_family: physical_device.graphics_family,
            instance,
            surface,
            physical_device,
            device,
            graphics_queue,
        })
    }
}

fn validation_layer_available(entry: &Entry) -> bool {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    let available = layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
    if !available {
        log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
    }
    available
}

fn create_instance(
    entry: &Entry,
    window: &Window,
    app_name: &str,
    enable_validation: bool,
) -> VulkanResult<ash::Instance> {
    let app_name_cstr = CString::new(app_name)
        .map_err(|_| VulkanError::InitializationFailed("application name contains a NUL byte".to_string()))?;
    let engine_name_cstr = CString::new(env!("CARGO_PKG_NAME"))
        .map_err(|_| VulkanError::InitializationFailed("engine name contains a NUL byte".to_string()))?;
    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name_cstr)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(&engine_name_cstr)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_3);

    let required_extensions = window
        .get_required_instance_extensions()
        .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {e}")))?;
    let cstr_extensions = required_extensions
        .into_iter()
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| VulkanError::InitializationFailed("malformed instance extension name".to_string()))?;
    let mut extensions: Vec<*const std::os::raw::c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut layers = Vec::new();
    if enable_validation {
        extensions.push(DebugUtils::name().as_ptr());
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    unsafe {
        entry.create_instance(&create_info, None)
            .map_err(VulkanError::call("vkCreateInstance"))
    }
}

fn create_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
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

    unsafe {
        debug_utils.create_debug_utils_messenger(&create_info, None)
            .map_err(VulkanError::call("vkCreateDebugUtilsMessengerEXT"))
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {message_type:?} - {message}");
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {message_type:?} - {message}");
    } else {
        log::debug!("[Vulkan] {message_type:?} - {message}");
    }

    vk::FALSE
}

fn create_device(instance: &ash::Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<ash::Device> {
    let priorities = [1.0];
    let queue_info = vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(physical_device.graphics_family)
        .queue_priorities(&priorities)
        .build();

    let extensions = [SwapchainLoader::name().as_ptr()];
    let mut features13 = vk::PhysicalDeviceVulkan13Features::builder()
        .synchronization2(true)
        .dynamic_rendering(true);

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .enabled_extension_names(&extensions)
        .push_next(&mut features13);

    unsafe {
        instance.create_device(physical_device.device, &create_info, None)
            .map_err(VulkanError::call("vkCreateDevice"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_adapter_names_the_operation() {
        let err = Err::<(), _>(vk::Result::ERROR_DEVICE_LOST)
            .map_err(VulkanError::call("vkQueueSubmit2"))
            .unwrap_err();
        assert!(matches!(
            err,
            VulkanError::Call { operation: "vkQueueSubmit2", result: vk::Result::ERROR_DEVICE_LOST }
        ));
        assert_eq!(err.to_string(), "vkQueueSubmit2 failed: ERROR_DEVICE_LOST");
    }

    #[test]
    fn test_timeout_message_names_the_slot() {
        let err = VulkanError::Timeout { operation: "vkWaitForFences", slot: 1 };
        assert_eq!(err.to_string(), "vkWaitForFences timed out on frame slot 1");
    }
}

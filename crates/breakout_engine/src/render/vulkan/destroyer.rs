//! Native destroy backend
//!
//! Routes each registry entry to the matching ash / vk-mem call. Anchor
//! payloads carry the loaders the calls go through.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Entry};

use crate::render::vulkan::destruction_queue::DestructionQueue;
use crate::render::vulkan::registry::{DestroyBackend, Destroyable};

/// Instance handle plus the instance-level loaders
#[derive(Clone)]
pub struct InstanceAnchor {
    /// Vulkan instance
    pub instance: ash::Instance,
    /// `VK_KHR_surface` functions
    pub surface_loader: Surface,
    /// `VK_EXT_debug_utils` functions
    pub debug_utils: DebugUtils,
}

/// Logical device plus the device-level loaders
#[derive(Clone)]
pub struct DeviceAnchor {
    /// Vulkan logical device
    pub device: ash::Device,
    /// `VK_KHR_swapchain` functions
    pub swapchain_loader: SwapchainLoader,
}

/// Destruction queue over real Vulkan objects
pub type VulkanDestructionQueue = DestructionQueue<VulkanDestroyer>;

/// Registry entry over real Vulkan objects
pub type VulkanDestroyable = Destroyable<VulkanDestroyer>;

/// Issues the native destroy calls
pub struct VulkanDestroyer {
    // The loader library must outlive the instance.
    _entry: Entry,
}

impl VulkanDestroyer {
    /// Backend keeping `entry` loaded until it is dropped
    pub fn new(entry: Entry) -> Self {
        Self { _entry: entry }
    }
}

impl DestroyBackend for VulkanDestroyer {
    type Instance = InstanceAnchor;
    type Device = DeviceAnchor;
    type Allocator = vk_mem::Allocator;
    type Allocation = vk_mem::Allocation;

    fn destroy_instance(&mut self, instance: InstanceAnchor) {
        unsafe { instance.instance.destroy_instance(None) };
    }

    fn destroy_device(&mut self, device: DeviceAnchor) {
        unsafe { device.device.destroy_device(None) };
    }

    fn destroy_allocator(&mut self, allocator: vk_mem::Allocator) {
        drop(allocator);
    }

    fn destroy_surface(&mut self, instance: &InstanceAnchor, surface: vk::SurfaceKHR) {
        unsafe { instance.surface_loader.destroy_surface(surface, None) };
    }

    fn destroy_debug_messenger(&mut self, instance: &InstanceAnchor, messenger: vk::DebugUtilsMessengerEXT) {
        unsafe { instance.debug_utils.destroy_debug_utils_messenger(messenger, None) };
    }

    fn destroy_image_view(&mut self, device: &DeviceAnchor, view: vk::ImageView) {
        unsafe { device.device.destroy_image_view(view, None) };
    }

    fn destroy_image(&mut self, allocator: &vk_mem::Allocator, image: vk::Image, mut allocation: vk_mem::Allocation) {
        unsafe { allocator.destroy_image(image, &mut allocation) };
    }

    fn destroy_swapchain(&mut self, device: &DeviceAnchor, swapchain: vk::SwapchainKHR) {
        unsafe { device.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn destroy_semaphore(&mut self, device: &DeviceAnchor, semaphore: vk::Semaphore) {
        unsafe { device.device.destroy_semaphore(semaphore, None) };
    }

    fn destroy_fence(&mut self, device: &DeviceAnchor, fence: vk::Fence) {
        unsafe { device.device.destroy_fence(fence, None) };
    }

    fn destroy_command_pool(&mut self, device: &DeviceAnchor, pool: vk::CommandPool) {
        unsafe { device.device.destroy_command_pool(pool, None) };
    }

    fn destroy_descriptor_set_layout(&mut self, device: &DeviceAnchor, layout: vk::DescriptorSetLayout) {
        unsafe { device.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn destroy_descriptor_pool(&mut self, device: &DeviceAnchor, pool: vk::DescriptorPool) {
        unsafe { device.device.destroy_descriptor_pool(pool, None) };
    }
}

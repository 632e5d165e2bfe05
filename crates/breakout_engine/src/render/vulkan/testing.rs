//! Recording backends for exercising the render core without a GPU

use ash::vk;

use crate::render::vulkan::registry::{DestroyBackend, HandleKind};

/// One destroy call observed by [`MockDestroyer`], with the anchor it got
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destroyed {
    Instance(u64),
    Device(u64),
    Allocator(u64),
    Surface { instance: u64, surface: vk::SurfaceKHR },
    DebugMessenger { instance: u64, messenger: vk::DebugUtilsMessengerEXT },
    ImageView { device: u64, view: vk::ImageView },
    Image { allocator: u64, image: vk::Image, allocation: u64 },
    Swapchain { device: u64, swapchain: vk::SwapchainKHR },
    Semaphore { device: u64, semaphore: vk::Semaphore },
    Fence { device: u64, fence: vk::Fence },
    CommandPool { device: u64, pool: vk::CommandPool },
    DescriptorSetLayout { device: u64, layout: vk::DescriptorSetLayout },
    DescriptorPool { device: u64, pool: vk::DescriptorPool },
}

impl Destroyed {
    pub fn kind(&self) -> HandleKind {
        match self {
            Self::Instance(_) => HandleKind::Instance,
            Self::Device(_) => HandleKind::LogicalDevice,
            Self::Allocator(_) => HandleKind::Allocator,
            Self::Surface { .. } => HandleKind::Surface,
            Self::DebugMessenger { .. } => HandleKind::DebugMessenger,
            Self::ImageView { .. } => HandleKind::ImageView,
            Self::Image { .. } => HandleKind::Image,
            Self::Swapchain { .. } => HandleKind::Swapchain,
            Self::Semaphore { .. } => HandleKind::Semaphore,
            Self::Fence { .. } => HandleKind::Fence,
            Self::CommandPool { .. } => HandleKind::CommandPool,
            Self::DescriptorSetLayout { .. } => HandleKind::DescriptorSetLayout,
            Self::DescriptorPool { .. } => HandleKind::DescriptorPool,
        }
    }
}

/// Destroy backend whose anchors are plain ids and which logs every call
#[derive(Debug, Default)]
pub struct MockDestroyer {
    pub destroyed: Vec<Destroyed>,
}

impl MockDestroyer {
    pub fn kinds(&self) -> Vec<HandleKind> {
        self.destroyed.iter().map(Destroyed::kind).collect()
    }
}

impl DestroyBackend for MockDestroyer {
    type Instance = u64;
    type Device = u64;
    type Allocator = u64;
    type Allocation = u64;

    fn destroy_instance(&mut self, instance: u64) {
        self.destroyed.push(Destroyed::Instance(instance));
    }

    fn destroy_device(&mut self, device: u64) {
        self.destroyed.push(Destroyed::Device(device));
    }

    fn destroy_allocator(&mut self, allocator: u64) {
        self.destroyed.push(Destroyed::Allocator(allocator));
    }

    fn destroy_surface(&mut self, instance: &u64, surface: vk::SurfaceKHR) {
        self.destroyed.push(Destroyed::Surface { instance: *instance, surface });
    }

    fn destroy_debug_messenger(&mut self, instance: &u64, messenger: vk::DebugUtilsMessengerEXT) {
        self.destroyed.push(Destroyed::DebugMessenger { instance: *instance, messenger });
    }

    fn destroy_image_view(&mut self, device: &u64, view: vk::ImageView) {
        self.destroyed.push(Destroyed::ImageView { device: *device, view });
    }

    fn destroy_image(&mut self, allocator: &u64, image: vk::Image, allocation: u64) {
        self.destroyed.push(Destroyed::Image { allocator: *allocator, image, allocation });
    }

    fn destroy_swapchain(&mut self, device: &u64, swapchain: vk::SwapchainKHR) {
        self.destroyed.push(Destroyed::Swapchain { device: *device, swapchain });
    }

    fn destroy_semaphore(&mut self, device: &u64, semaphore: vk::Semaphore) {
        self.destroyed.push(Destroyed::Semaphore { device: *device, semaphore });
    }

    fn destroy_fence(&mut self, device: &u64, fence: vk::Fence) {
        self.destroyed.push(Destroyed::Fence { device: *device, fence });
    }

    fn destroy_command_pool(&mut self, device: &u64, pool: vk::CommandPool) {
        self.destroyed.push(Destroyed::CommandPool { device: *device, pool });
    }

    fn destroy_descriptor_set_layout(&mut self, device: &u64, layout: vk::DescriptorSetLayout) {
        self.destroyed.push(Destroyed::DescriptorSetLayout { device: *device, layout });
    }

    fn destroy_descriptor_pool(&mut self, device: &u64, pool: vk::DescriptorPool) {
        self.destroyed.push(Destroyed::DescriptorPool { device: *device, pool });
    }
}

//! Resource handle registry
//!
//! Every native object the render core creates is described by one
//! [`Destroyable`] entry: a kind tag plus exactly the payload that kind needs
//! to be torn down again. The native destroy calls themselves live behind
//! [`DestroyBackend`], so the queue that orders them never touches the driver.
//!
//! Three kinds are *anchors*: destroying other kinds takes them as a
//! parameter (a surface needs its instance, an image view its device, an
//! allocated image its allocator). Their payload types are chosen by the
//! backend because in Vulkan they carry function tables, not just handles.

use std::fmt;

use ash::vk;

/// Kind tag of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// `VkInstance`
    Instance,
    /// `VkDevice`
    LogicalDevice,
    /// `VkSurfaceKHR`
    Surface,
    /// `VkImageView`
    ImageView,
    /// `VkImage` with its memory allocation
    Image,
    /// `VkSwapchainKHR`
    Swapchain,
    /// `VkSemaphore`
    Semaphore,
    /// `VkFence`
    Fence,
    /// `VkCommandPool`
    CommandPool,
    /// `VkDebugUtilsMessengerEXT`
    DebugMessenger,
    /// Device memory allocator
    Allocator,
    /// `VkDescriptorSetLayout`
    DescriptorSetLayout,
    /// `VkDescriptorPool`
    DescriptorPool,
}

impl HandleKind {
    /// Anchor slot this kind populates when pushed, if any
    pub const fn anchor(self) -> Option<AnchorKind> {
        match self {
            Self::Instance => Some(AnchorKind::Instance),
            Self::LogicalDevice => Some(AnchorKind::LogicalDevice),
            Self::Allocator => Some(AnchorKind::Allocator),
            _ => None,
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instance => "Instance",
            Self::LogicalDevice => "Logical Device",
            Self::Surface => "SurfaceKHR",
            Self::ImageView => "Image View",
            Self::Image => "Image",
            Self::Swapchain => "SwapchainKHR",
            Self::Semaphore => "Semaphore",
            Self::Fence => "Fence",
            Self::CommandPool => "Command Pool",
            Self::DebugMessenger => "Debug Messenger",
            Self::Allocator => "Allocator",
            Self::DescriptorSetLayout => "Descriptor Set Layout",
            Self::DescriptorPool => "Descriptor Pool",
        };
        f.write_str(name)
    }
}

/// The three cached handle kinds other destroys depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorKind {
    /// Needed by surface and debug messenger destroys
    Instance,
    /// Needed by every device-owned object
    LogicalDevice,
    /// Needed by allocated images
    Allocator,
}

impl fmt::Display for AnchorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance => f.write_str("Instance"),
            Self::LogicalDevice => f.write_str("Logical Device"),
            Self::Allocator => f.write_str("Allocator"),
        }
    }
}

/// Native destroy routines the destruction queue dispatches to
///
/// The associated types are the payloads of the anchor kinds and of the
/// image allocation token. Each method consumes exactly one handle; the
/// queue guarantees each handle reaches exactly one call.
pub trait DestroyBackend {
    /// Instance payload (handle plus instance-level function tables)
    type Instance;
    /// Logical device payload (handle plus device-level function tables)
    type Device;
    /// Device memory allocator
    type Allocator;
    /// Allocation token paired with an image
    type Allocation;

    /// Destroy the instance
    fn destroy_instance(&mut self, instance: Self::Instance);
    /// Destroy the logical device
    fn destroy_device(&mut self, device: Self::Device);
    /// Destroy the allocator
    fn destroy_allocator(&mut self, allocator: Self::Allocator);
    /// Destroy a presentation surface
    fn destroy_surface(&mut self, instance: &Self::Instance, surface: vk::SurfaceKHR);
    /// Destroy a debug messenger
    fn destroy_debug_messenger(&mut self, instance: &Self::Instance, messenger: vk::DebugUtilsMessengerEXT);
    /// Destroy an image view
    fn destroy_image_view(&mut self, device: &Self::Device, view: vk::ImageView);
    /// Destroy an allocated image and free its memory
    fn destroy_image(&mut self, allocator: &Self::Allocator, image: vk::Image, allocation: Self::Allocation);
    /// Destroy a swapchain
    fn destroy_swapchain(&mut self, device: &Self::Device, swapchain: vk::SwapchainKHR);
    /// Destroy a semaphore
    fn destroy_semaphore(&mut self, device: &Self::Device, semaphore: vk::Semaphore);
    /// Destroy a fence
    fn destroy_fence(&mut self, device: &Self::Device, fence: vk::Fence);
    /// Destroy a command pool, freeing its command buffers
    fn destroy_command_pool(&mut self, device: &Self::Device, pool: vk::CommandPool);
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&mut self, device: &Self::Device, layout: vk::DescriptorSetLayout);
    /// Destroy a descriptor pool, freeing its sets
    fn destroy_descriptor_pool(&mut self, device: &Self::Device, pool: vk::DescriptorPool);
}

/// One native object awaiting destruction
pub enum Destroyable<B: DestroyBackend> {
    /// Instance (anchor)
    Instance(B::Instance),
    /// Logical device (anchor)
    LogicalDevice(B::Device),
    /// Presentation surface
    Surface(vk::SurfaceKHR),
    /// Image view
    ImageView(vk::ImageView),
    /// Allocated image
    Image {
        /// Image handle
        image: vk::Image,
        /// Memory backing the image
        allocation: B::Allocation,
    },
    /// Swapchain
    Swapchain(vk::SwapchainKHR),
    /// Semaphore
    Semaphore(vk::Semaphore),
    /// Fence
    Fence(vk::Fence),
    /// Command pool
    CommandPool(vk::CommandPool),
    /// Debug messenger
    DebugMessenger(vk::DebugUtilsMessengerEXT),
    /// Allocator (anchor)
    Allocator(B::Allocator),
    /// Descriptor set layout
    DescriptorSetLayout(vk::DescriptorSetLayout),
    /// Descriptor pool
    DescriptorPool(vk::DescriptorPool),
}

impl<B: DestroyBackend> Destroyable<B> {
    /// Kind tag of this entry
    pub fn kind(&self) -> HandleKind {
        match self {
            Self::Instance(_) => HandleKind::Instance,
            Self::LogicalDevice(_) => HandleKind::LogicalDevice,
            Self::Surface(_) => HandleKind::Surface,
            Self::ImageView(_) => HandleKind::ImageView,
            Self::Image { .. } => HandleKind::Image,
            Self::Swapchain(_) => HandleKind::Swapchain,
            Self::Semaphore(_) => HandleKind::Semaphore,
            Self::Fence(_) => HandleKind::Fence,
            Self::CommandPool(_) => HandleKind::CommandPool,
            Self::DebugMessenger(_) => HandleKind::DebugMessenger,
            Self::Allocator(_) => HandleKind::Allocator,
            Self::DescriptorSetLayout(_) => HandleKind::DescriptorSetLayout,
            Self::DescriptorPool(_) => HandleKind::DescriptorPool,
        }
    }
}

impl<B: DestroyBackend> fmt::Debug for Destroyable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surface(h) => write!(f, "Surface({h:?})"),
            Self::ImageView(h) => write!(f, "ImageView({h:?})"),
            Self::Image { image, .. } => write!(f, "Image({image:?})"),
            Self::Swapchain(h) => write!(f, "Swapchain({h:?})"),
            Self::Semaphore(h) => write!(f, "Semaphore({h:?})"),
            Self::Fence(h) => write!(f, "Fence({h:?})"),
            Self::CommandPool(h) => write!(f, "CommandPool({h:?})"),
            Self::DebugMessenger(h) => write!(f, "DebugMessenger({h:?})"),
            Self::DescriptorSetLayout(h) => write!(f, "DescriptorSetLayout({h:?})"),
            Self::DescriptorPool(h) => write!(f, "DescriptorPool({h:?})"),
            Self::Instance(_) | Self::LogicalDevice(_) | Self::Allocator(_) => {
                write!(f, "{:?}", self.kind())
            }
        }
    }
}

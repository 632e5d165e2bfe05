//! Vulkan backend
//!
//! Bootstrap, resource creation and the native side of the frame loop. Every
//! object created here is registered in a [`DestructionQueue`] instead of
//! owning a `Drop`; see [`destruction_queue`] for the ordering rules.

pub mod commands;
pub mod context;
pub mod descriptors;
pub mod destroyer;
pub mod destruction_queue;
pub mod draw_image;
pub mod frame_gpu;
pub mod registry;
pub mod swapchain;
pub mod sync;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanResult};
pub use destroyer::{DeviceAnchor, InstanceAnchor, VulkanDestroyable, VulkanDestroyer, VulkanDestructionQueue};
pub use destruction_queue::DestructionQueue;
pub use draw_image::DrawImage;
pub use frame_gpu::VulkanFrameGpu;
pub use registry::{AnchorKind, DestroyBackend, Destroyable, HandleKind};
pub use swapchain::Swapchain;
pub use window::{Window, WindowError, WindowResult};

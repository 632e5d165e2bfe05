//! Vulkan synchronization primitives and frame slot creation
//!
//! Semaphores order GPU work (acquire before render, render before present);
//! fences let the CPU observe a submission retiring. Both are plain handles
//! here; whoever creates them registers them for destruction.

use ash::vk;

use crate::render::frame::FrameSlot;
use crate::render::vulkan::commands;
use crate::render::vulkan::destroyer::{VulkanDestroyer, VulkanDestructionQueue};
use crate::render::vulkan::registry::Destroyable;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Create a binary semaphore
pub fn create_semaphore(device: &ash::Device) -> VulkanResult<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::builder();
    unsafe {
        device.create_semaphore(&create_info, None)
            .map_err(VulkanError::call("vkCreateSemaphore"))
    }
}

/// Create a fence, optionally already signaled
pub fn create_fence(device: &ash::Device, signaled: bool) -> VulkanResult<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let create_info = vk::FenceCreateInfo::builder().flags(flags);
    unsafe {
        device.create_fence(&create_info, None)
            .map_err(VulkanError::call("vkCreateFence"))
    }
}

/// Create `count` frame slots, registering every handle in `queue`
///
/// Fences start signaled so the first wait on each slot returns at once.
pub fn create_frame_slots(
    device: &ash::Device,
    queue_family_index: u32,
    count: usize,
    queue: &mut VulkanDestructionQueue,
) -> VulkanResult<Vec<FrameSlot<VulkanDestroyer>>> {
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        let command_pool = commands::create_command_pool(device, queue_family_index)?;
        queue.push(Destroyable::CommandPool(command_pool));
        let command_buffer = commands::allocate_command_buffers(device, command_pool, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "command pool returned no buffer".to_string(),
            })?;

        let render_fence = create_fence(device, true)?;
        queue.push(Destroyable::Fence(render_fence));
        let swapchain_semaphore = create_semaphore(device)?;
        queue.push(Destroyable::Semaphore(swapchain_semaphore));
        let render_semaphore = create_semaphore(device)?;
        queue.push(Destroyable::Semaphore(render_semaphore));

        slots.push(FrameSlot::new(
            command_pool,
            command_buffer,
            swapchain_semaphore,
            render_semaphore,
            render_fence,
        ));
    }
    log::debug!("Created {count} frame slots");
    Ok(slots)
}

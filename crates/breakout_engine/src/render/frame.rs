//! Frames-in-flight synchronization
//!
//! A fixed ring of N frame slots lets the CPU record frame `k` while the GPU
//! is still executing frames `k-1 .. k-N+1`. Each slot owns one command
//! buffer, an acquire semaphore, a render semaphore and a render fence. The
//! fence is the only CPU-visible signal: a slot is not touched again until
//! the fence from its previous submission has been observed signaled, which
//! bounds the CPU to N-1 frames ahead of the GPU.
//!
//! ```text
//! slot state:  Idle --record--> Recording --submit--> Submitted --fence--> Idle
//! ```
//!
//! The native calls are behind [`FrameGpu`] so the protocol can be driven by
//! a fake GPU in tests; `VulkanFrameGpu` is the real implementation.

use ash::prelude::VkResult;
use ash::vk;

use crate::render::vulkan::destruction_queue::DestructionQueue;
use crate::render::vulkan::registry::DestroyBackend;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One queue submission as the frame protocol issues it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSubmission {
    /// Command buffer recorded this tick
    pub command_buffer: vk::CommandBuffer,
    /// Semaphore signaled by image acquisition
    pub wait_semaphore: vk::Semaphore,
    /// Stage that must not start before `wait_semaphore`
    pub wait_stage: vk::PipelineStageFlags2,
    /// Semaphore signaled when rendering completes
    pub signal_semaphore: vk::Semaphore,
    /// Stage after which `signal_semaphore` is signaled
    pub signal_stage: vk::PipelineStageFlags2,
    /// Fence signaled when the submission retires
    pub fence: vk::Fence,
}

/// GPU operations one frame tick is made of
///
/// Results are raw Vulkan statuses; the synchronizer decides which of them
/// are fatal.
pub trait FrameGpu {
    /// Block until `fence` is signaled or `timeout_ns` elapses
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()>;

    /// Acquire the next presentable image, signaling `semaphore` when it is
    /// ready. Returns the image index and whether the swapchain is suboptimal.
    fn acquire_next_image(&mut self, semaphore: vk::Semaphore, timeout_ns: u64) -> VkResult<(u32, bool)>;

    /// Discard everything previously recorded into `command_buffer`
    fn reset_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    /// Record the frame's work for swapchain image `image_index`
    fn record_frame(&mut self, command_buffer: vk::CommandBuffer, image_index: u32, frame_number: u64) -> VulkanResult<()>;

    /// Submit recorded work to the graphics queue
    fn submit(&mut self, submission: &FrameSubmission) -> VkResult<()>;

    /// Present `image_index` once `wait_semaphore` is signaled.
    /// Returns whether the swapchain is suboptimal.
    fn present(&mut self, image_index: u32, wait_semaphore: vk::Semaphore) -> VkResult<bool>;
}

/// Where a frame slot is in its reuse cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence observed signaled, safe to reuse
    Idle,
    /// Command buffer being rebuilt
    Recording,
    /// Work handed to the GPU, fence unsignaled
    Submitted,
}

/// Per-frame resources, reused every N ticks
pub struct FrameSlot<B: DestroyBackend> {
    /// Pool the command buffer is allocated from
    pub command_pool: vk::CommandPool,
    /// The slot's primary command buffer
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when the acquired swapchain image is ready
    pub swapchain_semaphore: vk::Semaphore,
    /// Signaled when the slot's rendering completes
    pub render_semaphore: vk::Semaphore,
    /// Signaled when the slot's submission retires
    pub render_fence: vk::Fence,
    /// Handles to destroy once the slot's in-flight work has retired
    pub deletion_queue: DestructionQueue<B>,
    state: SlotState,
}

impl<B: DestroyBackend> FrameSlot<B> {
    /// Wrap already-created slot handles. The fence must start signaled.
    pub fn new(
        command_pool: vk::CommandPool,
        command_buffer: vk::CommandBuffer,
        swapchain_semaphore: vk::Semaphore,
        render_semaphore: vk::Semaphore,
        render_fence: vk::Fence,
    ) -> Self {
        Self {
            command_pool,
            command_buffer,
            swapchain_semaphore,
            render_semaphore,
            render_fence,
            deletion_queue: DestructionQueue::new(),
            state: SlotState::Idle,
        }
    }

    /// Current state of the slot
    pub fn state(&self) -> SlotState {
        self.state
    }
}

/// What one completed tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame counter value the tick ran with
    pub frame_number: u64,
    /// Slot that was used
    pub slot: usize,
    /// Swapchain image that was presented
    pub image_index: u32,
    /// Whether acquire or present reported a suboptimal swapchain
    pub suboptimal: bool,
}

/// Ring of frame slots plus the frame counter
pub struct FrameSynchronizer<B: DestroyBackend> {
    slots: Vec<FrameSlot<B>>,
    frame_number: u64,
    timeout_ns: u64,
}

impl<B: DestroyBackend> FrameSynchronizer<B> {
    /// Build the ring from pre-created slots
    ///
    /// # Panics
    ///
    /// Panics if `slots` is empty.
    pub fn new(slots: Vec<FrameSlot<B>>, timeout_ns: u64) -> Self {
        assert!(!slots.is_empty(), "frame synchronizer needs at least one slot");
        Self {
            slots,
            frame_number: 0,
            timeout_ns,
        }
    }

    /// Number of slots (frames in flight)
    pub fn frame_overlap(&self) -> usize {
        self.slots.len()
    }

    /// Number of completed ticks
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Slot the next tick will use
    pub fn current_slot_index(&self) -> usize {
        (self.frame_number % self.slots.len() as u64) as usize
    }

    /// Slot by index
    pub fn slot(&self, index: usize) -> &FrameSlot<B> {
        &self.slots[index]
    }

    /// Mutable slot by index, e.g. to defer a destroy to that slot
    pub fn slot_mut(&mut self, index: usize) -> &mut FrameSlot<B> {
        &mut self.slots[index]
    }

    /// Slot the next tick will use
    pub fn current_slot_mut(&mut self) -> &mut FrameSlot<B> {
        let index = self.current_slot_index();
        &mut self.slots[index]
    }

    /// Run one wait/reset/acquire/record/submit/present cycle
    ///
    /// Deferred destroys of the slot are flushed (against `globals`' anchors)
    /// as soon as its previous submission is known to have retired. The frame
    /// counter only advances when every step succeeded.
    ///
    /// # Errors
    ///
    /// Every failure is fatal to the render loop: a fence or acquire that
    /// does not complete within the timeout is a [`VulkanError::Timeout`],
    /// any other non-success status a [`VulkanError::Call`] naming the call.
    /// An out-of-date swapchain is reported, not recovered from.
    pub fn tick<G: FrameGpu>(
        &mut self,
        gpu: &mut G,
        globals: &DestructionQueue<B>,
        destroyer: &mut B,
    ) -> VulkanResult<FrameInfo> {
        let index = self.current_slot_index();
        let frame_number = self.frame_number;
        let timeout_ns = self.timeout_ns;
        let slot = &mut self.slots[index];

        gpu.wait_for_fence(slot.render_fence, timeout_ns)
            .map_err(|result| sync_error("vkWaitForFences", result, index))?;
        slot.state = SlotState::Idle;
        slot.deletion_queue.flush_scoped(globals, destroyer);

        gpu.reset_fence(slot.render_fence)
            .map_err(VulkanError::call("vkResetFences"))?;

        let (image_index, acquire_suboptimal) = gpu
            .acquire_next_image(slot.swapchain_semaphore, timeout_ns)
            .map_err(|result| sync_error("vkAcquireNextImageKHR", result, index))?;
        if acquire_suboptimal {
            log::warn!("Swapchain is suboptimal (frame {frame_number}); no recreation path, drawing anyway");
        }

        slot.state = SlotState::Recording;
        gpu.reset_command_buffer(slot.command_buffer)
            .map_err(VulkanError::call("vkResetCommandBuffer"))?;
        gpu.record_frame(slot.command_buffer, image_index, frame_number)?;

        let submission = FrameSubmission {
            command_buffer: slot.command_buffer,
            wait_semaphore: slot.swapchain_semaphore,
            wait_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: slot.render_semaphore,
            signal_stage: vk::PipelineStageFlags2::ALL_GRAPHICS,
            fence: slot.render_fence,
        };
        gpu.submit(&submission)
            .map_err(VulkanError::call("vkQueueSubmit2"))?;
        slot.state = SlotState::Submitted;

        let present_suboptimal = gpu
            .present(image_index, slot.render_semaphore)
            .map_err(VulkanError::call("vkQueuePresentKHR"))?;

        self.frame_number += 1;

        Ok(FrameInfo {
            frame_number,
            slot: index,
            image_index,
            suboptimal: acquire_suboptimal || present_suboptimal,
        })
    }

    /// Flush every slot's deferred destroys
    ///
    /// Only call once the device is idle; nothing checks the fences here.
    pub fn flush_slot_queues(&mut self, globals: &DestructionQueue<B>, destroyer: &mut B) {
        for slot in &mut self.slots {
            slot.deletion_queue.flush_scoped(globals, destroyer);
        }
    }
}

fn sync_error(operation: &'static str, result: vk::Result, slot: usize) -> VulkanError {
    match result {
        vk::Result::TIMEOUT | vk::Result::NOT_READY => {
            log::error!("{operation} timed out on frame slot {slot}; treating the GPU as hung");
            VulkanError::Timeout { operation, slot }
        }
        result => VulkanError::Call { operation, result },
    }
}

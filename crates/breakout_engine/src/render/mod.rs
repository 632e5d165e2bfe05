//! Rendering
//!
//! [`frame`] holds the backend-independent frames-in-flight protocol,
//! [`vulkan`] everything that talks to the driver.

pub mod frame;
pub mod vulkan;

pub use frame::{FrameGpu, FrameInfo, FrameSlot, FrameSubmission, FrameSynchronizer, SlotState};

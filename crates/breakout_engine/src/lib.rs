//! # Breakout Engine
//!
//! Vulkan render core for Open Breakout 3D.
//!
//! ## Features
//!
//! - **Ordered teardown**: every native object is registered in a LIFO
//!   destruction queue that caches the instance, device and allocator its
//!   other entries are destroyed through
//! - **Frames in flight**: a fixed ring of frame slots, each gated by its own
//!   fence, keeps the CPU at most N-1 frames ahead of the GPU
//! - **Config files**: engine settings load from TOML or RON
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use breakout_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let config = EngineConfig::default();
//!     let mut engine = Engine::init(&config)?;
//!     engine.run()?;
//!     engine.shutdown()
//! }
//! ```

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

mod engine;

pub use engine::{Engine, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        core::config::{EngineConfig, RendererConfig, WindowConfig},
        render::frame::{FrameInfo, FrameSynchronizer},
        render::vulkan::{DestructionQueue, Destroyable, VulkanError},
        Engine, EngineError,
    };
}

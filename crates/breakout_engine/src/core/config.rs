//! # Engine Configuration
//!
//! Configuration structures for the window, the Vulkan renderer and the
//! engine as a whole. All types are serializable so they can be loaded from
//! TOML or RON through the [`Config`] trait.

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// Frames-in-flight used when nothing else is configured
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound on frames-in-flight
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// One second, in the nanosecond units Vulkan wait calls take
pub const DEFAULT_SYNC_TIMEOUT_NS: u64 = 1_000_000_000;

/// # Window Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Window width in screen coordinates
    pub width: u32,
    /// Window height in screen coordinates
    pub height: u32,
}

impl WindowConfig {
    /// Create a new window configuration
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new("Open Breakout 3D", 800, 600)
    }
}

/// # Vulkan Renderer Configuration
///
/// Configuration specific to the Vulkan rendering backend, including
/// application metadata, frame pacing and debug features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Whether to enable Vulkan validation layers (`None` = debug builds only)
    pub enable_validation: Option<bool>,
    /// Number of frame slots the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Timeout for fence waits and image acquisition, in nanoseconds
    pub sync_timeout_ns: u64,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            enable_validation: None, // Auto-detect based on build type
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            sync_timeout_ns: DEFAULT_SYNC_TIMEOUT_NS,
        }
    }

    /// Set the number of frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the synchronization timeout
    pub fn with_sync_timeout_ns(mut self, timeout_ns: u64) -> Self {
        self.sync_timeout_ns = timeout_ns;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Whether validation should be requested for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid("Frames in flight must be at least 1".to_string()));
        }

        if self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::Invalid(format!(
                "Frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT}"
            )));
        }

        if self.sync_timeout_ns == 0 {
            return Err(ConfigError::Invalid("Sync timeout must be non-zero".to_string()));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("OpenBreakout3D")
    }
}

/// # Engine Configuration
///
/// Top-level configuration handed to [`crate::Engine::init`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
    /// Window configuration
    pub window: WindowConfig,
    /// Renderer configuration
    pub renderer: RendererConfig,
}

impl EngineConfig {
    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set window configuration
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Set renderer configuration
    pub fn with_renderer(mut self, renderer: RendererConfig) -> Self {
        self.renderer = renderer;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window extent {}x{} is empty",
                self.window.width, self.window.height
            )));
        }
        self.renderer.validate()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_double_buffered() {
        let config = EngineConfig::default();
        assert_eq!(config.renderer.frames_in_flight, 2);
        assert_eq!(config.renderer.sync_timeout_ns, 1_000_000_000);
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        let zero = RendererConfig::default().with_frames_in_flight(0);
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));

        let too_many = RendererConfig::default().with_frames_in_flight(MAX_FRAMES_IN_FLIGHT + 1);
        assert!(too_many.validate().is_err());

        let triple = RendererConfig::default().with_frames_in_flight(3);
        assert!(triple.validate().is_ok());
    }

    #[test]
    fn test_empty_window_rejected() {
        let config = EngineConfig::default().with_window(WindowConfig::new("x", 0, 600));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_file_uses_defaults() {
        let text = r#"
            log_level = "debug"

            [renderer]
            frames_in_flight = 3
        "#;

        let config = EngineConfig::from_str_with_format(text, "breakout.toml").unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.renderer.frames_in_flight, 3);
        assert_eq!(config.renderer.application_name, "OpenBreakout3D");
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_toml_and_ron_round_trip() {
        let config = EngineConfig::default()
            .with_log_level("trace")
            .with_renderer(RendererConfig::new("Breakout").with_validation(true));

        for path in ["engine.toml", "engine.ron"] {
            let text = config.to_string_with_format(path).unwrap();
            let parsed = EngineConfig::from_str_with_format(&text, path).unwrap();
            assert_eq!(parsed, config, "round trip through {path}");
        }
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = EngineConfig::from_str_with_format("{}", "engine.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}

//! Open Breakout 3D
//!
//! Opens the game window and runs the render loop until it is closed.
//! Settings are read from `breakout.toml` in the working directory when it
//! exists.

use std::path::Path;
use std::process;

use breakout_engine::foundation::logging;
use breakout_engine::prelude::*;

const CONFIG_PATH: &str = "breakout.toml";

fn load_config() -> Result<EngineConfig, ConfigError> {
    if Path::new(CONFIG_PATH).exists() {
        EngineConfig::load_from_file(CONFIG_PATH)
    } else {
        Ok(EngineConfig::default())
    }
}

fn run(config: &EngineConfig) -> Result<(), EngineError> {
    let mut engine = Engine::init(config)?;
    engine.run()?;
    engine.shutdown()
}

fn main() {
    let config = load_config();
    let default_level = config.as_ref().map_or("info", |c| c.log_level.as_str());
    logging::init_with_default(default_level);

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            log::error!("Failed to load {CONFIG_PATH}: {err}");
            process::exit(1);
        }
    };

    log::info!("Starting {}", config.window.title);
    if let Err(err) = run(&config) {
        log::error!("Fatal: {err}");
        process::exit(1);
    }
}

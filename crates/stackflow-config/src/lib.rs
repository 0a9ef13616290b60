pub mod error;
pub mod source;
pub mod stack;

pub use error::*;
pub use source::{
    ConfigSource, ENV_PREFIX, EnvSource, LayeredSource, SECRET_ENV_PREFIX, SecretSource,
    StackFile, StaticSource,
};
pub use stack::{Cidr, StackConfig};

use std::path::{Path, PathBuf};

const CANDIDATES: [&str; 4] = [
    "stack.local.yaml",
    ".stack.local.yaml",
    "stack.yaml",
    ".stack.yaml",
];

/// Stackflow's global config directory, created on demand.
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the project's stack file.
///
/// Search order:
/// 1. `STACKFLOW_CONFIG_PATH` (direct path)
/// 2. current directory: stack.local.yaml, .stack.local.yaml, stack.yaml, .stack.yaml
/// 3. the same names under ./.stackflow/
/// 4. ~/.config/stackflow/stack.yaml (global)
pub fn find_stack_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var("STACKFLOW_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let stack_dir = current_dir.join(".stackflow");
    if stack_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = stack_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackflow").join("stack.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

/// Build the layered source for a run.
///
/// An explicit `path` must exist. Without one the stack file is discovered;
/// when none is found only environment variables are used.
pub fn load(path: Option<&Path>) -> Result<LayeredSource> {
    let file = match path {
        Some(path) => Some(StackFile::load(path)?),
        None => match find_stack_file() {
            Ok(found) => Some(StackFile::load(&found)?),
            Err(ConfigError::StackFileNotFound) => {
                tracing::debug!("No stack file found, using environment only");
                None
            }
            Err(e) => return Err(e),
        },
    };
    Ok(LayeredSource::new(file))
}

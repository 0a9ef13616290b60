use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Stack file not found. Looked in:\n\
        - current directory: stack.local.yaml, .stack.local.yaml, stack.yaml, .stack.yaml\n\
        - ./.stackflow/ directory\n\
        - ~/.config/stackflow/stack.yaml\n\
        The path can also be given with the STACKFLOW_CONFIG_PATH environment variable"
    )]
    StackFileNotFound,

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(
        "Missing required setting '{key}' (set it under `config:` in the stack file or via STACKFLOW_{})",
        .key.to_uppercase()
    )]
    Missing { key: String },

    #[error("Invalid setting '{key}': {reason}")]
    Invalid { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

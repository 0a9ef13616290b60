pub mod plan;
pub mod preview;

use colored::Colorize;
use stackflow_config::StackConfig;
use stackflow_lago::LagoStack;
use std::path::Path;

/// Load settings and declare the stack.
pub fn load_stack(path: Option<&Path>) -> anyhow::Result<(StackConfig, LagoStack)> {
    let source = stackflow_config::load(path)?;
    if let Some(file) = source.file().and_then(|file| file.path()) {
        println!("Stack file: {}", file.display().to_string().cyan());
    }

    let config = StackConfig::from_source(&source)?;
    let stack = LagoStack::declare(&config, &source)?;
    Ok((config, stack))
}

//! Error types for stack declaration and apply

use crate::deferred::Failure;
use crate::resource::ResourceId;
use stackflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    /// Required input missing or invalid at declaration time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Each listed resource depends on the next; the last depends on the first
    #[error("Dependency cycle detected: {}", format_cycle(.0))]
    Cycle(Vec<ResourceId>),

    #[error("Secret generation failed for '{name}': {reason}")]
    SecretGeneration { name: String, reason: String },

    #[error("Provider error while creating '{resource}': {source}")]
    Provider {
        resource: ResourceId,
        #[source]
        source: CloudError,
    },

    #[error("Inputs of '{resource}' could not be resolved: {source}")]
    Resolution {
        resource: ResourceId,
        #[source]
        source: Failure,
    },

    /// A value was observed before its producer resolved it. Never expected
    /// in a correct run; the executor aborts when it sees one.
    #[error("Value observed before it resolved: {0}")]
    UnresolvedValue(String),

    #[error("Export '{0}' is sensitive and cannot be exported as plain text")]
    SensitiveExport(String),

    #[error("Executor task failed: {0}")]
    Runtime(String),
}

impl StackError {
    /// Build-time errors abort the whole run before any resource is created.
    pub fn is_build_time(&self) -> bool {
        matches!(
            self,
            StackError::Configuration(_) | StackError::Cycle(_) | StackError::SensitiveExport(_)
        )
    }
}

fn format_cycle(ids: &[ResourceId]) -> String {
    let mut parts: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
    if let Some(first) = ids.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

pub type Result<T> = std::result::Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_closes_the_loop() {
        let err = StackError::Cycle(vec![ResourceId::from("backend"), ResourceId::from("frontend")]);
        assert_eq!(
            err.to_string(),
            "Dependency cycle detected: backend -> frontend -> backend"
        );
        assert!(err.is_build_time());
    }

    #[test]
    fn test_apply_errors_are_not_build_time() {
        let err = StackError::SecretGeneration {
            name: "db-password".to_string(),
            reason: "length must be at least 1".to_string(),
        };
        assert!(!err.is_build_time());
    }
}

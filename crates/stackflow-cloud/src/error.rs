//! Provider error types

use thiserror::Error;

/// Errors raised by a resource provider.
///
/// The provisioning core treats these as opaque: any of them fails the
/// resource being created and every resource downstream of it.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedType(String),

    #[error("Invalid resource spec: {0}")]
    InvalidSpec(String),

    #[error("API error: {0}")]
    ApiError(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;

//! Resource provider trait definition

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attributes reported by a provider for a created resource (ids, ARNs,
/// DNS names, ...).
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Resource provider abstraction
///
/// Providers own the wire-level create/read calls against a cloud API. The
/// provisioning core only calls `create` once every input of the request
/// has resolved, and never calls it twice for the same resource.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws", "memory")
    fn name(&self) -> &str;

    /// Create a resource and report its assigned id and attributes
    async fn create(&self, request: &ResourceRequest) -> Result<ProvisionedResource>;

    /// Read back the attributes of a previously created resource
    async fn describe(&self, id: &str) -> Result<Attributes>;
}

/// A fully resolved creation request handed to a provider.
///
/// `spec` holds plaintext for every field, secrets included; the provider
/// call is the reveal boundary. `Debug` redacts the payload whenever the
/// request carries a sensitive field.
#[derive(Clone, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Logical resource name, unique within a stack
    pub name: String,

    /// Resource type tag (e.g., "aws:ec2:Vpc")
    pub resource_type: String,

    /// Desired state
    pub spec: serde_json::Value,

    /// Whether `spec` contains secret material
    pub sensitive: bool,
}

impl ResourceRequest {
    pub fn new(
        name: impl Into<String>,
        resource_type: impl Into<String>,
        spec: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            spec,
            sensitive: false,
        }
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    /// Get a spec field as a specific type
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.spec
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl fmt::Debug for ResourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ResourceRequest");
        s.field("name", &self.name)
            .field("resource_type", &self.resource_type);
        if self.sensitive {
            s.field("spec", &"[secret]");
        } else {
            s.field("spec", &self.spec);
        }
        s.finish()
    }
}

/// Result of a successful `create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedResource {
    /// Provider-assigned identifier
    pub id: String,

    /// Attributes exposed to downstream resources
    pub attributes: Attributes,
}

impl ProvisionedResource {
    pub fn new(id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_get_typed_field() {
        let request = ResourceRequest::new(
            "lago-net-vpc",
            "aws:ec2:Vpc",
            json!({"cidr_block": "172.42.0.0/16", "enable_dns_support": true}),
        );

        assert_eq!(
            request.get::<String>("cidr_block").as_deref(),
            Some("172.42.0.0/16")
        );
        assert_eq!(request.get::<bool>("enable_dns_support"), Some(true));
        assert_eq!(request.get::<String>("missing"), None);
    }

    #[test]
    fn test_sensitive_request_debug_is_redacted() {
        let request = ResourceRequest::new(
            "lago-db",
            "aws:rds:Instance",
            json!({"password": "hunter2_%"}),
        )
        .sensitive(true);

        let printed = format!("{:?}", request);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("[secret]"));
    }

    #[test]
    fn test_plain_request_debug_shows_spec() {
        let request = ResourceRequest::new("b", "aws:s3:Bucket", json!({"acl": "private"}));
        assert!(format!("{:?}", request).contains("private"));
    }
}

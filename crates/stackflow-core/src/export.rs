//! Stack exports
//!
//! The operator-facing result of a run: human-readable keys mapped to
//! resolved values. Plain exports must not carry sensitive data; secrets can
//! only be exported through `export_secret` and stay wrapped afterwards.

use crate::deferred::{DeferredValue, Failure};
use crate::error::{Result, StackError};
use crate::resource::SECRET_PLACEHOLDER;
use crate::secret::{SecretValue, Sensitive};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone)]
enum Entry {
    Plain(DeferredValue<String>),
    Secret(SecretValue),
}

/// Declared exports, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ExportSet {
    entries: Vec<(String, Entry)>,
}

impl ExportSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a non-sensitive value.
    pub fn export(&mut self, key: &str, value: &DeferredValue<String>) -> Result<&mut Self> {
        if value.is_sensitive() {
            return Err(StackError::SensitiveExport(key.to_string()));
        }
        self.insert(key, Entry::Plain(value.clone()))
    }

    /// Export a secret; it resolves to a `Sensitive` value.
    pub fn export_secret(&mut self, key: &str, value: &SecretValue) -> Result<&mut Self> {
        self.insert(key, Entry::Secret(value.clone()))
    }

    fn insert(&mut self, key: &str, entry: Entry) -> Result<&mut Self> {
        if self.entries.iter().any(|(existing, _)| existing == key) {
            return Err(StackError::Configuration(format!(
                "export '{}' is declared twice",
                key
            )));
        }
        self.entries.push((key.to_string(), entry));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Collect values after apply. Exports whose producers failed or were
    /// skipped are listed as unavailable. A value that is still pending
    /// means the graph was not fully applied and is an error.
    pub fn resolve(&self) -> Result<ResolvedExports> {
        let mut resolved = ResolvedExports::default();
        for (key, entry) in &self.entries {
            let outcome = match entry {
                Entry::Plain(value) => value.peek().map(|r| r.map(ExportValue::Plain)),
                Entry::Secret(value) => value.peek().map(|r| r.map(ExportValue::Secret)),
            };
            match outcome {
                Some(Ok(value)) => resolved.values.push((key.clone(), value)),
                Some(Err(failure)) => {
                    tracing::debug!(export = %key, reason = %failure, "Export unavailable");
                    resolved.unavailable.push((key.clone(), failure));
                }
                None => return Err(StackError::UnresolvedValue(format!("export '{}'", key))),
            }
        }
        Ok(resolved)
    }
}

/// A resolved export value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportValue {
    Plain(String),
    Secret(Sensitive<String>),
}

impl ExportValue {
    pub fn is_secret(&self) -> bool {
        matches!(self, ExportValue::Secret(_))
    }
}

impl fmt::Display for ExportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportValue::Plain(value) => f.write_str(value),
            ExportValue::Secret(_) => f.write_str(SECRET_PLACEHOLDER),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedExports {
    values: Vec<(String, ExportValue)>,
    unavailable: Vec<(String, Failure)>,
}

impl ResolvedExports {
    pub fn get(&self, key: &str) -> Option<&ExportValue> {
        self.values
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// A non-secret export's value.
    pub fn plain(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(ExportValue::Plain(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExportValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Exports that could not be produced, with the reason.
    pub fn unavailable(&self) -> &[(String, Failure)] {
        &self.unavailable
    }

    /// JSON object of the available exports; secrets are redacted.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.to_string())))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceId;

    #[test]
    fn test_sensitive_value_cannot_be_exported_plain() {
        let secret = SecretValue::supplied("hunter2");
        let derived = DeferredValue::combine2(
            &DeferredValue::known("user".to_string()),
            secret.value(),
            |u, p| format!("{}:{}", u, p),
        );

        let mut exports = ExportSet::new();
        let err = exports.export("Database URL", &derived).unwrap_err();
        assert!(matches!(err, StackError::SensitiveExport(key) if key == "Database URL"));
        assert!(exports.is_empty());
    }

    #[test]
    fn test_secret_exports_are_redacted() {
        let mut exports = ExportSet::new();
        exports
            .export("Service Name", &DeferredValue::known("lago".to_string()))
            .unwrap()
            .export_secret("Admin Password", &SecretValue::supplied("hunter2"))
            .unwrap();

        let resolved = exports.resolve().unwrap();
        assert_eq!(resolved.plain("Service Name"), Some("lago"));
        assert_eq!(resolved.plain("Admin Password"), None);
        assert!(resolved.get("Admin Password").unwrap().is_secret());

        let json = resolved.to_json().to_string();
        assert!(json.contains("[secret]"));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_failed_producer_makes_export_unavailable() {
        let (dns, resolver) = DeferredValue::<String>::pending(ResourceId::from("backend-alb"));
        let url = dns.map(|d| format!("http://{}", d));
        resolver.fail();

        let mut exports = ExportSet::new();
        exports
            .export("Lago API URL", &url)
            .unwrap()
            .export("Lago Version", &DeferredValue::known("1.2.0".to_string()))
            .unwrap();

        let resolved = exports.resolve().unwrap();
        assert!(!resolved.contains("Lago API URL"));
        assert!(resolved.contains("Lago Version"));
        assert_eq!(resolved.unavailable().len(), 1);
        assert_eq!(
            resolved.unavailable()[0].1,
            Failure::Upstream(ResourceId::from("backend-alb"))
        );
    }

    #[test]
    fn test_pending_export_is_an_invariant_violation() {
        let (dns, _resolver) = DeferredValue::<String>::pending(ResourceId::from("alb"));
        let mut exports = ExportSet::new();
        exports.export("Lago Front URL", &dns).unwrap();

        assert!(matches!(
            exports.resolve(),
            Err(StackError::UnresolvedValue(_))
        ));
    }

    #[test]
    fn test_duplicate_export_key() {
        let mut exports = ExportSet::new();
        let value = DeferredValue::known("x".to_string());
        exports.export("VPC ID", &value).unwrap();
        assert!(matches!(
            exports.export("VPC ID", &value),
            Err(StackError::Configuration(_))
        ));
    }
}

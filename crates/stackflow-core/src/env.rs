//! Environment assembly
//!
//! Container environments are built from static scalars, component outputs
//! and secrets. The assembled map is itself a single deferred value: it only
//! resolves once every entry has, so it is never serialized half-way.

use crate::deferred::{DeferredValue, Fragment, concat};
use crate::error::{Result, StackError};
use crate::resource::ResourceId;
use crate::secret::SecretValue;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// Variable name to deferred string value. Keys are unique.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    entries: BTreeMap<String, DeferredValue<String>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A static scalar.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<&mut Self> {
        self.insert(key, DeferredValue::known(value.into()))
    }

    /// A value derived from component outputs.
    pub fn value(&mut self, key: &str, value: &DeferredValue<String>) -> Result<&mut Self> {
        self.insert(key, value.clone())
    }

    pub fn secret(&mut self, key: &str, value: &SecretValue) -> Result<&mut Self> {
        self.insert(key, value.value().clone())
    }

    fn insert(&mut self, key: &str, value: DeferredValue<String>) -> Result<&mut Self> {
        if key.is_empty() {
            return Err(StackError::Configuration(
                "environment variable name must not be empty".to_string(),
            ));
        }
        if self.entries.contains_key(key) {
            return Err(StackError::Configuration(format!(
                "environment variable '{}' is set twice",
                key
            )));
        }
        self.entries.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&DeferredValue<String>> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sensitive(&self) -> bool {
        self.entries.values().any(DeferredValue::is_sensitive)
    }

    pub fn dependencies(&self) -> BTreeSet<ResourceId> {
        self.entries
            .values()
            .flat_map(|value| value.dependencies().iter().cloned())
            .collect()
    }

    /// The whole map, resolved at once.
    pub fn resolved(&self) -> DeferredValue<BTreeMap<String, String>> {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        let values: Vec<DeferredValue<String>> = self.entries.values().cloned().collect();
        DeferredValue::combine_all(values.as_slice(), move |resolved| {
            keys.into_iter().zip(resolved).collect()
        })
    }

    /// ECS container-definition form: `[{"name": .., "value": ..}]`.
    pub fn to_container_environment(&self) -> DeferredValue<Value> {
        self.resolved().map(|entries| {
            Value::Array(
                entries
                    .into_iter()
                    .map(|(name, value)| json!({ "name": name, "value": value }))
                    .collect(),
            )
        })
    }
}

/// `scheme://[user[:password]@]host:port[/database]`
#[derive(Debug, Clone)]
pub struct ConnectionString {
    scheme: String,
    host: DeferredValue<String>,
    port: DeferredValue<u16>,
    user: Option<DeferredValue<String>>,
    password: Option<SecretValue>,
    database: Option<DeferredValue<String>>,
}

impl ConnectionString {
    pub fn new(scheme: &str, host: &DeferredValue<String>, port: &DeferredValue<u16>) -> Self {
        Self {
            scheme: scheme.to_string(),
            host: host.clone(),
            port: port.clone(),
            user: None,
            password: None,
            database: None,
        }
    }

    pub fn user(mut self, user: &DeferredValue<String>) -> Self {
        self.user = Some(user.clone());
        self
    }

    pub fn password(mut self, password: &SecretValue) -> Self {
        self.password = Some(password.clone());
        self
    }

    pub fn database(mut self, database: &DeferredValue<String>) -> Self {
        self.database = Some(database.clone());
        self
    }

    /// Sensitive whenever a password is part of it.
    pub fn build(&self) -> DeferredValue<String> {
        let mut parts: Vec<Fragment> = vec![format!("{}://", self.scheme).into()];
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => {
                parts.push(user.into());
                parts.push(":".into());
                parts.push(password.value().into());
                parts.push("@".into());
            }
            (Some(user), None) => {
                parts.push(user.into());
                parts.push("@".into());
            }
            (None, Some(password)) => {
                parts.push(":".into());
                parts.push(password.value().into());
                parts.push("@".into());
            }
            (None, None) => {}
        }
        parts.push((&self.host).into());
        parts.push(":".into());
        parts.push(self.port.map(|port| port.to_string()).into());
        if let Some(database) = &self.database {
            parts.push("/".into());
            parts.push(database.into());
        }
        concat(parts)
    }
}

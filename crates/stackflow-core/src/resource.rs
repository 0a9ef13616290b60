//! Resource declarations
//!
//! A resource is declared once with a type tag and a `Spec`. The spec is an
//! explicit map of inputs: literal fields and deferred fields. Deferred
//! fields are what create data edges in the graph, and `Spec::dependencies`
//! lists them without any reflection.

use crate::deferred::{DeferredValue, Failure};
use crate::secret::SecretValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stackflow_cloud::Attributes;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Placeholder shown for secret fields in rendered specs.
pub const SECRET_PLACEHOLDER: &str = "[secret]";

/// Placeholder shown for fields only known after apply.
pub const COMPUTED_PLACEHOLDER: &str = "<computed>";

/// Logical resource name, unique within a stack.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for ResourceId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

/// An ordering constraint not implied by data flow: `dependent` waits for
/// `dependency`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependency: ResourceId,
    pub dependent: ResourceId,
}

impl DependencyEdge {
    pub fn new(dependency: impl Into<ResourceId>, dependent: impl Into<ResourceId>) -> Self {
        Self {
            dependency: dependency.into(),
            dependent: dependent.into(),
        }
    }
}

#[derive(Debug, Clone)]
enum Input {
    Literal(Value),
    Deferred(DeferredValue<Value>),
}

/// Desired state of a resource.
#[derive(Debug, Clone, Default)]
pub struct Spec {
    fields: BTreeMap<String, Input>,
}

impl Spec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field known at declaration time.
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields
            .insert(key.to_string(), Input::Literal(value.into()));
        self
    }

    /// Set a field from a deferred value.
    pub fn input<T>(mut self, key: &str, value: &DeferredValue<T>) -> Self
    where
        T: Into<Value> + Clone + Send + Sync + 'static,
    {
        self.fields
            .insert(key.to_string(), Input::Deferred(value.map(|v| -> Value { v.into() })));
        self
    }

    /// Set a field from a secret; the whole spec becomes sensitive.
    pub fn secret(self, key: &str, value: &SecretValue) -> Self {
        self.input(key, value.value())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resources whose outputs this spec reads.
    pub fn dependencies(&self) -> BTreeSet<ResourceId> {
        self.fields
            .values()
            .filter_map(|input| match input {
                Input::Deferred(value) => Some(value.dependencies().iter().cloned()),
                Input::Literal(_) => None,
            })
            .flatten()
            .collect()
    }

    pub fn is_sensitive(&self) -> bool {
        self.fields.values().any(|input| match input {
            Input::Deferred(value) => value.is_sensitive(),
            Input::Literal(_) => false,
        })
    }

    /// Fields fed from sensitive values.
    pub fn sensitive_keys(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|(_, input)| matches!(input, Input::Deferred(value) if value.is_sensitive()))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// The whole spec as one deferred JSON object.
    pub fn to_deferred(&self) -> DeferredValue<Value> {
        let keys: Vec<String> = self.fields.keys().cloned().collect();
        let values: Vec<DeferredValue<Value>> = self
            .fields
            .values()
            .map(|input| match input {
                Input::Literal(value) => DeferredValue::known(value.clone()),
                Input::Deferred(value) => value.clone(),
            })
            .collect();

        let combined = DeferredValue::combine_all(values.as_slice(), move |resolved| {
            Value::Object(keys.into_iter().zip(resolved).collect())
        });
        if self.is_sensitive() {
            combined.mark_sensitive()
        } else {
            combined
        }
    }

    /// Plan representation: literals as-is, secrets and unknowns replaced
    /// by placeholders. Never contains secret plaintext.
    pub fn render(&self) -> Value {
        let fields = self
            .fields
            .iter()
            .map(|(key, input)| {
                let rendered = match input {
                    Input::Literal(value) => value.clone(),
                    Input::Deferred(value) if value.is_sensitive() => {
                        Value::String(SECRET_PLACEHOLDER.to_string())
                    }
                    Input::Deferred(value) => match value.peek() {
                        Some(Ok(resolved)) => resolved,
                        _ => Value::String(COMPUTED_PLACEHOLDER.to_string()),
                    },
                };
                (key.clone(), rendered)
            })
            .collect();
        Value::Object(fields)
    }
}

/// A resource about to be declared.
#[derive(Debug, Clone)]
pub struct ResourceDecl {
    pub(crate) name: ResourceId,
    pub(crate) resource_type: String,
    pub(crate) spec: Spec,
    pub(crate) depends_on: BTreeSet<ResourceId>,
}

impl ResourceDecl {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: ResourceId::from(name.into()),
            resource_type: resource_type.into(),
            spec: Spec::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn spec(mut self, spec: Spec) -> Self {
        self.spec = spec;
        self
    }

    /// Wait for another resource even though no data flows from it.
    pub fn depends_on(mut self, resource: &ResourceHandle) -> Self {
        self.depends_on.insert(resource.id().clone());
        self
    }

    pub fn depends_on_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.depends_on.insert(id.into());
        self
    }
}

/// A declared resource: its identity plus its deferred outputs.
///
/// Providers echo inputs back as attributes, so any attribute named after a
/// sensitive spec field is read back as sensitive too.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    id: ResourceId,
    resource_type: String,
    attributes: DeferredValue<Attributes>,
    sensitive_keys: Arc<BTreeSet<String>>,
}

impl ResourceHandle {
    pub(crate) fn new(
        id: ResourceId,
        resource_type: String,
        attributes: DeferredValue<Attributes>,
    ) -> Self {
        Self {
            id,
            resource_type,
            attributes,
            sensitive_keys: Arc::default(),
        }
    }

    pub(crate) fn with_sensitive_keys(mut self, keys: BTreeSet<String>) -> Self {
        self.sensitive_keys = Arc::new(keys);
        self
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// All attributes the provider reported. Sensitive when any input was.
    pub fn attributes(&self) -> DeferredValue<Attributes> {
        if self.sensitive_keys.is_empty() {
            self.attributes.clone()
        } else {
            self.attributes.clone().mark_sensitive()
        }
    }

    /// Whether reading `path` yields an echoed sensitive input.
    pub fn is_sensitive_output(&self, path: &str) -> bool {
        let key = match path.strip_prefix('/') {
            Some(pointer) => pointer.split('/').next().unwrap_or_default(),
            None => path,
        };
        let key = key.replace("~1", "/").replace("~0", "~");
        self.sensitive_keys.contains(&key)
    }

    /// Provider-assigned identifier.
    pub fn provider_id(&self) -> DeferredValue<String> {
        self.output("id")
    }

    /// A typed output, by attribute name or JSON pointer
    /// (e.g. `/cache_nodes/0/address`).
    pub fn output<T>(&self, path: &str) -> DeferredValue<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let value = project(&self.attributes, self.id.clone(), path.to_string());
        if self.is_sensitive_output(path) {
            value.mark_sensitive()
        } else {
            value
        }
    }

    /// An output the provider reports in plaintext but which must be
    /// treated as secret (e.g. generated key material).
    pub fn secret_output(&self, path: &str) -> SecretValue {
        SecretValue::from_deferred(self.output::<String>(path))
    }
}

pub(crate) fn project<T>(
    attributes: &DeferredValue<Attributes>,
    resource: ResourceId,
    path: String,
) -> DeferredValue<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    attributes.try_map(move |attributes| {
        let found = if path.starts_with('/') {
            Value::Object(attributes.into_iter().collect())
                .pointer(&path)
                .cloned()
        } else {
            attributes.get(&path).cloned()
        };

        let value = found.ok_or_else(|| Failure::MissingAttribute {
            resource: resource.clone(),
            attribute: path.clone(),
        })?;

        serde_json::from_value(value).map_err(|e| Failure::InvalidAttribute {
            resource,
            attribute: path,
            reason: e.to_string(),
        })
    })
}

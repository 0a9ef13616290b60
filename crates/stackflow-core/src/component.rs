//! Components
//!
//! A component is a plain struct returned by a constructor function: it
//! holds the handles of what it declared and exposes typed outputs. The only
//! shared capability is "has a name, has outputs", captured by the
//! `Component` trait. Scoping happens through `StackBuilder::component`.

use crate::deferred::DeferredValue;
use crate::resource::ResourceId;
use serde::Serialize;
use std::collections::BTreeSet;

/// Identity of a declared component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComponentInfo {
    pub name: String,
    /// e.g. `lago:network:Network`
    pub type_tag: String,
    pub parent: Option<String>,
    /// Resources declared directly in this component, in declaration order.
    pub resources: Vec<ResourceId>,
    pub children: Vec<String>,
}

impl ComponentInfo {
    pub(crate) fn new(name: &str, type_tag: &str, parent: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            parent,
            resources: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Descriptor of one boundary output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPort {
    pub name: String,
    pub sensitive: bool,
    pub dependencies: BTreeSet<ResourceId>,
}

impl OutputPort {
    pub fn of<T>(name: &str, value: &DeferredValue<T>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            sensitive: value.is_sensitive(),
            dependencies: value.dependencies().clone(),
        }
    }
}

pub trait Component {
    fn info(&self) -> &ComponentInfo;

    fn outputs(&self) -> Vec<OutputPort>;

    fn name(&self) -> &str {
        &self.info().name
    }
}

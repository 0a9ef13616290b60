//! Graph nodes

use crate::resource::{ResourceId, Spec};
use crate::secret::SecretPolicy;
use serde_json::{Value, json};
use stackflow_cloud::ActionType;
use std::collections::BTreeSet;

/// Type tag reported for generated-secret nodes.
pub const SECRET_RESOURCE_TYPE: &str = "stackflow:secret";

/// What applying a node does.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Created through the `ResourceProvider`.
    Provisioned { resource_type: String, spec: Spec },
    /// Generated locally under a policy.
    Generated { policy: SecretPolicy },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: ResourceId,
    pub(crate) kind: NodeKind,
    pub(crate) component: Option<String>,
    pub(crate) index: usize,
    /// Data dependencies plus explicit ordering hints.
    pub(crate) depends_on: BTreeSet<ResourceId>,
}

impl Node {
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn resource_type(&self) -> &str {
        match &self.kind {
            NodeKind::Provisioned { resource_type, .. } => resource_type,
            NodeKind::Generated { .. } => SECRET_RESOURCE_TYPE,
        }
    }

    /// Component that declared the node, if any.
    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// Position in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn depends_on(&self) -> &BTreeSet<ResourceId> {
        &self.depends_on
    }

    pub fn action_type(&self) -> ActionType {
        match &self.kind {
            NodeKind::Provisioned { .. } => ActionType::Create,
            NodeKind::Generated { .. } => ActionType::Generate,
        }
    }

    /// Plan view of the node. Secret inputs and the generated value itself
    /// are never rendered.
    pub fn render(&self) -> Value {
        match &self.kind {
            NodeKind::Provisioned { spec, .. } => spec.render(),
            NodeKind::Generated { policy } => json!({
                "length": policy.length,
                "special": policy.special.is_some(),
            }),
        }
    }
}

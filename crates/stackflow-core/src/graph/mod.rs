//! Dependency graph
//!
//! `StackBuilder` records declarations; `build` turns them into an immutable
//! `StackGraph` with a fixed evaluation order, or fails with a cycle before
//! anything is created.

mod builder;
mod node;

pub use builder::StackBuilder;
pub use node::{Node, NodeKind, SECRET_RESOURCE_TYPE};

use crate::component::ComponentInfo;
use crate::deferred::Resolver;
use crate::resource::ResourceId;
use stackflow_cloud::{Action, Attributes, Plan};
use std::collections::HashMap;

/// An acyclic, ordered resource graph ready to be applied once.
#[derive(Debug)]
pub struct StackGraph {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) index: HashMap<ResourceId, usize>,
    /// Per node, the positions of its dependencies (ascending).
    pub(crate) dependencies: Vec<Vec<usize>>,
    pub(crate) dependents: Vec<Vec<usize>>,
    pub(crate) order: Vec<usize>,
    pub(crate) components: Vec<ComponentInfo>,
    pub(crate) resolvers: Vec<Option<Resolver<Attributes>>>,
}

impl StackGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in evaluation order.
    pub fn order(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().map(|&position| &self.nodes[position])
    }

    pub fn node(&self, id: &ResourceId) -> Option<&Node> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.neighbours(id, &self.dependencies)
    }

    pub fn dependents_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.neighbours(id, &self.dependents)
    }

    fn neighbours<'a>(&'a self, id: &ResourceId, edges: &'a [Vec<usize>]) -> Vec<&'a ResourceId> {
        self.index
            .get(id)
            .map(|&position| {
                edges[position]
                    .iter()
                    .map(|&other| &self.nodes[other].id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Layers of mutually independent nodes. Every node sits one layer
    /// after its deepest dependency.
    pub fn waves(&self) -> Vec<Vec<ResourceId>> {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut waves: Vec<Vec<ResourceId>> = Vec::new();

        for &position in &self.order {
            let level = self.dependencies[position]
                .iter()
                .map(|&dependency| depth[dependency] + 1)
                .max()
                .unwrap_or(0);
            depth[position] = level;
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(self.nodes[position].id.clone());
        }
        waves
    }

    pub fn components(&self) -> &[ComponentInfo] {
        &self.components
    }

    /// Actions in evaluation order, rendered without secrets.
    pub fn plan(&self) -> Plan {
        let actions = self
            .order()
            .map(|node| Action {
                id: node.id.to_string(),
                action_type: node.action_type(),
                resource_type: node.resource_type().to_string(),
                component: node.component.clone(),
                depends_on: self.dependencies[node.index]
                    .iter()
                    .map(|&dependency| self.nodes[dependency].id.to_string())
                    .collect(),
                details: node.render(),
            })
            .collect();

        let waves = self
            .waves()
            .into_iter()
            .map(|wave| wave.into_iter().map(|id| id.to_string()).collect())
            .collect();

        Plan::new(actions, waves)
    }
}

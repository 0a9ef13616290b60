//! Stack builder
//!
//! Declaration is synchronous: every call here records structure and hands
//! back deferred outputs. Nothing is resolved until the built graph is
//! applied.

use super::StackGraph;
use super::node::{Node, NodeKind, SECRET_RESOURCE_TYPE};
use crate::component::ComponentInfo;
use crate::deferred::{DeferredValue, Resolver};
use crate::error::{Result, StackError};
use crate::resource::{DependencyEdge, ResourceDecl, ResourceHandle, ResourceId, Spec};
use crate::secret::{SecretPolicy, SecretValue};
use stackflow_cloud::Attributes;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use tracing::debug;

/// Collects resource declarations, components and explicit edges.
#[derive(Debug)]
pub struct StackBuilder {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<ResourceId, usize>,
    resolvers: Vec<Option<Resolver<Attributes>>>,
    edges: Vec<DependencyEdge>,
    components: Vec<ComponentInfo>,
    scope: Vec<usize>,
}

impl StackBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            resolvers: Vec::new(),
            edges: Vec::new(),
            components: Vec::new(),
            scope: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Declare a provider-backed resource.
    pub fn declare(&mut self, decl: ResourceDecl) -> Result<ResourceHandle> {
        let ResourceDecl {
            name,
            resource_type,
            spec,
            mut depends_on,
        } = decl;
        depends_on.extend(spec.dependencies());
        let sensitive_keys = spec.sensitive_keys();

        let kind = NodeKind::Provisioned {
            resource_type: resource_type.clone(),
            spec,
        };
        let attributes = self.insert(name.clone(), kind, depends_on)?;
        Ok(ResourceHandle::new(name, resource_type, attributes)
            .with_sensitive_keys(sensitive_keys))
    }

    /// Shorthand for `declare` without explicit ordering hints.
    pub fn resource(
        &mut self,
        name: &str,
        resource_type: &str,
        spec: Spec,
    ) -> Result<ResourceHandle> {
        self.declare(ResourceDecl::new(name, resource_type).spec(spec))
    }

    /// Declare a secret generated at apply time.
    pub fn generate_secret(&mut self, name: &str, policy: SecretPolicy) -> Result<SecretValue> {
        let id = ResourceId::from(name);
        let attributes = self.insert(id.clone(), NodeKind::Generated { policy }, BTreeSet::new())?;
        let handle = ResourceHandle::new(id, SECRET_RESOURCE_TYPE.to_string(), attributes);
        Ok(handle.secret_output("result"))
    }

    /// Order two resources that have no data edge between them.
    pub fn add_edge(&mut self, edge: DependencyEdge) -> &mut Self {
        debug!(
            dependency = %edge.dependency,
            dependent = %edge.dependent,
            "Adding explicit dependency edge"
        );
        self.edges.push(edge);
        self
    }

    /// Declare a named component. Resources declared inside `build` belong
    /// to it; nested calls create child components.
    pub fn component<O, F>(
        &mut self,
        type_tag: &str,
        name: &str,
        build: F,
    ) -> Result<(ComponentInfo, O)>
    where
        F: FnOnce(&mut StackBuilder) -> Result<O>,
    {
        if name.is_empty() {
            return Err(StackError::Configuration(format!(
                "component of type '{}' has an empty name",
                type_tag
            )));
        }
        if self.components.iter().any(|c| c.name == name) {
            return Err(StackError::Configuration(format!(
                "component '{}' is declared twice",
                name
            )));
        }

        let parent = self.current_component().map(str::to_string);
        if let Some(&current) = self.scope.last() {
            self.components[current].children.push(name.to_string());
        }
        let position = self.components.len();
        self.components
            .push(ComponentInfo::new(name, type_tag, parent));

        debug!(component = %name, type_tag = %type_tag, "Declaring component");
        self.scope.push(position);
        let outputs = build(self);
        self.scope.pop();

        let outputs = outputs?;
        Ok((self.components[position].clone(), outputs))
    }

    fn current_component(&self) -> Option<&str> {
        self.scope
            .last()
            .map(|&position| self.components[position].name.as_str())
    }

    fn insert(
        &mut self,
        id: ResourceId,
        kind: NodeKind,
        depends_on: BTreeSet<ResourceId>,
    ) -> Result<DeferredValue<Attributes>> {
        if id.as_str().is_empty() {
            return Err(StackError::Configuration(
                "resource name must not be empty".to_string(),
            ));
        }
        if self.index.contains_key(&id) {
            return Err(StackError::Configuration(format!(
                "resource '{}' is declared twice",
                id
            )));
        }

        let index = self.nodes.len();
        let component = self.current_component().map(str::to_string);
        if let Some(&current) = self.scope.last() {
            self.components[current].resources.push(id.clone());
        }

        let (attributes, resolver) = DeferredValue::pending(id.clone());
        let node = Node {
            id: id.clone(),
            kind,
            component,
            index,
            depends_on,
        };
        debug!(
            resource = %node.id,
            resource_type = %node.resource_type(),
            dependencies = node.depends_on.len(),
            "Declared resource"
        );

        self.nodes.push(node);
        self.resolvers.push(Some(resolver));
        self.index.insert(id, index);
        Ok(attributes)
    }

    /// Validate edges, reject cycles and fix the evaluation order.
    pub fn build(self) -> Result<StackGraph> {
        let StackBuilder {
            name,
            mut nodes,
            index,
            resolvers,
            edges,
            components,
            scope: _,
        } = self;

        for edge in &edges {
            for end in [&edge.dependency, &edge.dependent] {
                if !index.contains_key(end) {
                    return Err(StackError::Configuration(format!(
                        "dependency edge refers to undeclared resource '{}'",
                        end
                    )));
                }
            }
        }
        for edge in edges {
            if let Some(&dependent) = index.get(&edge.dependent) {
                nodes[dependent].depends_on.insert(edge.dependency);
            }
        }

        let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut resolved = Vec::with_capacity(node.depends_on.len());
            for dependency in &node.depends_on {
                match index.get(dependency) {
                    Some(&position) => resolved.push(position),
                    None => {
                        return Err(StackError::Configuration(format!(
                            "resource '{}' depends on undeclared resource '{}'",
                            node.id, dependency
                        )));
                    }
                }
            }
            resolved.sort_unstable();
            dependencies.push(resolved);
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (node, deps) in dependencies.iter().enumerate() {
            for &dependency in deps {
                dependents[dependency].push(node);
            }
        }

        let order = topological_order(&dependencies, &dependents).map_err(|cycle| {
            StackError::Cycle(cycle.into_iter().map(|i| nodes[i].id.clone()).collect())
        })?;

        debug!(
            stack = %name,
            resources = nodes.len(),
            components = components.len(),
            "Built dependency graph"
        );

        Ok(StackGraph {
            name,
            nodes,
            index,
            dependencies,
            dependents,
            order,
            components,
            resolvers,
        })
    }
}

/// Kahn's algorithm; among ready nodes the earliest declared goes first.
/// On failure returns one cycle, each node depending on the next.
fn topological_order(
    dependencies: &[Vec<usize>],
    dependents: &[Vec<usize>],
) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| Reverse(node))
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() == dependencies.len() {
        return Ok(order);
    }
    Err(find_cycle(dependencies, &in_degree))
}

/// Every node left with a positive in-degree has an unprocessed dependency,
/// so walking those dependencies must revisit a node.
fn find_cycle(dependencies: &[Vec<usize>], in_degree: &[usize]) -> Vec<usize> {
    let remaining = |node: usize| in_degree[node] > 0;
    let Some(start) = (0..dependencies.len()).find(|&node| remaining(node)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut seen: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;
    loop {
        let Some(&next) = dependencies[current].iter().find(|&&d| remaining(d)) else {
            return path;
        };
        if let Some(&position) = seen.get(&next) {
            let mut cycle = path.split_off(position);
            // Start from the earliest declared participant.
            if let Some(first) = cycle
                .iter()
                .enumerate()
                .min_by_key(|(_, node)| **node)
                .map(|(i, _)| i)
            {
                cycle.rotate_left(first);
            }
            return cycle;
        }
        seen.insert(next, path.len());
        path.push(next);
        current = next;
    }
}

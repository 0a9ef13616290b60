//! Apply executor
//!
//! Drives a built `StackGraph` against a `ResourceProvider`. A node starts
//! once every dependency has finished; independent nodes run concurrently
//! on a `JoinSet`. When a node fails, everything downstream of it is skipped
//! and its consumers observe an upstream failure, while unrelated branches
//! keep going. Nothing is rolled back.

use crate::deferred::Resolver;
use crate::error::{Result, StackError};
use crate::graph::{NodeKind, StackGraph};
use crate::resource::ResourceId;
use crate::secret::SecretGenerator;
use serde_json::Value;
use stackflow_cloud::{ApplyReport, Attributes, ResourceProvider, ResourceRequest};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Waiting,
    Running,
    Succeeded,
    Failed,
    /// Holds the failed node at the root of the skip.
    Skipped(usize),
}

enum Outcome {
    Succeeded(String),
    Failed(StackError),
}

/// Applies stack graphs through a provider.
pub struct Executor {
    provider: Arc<dyn ResourceProvider>,
    generator: SecretGenerator,
}

impl Executor {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            generator: SecretGenerator::new(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn ResourceProvider> {
        &self.provider
    }

    /// Apply every node of the graph once.
    ///
    /// Provider and secret-generation failures are collected in the report.
    /// An `Err` is returned only for engine faults, after cancelling every
    /// running task.
    pub async fn apply(&self, mut graph: StackGraph) -> Result<ApplyReport> {
        let started = Instant::now();
        let total = graph.nodes.len();
        let mut report = ApplyReport::new();
        let mut states = vec![State::Waiting; total];
        let mut remaining: Vec<usize> = graph.dependencies.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(position, _)| Reverse(position))
            .collect();
        let mut tasks: JoinSet<(usize, Outcome)> = JoinSet::new();

        info!(
            stack = %graph.name,
            resources = total,
            provider = %self.provider.name(),
            "Applying stack"
        );

        loop {
            while let Some(Reverse(position)) = ready.pop() {
                let resolver = graph.resolvers[position].take();
                let node = &graph.nodes[position];

                if let Some(root) = blocked_by(&graph, &states, position) {
                    // Dropping the resolver fails every consumer of this node.
                    drop(resolver);
                    let root_id = &graph.nodes[root].id;
                    warn!(resource = %node.id, blocked_by = %root_id, "Skipping resource");
                    report.add_skipped(node.id.to_string(), root_id.to_string());
                    states[position] = State::Skipped(root);
                    release(&graph, position, &mut remaining, &mut ready);
                    continue;
                }

                if let Some(&pending) = graph.dependencies[position]
                    .iter()
                    .find(|&&dependency| states[dependency] != State::Succeeded)
                {
                    tasks.abort_all();
                    return Err(StackError::UnresolvedValue(format!(
                        "inputs of '{}' (waiting on '{}')",
                        node.id, graph.nodes[pending].id
                    )));
                }

                let Some(resolver) = resolver else {
                    tasks.abort_all();
                    return Err(StackError::Runtime(format!(
                        "resource '{}' has no producer handle",
                        node.id
                    )));
                };

                states[position] = State::Running;
                let provider = Arc::clone(&self.provider);
                let generator = self.generator;
                let id = node.id.clone();
                let kind = node.kind.clone();
                tasks.spawn(async move {
                    let outcome = run_node(provider, generator, id, kind, resolver).await;
                    (position, outcome)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (position, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tasks.abort_all();
                    return Err(StackError::Runtime(e.to_string()));
                }
            };

            let id = graph.nodes[position].id.to_string();
            match outcome {
                Outcome::Succeeded(message) => {
                    states[position] = State::Succeeded;
                    report.add_success(id, message);
                }
                Outcome::Failed(err) => {
                    warn!(resource = %id, error = %err, "Resource failed");
                    states[position] = State::Failed;
                    report.add_failure(id, err.to_string());
                }
            }
            release(&graph, position, &mut remaining, &mut ready);
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            stack = %graph.name,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "Apply finished"
        );
        Ok(report)
    }
}

fn blocked_by(graph: &StackGraph, states: &[State], position: usize) -> Option<usize> {
    graph.dependencies[position]
        .iter()
        .find_map(|&dependency| match states[dependency] {
            State::Failed => Some(dependency),
            State::Skipped(root) => Some(root),
            _ => None,
        })
}

fn release(
    graph: &StackGraph,
    position: usize,
    remaining: &mut [usize],
    ready: &mut BinaryHeap<Reverse<usize>>,
) {
    for &dependent in &graph.dependents[position] {
        remaining[dependent] -= 1;
        if remaining[dependent] == 0 {
            ready.push(Reverse(dependent));
        }
    }
}

async fn run_node(
    provider: Arc<dyn ResourceProvider>,
    generator: SecretGenerator,
    id: ResourceId,
    kind: NodeKind,
    resolver: Resolver<Attributes>,
) -> Outcome {
    match kind {
        NodeKind::Generated { policy } => match generator.generate(id.as_str(), &policy) {
            Ok(secret) => {
                let mut attributes = Attributes::new();
                attributes.insert("id".to_string(), Value::String(id.to_string()));
                attributes.insert("result".to_string(), Value::String(secret));
                resolver.resolve(attributes);
                Outcome::Succeeded("generated secret".to_string())
            }
            Err(err) => {
                resolver.fail();
                Outcome::Failed(err)
            }
        },
        NodeKind::Provisioned {
            resource_type,
            spec,
        } => {
            // Every producer has sent; siblings may be polling the same inputs.
            let inputs = spec.to_deferred();
            let resolved = match inputs.resolve().await {
                Ok(value) => value,
                Err(failure) => {
                    resolver.fail();
                    return Outcome::Failed(StackError::Resolution {
                        resource: id,
                        source: failure,
                    });
                }
            };

            let request = ResourceRequest::new(id.as_str(), resource_type.as_str(), resolved)
                .sensitive(inputs.is_sensitive());
            debug!(request = ?request, "Creating resource");

            match provider.create(&request).await {
                Ok(created) => {
                    let mut attributes = created.attributes;
                    attributes
                        .entry("id".to_string())
                        .or_insert_with(|| Value::String(created.id.clone()));
                    resolver.resolve(attributes);
                    info!(
                        resource = %id,
                        resource_type = %resource_type,
                        id = %created.id,
                        "Created resource"
                    );
                    Outcome::Succeeded(format!("created {} ({})", resource_type, created.id))
                }
                Err(source) => {
                    resolver.fail();
                    Outcome::Failed(StackError::Provider {
                        resource: id,
                        source,
                    })
                }
            }
        }
    }
}

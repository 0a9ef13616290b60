//! Stackflow Core
//!
//! Declarative composition engine: resources are declared against deferred
//! outputs of other resources, assembled into a dependency graph, and
//! applied through a `ResourceProvider`.
//!
//! ```text
//! declare ──► StackBuilder ──build()──► StackGraph ──Executor::apply──► ApplyReport
//!   │                                      │                              │
//!   └─ DeferredValue / SecretValue ◄───────┴──── resolved outputs ────────┘
//! ```
//!
//! Declarations never wait: a component constructor only records structure
//! and returns deferred handles. Cycles and unknown references are rejected
//! by `build()`, before any provider call.

pub mod component;
pub mod deferred;
pub mod env;
pub mod error;
pub mod executor;
pub mod export;
pub mod graph;
pub mod resource;
pub mod secret;

pub use component::{Component, ComponentInfo, OutputPort};
pub use deferred::{DeferredValue, Failure, Fragment, Resolution, Resolver, concat};
pub use env::{ConnectionString, Environment};
pub use error::{Result, StackError};
pub use executor::Executor;
pub use export::{ExportSet, ExportValue, ResolvedExports};
pub use graph::{Node, NodeKind, SECRET_RESOURCE_TYPE, StackBuilder, StackGraph};
pub use resource::{
    COMPUTED_PLACEHOLDER, DependencyEdge, ResourceDecl, ResourceHandle, ResourceId,
    SECRET_PLACEHOLDER, Spec,
};
pub use secret::{
    SecretEncoding, SecretGenerator, SecretPolicy, SecretValue, Sensitive, provision,
};

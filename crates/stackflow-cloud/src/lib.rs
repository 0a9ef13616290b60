//! Stackflow Cloud
//!
//! This crate defines the provider boundary the provisioning core is built
//! on: a `ResourceProvider` creates a resource from a fully resolved request
//! and reports the attributes downstream resources consume.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 stackflow-lago                   │
//! │        (components + orchestrator)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 stackflow-core                   │
//! │  DeferredValue · graph builder · executor        │
//! └─────────────────┬───────────────────────────────┘
//!                   │ trait ResourceProvider
//! ┌─────────────────▼───────────────────────────────┐
//! │                stackflow-cloud                   │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ Plan/Report  │  │ MemoryProvider (preview) │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod memory;
pub mod provider;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyReport, Plan, PlanSummary, SkippedAction};
pub use error::{CloudError, Result};
pub use memory::{MemoryProvider, ResourceState, ResourceStatus};
pub use provider::{Attributes, ProvisionedResource, ResourceProvider, ResourceRequest};

//! Stackflow Lago
//!
//! Lago on AWS, composed from Stackflow components: a VPC with both
//! application load balancers, PostgreSQL and Redis, an ECS cluster with its
//! task role, an S3 bucket, and the API and frontend Fargate services.
//!
//! ```no_run
//! use stackflow_cloud::MemoryProvider;
//! use stackflow_config::StaticSource;
//! use stackflow_lago::LagoStack;
//! use std::sync::Arc;
//!
//! # async fn run() -> stackflow_core::Result<()> {
//! let source = StaticSource::new().with("lago_version", "1.2.0");
//! let stack = LagoStack::from_sources(&source)?;
//! println!("{}", stack.plan().summary());
//!
//! let deployment = stack.deploy(Arc::new(MemoryProvider::new("eu-west-2"))).await?;
//! for (key, value) in deployment.exports.iter() {
//!     println!("{}: {}", key, value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bucket;
pub mod cluster;
pub mod database;
pub mod frontend;
pub mod network;
pub mod service;
pub mod stack;

pub use backend::{Backend, BackendArgs, BackendKeys};
pub use bucket::{Bucket, BucketArgs};
pub use cluster::Cluster;
pub use database::{Db, DbArgs, Redis, RedisArgs};
pub use frontend::{Frontend, FrontendArgs};
pub use network::{Network, NetworkArgs};
pub use service::{FargateService, LogConfig, ServiceArgs};
pub use stack::{
    DB_PASSWORD, Deployment, EXPORT_API_URL, EXPORT_BUCKET, EXPORT_CLUSTER_NAME, EXPORT_FRONT_URL,
    EXPORT_SERVICE_NAME, EXPORT_VERSION, EXPORT_VPC_ID, LagoOutputs, LagoStack,
};

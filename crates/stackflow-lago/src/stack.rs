//! Lago stack
//!
//! Declares every component in dependency order and collects the exports:
//!
//! ```text
//! Network ─┬─► Db ─────┐
//!          ├─► Redis ──┤
//!          └─► Cluster ┴─► Bucket ─► Backend, Frontend ─► exports
//! ```

use crate::backend::{Backend, BackendArgs};
use crate::bucket::{Bucket, BucketArgs};
use crate::cluster::Cluster;
use crate::database::{Db, DbArgs, Redis, RedisArgs};
use crate::frontend::{Frontend, FrontendArgs};
use crate::network::{Network, NetworkArgs, ids};
use stackflow_cloud::{ApplyReport, Plan, ResourceProvider};
use stackflow_config::{ConfigSource, SecretSource, StackConfig};
use stackflow_core::{
    DeferredValue, ExportSet, Executor, ResolvedExports, Result, SecretPolicy, SecretValue,
    StackBuilder, StackError, StackGraph, concat, provision,
};
use std::sync::Arc;

pub const EXPORT_FRONT_URL: &str = "Lago Front URL";
pub const EXPORT_API_URL: &str = "Lago API URL";
pub const EXPORT_CLUSTER_NAME: &str = "ECS Cluster Name";
pub const EXPORT_VERSION: &str = "Lago Version";
pub const EXPORT_SERVICE_NAME: &str = "Service Name";
pub const EXPORT_VPC_ID: &str = "VPC ID";
pub const EXPORT_BUCKET: &str = "S3 Bucket";

/// Secret key of the database password.
pub const DB_PASSWORD: &str = "db_password";

/// Component handles and exports of a declared stack.
#[derive(Debug, Clone)]
pub struct LagoOutputs {
    pub network: Network,
    pub db: Db,
    pub redis: Redis,
    pub cluster: Cluster,
    pub bucket: Bucket,
    pub backend: Backend,
    pub frontend: Frontend,
    pub db_password: SecretValue,
    pub exports: ExportSet,
}

/// A declared, validated stack, ready to plan or deploy.
#[derive(Debug)]
pub struct LagoStack {
    graph: StackGraph,
    outputs: LagoOutputs,
}

/// Result of applying a stack.
#[derive(Debug)]
pub struct Deployment {
    pub report: ApplyReport,
    pub exports: ResolvedExports,
    pub outputs: LagoOutputs,
}

impl LagoStack {
    /// Load settings and secrets from one layered source and declare.
    pub fn from_sources<S>(source: &S) -> Result<Self>
    where
        S: ConfigSource + SecretSource,
    {
        let config = StackConfig::from_source(source)
            .map_err(|e| StackError::Configuration(e.to_string()))?;
        Self::declare(&config, source)
    }

    pub fn declare(config: &StackConfig, secrets: &dyn SecretSource) -> Result<Self> {
        let service = config.service_name.as_str();
        let mut stack = StackBuilder::new(service);
        tracing::debug!(service = %service, version = %config.lago_version, "Declaring stack");

        let network = Network::new(
            &mut stack,
            &format!("{}-net", service),
            NetworkArgs::from_config(config),
        )?;
        let subnet_ids = network.subnet_ids();

        let db_password = provision(
            &mut stack,
            DB_PASSWORD,
            secrets.secret(DB_PASSWORD),
            SecretPolicy::password(16).with_special("_%"),
        )?;
        let db = Db::new(
            &mut stack,
            &format!("{}-db", service),
            DbArgs {
                db_name: config.db_name.clone(),
                db_user: config.db_user.clone(),
                db_password: db_password.clone(),
                subnet_ids: subnet_ids.clone(),
                security_group_ids: ids(&[&network.rds_security_group]),
            },
        )?;
        let redis = Redis::new(
            &mut stack,
            &format!("{}-redis", service),
            RedisArgs {
                subnet_ids: subnet_ids.clone(),
                security_group_ids: ids(&[&network.redis_security_group]),
            },
        )?;
        let cluster = Cluster::new(&mut stack, &format!("{}-ecs", service))?;
        let bucket = Bucket::new(
            &mut stack,
            &format!("{}-bucket", service),
            BucketArgs {
                role_name: cluster.role_name(),
            },
        )?;

        let api_url = concat(vec!["http://".into(), network.back_dns().into()]);
        let front_url = concat(vec!["http://".into(), network.front_dns().into()]);
        let app_security_groups = ids(&[&network.app_security_group]);

        let backend = Backend::new(
            &mut stack,
            &format!("{}-be", service),
            BackendArgs {
                lago_version: config.lago_version.clone(),
                region: config.region.clone(),
                vpc_id: network.vpc_id(),
                subnet_ids: subnet_ids.clone(),
                security_group_ids: app_security_groups.clone(),
                cluster_arn: cluster.cluster_arn(),
                role_arn: cluster.role_arn(),
                load_balancer_arn: network.back_alb.output("arn"),
                api_url: api_url.clone(),
                front_url: front_url.clone(),
                db_host: db.host(),
                db_port: db.port(),
                db_name: db.database(),
                db_user: db.user(),
                db_password: db_password.clone(),
                redis_host: redis.host(),
                redis_port: redis.port(),
                bucket_name: bucket.bucket_name(),
            },
        )?;
        let frontend = Frontend::new(
            &mut stack,
            &format!("{}-front", service),
            FrontendArgs {
                lago_version: config.lago_version.clone(),
                region: config.region.clone(),
                vpc_id: network.vpc_id(),
                subnet_ids,
                security_group_ids: app_security_groups,
                cluster_arn: cluster.cluster_arn(),
                role_arn: cluster.role_arn(),
                load_balancer_arn: network.front_alb.output("arn"),
                api_url,
                front_url,
            },
        )?;

        let mut exports = ExportSet::new();
        exports
            .export(EXPORT_FRONT_URL, &frontend.endpoint())?
            .export(EXPORT_API_URL, &backend.endpoint())?
            .export(EXPORT_CLUSTER_NAME, &cluster.cluster_name())?
            .export(
                EXPORT_VERSION,
                &DeferredValue::known(config.lago_version.clone()),
            )?
            .export(
                EXPORT_SERVICE_NAME,
                &DeferredValue::known(config.service_name.clone()),
            )?
            .export(EXPORT_VPC_ID, &network.vpc_id())?
            .export(EXPORT_BUCKET, &bucket.bucket_name())?;

        let graph = stack.build()?;
        tracing::debug!(
            resources = graph.len(),
            components = graph.components().len(),
            "Stack declared"
        );

        Ok(Self {
            graph,
            outputs: LagoOutputs {
                network,
                db,
                redis,
                cluster,
                bucket,
                backend,
                frontend,
                db_password,
                exports,
            },
        })
    }

    pub fn graph(&self) -> &StackGraph {
        &self.graph
    }

    pub fn outputs(&self) -> &LagoOutputs {
        &self.outputs
    }

    pub fn plan(&self) -> Plan {
        self.graph.plan()
    }

    /// Apply against `provider` and collect the exports. Provider failures
    /// are reported in the deployment, not returned as errors.
    pub async fn deploy(self, provider: Arc<dyn ResourceProvider>) -> Result<Deployment> {
        let Self { graph, outputs } = self;
        tracing::info!(
            stack = %graph.name(),
            provider = %provider.name(),
            "Deploying stack"
        );

        let report = Executor::new(provider).apply(graph).await?;
        let exports = outputs.exports.resolve()?;
        if report.is_success() {
            tracing::info!(
                created = report.succeeded.len(),
                duration_ms = report.duration_ms,
                "Stack deployed"
            );
        } else {
            tracing::warn!(
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                unavailable = exports.unavailable().len(),
                "Stack partially deployed"
            );
        }

        Ok(Deployment {
            report,
            exports,
            outputs,
        })
    }
}

//! Lago web frontend
//!
//! A single Fargate task behind the frontend load balancer, pointed at the
//! public API URL.

use crate::service::{FargateService, LogConfig, ServiceArgs};
use stackflow_core::{
    Component, ComponentInfo, DeferredValue, Environment, OutputPort, Result, StackBuilder,
};

pub const TYPE_TAG: &str = "lago:frontend:Frontend";

pub const FRONT_PORT: u16 = 80;

#[derive(Debug, Clone)]
pub struct FrontendArgs {
    pub lago_version: String,
    pub region: String,
    pub vpc_id: DeferredValue<String>,
    pub subnet_ids: DeferredValue<Vec<String>>,
    pub security_group_ids: DeferredValue<Vec<String>>,
    pub cluster_arn: DeferredValue<String>,
    pub role_arn: DeferredValue<String>,
    pub load_balancer_arn: DeferredValue<String>,
    pub api_url: DeferredValue<String>,
    /// Public URL of this service.
    pub front_url: DeferredValue<String>,
}

#[derive(Debug, Clone)]
pub struct Frontend {
    info: ComponentInfo,
    pub service: FargateService,
    environment: Environment,
    front_url: DeferredValue<String>,
}

impl Frontend {
    pub fn new(stack: &mut StackBuilder, name: &str, args: FrontendArgs) -> Result<Self> {
        let (info, frontend) = stack.component(TYPE_TAG, name, |stack| {
            let mut environment = Environment::new();
            environment
                .set("APP_ENV", "production")?
                .value("API_URL", &args.api_url)?
                .value("CODEGEN_API", &args.api_url)?;

            let service = FargateService::declare(
                stack,
                &ServiceArgs {
                    prefix: name.to_string(),
                    vpc_id: args.vpc_id.clone(),
                    subnet_ids: args.subnet_ids.clone(),
                    security_group_ids: args.security_group_ids.clone(),
                    cluster_arn: args.cluster_arn.clone(),
                    role_arn: args.role_arn.clone(),
                    load_balancer_arn: args.load_balancer_arn.clone(),
                    image: format!("getlago/front:v{}", args.lago_version),
                    container_port: FRONT_PORT,
                    health_check_path: None,
                    cpu: 256,
                    memory: 512,
                    task_role: true,
                    log: Some(LogConfig {
                        group: format!("/ecs/{}-task", name),
                        region: args.region.clone(),
                    }),
                    environment: environment.clone(),
                },
            )?;

            Ok(Self {
                info: ComponentInfo::default(),
                service,
                environment,
                front_url: args.front_url.clone(),
            })
        })?;
        Ok(Self { info, ..frontend })
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn endpoint(&self) -> DeferredValue<String> {
        self.service.endpoint(&self.front_url)
    }
}

impl Component for Frontend {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![
            OutputPort::of("endpoint", &self.endpoint()),
            OutputPort::of("environment", &self.environment.resolved()),
        ]
    }
}

//! Load-balanced Fargate service
//!
//! Target group, listener, task definition and ECS service, shared by the
//! backend and frontend components. The listener is attached to a load
//! balancer declared by the network.

use serde_json::{Value, json};
use stackflow_core::{
    DeferredValue, Environment, ResourceDecl, ResourceHandle, Result, Spec, StackBuilder,
};

const LISTENER_PORT: u16 = 80;

/// awslogs driver settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub group: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct ServiceArgs {
    /// Prefix of every resource name (`lago-be-api`, `lago-front`).
    pub prefix: String,
    pub vpc_id: DeferredValue<String>,
    pub subnet_ids: DeferredValue<Vec<String>>,
    pub security_group_ids: DeferredValue<Vec<String>>,
    pub cluster_arn: DeferredValue<String>,
    pub role_arn: DeferredValue<String>,
    pub load_balancer_arn: DeferredValue<String>,
    pub image: String,
    pub container_port: u16,
    pub health_check_path: Option<String>,
    pub cpu: u32,
    pub memory: u32,
    /// Also run the task under the execution role.
    pub task_role: bool,
    pub log: Option<LogConfig>,
    pub environment: Environment,
}

#[derive(Debug, Clone)]
pub struct FargateService {
    pub target_group: ResourceHandle,
    pub listener: ResourceHandle,
    pub task_definition: ResourceHandle,
    pub service: ResourceHandle,
}

impl FargateService {
    pub fn declare(stack: &mut StackBuilder, args: &ServiceArgs) -> Result<Self> {
        let prefix = &args.prefix;

        let mut health_check = json!({
            "healthy_threshold": 2,
            "interval": 5,
            "timeout": 4,
            "protocol": "HTTP",
            "matcher": "200-399",
        });
        if let Some(path) = &args.health_check_path {
            health_check["path"] = Value::String(path.clone());
        }
        let target_group = stack.resource(
            &format!("{}-tg", prefix),
            "aws:lb:TargetGroup",
            Spec::new()
                .set("port", args.container_port)
                .set("protocol", "HTTP")
                .set("target_type", "ip")
                .input("vpc_id", &args.vpc_id)
                .set("health_check", health_check),
        )?;
        let target_group_arn = target_group.output::<String>("arn");

        let listener = stack.resource(
            &format!("{}-listener", prefix),
            "aws:lb:Listener",
            Spec::new()
                .input("load_balancer_arn", &args.load_balancer_arn)
                .set("port", LISTENER_PORT)
                .input(
                    "default_actions",
                    &target_group_arn
                        .map(|arn| json!([{ "type": "forward", "target_group_arn": arn }])),
                ),
        )?;

        let container_name = format!("{}-container", prefix);
        let definitions = container_definitions(&container_name, args);
        let mut task_spec = Spec::new()
            .set("family", format!("{}-task", prefix))
            .set("cpu", args.cpu.to_string())
            .set("memory", args.memory.to_string())
            .set("network_mode", "awsvpc")
            .set("requires_compatibilities", json!(["FARGATE"]))
            .input("execution_role_arn", &args.role_arn)
            .input("container_definitions", &definitions);
        if args.task_role {
            task_spec = task_spec.input("task_role_arn", &args.role_arn);
        }
        let task_definition = stack.resource(
            &format!("{}-task", prefix),
            "aws:ecs:TaskDefinition",
            task_spec,
        )?;

        let network_configuration = DeferredValue::combine2(
            &args.subnet_ids,
            &args.security_group_ids,
            |subnets, groups| {
                json!({
                    "assign_public_ip": true,
                    "subnets": subnets,
                    "security_groups": groups,
                })
            },
        );
        let container_port = args.container_port;
        let load_balancers = target_group_arn.map(move |arn| {
            json!([{
                "target_group_arn": arn,
                "container_name": container_name,
                "container_port": container_port,
            }])
        });
        let service = stack.declare(
            ResourceDecl::new(format!("{}-svc", prefix), "aws:ecs:Service")
                .spec(
                    Spec::new()
                        .input("cluster", &args.cluster_arn)
                        .set("desired_count", 1)
                        .set("launch_type", "FARGATE")
                        .input("task_definition", &task_definition.output::<String>("arn"))
                        .input("network_configuration", &network_configuration)
                        .input("load_balancers", &load_balancers),
                )
                .depends_on(&listener),
        )?;

        Ok(Self {
            target_group,
            listener,
            task_definition,
            service,
        })
    }

    /// `url` once the service exists.
    pub fn endpoint(&self, url: &DeferredValue<String>) -> DeferredValue<String> {
        DeferredValue::combine2(&self.service.provider_id(), url, |_, url| url)
    }
}

/// The single-container definition list, serialized as ECS expects.
fn container_definitions(container_name: &str, args: &ServiceArgs) -> DeferredValue<String> {
    let mut container = json!({
        "name": container_name,
        "image": args.image,
        "portMappings": [{
            "containerPort": args.container_port,
            "hostPort": args.container_port,
            "protocol": "tcp",
        }],
    });
    if let Some(log) = &args.log {
        container["logConfiguration"] = json!({
            "logDriver": "awslogs",
            "options": {
                "awslogs-create-group": "true",
                "awslogs-group": log.group,
                "awslogs-region": log.region,
                "awslogs-stream-prefix": "ecs",
            },
        });
    }

    args.environment
        .to_container_environment()
        .map(move |environment| {
            container["environment"] = environment;
            Value::Array(vec![container]).to_string()
        })
}

//! ECS cluster and the task role its services run under

use serde_json::json;
use stackflow_core::{
    Component, ComponentInfo, DeferredValue, OutputPort, ResourceDecl, ResourceHandle, Result,
    Spec, StackBuilder,
};

pub const TYPE_TAG: &str = "lago:cluster:Cluster";

/// Managed policies attached to the task role, by resource suffix.
const MANAGED_POLICIES: [(&str, &str); 2] = [
    (
        "task-policy",
        "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy",
    ),
    ("logs-policy", "arn:aws:iam::aws:policy/CloudWatchLogsFullAccess"),
];

#[derive(Debug, Clone)]
pub struct Cluster {
    info: ComponentInfo,
    pub cluster: ResourceHandle,
    pub role: ResourceHandle,
    pub attachments: Vec<ResourceHandle>,
}

impl Cluster {
    pub fn new(stack: &mut StackBuilder, name: &str) -> Result<Self> {
        let (info, (cluster, role, attachments)) = stack.component(TYPE_TAG, name, |stack| {
            let cluster = stack.resource(name, "aws:ecs:Cluster", Spec::new())?;

            let trust_policy = json!({
                "Version": "2008-10-17",
                "Statement": [{
                    "Sid": "",
                    "Effect": "Allow",
                    "Principal": { "Service": "ecs-tasks.amazonaws.com" },
                    "Action": "sts:AssumeRole",
                }],
            });
            // Services need both; the role is only created once the cluster is.
            let role = stack.declare(
                ResourceDecl::new(format!("{}-task-role", name), "aws:iam:Role")
                    .spec(Spec::new().set("assume_role_policy", trust_policy.to_string()))
                    .depends_on(&cluster),
            )?;

            let role_name = role.output::<String>("name");
            let mut attachments = Vec::with_capacity(MANAGED_POLICIES.len());
            for (suffix, policy_arn) in MANAGED_POLICIES {
                attachments.push(stack.resource(
                    &format!("{}-{}", name, suffix),
                    "aws:iam:RolePolicyAttachment",
                    Spec::new()
                        .input("role", &role_name)
                        .set("policy_arn", policy_arn),
                )?);
            }
            Ok((cluster, role, attachments))
        })?;

        Ok(Self {
            info,
            cluster,
            role,
            attachments,
        })
    }

    pub fn cluster_arn(&self) -> DeferredValue<String> {
        self.cluster.output("arn")
    }

    pub fn cluster_name(&self) -> DeferredValue<String> {
        self.cluster.output("name")
    }

    pub fn role_arn(&self) -> DeferredValue<String> {
        self.role.output("arn")
    }

    pub fn role_name(&self) -> DeferredValue<String> {
        self.role.output("name")
    }
}

impl Component for Cluster {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![
            OutputPort::of("cluster_arn", &self.cluster_arn()),
            OutputPort::of("cluster_name", &self.cluster_name()),
            OutputPort::of("role_arn", &self.role_arn()),
            OutputPort::of("role_name", &self.role_name()),
        ]
    }
}

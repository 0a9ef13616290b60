//! VPC, subnets, security groups and both load balancers
//!
//! The two application load balancers are declared here rather than by the
//! services that register with them. Backend and Frontend each need the
//! other's public URL; with the balancers created up front both URLs exist
//! before either service is declared, so no reciprocal edge is needed.

use serde_json::{Value, json};
use stackflow_config::{Cidr, StackConfig};
use stackflow_core::{
    Component, ComponentInfo, DeferredValue, OutputPort, ResourceHandle, Result, Spec,
    StackBuilder,
};

pub const TYPE_TAG: &str = "lago:network:Network";

const ZONES: [char; 3] = ['a', 'b', 'c'];

#[derive(Debug, Clone)]
pub struct NetworkArgs {
    pub cidr: Cidr,
    pub subnets: Vec<Cidr>,
    pub region: String,
}

impl NetworkArgs {
    pub fn from_config(config: &StackConfig) -> Self {
        Self {
            cidr: config.vpc_cidr,
            subnets: config.subnet_cidrs(),
            region: config.region.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Network {
    info: ComponentInfo,
    pub vpc: ResourceHandle,
    pub subnets: Vec<ResourceHandle>,
    pub app_security_group: ResourceHandle,
    pub rds_security_group: ResourceHandle,
    pub redis_security_group: ResourceHandle,
    pub front_lb_security_group: ResourceHandle,
    pub back_lb_security_group: ResourceHandle,
    pub front_alb: ResourceHandle,
    pub back_alb: ResourceHandle,
}

fn egress_all() -> Value {
    json!([{
        "protocol": "-1",
        "from_port": 0,
        "to_port": 0,
        "cidr_blocks": ["0.0.0.0/0"],
    }])
}

fn public_http() -> Value {
    json!([{
        "protocol": "tcp",
        "from_port": 80,
        "to_port": 80,
        "cidr_blocks": ["0.0.0.0/0"],
    }])
}

/// Ingress on `ports` from the given security groups.
fn ingress_from(groups: &DeferredValue<Vec<String>>, ports: &'static [u16]) -> DeferredValue<Value> {
    groups.map(move |groups| {
        Value::Array(
            ports
                .iter()
                .map(|port| {
                    json!({
                        "protocol": "tcp",
                        "from_port": port,
                        "to_port": port,
                        "security_groups": groups,
                    })
                })
                .collect(),
        )
    })
}

/// Provider ids of `handles`, as one list.
pub fn ids(handles: &[&ResourceHandle]) -> DeferredValue<Vec<String>> {
    let ids: Vec<DeferredValue<String>> = handles.iter().map(|h| h.provider_id()).collect();
    DeferredValue::all(&ids)
}

impl Network {
    pub fn new(stack: &mut StackBuilder, name: &str, args: NetworkArgs) -> Result<Self> {
        let (info, network) = stack.component(TYPE_TAG, name, |stack| {
            Self::declare(stack, name, args)
        })?;
        Ok(Self { info, ..network })
    }

    fn declare(stack: &mut StackBuilder, name: &str, args: NetworkArgs) -> Result<Self> {
        let vpc = stack.resource(
            &format!("{}-vpc", name),
            "aws:ec2:Vpc",
            Spec::new()
                .set("cidr_block", args.cidr.to_string())
                .set("enable_dns_hostnames", true)
                .set("enable_dns_support", true)
                .set("tags", json!({ "Name": format!("{}-vpc", name) })),
        )?;
        let vpc_id = vpc.provider_id();

        let igw = stack.resource(
            &format!("{}-igw", name),
            "aws:ec2:InternetGateway",
            Spec::new().input("vpc_id", &vpc_id),
        )?;
        let route_table = stack.resource(
            &format!("{}-rt", name),
            "aws:ec2:RouteTable",
            Spec::new().input("vpc_id", &vpc_id).input(
                "routes",
                &igw.provider_id()
                    .map(|gateway| json!([{ "cidr_block": "0.0.0.0/0", "gateway_id": gateway }])),
            ),
        )?;

        let mut subnets = Vec::with_capacity(args.subnets.len());
        for (i, cidr) in args.subnets.iter().enumerate() {
            let zone = format!("{}{}", args.region, ZONES[i % ZONES.len()]);
            let subnet_name = format!("{}-subnet-{}", name, i);
            let subnet = stack.resource(
                &subnet_name,
                "aws:ec2:Subnet",
                Spec::new()
                    .input("vpc_id", &vpc_id)
                    .set("cidr_block", cidr.to_string())
                    .set("availability_zone", zone)
                    .set("map_public_ip_on_launch", true)
                    .set("tags", json!({ "Name": subnet_name })),
            )?;
            stack.resource(
                &format!("{}-rta-{}", name, i),
                "aws:ec2:RouteTableAssociation",
                Spec::new()
                    .input("route_table_id", &route_table.provider_id())
                    .input("subnet_id", &subnet.provider_id()),
            )?;
            subnets.push(subnet);
        }

        let security_group = |stack: &mut StackBuilder,
                              suffix: &str,
                              description: &str,
                              ingress: &DeferredValue<Value>|
         -> Result<ResourceHandle> {
            stack.resource(
                &format!("{}-{}-sg", name, suffix),
                "aws:ec2:SecurityGroup",
                Spec::new()
                    .input("vpc_id", &vpc_id)
                    .set("description", description)
                    .input("ingress", ingress)
                    .set("egress", egress_all()),
            )
        };

        let public = DeferredValue::known(public_http());
        let front_lb_security_group =
            security_group(stack, "front-lb", "Public HTTP to the front load balancer", &public)?;
        let back_lb_security_group =
            security_group(stack, "back-lb", "Public HTTP to the API load balancer", &public)?;

        let balancers = ids(&[&front_lb_security_group, &back_lb_security_group]);
        let app_security_group = security_group(
            stack,
            "app",
            "Load balancer traffic to the containers",
            &ingress_from(&balancers, &[80, 3000]),
        )?;

        let app = ids(&[&app_security_group]);
        let rds_security_group = security_group(
            stack,
            "rds",
            "PostgreSQL from the containers",
            &ingress_from(&app, &[5432]),
        )?;
        let redis_security_group = security_group(
            stack,
            "redis",
            "Redis from the containers",
            &ingress_from(&app, &[6379]),
        )?;

        let subnet_refs: Vec<&ResourceHandle> = subnets.iter().collect();
        let subnet_ids = ids(&subnet_refs);
        let load_balancer = |stack: &mut StackBuilder,
                             suffix: &str,
                             group: &ResourceHandle|
         -> Result<ResourceHandle> {
            stack.resource(
                &format!("{}-{}-alb", name, suffix),
                "aws:lb:LoadBalancer",
                Spec::new()
                    .set("load_balancer_type", "application")
                    .set("internal", false)
                    .input("subnets", &subnet_ids)
                    .input("security_groups", &ids(&[group])),
            )
        };
        let front_alb = load_balancer(stack, "front", &front_lb_security_group)?;
        let back_alb = load_balancer(stack, "back", &back_lb_security_group)?;

        Ok(Self {
            info: ComponentInfo::default(),
            vpc,
            subnets,
            app_security_group,
            rds_security_group,
            redis_security_group,
            front_lb_security_group,
            back_lb_security_group,
            front_alb,
            back_alb,
        })
    }

    pub fn vpc_id(&self) -> DeferredValue<String> {
        self.vpc.provider_id()
    }

    /// Subnet ids in declaration order.
    pub fn subnet_ids(&self) -> DeferredValue<Vec<String>> {
        let refs: Vec<&ResourceHandle> = self.subnets.iter().collect();
        ids(&refs)
    }

    pub fn front_dns(&self) -> DeferredValue<String> {
        self.front_alb.output("dns_name")
    }

    pub fn back_dns(&self) -> DeferredValue<String> {
        self.back_alb.output("dns_name")
    }
}

impl Component for Network {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![
            OutputPort::of("vpc_id", &self.vpc_id()),
            OutputPort::of("subnet_ids", &self.subnet_ids()),
            OutputPort::of("app_security_group_id", &self.app_security_group.provider_id()),
            OutputPort::of("rds_security_group_id", &self.rds_security_group.provider_id()),
            OutputPort::of("redis_security_group_id", &self.redis_security_group.provider_id()),
            OutputPort::of("front_dns_name", &self.front_dns()),
            OutputPort::of("back_dns_name", &self.back_dns()),
        ]
    }
}

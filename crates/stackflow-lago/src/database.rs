//! PostgreSQL (RDS) and Redis (ElastiCache)

use stackflow_core::{
    Component, ComponentInfo, DeferredValue, OutputPort, ResourceHandle, Result, SecretValue,
    Spec, StackBuilder,
};

pub const DB_TYPE_TAG: &str = "lago:database:Db";
pub const REDIS_TYPE_TAG: &str = "lago:database:Redis";

pub const POSTGRES_PORT: u16 = 5432;
pub const REDIS_PORT: u16 = 6379;

#[derive(Debug, Clone)]
pub struct DbArgs {
    pub db_name: String,
    pub db_user: String,
    pub db_password: SecretValue,
    pub subnet_ids: DeferredValue<Vec<String>>,
    pub security_group_ids: DeferredValue<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Db {
    info: ComponentInfo,
    pub subnet_group: ResourceHandle,
    pub instance: ResourceHandle,
}

impl Db {
    pub fn new(stack: &mut StackBuilder, name: &str, args: DbArgs) -> Result<Self> {
        let (info, (subnet_group, instance)) = stack.component(DB_TYPE_TAG, name, |stack| {
            let subnet_group = stack.resource(
                &format!("{}-subnet-group", name),
                "aws:rds:SubnetGroup",
                Spec::new().input("subnet_ids", &args.subnet_ids),
            )?;
            let instance = stack.resource(
                name,
                "aws:rds:Instance",
                Spec::new()
                    .set("engine", "postgres")
                    .set("engine_version", "14")
                    .set("instance_class", "db.t3.micro")
                    .set("allocated_storage", 20)
                    .set("port", POSTGRES_PORT)
                    .set("db_name", args.db_name.as_str())
                    .set("username", args.db_user.as_str())
                    .secret("password", &args.db_password)
                    .input("db_subnet_group_name", &subnet_group.output::<String>("name"))
                    .input("vpc_security_group_ids", &args.security_group_ids)
                    .set("publicly_accessible", false)
                    .set("skip_final_snapshot", true),
            )?;
            Ok((subnet_group, instance))
        })?;

        Ok(Self {
            info,
            subnet_group,
            instance,
        })
    }

    pub fn host(&self) -> DeferredValue<String> {
        self.instance.output("address")
    }

    pub fn port(&self) -> DeferredValue<u16> {
        self.instance.output("port")
    }

    pub fn user(&self) -> DeferredValue<String> {
        self.instance.output("username")
    }

    pub fn database(&self) -> DeferredValue<String> {
        self.instance.output("db_name")
    }
}

impl Component for Db {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![
            OutputPort::of("host", &self.host()),
            OutputPort::of("port", &self.port()),
            OutputPort::of("user", &self.user()),
            OutputPort::of("database", &self.database()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct RedisArgs {
    pub subnet_ids: DeferredValue<Vec<String>>,
    pub security_group_ids: DeferredValue<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Redis {
    info: ComponentInfo,
    pub subnet_group: ResourceHandle,
    pub cluster: ResourceHandle,
}

impl Redis {
    pub fn new(stack: &mut StackBuilder, name: &str, args: RedisArgs) -> Result<Self> {
        let (info, (subnet_group, cluster)) = stack.component(REDIS_TYPE_TAG, name, |stack| {
            let subnet_group = stack.resource(
                &format!("{}-subnet-group", name),
                "aws:elasticache:SubnetGroup",
                Spec::new().input("subnet_ids", &args.subnet_ids),
            )?;
            let cluster = stack.resource(
                name,
                "aws:elasticache:Cluster",
                Spec::new()
                    .set("engine", "redis")
                    .set("node_type", "cache.t3.micro")
                    .set("num_cache_nodes", 1)
                    .set("port", REDIS_PORT)
                    .input("subnet_group_name", &subnet_group.output::<String>("name"))
                    .input("security_group_ids", &args.security_group_ids),
            )?;
            Ok((subnet_group, cluster))
        })?;

        Ok(Self {
            info,
            subnet_group,
            cluster,
        })
    }

    /// Address of the first cache node.
    pub fn host(&self) -> DeferredValue<String> {
        self.cluster.output("/cache_nodes/0/address")
    }

    pub fn port(&self) -> DeferredValue<u16> {
        self.cluster.output("/cache_nodes/0/port")
    }
}

impl Component for Redis {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![
            OutputPort::of("host", &self.host()),
            OutputPort::of("port", &self.port()),
        ]
    }
}

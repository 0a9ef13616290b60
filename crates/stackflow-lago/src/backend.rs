//! Lago API service
//!
//! Declares the key material the API needs, assembles its environment from
//! the data stores, bucket and both public URLs, and runs it as a Fargate
//! service behind the backend load balancer.

use crate::service::{FargateService, ServiceArgs};
use stackflow_core::{
    Component, ComponentInfo, ConnectionString, DeferredValue, Environment, OutputPort,
    ResourceHandle, Result, SecretEncoding, SecretPolicy, SecretValue, Spec, StackBuilder,
};

pub const TYPE_TAG: &str = "lago:backend:Backend";

pub const API_PORT: u16 = 3000;
const CPU: u32 = 1024;
const MEMORY: u32 = 2048;

#[derive(Debug, Clone)]
pub struct BackendArgs {
    pub lago_version: String,
    pub region: String,
    pub vpc_id: DeferredValue<String>,
    pub subnet_ids: DeferredValue<Vec<String>>,
    pub security_group_ids: DeferredValue<Vec<String>>,
    pub cluster_arn: DeferredValue<String>,
    pub role_arn: DeferredValue<String>,
    pub load_balancer_arn: DeferredValue<String>,
    /// Public URL of this service.
    pub api_url: DeferredValue<String>,
    /// Public URL of the frontend.
    pub front_url: DeferredValue<String>,
    pub db_host: DeferredValue<String>,
    pub db_port: DeferredValue<u16>,
    pub db_name: DeferredValue<String>,
    pub db_user: DeferredValue<String>,
    pub db_password: SecretValue,
    pub redis_host: DeferredValue<String>,
    pub redis_port: DeferredValue<u16>,
    pub bucket_name: DeferredValue<String>,
}

/// Key material handed to the API, base64-encoded.
#[derive(Debug, Clone)]
pub struct BackendKeys {
    pub private_key: ResourceHandle,
    pub rsa_private_key: SecretValue,
    pub secret_key_base: SecretValue,
    pub encryption_primary_key: SecretValue,
    pub encryption_deterministic_key: SecretValue,
    pub encryption_key_derivation_salt: SecretValue,
}

impl BackendKeys {
    fn declare(stack: &mut StackBuilder, name: &str) -> Result<Self> {
        let private_key = stack.resource(
            &format!("{}-private-key", name),
            "tls:index:PrivateKey",
            Spec::new().set("algorithm", "RSA").set("rsa_bits", 2048),
        )?;
        let rsa_private_key = private_key
            .secret_output("private_key_pem")
            .encoded(SecretEncoding::Base64);

        let mut generate = |suffix: &str, length: usize| -> Result<SecretValue> {
            let secret =
                stack.generate_secret(&format!("{}-{}", name, suffix), SecretPolicy::alphanumeric(length))?;
            Ok(secret.encoded(SecretEncoding::Base64))
        };
        let secret_key_base = generate("secret-key-base", 64)?;
        let encryption_deterministic_key = generate("encryption-deterministic-key", 32)?;
        let encryption_key_derivation_salt = generate("encryption-key-derivation-salt", 32)?;
        let encryption_primary_key = generate("encryption-primary-key", 32)?;

        Ok(Self {
            private_key,
            rsa_private_key,
            secret_key_base,
            encryption_primary_key,
            encryption_deterministic_key,
            encryption_key_derivation_salt,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Backend {
    info: ComponentInfo,
    pub keys: BackendKeys,
    pub service: FargateService,
    environment: Environment,
    api_url: DeferredValue<String>,
}

fn environment(args: &BackendArgs, keys: &BackendKeys) -> Result<Environment> {
    let database_url = ConnectionString::new("postgres", &args.db_host, &args.db_port)
        .user(&args.db_user)
        .password(&args.db_password)
        .database(&args.db_name)
        .build();
    let redis_url = ConnectionString::new("redis", &args.redis_host, &args.redis_port).build();

    let mut env = Environment::new();
    env.set("RAILS_ENV", "production")?
        .value("DATABASE_URL", &database_url)?
        .value("REDIS_URL", &redis_url)?
        .value("REDIS_CACHE_URL", &redis_url)?
        .set("LAGO_SIDEKIQ_WEB", "true")?
        .set("RAILS_LOG_TO_STDOUT", "true")?
        .secret("LAGO_RSA_PRIVATE_KEY", &keys.rsa_private_key)?
        .secret("SECRET_KEY_BASE", &keys.secret_key_base)?
        .secret("LAGO_ENCRYPTION_PRIMARY_KEY", &keys.encryption_primary_key)?
        .secret(
            "LAGO_ENCRYPTION_DETERMINISTIC_KEY",
            &keys.encryption_deterministic_key,
        )?
        .secret(
            "LAGO_ENCRYPTION_KEY_DERIVATION_SALT",
            &keys.encryption_key_derivation_salt,
        )?
        .set("LAGO_DISABLE_SEGMENT", "true")?
        .set("LAGO_DISABLE_SIGNUP", "false")?
        .set("DATABASE_POOL", "10")?
        .set("RAILS_MAX_THREADS", "5")?
        .set("RAILS_MIN_THREADS", "0")?
        .set("SIDEKIQ_EVENTS", "true")?
        .set("WEB_CONCURRENCY", "2")?
        .value("LAGO_API_URL", &args.api_url)?
        .value("LAGO_FRONT_URL", &args.front_url)?
        .set("LAGO_USE_AWS_S3", "true")?
        .value("LAGO_AWS_S3_BUCKET", &args.bucket_name)?
        .set("LAGO_AWS_S3_REGION", args.region.as_str())?;
    Ok(env)
}

impl Backend {
    pub fn new(stack: &mut StackBuilder, name: &str, args: BackendArgs) -> Result<Self> {
        let (info, backend) = stack.component(TYPE_TAG, name, |stack| {
            let keys = BackendKeys::declare(stack, name)?;
            let environment = environment(&args, &keys)?;

            let service = FargateService::declare(
                stack,
                &ServiceArgs {
                    prefix: format!("{}-api", name),
                    vpc_id: args.vpc_id.clone(),
                    subnet_ids: args.subnet_ids.clone(),
                    security_group_ids: args.security_group_ids.clone(),
                    cluster_arn: args.cluster_arn.clone(),
                    role_arn: args.role_arn.clone(),
                    load_balancer_arn: args.load_balancer_arn.clone(),
                    image: format!("getlago/api:v{}", args.lago_version),
                    container_port: API_PORT,
                    health_check_path: Some("/health".to_string()),
                    cpu: CPU,
                    memory: MEMORY,
                    // The bucket policy is attached to this role; the API
                    // reaches S3 through it.
                    task_role: true,
                    log: None,
                    environment: environment.clone(),
                },
            )?;
            tracing::debug!(
                component = %name,
                variables = environment.len(),
                "Declared API service"
            );

            Ok(Self {
                info: ComponentInfo::default(),
                keys,
                service,
                environment,
                api_url: args.api_url.clone(),
            })
        })?;
        Ok(Self { info, ..backend })
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Public API URL, available once the service is running.
    pub fn endpoint(&self) -> DeferredValue<String> {
        self.service.endpoint(&self.api_url)
    }
}

impl Component for Backend {
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

use stackflow_cloud::{ActionType, MemoryProvider};
use stackflow_config::StaticSource;
use stackflow_core::{
    Component, DependencyEdge, ExportSet, ResourceDecl, ResourceId, SecretEncoding, Spec,
    StackBuilder, StackError,
};
use stackflow_lago::network::{Network, NetworkArgs};
use stackflow_lago::{
    Deployment, EXPORT_API_URL, EXPORT_BUCKET, EXPORT_CLUSTER_NAME, EXPORT_FRONT_URL,
    EXPORT_SERVICE_NAME, EXPORT_VERSION, EXPORT_VPC_ID, LagoStack,
};
use std::sync::Arc;

fn source() -> StaticSource {
    StaticSource::new().with("lago_version", "v1.2.0")
}

async fn deploy(source: &StaticSource, provider: &Arc<MemoryProvider>) -> Deployment {
    LagoStack::from_sources(source)
        .unwrap()
        .deploy(provider.clone())
        .await
        .unwrap()
}

fn resolved(value: &stackflow_core::DeferredValue<String>) -> String {
    value.peek().unwrap().unwrap()
}

#[tokio::test]
async fn test_database_receives_every_subnet() {
    for count in ["1", "2", "3"] {
        let provider = Arc::new(MemoryProvider::new("eu-west-2"));
        let deployment = deploy(&source().with("subnet_count", count), &provider).await;
        assert!(deployment.report.is_success());

        let group = provider.find("lago-db-subnet-group").await.unwrap();
        let subnet_ids = group.attributes["subnet_ids"].as_array().unwrap();
        assert_eq!(subnet_ids.len().to_string(), count);

        let declared = deployment
            .outputs
            .network
            .subnet_ids()
            .peek()
            .unwrap()
            .unwrap();
        let received: Vec<&str> = subnet_ids.iter().filter_map(|id| id.as_str()).collect();
        assert_eq!(received, declared);
    }
}

#[tokio::test]
async fn test_subnets_are_carved_from_the_vpc_cidr() {
    let provider = Arc::new(MemoryProvider::new("eu-west-2"));
    deploy(&source(), &provider).await;

    let vpc = provider.find("lago-net-vpc").await.unwrap();
    assert_eq!(vpc.attributes["cidr_block"], "172.42.0.0/16");
    let first = provider.find("lago-net-subnet-0").await.unwrap();
    assert_eq!(first.attributes["cidr_block"], "172.42.1.0/24");
    assert_eq!(first.attributes["availability_zone"], "eu-west-2a");
    let second = provider.find("lago-net-subnet-1").await.unwrap();
    assert_eq!(second.attributes["cidr_block"], "172.42.2.0/24");
    assert_eq!(second.attributes["availability_zone"], "eu-west-2b");
}

#[tokio::test]
async fn test_generated_db_password_reaches_connection_string() {
    let provider = Arc::new(MemoryProvider::new("eu-west-2"));
    let stack = LagoStack::from_sources(&source()).unwrap();
    let plan = serde_json::to_string(&stack.plan()).unwrap();
    assert!(plan.contains("[secret]"));

    let deployment = stack.deploy(provider).await.unwrap();
    let password = deployment
        .outputs
        .db_password
        .peek()
        .unwrap()
        .unwrap()
        .into_revealed();
    assert_eq!(password.len(), 16);
    assert!(
        password
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '%')
    );

    let database_url = deployment
        .outputs
        .backend
        .environment()
        .get("DATABASE_URL")
        .unwrap();
    assert!(database_url.is_sensitive());
    let database_url = resolved(database_url);
    assert!(database_url.starts_with("postgres://lago:"));
    assert!(database_url.contains(&format!(":{}@", password)));
    assert!(database_url.ends_with(":5432/lago"));

    assert!(!plan.contains(&password));
    assert!(!format!("{:?}", deployment.outputs).contains(&password));
}

#[tokio::test]
async fn test_supplied_password_is_never_rendered() {
    let source = source().with_secret("db_password", "supplied_pw%42");
    let stack = LagoStack::from_sources(&source).unwrap();

    let plan = stack.plan();
    let generate = plan.actions_by_type(ActionType::Generate);
    assert!(generate.iter().all(|action| action.id != "db_password"));
    assert_eq!(generate.len(), 4);

    let instance = plan.actions.iter().find(|a| a.id == "lago-db").unwrap();
    assert_eq!(instance.details["password"], "[secret]");
    assert!(!serde_json::to_string(&plan).unwrap().contains("supplied_pw"));
    assert!(!format!("{:?}", stack).contains("supplied_pw"));

    let deployment = stack
        .deploy(Arc::new(MemoryProvider::new("eu-west-2")))
        .await
        .unwrap();
    let database_url = deployment.outputs.backend.environment().get("DATABASE_URL");
    assert!(resolved(database_url.unwrap()).contains(":supplied_pw%42@"));
}

#[tokio::test]
async fn test_services_reference_each_other() {
    let provider = Arc::new(MemoryProvider::new("eu-west-2"));
    let deployment = deploy(&source(), &provider).await;

    let dns = |attributes: &stackflow_cloud::Attributes| {
        attributes["dns_name"].as_str().unwrap().to_string()
    };
    let back_dns = dns(&provider.find("lago-net-back-alb").await.unwrap().attributes);
    let front_dns = dns(&provider.find("lago-net-front-alb").await.unwrap().attributes);

    let frontend = deployment.outputs.frontend.environment();
    let backend = deployment.outputs.backend.environment();
    assert_eq!(resolved(frontend.get("API_URL").unwrap()), format!("http://{}", back_dns));
    assert_eq!(resolved(frontend.get("CODEGEN_API").unwrap()), format!("http://{}", back_dns));
    assert_eq!(
        resolved(backend.get("LAGO_FRONT_URL").unwrap()),
        format!("http://{}", front_dns)
    );
    assert_eq!(
        resolved(backend.get("LAGO_API_URL").unwrap()),
        format!("http://{}", back_dns)
    );

    assert_eq!(
        deployment.exports.plain(EXPORT_API_URL),
        Some(format!("http://{}", back_dns).as_str())
    );
    assert_eq!(
        deployment.exports.plain(EXPORT_FRONT_URL),
        Some(format!("http://{}", front_dns).as_str())
    );
}

#[tokio::test]
async fn test_backend_environment_and_task_definition() {
    let provider = Arc::new(MemoryProvider::new("eu-west-2"));
    let deployment = deploy(&source(), &provider).await;

    let backend = deployment.outputs.backend.environment();
    assert_eq!(resolved(backend.get("LAGO_USE_AWS_S3").unwrap()), "true");
    assert_eq!(resolved(backend.get("LAGO_AWS_S3_REGION").unwrap()), "eu-west-2");
    assert_eq!(
        resolved(backend.get("REDIS_URL").unwrap()),
        resolved(backend.get("REDIS_CACHE_URL").unwrap())
    );
    assert!(resolved(backend.get("REDIS_URL").unwrap()).ends_with(":6379"));

    let pem = provider.find("lago-be-private-key").await.unwrap().attributes["private_key_pem"]
        .as_str()
        .unwrap()
        .to_string();
    let rsa = backend.get("LAGO_RSA_PRIVATE_KEY").unwrap();
    assert!(rsa.is_sensitive());
    assert_eq!(resolved(rsa), SecretEncoding::Base64.encode(&pem));

    let task = provider.find("lago-be-api-task").await.unwrap();
    let role = provider.find("lago-ecs-task-role").await.unwrap();
    assert_eq!(task.attributes["task_role_arn"], role.attributes["arn"]);
    assert_eq!(task.attributes["execution_role_arn"], role.attributes["arn"]);
    assert_eq!(task.attributes["cpu"], "1024");
    assert_eq!(task.attributes["memory"], "2048");
    let containers: serde_json::Value =
        serde_json::from_str(task.attributes["container_definitions"].as_str().unwrap()).unwrap();
    assert_eq!(containers[0]["name"], "lago-be-api-container");
    assert_eq!(containers[0]["image"], "getlago/api:v1.2.0");
    assert_eq!(containers[0]["portMappings"][0]["containerPort"], 3000);
    let environment = containers[0]["environment"].as_array().unwrap();
    assert_eq!(environment.len(), backend.len());

    let front_task = provider.find("lago-front-task").await.unwrap();
    let containers: serde_json::Value = serde_json::from_str(
        front_task.attributes["container_definitions"].as_str().unwrap(),
    )
    .unwrap();
    assert_eq!(containers[0]["image"], "getlago/front:v1.2.0");
    assert_eq!(
        containers[0]["logConfiguration"]["options"]["awslogs-group"],
        "/ecs/lago-front-task"
    );
}

#[tokio::test]
async fn test_exports_after_full_deploy() {
    let provider = Arc::new(MemoryProvider::new("eu-west-2"));
    let deployment = deploy(&source(), &provider).await;
    let exports = &deployment.exports;

    assert_eq!(exports.len(), 7);
    assert!(exports.unavailable().is_empty());
    assert_eq!(exports.plain(EXPORT_VERSION), Some("1.2.0"));
    assert_eq!(exports.plain(EXPORT_SERVICE_NAME), Some("lago"));
    assert_eq!(exports.plain(EXPORT_CLUSTER_NAME), Some("lago-ecs"));
    assert!(exports.plain(EXPORT_VPC_ID).unwrap().starts_with("vpc-"));
    assert!(exports.plain(EXPORT_BUCKET).unwrap().starts_with("lago-bucket-"));
}

#[tokio::test]
async fn test_cluster_failure_skips_services() {
    let provider = Arc::new(MemoryProvider::new("eu-west-2").fail_on("lago-ecs"));
    let deployment = deploy(&source(), &provider).await;
    let report = &deployment.report;

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failure("lago-ecs").is_some());

    for skipped in [
        "lago-ecs-task-role",
        "lago-be-api-task",
        "lago-be-api-svc",
        "lago-front-task",
        "lago-front-svc",
    ] {
        assert!(report.was_skipped(skipped), "{} was not skipped", skipped);
    }
    assert!(
        report
            .skipped
            .iter()
            .all(|skipped| skipped.blocked_by == "lago-ecs")
    );

    let requests = provider.requests().await;
    assert!(!requests.iter().any(|name| name.ends_with("-svc")));
    assert!(!requests.iter().any(|name| name.ends_with("-task")));

    assert!(report.was_created("lago-db"));
    assert!(report.was_created("lago-redis"));

    let exports = &deployment.exports;
    assert!(!exports.contains(EXPORT_API_URL));
    assert!(!exports.contains(EXPORT_FRONT_URL));
    assert!(!exports.contains(EXPORT_CLUSTER_NAME));
    assert!(exports.plain(EXPORT_VPC_ID).is_some());
    assert_eq!(exports.plain(EXPORT_VERSION), Some("1.2.0"));
}

#[test]
fn test_reciprocal_service_edges_are_rejected() {
    let mut stack = StackBuilder::new("lago");
    let config = stackflow_config::StackConfig::from_source(&source()).unwrap();
    let network = Network::new(&mut stack, "lago-net", NetworkArgs::from_config(&config)).unwrap();

    let backend = stack
        .resource(
            "lago-be-api-svc",
            "aws:ecs:Service",
            Spec::new().input("front_url", &network.front_dns()),
        )
        .unwrap();
    stack
        .declare(
            ResourceDecl::new("lago-front-svc", "aws:ecs:Service")
                .spec(Spec::new().input("api_url", &network.back_dns()))
                .depends_on(&backend),
        )
        .unwrap();
    stack.add_edge(DependencyEdge::new("lago-front-svc", "lago-be-api-svc"));

    match stack.build() {
        Err(StackError::Cycle(cycle)) => {
            let names: Vec<&str> = cycle.iter().map(|id| id.as_str()).collect();
            assert!(names.contains(&"lago-be-api-svc"));
            assert!(names.contains(&"lago-front-svc"));
        }
        other => panic!("expected a cycle, got {:?}", other.map(|g| g.len())),
    }
}

#[test]
fn test_missing_version_is_a_configuration_error() {
    let err = LagoStack::from_sources(&StaticSource::new()).unwrap_err();
    assert!(matches!(err, StackError::Configuration(_)));
    assert!(err.is_build_time());
}

#[test]
fn test_plan_covers_every_component() {
    let stack = LagoStack::from_sources(&source()).unwrap();
    let names: Vec<&str> = stack
        .graph()
        .components()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "lago-net",
            "lago-db",
            "lago-redis",
            "lago-ecs",
            "lago-bucket",
            "lago-be",
            "lago-front"
        ]
    );

    let plan = stack.plan();
    assert_eq!(plan.summary().generate, 5);
    let service = plan.actions.iter().find(|a| a.id == "lago-be-api-svc").unwrap();
    assert!(service.depends_on.contains(&"lago-be-api-listener".to_string()));
    assert_eq!(service.component.as_deref(), Some("lago-be"));
}

#[test]
fn test_component_boundary_outputs() {
    let stack = LagoStack::from_sources(&source()).unwrap();
    let outputs = stack.outputs();

    let network = outputs.network.outputs();
    assert_eq!(outputs.network.name(), "lago-net");
    assert!(network.iter().all(|port| !port.sensitive));
    let front = network.iter().find(|p| p.name == "front_dns_name").unwrap();
    assert!(front.dependencies.contains(&ResourceId::from("lago-net-front-alb")));

    let backend = outputs.backend.outputs();
    let environment = backend.iter().find(|p| p.name == "environment").unwrap();
    assert!(environment.sensitive);
    assert!(environment.dependencies.contains(&ResourceId::from("db_password")));
    assert!(environment.dependencies.contains(&ResourceId::from("lago-be-private-key")));

    let endpoint = backend.iter().find(|p| p.name == "endpoint").unwrap();
    assert!(!endpoint.sensitive);
    assert!(endpoint.dependencies.contains(&ResourceId::from("lago-be-api-svc")));

    assert_eq!(outputs.db.info().type_tag, "lago:database:Db");
    assert_eq!(outputs.bucket.info().resources.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_repeated_deploys_on_multi_thread_runtime() {
    let source = source().with("subnet_count", "6");
    for _ in 0..40 {
        let provider = Arc::new(MemoryProvider::new("eu-west-2"));
        let deployment = deploy(&source, &provider).await;
        assert!(deployment.report.is_success());
        assert!(deployment.exports.unavailable().is_empty());
    }
}

#[tokio::test]
async fn test_echoed_secrets_cannot_be_exported_in_plaintext() {
    let source = source().with_secret("db_password", "supplied_pw%42");
    let provider = Arc::new(MemoryProvider::new("eu-west-2"));
    let deployment = deploy(&source, &provider).await;

    let echoed_password = deployment.outputs.db.instance.output::<String>("password");
    let container_definitions = deployment
        .outputs
        .backend
        .service
        .task_definition
        .output::<String>("container_definitions");
    assert!(echoed_password.is_sensitive());
    assert!(container_definitions.is_sensitive());

    let mut exports = ExportSet::new();
    for (key, value) in [
        ("password", &echoed_password),
        ("containers", &container_definitions),
    ] {
        assert!(matches!(
            exports.export(key, value),
            Err(StackError::SensitiveExport(_))
        ));
    }

    let host = deployment.outputs.db.host();
    assert!(!host.is_sensitive());
    exports.export("db host", &host).unwrap();
    let resolved = exports.resolve().unwrap();
    assert!(!format!("{:?}", resolved).contains("supplied_pw%42"));
    assert!(!deployment.outputs.backend.endpoint().is_sensitive());
}

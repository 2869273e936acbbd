//! Dispatcher specs
//!
//! Verify the sandbox built around each action: job shape, environment,
//! pull secret copying, and that a settled cluster stays quiet.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

use crate::prelude::*;

const NS: &str = "prod";

fn the_job(cluster: &Cluster) -> Job {
    let name = cluster.ctx.store.names::<Job>(NS).pop().expect("a job");
    cluster.ctx.store.object::<Job>(NS, &name).expect("stored job")
}

fn env_value(job: &Job, name: &str) -> String {
    job.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
        .env
        .as_ref()
        .unwrap()
        .iter()
        .find(|e| e.name == name)
        .unwrap_or_else(|| panic!("env {name}"))
        .value
        .clone()
        .unwrap_or_default()
}

#[tokio::test]
async fn the_sandbox_wires_namespace_and_volumes() {
    let cluster = Cluster::new();
    cluster
        .ctx
        .store
        .create(NS, &test_support::installation(NS, "wordpress"))
        .await
        .expect("create");
    cluster.converge(NS).await;

    let job = the_job(&cluster);
    let meta = job.metadata.labels.clone().unwrap_or_default();
    assert_eq!(meta.get(labels::JOB_TYPE).map(String::as_str), Some(labels::JOB_TYPE_AGENT));
    assert_eq!(meta.get(labels::MANAGED).map(String::as_str), Some("true"));

    let shared = cluster.ctx.store.names::<PersistentVolumeClaim>(NS).pop().expect("claim");
    assert_eq!(env_value(&job, "SV_NAMESPACE"), NS);
    assert_eq!(env_value(&job, "SV_SHARED_VOLUME"), shared);
    assert_eq!(env_value(&job, "SV_RUNTIME_DRIVER"), "kubernetes");

    let pod = job.spec.unwrap().template.spec.unwrap();
    let container = &pod.containers[0];
    assert_eq!(container.image.as_deref(), Some("ghcr.io/stevedore/agent:v1.2.0"));
    assert_eq!(container.working_dir.as_deref(), Some("/stevedore/workdir"));
    assert_eq!(
        container.args.clone().unwrap(),
        vec!["installation", "apply", "installation.yaml"]
    );
    let mounts = container.volume_mounts.clone().unwrap();
    let workdir = mounts.iter().find(|m| m.mount_path == "/stevedore/workdir").unwrap();
    assert_eq!(workdir.read_only, Some(true));
    let shared_mount = mounts.iter().find(|m| m.mount_path == "/stevedore/shared").unwrap();
    assert!(shared_mount.read_only.is_none(), "the workspace stays writable");
    assert_eq!(pod.security_context.as_ref().unwrap().run_as_user, Some(65532));
}

#[tokio::test]
async fn a_shared_pull_secret_follows_the_job() {
    let cluster = Cluster::new();
    let system_ns = cluster.ctx.settings.namespace.clone();
    cluster.ctx.store.insert(&Secret {
        metadata: ObjectMeta {
            name: Some("registry-creds".to_string()),
            namespace: Some(system_ns),
            ..ObjectMeta::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        data: Some([(".dockerconfigjson".to_string(), ByteString(b"{}".to_vec()))].into()),
        ..Secret::default()
    });
    let mut config = test_support::agent_config(NS, "default");
    config.spec.pull_secret = Some("registry-creds".to_string());
    cluster.ctx.store.insert(&config);

    cluster
        .ctx
        .store
        .create(NS, &test_support::installation(NS, "wordpress"))
        .await
        .expect("create");
    cluster.converge(NS).await;

    let copied = cluster.ctx.store.object::<Secret>(NS, "registry-creds").expect("copied secret");
    assert_eq!(copied.type_.as_deref(), Some("kubernetes.io/dockerconfigjson"));
    assert_eq!(
        copied.metadata.labels.unwrap().get(labels::MANAGED).map(String::as_str),
        Some("true")
    );

    let job = the_job(&cluster);
    let pull = job.spec.unwrap().template.spec.unwrap().image_pull_secrets.unwrap();
    assert_eq!(pull[0].name, "registry-creds");
}

#[tokio::test]
async fn convergence_is_quiet() {
    let cluster = Cluster::new();
    cluster
        .ctx
        .store
        .create(NS, &test_support::installation(NS, "wordpress"))
        .await
        .expect("create");
    cluster.converge(NS).await;
    assert_eq!(cluster.converge(NS).await, 0, "a settled install stays settled");

    cluster.complete_job(NS);
    cluster.converge(NS).await;
    assert_eq!(cluster.converge(NS).await, 0, "a finished install stays settled");
}

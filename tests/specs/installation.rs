//! Installation lifecycle specs
//!
//! Verify the full install/upgrade/uninstall loop: document dispatch, job
//! execution, status rollup, retries, and the deletion protocol.

use crate::prelude::*;

const NS: &str = "prod";

/// Create `name` and drive it to Succeeded.
async fn install(cluster: &Cluster, name: &str) {
    cluster.ctx.store.create(NS, &test_support::installation(NS, name)).await.expect("create");
    cluster.converge(NS).await;
    cluster.complete_job(NS);
    cluster.converge(NS).await;
}

#[tokio::test]
async fn installing_runs_an_agent_job_to_completion() {
    let cluster = Cluster::new();
    cluster
        .ctx
        .store
        .create(NS, &test_support::installation(NS, "wordpress"))
        .await
        .expect("create");
    cluster.converge(NS).await;

    let stored = cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap();
    assert!(stored.metadata.finalizers.unwrap().contains(&labels::FINALIZER.to_string()));
    let status = stored.status.unwrap();
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.phase, Phase::Pending);
    assert!(status.action.is_some());

    // One action realized as one job with its workspace and files.
    assert_eq!(cluster.ctx.store.names::<AgentAction>(NS).len(), 1);
    assert_eq!(cluster.ctx.store.names::<Job>(NS).len(), 1);
    assert_eq!(cluster.ctx.store.names::<Secret>(NS).len(), 2);
    assert_eq!(cluster.ctx.store.names::<PersistentVolumeClaim>(NS).len(), 1);

    cluster.complete_job(NS);
    cluster.converge(NS).await;

    let status =
        cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap().status.unwrap();
    assert_eq!(status.phase, Phase::Succeeded);
    assert!(condition_true(&status.conditions, CONDITION_COMPLETE));
}

#[tokio::test]
async fn the_rendered_document_rides_in_the_workdir_secret() {
    let cluster = Cluster::new();
    cluster
        .ctx
        .store
        .create(NS, &test_support::installation(NS, "wordpress"))
        .await
        .expect("create");
    cluster.converge(NS).await;

    let stored = cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap();
    let action_name = stored.status.unwrap().action.unwrap().name;
    let action = cluster.ctx.store.object::<AgentAction>(NS, &action_name).unwrap();
    assert_eq!(action.spec.args, vec!["installation", "apply", "installation.yaml"]);

    let doc = cluster.document_of(NS, &action_name, "installation.yaml");
    assert_eq!(doc["schemaVersion"].as_str(), Some("1.0.2"));
    assert_eq!(doc["name"].as_str(), Some("wordpress"));
    assert_eq!(doc["namespace"].as_str(), Some(NS));
    assert_eq!(doc["bundle"]["repository"].as_str(), Some("ghcr.io/example/bundle"));
    assert!(doc["uninstalled"].is_null(), "apply documents omit the uninstall marker");
}

#[tokio::test]
async fn a_spec_change_reruns_the_agent() {
    let cluster = Cluster::new();
    install(&cluster, "wordpress").await;

    let mut stored = cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap();
    stored.spec.bundle.version = Some("1.1.0".to_string());
    cluster.ctx.store.update(NS, &stored).await.expect("update");
    cluster.converge(NS).await;

    let stored = cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap();
    assert_eq!(stored.metadata.generation, Some(2));
    let status = stored.status.unwrap();
    assert_eq!(status.observed_generation, Some(2));
    assert_eq!(status.phase, Phase::Pending, "the upgrade is in flight");
    assert_eq!(
        cluster.ctx.store.names::<AgentAction>(NS).len(),
        2,
        "each generation gets its own action"
    );
    let doc = cluster.document_of(NS, &status.action.unwrap().name, "installation.yaml");
    assert_eq!(doc["bundle"]["version"].as_str(), Some("1.1.0"));

    cluster.complete_job(NS);
    cluster.converge(NS).await;
    let status =
        cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap().status.unwrap();
    assert_eq!(status.phase, Phase::Succeeded);
}

#[tokio::test]
async fn deletion_uninstalls_before_the_finalizer_lets_go() {
    let cluster = Cluster::new();
    install(&cluster, "wordpress").await;

    cluster.ctx.store.delete::<Installation>(NS, "wordpress").await.expect("delete");
    cluster.converge(NS).await;

    // The teardown runs the same apply with the uninstall marker set.
    let stored =
        cluster.ctx.store.object::<Installation>(NS, "wordpress").expect("still terminating");
    assert!(stored.metadata.deletion_timestamp.is_some());
    let action_name = stored.status.unwrap().action.unwrap().name;
    let doc = cluster.document_of(NS, &action_name, "installation.yaml");
    assert_eq!(doc["uninstalled"].as_bool(), Some(true));

    cluster.complete_job(NS);
    cluster.converge(NS).await;

    assert!(cluster.ctx.store.object::<Installation>(NS, "wordpress").is_none());
    assert!(cluster.ctx.store.names::<AgentAction>(NS).is_empty(), "owned actions went with it");
    assert!(cluster.ctx.store.names::<Job>(NS).is_empty());
    assert!(cluster.ctx.store.names::<Secret>(NS).is_empty());
}

#[tokio::test]
async fn a_failed_run_reports_failed() {
    let cluster = Cluster::new();
    cluster
        .ctx
        .store
        .create(NS, &test_support::installation(NS, "wordpress"))
        .await
        .expect("create");
    cluster.converge(NS).await;
    cluster.fail_job(NS);
    cluster.converge(NS).await;

    let status =
        cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap().status.unwrap();
    assert_eq!(status.phase, Phase::Failed);
    assert!(condition_true(&status.conditions, CONDITION_FAILED));
    assert!(!condition_true(&status.conditions, CONDITION_COMPLETE));
}

#[tokio::test]
async fn a_retry_marker_reruns_the_same_generation() {
    let cluster = Cluster::new();
    install(&cluster, "wordpress").await;

    let mut stored = cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap();
    stored
        .annotations_mut()
        .insert(labels::RETRY_ANNOTATION.to_string(), "second-try".to_string());
    cluster.ctx.store.update(NS, &stored).await.expect("update");
    cluster.converge(NS).await;

    let stored = cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap();
    assert_eq!(stored.metadata.generation, Some(1), "annotations do not bump the generation");
    let status = stored.status.unwrap();
    assert_eq!(status.phase, Phase::Pending, "the rerun is in flight");
    assert_eq!(
        cluster.ctx.store.names::<AgentAction>(NS).len(),
        1,
        "the retry reuses the generation's action"
    );
    let action = cluster.ctx.store.object::<AgentAction>(NS, &status.action.unwrap().name).unwrap();
    assert_eq!(action.labels().get(labels::RETRY), Some(&labels::retry_digest("second-try")));
    assert_eq!(cluster.ctx.store.names::<Job>(NS).len(), 2, "a fresh job for the retry");

    cluster.complete_job(NS);
    cluster.converge(NS).await;
    let status =
        cluster.ctx.store.object::<Installation>(NS, "wordpress").unwrap().status.unwrap();
    assert_eq!(status.phase, Phase::Succeeded);
}

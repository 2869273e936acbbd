//! Plugin volume specs
//!
//! Verify the shared plugin volume lifecycle: install into a scratch
//! claim, rebind the filled volume under the hash claim, share it across
//! configs, and tear it down with the config.

use k8s_openapi::api::core::v1::PersistentVolume;

use crate::prelude::*;

const NS: &str = "prod";

/// Claims belonging to the plugin volume machinery, by name prefix.
fn plugin_claims(cluster: &Cluster) -> Vec<String> {
    cluster
        .ctx
        .store
        .names::<PersistentVolumeClaim>(NS)
        .into_iter()
        .filter(|name| name.starts_with("plugins-"))
        .collect()
}

/// Create `config` with plugins and drive its volume all the way to ready.
/// Returns the hash claim name.
async fn carry_to_ready(cluster: &Cluster, config: &str) -> String {
    cluster
        .ctx
        .store
        .create(NS, &test_support::agent_config_with_plugins(NS, config, &["kubernetes"]))
        .await
        .expect("create");
    cluster.converge(NS).await;
    cluster.complete_job(NS);
    cluster.converge(NS).await;

    let temp = plugin_claims(cluster)
        .into_iter()
        .find(|name| name.starts_with("plugins-tmp-"))
        .expect("scratch claim");
    cluster.bind_claim(NS, &temp);
    cluster.converge(NS).await;

    let ready = plugin_claims(cluster)
        .into_iter()
        .find(|name| !name.starts_with("plugins-tmp-"))
        .expect("hash claim");
    cluster.bind_claim(NS, &ready);
    cluster.converge(NS).await;
    ready
}

#[tokio::test]
async fn an_install_fills_and_rebinds_the_shared_volume() {
    let cluster = Cluster::new();
    let config = test_support::agent_config_with_plugins(NS, "default", &["kubernetes"]);
    let hash = plugins::hash(&config.spec.plugins).expect("hash");
    let ready_name = plugins::claim_name(&hash);
    cluster.ctx.store.create(NS, &config).await.expect("create");
    cluster.converge(NS).await;

    // The install runs against a scratch claim, not the hash claim.
    let claims = plugin_claims(&cluster);
    assert_eq!(claims.len(), 1);
    assert!(claims[0].starts_with("plugins-tmp-"));
    let status = cluster.ctx.store.object::<AgentConfig>(NS, "default").unwrap().status.unwrap();
    assert!(!status.ready);
    let action_name = status.shared.action.unwrap().name;
    let action = cluster.ctx.store.object::<AgentAction>(NS, &action_name).unwrap();
    assert_eq!(action.spec.args, vec!["plugins", "install", "--file", "plugins.yaml"]);
    let doc = cluster.document_of(NS, &action_name, "plugins.yaml");
    assert_eq!(doc["schemaVersion"].as_str(), Some("1.0.0"));
    assert!(doc["plugins"]["kubernetes"].is_mapping());

    cluster.complete_job(NS);
    cluster.converge(NS).await;
    cluster.bind_claim(NS, &claims[0]);
    cluster.converge(NS).await;

    // The filled volume now answers to the hash claim.
    assert_eq!(plugin_claims(&cluster).len(), 2);
    let volume = cluster
        .ctx
        .store
        .object::<PersistentVolumeClaim>(NS, &ready_name)
        .unwrap()
        .spec
        .unwrap()
        .volume_name
        .unwrap();
    let pv = cluster.ctx.store.object::<PersistentVolume>("", &volume).unwrap();
    assert_eq!(pv.spec.unwrap().claim_ref.unwrap().name.as_deref(), Some(ready_name.as_str()));

    cluster.bind_claim(NS, &ready_name);
    cluster.converge(NS).await;

    assert_eq!(plugin_claims(&cluster), vec![ready_name], "the scratch claim is gone");
    let status = cluster.ctx.store.object::<AgentConfig>(NS, "default").unwrap().status.unwrap();
    assert!(status.ready);
    assert_eq!(status.shared.phase, Phase::Succeeded);
}

#[tokio::test]
async fn matching_plugin_sets_share_the_ready_volume() {
    let cluster = Cluster::new();
    let ready = carry_to_ready(&cluster, "default").await;

    cluster
        .ctx
        .store
        .create(NS, &test_support::agent_config_with_plugins(NS, "alt", &["kubernetes"]))
        .await
        .expect("create");
    cluster.converge(NS).await;

    let status = cluster.ctx.store.object::<AgentConfig>(NS, "alt").unwrap().status.unwrap();
    assert!(status.ready);
    assert_eq!(cluster.ctx.store.names::<AgentAction>(NS).len(), 1, "no second install");
    assert_eq!(plugin_claims(&cluster), vec![ready]);
}

#[tokio::test]
async fn deleting_a_config_releases_its_claims() {
    let cluster = Cluster::new();
    carry_to_ready(&cluster, "default").await;

    cluster.ctx.store.delete::<AgentConfig>(NS, "default").await.expect("delete");
    cluster.converge(NS).await;

    assert!(cluster.ctx.store.object::<AgentConfig>(NS, "default").is_none());
    assert!(plugin_claims(&cluster).is_empty());
}

#[tokio::test]
async fn a_retry_rescues_a_failed_install() {
    let cluster = Cluster::new();
    cluster
        .ctx
        .store
        .create(NS, &test_support::agent_config_with_plugins(NS, "default", &["kubernetes"]))
        .await
        .expect("create");
    cluster.converge(NS).await;
    cluster.fail_job(NS);
    cluster.converge(NS).await;

    let status = cluster.ctx.store.object::<AgentConfig>(NS, "default").unwrap().status.unwrap();
    assert_eq!(status.shared.phase, Phase::Failed);
    assert!(!status.ready);
    assert_eq!(plugin_claims(&cluster).len(), 1, "the scratch claim stays for the rerun");

    let mut stored = cluster.ctx.store.object::<AgentConfig>(NS, "default").unwrap();
    stored.annotations_mut().insert(labels::RETRY_ANNOTATION.to_string(), "fix-1".to_string());
    cluster.ctx.store.update(NS, &stored).await.expect("update");
    cluster.converge(NS).await;
    assert_eq!(cluster.ctx.store.names::<Job>(NS).len(), 2, "a fresh install job");

    cluster.complete_job(NS);
    cluster.converge(NS).await;
    let temp = plugin_claims(&cluster)
        .into_iter()
        .find(|name| name.starts_with("plugins-tmp-"))
        .expect("scratch claim");
    cluster.bind_claim(NS, &temp);
    cluster.converge(NS).await;
    let ready = plugin_claims(&cluster)
        .into_iter()
        .find(|name| !name.starts_with("plugins-tmp-"))
        .expect("hash claim");
    cluster.bind_claim(NS, &ready);
    cluster.converge(NS).await;

    let status = cluster.ctx.store.object::<AgentConfig>(NS, "default").unwrap().status.unwrap();
    assert!(status.ready);
}

//! Credential and parameter set specs
//!
//! Verify both set kinds publish their documents through agent jobs and
//! tear down with the delete verb instead of a document.

use sv_core::{Credential, CredentialSource, Parameter, ParameterSource};

use crate::prelude::*;

const NS: &str = "prod";

fn azure_credentials() -> CredentialSet {
    let mut set = test_support::credential_set(NS, "azure");
    set.spec.credentials = vec![Credential {
        name: "token".to_string(),
        source: CredentialSource { secret: Some("azure-token".to_string()), value: None },
    }];
    set
}

#[tokio::test]
async fn credential_sets_publish_their_document() {
    let cluster = Cluster::new();
    cluster.ctx.store.create(NS, &azure_credentials()).await.expect("create");
    cluster.converge(NS).await;

    let stored = cluster.ctx.store.object::<CredentialSet>(NS, "azure").unwrap();
    let action_name = stored.status.unwrap().action.unwrap().name;
    let action = cluster.ctx.store.object::<AgentAction>(NS, &action_name).unwrap();
    assert_eq!(action.spec.args, vec!["credentials", "apply", "credentials.yaml"]);

    let doc = cluster.document_of(NS, &action_name, "credentials.yaml");
    assert_eq!(doc["schemaVersion"].as_str(), Some("1.0.1"));
    assert_eq!(doc["name"].as_str(), Some("azure"));
    assert_eq!(doc["namespace"].as_str(), Some(NS));
    assert_eq!(doc["credentials"][0]["name"].as_str(), Some("token"));
    assert_eq!(doc["credentials"][0]["source"]["secret"].as_str(), Some("azure-token"));

    cluster.complete_job(NS);
    cluster.converge(NS).await;
    let status = cluster.ctx.store.object::<CredentialSet>(NS, "azure").unwrap().status.unwrap();
    assert_eq!(status.phase, Phase::Succeeded);
}

#[tokio::test]
async fn deleting_a_credential_set_uses_the_delete_verb() {
    let cluster = Cluster::new();
    cluster.ctx.store.create(NS, &azure_credentials()).await.expect("create");
    cluster.converge(NS).await;
    cluster.complete_job(NS);
    cluster.converge(NS).await;

    cluster.ctx.store.delete::<CredentialSet>(NS, "azure").await.expect("delete");
    cluster.converge(NS).await;

    let stored = cluster.ctx.store.object::<CredentialSet>(NS, "azure").expect("terminating");
    let action_name = stored.status.unwrap().action.unwrap().name;
    let action = cluster.ctx.store.object::<AgentAction>(NS, &action_name).unwrap();
    assert_eq!(action.spec.args, vec!["credentials", "delete", "-n", NS, "azure"]);
    assert!(action.spec.files.is_empty(), "the delete verb needs no document");

    cluster.complete_job(NS);
    cluster.converge(NS).await;
    assert!(cluster.ctx.store.object::<CredentialSet>(NS, "azure").is_none());
    assert!(cluster.ctx.store.names::<AgentAction>(NS).is_empty());
}

#[tokio::test]
async fn parameter_sets_follow_the_same_flow() {
    let cluster = Cluster::new();
    let mut set = test_support::parameter_set(NS, "sizing");
    set.spec.parameters = vec![Parameter {
        name: "db-size".to_string(),
        source: ParameterSource { value: Some("large".to_string()), secret: None },
    }];
    cluster.ctx.store.create(NS, &set).await.expect("create");
    cluster.converge(NS).await;

    let stored = cluster.ctx.store.object::<ParameterSet>(NS, "sizing").unwrap();
    let action_name = stored.status.unwrap().action.unwrap().name;
    let action = cluster.ctx.store.object::<AgentAction>(NS, &action_name).unwrap();
    assert_eq!(action.spec.args, vec!["parameters", "apply", "parameters.yaml"]);
    let doc = cluster.document_of(NS, &action_name, "parameters.yaml");
    assert_eq!(doc["parameters"][0]["source"]["value"].as_str(), Some("large"));

    cluster.complete_job(NS);
    cluster.converge(NS).await;

    cluster.ctx.store.delete::<ParameterSet>(NS, "sizing").await.expect("delete");
    cluster.converge(NS).await;
    let stored = cluster.ctx.store.object::<ParameterSet>(NS, "sizing").expect("terminating");
    let action_name = stored.status.unwrap().action.unwrap().name;
    let action = cluster.ctx.store.object::<AgentAction>(NS, &action_name).unwrap();
    assert_eq!(action.spec.args, vec!["parameters", "delete", "-n", NS, "sizing"]);

    cluster.complete_job(NS);
    cluster.converge(NS).await;
    assert!(cluster.ctx.store.object::<ParameterSet>(NS, "sizing").is_none());
}

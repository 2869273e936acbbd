// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage and secret dependencies mounted into agent jobs.
//!
//! Everything here is owned by the action and keyed to it by labels, so a
//! second pass over the same action finds what the first pass made instead
//! of making more. Deletion is the owner reference's problem.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, Secret, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use sv_core::{labels, AgentAction, Clock, EffectiveAgentConfig};
use tracing::info;

use crate::error::OperatorError;
use crate::reconcile::Context;
use crate::store::{Store, StoreError};

#[cfg(test)]
#[path = "deps_tests.rs"]
mod tests;

/// Names of the objects an agent job mounts.
#[derive(Debug)]
pub(crate) struct ActionDeps {
    pub shared_pvc: String,
    pub config_secret: String,
    pub workdir_secret: String,
    pub pull_secret: Option<String>,
}

/// Runtime configuration handed to the sandboxed agent as `config.yaml`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentRuntimeConfig<'a> {
    namespace: &'a str,
    verbosity: &'a str,
    runtime_driver: &'a str,
}

/// Find or create everything the job for `action` mounts.
pub(super) async fn ensure_deps<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    action: &AgentAction,
    effective: &EffectiveAgentConfig,
) -> Result<ActionDeps, OperatorError> {
    Ok(ActionDeps {
        shared_pvc: shared_claim(ctx, namespace, action, effective).await?,
        config_secret: config_secret(ctx, namespace, action).await?,
        workdir_secret: workdir_secret(ctx, namespace, action).await?,
        pull_secret: pull_secret(ctx, namespace, effective).await?,
    })
}

fn action_identity(action: &AgentAction) -> BTreeMap<String, String> {
    labels::action_labels(
        &AgentAction::kind(&()),
        &action.name_any(),
        action.metadata.generation.unwrap_or_default(),
        action.retry(),
    )
}

/// Scratch volume shared between the agent job and the installer jobs it
/// spawns.
async fn shared_claim<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    action: &AgentAction,
    effective: &EffectiveAgentConfig,
) -> Result<String, OperatorError> {
    let name = action.name_any();
    let selector = labels::generation_selector(
        &AgentAction::kind(&()),
        &name,
        action.metadata.generation.unwrap_or_default(),
    );
    let existing = ctx.store.list::<PersistentVolumeClaim>(namespace, &selector).await?;
    if let Some(claim) = existing.into_iter().next() {
        return Ok(claim.name_any());
    }

    let claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}-shared-")),
            namespace: Some(namespace.to_string()),
            labels: Some(action_identity(action)),
            owner_references: action.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some([("storage".to_string(), effective.volume_size.clone())].into()),
                ..Default::default()
            }),
            storage_class_name: effective.storage_class_name.clone(),
            ..Default::default()
        }),
        status: None,
    };
    let created = ctx.store.create(namespace, &claim).await?;
    info!(action = %name, claim = %created.name_any(), "created shared volume claim");
    Ok(created.name_any())
}

async fn config_secret<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    action: &AgentAction,
) -> Result<String, OperatorError> {
    if let Some(name) = find_secret(ctx, namespace, action, labels::SECRET_TYPE_CONFIG).await? {
        return Ok(name);
    }
    let config =
        AgentRuntimeConfig { namespace, verbosity: "info", runtime_driver: "kubernetes" };
    let rendered = serde_yaml::to_string(&config)?;
    let data = [("config.yaml".to_string(), ByteString(rendered.into_bytes()))].into();
    create_secret(ctx, namespace, action, labels::SECRET_TYPE_CONFIG, data).await
}

async fn workdir_secret<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    action: &AgentAction,
) -> Result<String, OperatorError> {
    if let Some(name) = find_secret(ctx, namespace, action, labels::SECRET_TYPE_WORKDIR).await? {
        return Ok(name);
    }
    create_secret(
        ctx,
        namespace,
        action,
        labels::SECRET_TYPE_WORKDIR,
        action.spec.files.clone(),
    )
    .await
}

/// The retry label stays out of the selector: a retry re-runs the same
/// generation against the same files and configuration.
async fn find_secret<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    action: &AgentAction,
    secret_type: &str,
) -> Result<Option<String>, OperatorError> {
    let selector = format!(
        "{},{}={secret_type}",
        labels::generation_selector(
            &AgentAction::kind(&()),
            &action.name_any(),
            action.metadata.generation.unwrap_or_default(),
        ),
        labels::SECRET_TYPE,
    );
    let existing = ctx.store.list::<Secret>(namespace, &selector).await?;
    Ok(existing.into_iter().next().map(|s| s.name_any()))
}

async fn create_secret<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    action: &AgentAction,
    secret_type: &str,
    data: BTreeMap<String, ByteString>,
) -> Result<String, OperatorError> {
    let name = action.name_any();
    let mut secret_labels = action_identity(action);
    secret_labels.insert(labels::SECRET_TYPE.to_string(), secret_type.to_string());

    let secret = Secret {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}-")),
            namespace: Some(namespace.to_string()),
            labels: Some(secret_labels),
            owner_references: action.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        immutable: Some(true),
        data: Some(data),
        ..Default::default()
    };
    let created = ctx.store.create(namespace, &secret).await?;
    info!(action = %name, secret = %created.name_any(), secret_type, "created secret");
    Ok(created.name_any())
}

/// Image pull secret for the agent image, copied from the system namespace
/// on first use so one secret serves the whole cluster.
async fn pull_secret<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    effective: &EffectiveAgentConfig,
) -> Result<Option<String>, OperatorError> {
    let Some(name) = effective.pull_secret.as_deref() else {
        return Ok(None);
    };
    if ctx.store.get::<Secret>(namespace, name).await?.is_some() {
        return Ok(Some(name.to_string()));
    }

    let source =
        ctx.store.get::<Secret>(&ctx.settings.namespace, name).await?.ok_or_else(|| {
            OperatorError::PullSecretMissing {
                namespace: ctx.settings.namespace.clone(),
                name: name.to_string(),
            }
        })?;
    let copy = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some([(labels::MANAGED.to_string(), "true".to_string())].into()),
            ..Default::default()
        },
        data: source.data.clone(),
        type_: source.type_.clone(),
        ..Default::default()
    };
    match ctx.store.create(namespace, &copy).await {
        Ok(_) => info!(namespace, secret = name, "copied pull secret from the system namespace"),
        Err(StoreError::AlreadyExists { .. }) => {}
        Err(err) => return Err(err.into()),
    }
    Ok(Some(name.to_string()))
}

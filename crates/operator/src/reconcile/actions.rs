// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action lookup, dispatch, and retry propagation shared by the reconcilers.

use k8s_openapi::api::core::v1::LocalObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use sv_core::{
    labels, AgentAction, AgentActionSpec, AgentActionStatus, Clock, DocumentResource, Reconcilable,
    ResourceStatus,
};
use tracing::info;

use crate::error::OperatorError;
use crate::patch::patch_status_with_retry;
use crate::store::Store;

use super::Context;

#[cfg(test)]
#[path = "actions_tests.rs"]
mod tests;

/// The action dispatched for `generation`, if any.
///
/// The lookup ignores the retry label; the generation is the idempotency
/// key, and a retry reuses the action it finds.
pub(crate) async fn find_action<S: Store>(
    store: &S,
    namespace: &str,
    kind: &str,
    name: &str,
    generation: i64,
) -> Result<Option<AgentAction>, OperatorError> {
    let selector = labels::generation_selector(kind, name, generation);
    let actions = store.list::<AgentAction>(namespace, &selector).await?;
    Ok(actions.into_iter().next())
}

/// Resource status derived from the action of the current generation.
/// No action means nothing has been dispatched yet.
pub(crate) fn status_from_action(
    generation: Option<i64>,
    action: Option<&AgentAction>,
) -> ResourceStatus {
    match action {
        None => ResourceStatus::fresh(generation),
        Some(action) => ResourceStatus {
            observed_generation: generation,
            action: action.meta().name.clone().map(|name| LocalObjectReference { name }),
            phase: action.phase(),
            conditions: action.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default(),
        },
    }
}

/// Write `status` unless the resource already carries it.
pub(crate) async fn write_status<R, S, C>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
    status: &ResourceStatus,
) -> Result<(), OperatorError>
where
    R: Reconcilable,
    S: Store,
    C: Clock,
{
    let status = status.clone();
    patch_status_with_retry::<R, _, _, _, _>(&ctx.store, &ctx.clock, namespace, name, move |current| {
        (current.status() != Some(&status)).then(|| status.clone())
    })
    .await
}

/// Copy a changed retry marker onto the action.
///
/// Status resets land before the marker does; a crash in between re-runs
/// this path on the next pass, so the order only ever under-promises
/// progress. The action status reset matters for collected jobs: without
/// it a finished action would still read as finished and the dispatcher
/// would never run the retry.
pub(crate) async fn propagate_retry<R, S, C>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
    resource: &R,
    action: &AgentAction,
) -> Result<(), OperatorError>
where
    R: Reconcilable,
    S: Store,
    C: Clock,
{
    let retry = resource.retry().to_string();
    info!(kind = R::KIND, name, action = %action.name_any(), "propagating retry marker");
    let fresh = ResourceStatus::fresh(resource.meta().generation);
    write_status::<R, _, _>(ctx, namespace, name, &fresh).await?;

    let reset = AgentActionStatus {
        observed_generation: action.meta().generation,
        ..AgentActionStatus::default()
    };
    let patch = serde_json::json!({ "status": serde_json::to_value(&reset)? });
    ctx.store.patch_status::<AgentAction>(namespace, &action.name_any(), &patch).await?;

    let mut updated = action.clone();
    updated.annotations_mut().insert(labels::RETRY_ANNOTATION.to_string(), retry.clone());
    updated.labels_mut().insert(labels::RETRY.to_string(), labels::retry_digest(&retry));
    ctx.store.update(namespace, &updated).await?;
    Ok(())
}

/// Create an action carrying `spec` under the resource's identity labels,
/// then point the resource status at it.
pub(crate) async fn submit<R, S, C>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
    resource: &R,
    spec: AgentActionSpec,
) -> Result<(), OperatorError>
where
    R: Reconcilable,
    S: Store,
    C: Clock,
{
    let generation = resource.meta().generation.unwrap_or_default();
    let retry = resource.retry();
    let mut metadata = ObjectMeta {
        generate_name: Some(format!("{name}-")),
        namespace: Some(namespace.to_string()),
        labels: Some(labels::action_labels(R::KIND, name, generation, retry)),
        owner_references: resource.controller_owner_ref(&()).map(|r| vec![r]),
        ..ObjectMeta::default()
    };
    if !retry.is_empty() {
        metadata.annotations =
            Some([(labels::RETRY_ANNOTATION.to_string(), retry.to_string())].into());
    }

    let action = AgentAction { metadata, spec, status: None };
    let created = ctx.store.create(namespace, &action).await?;
    info!(kind = R::KIND, name, action = %created.name_any(), "dispatched action");

    let status = ResourceStatus {
        observed_generation: resource.meta().generation,
        action: created.meta().name.clone().map(|name| LocalObjectReference { name }),
        ..ResourceStatus::default()
    };
    write_status::<R, _, _>(ctx, namespace, name, &status).await
}

/// Dispatch the action realizing a document resource's current generation:
/// apply on the way up, teardown on the way down.
pub(crate) async fn dispatch<R, S, C>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
    resource: &R,
    deleting: bool,
) -> Result<(), OperatorError>
where
    R: DocumentResource,
    S: Store,
    C: Clock,
{
    let files = resource
        .action_files(deleting)?
        .into_iter()
        .map(|(path, bytes)| (path, ByteString(bytes)))
        .collect();
    let spec = AgentActionSpec {
        agent_config: resource
            .agent_config_name()
            .map(|n| LocalObjectReference { name: n.to_string() }),
        args: resource.action_args(deleting),
        files,
        ..AgentActionSpec::default()
    };
    submit(ctx, namespace, name, resource, spec).await
}

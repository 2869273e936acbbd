// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic reconcile flow for document-backed resources.
//!
//! One pass closes the first gap it finds between the resource generation
//! and the action dispatched for it, then stops; the write it makes comes
//! back as a watch event and drives the next pass. A settled resource
//! produces no writes at all.

use sv_core::{Clock, CredentialSet, DocumentResource, Installation, ParameterSet};
use tracing::{debug, info};

use crate::error::OperatorError;
use crate::finalizer;
use crate::store::Store;

use super::actions;
use super::Context;

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;

pub async fn reconcile_installation<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
) -> Result<(), OperatorError> {
    reconcile_document::<Installation, _, _>(ctx, namespace, name).await
}

pub async fn reconcile_credential_set<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
) -> Result<(), OperatorError> {
    reconcile_document::<CredentialSet, _, _>(ctx, namespace, name).await
}

pub async fn reconcile_parameter_set<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
) -> Result<(), OperatorError> {
    reconcile_document::<ParameterSet, _, _>(ctx, namespace, name).await
}

/// One reconcile pass for a document-backed resource kind.
pub(crate) async fn reconcile_document<R, S, C>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
) -> Result<(), OperatorError>
where
    R: DocumentResource,
    S: Store,
    C: Clock,
{
    let Some(resource) = ctx.store.get::<R>(namespace, name).await? else {
        debug!(kind = R::KIND, name, "resource is gone");
        return Ok(());
    };
    let generation = resource.meta().generation;
    let deleting = finalizer::is_deleted(&resource);

    // The action labeled with the current generation is the source of truth
    // for status. Deletion bumps the generation, so a teardown gets its own
    // action through the same lookup.
    let action = actions::find_action(
        &ctx.store,
        namespace,
        R::KIND,
        name,
        generation.unwrap_or_default(),
    )
    .await?;

    let status = actions::status_from_action(generation, action.as_ref());
    if resource.status() != Some(&status) {
        actions::write_status::<R, _, _>(ctx, namespace, name, &status).await?;
    }

    if deleting && finalizer::delete_processed(&status, generation) {
        info!(kind = R::KIND, name, "teardown complete, releasing finalizer");
        return finalizer::release(&ctx.store, namespace, &resource).await;
    }

    if let Some(action) = action {
        if action.retry() != resource.retry() {
            actions::propagate_retry(ctx, namespace, name, &resource, &action).await?;
        }
        return Ok(());
    }

    if deleting {
        if finalizer::has_finalizer(&resource) {
            actions::dispatch(ctx, namespace, name, &resource, true).await?;
        }
        return Ok(());
    }

    // The finalizer lands before the first action so a delete can never
    // outrun the teardown bookkeeping.
    if finalizer::ensure(&ctx.store, namespace, &resource).await? {
        return Ok(());
    }

    actions::dispatch(ctx, namespace, name, &resource, false).await
}

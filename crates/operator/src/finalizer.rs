// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finalizer bookkeeping for managed resources.
//!
//! Every managed resource carries `stevedore.dev/finalizer` so that a delete
//! pauses in the Terminating state until its teardown action has run. The
//! API server bumps the generation when it sets the deletion timestamp, so
//! teardown reuses the ordinary one-action-per-generation flow.

use kube::Resource;
use sv_core::status::CONDITION_COMPLETE;
use sv_core::{labels, ResourceStatus};

use crate::error::OperatorError;
use crate::store::{Store, StoreObject};

#[cfg(test)]
#[path = "finalizer_tests.rs"]
mod tests;

pub(crate) fn is_deleted<K: Resource>(object: &K) -> bool {
    object.meta().deletion_timestamp.is_some()
}

pub(crate) fn has_finalizer<K: Resource>(object: &K) -> bool {
    object
        .meta()
        .finalizers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|f| f == labels::FINALIZER)
}

/// Add the finalizer when missing. Returns true when a write happened; the
/// caller stops and lets the update event drive the next pass.
pub(crate) async fn ensure<K, S>(store: &S, namespace: &str, object: &K) -> Result<bool, OperatorError>
where
    K: StoreObject,
    S: Store,
{
    if has_finalizer(object) {
        return Ok(false);
    }
    let mut updated = object.clone();
    updated.meta_mut().finalizers.get_or_insert_with(Vec::new).push(labels::FINALIZER.to_string());
    store.update(namespace, &updated).await?;
    Ok(true)
}

/// Release the finalizer, letting the API server finish the delete.
pub(crate) async fn release<K, S>(store: &S, namespace: &str, object: &K) -> Result<(), OperatorError>
where
    K: StoreObject,
    S: Store,
{
    if !has_finalizer(object) {
        return Ok(());
    }
    let mut updated = object.clone();
    if let Some(finalizers) = updated.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != labels::FINALIZER);
    }
    store.update(namespace, &updated).await?;
    Ok(())
}

/// True when the teardown action for the deletion generation has completed
/// and the finalizer may be released.
pub(crate) fn delete_processed(status: &ResourceStatus, generation: Option<i64>) -> bool {
    status.observed_generation == generation && status.condition_true(CONDITION_COMPLETE)
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optimistic-concurrency status writes.
//!
//! Status always flows through the status subresource as a merge patch
//! carrying the `resourceVersion` the writer observed. A version conflict
//! means another writer got there first; the patch is rebuilt against a
//! fresh read and retried until a deadline.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use sv_core::Clock;
use tracing::debug;

use crate::error::OperatorError;
use crate::store::{Store, StoreObject};

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;

/// Give up on a conflicted status write after this long.
pub(crate) const PATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Attempt ceiling for a writer that keeps losing the version race.
pub(crate) const PATCH_MAX_ATTEMPTS: u32 = 16;

/// Merge-patch the status of `namespace/name`, retrying version conflicts
/// against a fresh read.
///
/// `build` sees the latest object and returns the status to write, or `None`
/// to leave it untouched. A missing object is not an error; deletion wins.
pub(crate) async fn patch_status_with_retry<K, S, C, F, V>(
    store: &S,
    clock: &C,
    namespace: &str,
    name: &str,
    build: F,
) -> Result<(), OperatorError>
where
    K: StoreObject,
    S: Store,
    C: Clock,
    F: Fn(&K) -> Option<V>,
    V: Serialize,
{
    let deadline = clock.now() + PATCH_TIMEOUT;
    for attempt in 1..=PATCH_MAX_ATTEMPTS {
        let Some(current) = store.get::<K>(namespace, name).await? else {
            return Ok(());
        };
        let Some(status) = build(&current) else {
            return Ok(());
        };
        let patch = json!({
            "metadata": { "resourceVersion": current.meta().resource_version },
            "status": serde_json::to_value(&status)?,
        });
        match store.patch_status::<K>(namespace, name, &patch).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_conflict() && clock.now() < deadline => {
                debug!(
                    kind = %K::kind(&()),
                    name = %name,
                    attempt,
                    "status patch conflicted, retrying"
                );
            }
            Err(err) if err.is_conflict() => break,
            Err(err) => return Err(err.into()),
        }
    }
    Err(OperatorError::PatchTimeout {
        kind: K::kind(&()).into_owned(),
        namespace: namespace.to_string(),
        name: name.to_string(),
    })
}

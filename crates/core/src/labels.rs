// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Label and annotation protocol.
//!
//! Labels are the only lookup index the operator keeps: every object it
//! creates carries the identity of the resource it was created for, and
//! every "does X already exist" question is a label query. The retry
//! annotation is free text; its digest is what lands in the label.

use crate::digest::short_digest;
use std::collections::BTreeMap;

/// Marks an object as created and owned by this operator.
pub const MANAGED: &str = "stevedore.dev/managed";
/// Kind of the resource an object was created for.
pub const RESOURCE_KIND: &str = "stevedore.dev/resourceKind";
/// Name of the resource an object was created for.
pub const RESOURCE_NAME: &str = "stevedore.dev/resourceName";
/// Generation of the resource an object was created for.
pub const RESOURCE_GENERATION: &str = "stevedore.dev/resourceGeneration";
/// Digest of the retry annotation at creation time; empty when unset.
pub const RETRY: &str = "stevedore.dev/retry";
/// Distinguishes agent jobs from nested installer jobs.
pub const JOB_TYPE: &str = "stevedore.dev/jobType";
/// Distinguishes the config secret from the workdir secret.
pub const SECRET_TYPE: &str = "stevedore.dev/secretType";
/// Content hash carried by plugin volume claims.
pub const PLUGINS_HASH: &str = "stevedore.dev/pluginsHash";

/// Free-text annotation an operator edits to request a re-run.
pub const RETRY_ANNOTATION: &str = "stevedore.dev/retry";
/// Finalizer blocking deletion until cleanup has run.
pub const FINALIZER: &str = "stevedore.dev/finalizer";

pub const JOB_TYPE_AGENT: &str = "agent";
pub const JOB_TYPE_INSTALLER: &str = "installer";
pub const SECRET_TYPE_CONFIG: &str = "config";
pub const SECRET_TYPE_WORKDIR: &str = "workdir";

/// Label-safe digest of a retry annotation; empty stays empty.
pub fn retry_digest(retry: &str) -> String {
    if retry.is_empty() {
        String::new()
    } else {
        short_digest(retry)
    }
}

/// Identity labels for an object created on behalf of a resource.
pub fn action_labels(
    kind: &str,
    name: &str,
    generation: i64,
    retry: &str,
) -> BTreeMap<String, String> {
    [
        (MANAGED.to_string(), "true".to_string()),
        (RESOURCE_KIND.to_string(), kind.to_string()),
        (RESOURCE_NAME.to_string(), name.to_string()),
        (RESOURCE_GENERATION.to_string(), generation.to_string()),
        (RETRY.to_string(), retry_digest(retry)),
    ]
    .into_iter()
    .collect()
}

/// Selector matching every action dispatched for a resource generation.
///
/// Excludes the retry label: the generation, not the retry marker, is the
/// idempotency key for actions.
pub fn generation_selector(kind: &str, name: &str, generation: i64) -> String {
    format!(
        "{MANAGED}=true,{RESOURCE_KIND}={kind},{RESOURCE_NAME}={name},\
         {RESOURCE_GENERATION}={generation}"
    )
}

/// Exact selector string for a label set.
pub fn selector(labels: &BTreeMap<String, String>) -> String {
    join(labels, ",")
}

/// Sorted `key=value` pairs joined by spaces, handed to the sandbox.
pub fn env_string(labels: &BTreeMap<String, String>) -> String {
    join(labels, " ")
}

fn join(labels: &BTreeMap<String, String>, sep: &str) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod tests;

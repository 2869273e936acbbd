// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-wide error type.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("document error: {0}")]
    Document(#[from] sv_core::DocumentError),

    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("config render error: {0}")]
    ConfigRender(#[from] serde_yaml::Error),

    #[error("{kind} {namespace}/{name}: status not written within the conflict retry window")]
    PatchTimeout { kind: String, namespace: String, name: String },

    #[error("plugin volume {hash}: found {found} claims, expected at most two")]
    ClaimCardinality { hash: String, found: usize },

    #[error("pull secret {namespace}/{name} not found")]
    PullSecretMissing { namespace: String, name: String },

    #[error("object has no {0}")]
    MissingMeta(&'static str),
}

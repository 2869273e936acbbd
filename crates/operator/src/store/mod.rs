// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster state access behind a swappable trait.
//!
//! [`ClusterStore`] talks to the API server. [`FakeStore`] emulates the API
//! server behavior the reconcilers lean on (resource versions, generation
//! bumps, finalizer-gated deletion, owner-reference cleanup) so the full
//! reconcile loops run in-process in tests.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::core::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

mod cluster;
#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use cluster::ClusterStore;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeStore;

/// Bounds shared by every namespaced object the operator reads or writes.
pub trait StoreObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name}: resource version conflict")]
    Conflict { kind: String, name: String },

    #[error("{kind} {name}: already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("{kind} {name}: not found")]
    NotFound { kind: String, name: String },

    #[error("{kind}: object has no {field}")]
    Invalid { kind: String, field: &'static str },

    #[error("api error: {0}")]
    Api(#[from] kube::Error),

    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// True for write failures caused by a stale `resourceVersion`.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Typed reads and writes against cluster state.
///
/// Every method takes the namespace explicitly so callers never depend on a
/// default-namespace client. `list` returns objects sorted by name.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError>;

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<K>, StoreError>;

    /// Create `object`, honoring `metadata.generateName` when `metadata.name`
    /// is unset. Returns the object as persisted (server-assigned name, uid,
    /// resource version).
    async fn create<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    /// Replace `object`. Fails with [`StoreError::Conflict`] when the carried
    /// `metadata.resourceVersion` is stale. Status is a subresource and is
    /// not written through this path.
    async fn update<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    /// Merge-patch the status subresource. `patch` may carry
    /// `metadata.resourceVersion` as an optimistic-concurrency precondition.
    async fn patch_status<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), StoreError>;

    /// Delete by name. Missing objects are not an error.
    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>, StoreError>;

    async fn update_volume(
        &self,
        volume: &PersistentVolume,
    ) -> Result<PersistentVolume, StoreError>;
}

/// Object name from metadata, or [`StoreError::Invalid`] when absent.
///
/// Scope-agnostic so it also covers `PersistentVolume`.
pub(crate) fn object_name<K: Resource<DynamicType = ()>>(object: &K) -> Result<&str, StoreError> {
    object.meta().name.as_deref().ok_or_else(|| StoreError::Invalid {
        kind: K::kind(&()).into_owned(),
        field: "metadata.name",
    })
}

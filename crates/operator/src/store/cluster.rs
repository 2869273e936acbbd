// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API-server-backed [`Store`] implementation.

use k8s_openapi::api::core::v1::PersistentVolume;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde_json::Value;

use async_trait::async_trait;

use super::{object_name, Store, StoreError, StoreObject};

#[derive(Clone)]
pub struct ClusterStore {
    client: Client,
}

impl ClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn volumes(&self) -> Api<PersistentVolume> {
        Api::all(self.client.clone())
    }
}

/// Fold API-server 409/404 responses into typed store errors.
fn classify<K: Resource<DynamicType = ()>>(err: kube::Error, name: &str) -> StoreError {
    let kind = || K::kind(&()).into_owned();
    match err {
        kube::Error::Api(ref resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists { kind: kind(), name: name.to_string() }
        }
        kube::Error::Api(ref resp) if resp.code == 409 => {
            StoreError::Conflict { kind: kind(), name: name.to_string() }
        }
        kube::Error::Api(ref resp) if resp.code == 404 => {
            StoreError::NotFound { kind: kind(), name: name.to_string() }
        }
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl Store for ClusterStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<K>, StoreError> {
        let params = ListParams::default().labels(selector);
        let mut items = self.api::<K>(namespace).list(&params).await?.items;
        items.sort_by(|a, b| a.meta().name.cmp(&b.meta().name));
        Ok(items)
    }

    async fn create<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object.meta().name.clone().or_else(|| object.meta().generate_name.clone());
        self.api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| classify::<K>(e, name.as_deref().unwrap_or("")))
    }

    async fn update<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object_name(object)?;
        self.api::<K>(namespace)
            .replace(name, &PostParams::default(), object)
            .await
            .map_err(|e| classify::<K>(e, name))
    }

    async fn patch_status<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        self.api::<K>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::<&Value>::Merge(patch))
            .await
            .map_err(|e| classify::<K>(e, name))?;
        Ok(())
    }

    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self.api::<K>(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(err) => match classify::<K>(err, name) {
                StoreError::NotFound { .. } => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>, StoreError> {
        Ok(self.volumes().get_opt(name).await?)
    }

    async fn update_volume(
        &self,
        volume: &PersistentVolume,
    ) -> Result<PersistentVolume, StoreError> {
        let name = object_name(volume)?;
        self.volumes()
            .replace(name, &PostParams::default(), volume)
            .await
            .map_err(|e| classify::<PersistentVolume>(e, name))
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`Store`] emulating the API-server behaviors the reconcilers
//! lean on: resource version preconditions, generation bumps on spec change
//! and on graceful deletion, status as a subresource, RFC 7386 merge
//! semantics for status patches, finalizer-gated deletion with
//! owner-reference cascade, and `generateName` suffixing.
//!
//! Reads are never logged; every write appends one line to [`FakeStore::ops`]
//! so tests can assert write counts and ordering.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::Resource;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use async_trait::async_trait;

use super::{Store, StoreError, StoreObject};

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

/// Suffix alphabet the API server uses for `generateName`.
const SUFFIX_ALPHABET: [char; 27] = [
    'b', 'c', 'd', 'f', 'g', 'h', 'j', 'k', 'l', 'm', 'n', 'p', 'q', 'r', 's', 't', 'v', 'w', 'x',
    'z', '2', '4', '5', '6', '7', '8', '9',
];

const PVC_PROTECTION: &str = "kubernetes.io/pvc-protection";

/// (kind, namespace, name); namespace is empty for cluster-scoped objects.
type Key = (String, String, String);

#[derive(Default)]
struct State {
    objects: HashMap<Key, Value>,
    revision: u64,
    status_conflicts: u32,
    ops: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` status patches fail with a version conflict.
    pub fn fail_next_status_conflicts(&self, n: u32) {
        self.state.lock().status_conflicts = n;
    }

    /// Every write performed through the [`Store`] trait, in order, as
    /// `"<verb> <kind> <namespace>/<name>"` lines.
    pub fn ops(&self) -> Vec<String> {
        self.state.lock().ops.clone()
    }

    /// Seed or overwrite an object directly, skipping API semantics apart
    /// from uid and resource version assignment. Tests use this to play the
    /// other cluster controllers (job completion, volume binding).
    pub fn insert<K>(&self, object: &K)
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        debug_assert!(object.meta().name.is_some(), "seeded objects must carry a name");
        let mut state = self.state.lock();
        let mut value = match serde_json::to_value(object) {
            Ok(v) => v,
            Err(_) => return,
        };
        let key = (
            K::kind(&()).into_owned(),
            object.meta().namespace.clone().unwrap_or_default(),
            object.meta().name.clone().unwrap_or_default(),
        );
        let rv = next_revision(&mut state);
        let meta = metadata(&mut value);
        if meta.get("uid").and_then(Value::as_str).is_none() {
            meta.insert("uid".into(), Value::String(nanoid::nanoid!()));
        }
        meta.insert("resourceVersion".into(), Value::String(rv));
        if meta.get("generation").is_none() && value.get("spec").is_some() {
            metadata(&mut value).insert("generation".into(), json!(1));
        }
        state.objects.insert(key, value);
    }

    /// Typed read without going through the async trait, for assertions.
    pub fn object<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let state = self.state.lock();
        let key = (K::kind(&()).into_owned(), namespace.to_string(), name.to_string());
        state.objects.get(&key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Sorted names of all stored objects of kind `K` in `namespace`.
    pub fn names<K>(&self, namespace: &str) -> Vec<String>
    where
        K: Resource<DynamicType = ()>,
    {
        let kind = K::kind(&()).into_owned();
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .objects
            .keys()
            .filter(|(k, ns, _)| *k == kind && *ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn log(state: &mut State, verb: &str, kind: &str, namespace: &str, name: &str) {
        if namespace.is_empty() {
            state.ops.push(format!("{verb} {kind} {name}"));
        } else {
            state.ops.push(format!("{verb} {kind} {namespace}/{name}"));
        }
    }
}

fn next_revision(state: &mut State) -> String {
    state.revision += 1;
    state.revision.to_string()
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Mutable handle on `metadata`, inserting an empty object when absent.
fn metadata(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.get("metadata").is_some_and(Value::is_object) {
        value["metadata"] = json!({});
    }
    value["metadata"]
        .as_object_mut()
        .unwrap_or_else(|| unreachable!("metadata forced to an object above"))
}

fn meta_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get("metadata").and_then(|m| m.get(field)).and_then(Value::as_str)
}

fn finalizer_count(value: &Value) -> usize {
    value
        .get("metadata")
        .and_then(|m| m.get("finalizers"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// RFC 7386 merge: objects merge recursively, null deletes, anything else
/// replaces.
fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(fields) => {
            if !target.is_object() {
                *target = json!({});
            }
            if let Some(map) = target.as_object_mut() {
                for (key, value) in fields {
                    if value.is_null() {
                        map.remove(key);
                    } else {
                        merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

fn create_value(
    state: &mut State,
    kind: &str,
    namespace: &str,
    mut value: Value,
) -> Result<Value, StoreError> {
    let name = match meta_str(&value, "name") {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => match meta_str(&value, "generateName") {
            Some(prefix) => format!("{prefix}{}", nanoid::nanoid!(5, &SUFFIX_ALPHABET)),
            None => {
                return Err(StoreError::Invalid {
                    kind: kind.to_string(),
                    field: "metadata.name",
                })
            }
        },
    };
    let key = (kind.to_string(), namespace.to_string(), name.clone());
    if state.objects.contains_key(&key) {
        return Err(StoreError::AlreadyExists { kind: kind.to_string(), name });
    }

    let rv = next_revision(state);
    let meta = metadata(&mut value);
    meta.insert("name".into(), Value::String(name.clone()));
    meta.insert("namespace".into(), Value::String(namespace.to_string()));
    meta.insert("uid".into(), Value::String(nanoid::nanoid!()));
    meta.insert("resourceVersion".into(), Value::String(rv));
    meta.insert("creationTimestamp".into(), Value::String(now_stamp()));
    if kind == "PersistentVolumeClaim" {
        let finalizers = meta.entry("finalizers").or_insert_with(|| json!([]));
        if let Some(list) = finalizers.as_array_mut() {
            if !list.iter().any(|f| f == PVC_PROTECTION) {
                list.push(Value::String(PVC_PROTECTION.into()));
            }
        }
    }
    if value.get("spec").is_some() {
        metadata(&mut value).insert("generation".into(), json!(1));
    }

    FakeStore::log(state, "create", kind, namespace, &name);
    state.objects.insert(key, value.clone());
    Ok(value)
}

fn update_value(
    state: &mut State,
    kind: &str,
    namespace: &str,
    mut incoming: Value,
) -> Result<Value, StoreError> {
    let name = meta_str(&incoming, "name")
        .map(str::to_string)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| StoreError::Invalid { kind: kind.to_string(), field: "metadata.name" })?;
    let key = (kind.to_string(), namespace.to_string(), name.clone());
    let stored = state
        .objects
        .get(&key)
        .cloned()
        .ok_or_else(|| StoreError::NotFound { kind: kind.to_string(), name: name.clone() })?;

    if let Some(rv) = meta_str(&incoming, "resourceVersion") {
        if !rv.is_empty() && Some(rv) != meta_str(&stored, "resourceVersion") {
            return Err(StoreError::Conflict { kind: kind.to_string(), name });
        }
    }

    // Status is a subresource; a regular update never touches it. The server
    // also refuses to change identity fields or clear the deletion mark.
    match stored.get("status") {
        Some(status) => incoming["status"] = status.clone(),
        None => {
            if let Some(map) = incoming.as_object_mut() {
                map.remove("status");
            }
        }
    }
    let spec_changed = incoming.get("spec") != stored.get("spec");
    let generation = stored
        .get("metadata")
        .and_then(|m| m.get("generation"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let rv = next_revision(state);
    let meta = metadata(&mut incoming);
    meta.insert("resourceVersion".into(), Value::String(rv));
    for field in ["uid", "creationTimestamp", "deletionTimestamp"] {
        match stored.get("metadata").and_then(|m| m.get(field)) {
            Some(v) => {
                meta.insert(field.into(), v.clone());
            }
            None => {
                meta.remove(field);
            }
        }
    }
    if incoming.get("spec").is_some() {
        let bumped = if spec_changed { generation + 1 } else { generation };
        metadata(&mut incoming).insert("generation".into(), json!(bumped));
    }

    FakeStore::log(state, "update", kind, namespace, &name);
    if meta_str(&incoming, "deletionTimestamp").is_some() && finalizer_count(&incoming) == 0 {
        state.objects.remove(&key);
        let uid = meta_str(&incoming, "uid").unwrap_or_default().to_string();
        cascade(state, &uid);
    } else {
        state.objects.insert(key, incoming.clone());
    }
    Ok(incoming)
}

fn delete_value(state: &mut State, kind: &str, namespace: &str, name: &str) {
    let key = (kind.to_string(), namespace.to_string(), name.to_string());
    let Some(mut stored) = state.objects.get(&key).cloned() else {
        return;
    };

    if finalizer_count(&stored) > 0 {
        // Graceful deletion: mark the object and bump its generation once.
        // Finalizer owners observe the new generation and run teardown.
        if meta_str(&stored, "deletionTimestamp").is_none() {
            let generation = stored
                .get("metadata")
                .and_then(|m| m.get("generation"))
                .and_then(Value::as_i64);
            let rv = next_revision(state);
            let meta = metadata(&mut stored);
            meta.insert("deletionTimestamp".into(), Value::String(now_stamp()));
            meta.insert("resourceVersion".into(), Value::String(rv));
            if let Some(generation) = generation {
                meta.insert("generation".into(), json!(generation + 1));
            }
            state.objects.insert(key, stored);
        }
    } else {
        state.objects.remove(&key);
        let uid = meta_str(&stored, "uid").unwrap_or_default().to_string();
        cascade(state, &uid);
    }
}

/// Garbage collection for dependents of a removed owner. Deletion is
/// graceful, so dependents holding finalizers linger until their own
/// controllers release them.
fn cascade(state: &mut State, owner_uid: &str) {
    if owner_uid.is_empty() {
        return;
    }
    let dependents: Vec<Key> = state
        .objects
        .iter()
        .filter(|(_, value)| {
            value
                .get("metadata")
                .and_then(|m| m.get("ownerReferences"))
                .and_then(Value::as_array)
                .is_some_and(|refs| {
                    refs.iter().any(|r| r.get("uid").and_then(Value::as_str) == Some(owner_uid))
                })
        })
        .map(|(key, _)| key.clone())
        .collect();
    for (kind, namespace, name) in dependents {
        delete_value(state, &kind, &namespace, &name);
    }
}

fn selector_matches(selector: &str, value: &Value) -> bool {
    if selector.is_empty() {
        return true;
    }
    let labels = value.get("metadata").and_then(|m| m.get("labels"));
    selector.split(',').all(|clause| match clause.split_once('=') {
        Some((key, expected)) => {
            labels.and_then(|l| l.get(key)).and_then(Value::as_str) == Some(expected)
        }
        None => false,
    })
}

#[async_trait]
impl Store for FakeStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        Ok(self.object(namespace, name))
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<K>, StoreError> {
        let kind = K::kind(&()).into_owned();
        let state = self.state.lock();
        let mut matches: Vec<(String, Value)> = state
            .objects
            .iter()
            .filter(|((k, ns, _), value)| {
                *k == kind && *ns == namespace && selector_matches(selector, value)
            })
            .map(|((_, _, name), value)| (name.clone(), value.clone()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        matches.into_iter().map(|(_, value)| Ok(serde_json::from_value(value)?)).collect()
    }

    async fn create<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let kind = K::kind(&()).into_owned();
        let mut state = self.state.lock();
        let value = create_value(&mut state, &kind, namespace, serde_json::to_value(object)?)?;
        Ok(serde_json::from_value(value)?)
    }

    async fn update<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let kind = K::kind(&()).into_owned();
        let mut state = self.state.lock();
        let value = update_value(&mut state, &kind, namespace, serde_json::to_value(object)?)?;
        Ok(serde_json::from_value(value)?)
    }

    async fn patch_status<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        let kind = K::kind(&()).into_owned();
        let mut state = self.state.lock();
        if state.status_conflicts > 0 {
            state.status_conflicts -= 1;
            return Err(StoreError::Conflict { kind, name: name.to_string() });
        }
        let key = (kind.clone(), namespace.to_string(), name.to_string());
        let stored = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { kind: kind.clone(), name: name.to_string() })?;
        if let Some(rv) = meta_str(patch, "resourceVersion") {
            if Some(rv) != meta_str(&stored, "resourceVersion") {
                return Err(StoreError::Conflict { kind, name: name.to_string() });
            }
        }

        let mut updated = stored;
        if let Some(status) = patch.get("status") {
            merge_patch(&mut updated["status"], status);
            let rv = next_revision(&mut state);
            metadata(&mut updated).insert("resourceVersion".into(), Value::String(rv));
            FakeStore::log(&mut state, "patch", &kind, namespace, name);
            state.objects.insert(key, updated);
        }
        Ok(())
    }

    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let kind = K::kind(&()).into_owned();
        let mut state = self.state.lock();
        FakeStore::log(&mut state, "delete", &kind, namespace, name);
        delete_value(&mut state, &kind, namespace, name);
        Ok(())
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>, StoreError> {
        Ok(self.object("", name))
    }

    async fn update_volume(
        &self,
        volume: &PersistentVolume,
    ) -> Result<PersistentVolume, StoreError> {
        let mut state = self.state.lock();
        let value = update_value(&mut state, "PersistentVolume", "", serde_json::to_value(volume)?)?;
        Ok(serde_json::from_value(value)?)
    }
}

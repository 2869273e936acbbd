// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin volume claims: lookup, construction, and binding plumbing.
//!
//! Claims carry only the managed marker and the plugins hash. No owner
//! references: any config resolving to the same plugin set shares them, and
//! they outlive the configs that caused them.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ObjectReference, PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use sv_core::{labels, plugins, EffectiveAgentConfig};

use crate::error::OperatorError;
use crate::store::{Store, StoreError};

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;

pub(crate) const TEMP_CLAIM_PREFIX: &str = "plugins-tmp-";

/// Annotations the volume controller writes on claims it binds; set by hand
/// when adopting an already-provisioned volume under a new claim.
const BIND_COMPLETED: &str = "pv.kubernetes.io/bind-completed";
const BOUND_BY_CONTROLLER: &str = "pv.kubernetes.io/bound-by-controller";

pub(crate) fn claim_labels(hash: &str) -> BTreeMap<String, String> {
    [
        (labels::MANAGED.to_string(), "true".to_string()),
        (labels::PLUGINS_HASH.to_string(), hash.to_string()),
    ]
    .into_iter()
    .collect()
}

/// The claims labeled with one plugins hash, split by role.
#[derive(Debug, Default)]
pub(crate) struct PluginClaims {
    /// Claim named for the content hash; the durable one.
    pub ready: Option<PersistentVolumeClaim>,
    /// Install-scratch claim awaiting adoption.
    pub temp: Option<PersistentVolumeClaim>,
}

/// Look up the claims for `hash`. More than two means something outside the
/// operator created claims under our labels, and no automatic choice of
/// which to keep is safe.
pub(crate) async fn find_claims<S: Store>(
    store: &S,
    namespace: &str,
    hash: &str,
) -> Result<PluginClaims, OperatorError> {
    let selector = labels::selector(&claim_labels(hash));
    let claims = store.list::<PersistentVolumeClaim>(namespace, &selector).await?;
    if claims.len() > 2 {
        return Err(OperatorError::ClaimCardinality { hash: hash.to_string(), found: claims.len() });
    }

    let ready_name = plugins::claim_name(hash);
    let mut split = PluginClaims::default();
    for claim in claims {
        if claim.metadata.name.as_deref() == Some(ready_name.as_str()) {
            split.ready = Some(claim);
        } else {
            split.temp = Some(claim);
        }
    }
    Ok(split)
}

/// True once the volume controller filled in a volume and flipped the phase.
pub(crate) fn is_bound(claim: &PersistentVolumeClaim) -> bool {
    let phase = claim.status.as_ref().and_then(|s| s.phase.as_deref());
    volume_name(claim).is_some() && phase == Some("Bound")
}

pub(crate) fn volume_name(claim: &PersistentVolumeClaim) -> Option<&str> {
    claim.spec.as_ref().and_then(|s| s.volume_name.as_deref()).filter(|v| !v.is_empty())
}

/// Scratch claim for an install job to fill.
pub(crate) fn temp_claim(
    namespace: &str,
    hash: &str,
    config: &EffectiveAgentConfig,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            generate_name: Some(TEMP_CLAIM_PREFIX.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(claim_labels(hash)),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some([("storage".to_string(), config.volume_size.clone())].into()),
                ..VolumeResourceRequirements::default()
            }),
            storage_class_name: config.storage_class_name.clone(),
            ..PersistentVolumeClaimSpec::default()
        }),
        status: None,
    }
}

/// Claim named for the content hash, pre-pointed at the volume the install
/// filled. The bind annotations mark the pairing as deliberate so the
/// volume controller completes it instead of provisioning fresh.
pub(crate) fn hash_claim(
    namespace: &str,
    hash: &str,
    temp: &PersistentVolumeClaim,
) -> PersistentVolumeClaim {
    let spec = temp.spec.clone().unwrap_or_default();
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(plugins::claim_name(hash)),
            namespace: Some(namespace.to_string()),
            labels: Some(claim_labels(hash)),
            annotations: Some(
                [
                    (BIND_COMPLETED.to_string(), "yes".to_string()),
                    (BOUND_BY_CONTROLLER.to_string(), "yes".to_string()),
                ]
                .into(),
            ),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: spec.access_modes.clone(),
            resources: spec.resources.clone(),
            storage_class_name: spec.storage_class_name.clone(),
            volume_name: spec.volume_name.clone(),
            ..PersistentVolumeClaimSpec::default()
        }),
        status: None,
    }
}

/// Point `volume_name`'s claim reference at `claim`, releasing its old
/// binding. Idempotent; a volume already pointing at the claim is left
/// alone.
pub(crate) async fn repoint_volume<S: Store>(
    store: &S,
    volume_name: &str,
    claim: &PersistentVolumeClaim,
) -> Result<(), OperatorError> {
    let mut volume = store.get_volume(volume_name).await?.ok_or_else(|| {
        StoreError::NotFound { kind: "PersistentVolume".to_string(), name: volume_name.to_string() }
    })?;
    let spec = volume.spec.get_or_insert_with(Default::default);
    let current = spec.claim_ref.as_ref().and_then(|r| r.name.as_deref());
    if current == claim.metadata.name.as_deref() {
        return Ok(());
    }
    spec.claim_ref = Some(ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("PersistentVolumeClaim".to_string()),
        namespace: claim.metadata.namespace.clone(),
        name: claim.metadata.name.clone(),
        uid: claim.metadata.uid.clone(),
        ..ObjectReference::default()
    });
    store.update_volume(&volume).await?;
    Ok(())
}

/// Delete a claim and strip whatever finalizers hold it in Terminating.
pub(crate) async fn delete_claim<S: Store>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<(), OperatorError> {
    store.delete::<PersistentVolumeClaim>(namespace, name).await?;
    if let Some(mut lingering) = store.get::<PersistentVolumeClaim>(namespace, name).await? {
        if lingering.metadata.finalizers.as_deref().is_some_and(|f| !f.is_empty()) {
            lingering.metadata.finalizers = None;
            store.update(namespace, &lingering).await?;
        }
    }
    Ok(())
}

/// Cleanup-path removal. The bound volume's finalizers go first so the
/// claim's deletion can reclaim it instead of wedging.
pub(crate) async fn remove_claim<S: Store>(
    store: &S,
    namespace: &str,
    claim: &PersistentVolumeClaim,
) -> Result<(), OperatorError> {
    if let Some(volume_name) = volume_name(claim) {
        if let Some(mut volume) = store.get_volume(volume_name).await? {
            if volume.metadata.finalizers.as_deref().is_some_and(|f| !f.is_empty()) {
                volume.metadata.finalizers = None;
                store.update_volume(&volume).await?;
            }
        }
    }
    let Some(name) = claim.metadata.name.as_deref() else {
        return Ok(());
    };
    delete_claim(store, namespace, name).await
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AgentConfig reconciler and the plugin volume state machine.
//!
//! A config's plugin set hashes to a claim name. The first config to ask
//! for a set drives an install into a scratch claim, then rebinds the
//! filled volume under the hash-named claim; every later config with the
//! same set finds the hash claim already bound and goes straight to ready.

use k8s_openapi::api::core::v1::{
    LocalObjectReference, PersistentVolumeClaim, PersistentVolumeClaimVolumeSource, Volume,
    VolumeMount,
};
use k8s_openapi::ByteString;
use kube::Resource;
use serde_json::json;
use sv_core::{
    plugins, AgentAction, AgentActionSpec, AgentConfig, Clock, EffectiveAgentConfig, Reconcilable,
    DEFAULT_CONFIG_NAME,
};
use tracing::{debug, info, warn};

use crate::dispatch::job::PLUGINS_MOUNT;
use crate::error::OperatorError;
use crate::finalizer;
use crate::patch::patch_status_with_retry;
use crate::store::Store;

use super::claims::{self, PluginClaims};
use super::{actions, Context, Settings};

#[cfg(test)]
#[path = "agent_config_tests.rs"]
mod tests;

/// Layered configuration for `namespace`, lowest priority first: the
/// system default, the namespace default, then the named instance.
pub(crate) async fn effective_config<S: Store>(
    store: &S,
    settings: &Settings,
    namespace: &str,
    instance: Option<&str>,
) -> Result<EffectiveAgentConfig, OperatorError> {
    let mut keys: Vec<(&str, &str)> = vec![
        (settings.namespace.as_str(), DEFAULT_CONFIG_NAME),
        (namespace, DEFAULT_CONFIG_NAME),
    ];
    if let Some(instance) = instance {
        keys.push((namespace, instance));
    }
    // Duplicate layers are always adjacent here.
    keys.dedup();

    let mut specs = Vec::new();
    for (ns, name) in keys {
        if let Some(config) = store.get::<AgentConfig>(ns, name).await? {
            specs.push(config.spec);
        }
    }
    Ok(EffectiveAgentConfig::resolve(specs.iter()))
}

/// One reconcile pass for an `AgentConfig`.
pub async fn reconcile_agent_config<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
) -> Result<(), OperatorError> {
    let Some(config) = ctx.store.get::<AgentConfig>(namespace, name).await? else {
        debug!(kind = AgentConfig::KIND, name, "resource is gone");
        return Ok(());
    };
    let effective = effective_config(&ctx.store, &ctx.settings, namespace, Some(name)).await?;
    let hash = plugins::hash(&effective.plugins)?;

    if finalizer::is_deleted(&config) {
        return cleanup(ctx, namespace, &config, &hash).await;
    }

    let generation = config.meta().generation;
    let action = actions::find_action(
        &ctx.store,
        namespace,
        AgentConfig::KIND,
        name,
        generation.unwrap_or_default(),
    )
    .await?;

    let status = actions::status_from_action(generation, action.as_ref());
    if config.status() != Some(&status) {
        actions::write_status::<AgentConfig, _, _>(ctx, namespace, name, &status).await?;
    }

    if let Some(action) = &action {
        if action.retry() != config.retry() {
            return actions::propagate_retry(ctx, namespace, name, &config, action).await;
        }
    }

    // The finalizer lands before any claim exists so nothing this config
    // creates can outlive the cleanup bookkeeping.
    if finalizer::ensure(&ctx.store, namespace, &config).await? {
        return Ok(());
    }

    advance_volume(ctx, namespace, &config, &effective, &hash, action).await
}

/// Move the plugin volume one step toward bound-under-the-hash-claim.
///
/// Each arm makes at most one write; the resulting watch event (or the
/// periodic requeue, for claims nothing owns) drives the next step.
async fn advance_volume<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    config: &AgentConfig,
    effective: &EffectiveAgentConfig,
    hash: &str,
    action: Option<AgentAction>,
) -> Result<(), OperatorError> {
    let name = config.meta().name.as_deref().unwrap_or_default();

    // An empty plugin set needs no volume at all.
    if effective.plugins.is_empty() {
        return set_ready(ctx, namespace, name, true).await;
    }

    let found = claims::find_claims(&ctx.store, namespace, hash).await?;

    if let Some(ready) = &found.ready {
        if claims::is_bound(ready) {
            if let Some(temp) = &found.temp {
                if let Some(temp_name) = temp.metadata.name.as_deref() {
                    info!(config = name, hash, temp = temp_name, "removing adopted scratch claim");
                    claims::delete_claim(&ctx.store, namespace, temp_name).await?;
                }
            }
            return set_ready(ctx, namespace, name, true).await;
        }
        if let Some(volume) = claims::volume_name(ready) {
            info!(config = name, hash, volume, "rebinding volume under the hash claim");
            claims::repoint_volume(&ctx.store, volume, ready).await?;
        }
        return set_ready(ctx, namespace, name, false).await;
    }

    match action {
        None => {
            let temp = match found.temp {
                Some(temp) => temp,
                None => {
                    let temp = ctx
                        .store
                        .create(namespace, &claims::temp_claim(namespace, hash, effective))
                        .await?;
                    info!(
                        config = name,
                        hash,
                        claim = temp.metadata.name.as_deref().unwrap_or_default(),
                        "created scratch claim for plugin install"
                    );
                    temp
                }
            };
            dispatch_install(ctx, namespace, name, config, effective, &temp).await
        }
        Some(action) if !action.is_terminal() => Ok(()),
        Some(action) if !action.is_complete() => set_ready(ctx, namespace, name, false).await,
        Some(_) => match found.temp {
            None => {
                warn!(config = name, hash, "install finished but the scratch claim is gone");
                set_ready(ctx, namespace, name, false).await
            }
            Some(temp) if !claims::is_bound(&temp) => Ok(()),
            Some(temp) => {
                info!(config = name, hash, "install complete, claiming the filled volume");
                ctx.store.create(namespace, &claims::hash_claim(namespace, hash, &temp)).await?;
                Ok(())
            }
        },
    }
}

/// Remove the claims for this config's plugin set, then let go of the
/// config. Claims are unowned and emit no events for this config, so the
/// finalizer release happens in the same pass the claims disappear.
async fn cleanup<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    config: &AgentConfig,
    hash: &str,
) -> Result<(), OperatorError> {
    if !finalizer::has_finalizer(config) {
        return Ok(());
    }
    let name = config.meta().name.as_deref().unwrap_or_default();
    let found = claims::find_claims(&ctx.store, namespace, hash).await?;
    if found.ready.is_none() && found.temp.is_none() {
        info!(config = name, hash, "plugin claims removed, releasing finalizer");
        return finalizer::release(&ctx.store, namespace, config).await;
    }

    let PluginClaims { ready, temp } = found;
    for claim in [ready, temp].into_iter().flatten() {
        info!(
            config = name,
            hash,
            claim = claim.metadata.name.as_deref().unwrap_or_default(),
            "removing plugin claim"
        );
        claims::remove_claim(&ctx.store, namespace, &claim).await?;
    }

    let remaining = claims::find_claims(&ctx.store, namespace, hash).await?;
    if remaining.ready.is_none() && remaining.temp.is_none() {
        info!(config = name, hash, "plugin claims removed, releasing finalizer");
        finalizer::release(&ctx.store, namespace, config).await?;
    }
    Ok(())
}

/// Flip `status.ready` when it differs from `ready`.
async fn set_ready<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
    ready: bool,
) -> Result<(), OperatorError> {
    patch_status_with_retry::<AgentConfig, _, _, _, _>(
        &ctx.store,
        &ctx.clock,
        namespace,
        name,
        move |current| {
            (current.status.as_ref().map(|s| s.ready).unwrap_or_default() != ready)
                .then(|| json!({ "ready": ready }))
        },
    )
    .await
}

/// Dispatch the install action, writing the plugin set into `temp`.
async fn dispatch_install<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
    config: &AgentConfig,
    effective: &EffectiveAgentConfig,
    temp: &PersistentVolumeClaim,
) -> Result<(), OperatorError> {
    let document = plugins::document(&effective.plugins)?;
    let spec = AgentActionSpec {
        agent_config: Some(LocalObjectReference { name: name.to_string() }),
        args: plugins::install_args(),
        files: [(plugins::FILE.to_string(), ByteString(document))].into(),
        volumes: vec![Volume {
            name: "plugins".to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: temp.metadata.name.clone().unwrap_or_default(),
                read_only: None,
            }),
            ..Volume::default()
        }],
        volume_mounts: vec![VolumeMount {
            name: "plugins".to_string(),
            mount_path: PLUGINS_MOUNT.to_string(),
            ..VolumeMount::default()
        }],
        ..AgentActionSpec::default()
    };
    actions::submit(ctx, namespace, name, config, spec).await
}

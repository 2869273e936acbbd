// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller wiring for the `svd` binary.
//!
//! One controller per managed kind, all sharing a [`Context`]. Resource
//! controllers own the actions they dispatch, so an action status flip
//! requeues the owner; the action controller owns its jobs for the same
//! reason. Everything else the dispatcher creates is owned by the action
//! and needs no watch of its own.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use sv_core::{AgentAction, AgentConfig, CredentialSet, Installation, ParameterSet, SystemClock};
use tracing::{debug, info, warn};

use crate::dispatch::reconcile_action;
use crate::error::OperatorError;
use crate::reconcile::{
    self, reconcile_agent_config, reconcile_credential_set, reconcile_installation,
    reconcile_parameter_set, Context, Settings,
};
use crate::store::{ClusterStore, StoreError};

type Ctx = Context<ClusterStore, SystemClock>;

/// Requeue delay after a failed reconcile pass.
const ERROR_REQUEUE: Duration = Duration::from_secs(10);

/// Run all controllers until a shutdown signal arrives.
pub async fn run(settings: Settings) -> Result<(), OperatorError> {
    let client = Client::try_default().await.map_err(StoreError::Api)?;
    info!(namespace = %settings.namespace, "starting controllers");

    let ctx =
        Arc::new(Context { store: ClusterStore::new(client.clone()), clock: SystemClock, settings });

    let installations =
        Controller::new(Api::<Installation>::all(client.clone()), watcher::Config::default())
            .owns(Api::<AgentAction>::all(client.clone()), watcher::Config::default())
            .shutdown_on_signal()
            .run(installation, error_policy, ctx.clone())
            .for_each(observe);

    let credential_sets =
        Controller::new(Api::<CredentialSet>::all(client.clone()), watcher::Config::default())
            .owns(Api::<AgentAction>::all(client.clone()), watcher::Config::default())
            .shutdown_on_signal()
            .run(credential_set, error_policy, ctx.clone())
            .for_each(observe);

    let parameter_sets =
        Controller::new(Api::<ParameterSet>::all(client.clone()), watcher::Config::default())
            .owns(Api::<AgentAction>::all(client.clone()), watcher::Config::default())
            .shutdown_on_signal()
            .run(parameter_set, error_policy, ctx.clone())
            .for_each(observe);

    let agent_configs =
        Controller::new(Api::<AgentConfig>::all(client.clone()), watcher::Config::default())
            .owns(Api::<AgentAction>::all(client.clone()), watcher::Config::default())
            .shutdown_on_signal()
            .run(agent_config, error_policy, ctx.clone())
            .for_each(observe);

    let actions =
        Controller::new(Api::<AgentAction>::all(client.clone()), watcher::Config::default())
            .owns(Api::<Job>::all(client.clone()), watcher::Config::default())
            .shutdown_on_signal()
            .run(action, error_policy, ctx.clone())
            .for_each(observe);

    tokio::join!(installations, credential_sets, parameter_sets, agent_configs, actions);
    info!("controllers stopped");
    Ok(())
}

async fn installation(object: Arc<Installation>, ctx: Arc<Ctx>) -> Result<Action, OperatorError> {
    let (namespace, name) = reconcile::meta_parts(object.as_ref())?;
    reconcile_installation(ctx.as_ref(), namespace, name).await?;
    Ok(Action::requeue(ctx.settings.resync))
}

async fn credential_set(object: Arc<CredentialSet>, ctx: Arc<Ctx>) -> Result<Action, OperatorError> {
    let (namespace, name) = reconcile::meta_parts(object.as_ref())?;
    reconcile_credential_set(ctx.as_ref(), namespace, name).await?;
    Ok(Action::requeue(ctx.settings.resync))
}

async fn parameter_set(object: Arc<ParameterSet>, ctx: Arc<Ctx>) -> Result<Action, OperatorError> {
    let (namespace, name) = reconcile::meta_parts(object.as_ref())?;
    reconcile_parameter_set(ctx.as_ref(), namespace, name).await?;
    Ok(Action::requeue(ctx.settings.resync))
}

async fn agent_config(object: Arc<AgentConfig>, ctx: Arc<Ctx>) -> Result<Action, OperatorError> {
    let (namespace, name) = reconcile::meta_parts(object.as_ref())?;
    reconcile_agent_config(ctx.as_ref(), namespace, name).await?;
    Ok(Action::requeue(ctx.settings.resync))
}

async fn action(object: Arc<AgentAction>, ctx: Arc<Ctx>) -> Result<Action, OperatorError> {
    let (namespace, name) = reconcile::meta_parts(object.as_ref())?;
    reconcile_action(ctx.as_ref(), namespace, name).await?;
    Ok(Action::requeue(ctx.settings.resync))
}

fn error_policy<K: ResourceExt>(object: Arc<K>, error: &OperatorError, _ctx: Arc<Ctx>) -> Action {
    warn!(object = %object.name_any(), %error, "reconcile failed");
    Action::requeue(ERROR_REQUEUE)
}

/// Log one controller turn.
async fn observe<T: Debug, E: std::fmt::Display>(result: Result<T, E>) {
    match result {
        Ok(object) => debug!(?object, "reconciled"),
        Err(error) => warn!(%error, "controller turn failed"),
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution dispatcher: realizes each `AgentAction` as a sandboxed job.
//!
//! The dispatcher never interprets the action's command; it builds the
//! sandbox (job, volumes, secrets), runs whatever the action carries, and
//! reflects the job's fate back onto the action status. Resource
//! reconcilers watch that status, never the job.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::Job;
use kube::{Resource, ResourceExt};
use sv_core::{
    labels, plugins, AgentAction, AgentConfig, Clock, EffectiveAgentConfig, Reconcilable,
};
use tracing::{debug, info};

use crate::error::OperatorError;
use crate::finalizer;
use crate::patch::patch_status_with_retry;
use crate::reconcile::{effective_config, Context};
use crate::store::Store;

mod derive;
pub(crate) mod deps;
pub(crate) mod job;

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;

/// One reconcile pass for an `AgentAction`.
pub async fn reconcile_action<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
) -> Result<(), OperatorError> {
    let Some(action) = ctx.store.get::<AgentAction>(namespace, name).await? else {
        debug!(kind = %AgentAction::kind(&()), name, "action is gone");
        return Ok(());
    };

    if finalizer::is_deleted(&action) {
        // The job, secrets, and shared claim are owned by the action and
        // collected with it; nothing needs tearing down by hand.
        if finalizer::has_finalizer(&action) {
            info!(action = name, "releasing finalizer");
            finalizer::release(&ctx.store, namespace, &action).await?;
        }
        return Ok(());
    }
    if finalizer::ensure(&ctx.store, namespace, &action).await? {
        return Ok(());
    }

    let config_name = action.spec.agent_config.as_ref().map(|r| r.name.as_str());
    let effective = effective_config(&ctx.store, &ctx.settings, namespace, config_name).await?;

    let generation = action.metadata.generation.unwrap_or_default();
    let identity =
        labels::action_labels(&AgentAction::kind(&()), name, generation, action.retry());

    // The selector carries the retry digest, so a changed marker reads as
    // "no job yet" and runs again.
    let mut job_selector = identity.clone();
    job_selector.insert(labels::JOB_TYPE.to_string(), labels::JOB_TYPE_AGENT.to_string());
    let jobs = ctx.store.list::<Job>(namespace, &labels::selector(&job_selector)).await?;

    let job = match jobs.into_iter().next() {
        Some(job) => job,
        None => {
            // A finished action stays finished after its job is collected.
            if action.is_terminal()
                && action.status.as_ref().is_some_and(|s| s.job.is_some())
            {
                return Ok(());
            }
            create_job(ctx, namespace, name, &action, &effective, &identity).await?
        }
    };

    let status = derive::derive_status(&action, &job, ctx.clock.now_utc());
    patch_status_with_retry::<AgentAction, _, _, _, _>(
        &ctx.store,
        &ctx.clock,
        namespace,
        name,
        move |current| (current.status.as_ref() != Some(&status)).then(|| status.clone()),
    )
    .await
}

async fn create_job<S: Store, C: Clock>(
    ctx: &Context<S, C>,
    namespace: &str,
    name: &str,
    action: &AgentAction,
    effective: &EffectiveAgentConfig,
    identity: &BTreeMap<String, String>,
) -> Result<Job, OperatorError> {
    // Plugin installs bring their own writable mount; everything else gets
    // the hash-named claim for its effective plugin set, when there is one.
    let install =
        action.labels().get(labels::RESOURCE_KIND).map(String::as_str) == Some(AgentConfig::KIND);
    let plugins_claim = if install || effective.plugins.is_empty() {
        None
    } else {
        Some(plugins::claim_name(&plugins::hash(&effective.plugins)?))
    };

    let deps = deps::ensure_deps(ctx, namespace, action, effective).await?;
    let built = job::build_job(&job::JobParams {
        action,
        effective,
        deps: &deps,
        identity,
        plugins_claim,
        cleanup_jobs: ctx.settings.cleanup_jobs,
    });
    let created = ctx.store.create(namespace, &built).await?;
    info!(action = name, job = %created.name_any(), "created agent job");
    Ok(created)
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job spec construction for sandboxed agent runs.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, LocalObjectReference, PersistentVolumeClaimVolumeSource, PodSecurityContext,
    PodSpec, PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use sv_core::{labels, AgentAction, EffectiveAgentConfig};

use super::deps::ActionDeps;

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

/// Mount points inside the agent container.
pub(crate) const SHARED_MOUNT: &str = "/stevedore/shared";
pub(crate) const CONFIG_MOUNT: &str = "/stevedore/config";
pub(crate) const WORKDIR_MOUNT: &str = "/stevedore/workdir";
pub(crate) const PLUGINS_MOUNT: &str = "/stevedore/plugins";

/// TTL for finished jobs when the config sets none.
const DEFAULT_TTL_SECONDS: i32 = 600;

/// Nonroot uid baked into the agent image.
const AGENT_UID: i64 = 65532;

/// Parameters for building an agent job.
pub(super) struct JobParams<'a> {
    pub action: &'a AgentAction,
    pub effective: &'a EffectiveAgentConfig,
    pub deps: &'a ActionDeps,
    /// Identity labels of the action; the job carries them plus the job
    /// type, and hands them to the sandbox for the jobs it spawns itself.
    pub identity: &'a BTreeMap<String, String>,
    /// Hash-named claim mounted read-only at the plugins path. None for
    /// plugin installs, which bring their own writable mount.
    pub plugins_claim: Option<String>,
    /// Whether finished jobs carry a TTL.
    pub cleanup_jobs: bool,
}

/// Build the job realizing an action.
pub(super) fn build_job(params: &JobParams<'_>) -> Job {
    let action = params.action;
    let name = action.name_any();
    let namespace = action.meta().namespace.clone();

    let mut job_labels = params.identity.clone();
    job_labels.insert(labels::JOB_TYPE.to_string(), labels::JOB_TYPE_AGENT.to_string());

    // Labels for jobs the sandboxed agent creates in turn.
    let mut installer_labels = params.identity.clone();
    installer_labels.insert(labels::JOB_TYPE.to_string(), labels::JOB_TYPE_INSTALLER.to_string());

    // Scheduling identity, minus the managed marker. Installer pods use
    // these to land on the node holding the shared volume.
    let affinity: BTreeMap<String, String> = params
        .identity
        .iter()
        .filter(|(k, _)| k.as_str() != labels::MANAGED)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut env = vec![
        env_var("SV_RUNTIME_DRIVER", "kubernetes"),
        env_var("SV_NAMESPACE", namespace.as_deref().unwrap_or_default()),
        env_var("SV_IN_CLUSTER", "true"),
        env_var("SV_JOB_LABELS", &labels::env_string(&installer_labels)),
        env_var("SV_AFFINITY_MATCH_LABELS", &labels::env_string(&affinity)),
        env_var("SV_SHARED_VOLUME", &params.deps.shared_pvc),
        env_var("SV_SHARED_VOLUME_PATH", SHARED_MOUNT),
        env_var("SV_CLEANUP_JOBS", if params.cleanup_jobs { "true" } else { "false" }),
    ];
    if let Some(ref account) = params.effective.installer_service_account {
        env.push(env_var("SV_INSTALLER_SERVICE_ACCOUNT", account));
    }
    env.extend(action.spec.env.iter().cloned());

    let mut volumes = vec![
        Volume {
            name: "shared".to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: params.deps.shared_pvc.clone(),
                read_only: None,
            }),
            ..Default::default()
        },
        secret_volume("config", &params.deps.config_secret),
        secret_volume("workdir", &params.deps.workdir_secret),
    ];
    let mut volume_mounts = vec![
        mount("shared", SHARED_MOUNT, false),
        mount("config", CONFIG_MOUNT, true),
        mount("workdir", WORKDIR_MOUNT, true),
    ];

    // Plugin volume, shared by every action resolving to the same set.
    if let Some(ref claim) = params.plugins_claim {
        volumes.push(Volume {
            name: "plugins".to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.clone(),
                read_only: Some(true),
            }),
            ..Default::default()
        });
        volume_mounts.push(mount("plugins", PLUGINS_MOUNT, true));
    }

    // Action-supplied volumes come last, so a plugin install can mount its
    // scratch claim writable without colliding with the defaults.
    volumes.extend(action.spec.volumes.iter().cloned());
    volume_mounts.extend(action.spec.volume_mounts.iter().cloned());

    let container = Container {
        name: "agent".to_string(),
        image: Some(params.effective.image.clone()),
        image_pull_policy: Some(params.effective.pull_policy.clone()),
        command: (!action.spec.command.is_empty()).then(|| action.spec.command.clone()),
        args: (!action.spec.args.is_empty()).then(|| action.spec.args.clone()),
        working_dir: Some(WORKDIR_MOUNT.to_string()),
        env: Some(env),
        env_from: (!action.spec.env_from.is_empty()).then(|| action.spec.env_from.clone()),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    let pod_spec = PodSpec {
        containers: vec![container],
        volumes: Some(volumes),
        restart_policy: Some("Never".to_string()),
        service_account_name: params.effective.service_account.clone(),
        image_pull_secrets: params
            .deps
            .pull_secret
            .as_ref()
            .map(|name| vec![LocalObjectReference { name: name.clone() }]),
        // The agent runs nonroot; group 0 keeps the mounted volumes
        // writable across images.
        security_context: Some(PodSecurityContext {
            run_as_user: Some(AGENT_UID),
            run_as_group: Some(0),
            fs_group: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}-")),
            namespace: namespace.clone(),
            labels: Some(job_labels.clone()),
            owner_references: action.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            completions: Some(1),
            backoff_limit: Some(0),
            ttl_seconds_after_finished: params.cleanup_jobs.then(|| {
                params.effective.ttl_seconds_after_finished.unwrap_or(DEFAULT_TTL_SECONDS)
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(job_labels), ..Default::default() }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar { name: name.to_string(), value: Some(value.to_string()), ..Default::default() }
}

fn secret_volume(name: &str, secret: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

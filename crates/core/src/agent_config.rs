// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `AgentConfig` resource: how agent jobs run and which plugins they
//! get.
//!
//! Configs layer: a `default` config in the operator namespace, then a
//! `default` config in the resource namespace, then the instance a
//! resource references. Later layers win field by field; the plugins map
//! replaces wholesale, never merges, so a hash of the effective map is a
//! faithful identity for the plugin volume.

use crate::resource::Reconcilable;
use crate::status::ResourceStatus;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_AGENT_REPOSITORY: &str = "ghcr.io/stevedore/agent";
pub const DEFAULT_AGENT_VERSION: &str = "v1.2.0";
pub const DEFAULT_VOLUME_SIZE: &str = "64Mi";

/// Name every layer lookup uses for namespace and operator defaults.
pub const DEFAULT_CONFIG_NAME: &str = "default";

/// Desired agent behavior for resources that reference this config.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "stevedore.dev",
    version = "v1",
    kind = "AgentConfig",
    namespaced,
    status = "AgentConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfigSpec {
    /// Image repository the agent runs from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_repository: Option<String>,
    /// Image tag the agent runs from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    /// Service account the agent job runs under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    /// Service account handed to nested installer jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer_service_account: Option<String>,
    /// Size of the shared workspace volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
    /// Name of a pull secret to copy next to each job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// TTL applied to finished agent jobs when cleanup is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<i32>,
    /// Plugins installed into the shared plugin volume.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, Plugin>,
}

/// Where one plugin comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Status of an `AgentConfig`, extending the shared shape with readiness
/// of its plugin volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfigStatus {
    #[serde(flatten)]
    pub shared: ResourceStatus,
    /// True once the plugin volume for the current spec is bound.
    #[serde(default)]
    pub ready: bool,
}

impl AgentConfigSpec {
    /// Overlay `over` on top of `self`, later writer wins per field.
    fn layer(&mut self, over: &AgentConfigSpec) {
        fn take<T: Clone>(slot: &mut Option<T>, over: &Option<T>) {
            if over.is_some() {
                slot.clone_from(over);
            }
        }
        take(&mut self.agent_repository, &over.agent_repository);
        take(&mut self.agent_version, &over.agent_version);
        take(&mut self.service_account, &over.service_account);
        take(&mut self.installer_service_account, &over.installer_service_account);
        take(&mut self.volume_size, &over.volume_size);
        take(&mut self.pull_policy, &over.pull_policy);
        take(&mut self.pull_secret, &over.pull_secret);
        take(&mut self.storage_class_name, &over.storage_class_name);
        take(&mut self.ttl_seconds_after_finished, &over.ttl_seconds_after_finished);
        if !over.plugins.is_empty() {
            self.plugins = over.plugins.clone();
        }
    }
}

/// Fully layered configuration with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveAgentConfig {
    pub image: String,
    pub pull_policy: String,
    pub service_account: Option<String>,
    pub installer_service_account: Option<String>,
    pub pull_secret: Option<String>,
    pub volume_size: Quantity,
    pub storage_class_name: Option<String>,
    pub ttl_seconds_after_finished: Option<i32>,
    pub plugins: BTreeMap<String, Plugin>,
}

impl EffectiveAgentConfig {
    /// Resolve `layers` lowest priority first.
    pub fn resolve<'a>(layers: impl IntoIterator<Item = &'a AgentConfigSpec>) -> Self {
        let mut merged = AgentConfigSpec::default();
        for layer in layers {
            merged.layer(layer);
        }
        Self::from_spec(merged)
    }

    fn from_spec(spec: AgentConfigSpec) -> Self {
        let version =
            spec.agent_version.clone().unwrap_or_else(|| DEFAULT_AGENT_VERSION.to_string());
        let repository = spec
            .agent_repository
            .clone()
            .unwrap_or_else(|| DEFAULT_AGENT_REPOSITORY.to_string());
        let pull_policy = spec.pull_policy.clone().unwrap_or_else(|| {
            // Mutable tags must be re-pulled to pick up pushes.
            match version.as_str() {
                "latest" | "canary" | "dev" => "Always".to_string(),
                _ => "IfNotPresent".to_string(),
            }
        });
        Self {
            image: format!("{repository}:{version}"),
            pull_policy,
            service_account: spec.service_account,
            installer_service_account: spec.installer_service_account,
            pull_secret: spec.pull_secret,
            volume_size: Quantity(
                spec.volume_size.unwrap_or_else(|| DEFAULT_VOLUME_SIZE.to_string()),
            ),
            storage_class_name: spec.storage_class_name,
            ttl_seconds_after_finished: spec.ttl_seconds_after_finished,
            plugins: spec.plugins,
        }
    }
}

impl Default for EffectiveAgentConfig {
    fn default() -> Self {
        Self::resolve([])
    }
}

impl Reconcilable for AgentConfig {
    const KIND: &'static str = "AgentConfig";

    fn status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref().map(|s| &s.shared)
    }

    fn agent_config_name(&self) -> Option<&str> {
        // Plugin installs run under the config being reconciled.
        self.meta().name.as_deref()
    }
}

#[cfg(test)]
#[path = "agent_config_tests.rs"]
mod tests;

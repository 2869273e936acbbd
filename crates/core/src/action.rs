// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `AgentAction` resource: one command run by the sandboxed agent.
//!
//! Created once per (resource kind, resource name, generation) and treated
//! as immutable after that; only the retry annotation and the status ever
//! change. The dispatcher realizes it as a `batch/v1` Job and derives the
//! status here purely from what the Job reports.

use crate::labels;
use crate::status::{condition_true, Phase, CONDITION_COMPLETE};
use k8s_openapi::api::core::v1::{
    EnvFromSource, EnvVar, LocalObjectReference, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use k8s_openapi::ByteString;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single command for the agent to execute.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "stevedore.dev",
    version = "v1",
    kind = "AgentAction",
    namespaced,
    status = "AgentActionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AgentActionSpec {
    /// Agent config resolved when building the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<LocalObjectReference>,
    /// Entrypoint override for the agent container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Files materialized into the agent workdir.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "byte_string_map_schema")]
    pub files: BTreeMap<String, ByteString>,
    /// Extra environment for the agent container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvFromSource>,
    /// Extra volumes mounted into the agent pod.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

/// `ByteString` has no `JsonSchema` impl in k8s-openapi, so spell out the
/// schema its generated types use for base64 maps: string values, format
/// `byte`.
fn byte_string_map_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    use schemars::schema::{InstanceType, ObjectValidation, Schema, SchemaObject, SingleOrVec};
    Schema::Object(SchemaObject {
        instance_type: Some(SingleOrVec::Single(Box::new(InstanceType::Object))),
        object: Some(Box::new(ObjectValidation {
            additional_properties: Some(Box::new(Schema::Object(SchemaObject {
                instance_type: Some(SingleOrVec::Single(Box::new(InstanceType::String))),
                format: Some("byte".to_owned()),
                ..Default::default()
            }))),
            ..Default::default()
        })),
        ..Default::default()
    })
}

/// Observed state of the job realizing this action.
///
/// Like `ResourceStatus`, every field serializes so merge patches can reset
/// prior observations with explicit nulls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentActionStatus {
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Job realizing this action.
    #[serde(default)]
    pub job: Option<LocalObjectReference>,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl AgentAction {
    /// Retry marker; empty when the annotation is unset.
    pub fn retry(&self) -> &str {
        self.annotations()
            .get(labels::RETRY_ANNOTATION)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// True once the action has finished, in either direction.
    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// True when the run finished successfully.
    pub fn is_complete(&self) -> bool {
        self.phase() == Phase::Succeeded
            && self
                .status
                .as_ref()
                .is_some_and(|s| condition_true(&s.conditions, CONDITION_COMPLETE))
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `ParameterSet` resource: named parameters mapped to sources.

use crate::resource::{render, DocumentError, DocumentResource, Reconcilable};
use crate::status::ResourceStatus;
use k8s_openapi::api::core::v1::LocalObjectReference;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: &str = "1.0.1";

/// Desired state of a published parameter set.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "stevedore.dev",
    version = "v1",
    kind = "ParameterSet",
    namespaced,
    status = "ResourceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSetSpec {
    /// Agent config used to run this set's actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Published name; defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Published namespace; defaults to the object namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

/// One named parameter and where its value comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub source: ParameterSource,
}

/// Exactly one source should be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSource {
    /// Inline literal value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Name of a cluster secret holding the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// The `parameters.yaml` handed to the agent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSetDocument {
    pub schema_version: String,
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl ParameterSet {
    /// Name the set is published under.
    pub fn document_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    /// Namespace the set is published under.
    pub fn document_namespace(&self) -> String {
        self.spec
            .namespace
            .clone()
            .or_else(|| self.namespace())
            .unwrap_or_default()
    }

    pub fn document(&self) -> ParameterSetDocument {
        ParameterSetDocument {
            schema_version: self
                .spec
                .schema_version
                .clone()
                .unwrap_or_else(|| SCHEMA_VERSION.to_string()),
            name: self.document_name(),
            namespace: self.document_namespace(),
            parameters: self.spec.parameters.clone(),
        }
    }
}

impl Reconcilable for ParameterSet {
    const KIND: &'static str = "ParameterSet";

    fn status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }

    fn agent_config_name(&self) -> Option<&str> {
        self.spec.agent_config.as_ref().map(|r| r.name.as_str())
    }
}

impl DocumentResource for ParameterSet {
    const FILE: &'static str = "parameters.yaml";

    fn action_args(&self, deleting: bool) -> Vec<String> {
        if deleting {
            vec![
                "parameters".into(),
                "delete".into(),
                "-n".into(),
                self.document_namespace(),
                self.document_name(),
            ]
        } else {
            vec!["parameters".into(), "apply".into(), Self::FILE.into()]
        }
    }

    fn action_files(&self, deleting: bool) -> Result<BTreeMap<String, Vec<u8>>, DocumentError> {
        if deleting {
            return Ok(BTreeMap::new());
        }
        let doc = render(Self::FILE, &self.document())?;
        Ok([(Self::FILE.to_string(), doc)].into_iter().collect())
    }
}

#[cfg(test)]
#[path = "parameter_set_tests.rs"]
mod tests;

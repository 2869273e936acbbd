// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Installation` resource: a desired bundle installation.
//!
//! Applying the document installs or upgrades the bundle; the same
//! document with `uninstalled: true` tears it down, which is why deletion
//! reuses the apply command instead of a dedicated delete verb.

use crate::resource::{render, DocumentError, DocumentResource, Reconcilable};
use crate::status::ResourceStatus;
use k8s_openapi::api::core::v1::LocalObjectReference;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: &str = "1.0.2";

/// Desired state of a bundle installation.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "stevedore.dev",
    version = "v1",
    kind = "Installation",
    namespaced,
    status = "ResourceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    /// Agent config used to run this installation's actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<LocalObjectReference>,
    /// Document schema version override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Installation name in the document; defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Installation namespace in the document; defaults to the object
    /// namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub bundle: Bundle,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credential_sets: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_sets: Vec<String>,
    /// Parameter overrides applied on top of the referenced sets.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Bundle reference by repository plus exactly one of version, digest, tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// The `installation.yaml` handed to the agent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationDocument {
    pub schema_version: String,
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub uninstalled: bool,
    pub bundle: Bundle,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub credential_sets: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameter_sets: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Installation {
    pub fn document(&self, uninstalled: bool) -> InstallationDocument {
        InstallationDocument {
            schema_version: self
                .spec
                .schema_version
                .clone()
                .unwrap_or_else(|| SCHEMA_VERSION.to_string()),
            name: self.spec.name.clone().unwrap_or_else(|| self.name_any()),
            namespace: self
                .spec
                .namespace
                .clone()
                .or_else(|| self.namespace())
                .unwrap_or_default(),
            uninstalled,
            bundle: self.spec.bundle.clone(),
            labels: self.spec.labels.clone(),
            credential_sets: self.spec.credential_sets.clone(),
            parameter_sets: self.spec.parameter_sets.clone(),
            parameters: self.spec.parameters.clone(),
        }
    }
}

impl Reconcilable for Installation {
    const KIND: &'static str = "Installation";

    fn status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }

    fn agent_config_name(&self) -> Option<&str> {
        self.spec.agent_config.as_ref().map(|r| r.name.as_str())
    }
}

impl DocumentResource for Installation {
    const FILE: &'static str = "installation.yaml";

    fn action_args(&self, _deleting: bool) -> Vec<String> {
        // Teardown is the same document applied with `uninstalled: true`.
        vec!["installation".into(), "apply".into(), Self::FILE.into()]
    }

    fn action_files(&self, deleting: bool) -> Result<BTreeMap<String, Vec<u8>>, DocumentError> {
        let doc = render(Self::FILE, &self.document(deleting))?;
        Ok([(Self::FILE.to_string(), doc)].into_iter().collect())
    }
}

#[cfg(test)]
#[path = "installation_tests.rs"]
mod tests;

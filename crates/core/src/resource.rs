// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability traits the reconcilers are written against.
//!
//! [`Reconcilable`] is what the shared lifecycle needs from any resource
//! kind; [`DocumentResource`] adds the hooks for kinds realized by running
//! their serialized document through the agent. `AgentConfig` implements
//! only the former: its work is dispatched by the plugin volume machine.

use crate::labels;
use crate::status::ResourceStatus;
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use thiserror::Error;

/// Failure to render a resource's native document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("render {file}: {source}")]
    Render {
        file: &'static str,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("hash plugins: {0}")]
    Hash(#[from] serde_json::Error),
}

/// A namespaced resource driven through the shared reconcile lifecycle.
pub trait Reconcilable:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// Kind recorded in the resource-kind label.
    const KIND: &'static str;

    fn status(&self) -> Option<&ResourceStatus>;

    /// Agent config referenced by this resource, if any.
    fn agent_config_name(&self) -> Option<&str>;

    /// Retry marker; empty when the annotation is unset.
    fn retry(&self) -> &str {
        self.annotations()
            .get(labels::RETRY_ANNOTATION)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// A resource realized by handing its document to the sandboxed agent.
pub trait DocumentResource: Reconcilable {
    /// File name the document is materialized under in the agent workdir.
    const FILE: &'static str;

    /// Command line for the dispatched action.
    fn action_args(&self, deleting: bool) -> Vec<String>;

    /// Workdir files for the dispatched action.
    fn action_files(&self, deleting: bool) -> Result<BTreeMap<String, Vec<u8>>, DocumentError>;
}

/// Render `document` as YAML for the named workdir file.
pub(crate) fn render<T: Serialize>(
    file: &'static str,
    document: &T,
) -> Result<Vec<u8>, DocumentError> {
    let text = serde_yaml::to_string(document)
        .map_err(|source| DocumentError::Render { file, source })?;
    Ok(text.into_bytes())
}

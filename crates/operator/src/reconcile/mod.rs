// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconcilers for the managed resource kinds.
//!
//! The document-backed kinds (`Installation`, `CredentialSet`,
//! `ParameterSet`) share one generic flow in [`document`]. `AgentConfig`
//! follows the same skeleton but drives the plugin volume state machine
//! instead of handing a document to the agent.

use std::time::Duration;

use kube::Resource;

use crate::env;
use crate::error::OperatorError;

mod actions;
mod agent_config;
mod claims;
mod document;

pub use agent_config::reconcile_agent_config;
pub use document::{reconcile_credential_set, reconcile_installation, reconcile_parameter_set};

pub(crate) use agent_config::effective_config;

/// Operator configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Namespace holding system defaults and shared pull secrets
    pub namespace: String,
    /// Whether finished agent jobs carry a TTL for automatic cleanup
    pub cleanup_jobs: bool,
    /// Interval between full requeues of watched resources
    pub resync: Duration,
}

impl Settings {
    /// Load configuration from the environment.
    pub fn load() -> Self {
        Self {
            namespace: env::operator_namespace(),
            cleanup_jobs: env::cleanup_jobs(),
            resync: env::resync_interval(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: "stevedore-system".to_string(),
            cleanup_jobs: true,
            resync: Duration::from_secs(300),
        }
    }
}

/// Shared dependencies handed to every reconciler.
#[derive(Clone)]
pub struct Context<S, C> {
    pub store: S,
    pub clock: C,
    pub settings: Settings,
}

/// Namespace and name, which every object arriving from a watch carries.
pub(crate) fn meta_parts<K: Resource>(object: &K) -> Result<(&str, &str), OperatorError> {
    let namespace = object
        .meta()
        .namespace
        .as_deref()
        .ok_or(OperatorError::MissingMeta("metadata.namespace"))?;
    let name =
        object.meta().name.as_deref().ok_or(OperatorError::MissingMeta("metadata.name"))?;
    Ok((namespace, name))
}

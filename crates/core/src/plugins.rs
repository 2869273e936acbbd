// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed identity for plugin sets.
//!
//! The hash of the normalized plugin map names the volume claim, so any
//! two configs asking for the same plugins land on the same claim no
//! matter who asked first or in what order the plugins were written.

use crate::agent_config::Plugin;
use crate::digest;
use crate::resource::{render, DocumentError};
use serde::Serialize;
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// File carried by the install action.
pub const FILE: &str = "plugins.yaml";

/// Content hash of a plugin set. Key order never matters.
pub fn hash(plugins: &BTreeMap<String, Plugin>) -> Result<String, DocumentError> {
    Ok(digest::json_digest(plugins)?)
}

/// Claim name for a plugin set hash, stable across resources and
/// generations.
pub fn claim_name(hash: &str) -> String {
    format!("plugins-{hash}")
}

/// Command line for the install action.
pub fn install_args() -> Vec<String> {
    vec!["plugins".into(), "install".into(), "--file".into(), FILE.into()]
}

/// The `plugins.yaml` handed to the agent, one install clause per plugin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsDocument {
    pub schema_version: String,
    pub plugins: BTreeMap<String, Plugin>,
}

/// Render the install document for a plugin set.
pub fn document(plugins: &BTreeMap<String, Plugin>) -> Result<Vec<u8>, DocumentError> {
    render(
        FILE,
        &PluginsDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            plugins: plugins.clone(),
        },
    )
}

#[cfg(test)]
#[path = "plugins_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::action::AgentAction;
use crate::agent_config::{AgentConfig, AgentConfigSpec, Plugin};
use crate::credential_set::CredentialSet;
use crate::installation::{Bundle, Installation};
use crate::parameter_set::ParameterSet;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

// ── Object factory functions ────────────────────────────────────────────

/// Metadata as the API server would hand it back after a create.
pub fn meta(ns: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(ns.to_string()),
        generation: Some(1),
        ..ObjectMeta::default()
    }
}

pub fn installation(ns: &str, name: &str) -> Installation {
    let mut inst = Installation::new(
        name,
        crate::installation::InstallationSpec {
            bundle: bundle("ghcr.io/example/bundle"),
            ..Default::default()
        },
    );
    inst.metadata = meta(ns, name);
    inst
}

pub fn bundle(repository: &str) -> Bundle {
    Bundle {
        repository: repository.to_string(),
        version: Some("1.0.0".into()),
        ..Default::default()
    }
}

pub fn credential_set(ns: &str, name: &str) -> CredentialSet {
    let mut set = CredentialSet::new(name, Default::default());
    set.metadata = meta(ns, name);
    set
}

pub fn parameter_set(ns: &str, name: &str) -> ParameterSet {
    let mut set = ParameterSet::new(name, Default::default());
    set.metadata = meta(ns, name);
    set
}

pub fn agent_config(ns: &str, name: &str) -> AgentConfig {
    let mut cfg = AgentConfig::new(name, Default::default());
    cfg.metadata = meta(ns, name);
    cfg
}

/// Config whose plugin set is non-empty, for volume machine tests.
pub fn agent_config_with_plugins(ns: &str, name: &str, plugins: &[&str]) -> AgentConfig {
    let mut cfg = agent_config(ns, name);
    cfg.spec = AgentConfigSpec {
        plugins: plugins
            .iter()
            .map(|p| {
                (p.to_string(), Plugin { version: Some("v1.0.0".into()), ..Default::default() })
            })
            .collect::<BTreeMap<_, _>>(),
        ..Default::default()
    };
    cfg
}

pub fn agent_action(ns: &str, name: &str) -> AgentAction {
    let mut action = AgentAction::new(name, Default::default());
    action.metadata = meta(ns, name);
    action
}

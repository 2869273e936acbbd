// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sv-core: resource model shared by the Stevedore operator and its tools.
//!
//! Defines the custom resource types (`Installation`, `CredentialSet`,
//! `ParameterSet`, `AgentConfig`, `AgentAction`), the shared status shape,
//! the label/annotation protocol, and the native document rendering used
//! to hand work to the sandboxed agent.

pub mod macros;

pub mod action;
pub mod agent_config;
pub mod clock;
pub mod credential_set;
pub mod digest;
pub mod installation;
pub mod labels;
pub mod parameter_set;
pub mod plugins;
pub mod resource;
pub mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use action::{AgentAction, AgentActionSpec, AgentActionStatus};
pub use agent_config::{
    AgentConfig, AgentConfigSpec, AgentConfigStatus, EffectiveAgentConfig, Plugin,
    DEFAULT_CONFIG_NAME,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use credential_set::{Credential, CredentialSet, CredentialSetSpec, CredentialSource};
pub use digest::short_digest;
pub use installation::{Bundle, Installation, InstallationSpec};
pub use parameter_set::{Parameter, ParameterSet, ParameterSetSpec, ParameterSource};
pub use resource::{DocumentError, DocumentResource, Reconcilable};
pub use status::{Phase, ResourceStatus};

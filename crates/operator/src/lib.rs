// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stevedore operator library
//!
//! Exposes the reconcilers, the cluster store abstraction, and the
//! controller runtime entry point used by the `svd` binary and the
//! integration specs.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod dispatch;
pub mod env;
pub mod error;
pub mod finalizer;
pub mod patch;
pub mod reconcile;
pub mod run;
pub mod store;

pub use dispatch::reconcile_action;
pub use error::OperatorError;
pub use reconcile::{
    reconcile_agent_config, reconcile_credential_set, reconcile_installation,
    reconcile_parameter_set, Context, Settings,
};
pub use run::run;
pub use store::{ClusterStore, Store, StoreError};

#[cfg(any(test, feature = "test-support"))]
pub use store::FakeStore;

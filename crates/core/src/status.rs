// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared status shape for every resource the operator drives.
//!
//! Phases roll the observed job state up into one word; conditions record
//! the individual observations and only accumulate while a generation is
//! in flight. A new generation starts from a fresh status.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::LocalObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition recorded when the job has been accepted by the cluster.
pub const CONDITION_SCHEDULED: &str = "Scheduled";
/// Condition recorded once at least one pod of the job has run.
pub const CONDITION_STARTED: &str = "Started";
/// Condition recorded when the job finished successfully.
pub const CONDITION_COMPLETE: &str = "Complete";
/// Condition recorded when the job gave up.
pub const CONDITION_FAILED: &str = "Failed";

/// Coarse rollup of an execution's progress.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum Phase {
    #[default]
    Unknown,
    Pending,
    Running,
    Succeeded,
    Failed,
}

crate::simple_display! {
    Phase {
        Unknown => "Unknown",
        Pending => "Pending",
        Running => "Running",
        Succeeded => "Succeeded",
        Failed => "Failed",
    }
}

impl Phase {
    /// True once no further progress is possible without a retry.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

/// Status common to every reconcilable resource kind.
///
/// Every field serializes, even when empty. Status is written as a merge
/// patch, and resetting for a new generation relies on explicit nulls to
/// clear what the previous generation recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Generation the recorded observations belong to.
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Action dispatched for the observed generation.
    #[serde(default)]
    pub action: Option<LocalObjectReference>,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ResourceStatus {
    /// Fresh status for a generation with no action dispatched yet.
    pub fn fresh(generation: Option<i64>) -> Self {
        Self { observed_generation: generation, ..Self::default() }
    }

    pub fn condition_true(&self, type_: &str) -> bool {
        condition_true(&self.conditions, type_)
    }
}

/// Build a `status=True` condition observed at `now`.
pub fn true_condition(
    type_: &str,
    reason: &str,
    observed_generation: Option<i64>,
    now: DateTime<Utc>,
) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: "True".to_string(),
        reason: reason.to_string(),
        message: String::new(),
        observed_generation,
        last_transition_time: Time(now),
    }
}

/// Upsert `condition` by type.
///
/// An entry whose `status` is unchanged keeps its original transition time;
/// only reason, message, and observed generation are refreshed.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status != condition.status {
                existing.status = condition.status;
                existing.last_transition_time = condition.last_transition_time;
            }
            existing.reason = condition.reason;
            existing.message = condition.message;
            existing.observed_generation = condition.observed_generation;
        }
        None => conditions.push(condition),
    }
}

/// True when a condition of the given type exists with `status=True`.
pub fn condition_true(conditions: &[Condition], type_: &str) -> bool {
    conditions.iter().any(|c| c.type_ == type_ && c.status == "True")
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action status derived from the job realizing it.

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::LocalObjectReference;
use kube::ResourceExt;
use sv_core::status::{
    set_condition, true_condition, CONDITION_COMPLETE, CONDITION_FAILED, CONDITION_SCHEDULED,
    CONDITION_STARTED,
};
use sv_core::{AgentAction, AgentActionStatus, Phase};

#[cfg(test)]
#[path = "derive_tests.rs"]
mod tests;

/// Status for `action` given the job running it.
///
/// Conditions accumulate: timestamps survive as long as the recorded job
/// is the one observed, and reset when a fresh job takes over.
pub(super) fn derive_status(
    action: &AgentAction,
    job: &Job,
    now: DateTime<Utc>,
) -> AgentActionStatus {
    let job_name = job.name_any();
    let generation = action.metadata.generation;
    let mut conditions = action
        .status
        .as_ref()
        .filter(|s| s.job.as_ref().map(|r| r.name.as_str()) == Some(job_name.as_str()))
        .map(|s| s.conditions.clone())
        .unwrap_or_default();

    let mut phase = Phase::Pending;
    set_condition(
        &mut conditions,
        true_condition(CONDITION_SCHEDULED, "JobCreated", generation, now),
    );

    let counts = job.status.as_ref();
    let started = counts.is_some_and(|s| {
        s.active.unwrap_or_default() + s.succeeded.unwrap_or_default() + s.failed.unwrap_or_default()
            > 0
    });
    if started {
        phase = Phase::Running;
        set_condition(
            &mut conditions,
            true_condition(CONDITION_STARTED, "JobStarted", generation, now),
        );
    }

    for condition in counts.and_then(|s| s.conditions.as_ref()).into_iter().flatten() {
        if condition.status != "True" {
            continue;
        }
        match condition.type_.as_str() {
            "Complete" => {
                phase = Phase::Succeeded;
                set_condition(
                    &mut conditions,
                    true_condition(CONDITION_COMPLETE, "JobFinished", generation, now),
                );
            }
            "Failed" => {
                phase = Phase::Failed;
                set_condition(
                    &mut conditions,
                    true_condition(CONDITION_FAILED, "JobFinished", generation, now),
                );
            }
            _ => {}
        }
    }

    AgentActionStatus {
        observed_generation: generation,
        job: Some(LocalObjectReference { name: job_name }),
        phase,
        conditions,
    }
}

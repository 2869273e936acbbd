// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::status::true_condition;
use crate::test_support;
use chrono::DateTime;

fn action_with(phase: Phase, conditions: Vec<Condition>) -> AgentAction {
    let mut action = test_support::agent_action("default", "act-1");
    action.status = Some(AgentActionStatus { phase, conditions, ..Default::default() });
    action
}

#[test]
fn phase_defaults_to_unknown_without_status() {
    let action = test_support::agent_action("default", "act-1");
    assert_eq!(action.phase(), Phase::Unknown);
    assert!(!action.is_terminal());
}

#[test]
fn complete_requires_phase_and_condition() {
    let now = DateTime::from_timestamp(1_000, 0).unwrap();
    let only_phase = action_with(Phase::Succeeded, vec![]);
    assert!(!only_phase.is_complete());

    let both = action_with(
        Phase::Succeeded,
        vec![true_condition(CONDITION_COMPLETE, "JobSucceeded", Some(1), now)],
    );
    assert!(both.is_complete());
    assert!(both.is_terminal());
}

#[test]
fn failed_is_terminal_but_not_complete() {
    let action = action_with(Phase::Failed, vec![]);
    assert!(action.is_terminal());
    assert!(!action.is_complete());
}

#[test]
fn retry_reads_the_annotation() {
    let mut action = test_support::agent_action("default", "act-1");
    assert_eq!(action.retry(), "");
    action
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(labels::RETRY_ANNOTATION.to_string(), "again".to_string());
    assert_eq!(action.retry(), "again");
}

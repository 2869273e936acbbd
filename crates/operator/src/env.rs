// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the operator binary.

use std::time::Duration;

/// Namespace holding system-wide defaults and shared pull secrets
/// (`SV_OPERATOR_NAMESPACE`, default `stevedore-system`).
pub fn operator_namespace() -> String {
    std::env::var("SV_OPERATOR_NAMESPACE")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "stevedore-system".to_string())
}

/// Whether finished agent jobs carry a TTL and are garbage collected
/// (`SV_CLEANUP_JOBS`, default true).
pub fn cleanup_jobs() -> bool {
    !matches!(std::env::var("SV_CLEANUP_JOBS").as_deref(), Ok("false") | Ok("0"))
}

/// Interval between full requeues of watched resources
/// (`SV_RESYNC_SECONDS`, default 300).
pub fn resync_interval() -> Duration {
    std::env::var("SV_RESYNC_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(300))
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stevedore operator daemon (`svd`).

use tracing::error;
use tracing_subscriber::EnvFilter;

use sv_operator::{run, Settings};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load();
    if let Err(error) = run(settings).await {
        error!(%error, "operator exited");
        std::process::exit(1);
    }
}

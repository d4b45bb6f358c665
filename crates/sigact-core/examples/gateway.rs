// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # Gateway Example
//!
//! A traffic hook raises three signals.  `terminate` is decided inline,
//! `log` and `call` are handed to the worker pool.  Run with:
//!
//! ```bash
//! cargo run --example gateway
//! cargo run --example gateway -- path/to/policies.toml
//! ```
//!
//! Engine settings come from `SIGACT_*` environment variables.

use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sigact_core::{
    config_loader::{load_config_from_env, load_policies},
    Action, ActionError, Dispatch, Metadata, Outcome, RegistryBuilder, Signal,
};

fn metadata(value: Value) -> Metadata {
    match value {
        Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

/// Log the signal metadata carried by an outcome.
fn log_metadata(outcome: &Outcome) -> Result<bool, ActionError> {
    let rendered = Value::Object(outcome.metadata.clone());
    info!(
        action = %outcome.matched_policy,
        metadata = %rendered,
        "logger called"
    );
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // -----------------------------------------------------------------------
    // 1. Register actions
    // -----------------------------------------------------------------------
    let mut builder = RegistryBuilder::new(load_config_from_env()?);

    builder.register_action(Action::new("terminate", true, |outcome| {
        if outcome.metadata.is_empty() {
            return Err(ActionError::InvalidData("terminate without metadata".into()));
        }
        Ok(outcome.verdict)
    }));
    builder.register_action(Action::new("log", false, log_metadata));
    builder.register_action(Action::new("call", false, log_metadata));

    // -----------------------------------------------------------------------
    // 2. Register policies
    // -----------------------------------------------------------------------
    let path = std::env::args().nth(1).unwrap_or_else(|| {
        concat!(env!("CARGO_MANIFEST_DIR"), "/examples/policies.toml").to_owned()
    });
    let failures = builder.register_policies(load_policies(&path)?);
    info!(path = %path, skipped = failures.len(), "policies loaded");

    let registry = builder.seal()?;

    // -----------------------------------------------------------------------
    // 3. Apply a batch of signals
    // -----------------------------------------------------------------------
    let outcomes = registry.apply(&[
        Signal::new("terminate")
            .with_metadata(metadata(json!({
                "terminate": true,
                "hook": {"name": "OnTrafficFromClient"},
            })))
            .with_sync(true),
        Signal::new("log").with_metadata(metadata(json!({
            "log": true,
            "msg": "Hello, world!",
            "level": "info",
        }))),
        Signal::new("call").with_metadata(metadata(json!({
            "call": true,
            "method": "POST",
            "url": "https://example.com",
            "body": "Hello, world!",
            "headers": {"Content-Type": "text/plain"},
        }))),
    ]);

    // -----------------------------------------------------------------------
    // 4. Dispatch and drain
    // -----------------------------------------------------------------------
    for report in registry.dispatch(outcomes).await {
        match report {
            Dispatch::Executed { action, result } => {
                info!(action = %action, result = ?result, "ran inline")
            }
            Dispatch::Queued { action } => info!(action = %action, "queued"),
            Dispatch::Dropped { action, error } => info!(action = %action, error = %error, "dropped"),
            Dispatch::Skipped => info!("no verdict"),
        }
    }

    registry.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_metadata_accepts_any_outcome() {
        let mut outcome = Outcome::fallback("log");
        assert_eq!(log_metadata(&outcome), Ok(true));
        outcome.metadata = metadata(json!({"msg": "Hello, world!"}));
        assert_eq!(log_metadata(&outcome), Ok(true));
    }
}

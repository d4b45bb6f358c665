// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Shared data types used across the registry, the policy evaluator and the
//! dispatch queue.
//!
//! All value types implement [`Clone`], [`Debug`], [`serde::Serialize`], and
//! [`serde::Deserialize`] so they can be loaded from configuration, logged,
//! and pushed through the dispatch queue in encoded form.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;

/// Name seeded into every registry namespace and used for the default outcome.
pub const PASSTHROUGH: &str = "passthrough";

/// Loosely structured key/value data attached to signals, actions and
/// policies.  Keys are kept sorted so logs and encodings are deterministic.
pub type Metadata = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A raised event submitted for policy resolution.
///
/// `sync` is only the caller's preference: the registered action decides how
/// the outcome is delivered.
///
/// # Examples
///
/// ```rust
/// use sigact_core::types::Signal;
///
/// let signal = Signal::new("terminate").with_sync(true);
/// assert_eq!(signal.name, "terminate");
/// assert!(signal.metadata.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Event name; also the name of the action it resolves to.
    pub name: String,
    /// Event payload, exposed to policies as `signal`.
    #[serde(default)]
    pub metadata: Metadata,
    /// Preferred delivery mode.
    #[serde(default)]
    pub sync: bool,
}

impl Signal {
    /// A signal with no metadata and an asynchronous preference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Metadata::new(),
            sync: false,
        }
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the preferred delivery mode.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, Value::Object(self.metadata.clone()))
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Evaluation context handed to a policy program.
///
/// Serialises to the five root identifiers visible inside policy
/// expressions: `name`, `policy`, `signal`, `actionSync`, `signalSync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    /// Signal name, which is also the policy and action name.
    pub name: String,
    /// Metadata attached to the policy at registration.
    pub policy: Metadata,
    /// Metadata carried by the signal.
    pub signal: Metadata,
    /// Whether the matching action runs inline.
    pub action_sync: bool,
    /// Whether the signal asked to be handled inline.
    pub signal_sync: bool,
}

impl Input {
    pub fn new(
        name: impl Into<String>,
        policy: Metadata,
        signal: Metadata,
        action_sync: bool,
        signal_sync: bool,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            signal,
            action_sync,
            signal_sync,
        }
    }

    /// Representative input used as the compile-time environment of a
    /// policy: its own metadata, an empty signal, both modes synchronous.
    pub fn schema(name: impl Into<String>, policy: Metadata) -> Self {
        Self::new(name, policy, Metadata::new(), true, true)
    }

    /// Root environment of an expression, keyed by identifier.
    pub fn to_env(&self) -> Metadata {
        let mut env = Metadata::new();
        env.insert("name".into(), Value::String(self.name.clone()));
        env.insert("policy".into(), Value::Object(self.policy.clone()));
        env.insert("signal".into(), Value::Object(self.signal.clone()));
        env.insert("actionSync".into(), Value::Bool(self.action_sync));
        env.insert("signalSync".into(), Value::Bool(self.signal_sync));
        env
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The resolution of one signal: which policy matched, its verdict, and the
/// data the matched action will receive.
///
/// Produced once per signal by [`Registry::apply`](crate::registry::Registry::apply)
/// and consumed exactly once, either inline or by a dispatch worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// Name of the policy (and therefore of the action) that matched.
    #[serde(rename = "matched")]
    pub matched_policy: String,
    /// Boolean result of the policy expression.
    pub verdict: bool,
    /// Delivery mode of the matched action; authoritative for routing.
    pub action_sync: bool,
    /// Delivery mode the signal asked for.
    pub signal_sync: bool,
    /// The signal's metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Outcome {
    /// The fail-safe outcome: `policy` matched, verdict `true`, synchronous.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sigact_core::types::{Outcome, PASSTHROUGH};
    ///
    /// let outcome = Outcome::fallback(PASSTHROUGH);
    /// assert!(outcome.verdict);
    /// assert!(outcome.action_sync);
    /// ```
    pub fn fallback(policy: impl Into<String>) -> Self {
        Self {
            matched_policy: policy.into(),
            verdict: true,
            action_sync: true,
            signal_sync: true,
            metadata: Metadata::new(),
        }
    }

    /// JSON encoding used when an outcome crosses the queue as bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serialising a struct of strings, bools and JSON values cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode an outcome previously produced by [`Outcome::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DispatchError> {
        serde_json::from_slice(bytes).map_err(|error| DispatchError::Decode(error.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Configuration source contract
// ---------------------------------------------------------------------------

/// One policy as supplied by a configuration source.
///
/// ```toml
/// [[policies]]
/// name = "terminate"
/// policy = "signal.terminate == true && policy.enabled"
/// metadata = { enabled = true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    /// Name of the action the policy protects.
    pub name: String,
    /// Expression source.
    pub policy: String,
    /// Default metadata, exposed to the expression as `policy`.
    #[serde(default)]
    pub metadata: Metadata,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Engine-level configuration.
//!
//! [`EngineConfig`] is the single entry point for tuning the registry at
//! construction time.  Every field has a default so that
//! `EngineConfig::default()` is always a valid starting point, and a TOML
//! file only needs to name the fields it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conflict::{ConflictSets, DEFAULT_NEGATIVE, DEFAULT_POSITIVE};
use crate::types::PASSTHROUGH;

/// Top-level configuration for [`RegistryBuilder`](crate::registry::RegistryBuilder).
///
/// # Examples
///
/// ```rust
/// use sigact_core::config::EngineConfig;
///
/// let config = EngineConfig {
///     workers: 4,
///     ..EngineConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Policy name reported by the default outcome.  Must name a registered
    /// action when the registry is sealed.
    pub default_policy: String,

    /// Number of dispatch workers.  Must be at least 1.
    pub workers: usize,

    /// Messages the dispatch queue holds before submitters wait.  Must be at
    /// least 1.
    pub queue_capacity: usize,

    /// How long a submission waits for room in a full queue before it is
    /// rejected.
    pub enqueue_timeout_ms: u64,

    /// Signal names that let traffic continue.
    pub positive: Vec<String>,

    /// Signal names that stop traffic.
    pub negative: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_policy: PASSTHROUGH.to_owned(),
            workers: 2,
            queue_capacity: 64,
            enqueue_timeout_ms: 250,
            positive: DEFAULT_POSITIVE.iter().map(|s| (*s).to_owned()).collect(),
            negative: DEFAULT_NEGATIVE.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl EngineConfig {
    /// Check the numeric bounds.  Returns the offending field and reason.
    pub fn validate(&self) -> Result<(), (&'static str, &'static str)> {
        if self.workers == 0 {
            return Err(("workers", "must be >= 1"));
        }
        if self.queue_capacity == 0 {
            return Err(("queue_capacity", "must be >= 1"));
        }
        if self.default_policy.is_empty() {
            return Err(("default_policy", "must not be empty"));
        }
        Ok(())
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn conflict_sets(&self) -> ConflictSets {
        ConflictSets::new(self.positive.iter().cloned(), self.negative.iter().cloned())
    }
}

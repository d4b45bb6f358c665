// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Named, invokable units of work.
//!
//! An [`Action`] is what a resolved signal ultimately triggers.  The engine
//! never looks inside the body; it only decides *when* and *where* the body
//! runs, based on the action's `sync` flag.

use std::fmt;
use std::sync::Arc;

use crate::error::ActionError;
use crate::types::{Metadata, Outcome, PASSTHROUGH};

/// Body of an action.  Receives the outcome that triggered it.
pub type ActionFn = Arc<dyn Fn(&Outcome) -> Result<bool, ActionError> + Send + Sync>;

/// A registered action.
///
/// # Examples
///
/// ```rust
/// use sigact_core::action::Action;
/// use sigact_core::types::Outcome;
///
/// let terminate = Action::new("terminate", true, |outcome: &Outcome| Ok(outcome.verdict));
/// assert!(terminate.sync);
/// assert_eq!(terminate.run(&Outcome::fallback("terminate")), Ok(true));
/// ```
#[derive(Clone)]
pub struct Action {
    pub name: String,
    pub metadata: Metadata,
    /// `true` runs inline with the dispatch call, `false` hands the outcome
    /// to the worker pool.
    pub sync: bool,
    run: ActionFn,
}

impl Action {
    pub fn new<F>(name: impl Into<String>, sync: bool, run: F) -> Self
    where
        F: Fn(&Outcome) -> Result<bool, ActionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            metadata: Metadata::new(),
            sync,
            run: Arc::new(run),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The seeded no-op action: synchronous, always succeeds with `true`.
    pub fn passthrough() -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("verdict".into(), true.into());
        Self::new(PASSTHROUGH, true, |_| Ok(true)).with_metadata(metadata)
    }

    /// Invoke the body.
    pub fn run(&self, outcome: &Outcome) -> Result<bool, ActionError> {
        (self.run)(outcome)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

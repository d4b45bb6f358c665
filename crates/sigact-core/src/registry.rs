// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Registry: the top-level composition of signals, policies and actions.
//!
//! ## Lifecycle
//!
//! 1. **Register**: a [`RegistryBuilder`] collects signals, actions and
//!    policies.  Every namespace starts with a `passthrough` entry.  Policies
//!    are compiled on registration; one that fails is logged and skipped.
//! 2. **Seal**: [`RegistryBuilder::seal`] validates the configuration, starts
//!    the dispatch workers and returns an immutable [`Registry`].
//! 3. **Serve**: [`Registry::apply`] turns a batch of signals into outcome
//!    slots and [`Registry::dispatch`] routes each slot to its action.
//! 4. **Shut down**: [`Registry::shutdown`] drains the dispatch queue.
//!
//! ## Apply order
//!
//! 1. **Empty batch**: one default outcome.
//! 2. **Conflict**: positive and negative signals in one batch yield one
//!    default outcome and nothing is evaluated.
//! 3. **Resolution**: per signal, in order.  No action or no policy yields
//!    the default outcome; an evaluation failure yields an empty slot.
//!
//! The action's `sync` flag decides whether its outcome runs inline or on the
//! worker pool.  The signal's `sync` flag is only compared for a warning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::config::EngineConfig;
use crate::conflict::{ConflictReport, ConflictSets};
use crate::dispatch::{ActionTable, Dispatch, DispatchQueue, QueuedMessage};
use crate::error::{ActionError, DispatchError, EvaluationError, RegistryError};
use crate::expr::{Evaluator, ExprEvaluator};
use crate::policy::Policy;
use crate::types::{Input, Metadata, Outcome, PolicyDefinition, Signal, PASSTHROUGH};

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

/// Registration phase of a [`Registry`].
///
/// # Example
///
/// ```rust
/// use sigact_core::action::Action;
/// use sigact_core::registry::RegistryBuilder;
/// use sigact_core::types::{Metadata, Signal};
///
/// #[tokio::main]
/// async fn main() {
///     let mut builder = RegistryBuilder::default();
///     builder.register_action(Action::new("terminate", true, |outcome| Ok(outcome.verdict)));
///     builder
///         .register_policy("terminate", "signal.terminate == true", Metadata::new())
///         .unwrap();
///
///     let registry = builder.seal().unwrap();
///     let mut metadata = Metadata::new();
///     metadata.insert("terminate".into(), true.into());
///     let outcomes = registry.apply(&[Signal::new("terminate").with_metadata(metadata)]);
///     assert_eq!(outcomes[0].as_ref().map(|o| o.verdict), Some(true));
///
///     registry.shutdown().await;
/// }
/// ```
pub struct RegistryBuilder {
    config: EngineConfig,
    evaluator: Box<dyn Evaluator>,
    signals: HashMap<String, Signal>,
    actions: ActionTable,
    policies: HashMap<String, Policy>,
    conflicts: ConflictSets,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl RegistryBuilder {
    /// A builder seeded with the `passthrough` signal, action and policy,
    /// compiling policies with the built-in [`ExprEvaluator`].
    pub fn new(config: EngineConfig) -> Self {
        let mut verdict = Metadata::new();
        verdict.insert("verdict".into(), true.into());

        let mut signals = HashMap::new();
        signals.insert(
            PASSTHROUGH.to_owned(),
            Signal::new(PASSTHROUGH).with_metadata(verdict).with_sync(true),
        );

        let mut actions = ActionTable::new();
        actions.insert(PASSTHROUGH.to_owned(), Action::passthrough());

        let mut policies = HashMap::new();
        policies.insert(PASSTHROUGH.to_owned(), Policy::passthrough(PASSTHROUGH));

        let conflicts = config.conflict_sets();

        Self {
            config,
            evaluator: Box::new(ExprEvaluator),
            signals,
            actions,
            policies,
            conflicts,
        }
    }

    /// Compile subsequently registered policies with `evaluator`.
    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    /// Register a known signal.  Returns the entry it replaced.
    pub fn register_signal(&mut self, signal: Signal) -> Option<Signal> {
        self.signals.insert(signal.name.clone(), signal)
    }

    /// Register an action under its name.  The last registration wins; the
    /// replaced action is returned.
    pub fn register_action(&mut self, action: Action) -> Option<Action> {
        let replaced = self.actions.insert(action.name.clone(), action);
        if let Some(previous) = &replaced {
            debug!(action = %previous.name, "action replaced");
        }
        replaced
    }

    /// Compile and register a policy guarding the action `name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Compile`] when the source does not compile.  The
    /// policy is not installed and any earlier policy of the same name is
    /// kept.
    pub fn register_policy(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
        metadata: Metadata,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        match Policy::compile(name.clone(), source, metadata, self.evaluator.as_ref()) {
            Ok(policy) => {
                self.policies.insert(name, policy);
                Ok(())
            }
            Err(source) => {
                let error = RegistryError::Compile { policy: name, source };
                warn!(error = %error, "skipping policy");
                Err(error)
            }
        }
    }

    /// Register every definition, skipping the ones that fail to compile.
    /// Returns the failures.
    pub fn register_policies<I>(&mut self, definitions: I) -> Vec<RegistryError>
    where
        I: IntoIterator<Item = PolicyDefinition>,
    {
        definitions
            .into_iter()
            .filter_map(|definition| {
                self.register_policy(definition.name, definition.policy, definition.metadata)
                    .err()
            })
            .collect()
    }

    /// Count `name` as a positive signal in conflict detection.
    pub fn add_positive(&mut self, name: impl Into<String>) {
        self.conflicts.add_positive(name);
    }

    /// Count `name` as a negative signal in conflict detection.
    pub fn add_negative(&mut self, name: impl Into<String>) {
        self.conflicts.add_negative(name);
    }

    /// Finish registration and start the dispatch workers.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidConfig`] for an out-of-range configuration or
    /// a `default_policy` with no registered action, and
    /// [`RegistryError::Dispatch`] when called outside a Tokio runtime.
    pub fn seal(self) -> Result<Registry, RegistryError> {
        self.config
            .validate()
            .map_err(|(field, reason)| RegistryError::InvalidConfig(format!("{field} {reason}")))?;
        if !self.actions.contains_key(&self.config.default_policy) {
            return Err(RegistryError::InvalidConfig(format!(
                "default_policy `{}` has no registered action",
                self.config.default_policy
            )));
        }

        let actions = Arc::new(self.actions);
        let queue = DispatchQueue::start(&self.config, Arc::clone(&actions))?;

        info!(
            signals = self.signals.len(),
            actions = actions.len(),
            policies = self.policies.len(),
            workers = queue.workers(),
            "registry sealed"
        );

        Ok(Registry {
            default_policy: self.config.default_policy,
            signals: self.signals,
            actions,
            policies: self.policies,
            conflicts: self.conflicts,
            queue,
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A sealed registry.  Immutable, so concurrent `apply` calls need no
/// locking.
pub struct Registry {
    default_policy: String,
    signals: HashMap<String, Signal>,
    actions: Arc<ActionTable>,
    policies: HashMap<String, Policy>,
    conflicts: ConflictSets,
    queue: DispatchQueue,
}

impl Registry {
    /// Resolve a batch of signals to outcome slots, one per signal and in
    /// the same order.  An empty slot means the policy failed to evaluate.
    pub fn apply(&self, signals: &[Signal]) -> Vec<Option<Outcome>> {
        self.resolve(signals, None)
    }

    /// Like [`apply`](Self::apply), but signals whose turn comes after
    /// `deadline` are not evaluated and yield an empty slot.
    pub fn apply_until(&self, signals: &[Signal], deadline: Instant) -> Vec<Option<Outcome>> {
        self.resolve(signals, Some(deadline))
    }

    fn resolve(&self, signals: &[Signal], deadline: Option<Instant>) -> Vec<Option<Outcome>> {
        if signals.is_empty() {
            return vec![Some(self.default_outcome())];
        }

        let report = self.conflict(signals);
        if report.has_conflict() {
            warn!(
                positives = ?report.positives,
                negatives = ?report.negatives,
                "conflicting signals, applying default policy"
            );
            return vec![Some(self.default_outcome())];
        }

        let outcomes: Vec<Option<Outcome>> = signals
            .iter()
            .map(|signal| match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    let e = EvaluationError::DeadlineExceeded(signal.name.clone());
                    warn!(signal = %signal.name, error = %e, "no verdict");
                    None
                }
                _ => self.resolve_one(signal),
            })
            .collect();

        if outcomes.is_empty() {
            return vec![Some(self.default_outcome())];
        }
        outcomes
    }

    fn resolve_one(&self, signal: &Signal) -> Option<Outcome> {
        let Some(action) = self.actions.get(&signal.name) else {
            debug!(signal = %signal.name, "no action registered, applying default policy");
            return Some(self.default_outcome());
        };
        let Some(policy) = self.policies.get(&action.name) else {
            debug!(action = %action.name, "no policy registered, applying default policy");
            return Some(self.default_outcome());
        };

        let input = Input::new(
            signal.name.clone(),
            policy.metadata().clone(),
            signal.metadata.clone(),
            action.sync,
            signal.sync,
        );
        match policy.eval(&input) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(signal = %signal.name, error = %e, "policy evaluation failed");
                None
            }
        }
    }

    /// Partition `signals` into positive and negative names.
    pub fn conflict(&self, signals: &[Signal]) -> ConflictReport {
        self.conflicts.detect(signals)
    }

    /// The fail-safe outcome: the configured default policy, verdict `true`,
    /// synchronous, no metadata.
    pub fn default_outcome(&self) -> Outcome {
        Outcome::fallback(self.default_policy.as_str())
    }

    /// Route every slot to its action, in order.
    ///
    /// Synchronous actions run inline and their results are returned.
    /// Asynchronous ones are handed to the dispatch queue; a refused
    /// submission is logged and reported as [`Dispatch::Dropped`].
    pub async fn dispatch(&self, outcomes: Vec<Option<Outcome>>) -> Vec<Dispatch> {
        let mut reports = Vec::with_capacity(outcomes.len());
        for slot in outcomes {
            reports.push(self.route(slot).await);
        }
        reports
    }

    async fn route(&self, slot: Option<Outcome>) -> Dispatch {
        let Some(outcome) = slot else {
            info!("no verdict");
            return Dispatch::Skipped;
        };
        let action = outcome.matched_policy.clone();
        info!(
            matched = %action,
            sync = outcome.action_sync,
            verdict = outcome.verdict,
            "verdict"
        );

        if outcome.action_sync {
            let result = self.execute(&outcome);
            match &result {
                Ok(result) => info!(action = %action, result, "action completed"),
                Err(e) => warn!(action = %action, error = %e, "action failed"),
            }
            return Dispatch::Executed { action, result };
        }

        match self.queue.submit(outcome).await {
            Ok(()) => {
                debug!(matched = %action, "queued task");
                Dispatch::Queued { action }
            }
            Err(error) => {
                warn!(matched = %action, error = %error, "dropping outcome");
                Dispatch::Dropped { action, error }
            }
        }
    }

    /// Run the action named by `outcome` on the calling thread.
    pub fn execute(&self, outcome: &Outcome) -> Result<bool, ActionError> {
        self.actions
            .get(&outcome.matched_policy)
            .ok_or_else(|| ActionError::NotRegistered(outcome.matched_policy.clone()))?
            .run(outcome)
    }

    /// Hand a message straight to the dispatch queue.
    pub async fn submit(&self, message: impl Into<QueuedMessage>) -> Result<(), DispatchError> {
        self.queue.submit(message).await
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn policy(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.get(name)
    }

    pub fn default_policy(&self) -> &str {
        &self.default_policy
    }

    /// Drain the dispatch queue and stop its workers.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }

    /// Drain for at most `grace`, then abort.  Returns `true` if the queue
    /// drained in time.
    pub async fn shutdown_timeout(self, grace: Duration) -> bool {
        self.queue.shutdown_timeout(grace).await
    }
}

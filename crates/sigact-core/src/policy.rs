// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Compiled policies.
//!
//! A [`Policy`] is compiled exactly once, when it is registered.  Evaluation
//! is pure: the same [`Input`] always yields the same verdict.  A policy whose
//! program does not produce a boolean yields an [`EvaluationError`], never a
//! `false` verdict.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::{CompileError, EvaluationError, RuntimeError};
use crate::expr::{type_name, Evaluator, Program};
use crate::types::{Input, Metadata, Outcome};

/// A named boolean expression guarding the action of the same name.
///
/// # Examples
///
/// ```rust
/// use sigact_core::expr::ExprEvaluator;
/// use sigact_core::policy::Policy;
/// use sigact_core::types::{Input, Metadata};
///
/// let policy = Policy::compile("log", "signalSync == false", Metadata::new(), &ExprEvaluator)
///     .unwrap();
///
/// let input = Input::new("log", Metadata::new(), Metadata::new(), false, false);
/// let outcome = policy.eval(&input).unwrap();
/// assert_eq!(outcome.matched_policy, "log");
/// assert!(outcome.verdict);
/// ```
#[derive(Clone)]
pub struct Policy {
    name: String,
    source: String,
    metadata: Metadata,
    program: Arc<dyn Program>,
}

impl Policy {
    /// Compile `source` against an input seeded with this policy's metadata.
    pub fn compile(
        name: impl Into<String>,
        source: impl Into<String>,
        metadata: Metadata,
        evaluator: &dyn Evaluator,
    ) -> Result<Self, CompileError> {
        let name = name.into();
        let source = source.into();
        let schema = Input::schema(name.clone(), metadata.clone());
        let program = evaluator.compile(&source, &schema)?;
        Ok(Self {
            name,
            source,
            metadata,
            program,
        })
    }

    /// The built-in fallback policy: `true`, no metadata.
    pub(crate) fn passthrough(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            source: "true".into(),
            metadata: Metadata::new(),
            program: Arc::new(Constant(true)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Evaluate against `input`.
    ///
    /// Logs a warning when the action's delivery mode differs from the
    /// signal's; the action's mode is kept.
    pub fn eval(&self, input: &Input) -> Result<Outcome, EvaluationError> {
        if input.action_sync != input.signal_sync {
            warn!(
                action = %input.name,
                action_sync = input.action_sync,
                signal_sync = input.signal_sync,
                "action and signal sync mismatch"
            );
        }

        let value = self
            .program
            .run(input)
            .map_err(|source| EvaluationError::Runtime {
                policy: self.name.clone(),
                source,
            })?;

        let verdict = value.as_bool().ok_or_else(|| EvaluationError::NotBoolean {
            policy: self.name.clone(),
            found: type_name(&value),
        })?;

        Ok(Outcome {
            matched_policy: self.name.clone(),
            verdict,
            action_sync: input.action_sync,
            signal_sync: input.signal_sync,
            metadata: input.signal.clone(),
        })
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.source)
    }
}

/// Program that ignores its input.
#[derive(Debug)]
struct Constant(bool);

impl Program for Constant {
    fn run(&self, _input: &Input) -> Result<Value, RuntimeError> {
        Ok(Value::Bool(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprEvaluator;
    use crate::test_support::capture_logs;
    use serde_json::json;

    fn metadata(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => Metadata::new(),
        }
    }

    fn policy(name: &str, source: &str) -> Policy {
        Policy::compile(name, source, Metadata::new(), &ExprEvaluator).expect("compiles")
    }

    fn input(signal: Value, action_sync: bool, signal_sync: bool) -> Input {
        Input::new("terminate", Metadata::new(), metadata(signal), action_sync, signal_sync)
    }

    #[test]
    fn test_true_policy_always_permits() {
        let policy = policy("terminate", "true");
        for signal in [json!({}), json!({"terminate": false}), json!({"x": [1, 2]})] {
            let outcome = policy.eval(&input(signal, false, true)).expect("evaluates");
            assert!(outcome.verdict);
        }
    }

    #[test]
    fn test_outcome_carries_flags_and_signal_metadata() {
        let policy = policy("terminate", "signal.terminate == true");
        let outcome = policy
            .eval(&input(json!({"terminate": true, "hook": "OnTraffic"}), true, false))
            .expect("evaluates");
        assert_eq!(outcome.matched_policy, "terminate");
        assert!(outcome.verdict);
        assert!(outcome.action_sync);
        assert!(!outcome.signal_sync);
        assert_eq!(outcome.metadata["hook"], json!("OnTraffic"));
    }

    #[test]
    fn test_false_verdict_is_not_an_error() {
        let policy = policy("terminate", "signal.terminate == true");
        let outcome = policy
            .eval(&input(json!({"terminate": false}), true, true))
            .expect("evaluates");
        assert!(!outcome.verdict);
    }

    #[test]
    fn test_policy_metadata_is_visible() {
        let policy = Policy::compile(
            "terminate",
            "policy.enabled && signal.terminate",
            metadata(json!({"enabled": true})),
            &ExprEvaluator,
        )
        .expect("compiles");
        let outcome = policy
            .eval(&Input::new(
                "terminate",
                policy.metadata().clone(),
                metadata(json!({"terminate": true})),
                true,
                true,
            ))
            .expect("evaluates");
        assert!(outcome.verdict);
    }

    #[test]
    fn test_non_boolean_result_is_an_error() {
        let policy = policy("log", "signal.level");
        let error = policy
            .eval(&input(json!({"level": "info"}), false, false))
            .expect_err("string is not a verdict");
        assert_eq!(
            error,
            EvaluationError::NotBoolean {
                policy: "log".into(),
                found: "string"
            }
        );
    }

    #[test]
    fn test_runtime_error_is_an_error() {
        let policy = policy("log", "signal.count / 0 > 1");
        let error = policy
            .eval(&input(json!({"count": 4}), false, false))
            .expect_err("division by zero");
        assert_eq!(
            error,
            EvaluationError::Runtime {
                policy: "log".into(),
                source: RuntimeError::DivisionByZero
            }
        );
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let policy = policy("call", "signal.method == 'POST' && len(signal.body) > 3");
        let input = input(json!({"method": "POST", "body": "Hello"}), false, false);
        let first = policy.eval(&input).expect("evaluates");
        let second = policy.eval(&input).expect("evaluates");
        assert_eq!(first, second);
    }

    #[test]
    fn test_compile_error_is_returned() {
        let error = Policy::compile("bad", "signal.terminate ==", Metadata::new(), &ExprEvaluator)
            .expect_err("incomplete expression");
        assert!(matches!(error, CompileError::UnexpectedEnd(_)));
    }

    #[test]
    fn test_sync_mismatch_logs_a_warning() {
        let policy = policy("terminate", "true");

        let (outcome, logs) = capture_logs(|| policy.eval(&input(json!({}), false, true)));
        assert!(outcome.expect("evaluates").verdict);
        let line = logs
            .lines()
            .find(|line| line.contains("action and signal sync mismatch"))
            .expect("mismatch warning");
        assert!(line.contains("WARN"));
        assert!(line.contains("action=terminate"));
        assert!(line.contains("action_sync=false"));
        assert!(line.contains("signal_sync=true"));

        let (_, logs) = capture_logs(|| policy.eval(&input(json!({}), true, true)));
        assert!(!logs.contains("sync mismatch"));
    }

    #[test]
    fn test_passthrough_policy() {
        let policy = Policy::passthrough("passthrough");
        assert_eq!(policy.source(), "true");
        let outcome = policy.eval(&input(json!({}), true, true)).expect("evaluates");
        assert!(outcome.verdict);
    }
}

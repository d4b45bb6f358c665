// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Error taxonomy for the decision engine.
//!
//! Only [`ActionError`] ever reaches the caller of a dispatch as an explicit
//! error value.  Structural misconfiguration (missing action, missing policy)
//! and contradictory signal batches resolve to the default outcome instead,
//! and evaluation failures surface as an empty outcome slot.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Expression engine
// ---------------------------------------------------------------------------

/// A policy source that could not be turned into a runnable program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("empty expression")]
    Empty,

    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unexpected end of expression: {0}")]
    UnexpectedEnd(String),

    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("function `{function}` expects {expected} argument(s), found {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },
}

/// A failure raised while a compiled program runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("operator `{op}` cannot be applied to {found}")]
    TypeMismatch { op: &'static str, found: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("arithmetic overflow in `{0}`")]
    Overflow(&'static str),

    #[error("result is not a finite number")]
    NotFinite,
}

/// Why a policy produced no outcome.
///
/// Distinct from a `false` verdict: a verdict of `false` is a legitimate
/// business outcome, an evaluation error is a systemic failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("policy `{policy}` failed: {source}")]
    Runtime {
        policy: String,
        #[source]
        source: RuntimeError,
    },

    #[error("policy `{policy}` produced {found}, expected a boolean")]
    NotBoolean { policy: String, found: &'static str },

    #[error("deadline exceeded before policy `{0}` was evaluated")]
    DeadlineExceeded(String),
}

// ---------------------------------------------------------------------------
// Actions and dispatch
// ---------------------------------------------------------------------------

/// Error returned by an action body, or by the router when the matched action
/// does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("action failed: {0}")]
    Failed(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("no action registered under `{0}`")]
    NotRegistered(String),
}

/// The dispatch queue refused or could not process a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatch queue is shut down")]
    ShutDown,

    #[error("dispatch queue stayed full for {timeout_ms} ms")]
    QueueFull { timeout_ms: u64 },

    #[error("failed to decode queued message: {0}")]
    Decode(String),

    #[error("the dispatch pool must be started inside a Tokio runtime")]
    NoRuntime,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Errors raised while populating or sealing a registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("policy `{policy}` failed to compile: {source}")]
    Compile {
        policy: String,
        #[source]
        source: CompileError,
    },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

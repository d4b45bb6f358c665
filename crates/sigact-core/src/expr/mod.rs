// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Policy expression engine.
//!
//! The registry only talks to the two traits in this module:
//!
//! * [`Evaluator::compile`] turns a policy source into a [`Program`] once, at
//!   registration time, checked against a representative [`Input`].
//! * [`Program::run`] evaluates against a live [`Input`] and returns a value.
//!
//! Any engine implementing them can replace the built-in [`ExprEvaluator`].
//!
//! ## Built-in language
//!
//! ```text
//! signal.terminate == true && policy.enabled
//! signal.hook.name startsWith "OnTraffic" || name in ["log", "call"]
//! len(signal.headers) > 0 ? print(signal.headers) != nil : actionSync
//! ```
//!
//! Root identifiers are `name`, `policy`, `signal`, `actionSync` and
//! `signalSync`.  Missing map keys read as `nil`.  The functions are
//! `print(args...)`, which logs and returns its last argument, and `len(x)`.

mod interp;
mod lexer;
mod parser;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{CompileError, RuntimeError};
use crate::types::{Input, Metadata};

use parser::Expr;

pub(crate) use interp::type_name;

// ---------------------------------------------------------------------------
// Seam
// ---------------------------------------------------------------------------

/// Compiles policy sources into runnable programs.
pub trait Evaluator: Send + Sync {
    /// Compile `source` for inputs shaped like `schema`.
    ///
    /// The schema carries the policy's own metadata; its signal metadata is
    /// empty, so implementations must not reject unknown signal keys.
    fn compile(&self, source: &str, schema: &Input) -> Result<Arc<dyn Program>, CompileError>;
}

/// A compiled policy.  Running it must not mutate the input.
pub trait Program: Send + Sync + fmt::Debug {
    fn run(&self, input: &Input) -> Result<Value, RuntimeError>;
}

// ---------------------------------------------------------------------------
// Built-in engine
// ---------------------------------------------------------------------------

/// The built-in boolean expression language.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use sigact_core::expr::{Evaluator, ExprEvaluator, Program};
/// use sigact_core::types::{Input, Metadata};
///
/// let schema = Input::schema("terminate", Metadata::new());
/// let program = ExprEvaluator
///     .compile("signal.terminate == true", &schema)
///     .unwrap();
///
/// let mut signal = Metadata::new();
/// signal.insert("terminate".into(), json!(true));
/// let input = Input::new("terminate", Metadata::new(), signal, true, true);
/// assert_eq!(program.run(&input).unwrap(), json!(true));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprEvaluator;

impl Evaluator for ExprEvaluator {
    fn compile(&self, source: &str, schema: &Input) -> Result<Arc<dyn Program>, CompileError> {
        let tokens = lexer::tokenize(source)?;
        let ast = parser::parse(tokens, source.len())?;
        check(&ast, &schema.to_env())?;
        Ok(Arc::new(ExprProgram {
            source: source.to_owned(),
            ast,
        }))
    }
}

/// A parsed and checked expression.
pub struct ExprProgram {
    source: String,
    ast: Expr,
}

impl ExprProgram {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for ExprProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExprProgram").field(&self.source).finish()
    }
}

impl Program for ExprProgram {
    fn run(&self, input: &Input) -> Result<Value, RuntimeError> {
        let env = input.to_env();
        interp::evaluate(&self.ast, &env).map(|value| value.into_owned())
    }
}

/// Static checks: every root identifier exists in the environment and every
/// call names a built-in function with an acceptable argument count.
fn check(expr: &Expr, env: &Metadata) -> Result<(), CompileError> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Ident(name) if env.contains_key(name) => Ok(()),
        Expr::Ident(name) => Err(CompileError::UnknownIdentifier(name.clone())),
        Expr::Array(items) => items.iter().try_for_each(|item| check(item, env)),
        Expr::Member(base, _) => check(base, env),
        Expr::Index(base, index) => {
            check(base, env)?;
            check(index, env)
        }
        Expr::Call(function, args) => {
            let arity = interp::FUNCTIONS
                .iter()
                .find(|(name, _)| *name == function.as_str())
                .map(|&(_, arity)| arity)
                .ok_or_else(|| CompileError::UnknownFunction(function.clone()))?;
            if let Some(expected) = arity {
                if args.len() != expected {
                    return Err(CompileError::Arity {
                        function: function.clone(),
                        expected,
                        found: args.len(),
                    });
                }
            }
            args.iter().try_for_each(|arg| check(arg, env))
        }
        Expr::Unary(_, operand) => check(operand, env),
        Expr::Binary(_, left, right) | Expr::Logical(_, left, right) => {
            check(left, env)?;
            check(right, env)
        }
        Expr::Conditional(condition, then, otherwise) => {
            check(condition, env)?;
            check(then, env)?;
            check(otherwise, env)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Input {
        Input::schema("log", Metadata::new())
    }

    fn compile(source: &str) -> Result<Arc<dyn Program>, CompileError> {
        ExprEvaluator.compile(source, &schema())
    }

    #[test]
    fn test_compile_accepts_all_root_identifiers() {
        assert!(compile("name == 'log' && policy != nil && signal != nil").is_ok());
        assert!(compile("actionSync == signalSync").is_ok());
    }

    #[test]
    fn test_compile_rejects_unknown_identifier() {
        let error = compile("request.method == 'GET'").expect_err("should fail");
        assert_eq!(error, CompileError::UnknownIdentifier("request".into()));
    }

    #[test]
    fn test_compile_rejects_unknown_function() {
        let error = compile("exec('rm')").expect_err("should fail");
        assert_eq!(error, CompileError::UnknownFunction("exec".into()));
    }

    #[test]
    fn test_compile_checks_arity() {
        let error = compile("len(signal, policy) > 0").expect_err("should fail");
        assert_eq!(
            error,
            CompileError::Arity {
                function: "len".into(),
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_compile_allows_unknown_signal_keys() {
        // The schema has an empty signal map; keys only exist at runtime.
        assert!(compile("signal.anything.at.all == nil").is_ok());
    }

    #[test]
    fn test_program_runs_against_live_input() {
        let program = compile("signal.level == 'info' && !actionSync").expect("compiles");
        let mut signal = Metadata::new();
        signal.insert("level".into(), json!("info"));
        let input = Input::new("log", Metadata::new(), signal, false, false);
        assert_eq!(program.run(&input), Ok(json!(true)));
    }

    #[test]
    fn test_program_debug_shows_source() {
        let program = compile("true").expect("compiles");
        assert_eq!(format!("{program:?}"), r#"ExprProgram("true")"#);
    }
}

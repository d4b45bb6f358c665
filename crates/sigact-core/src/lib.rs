// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # sigact-core
//!
//! Decision engine that turns raised signals into verdicts and routes each
//! verdict to the action it guards.
//!
//! ## Architecture
//!
//! ```text
//! Registry
//!   ├── ConflictSets   : positive / negative signal names, contradiction check
//!   ├── Policy         : compiled boolean expression per action
//!   ├── Action         : named body, run inline (sync) or on the pool (async)
//!   └── DispatchQueue  : bounded Tokio worker pool for async actions
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use sigact_core::{Action, Dispatch, Metadata, RegistryBuilder, Signal};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut builder = RegistryBuilder::default();
//!     builder.register_action(Action::new("terminate", true, |outcome| Ok(outcome.verdict)));
//!     builder.register_action(Action::new("log", false, |_| Ok(true)));
//!     builder
//!         .register_policy("terminate", "signal.terminate == true", Metadata::new())
//!         .unwrap();
//!     builder.register_policy("log", "true", Metadata::new()).unwrap();
//!
//!     let registry = builder.seal().unwrap();
//!
//!     let mut metadata = Metadata::new();
//!     metadata.insert("terminate".into(), true.into());
//!     let outcomes = registry.apply(&[
//!         Signal::new("terminate").with_metadata(metadata).with_sync(true),
//!         Signal::new("log"),
//!     ]);
//!
//!     let reports = registry.dispatch(outcomes).await;
//!     assert!(matches!(reports[0], Dispatch::Executed { result: Ok(true), .. }));
//!     assert!(matches!(reports[1], Dispatch::Queued { .. }));
//!
//!     registry.shutdown().await;
//! }
//! ```

pub mod action;
pub mod config;
pub mod config_loader;
pub mod conflict;
pub mod dispatch;
pub mod error;
pub mod expr;
pub mod policy;
pub mod registry;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export the most commonly used items at the crate root so consumers can
// write `use sigact_core::Registry;` instead of the fully qualified path.
pub use action::Action;
pub use config::EngineConfig;
pub use conflict::{ConflictReport, ConflictSets};
pub use dispatch::{Dispatch, DispatchQueue, QueuedMessage};
pub use error::{
    ActionError, CompileError, DispatchError, EvaluationError, RegistryError, RuntimeError,
};
pub use policy::Policy;
pub use registry::{Registry, RegistryBuilder};
pub use types::{Input, Metadata, Outcome, PolicyDefinition, Signal, PASSTHROUGH};

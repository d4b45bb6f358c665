// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Configuration loader for the registry and its policies.
//!
//! Supports three load strategies:
//!
//! 1. **TOML file**: [`load_config`] reads and deserialises a TOML file into
//!    an [`EngineConfig`].
//! 2. **Environment variables**: [`load_config_from_env`] reads
//!    `SIGACT_`-prefixed environment variables.
//! 3. **Policy file**: [`load_policies`] reads a `[[policies]]` array of
//!    [`PolicyDefinition`]s.
//!
//! Only compiled with the `config-loader` feature (the default).
//!
//! # File formats
//!
//! ```toml
//! # engine.toml
//! default_policy     = "passthrough"
//! workers            = 2
//! queue_capacity     = 64
//! enqueue_timeout_ms = 250
//! positive = ["passthrough", "forward", "accept", "allow", "permit", "pass"]
//! negative = ["terminate", "block", "drop", "reject", "reset"]
//! ```
//!
//! ```toml
//! # policies.toml
//! [[policies]]
//! name   = "terminate"
//! policy = "signal.terminate == true"
//!
//! [[policies]]
//! name     = "log"
//! policy   = "policy.enabled"
//! metadata = { enabled = true }
//! ```
//!
//! # Environment variables
//!
//! | Variable                    | Type           | Default         |
//! |-----------------------------|----------------|-----------------|
//! | `SIGACT_DEFAULT_POLICY`     | string         | "passthrough"   |
//! | `SIGACT_WORKERS`            | integer >= 1   | 2               |
//! | `SIGACT_QUEUE_CAPACITY`     | integer >= 1   | 64              |
//! | `SIGACT_ENQUEUE_TIMEOUT_MS` | integer        | 250             |
//! | `SIGACT_POSITIVE`           | comma list     | built-in set    |
//! | `SIGACT_NEGATIVE`           | comma list     | built-in set    |

#![cfg(feature = "config-loader")]

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::types::PolicyDefinition;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors that can occur while loading engine or policy configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file \"{path}\": {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {source}")]
    TomlParse {
        #[source]
        source: toml::de::Error,
    },

    #[error("field \"{field}\": cannot parse \"{value}\": {reason}")]
    ParseField {
        field: String,
        value: String,
        reason: String,
    },

    #[error("field \"{field}\": value \"{value}\" out of range: {reason}")]
    InvalidRange {
        field: String,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML loaders
// ---------------------------------------------------------------------------

/// Load an [`EngineConfig`] from a TOML file.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, if the TOML content
/// does not match the expected schema, or if a bound is violated.
///
/// # Example
///
/// ```rust,no_run
/// use sigact_core::config_loader::load_config;
///
/// let config = load_config("/etc/sigact/engine.toml").unwrap();
/// println!("workers: {}", config.workers);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let content = read(path.as_ref())?;
    let config: EngineConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse { source })?;
    check_bounds(&config, |field| field.to_owned())?;
    Ok(config)
}

/// Top-level layout of a policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub policies: Vec<PolicyDefinition>,
}

/// Load policy definitions from a TOML file.
pub fn load_policies(path: impl AsRef<Path>) -> Result<Vec<PolicyDefinition>, ConfigError> {
    parse_policies(&read(path.as_ref())?)
}

/// Parse policy definitions from TOML text.
///
/// ```rust
/// use sigact_core::config_loader::parse_policies;
///
/// let policies = parse_policies(r#"
///     [[policies]]
///     name = "log"
///     policy = "true"
/// "#).unwrap();
/// assert_eq!(policies[0].name, "log");
/// ```
pub fn parse_policies(content: &str) -> Result<Vec<PolicyDefinition>, ConfigError> {
    toml::from_str::<PolicyFile>(content)
        .map(|file| file.policies)
        .map_err(|source| ConfigError::TomlParse { source })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.display().to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Environment variable loader
// ---------------------------------------------------------------------------

/// Load an [`EngineConfig`] from `SIGACT_`-prefixed environment variables.
///
/// Unset variables fall back to their defaults.
///
/// # Errors
///
/// Returns [`ConfigError::ParseField`] if a variable cannot be parsed, or
/// [`ConfigError::InvalidRange`] if `SIGACT_WORKERS` or
/// `SIGACT_QUEUE_CAPACITY` is zero.
pub fn load_config_from_env() -> Result<EngineConfig, ConfigError> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Build an [`EngineConfig`] from an arbitrary variable source.
fn load_config_from<F>(lookup: F) -> Result<EngineConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = EngineConfig::default();

    let config = EngineConfig {
        default_policy: lookup("SIGACT_DEFAULT_POLICY")
            .map(|val| val.trim().to_owned())
            .unwrap_or(defaults.default_policy),
        workers: read_env_number(&lookup, "SIGACT_WORKERS", defaults.workers)?,
        queue_capacity: read_env_number(&lookup, "SIGACT_QUEUE_CAPACITY", defaults.queue_capacity)?,
        enqueue_timeout_ms: read_env_number(
            &lookup,
            "SIGACT_ENQUEUE_TIMEOUT_MS",
            defaults.enqueue_timeout_ms,
        )?,
        positive: read_env_list(&lookup, "SIGACT_POSITIVE").unwrap_or(defaults.positive),
        negative: read_env_list(&lookup, "SIGACT_NEGATIVE").unwrap_or(defaults.negative),
    };

    check_bounds(&config, env_name)?;
    Ok(config)
}

fn env_name(field: &str) -> String {
    format!("SIGACT_{}", field.to_ascii_uppercase())
}

fn check_bounds(
    config: &EngineConfig,
    name: impl Fn(&str) -> String,
) -> Result<(), ConfigError> {
    config
        .validate()
        .map_err(|(field, reason)| ConfigError::InvalidRange {
            field: name(field),
            value: match field {
                "workers" => config.workers.to_string(),
                "queue_capacity" => config.queue_capacity.to_string(),
                _ => config.default_policy.clone(),
            },
            reason: reason.into(),
        })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn read_env_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(val) => val.trim().parse::<T>().map_err(|source| ConfigError::ParseField {
            field: key.to_owned(),
            value: val.clone(),
            reason: source.to_string(),
        }),
        None => Ok(default),
    }
}

fn read_env_list<F>(lookup: &F, key: &str) -> Option<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|val| {
        val.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_env_defaults_when_unset() {
        let config = load_config_from(vars(&[])).expect("defaults are valid");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = load_config_from(vars(&[
            ("SIGACT_DEFAULT_POLICY", " allow "),
            ("SIGACT_WORKERS", "4"),
            ("SIGACT_QUEUE_CAPACITY", "16"),
            ("SIGACT_ENQUEUE_TIMEOUT_MS", "0"),
            ("SIGACT_POSITIVE", "go, resume,"),
            ("SIGACT_NEGATIVE", "stop"),
        ]))
        .expect("valid");
        assert_eq!(config.default_policy, "allow");
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.enqueue_timeout_ms, 0);
        assert_eq!(config.positive, ["go", "resume"]);
        assert_eq!(config.negative, ["stop"]);
    }

    #[test]
    fn test_env_parse_error() {
        let error = load_config_from(vars(&[("SIGACT_WORKERS", "many")])).expect_err("not a number");
        match error {
            ConfigError::ParseField { field, value, .. } => {
                assert_eq!(field, "SIGACT_WORKERS");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_zero_capacity_is_out_of_range() {
        let error = load_config_from(vars(&[("SIGACT_QUEUE_CAPACITY", "0")])).expect_err("zero");
        assert!(matches!(
            error,
            ConfigError::InvalidRange { ref field, .. } if field == "SIGACT_QUEUE_CAPACITY"
        ));
    }

    #[test]
    fn test_toml_config_partial() {
        let config: EngineConfig = toml::from_str("workers = 3\nnegative = [\"halt\"]").expect("parses");
        assert_eq!(config.workers, 3);
        assert_eq!(config.negative, ["halt"]);
        assert_eq!(config.queue_capacity, 64);
    }

    #[test]
    fn test_load_config_missing_file() {
        let error = load_config("/nonexistent/sigact/engine.toml").expect_err("no such file");
        assert!(matches!(error, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_load_config_rejects_zero_workers() {
        let path = std::env::temp_dir().join(format!("sigact-engine-{}.toml", std::process::id()));
        fs::write(&path, "workers = 0\n").expect("write temp file");
        let result = load_config(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRange { ref field, .. }) if field == "workers"
        ));
    }

    #[test]
    fn test_parse_policies() {
        let policies = parse_policies(
            r#"
            [[policies]]
            name = "terminate"
            policy = "signal.terminate == true"

            [[policies]]
            name = "log"
            policy = "policy.enabled"
            metadata = { enabled = true, level = "info" }
            "#,
        )
        .expect("parses");
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].name, "terminate");
        assert!(policies[0].metadata.is_empty());
        assert_eq!(policies[1].metadata["enabled"], serde_json::Value::Bool(true));
        assert_eq!(policies[1].metadata["level"], "info");
    }

    #[test]
    fn test_parse_policies_empty_document() {
        assert!(parse_policies("").expect("parses").is_empty());
    }

    #[test]
    fn test_parse_policies_missing_expression() {
        let error = parse_policies("[[policies]]\nname = \"log\"\n").expect_err("policy missing");
        assert!(matches!(error, ConfigError::TomlParse { .. }));
    }
}

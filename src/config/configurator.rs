//! Environment-scoped configuration merging.
//!
//! A raw configuration is a mapping keyed by environment name. Each
//! environment node may name a parent with `$extends`. Resolution walks the
//! chain from the most specific node outwards and merges first-write-wins:
//! a key already present in the accumulator is never replaced, mappings merge
//! recursively, arrays are treated as scalars.

use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Key naming the parent environment of a node.
pub const EXTENDS_KEY: &str = "$extends";

/// Process variable selecting the active environment.
pub const ENV_VAR: &str = "SWIFT_ENV";

pub const DEFAULT_ENV: &str = "development";
const FALLBACK_ENVS: [&str; 2] = ["development", "production"];

/// Resolves raw environment-keyed configuration into a working configuration.
#[derive(Debug, Clone)]
pub struct Configurator {
    env: String,
    config: Map<String, Value>,
}

impl Configurator {
    /// Configurator for the environment named by `SWIFT_ENV` (default `development`).
    pub fn new() -> Self {
        let env = std::env::var(ENV_VAR)
            .ok()
            .filter(|env| !env.is_empty())
            .unwrap_or_else(|| DEFAULT_ENV.to_string());
        Self::with_env(env)
    }

    pub fn with_env(env: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            config: Map::new(),
        }
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// Resolve `raw` for the active environment and make it the working configuration.
    pub fn compile(&mut self, raw: &Value) -> Result<&mut Self, ConfigError> {
        self.config = self.extend(raw)?;
        Ok(self)
    }

    /// Resolve `raw` for the active environment without touching the working configuration.
    pub fn extend(&self, raw: &Value) -> Result<Map<String, Value>, ConfigError> {
        let root = as_mapping(raw)?;

        let mut next = std::iter::once(self.env.as_str())
            .chain(FALLBACK_ENVS)
            .find(|name| root.get(*name).is_some_and(Value::is_object));

        let mut resolved = Map::new();
        let mut visited: Vec<&str> = Vec::new();

        while let Some(name) = next {
            if visited.contains(&name) {
                return Err(ConfigError::ExtendsCycle(name.to_string()));
            }
            visited.push(name);

            let Some(Value::Object(node)) = root.get(name) else {
                break;
            };
            merge_missing(&mut resolved, node);
            next = node.get(EXTENDS_KEY).and_then(Value::as_str);
        }

        strip_extends(&mut resolved);
        tracing::debug!(env = %self.env, chain = ?visited, "Configuration resolved");
        Ok(resolved)
    }

    /// Layer `defaults` underneath the working configuration.
    pub fn complete(&mut self, defaults: &Value) -> Result<&mut Self, ConfigError> {
        let defaults = as_mapping(defaults)?;
        merge_missing(&mut self.config, defaults);
        Ok(self)
    }

    /// Same as [`complete`](Self::complete) for an already-resolved mapping.
    pub fn complete_with(&mut self, defaults: &Map<String, Value>) -> &mut Self {
        merge_missing(&mut self.config, defaults);
        self
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn into_config(self) -> Map<String, Value> {
        self.config
    }
}

impl Default for Configurator {
    fn default() -> Self {
        Self::new()
    }
}

/// First-write-wins recursive merge of `source` into `target`.
pub fn merge_missing(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Object(nested) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(slot) = slot {
                    merge_missing(slot, nested);
                }
            }
            other => {
                target.entry(key.clone()).or_insert_with(|| other.clone());
            }
        }
    }
}

fn strip_extends(config: &mut Map<String, Value>) {
    config.remove(EXTENDS_KEY);
    for value in config.values_mut() {
        if let Value::Object(nested) = value {
            strip_extends(nested);
        }
    }
}

fn as_mapping(value: &Value) -> Result<&Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| ConfigError::BadConfig(type_name(value)))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extends_chain_is_first_write_wins_fold() {
        let raw = json!({
            "production": { "a": 1, "b": 1, "c": 1, "nested": { "x": "prod", "y": "prod" } },
            "staging": { "$extends": "production", "b": 2, "nested": { "x": "staging" } },
            "development": { "$extends": "staging", "a": 3 }
        });

        let resolved = Configurator::with_env("development").extend(&raw).unwrap();
        assert_eq!(
            Value::Object(resolved),
            json!({ "a": 3, "b": 2, "c": 1, "nested": { "x": "staging", "y": "prod" } })
        );
    }

    #[test]
    fn test_arrays_are_scalars() {
        let raw = json!({
            "base": { "hosts": ["a", "b", "c"] },
            "development": { "$extends": "base", "hosts": ["z"] }
        });
        let resolved = Configurator::with_env("development").extend(&raw).unwrap();
        assert_eq!(resolved["hosts"], json!(["z"]));
    }

    #[test]
    fn test_environment_fallbacks() {
        let raw = json!({ "production": { "only": "prod" } });
        let resolved = Configurator::with_env("testing").extend(&raw).unwrap();
        assert_eq!(resolved["only"], json!("prod"));

        let raw = json!({ "development": { "d": 1 }, "production": { "p": 1 } });
        let resolved = Configurator::with_env("testing").extend(&raw).unwrap();
        assert_eq!(Value::Object(resolved), json!({ "d": 1 }));

        let resolved = Configurator::with_env("testing").extend(&json!({})).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_extends_to_missing_env_terminates() {
        let raw = json!({ "development": { "$extends": "nowhere", "a": 1 } });
        let resolved = Configurator::with_env("development").extend(&raw).unwrap();
        assert_eq!(Value::Object(resolved), json!({ "a": 1 }));
    }

    #[test]
    fn test_extends_cycle_detected() {
        let raw = json!({
            "development": { "$extends": "production" },
            "production": { "$extends": "development" }
        });
        let err = Configurator::with_env("development").extend(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::ExtendsCycle(ref env) if env == "development"));
    }

    #[test]
    fn test_extends_stripped_at_every_level() {
        let raw = json!({ "development": { "db": { "$extends": "x", "host": "h" } } });
        let resolved = Configurator::with_env("development").extend(&raw).unwrap();
        assert_eq!(Value::Object(resolved), json!({ "db": { "host": "h" } }));
    }

    #[test]
    fn test_compile_rejects_non_mapping() {
        let mut configurator = Configurator::with_env("development");
        assert!(matches!(
            configurator.compile(&json!([1, 2])),
            Err(ConfigError::BadConfig("array"))
        ));
        assert!(matches!(
            configurator.complete(&json!("x")),
            Err(ConfigError::BadConfig("string"))
        ));
    }

    #[test]
    fn test_complete_never_overwrites() {
        let mut configurator = Configurator::with_env("development");
        configurator
            .compile(&json!({
                "development": {
                    "swift": { "server": { "port": "4000", "ip": null } },
                    "list": [1],
                    "scalar": "app"
                }
            }))
            .unwrap()
            .complete(&json!({
                "swift": { "server": { "port": "3333", "ip": "127.0.0.1", "timeout": 30 } },
                "list": [1, 2, 3],
                "scalar": { "would": "replace" },
                "extra": true
            }))
            .unwrap();

        assert_eq!(
            Value::Object(configurator.config().clone()),
            json!({
                "swift": { "server": { "port": "4000", "ip": null, "timeout": 30 } },
                "list": [1],
                "scalar": "app",
                "extra": true
            })
        );
    }

    #[test]
    fn test_extend_leaves_working_config_untouched() {
        let mut configurator = Configurator::with_env("development");
        configurator
            .compile(&json!({ "development": { "a": 1 } }))
            .unwrap();
        let other = configurator
            .extend(&json!({ "development": { "b": 2 } }))
            .unwrap();
        assert_eq!(Value::Object(other), json!({ "b": 2 }));
        assert_eq!(Value::Object(configurator.into_config()), json!({ "a": 1 }));
    }
}

//! Database manager contract.
//!
//! Concrete drivers live outside this crate. A manager creates one adapter
//! per configured entry of `swift.dbManager.adapters`; each adapter holds the
//! parameters of its named connections and opens them on demand.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{PluginError, Result};

/// Driver-specific connection parameters, as configured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionParams(Map<String, Value>);

impl ConnectionParams {
    pub fn new(params: Map<String, Value>) -> Self {
        Self(params)
    }

    /// Parse a configured connection entry; it must be a mapping.
    pub fn from_value(name: &str, value: &Value) -> std::result::Result<Self, PluginError> {
        value
            .as_object()
            .cloned()
            .map(Self)
            .ok_or_else(|| PluginError::BadConnectionParams {
                name: name.to_string(),
                message: "expected a mapping".to_string(),
            })
    }

    /// Connection URI, when configured.
    pub fn uri(&self) -> Option<&str> {
        self.0.get("uri").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[async_trait]
/// Database driver holding a set of named connections.
pub trait DbAdapter: Send + Sync {
    /// Name the adapter was created under.
    fn name(&self) -> &str;

    /// Register the parameters of `connection`; fails if the name is taken.
    fn add_connection_params(&self, connection: &str, params: ConnectionParams) -> Result<()>;

    /// Configured connections, in configuration order.
    fn connection_params(&self) -> IndexMap<String, ConnectionParams>;

    /// Open one named connection.
    async fn connect_one(&self, connection: &str) -> Result<()>;
}

/// Creates and owns [`DbAdapter`]s.
pub trait DbManager: Send + Sync {
    /// Create and register an adapter of type `kind` under `name`.
    fn create_adapter(&mut self, kind: &str, name: &str) -> Result<Arc<dyn DbAdapter>>;

    /// Registered adapters, in creation order.
    fn adapters(&self) -> Vec<Arc<dyn DbAdapter>>;

    /// Adapter registered under `name`.
    fn adapter(&self, name: &str) -> Option<Arc<dyn DbAdapter>> {
        self.adapters().into_iter().find(|a| a.name() == name)
    }
}

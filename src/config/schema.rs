//! Typed views over the resolved configuration tree.
//!
//! The tree itself stays a generic value (it is merged before it is typed);
//! these structs read the framework's own sections out of it. Optional
//! manager sections are read entry by entry so one malformed entry does not
//! hide the others.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// The `swift` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SwiftSettings {
    pub server: ServerSettings,
    pub router: RouterSettings,
}

impl SwiftSettings {
    pub fn from_config(config: &Map<String, Value>) -> Result<Self, ConfigError> {
        match config.get("swift") {
            None => Ok(Self::default()),
            Some(section) => serde_json::from_value(section.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "swift".to_string(),
                    message: e.to_string(),
                }
            }),
        }
    }
}

/// The `swift.server` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Listen address (dotted IPv4).
    pub ip: String,

    /// Listen port, as a number or a numeric string.
    pub port: PortSetting,

    /// Request timeout in seconds; 0 disables the timeout.
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: PortSetting::Text("3333".to_string()),
            request_timeout_secs: 30,
        }
    }
}

/// A port written either as `4000` or `"4000"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortSetting {
    Number(u64),
    Text(String),
}

impl fmt::Display for PortSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSetting::Number(n) => write!(f, "{n}"),
            PortSetting::Text(s) => f.write_str(s),
        }
    }
}

/// The `swift.router` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterSettings {
    /// Redirect slash-less GET paths to their trailing-slash form.
    pub endslash: bool,
}

/// One entry of `swift.dbManager.adapters`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdapterSettings {
    /// Adapter type; defaults to the adapter name.
    #[serde(rename = "type")]
    pub kind: Option<String>,

    /// Connection name → driver-specific parameters.
    pub connections: IndexMap<String, Value>,
}

/// One entry of `swift.loggerManager.loggers`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoggerSettings {
    /// Log file; `.`/`..` prefixes resolve against the project directory.
    pub path: Option<String>,
    pub encoding: Option<String>,
    pub disabled: bool,
}

/// Read the mapping at `pointer` (e.g. `/swift/dbManager/adapters`).
pub fn section<'a>(config: &'a Value, pointer: &str) -> Option<&'a Map<String, Value>> {
    config.pointer(pointer).and_then(Value::as_object)
}

/// Deserialize every entry of a mapping independently.
pub fn entries<T>(
    section: &Map<String, Value>,
    key_prefix: &str,
) -> Vec<(String, Result<T, ConfigError>)>
where
    T: for<'de> Deserialize<'de>,
{
    section
        .iter()
        .map(|(name, value)| {
            let parsed = serde_json::from_value(value.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: format!("{key_prefix}.{name}"),
                    message: e.to_string(),
                }
            });
            (name.clone(), parsed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_port_as_string_or_number() {
        let config = json!({ "swift": { "server": { "port": 4000 } } });
        let settings = SwiftSettings::from_config(config.as_object().unwrap()).unwrap();
        assert_eq!(settings.server.port.to_string(), "4000");
        assert_eq!(settings.server.ip, "127.0.0.1");

        let config = json!({ "swift": { "server": { "port": "5000" }, "router": { "endslash": true } } });
        let settings = SwiftSettings::from_config(config.as_object().unwrap()).unwrap();
        assert_eq!(settings.server.port, PortSetting::Text("5000".into()));
        assert!(settings.router.endslash);
    }

    #[test]
    fn test_invalid_section() {
        let config = json!({ "swift": { "server": { "requestTimeoutSecs": "soon" } } });
        let err = SwiftSettings::from_config(config.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "swift"));
    }

    #[test]
    fn test_entries_are_independent() {
        let config = json!({
            "swift": { "loggerManager": { "loggers": {
                "access": { "path": "./logs/access.log" },
                "broken": { "disabled": "sometimes" },
                "error": {}
            } } }
        });
        let loggers = section(&config, "/swift/loggerManager/loggers").unwrap();
        let parsed = entries::<LoggerSettings>(loggers, "swift.loggerManager.loggers");

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].1.as_ref().unwrap().path.as_deref(), Some("./logs/access.log"));
        assert!(parsed[1].1.is_err());
        assert!(!parsed[2].1.as_ref().unwrap().disabled);
    }

    #[test]
    fn test_adapter_type_rename() {
        let value = json!({ "type": "mongo", "connections": { "main": { "uri": "mongodb://x" } } });
        let adapter: AdapterSettings = serde_json::from_value(value).unwrap();
        assert_eq!(adapter.kind.as_deref(), Some("mongo"));
        assert_eq!(adapter.connections["main"]["uri"], json!("mongodb://x"));
    }
}

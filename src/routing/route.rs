//! Route descriptors.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RouteError;

/// Name used for any of module/controller/action when a route omits it.
pub const DEFAULT_TARGET: &str = "index";

/// A compiled route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    /// URL pattern, express-style (`/users/:id`).
    pub path: String,
    pub module: String,
    pub controller: String,
    pub action: String,
    /// Alternative raw path (`_path`), kept verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_path: Option<String>,
}

/// Ordered alias → route mapping. Aliases are unique.
pub type RouteTable = IndexMap<String, Route>;

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            module: DEFAULT_TARGET.to_string(),
            controller: DEFAULT_TARGET.to_string(),
            action: DEFAULT_TARGET.to_string(),
            raw_path: None,
        }
    }

    /// Build a route from its descriptor mapping.
    pub fn from_descriptor(alias: &str, descriptor: &Value) -> Result<Self, RouteError> {
        let bad = |message: String| RouteError::BadRoute {
            alias: alias.to_string(),
            message,
        };
        let map = descriptor
            .as_object()
            .ok_or_else(|| bad("descriptor must be a mapping".to_string()))?;

        let path = string_field(map, "path")
            .map_err(&bad)?
            .ok_or_else(|| bad("\"path\" is required".to_string()))?;

        let mut route = Route::new(path);
        if let Some(module) = string_field(map, "module").map_err(&bad)? {
            route.module = module;
        }
        if let Some(controller) = string_field(map, "controller").map_err(&bad)? {
            route.controller = controller;
        }
        if let Some(action) = string_field(map, "action").map_err(&bad)? {
            route.action = action;
        }
        route.raw_path = string_field(map, "_path").map_err(&bad)?;
        Ok(route)
    }

    /// `module/controller/action`, used in logs and listings.
    pub fn target(&self) -> String {
        format!("{}/{}/{}", self.module, self.controller, self.action)
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("\"{key}\" must be a string")),
    }
}

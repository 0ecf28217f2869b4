//! Helper manager contract and the built-in URL helper.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::error::{PluginError, Result};
use crate::routing::route::RouteTable;

/// Name of the URL helper, which receives the compiled route table.
pub const URL_HELPER: &str = "url";

/// View-side helper, looked up by name.
pub trait Helper: Send + Sync {
    /// Lookup name.
    fn name(&self) -> &str;

    /// Receive the compiled route table.
    fn set_routes(&self, _routes: Arc<RouteTable>) -> Result<()> {
        Err(PluginError::Unsupported(format!("helper \"{}\"", self.name())).into())
    }

    /// Downcast hook for typed access.
    fn as_any(&self) -> &dyn Any;
}

/// Registry of [`Helper`]s.
pub trait HelperManager: Send + Sync {
    /// Helper registered under `name`.
    fn helper(&self, name: &str) -> Option<Arc<dyn Helper>>;
}

/// Builds URLs from route aliases.
#[derive(Default)]
pub struct UrlHelper {
    routes: ArcSwapOption<RouteTable>,
}

impl UrlHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// URL of the route `alias`, with `:name` segments filled from `params`.
    ///
    /// `None` when the alias is unknown or a segment has no value.
    pub fn url(&self, alias: &str, params: &BTreeMap<String, String>) -> Option<String> {
        let routes = self.routes.load_full()?;
        let route = routes.get(alias)?;
        let segments = route
            .path
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => params.get(name).cloned(),
                None => Some(segment.to_string()),
            })
            .collect::<Option<Vec<_>>>()?;
        Some(segments.join("/"))
    }
}

impl Helper for UrlHelper {
    fn name(&self) -> &str {
        URL_HELPER
    }

    fn set_routes(&self, routes: Arc<RouteTable>) -> Result<()> {
        self.routes.store(Some(routes));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Manager exposing the built-in helpers.
pub struct DefaultHelperManager {
    url: Arc<UrlHelper>,
}

impl DefaultHelperManager {
    pub fn new() -> Self {
        Self {
            url: Arc::new(UrlHelper::new()),
        }
    }

    pub fn url_helper(&self) -> Arc<UrlHelper> {
        self.url.clone()
    }
}

impl Default for DefaultHelperManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HelperManager for DefaultHelperManager {
    fn helper(&self, name: &str) -> Option<Arc<dyn Helper>> {
        match name {
            URL_HELPER => Some(self.url.clone()),
            _ => None,
        }
    }
}

//! Route tree compilation.
//!
//! # Responsibilities
//! - Flatten a nested route tree into an alias → route table
//! - Inline `$require` fragments (JSON or TOML) relative to the declaring file
//!
//! # Design Decisions
//! - Compiling is additive: successive trees accumulate into one table
//! - A missing fragment is skipped, a malformed one is an error
//! - A fragment that requires itself (directly or not) is rejected

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::config::loader::{self, Format};
use crate::config::paths::normalize;
use crate::config::configurator::type_name;
use crate::error::{ConfigError, RouteError};
use crate::routing::route::{Route, RouteTable};

/// Directive key for fragment inclusion.
pub const REQUIRE_KEY: &str = "$require";

#[derive(Debug, Default)]
pub struct Router {
    require_dir: Option<PathBuf>,
    routes: RouteTable,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base directory for top-level `$require` references.
    pub fn set_path_to_require_routes_dir(&mut self, dir: impl AsRef<Path>) -> Result<(), RouteError> {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(RouteError::BadRequireDir);
        }
        self.require_dir = Some(normalize(dir));
        Ok(())
    }

    pub fn require_dir(&self) -> Option<&Path> {
        self.require_dir.as_deref()
    }

    pub fn add_route(&mut self, alias: &str, descriptor: &Value) -> Result<(), RouteError> {
        if alias.is_empty() {
            return Err(RouteError::BadAlias);
        }
        if self.routes.contains_key(alias) {
            return Err(RouteError::RouteAlreadyExists(alias.to_string()));
        }
        let route = Route::from_descriptor(alias, descriptor)?;
        tracing::debug!(alias = %alias, path = %route.path, target = %route.target(), "Route added");
        self.routes.insert(alias.to_string(), route);
        Ok(())
    }

    /// Compile a route tree into the table.
    pub fn compile(&mut self, tree: &Value) -> Result<(), RouteError> {
        let base = self.require_dir.clone();
        let mut active = Vec::new();
        self.compile_node(tree, base.as_deref(), &mut active)
    }

    fn compile_node(
        &mut self,
        tree: &Value,
        base: Option<&Path>,
        active: &mut Vec<PathBuf>,
    ) -> Result<(), RouteError> {
        let map = tree
            .as_object()
            .ok_or_else(|| RouteError::BadRoutes(type_name(tree)))?;

        for (key, value) in map {
            if key == REQUIRE_KEY {
                self.compile_require(value, base, active)?;
            } else {
                self.add_route(key, value)?;
            }
        }
        Ok(())
    }

    fn compile_require(
        &mut self,
        directive: &Value,
        base: Option<&Path>,
        active: &mut Vec<PathBuf>,
    ) -> Result<(), RouteError> {
        let references: Vec<&str> = match directive {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| RouteError::BadRequire(format!("expected a string, got {}", type_name(item))))
                })
                .collect::<Result<_, _>>()?,
            other => {
                return Err(RouteError::BadRequire(format!(
                    "expected a string or an array, got {}",
                    type_name(other)
                )))
            }
        };

        let Some(base) = base else {
            tracing::debug!("No routes directory set, ignoring $require");
            return Ok(());
        };

        for reference in references {
            let path = fragment_path(base, reference);
            if !path.is_file() {
                tracing::debug!(path = %path.display(), "Route fragment not found, skipping");
                continue;
            }
            if active.contains(&path) {
                return Err(RouteError::BadRequire(format!(
                    "circular $require of {}",
                    path.display()
                )));
            }

            let fragment = load_fragment(&path)?;
            let fragment_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| base.to_path_buf());

            active.push(path);
            let result = self.compile_node(&fragment, Some(&fragment_dir), active);
            active.pop();
            result?;
        }
        Ok(())
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn set_routes(&mut self, routes: RouteTable) {
        self.routes = routes;
    }

    pub fn into_routes(self) -> RouteTable {
        self.routes
    }
}

/// Resolve a `$require` reference against `base`, defaulting to `.json`.
fn fragment_path(base: &Path, reference: &str) -> PathBuf {
    let mut path = base.join(reference);
    if path.extension().is_none() {
        path.set_extension("json");
    }
    normalize(&path)
}

fn load_fragment(path: &Path) -> Result<Value, RouteError> {
    if Format::from_path(path).is_none() {
        return Err(RouteError::UnsupportedFragment(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|e| RouteError::FragmentIo {
        path: path.to_path_buf(),
        source: Arc::new(e),
    })?;
    loader::parse_document(path, &content).map_err(|e| match e {
        ConfigError::Parse { path, message } => RouteError::FragmentParse { path, message },
        other => RouteError::FragmentParse {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_route_validation() {
        let mut router = Router::new();
        assert!(matches!(router.add_route("", &json!({ "path": "/" })), Err(RouteError::BadAlias)));
        router.add_route("home", &json!({ "path": "/" })).unwrap();
        assert!(matches!(
            router.add_route("home", &json!({ "path": "/again" })),
            Err(RouteError::RouteAlreadyExists(ref a)) if a == "home"
        ));
    }

    #[test]
    fn test_compile_is_additive() {
        let mut router = Router::new();
        router.compile(&json!({ "home": { "path": "/" } })).unwrap();
        router.compile(&json!({ "about": { "path": "/about" } })).unwrap();
        assert_eq!(router.routes().keys().collect::<Vec<_>>(), ["home", "about"]);

        let err = router.compile(&json!({ "about": { "path": "/other" } })).unwrap_err();
        assert!(matches!(err, RouteError::RouteAlreadyExists(_)));
    }

    #[test]
    fn test_compile_rejects_non_mapping() {
        let mut router = Router::new();
        assert!(matches!(router.compile(&json!([1, 2])), Err(RouteError::BadRoutes("array"))));
    }

    #[test]
    fn test_require_dir_validation() {
        let mut router = Router::new();
        assert!(matches!(
            router.set_path_to_require_routes_dir(""),
            Err(RouteError::BadRequireDir)
        ));
        router.set_path_to_require_routes_dir("/srv/app/./config/").unwrap();
        assert_eq!(router.require_dir(), Some(Path::new("/srv/app/config")));
    }

    #[test]
    fn test_require_inlines_fragments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("extra.json"), r#"{"about": {"path": "/about"}}"#).unwrap();

        let mut router = Router::new();
        router.set_path_to_require_routes_dir(dir.path()).unwrap();
        router
            .compile(&json!({ "home": { "path": "/" }, "$require": "extra.json" }))
            .unwrap();

        let routes = router.routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes["about"].target(), "index/index/index");
    }

    #[test]
    fn test_nested_require_resolves_against_fragment_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("admin");
        fs::create_dir(&nested).unwrap();
        fs::write(
            dir.path().join("admin.json"),
            r#"{"$require": ["admin/users", "admin/missing"]}"#,
        )
        .unwrap();
        fs::write(nested.join("users.json"), r#"{"users": {"path": "/admin/users", "module": "admin"}}"#).unwrap();

        let mut router = Router::new();
        router.set_path_to_require_routes_dir(dir.path()).unwrap();
        router.compile(&json!({ "$require": "admin" })).unwrap();

        assert_eq!(router.routes().len(), 1);
        assert_eq!(router.routes()["users"].module, "admin");
    }

    #[test]
    fn test_toml_fragment() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("extra.toml"), "[contact]\npath = \"/contact\"\n").unwrap();

        let mut router = Router::new();
        router.set_path_to_require_routes_dir(dir.path()).unwrap();
        router.compile(&json!({ "$require": ["extra.toml"] })).unwrap();
        assert_eq!(router.routes()["contact"].path, "/contact");
    }

    #[test]
    fn test_bad_fragments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("routes.yaml"), "a: b").unwrap();
        fs::write(dir.path().join("loop.json"), r#"{"$require": "loop.json"}"#).unwrap();

        let mut router = Router::new();
        router.set_path_to_require_routes_dir(dir.path()).unwrap();

        let err = router.compile(&json!({ "$require": "broken" })).unwrap_err();
        assert!(matches!(err, RouteError::FragmentParse { .. }));

        let err = router.compile(&json!({ "$require": "routes.yaml" })).unwrap_err();
        assert!(matches!(err, RouteError::UnsupportedFragment(_)));

        let err = router.compile(&json!({ "$require": "loop" })).unwrap_err();
        assert!(matches!(err, RouteError::BadRequire(_)));

        let err = router.compile(&json!({ "$require": 7 })).unwrap_err();
        assert!(matches!(err, RouteError::BadRequire(_)));
    }

    #[test]
    fn test_require_without_dir_is_ignored() {
        let mut router = Router::new();
        router
            .compile(&json!({ "$require": "extra", "home": { "path": "/" } }))
            .unwrap();
        assert_eq!(router.routes().len(), 1);
    }
}

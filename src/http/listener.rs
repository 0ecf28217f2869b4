//! HTTP request listener.
//!
//! # Responsibilities
//! - Hold listener options (`port`, `views`, `endslash`, `requestTimeoutSecs`)
//! - Collect route mounts from the module manager
//! - Build the Axum router with middleware and dispatch
//!
//! # Design Decisions
//! - Shared as `Arc` between the orchestrator, the module manager and the
//!   server, so mutation goes through interior locks
//! - Mount paths are express-style and translated to Axum captures once,
//!   when the router is built
//! - Two mounts with the same shape (`/users/:id`, `/users/:name`) would
//!   conflict inside Axum; the first one wins and the rest are logged

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use serde_json::Value;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::error::{Error, Result};
use crate::routing::middleware::{chain_layer, Endslash, MiddlewareChain};

pub const OPTION_PORT: &str = "port";
pub const OPTION_VIEWS: &str = "views";
pub const OPTION_ENDSLASH: &str = "endslash";
pub const OPTION_REQUEST_TIMEOUT: &str = "requestTimeoutSecs";

/// Module, controller and action a request is dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteTarget {
    pub module: String,
    pub controller: String,
    pub action: String,
}

impl RouteTarget {
    pub fn new(module: impl Into<String>, controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            controller: controller.into(),
            action: action.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub path: String,
    pub target: RouteTarget,
}

/// Receives every request that matched a mount.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, target: &RouteTarget, req: Request<Body>) -> Response;
}

#[derive(Default)]
pub struct HttpListener {
    options: RwLock<BTreeMap<String, Value>>,
    mounts: RwLock<Vec<Mount>>,
    dispatcher: RwLock<Option<Arc<dyn Dispatcher>>>,
    middleware: RwLock<MiddlewareChain>,
}

impl HttpListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_option(&self, key: impl Into<String>, value: Value) {
        write(&self.options).insert(key.into(), value);
    }

    pub fn option(&self, key: &str) -> Option<Value> {
        read(&self.options).get(key).cloned()
    }

    /// Register `target` under an express-style `path`.
    ///
    /// Returns `false` when an equivalent path was already mounted. Paths the
    /// HTTP router cannot hold (unnamed `:` captures, `*` before the last
    /// segment) are rejected here, before the router is ever built.
    pub fn mount(&self, path: &str, target: RouteTarget) -> Result<bool> {
        validate_mount_path(path)?;
        let shape = path_shape(path);
        let mut mounts = write(&self.mounts);
        if let Some(existing) = mounts.iter().find(|m| path_shape(&m.path) == shape) {
            tracing::warn!(
                path = %path,
                existing = %existing.path,
                "Path already mounted, keeping the first mount"
            );
            return Ok(false);
        }
        mounts.push(Mount {
            path: path.to_string(),
            target,
        });
        Ok(true)
    }

    pub fn mounts(&self) -> Vec<Mount> {
        read(&self.mounts).clone()
    }

    pub fn set_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) {
        *write(&self.dispatcher) = Some(dispatcher);
    }

    pub fn set_middleware(&self, chain: MiddlewareChain) {
        *write(&self.middleware) = chain;
    }

    /// Build the Axum router for the current mounts and options.
    #[allow(deprecated)]
    pub fn into_router(&self) -> Router {
        let dispatcher = read(&self.dispatcher).clone();
        let mut router = Router::new();

        for mount in read(&self.mounts).iter() {
            let target = Arc::new(mount.target.clone());
            let dispatcher = dispatcher.clone();
            router = router.route(
                &axum_path(&mount.path),
                any(move |req: Request<Body>| {
                    let target = target.clone();
                    let dispatcher = dispatcher.clone();
                    async move {
                        match dispatcher {
                            Some(dispatcher) => dispatcher.dispatch(&target, req).await,
                            None => (StatusCode::NOT_IMPLEMENTED, "No dispatcher installed").into_response(),
                        }
                    }
                }),
            );
        }
        router = router.fallback(|| async { StatusCode::NOT_FOUND });

        let mut chain = read(&self.middleware).clone();
        if self.option(OPTION_ENDSLASH).and_then(|v| v.as_bool()).unwrap_or(false) {
            chain.prepend(Arc::new(Endslash));
        }
        router = router.layer(middleware::from_fn_with_state(Arc::new(chain), chain_layer));

        let timeout = self
            .option(OPTION_REQUEST_TIMEOUT)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if timeout > 0 {
            router = router.layer(TimeoutLayer::new(Duration::from_secs(timeout)));
        }

        router.layer(TraceLayer::new_for_http())
    }
}

impl std::fmt::Debug for HttpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpListener")
            .field("options", &*read(&self.options))
            .field("mounts", &read(&self.mounts).len())
            .finish()
    }
}

/// Translate an express-style path (`/users/:id`, `/files/*`) to Axum syntax.
pub fn axum_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if segment == "*" {
                "{*wildcard}".to_string()
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{name}}}")
            } else {
                segment.replace('{', "{{").replace('}', "}}")
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn validate_mount_path(path: &str) -> Result<()> {
    let bad = |reason: String| Error::validation(format!("bad mount path \"{path}\": {reason}"));
    if !path.starts_with('/') {
        return Err(bad("must start with '/'".into()));
    }
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        let name = match segment.strip_prefix([':', '*']) {
            Some(name) => name,
            None => continue,
        };
        if segment.starts_with(':') && name.is_empty() {
            return Err(bad("capture without a name".into()));
        }
        if name.contains(['{', '}', ':', '*']) {
            return Err(bad(format!("bad capture name in \"{segment}\"")));
        }
        if segment.starts_with('*') && i != last {
            return Err(bad("wildcard must be the last segment".into()));
        }
    }
    Ok(())
}

/// Path with capture names erased, for conflict detection.
fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.chars().next() {
            Some(':') => ":",
            Some('*') => "*",
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl Dispatcher for Echo {
        async fn dispatch(&self, target: &RouteTarget, _req: Request<Body>) -> Response {
            format!("{}#{}", target.controller, target.action).into_response()
        }
    }

    #[test]
    fn test_axum_path() {
        assert_eq!(axum_path("/users/:id"), "/users/{id}");
        assert_eq!(axum_path("/files/*"), "/files/{*wildcard}");
        assert_eq!(axum_path("/files/*rest"), "/files/{*rest}");
        assert_eq!(axum_path("/"), "/");
    }

    #[test]
    fn test_mount_validation_and_conflicts() {
        let listener = HttpListener::new();
        assert!(listener.mount("users", RouteTarget::new("a", "b", "c")).is_err());
        assert!(listener.mount("/users/:id", RouteTarget::new("a", "b", "c")).unwrap());
        assert!(!listener.mount("/users/:name", RouteTarget::new("x", "y", "z")).unwrap());
        assert_eq!(listener.mounts().len(), 1);
    }

    #[test]
    fn test_mount_rejects_unroutable_paths() {
        let listener = HttpListener::new();
        let target = || RouteTarget::new("a", "b", "c");
        for bad in ["/a/:", "/:/b", "/files/*/x", "/files/*rest/x", "/a/:id:x", "/a/*x*"] {
            assert!(listener.mount(bad, target()).is_err(), "{bad}");
        }
        assert!(listener.mounts().is_empty());

        for good in ["/files/*", "/docs/*rest", "/a/:id/b", "/a/b:c", "/"] {
            assert!(listener.mount(good, target()).unwrap(), "{good}");
        }
        // the accepted set must build without panicking
        let _ = listener.into_router();
    }

    #[test]
    fn test_options() {
        let listener = HttpListener::new();
        assert_eq!(listener.option(OPTION_PORT), None);
        listener.set_option(OPTION_PORT, json!("3333"));
        assert_eq!(listener.option(OPTION_PORT), Some(json!("3333")));
    }

    #[tokio::test]
    async fn test_router_dispatches_mounts() {
        let listener = HttpListener::new();
        listener.mount("/users/:id", RouteTarget::new("users", "users", "show")).unwrap();
        listener.set_dispatcher(Arc::new(Echo));

        let response = listener
            .into_router()
            .oneshot(Request::get("/users/7").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"users#show");

        let missing = listener
            .into_router()
            .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_router_without_dispatcher() {
        let listener = HttpListener::new();
        listener.mount("/", RouteTarget::new("index", "index", "index")).unwrap();
        let response = listener
            .into_router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_endslash_option() {
        let listener = HttpListener::new();
        listener.mount("/about/", RouteTarget::new("index", "index", "about")).unwrap();
        listener.set_dispatcher(Arc::new(Echo));
        listener.set_option(OPTION_ENDSLASH, json!(true));

        let response = listener
            .into_router()
            .oneshot(Request::get("/about").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    }
}

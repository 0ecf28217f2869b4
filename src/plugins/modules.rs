//! Module manager contract and the built-in directory-backed manager.
//!
//! A module owns a set of controllers and answers the requests routed to
//! it. The manager maps module names to module instances, mounts every
//! route on the HTTP listener and dispatches matched requests to the owning
//! module.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::{Error, PluginError, Result};
use crate::http::listener::{Dispatcher, HttpListener, RouteTarget};
use crate::lifecycle::state::Subsystem;

#[async_trait]
/// Application module: a directory of controllers answering routed requests.
pub trait Module: Send + Sync {
    /// Name routes refer to in their `module` field.
    fn name(&self) -> &str;

    /// Directory the module lives in.
    fn module_path(&self) -> &Path;

    /// Start the module (open resources, warm caches).
    async fn run(&self) -> Result<()>;

    /// Answer a request routed to one of this module's controllers.
    async fn handle(&self, target: &RouteTarget, _req: Request<Body>) -> Response {
        (
            StatusCode::NOT_IMPLEMENTED,
            format!(
                "{}: no handler for {}/{}",
                self.name(),
                target.controller,
                target.action
            ),
        )
            .into_response()
    }
}

/// Loads modules and mounts routes onto the listener.
pub trait ModuleManager: Send + Sync {
    /// Directory holding one subdirectory per module.
    fn set_modules_root_directory(&mut self, dir: &Path) -> Result<()>;

    /// Listener routes are mounted on; also receives the dispatcher.
    fn set_request_listener(&mut self, listener: Arc<HttpListener>) -> Result<()>;

    /// Mount `path` for `module`/`controller`/`action`.
    ///
    /// Fails when the listener is unset, the module cannot be loaded, or the
    /// path cannot be routed.
    fn add_route(&mut self, module: &str, controller: &str, action: &str, path: &str) -> Result<()>;

    /// Known modules, by name.
    fn modules(&self) -> BTreeMap<String, Arc<dyn Module>>;
}

type ModuleMap = Arc<RwLock<BTreeMap<String, Arc<dyn Module>>>>;

/// Default manager: explicitly registered modules, plus a [`DirectoryModule`]
/// for every other module name a route refers to.
#[derive(Default)]
pub struct BasicModuleManager {
    root: Option<PathBuf>,
    listener: Option<Arc<HttpListener>>,
    modules: ModuleMap,
}

impl BasicModuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_module(&mut self, module: Arc<dyn Module>) -> Result<()> {
        let mut modules = self.modules.write().unwrap_or_else(|e| e.into_inner());
        let name = module.name().to_string();
        if modules.contains_key(&name) {
            return Err(PluginError::Duplicate {
                manager: "module",
                name,
            }
            .into());
        }
        modules.insert(name, module);
        Ok(())
    }

    pub fn modules_root_directory(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn ensure_module(&self, name: &str) -> Result<()> {
        let mut modules = self.modules.write().unwrap_or_else(|e| e.into_inner());
        if modules.contains_key(name) {
            return Ok(());
        }
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| Error::validation("modules root directory is not set"))?;
        tracing::debug!(module = %name, "Registering directory module");
        modules.insert(
            name.to_string(),
            Arc::new(DirectoryModule::new(name, root.join(name))),
        );
        Ok(())
    }
}

impl ModuleManager for BasicModuleManager {
    fn set_modules_root_directory(&mut self, dir: &Path) -> Result<()> {
        if dir.as_os_str().is_empty() {
            return Err(Error::validation("modules root directory must not be empty"));
        }
        self.root = Some(dir.to_path_buf());
        Ok(())
    }

    fn set_request_listener(&mut self, listener: Arc<HttpListener>) -> Result<()> {
        listener.set_dispatcher(Arc::new(ModuleDispatcher {
            modules: self.modules.clone(),
        }));
        self.listener = Some(listener);
        Ok(())
    }

    fn add_route(&mut self, module: &str, controller: &str, action: &str, path: &str) -> Result<()> {
        let listener = self
            .listener
            .clone()
            .ok_or_else(|| Error::validation("request listener is not set"))?;
        self.ensure_module(module)?;
        listener.mount(path, RouteTarget::new(module, controller, action))?;
        Ok(())
    }

    fn modules(&self) -> BTreeMap<String, Arc<dyn Module>> {
        self.modules.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

struct ModuleDispatcher {
    modules: ModuleMap,
}

#[async_trait]
impl Dispatcher for ModuleDispatcher {
    async fn dispatch(&self, target: &RouteTarget, req: Request<Body>) -> Response {
        let module = self
            .modules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&target.module)
            .cloned();
        match module {
            Some(module) => module.handle(target, req).await,
            None => {
                tracing::warn!(module = %target.module, "Request routed to unknown module");
                (StatusCode::NOT_FOUND, "Unknown module").into_response()
            }
        }
    }
}

/// Module backed only by its directory; starting it checks the directory exists.
pub struct DirectoryModule {
    name: String,
    path: PathBuf,
}

impl DirectoryModule {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl Module for DirectoryModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn module_path(&self) -> &Path {
        &self.path
    }

    async fn run(&self) -> Result<()> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(Error::runtime(
                Subsystem::Modules,
                &self.name,
                format!("{} is not a directory", self.path.display()),
            )),
            Err(e) => Err(Error::runtime(
                Subsystem::Modules,
                &self.name,
                format!("{}: {e}", self.path.display()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[test]
    fn test_add_route_requires_listener_and_root() {
        let mut manager = BasicModuleManager::new();
        assert!(manager.add_route("index", "index", "index", "/").is_err());

        manager.set_request_listener(Arc::new(HttpListener::new())).unwrap();
        assert!(manager.add_route("index", "index", "index", "/").is_err());

        manager.set_modules_root_directory(Path::new("/srv/app/modules")).unwrap();
        manager.add_route("index", "index", "index", "/").unwrap();
        let modules = manager.modules();
        assert_eq!(modules["index"].module_path(), Path::new("/srv/app/modules/index"));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut manager = BasicModuleManager::new();
        manager
            .register_module(Arc::new(DirectoryModule::new("blog", "/tmp/blog")))
            .unwrap();
        let err = manager
            .register_module(Arc::new(DirectoryModule::new("blog", "/tmp/other")))
            .unwrap_err();
        assert!(matches!(err, Error::Plugin(PluginError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_directory_module_run() {
        let dir = tempfile::tempdir().unwrap();
        let present = DirectoryModule::new("present", dir.path());
        present.run().await.unwrap();

        let absent = DirectoryModule::new("absent", dir.path().join("absent"));
        let err = absent.run().await.unwrap_err();
        assert!(matches!(err, Error::Runtime { subsystem: Subsystem::Modules, .. }));
    }

    #[tokio::test]
    async fn test_dispatch_reaches_module() {
        let listener = Arc::new(HttpListener::new());
        let mut manager = BasicModuleManager::new();
        manager.set_modules_root_directory(Path::new("/srv/modules")).unwrap();
        manager.set_request_listener(listener.clone()).unwrap();
        manager.add_route("blog", "posts", "list", "/posts").unwrap();

        // the default handler answers 501 and names the target
        let response = listener
            .into_router()
            .oneshot(Request::get("/posts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"blog: no handler for posts/list");
    }
}

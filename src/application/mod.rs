//! Application orchestrator.
//!
//! # Responsibilities
//! - Own every subsystem and its lifecycle state
//! - `init`: resolve configuration, compile routes, configure managers
//! - `run`: start subsystems as a barrier-separated pipeline
//! - Publish the resolved configuration, paths and routes
//!
//! # Data Flow
//! ```text
//! ApplicationBuilder ──build──▶ Application (shared as Arc, &self methods)
//!     init.rs   init() → init_core → init_db_manager → init_logger_manager
//!                      → init_helper_manager → init_module_manager → init_server
//!     run.rs    run()  → db-connect ▶ run-loggers ▶ run-modules ▶ run-server
//! ```
//!
//! # Design Decisions
//! - State guards run before any work and reject synchronously
//! - Resolved data is published through `arc-swap` and never mutated
//! - Locks are never held across an await, except the server's own async mutex

mod init;
mod run;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwapOption;
use serde_json::{Map, Value};

use crate::config::paths::PathConfig;
use crate::error::{Result, StateError};
use crate::http::listener::HttpListener;
use crate::http::server::Server;
use crate::lifecycle::{ConsoleReporter, Hooks, LifecycleObserver, StatusBoard, StatusSet, Subsystem, SubsystemState};
use crate::plugins::PluginRegistry;
use crate::resource::{self, ResourceResolver};
use crate::routing::middleware::{Middleware, MiddlewareChain};
use crate::routing::route::RouteTable;
use crate::Error;

/// Environment variable overriding the configured server port.
pub const PORT_ENV_VAR: &str = "PORT";

/// Builder for [`Application`].
pub struct ApplicationBuilder {
    config_path: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    env: Option<String>,
    port_override: Option<String>,
    plugins: PluginRegistry,
    observers: Vec<Arc<dyn LifecycleObserver>>,
    quiet: bool,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            config_path: None,
            base_dir: None,
            env: None,
            port_override: std::env::var(PORT_ENV_VAR).ok().filter(|p| !p.is_empty()),
            plugins: PluginRegistry::new(),
            observers: Vec::new(),
            quiet: false,
        }
    }

    /// Explicit application configuration file.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Directory probed for `app/config/config.{json,toml}` (default: working directory).
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Active environment (default: `SWIFT_ENV`, then `development`).
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    /// Port overriding the configured one; `None` disables the `PORT` override.
    pub fn port_override(mut self, port: Option<String>) -> Self {
        self.port_override = port;
        self
    }

    /// Managers the application drives.
    pub fn plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Add an observer of lifecycle events.
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Suppress console progress output.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Idle application; nothing is read until `init`.
    pub fn build(self) -> Application {
        let mut hooks = Hooks::new();
        hooks.push(Arc::new(ConsoleReporter::new(self.quiet)));
        for observer in self.observers {
            hooks.push(observer);
        }

        Application {
            board: StatusBoard::new(),
            hooks,
            options: Options {
                config_path: self.config_path,
                base_dir: self.base_dir,
                env: self.env,
                port_override: self.port_override,
            },
            plugins: Mutex::new(self.plugins),
            config: ArcSwapOption::empty(),
            paths: ArcSwapOption::empty(),
            routes: ArcSwapOption::empty(),
            listener: ArcSwapOption::empty(),
            server: tokio::sync::Mutex::new(Server::new()),
            server_addr: ArcSwapOption::empty(),
            middleware: Mutex::new(MiddlewareChain::new()),
            init_errors: Mutex::new(Vec::new()),
        }
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Options {
    config_path: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    env: Option<String>,
    port_override: Option<String>,
}

/// Owns the subsystems and drives them through `init`, `run` and `stop`.
///
/// Every method takes `&self`; share the application as an `Arc`.
pub struct Application {
    board: StatusBoard,
    hooks: Hooks,
    options: Options,
    plugins: Mutex<PluginRegistry>,
    config: ArcSwapOption<Value>,
    paths: ArcSwapOption<PathConfig>,
    routes: ArcSwapOption<RouteTable>,
    listener: ArcSwapOption<HttpListener>,
    server: tokio::sync::Mutex<Server>,
    server_addr: ArcSwapOption<SocketAddr>,
    middleware: Mutex<MiddlewareChain>,
    init_errors: Mutex<Vec<Error>>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Current state of one subsystem.
    pub fn state(&self, subsystem: Subsystem) -> SubsystemState {
        self.board.state(subsystem)
    }

    /// Snapshot of every subsystem's state.
    pub fn status(&self) -> StatusSet {
        self.board.snapshot()
    }

    /// Resolved configuration, once core is initialized.
    pub fn config(&self) -> Option<Arc<Value>> {
        self.config.load_full()
    }

    /// Compiled route table, once core is initialized.
    pub fn routes(&self) -> Option<Arc<RouteTable>> {
        self.routes.load_full()
    }

    /// Resolved project paths, once core is initialized.
    pub fn paths(&self) -> Option<Arc<PathConfig>> {
        self.paths.load_full()
    }

    /// Request listener, once core is initialized.
    pub fn listener(&self) -> Option<Arc<HttpListener>> {
        self.listener.load_full()
    }

    /// Address the server is listening on, while running.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr.load_full().map(|addr| *addr)
    }

    /// Errors collected by the last `init`.
    pub fn init_errors(&self) -> Vec<Error> {
        lock(&self.init_errors).clone()
    }

    /// Inspect the registered managers.
    pub fn with_plugins<R>(&self, f: impl FnOnce(&PluginRegistry) -> R) -> R {
        f(&lock(&self.plugins))
    }

    /// Append a request middleware; takes effect when the server starts.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        lock(&self.middleware).use_middleware(middleware);
    }

    /// Gracefully stop the HTTP server.
    pub async fn stop(&self) -> Result<()> {
        let mut server = self.server.lock().await;
        server.stop().await?;
        self.server_addr.store(None);
        Ok(())
    }

    /// Load a project resource (see [`crate::resource`]).
    pub async fn require(&self, path: &str) -> Result<Value> {
        self.resolver()?.load(path).await
    }

    /// Blocking form of [`require`](Self::require).
    pub fn require_sync(&self, path: &str) -> Result<Value> {
        self.resolver()?.load_sync(path)
    }

    /// Load a resource and overlay `params` on it; `params` win.
    pub async fn require_with(&self, path: &str, params: Map<String, Value>) -> Result<Value> {
        let document = self.require(path).await?;
        resource::overlay(document, params)
    }

    fn resolver(&self) -> Result<ResourceResolver> {
        let paths = self.paths().ok_or(StateError::CoreNotInitialized)?;
        Ok(ResourceResolver::new(paths.as_ref().clone()))
    }

    fn plugins(&self) -> MutexGuard<'_, PluginRegistry> {
        lock(&self.plugins)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("status", &self.board.snapshot())
            .field("options", &self.options)
            .field("hooks", &self.hooks)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

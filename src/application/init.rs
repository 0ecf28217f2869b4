//! Initialization phases.
//!
//! Every phase follows the same protocol: claim the subsystem
//! (`Idle → Initializing`), wait for core if it is still in flight, do the
//! work, settle the state and notify observers. Optional managers that are
//! not registered, or not configured, settle as `Initialized` with a
//! skipped outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::application::Application;
use crate::config::configurator::Configurator;
use crate::config::loader::{self, CONFIG_CANDIDATES, ROUTES_CANDIDATES};
use crate::config::paths::PathConfig;
use crate::config::schema::{self, AdapterSettings, LoggerSettings, SwiftSettings};
use crate::error::{ConfigError, Error, Result, StateError};
use crate::http::listener::{
    HttpListener, OPTION_ENDSLASH, OPTION_PORT, OPTION_REQUEST_TIMEOUT, OPTION_VIEWS,
};
use crate::lifecycle::{LifecycleEvent, Outcome, Subsystem, SubsystemState};
use crate::plugins::db::ConnectionParams;
use crate::plugins::helpers::URL_HELPER;
use crate::plugins::logger::resolve_log_path;
use crate::routing::router::Router;

const DEFAULT_IP: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "3333";

/// Directory probed for the application configuration, under the base dir.
const APP_CONFIG_DIR: &str = "app/config";

/// Phases that need core, in the order `init` runs them.
const DEPENDENT_PHASES: [Subsystem; 5] = [
    Subsystem::Db,
    Subsystem::Loggers,
    Subsystem::Helpers,
    Subsystem::Modules,
    Subsystem::Server,
];

impl Application {
    /// Initialize every subsystem in dependency order.
    ///
    /// The application ends up `Initialized` even when phases fail; the
    /// failures are returned and stay available through
    /// [`init_errors`](Application::init_errors), and `run` refuses to start.
    pub async fn init(&self) -> Result<()> {
        self.board.begin_init(Subsystem::App)?;
        self.hooks.emit(LifecycleEvent::BeforeInit);
        tracing::info!("Initializing application");

        let mut errors = Vec::new();
        match self.ensure_phase(Subsystem::Core).await {
            Ok(()) => {
                for subsystem in DEPENDENT_PHASES {
                    if let Err(e) = self.ensure_phase(subsystem).await {
                        errors.push(e);
                    }
                }
            }
            Err(e) => errors.push(e),
        }

        *super::lock(&self.init_errors) = errors.clone();
        self.board.finish(Subsystem::App, true)?;
        self.hooks.emit(LifecycleEvent::AfterInit {
            errors: errors.len(),
        });

        if errors.is_empty() {
            tracing::info!("Application initialized");
        } else {
            tracing::warn!(errors = errors.len(), "Application initialized with errors");
        }
        Error::from_many(errors)
    }

    /// Resolve configuration and paths, create the HTTP listener, compile routes.
    pub async fn init_core(&self) -> Result<()> {
        self.board.begin_init(Subsystem::Core)?;
        let result = self.configure_core().await.map(|()| Outcome::Done);
        self.leave_phase(Subsystem::Core, result)
    }

    /// Create adapters and their connections from `swift.dbManager.adapters`.
    pub async fn init_db_manager(&self) -> Result<()> {
        self.enter_phase(Subsystem::Db).await?;
        let result = self.configure_db_manager();
        self.leave_phase(Subsystem::Db, result)
    }

    /// Create loggers from `swift.loggerManager.loggers`.
    pub async fn init_logger_manager(&self) -> Result<()> {
        self.enter_phase(Subsystem::Loggers).await?;
        let result = self.configure_logger_manager();
        self.leave_phase(Subsystem::Loggers, result)
    }

    /// Hand the compiled route table to the `url` helper.
    pub async fn init_helper_manager(&self) -> Result<()> {
        self.enter_phase(Subsystem::Helpers).await?;
        let result = self.configure_helper_manager();
        self.leave_phase(Subsystem::Helpers, result)
    }

    /// Point the module manager at the modules directory and register every route.
    pub async fn init_module_manager(&self) -> Result<()> {
        self.enter_phase(Subsystem::Modules).await?;
        let result = self.configure_module_manager();
        self.leave_phase(Subsystem::Modules, result)
    }

    /// Bind listener, ip and port onto the server. No socket is opened.
    pub async fn init_server(&self) -> Result<()> {
        self.enter_phase(Subsystem::Server).await?;
        let result = self.configure_server().await;
        self.leave_phase(Subsystem::Server, result)
    }

    /// Run the init phase of `subsystem` unless it already ran on its own.
    ///
    /// A phase in flight is waited on; one that already succeeded counts as done.
    async fn ensure_phase(&self, subsystem: Subsystem) -> Result<()> {
        match self.board.wait_settled(subsystem).await {
            SubsystemState::Idle => {}
            state if state.is_initialized() => return Ok(()),
            _ => return Err(StateError::Failed(subsystem).into()),
        }
        match subsystem {
            Subsystem::Core => self.init_core().await,
            Subsystem::Db => self.init_db_manager().await,
            Subsystem::Loggers => self.init_logger_manager().await,
            Subsystem::Helpers => self.init_helper_manager().await,
            Subsystem::Modules => self.init_module_manager().await,
            Subsystem::Server => self.init_server().await,
            Subsystem::App => Err(StateError::AlreadyInitializing(subsystem).into()),
        }
    }

    /// Wait for core, then claim `subsystem`.
    ///
    /// Rejections leave `subsystem` untouched.
    async fn enter_phase(&self, subsystem: Subsystem) -> Result<()> {
        self.board.check_init(subsystem)?;
        let core = self.board.wait_settled(Subsystem::Core).await;
        if !core.is_initialized() {
            return Err(StateError::CoreNotInitialized.into());
        }
        self.board.begin_init(subsystem)?;
        Ok(())
    }

    fn leave_phase(&self, subsystem: Subsystem, result: Result<Outcome>) -> Result<()> {
        let (outcome, returned) = match result {
            Ok(outcome) => (outcome, Ok(())),
            Err(e) => (Outcome::Failed(e.to_string()), Err(e)),
        };
        self.board.finish(subsystem, !outcome.is_failed())?;

        match &outcome {
            Outcome::Done => tracing::info!(subsystem = %subsystem, "Subsystem initialized"),
            Outcome::Skipped(reason) => {
                tracing::info!(subsystem = %subsystem, reason = %reason, "Subsystem skipped")
            }
            Outcome::Failed(cause) => {
                tracing::error!(subsystem = %subsystem, error = %cause, "Subsystem initialization failed")
            }
        }
        self.hooks.emit(LifecycleEvent::PhaseFinished { subsystem, outcome });
        returned
    }

    fn locate_config(&self) -> Result<PathBuf> {
        if let Some(path) = &self.options.config_path {
            if !path.is_file() {
                return Err(ConfigError::NotFound {
                    candidates: vec![path.clone()],
                }
                .into());
            }
            return Ok(path.clone());
        }
        let base = match &self.options.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| ConfigError::Io {
                path: PathBuf::from("."),
                source: Arc::new(e),
            })?,
        };
        Ok(loader::locate(&base.join(APP_CONFIG_DIR), &CONFIG_CANDIDATES)?)
    }

    async fn configure_core(&self) -> Result<()> {
        let config_path = self.locate_config()?;
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        tracing::debug!(path = %config_path.display(), "Loading configuration");

        let app_config = loader::load_document_async(&config_path).await?;
        let system_defaults = loader::system_defaults()?;

        let mut configurator = match &self.options.env {
            Some(env) => Configurator::with_env(env.clone()),
            None => Configurator::new(),
        };
        let defaults = configurator.extend(&system_defaults)?;
        configurator.compile(&app_config)?.complete_with(&defaults);
        tracing::debug!(env = %configurator.env(), "Configuration resolved");

        let mut config = configurator.into_config();
        ensure_server_defaults(&mut config);

        let paths = PathConfig::resolve(config.get("path").and_then(Value::as_object), &config_dir);
        paths.write_into(&mut config);
        let settings = SwiftSettings::from_config(&config)?;

        let listener = HttpListener::new();
        let port = self
            .options
            .port_override
            .clone()
            .unwrap_or_else(|| settings.server.port.to_string());
        listener.set_option(OPTION_PORT, Value::String(port));
        listener.set_option(OPTION_VIEWS, Value::String(paths.views().display().to_string()));
        listener.set_option(OPTION_ENDSLASH, Value::Bool(settings.router.endslash));
        listener.set_option(OPTION_REQUEST_TIMEOUT, json!(settings.server.request_timeout_secs));

        let routes_file = loader::locate(&paths.routes, &ROUTES_CANDIDATES)?;
        let routes_tree = loader::load_document_async(&routes_file).await?;
        let mut router = Router::new();
        router.set_path_to_require_routes_dir(routes_file.parent().unwrap_or(&paths.routes))?;
        router.compile(&routes_tree)?;
        let routes = router.into_routes();
        tracing::info!(routes = routes.len(), file = %routes_file.display(), "Routes compiled");

        self.config.store(Some(Arc::new(Value::Object(config))));
        self.paths.store(Some(Arc::new(paths)));
        self.routes.store(Some(Arc::new(routes)));
        self.listener.store(Some(Arc::new(listener)));
        Ok(())
    }

    fn configure_db_manager(&self) -> Result<Outcome> {
        let mut plugins = self.plugins();
        let Some(manager) = plugins.db_manager.as_mut() else {
            return Ok(Outcome::Skipped("not installed".to_string()));
        };
        let config = self.config().ok_or(StateError::CoreNotInitialized)?;
        let Some(adapters) = schema::section(&config, "/swift/dbManager/adapters") else {
            return Ok(Outcome::Skipped("not configured".to_string()));
        };

        let mut errors = Vec::new();
        for (name, parsed) in schema::entries::<AdapterSettings>(adapters, "swift.dbManager.adapters") {
            let settings = match parsed {
                Ok(settings) => settings,
                Err(e) => {
                    errors.push(e.into());
                    continue;
                }
            };
            let kind = settings.kind.as_deref().unwrap_or(&name);
            let adapter = match manager.create_adapter(kind, &name) {
                Ok(adapter) => adapter,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            for (connection, value) in &settings.connections {
                let added = ConnectionParams::from_value(connection, value)
                    .map_err(Error::from)
                    .and_then(|params| adapter.add_connection_params(connection, params));
                if let Err(e) = added {
                    errors.push(e);
                }
            }
            tracing::debug!(adapter = %name, kind = %kind, connections = settings.connections.len(), "Adapter configured");
        }
        Error::from_many(errors).map(|()| Outcome::Done)
    }

    fn configure_logger_manager(&self) -> Result<Outcome> {
        let mut plugins = self.plugins();
        let Some(manager) = plugins.logger_manager.as_mut() else {
            return Ok(Outcome::Skipped("not installed".to_string()));
        };
        let config = self.config().ok_or(StateError::CoreNotInitialized)?;
        let paths = self.paths().ok_or(StateError::CoreNotInitialized)?;
        let Some(loggers) = schema::section(&config, "/swift/loggerManager/loggers") else {
            return Ok(Outcome::Skipped("not configured".to_string()));
        };

        let mut errors = Vec::new();
        for (name, parsed) in schema::entries::<LoggerSettings>(loggers, "swift.loggerManager.loggers") {
            let configured = parsed.map_err(Error::from).and_then(|settings| {
                let logger = manager.create_logger(&name)?;
                if let Some(path) = &settings.path {
                    logger.set_path_to_log(resolve_log_path(path, &paths.project));
                }
                if let Some(encoding) = &settings.encoding {
                    logger.set_encoding(encoding)?;
                }
                if settings.disabled {
                    logger.disable();
                }
                Ok(())
            });
            if let Err(e) = configured {
                errors.push(e);
            }
        }
        Error::from_many(errors).map(|()| Outcome::Done)
    }

    fn configure_helper_manager(&self) -> Result<Outcome> {
        let plugins = self.plugins();
        let Some(manager) = plugins.helper_manager.as_ref() else {
            return Ok(Outcome::Skipped("not installed".to_string()));
        };
        let routes = self.routes().ok_or(StateError::CoreNotInitialized)?;
        match manager.helper(URL_HELPER) {
            Some(url) => url.set_routes(routes)?,
            None => tracing::debug!("Helper manager has no url helper"),
        }
        Ok(Outcome::Done)
    }

    fn configure_module_manager(&self) -> Result<Outcome> {
        let paths = self.paths().ok_or(StateError::CoreNotInitialized)?;
        let listener = self.listener().ok_or(StateError::CoreNotInitialized)?;
        let routes = self.routes().ok_or(StateError::CoreNotInitialized)?;

        let mut plugins = self.plugins();
        let manager = plugins.module_manager.as_mut();
        manager.set_modules_root_directory(&paths.modules)?;
        manager.set_request_listener(listener)?;

        let mut errors = Vec::new();
        for (alias, route) in routes.iter() {
            if let Err(e) = manager.add_route(&route.module, &route.controller, &route.action, &route.path) {
                tracing::warn!(alias = %alias, error = %e, "Route not registered");
                errors.push(e);
            }
        }
        Error::from_many(errors).map(|()| Outcome::Done)
    }

    async fn configure_server(&self) -> Result<Outcome> {
        let config = self.config().ok_or(StateError::CoreNotInitialized)?;
        let listener = self.listener().ok_or(StateError::CoreNotInitialized)?;
        let settings = SwiftSettings::from_config(config.as_object().unwrap_or(&Map::new()))?;
        let port = match listener.option(OPTION_PORT) {
            Some(Value::String(port)) => port,
            Some(other) => other.to_string(),
            None => DEFAULT_PORT.to_string(),
        };

        let mut server = self.server.lock().await;
        server.set_request_listener(listener);
        server.set_ip(&settings.server.ip)?;
        server.set_port(&port)?;
        tracing::debug!(ip = %server.ip(), port = server.port(), "Server configured");
        Ok(Outcome::Done)
    }
}

/// `swift.server.ip` and `swift.server.port` are always present after init;
/// `null` and blank strings count as absent.
fn ensure_server_defaults(config: &mut Map<String, Value>) {
    let swift = config
        .entry("swift")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(swift) = swift.as_object_mut() else {
        return;
    };
    let server = swift
        .entry("server")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(server) = server.as_object_mut() else {
        return;
    };
    for (key, default) in [("ip", DEFAULT_IP), ("port", DEFAULT_PORT)] {
        let blank = match server.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if blank {
            server.insert(key.to_string(), Value::String(default.to_string()));
        }
    }
}

//! Collaborator contracts and the capability registry.
//!
//! # Data Flow
//! ```text
//! PluginRegistry (built by the embedding program)
//!     module manager   required, defaults to BasicModuleManager
//!     db manager       optional → init_db_manager / db-connect stage
//!     logger manager   optional → init_logger_manager / run-loggers stage
//!     helper manager   optional → init_helper_manager (url helper gets routes)
//! ```
//!
//! # Design Decisions
//! - Optional subsystems are present only when explicitly registered
//! - Managers are mutated during init only; the objects they hand out
//!   (adapters, loggers, modules) are `Arc`s used concurrently by `run`

pub mod db;
pub mod helpers;
pub mod logger;
pub mod modules;

pub use db::{ConnectionParams, DbAdapter, DbManager};
pub use helpers::{DefaultHelperManager, Helper, HelperManager, UrlHelper};
pub use logger::{FileLogger, FileLoggerManager, Logger, LoggerManager};
pub use modules::{BasicModuleManager, DirectoryModule, Module, ModuleManager};

/// Registered managers.
pub struct PluginRegistry {
    pub(crate) module_manager: Box<dyn ModuleManager>,
    pub(crate) db_manager: Option<Box<dyn DbManager>>,
    pub(crate) logger_manager: Option<Box<dyn LoggerManager>>,
    pub(crate) helper_manager: Option<Box<dyn HelperManager>>,
}

impl PluginRegistry {
    /// Registry with only the default module manager.
    pub fn new() -> Self {
        Self {
            module_manager: Box::new(BasicModuleManager::new()),
            db_manager: None,
            logger_manager: None,
            helper_manager: None,
        }
    }

    /// Replace the default module manager.
    pub fn with_module_manager(mut self, manager: impl ModuleManager + 'static) -> Self {
        self.module_manager = Box::new(manager);
        self
    }

    /// Install a database manager; without one the db phase is skipped.
    pub fn with_db_manager(mut self, manager: impl DbManager + 'static) -> Self {
        self.db_manager = Some(Box::new(manager));
        self
    }

    /// Install a logger manager; without one the logger phase is skipped.
    pub fn with_logger_manager(mut self, manager: impl LoggerManager + 'static) -> Self {
        self.logger_manager = Some(Box::new(manager));
        self
    }

    /// Install a helper manager.
    pub fn with_helper_manager(mut self, manager: impl HelperManager + 'static) -> Self {
        self.helper_manager = Some(Box::new(manager));
        self
    }

    /// Active module manager.
    pub fn module_manager(&self) -> &dyn ModuleManager {
        self.module_manager.as_ref()
    }

    pub fn db_manager(&self) -> Option<&dyn DbManager> {
        self.db_manager.as_deref()
    }

    pub fn logger_manager(&self) -> Option<&dyn LoggerManager> {
        self.logger_manager.as_deref()
    }

    pub fn helper_manager(&self) -> Option<&dyn HelperManager> {
        self.helper_manager.as_deref()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("db_manager", &self.db_manager.is_some())
            .field("logger_manager", &self.logger_manager.is_some())
            .field("helper_manager", &self.helper_manager.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let registry = PluginRegistry::new();
        assert!(registry.db_manager().is_none());
        assert!(registry.logger_manager().is_none());
        assert!(registry.helper_manager().is_none());
        assert!(registry.module_manager().modules().is_empty());

        let registry = registry
            .with_logger_manager(FileLoggerManager::new())
            .with_helper_manager(DefaultHelperManager::new());
        assert!(registry.logger_manager().is_some());
        assert!(registry.helper_manager().unwrap().helper("url").is_some());
    }
}

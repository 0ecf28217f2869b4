//! Logger manager contract and the built-in file logger.
//!
//! These are application loggers (access logs, audit trails) configured
//! under `swift.loggerManager.loggers`, separate from the crate's own
//! `tracing` diagnostics.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{Error, PluginError, Result};
use crate::lifecycle::state::Subsystem;

#[async_trait]
/// Named log destination, started during the logger stage.
pub trait Logger: Send + Sync {
    /// Name the logger was created under.
    fn name(&self) -> &str;

    /// File the logger writes to.
    fn set_path_to_log(&self, path: PathBuf);

    /// Configured log file, if any.
    fn path_to_log(&self) -> Option<PathBuf>;

    /// Output encoding; unknown encodings are rejected.
    fn set_encoding(&self, encoding: &str) -> Result<()>;

    /// Skip this logger when the logger stage runs.
    fn disable(&self);

    /// True once [`disable`](Self::disable) was called.
    fn is_disabled(&self) -> bool;

    /// Open the log destination.
    async fn run(&self) -> Result<()>;
}

/// Creates and owns [`Logger`]s.
pub trait LoggerManager: Send + Sync {
    /// Create and register a logger; fails if the name is taken.
    fn create_logger(&mut self, name: &str) -> Result<Arc<dyn Logger>>;

    /// Registered loggers, in creation order.
    fn loggers(&self) -> Vec<Arc<dyn Logger>>;

    /// Logger registered under `name`.
    fn logger(&self, name: &str) -> Option<Arc<dyn Logger>> {
        self.loggers().into_iter().find(|l| l.name() == name)
    }
}

/// Creates [`FileLogger`]s.
#[derive(Default)]
pub struct FileLoggerManager {
    loggers: IndexMap<String, Arc<FileLogger>>,
}

impl FileLoggerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed access, for writing.
    pub fn file_logger(&self, name: &str) -> Option<Arc<FileLogger>> {
        self.loggers.get(name).cloned()
    }
}

impl LoggerManager for FileLoggerManager {
    fn create_logger(&mut self, name: &str) -> Result<Arc<dyn Logger>> {
        if name.is_empty() {
            return Err(Error::validation("logger name must not be empty"));
        }
        if self.loggers.contains_key(name) {
            return Err(PluginError::Duplicate {
                manager: "logger",
                name: name.to_string(),
            }
            .into());
        }
        let logger = Arc::new(FileLogger::new(name));
        self.loggers.insert(name.to_string(), logger.clone());
        Ok(logger)
    }

    fn loggers(&self) -> Vec<Arc<dyn Logger>> {
        self.loggers
            .values()
            .map(|l| l.clone() as Arc<dyn Logger>)
            .collect()
    }
}

#[derive(Debug, Default)]
struct FileLoggerSettings {
    path: Option<PathBuf>,
    disabled: bool,
}

/// Appends lines to a file. Only UTF-8 output is supported.
#[derive(Debug)]
pub struct FileLogger {
    name: String,
    settings: Mutex<FileLoggerSettings>,
    file: tokio::sync::Mutex<Option<File>>,
}

impl FileLogger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Mutex::new(FileLoggerSettings::default()),
            file: tokio::sync::Mutex::new(None),
        }
    }

    fn settings(&self) -> MutexGuard<'_, FileLoggerSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append one line. Fails if the logger has not been started.
    pub async fn write_line(&self, line: &str) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }
        let mut file = self.file.lock().await;
        let file = file
            .as_mut()
            .ok_or_else(|| Error::runtime(Subsystem::Loggers, &self.name, "logger is not running"))?;
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        file.write_all(&bytes)
            .await
            .map_err(|e| Error::runtime(Subsystem::Loggers, &self.name, e))?;
        file.flush()
            .await
            .map_err(|e| Error::runtime(Subsystem::Loggers, &self.name, e))
    }
}

#[async_trait]
impl Logger for FileLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_path_to_log(&self, path: PathBuf) {
        self.settings().path = Some(path);
    }

    fn path_to_log(&self) -> Option<PathBuf> {
        self.settings().path.clone()
    }

    fn set_encoding(&self, encoding: &str) -> Result<()> {
        match encoding.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(()),
            _ => Err(PluginError::BadEncoding(encoding.to_string()).into()),
        }
    }

    fn disable(&self) {
        self.settings().disabled = true;
    }

    fn is_disabled(&self) -> bool {
        self.settings().disabled
    }

    async fn run(&self) -> Result<()> {
        let path = self
            .path_to_log()
            .ok_or_else(|| Error::runtime(Subsystem::Loggers, &self.name, "no log path configured"))?;
        let fail = |e: std::io::Error| {
            Error::runtime(Subsystem::Loggers, &self.name, format!("{}: {e}", path.display()))
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(fail)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(fail)?;

        *self.file.lock().await = Some(file);
        tracing::debug!(logger = %self.name, path = %path.display(), "Logger started");
        Ok(())
    }
}

/// Resolve a configured log path: `./x` and `../x` are relative to `project`.
pub fn resolve_log_path(raw: &str, project: &Path) -> PathBuf {
    crate::config::paths::resolve_relative(raw, project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_registration() {
        let mut manager = FileLoggerManager::new();
        manager.create_logger("access").unwrap();
        manager.create_logger("error").unwrap();
        assert!(manager.create_logger("access").is_err());
        assert!(manager.create_logger("").is_err());

        let names: Vec<String> = manager.loggers().iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names, ["access", "error"]);
        assert!(manager.logger("error").is_some());
    }

    #[test]
    fn test_encoding() {
        let logger = FileLogger::new("access");
        logger.set_encoding("UTF-8").unwrap();
        logger.set_encoding("utf8").unwrap();
        let err = logger.set_encoding("latin1").unwrap_err();
        assert!(matches!(err, Error::Plugin(PluginError::BadEncoding(_))));
    }

    #[test]
    fn test_resolve_log_path() {
        let project = Path::new("/srv/site");
        assert_eq!(resolve_log_path("./logs/a.log", project), PathBuf::from("/srv/site/logs/a.log"));
        assert_eq!(resolve_log_path("../logs/a.log", project), PathBuf::from("/srv/logs/a.log"));
        assert_eq!(resolve_log_path("/var/log/a.log", project), PathBuf::from("/var/log/a.log"));
    }

    #[tokio::test]
    async fn test_run_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("access.log");

        let logger = FileLogger::new("access");
        assert!(logger.run().await.is_err());
        assert!(logger.write_line("early").await.is_err());

        logger.set_path_to_log(path.clone());
        logger.run().await.unwrap();
        logger.write_line("GET /").await.unwrap();
        logger.write_line("GET /about").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "GET /\nGET /about\n");
    }
}

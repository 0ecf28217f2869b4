//! Error taxonomy.
//!
//! Each component owns a `thiserror` enum; [`Error`] wraps them together with
//! collaborator failures and aggregates. [`Error::kind`] classifies any error
//! into one of the five categories the orchestrator reasons about.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::lifecycle::state::{Subsystem, SubsystemState};

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad argument type or shape. Caller bug, never retryable.
    Validation,
    /// Operation invoked in the wrong lifecycle state.
    State,
    /// Malformed configuration or route source.
    Config,
    /// A required file could not be found or read.
    Resource,
    /// A collaborator (connection, logger, module, socket) failed at runtime.
    Runtime,
}

/// Configuration loading and merging errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("bad config: expected a mapping, got {0}")]
    BadConfig(&'static str),

    #[error("circular $extends chain through environment \"{0}\"")]
    ExtendsCycle(String),

    #[error("no file found among {}", display_paths(.candidates))]
    NotFound { candidates: Vec<PathBuf> },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("unsupported document format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::NotFound { .. } | ConfigError::Io { .. } => ErrorKind::Resource,
            _ => ErrorKind::Config,
        }
    }
}

/// Route table compilation errors.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    #[error("bad route alias: alias must be a non-empty string")]
    BadAlias,

    #[error("bad route \"{alias}\": {message}")]
    BadRoute { alias: String, message: String },

    #[error("bad routes: expected a mapping, got {0}")]
    BadRoutes(&'static str),

    #[error("bad $require directive: {0}")]
    BadRequire(String),

    #[error("bad path to the required routes directory")]
    BadRequireDir,

    #[error("route with alias \"{0}\" already exists")]
    RouteAlreadyExists(String),

    #[error("unsupported route fragment format: {}", .0.display())]
    UnsupportedFragment(PathBuf),

    #[error("failed to read route fragment {}: {source}", .path.display())]
    FragmentIo {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse route fragment {}: {message}", .path.display())]
    FragmentParse { path: PathBuf, message: String },
}

impl RouteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouteError::BadRequireDir => ErrorKind::Validation,
            RouteError::FragmentIo { .. } => ErrorKind::Resource,
            _ => ErrorKind::Config,
        }
    }
}

/// HTTP server errors.
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("bad ip \"{0}\"")]
    BadIp(String),

    #[error("bad port \"{0}\"")]
    BadPort(String),

    #[error("request listener is not set")]
    NoRequestListener,

    #[error("server is already running")]
    AlreadyRunning,

    #[error("server is not running")]
    NotRunning,

    #[error("failed to start server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("server terminated abnormally: {0}")]
    Serve(String),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::BadIp(_) | ServerError::BadPort(_) => ErrorKind::Validation,
            ServerError::NoRequestListener | ServerError::AlreadyRunning | ServerError::NotRunning => {
                ErrorKind::State
            }
            ServerError::Bind { .. } | ServerError::Serve(_) => ErrorKind::Runtime,
        }
    }
}

/// Collaborator (manager/plugin) configuration errors.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    #[error("unknown {manager} type \"{kind}\"")]
    UnknownType { manager: &'static str, kind: String },

    #[error("{manager} entry \"{name}\" already exists")]
    Duplicate { manager: &'static str, name: String },

    #[error("unsupported encoding \"{0}\"")]
    BadEncoding(String),

    #[error("bad connection parameters for \"{name}\": {message}")]
    BadConnectionParams { name: String, message: String },

    #[error("{0} does not support this operation")]
    Unsupported(String),
}

impl PluginError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Lifecycle ordering errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("{0} is already initialized")]
    AlreadyInitialized(Subsystem),

    #[error("{0} is already initializing")]
    AlreadyInitializing(Subsystem),

    #[error("{0} is already running")]
    AlreadyRunning(Subsystem),

    #[error("{0} is already starting")]
    AlreadyStarting(Subsystem),

    #[error("{0} is not initialized")]
    NotInitialized(Subsystem),

    #[error("{0} has failed")]
    Failed(Subsystem),

    #[error("core is not initialized")]
    CoreNotInitialized,

    #[error("application initialization finished with {0} error(s)")]
    InitFailed(usize),

    #[error("invalid transition of {subsystem} from {from} to {to}")]
    InvalidTransition {
        subsystem: Subsystem,
        from: SubsystemState,
        to: SubsystemState,
    },
}

/// Top-level error type.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("{subsystem} \"{name}\" failed: {message}")]
    Runtime {
        subsystem: Subsystem,
        name: String,
        message: String,
    },

    #[error("{}", display_aggregate(.0))]
    Aggregate(Vec<Error>),
}

impl Error {
    /// Shorthand for a collaborator failure.
    pub fn runtime(subsystem: Subsystem, name: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Runtime {
            subsystem,
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Collapse collected errors: none is success, one is itself, more is an aggregate.
    pub fn from_many(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate(errors)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(e) => e.kind(),
            Error::Route(e) => e.kind(),
            Error::Server(e) => e.kind(),
            Error::State(_) => ErrorKind::State,
            Error::Plugin(e) => e.kind(),
            Error::Validation(_) => ErrorKind::Validation,
            Error::Runtime { .. } => ErrorKind::Runtime,
            Error::Aggregate(errors) => errors.first().map_or(ErrorKind::Runtime, Error::kind),
        }
    }

    /// Flattened view over nested aggregates.
    pub fn leaves(&self) -> Vec<&Error> {
        match self {
            Error::Aggregate(errors) => errors.iter().flat_map(Error::leaves).collect(),
            other => vec![other],
        }
    }

    /// The first non-aggregate error.
    pub fn first(&self) -> &Error {
        match self {
            Error::Aggregate(errors) => errors.first().map_or(self, Error::first),
            other => other,
        }
    }

    pub fn as_state(&self) -> Option<&StateError> {
        match self.first() {
            Error::State(e) => Some(e),
            _ => None,
        }
    }
}

fn display_aggregate(errors: &[Error]) -> String {
    let parts: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} errors: {}", errors.len(), parts.join("; "))
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_many() {
        assert!(Error::from_many(vec![]).is_ok());

        let single = Error::from_many(vec![Error::validation("a")]).unwrap_err();
        assert!(matches!(single, Error::Validation(_)));

        let many = Error::from_many(vec![
            StateError::CoreNotInitialized.into(),
            Error::validation("b"),
        ])
        .unwrap_err();
        assert!(matches!(many, Error::Aggregate(ref v) if v.len() == 2));
        assert_eq!(many.kind(), ErrorKind::State);
        assert!(many.to_string().starts_with("2 errors: "));
    }

    #[test]
    fn test_kinds() {
        let not_found: Error = ConfigError::NotFound { candidates: vec![] }.into();
        assert_eq!(not_found.kind(), ErrorKind::Resource);

        let dup: Error = RouteError::RouteAlreadyExists("home".into()).into();
        assert_eq!(dup.kind(), ErrorKind::Config);

        let port: Error = ServerError::BadPort("x".into()).into();
        assert_eq!(port.kind(), ErrorKind::Validation);

        let conn = Error::runtime(Subsystem::Db, "main.primary", "refused");
        assert_eq!(conn.kind(), ErrorKind::Runtime);
        assert_eq!(conn.to_string(), "db \"main.primary\" failed: refused");
    }

    #[test]
    fn test_leaves_flatten_nested() {
        let nested = Error::Aggregate(vec![
            Error::Aggregate(vec![Error::validation("a"), Error::validation("b")]),
            Error::validation("c"),
        ]);
        assert_eq!(nested.leaves().len(), 3);
        assert!(matches!(nested.first(), Error::Validation(m) if m == "a"));
    }
}

//! Swift MVC application core.
//!
//! Bootstrap and lifecycle orchestration for an MVC web framework built on
//! Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!   init()                                         run()
//!   ──────                                         ─────
//!   core ─┬─ configurator (env merge, defaults)    db connect    (parallel)
//!         ├─ paths (relative resolution)              │ barrier
//!         ├─ http listener (port, views)           loggers       (parallel)
//!         └─ router (route tree + $require)           │ barrier
//!   db manager        (optional)                   modules       (parallel)
//!   logger manager    (optional)                      │ barrier
//!   helper manager    (optional)                   server        (socket bind)
//!   module manager
//!   server            (ip/port binding)
//! ```
//!
//! Every subsystem carries an explicit lifecycle state (see
//! [`lifecycle::state`]); transitions are validated centrally and callers
//! that hit a transient state wait for it to settle instead of re-entering.

pub mod application;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod plugins;
pub mod resource;
pub mod routing;

pub use application::{Application, ApplicationBuilder};
pub use error::{Error, ErrorKind, Result};
pub use lifecycle::state::{Subsystem, SubsystemState};
pub use plugins::PluginRegistry;

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! init (application::init):
//!     core → db manager → logger manager → helper manager → module manager → server
//!
//! run (application::run):
//!     db connect ─▶ loggers ─▶ modules ─▶ server
//!     (each arrow is a barrier; a failed stage aborts the pipeline)
//!
//! state.rs    per-subsystem state machine + async waiting
//! hooks.rs    ordered observers invoked at phase/stage boundaries
//! reporter.rs console progress output (quiet mode)
//! shutdown.rs graceful server stop
//! ```
//!
//! # Design Decisions
//! - One explicit state per subsystem, transitions validated centrally
//! - Waiting on an in-flight phase re-validates its outcome afterwards
//! - No cancellation: launched tasks always run to completion

pub mod hooks;
pub mod reporter;
pub mod shutdown;
pub mod state;

pub use hooks::{Hooks, LifecycleEvent, LifecycleObserver, Outcome, Stage};
pub use reporter::ConsoleReporter;
pub use shutdown::Shutdown;
pub use state::{StatusBoard, StatusSet, Subsystem, SubsystemState};

//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! module manager ──mount(path, target)──▶ listener.rs (options, mounts, dispatcher)
//!                                              │ into_router()
//!                                              ▼
//! TCP socket ──▶ server.rs (axum::serve) ──▶ TraceLayer → Timeout → middleware chain
//!                                              → dispatcher (module manager)
//! ```

pub mod listener;
pub mod server;

pub use listener::{Dispatcher, HttpListener, Mount, RouteTarget};
pub use server::Server;

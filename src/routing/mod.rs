//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (during init):
//!     routes.json / routes.toml
//!     → router.rs (walk tree, inline $require fragments)
//!     → route.rs (descriptor → Route, defaults to index/index/index)
//!     → RouteTable (alias → Route, insertion ordered)
//!     → module manager (mounts each route on the HTTP listener)
//!
//! Request (at runtime):
//!     → middleware.rs (chain in registration order, optional endslash)
//!     → module dispatch
//! ```
//!
//! # Design Decisions
//! - Routes compiled during init, immutable afterwards
//! - Aliases are unique; duplicates are an error, never an override

pub mod middleware;
pub mod route;
pub mod router;

pub use middleware::{Endslash, Flow, FnMiddleware, Middleware, MiddlewareChain};
pub use route::{Route, RouteTable};
pub use router::Router;

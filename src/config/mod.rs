//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! app config file (JSON/TOML)          embedded defaults.json
//!     → loader.rs (locate & parse)         → loader.rs
//!     → configurator.rs compile            → configurator.rs extend
//!                 └──────── complete ◄──────────┘
//!     → paths.rs (resolve project layout, written back under `path`)
//!     → schema.rs (typed views of the swift.* sections)
//!     → Arc<Value> (immutable, shared with every subsystem)
//! ```
//!
//! # Design Decisions
//! - Merging happens on untyped trees; typing happens afterwards
//! - First write wins everywhere: the most specific source always prevails
//! - Config is immutable once resolved; a new init builds a new tree

pub mod configurator;
pub mod loader;
pub mod paths;
pub mod schema;

pub use configurator::Configurator;
pub use paths::PathConfig;
pub use schema::{ServerSettings, SwiftSettings};

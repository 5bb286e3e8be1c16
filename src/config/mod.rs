//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs::validate_config (semantic checks)
//!     → ConnectorConfig (desired state)
//!     → orchestrator, which gates on validation.rs::validate
//!
//! On change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → sent to the dispatcher as a ConfigChanged trigger
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so partial files load; mandatory options are
//!   enforced per storage type at reconcile time, where they can block
//! - A file that fails to load never replaces the current configuration

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{ConnectorConfig, ObservabilityConfig, PathsConfig, StorageType};
pub use validation::{validate, ValidationError};

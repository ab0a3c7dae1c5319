//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → GateConfig::build_options() → BindOptions → SniServer::bind
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a rebind
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{GateConfig, HostConfig, ListenerConfig, TlsSettings};

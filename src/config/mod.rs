//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!     → handed to the agent, server, client and tracer at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → inbound probe swaps in the new filter set
//! ```
//!
//! # Design Decisions
//! - Only probe filters are hot-reloaded; everything else needs a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::AgentConfig;
pub use schema::ClientConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProbesConfig;
pub use schema::ServerConfig;
pub use schema::TracerConfig;
pub use schema::UrlFilter;
pub use watcher::ConfigWatcher;

//! Distributed-tracing probes for an in-process HTTP client and server

pub mod agent;
pub mod aspect;
pub mod config;
pub mod context;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod probes;
pub mod trace;

pub use agent::Agent;
pub use config::schema::AgentConfig;
pub use http::{HttpClient, HttpServer};
pub use lifecycle::Shutdown;

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the tracing agent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Service name reported on every span.
    pub service_name: String,

    /// Instrumented HTTP server settings.
    pub server: ServerConfig,

    /// Instrumented HTTP client settings.
    pub client: ClientConfig,

    /// Which probes to attach and how.
    pub probes: ProbesConfig,

    /// Reference tracer settings.
    pub tracer: TracerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service_name: "span-probes".to_string(),
            server: ServerConfig::default(),
            client: ClientConfig::default(),
            probes: ProbesConfig::default(),
            tracer: TracerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// Time a request listener has to end its response, in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body buffered for listeners, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Maximum response body buffered, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Probe selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbesConfig {
    /// Trace requests received by the server.
    pub inbound: bool,

    /// Trace requests sent by the client.
    pub outbound: bool,

    /// Inbound path filters, first match wins.
    pub filters: Vec<UrlFilter>,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            inbound: true,
            outbound: true,
            filters: Vec::new(),
        }
    }
}

/// Renames inbound paths starting with `pattern` to `to`.
/// An empty `to` stops those paths from being traced.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UrlFilter {
    /// Path prefix to match.
    pub pattern: String,

    /// Replacement span path; empty = do not trace.
    #[serde(default)]
    pub to: String,
}

/// Reference tracer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Sampling decision for new root spans.
    pub sampled: bool,

    /// Finished spans kept in memory before the oldest are dropped.
    pub max_finished_spans: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            sampled: true,
            max_finished_spans: 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

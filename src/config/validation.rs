//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check filter shapes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AgentConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::AgentConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service_name.trim().is_empty() {
        errors.push(ValidationError::new("service_name", "must not be empty"));
    }

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be > 0"));
    }
    if config.client.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("client.connect_timeout_secs", "must be > 0"));
    }
    if config.client.max_body_bytes == 0 {
        errors.push(ValidationError::new("client.max_body_bytes", "must be > 0"));
    }

    for (i, filter) in config.probes.filters.iter().enumerate() {
        if !filter.pattern.starts_with('/') {
            errors.push(ValidationError::new(
                format!("probes.filters[{}].pattern", i),
                "must start with '/'",
            ));
        }
        if !filter.to.is_empty() && !filter.to.starts_with('/') {
            errors.push(ValidationError::new(
                format!("probes.filters[{}].to", i),
                "must be empty or start with '/'",
            ));
        }
    }

    if config.tracer.max_finished_spans == 0 {
        errors.push(ValidationError::new("tracer.max_finished_spans", "must be > 0"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::UrlFilter;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&AgentConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = AgentConfig::default();
        config.service_name = " ".into();
        config.server.bind_address = "nowhere".into();
        config.server.request_timeout_secs = 0;
        config.probes.filters.push(UrlFilter {
            pattern: "health".into(),
            to: "x".into(),
        });
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "service_name",
                "server.bind_address",
                "server.request_timeout_secs",
                "probes.filters[0].pattern",
                "probes.filters[0].to",
                "observability.log_level",
            ]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = AgentConfig::default();
        config.observability.metrics_address = "bad".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}

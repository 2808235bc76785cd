//! Configuration validation logic.

use crate::config::schema::ProxyConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ProxyConfig for semantic correctness.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.cache.max_entries == 0 {
        errors.push(ValidationError(
            "cache.max_entries must be > 0".to_string(),
        ));
    }

    if config.listener.backlog == 0 {
        errors.push(ValidationError("listener.backlog must be > 0".to_string()));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError(
            "listener.max_connections must be > 0".to_string(),
        ));
    }

    if config.log.path.as_os_str().is_empty() {
        errors.push(ValidationError("log.path must not be empty".to_string()));
    }

    // Zero timeouts are technically valid but almost certainly a mistake
    if config.timeouts.origin_recv_secs == 0 || config.timeouts.client_recv_secs == 0 {
        tracing::warn!("Receive timeouts are set to 0, reads will give up immediately");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

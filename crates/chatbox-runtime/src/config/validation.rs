//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ChatboxConfig, ConnectionConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
///
/// The token is not checked here; it is resolved when connecting so that
/// `--check` can report it separately.
pub fn validate_config(config: &ChatboxConfig) -> ConfigResult<()> {
    validate_connection_config(&config.connection)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates connection settings.
fn validate_connection_config(connection: &ConnectionConfig) -> ConfigResult<()> {
    validate_url(&connection.endpoint)?;

    for (field, value) in [
        ("connection.receive_timeout_ms", connection.receive_timeout_ms),
        ("connection.reconnect_delay_ms", connection.reconnect_delay_ms),
        (
            "connection.handshake_timeout_ms",
            connection.handshake_timeout_ms,
        ),
    ] {
        if value == 0 {
            return Err(ConfigError::validation(format!(
                "{field} must be greater than 0"
            )));
        }
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter module: {module:?}"
            )));
        }
    }

    Ok(())
}

/// Validates a websocket endpoint.
fn validate_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("connection.endpoint"));
    }

    let valid_schemes = ["ws://", "wss://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = ChatboxConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_endpoint_scheme() {
        let mut config = ChatboxConfig::default();
        config.connection.endpoint = "https://chat.sc3.io/v2/".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        config.connection.endpoint = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_zero_durations() {
        let mut config = ChatboxConfig::default();
        config.connection.reconnect_delay_ms = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = ChatboxConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("chatbox.log".into());
        assert!(validate_config(&config).is_ok());
    }
}

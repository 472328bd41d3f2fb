//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{FerryConfig, LogOutput, LoggingConfig, ManagerConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &FerryConfig) -> ConfigResult<()> {
    validate_manager(&config.manager)?;
    validate_logging(&config.logging)?;

    if config.adapters.keys().any(|name| name.trim().is_empty()) {
        return Err(ConfigError::invalid("adapters", "section names cannot be empty"));
    }
    Ok(())
}

fn validate_manager(manager: &ManagerConfig) -> ConfigResult<()> {
    if manager.adapter_queue_capacity == 0 {
        return Err(ConfigError::invalid("manager.adapter_queue_capacity", "must be at least 1"));
    }
    if manager.command_queue_capacity == 0 {
        return Err(ConfigError::invalid("manager.command_queue_capacity", "must be at least 1"));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::required("logging.file_path", "logging.output is \"file\""));
    }
    if logging.filters.keys().any(|target| target.contains(char::is_whitespace)) {
        return Err(ConfigError::invalid("logging.filters", "targets cannot contain whitespace"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&FerryConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = FerryConfig::default();
        config.manager.adapter_queue_capacity = 0;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.key(), Some("manager.adapter_queue_capacity"));

        let mut config = FerryConfig::default();
        config.manager.command_queue_capacity = 0;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.key(), Some("manager.command_queue_capacity"));
    }

    #[test]
    fn test_validate_file_output_requires_path() {
        let mut config = FerryConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Required { .. })
        ));

        config.logging.file_path = Some("ferry.log".into());
        assert!(validate_config(&config).is_ok());
    }
}

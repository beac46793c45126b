//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CommandConfig, LogOutput, LoggingConfig, ParleyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_command_config(&config.commands)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File {
        match &logging.file_path {
            None => return Err(ConfigError::missing_field("logging.file_path")),
            Some(path) if path.file_name().is_none() => {
                return Err(ConfigError::validation(format!(
                    "Log file path has no file name: {}",
                    path.display()
                )));
            }
            Some(_) => {}
        }

        if logging.max_files == 0 {
            return Err(ConfigError::validation(
                "logging.max_files must be greater than 0",
            ));
        }
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Log filter target cannot be empty: {target:?}"
        )));
    }

    Ok(())
}

fn validate_command_config(commands: &CommandConfig) -> ConfigResult<()> {
    if commands.failure_notice && commands.failure_notice_prefix.trim().is_empty() {
        return Err(ConfigError::validation(
            "commands.failure_notice_prefix cannot be empty while failure notices are enabled",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_prefix_rejected_only_with_notices() {
        let mut config = ParleyConfig::default();
        config.commands.failure_notice_prefix = "  ".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.commands.failure_notice = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = ParleyConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));

        config.logging.file_path = Some(PathBuf::from("logs/parley.log"));
        assert!(validate_config(&config).is_ok());

        config.logging.max_files = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_filter_target_rejected() {
        let mut config = ParleyConfig::default();
        config.logging.filters.insert(String::new(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }
}

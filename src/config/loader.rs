//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{DatabaseTarget, RelayConfig};
use super::secret::secret_string;
use crate::domain::errors::RelayError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into RelayConfig
/// 4. Applies environment variable overrides (HL7RELAY_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use hl7_relay::config::loader::load_config;
///
/// let config = load_config("hl7relay.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<RelayConfig> {
    let path = path.as_ref();

    // Check if file exists
    if !path.exists() {
        return Err(RelayError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    // Read file contents
    let contents = fs::read_to_string(path).map_err(|e| {
        RelayError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    // Perform environment variable substitution
    let contents = substitute_env_vars(&contents)?;

    // Parse TOML
    let mut config: RelayConfig = toml::from_str(&contents)
        .map_err(|e| RelayError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    // Apply environment variable overrides
    apply_env_overrides(&mut config)?;

    // Validate configuration
    config.validate().map_err(|e| {
        RelayError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| RelayError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        lines.push(processed_line);
    }

    if !missing_vars.is_empty() {
        return Err(RelayError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

/// Reads and parses an override variable, ignoring values that do not parse
fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Applies environment variable overrides using HL7RELAY_* prefix
///
/// Environment variables follow the pattern: HL7RELAY_<SECTION>_<KEY>
/// For example: HL7RELAY_DOWNSTREAM_URL, HL7RELAY_PROCESSING_POLL_INTERVAL_MS
fn apply_env_overrides(config: &mut RelayConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("HL7RELAY_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("HL7RELAY_APPLICATION_INSTANCE_NAME") {
        config.application.instance_name = Some(val);
    }

    if let Ok(val) = std::env::var("HL7RELAY_DATABASE_TARGET") {
        config.database_target = match val.to_ascii_lowercase().as_str() {
            "postgresql" => DatabaseTarget::PostgreSQL,
            "memory" => DatabaseTarget::Memory,
            other => {
                return Err(RelayError::Configuration(format!(
                    "Invalid HL7RELAY_DATABASE_TARGET '{other}'. Must be one of: postgresql, memory"
                )))
            }
        };
    }

    // PostgreSQL overrides (only if PostgreSQL is configured)
    if let Some(ref mut pg_config) = config.postgresql {
        if let Ok(val) = std::env::var("HL7RELAY_POSTGRESQL_CONNECTION_STRING") {
            pg_config.connection_string = secret_string(val);
        }
        if let Some(max) = env_parsed("HL7RELAY_POSTGRESQL_MAX_CONNECTIONS") {
            pg_config.max_connections = max;
        }
        if let Ok(val) = std::env::var("HL7RELAY_POSTGRESQL_SSL_MODE") {
            pg_config.ssl_mode = val;
        }
    }

    // Downstream overrides
    if let Ok(val) = std::env::var("HL7RELAY_DOWNSTREAM_URL") {
        config.downstream.url = val;
    }
    if let Some(timeout) = env_parsed("HL7RELAY_DOWNSTREAM_TIMEOUT_SECONDS") {
        config.downstream.timeout_seconds = timeout;
    }
    if let Ok(val) = std::env::var("HL7RELAY_DOWNSTREAM_TLS_VERIFY") {
        config.downstream.tls_verify = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("HL7RELAY_DOWNSTREAM_AUTH_TYPE") {
        config.downstream.auth.auth_type = val;
    }
    if let Ok(val) = std::env::var("HL7RELAY_DOWNSTREAM_AUTH_TOKEN") {
        config.downstream.auth.token = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("HL7RELAY_DOWNSTREAM_AUTH_USERNAME") {
        config.downstream.auth.username = Some(val);
    }
    if let Ok(val) = std::env::var("HL7RELAY_DOWNSTREAM_AUTH_PASSWORD") {
        config.downstream.auth.password = Some(secret_string(val));
    }

    // Processing overrides
    if let Some(secs) = env_parsed("HL7RELAY_PROCESSING_LOCK_RENEWAL_INTERVAL_SECONDS") {
        config.processing.lock_renewal_interval_seconds = secs;
    }
    if let Some(secs) = env_parsed("HL7RELAY_PROCESSING_LOCK_BREAK_AFTER_SECONDS") {
        config.processing.lock_break_after_seconds = secs;
    }
    if let Some(ms) = env_parsed("HL7RELAY_PROCESSING_POLL_INTERVAL_MS") {
        config.processing.poll_interval_ms = ms;
    }
    if let Some(secs) = env_parsed("HL7RELAY_PROCESSING_SHUTDOWN_TIMEOUT_SECS") {
        config.processing.shutdown_timeout_secs = secs;
    }
    if let Ok(val) = std::env::var("HL7RELAY_PROCESSING_CHANNELS") {
        config.processing.channels = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    // Logging overrides
    if let Ok(val) = std::env::var("HL7RELAY_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("HL7RELAY_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("HL7RELAY_TEST_VAR", "test_value");
        let input = "password = \"${HL7RELAY_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"test_value\"");
        std::env::remove_var("HL7RELAY_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("HL7RELAY_MISSING_VAR");
        let input = "password = \"${HL7RELAY_MISSING_VAR}\"";
        let result = substitute_env_vars(input);
        assert!(result.is_err());
    }

    #[test]
    fn test_substitute_skips_comments() {
        let input = "# token = \"${HL7RELAY_NOT_SET_IN_COMMENT}\"\nurl = \"x\"";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
database_target = "memory"

[application]
log_level = "debug"
instance_name = "relay-a"

[downstream]
url = "https://eds.example.com/fhir"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.instance_name.as_deref(), Some("relay-a"));
        assert_eq!(config.database_target, DatabaseTarget::Memory);
        assert_eq!(config.processing.lock_break_after_seconds, 360);
        assert_eq!(config.downstream.auth.auth_type, "none");
    }
}

use std::collections::HashSet;

use super::{AppConfig, ConfigError};

pub(crate) const VALID_LOG_LEVELS: [&str; 6] =
    ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_client_token(config)?;
    validate_backend(config)?;
    validate_models(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    Ok(())
}

fn validate_client_token(config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(token) = config.client_authentication.token.as_deref() {
        if token.trim().is_empty() {
            return Err(validation_err(
                "client_authentication.token cannot be empty when set",
            ));
        }
    }
    Ok(())
}

fn validate_backend(config: &AppConfig) -> Result<(), ConfigError> {
    let backend = &config.backend;
    if backend.id.trim().is_empty() {
        return Err(validation_err("backend.id cannot be empty"));
    }
    if !backend.base_url.starts_with("http://") && !backend.base_url.starts_with("https://") {
        return Err(validation_err(format!(
            "Backend '{}': base_url must start with http:// or https://",
            backend.id
        )));
    }
    url::Url::parse(&backend.base_url).map_err(|err| {
        validation_err(format!(
            "Backend '{}': base_url is not a valid URL: {err}",
            backend.id
        ))
    })?;
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    if config.models.default.trim().is_empty() {
        return Err(validation_err("models.default cannot be empty"));
    }
    let mut seen = HashSet::new();
    for model in &config.models.allowed {
        if model.trim().is_empty() {
            return Err(validation_err("models.allowed contains an empty model id"));
        }
        if !seen.insert(model.as_str()) {
            return Err(validation_err(format!(
                "models.allowed: duplicate model entry '{model}'"
            )));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    if !VALID_LOG_LEVELS.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {VALID_LOG_LEVELS:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn make_valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            client_authentication: ClientAuthConfig {
                token: Some("sk-gateway".to_string()),
            },
            backend: BackendConfig {
                id: "workers-ai".to_string(),
                base_url: "https://api.example.com/ai/run".to_string(),
                api_token: None,
            },
            models: ModelsConfig::default(),
            features: FeaturesConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&make_valid_config()).is_ok());
    }

    #[test]
    fn test_absent_token_is_valid() {
        let mut config = make_valid_config();
        config.client_authentication.token = None;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_blank_token_is_invalid() {
        let mut config = make_valid_config();
        config.client_authentication.token = Some("   ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = make_valid_config();
        config.backend.base_url = "ftp://bad.url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_blank_backend_id() {
        let mut config = make_valid_config();
        config.backend.id = " ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_blank_default_model() {
        let mut config = make_valid_config();
        config.models.default = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_allowed_model() {
        let mut config = make_valid_config();
        config.models.allowed = vec!["a".to_string(), "a".to_string()];
        let msg = validate_config(&config).unwrap_err().to_string();
        assert!(msg.contains("duplicate model entry 'a'"));
    }

    #[test]
    fn test_empty_allowed_list_is_valid() {
        let mut config = make_valid_config();
        config.models.allowed.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = make_valid_config();
        config.features.log_level = "VERBOSE".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = make_valid_config();
        config.features.log_level = "debug".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_runtime_worker_threads() {
        let mut config = make_valid_config();
        config.server.runtime_worker_threads = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_runtime_max_blocking_threads() {
        let mut config = make_valid_config();
        config.server.runtime_max_blocking_threads = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = make_valid_config();
        config.server.timeout = 0;
        assert!(validate_config(&config).is_err());
    }
}

use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Returns the canonical config path: `~/.omniocr/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".omniocr").join("config.json"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Loads the config at `path`, falling back to defaults when the file does not exist.
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        log::info!(
            "No config file at {}, using defaults",
            crate::sanitize::redact_path(path)
        );
        return Ok(Config::default());
    }
    load_config(path)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.max_file_size_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "max_file_size_bytes must be positive".to_string(),
        });
    }
    if config.engine_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "engine_timeout_secs must be positive".to_string(),
        });
    }
    if config.event_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "event_capacity must be positive".to_string(),
        });
    }

    let engines = &config.engines;
    for (name, url) in [
        ("gemini.endpoint", &engines.gemini.endpoint),
        ("mistral.endpoint", &engines.mistral.endpoint),
        ("doctr.url", &engines.doctr.url),
    ] {
        validate_url(name, url)?;
    }

    if engines.tesseract.languages.is_empty() {
        return Err(ConfigError::Validation {
            message: "engines.tesseract.languages must not be empty".to_string(),
        });
    }

    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::Validation {
        message: format!("engines.{} is not a valid URL: {}", field, e),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            message: format!("engines.{} must use http or https", field),
        });
    }
    Ok(())
}

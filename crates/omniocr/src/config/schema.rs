use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::secrets::{resolve_secret_optional, SecretError};

/// Upload limit used by the web dashboard.
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 25 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Database file. Defaults to `~/.omniocr/data/omniocr.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub engines: EnginesConfig,
}

fn default_max_file_size_bytes() -> u64 {
    DEFAULT_MAX_FILE_SIZE_BYTES
}

fn default_engine_timeout_secs() -> u64 {
    300
}

fn default_event_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            max_file_size_bytes: default_max_file_size_bytes(),
            engine_timeout_secs: default_engine_timeout_secs(),
            event_capacity: default_event_capacity(),
            engines: EnginesConfig::default(),
        }
    }
}

impl Config {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    /// Configured database path with `~` expanded, or the default location.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        match self.database_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(expand_tilde(path.trim())),
            _ => crate::db::default_database_path(),
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnginesConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub mistral: MistralConfig,
    #[serde(default)]
    pub doctr: DoctrConfig,
    #[serde(default)]
    pub tesseract: TesseractConfig,
}

/// Where a hosted engine's API key comes from when none is stored.
///
/// Checked in order: `api_key`, `api_key_file`, `api_key_env_var`. Without
/// an env var name the engine's standard variable is read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeySource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env_var: Option<String>,
}

impl ApiKeySource {
    pub fn resolve(&self, default_env_var: &str) -> Result<Option<SecretString>, SecretError> {
        let env_var = self.api_key_env_var.as_deref().unwrap_or(default_env_var);
        resolve_secret_optional(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            Some(env_var),
        )
    }
}

pub const GEMINI_API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";
pub const MISTRAL_API_KEY_ENV_VAR: &str = "MISTRAL_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,
    #[serde(flatten)]
    pub key: ApiKeySource,
}

fn default_gemini_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            endpoint: default_gemini_endpoint(),
            key: ApiKeySource::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralConfig {
    #[serde(default = "default_mistral_model")]
    pub model: String,
    #[serde(default = "default_mistral_endpoint")]
    pub endpoint: String,
    #[serde(flatten)]
    pub key: ApiKeySource,
}

fn default_mistral_model() -> String {
    "mistral-ocr-latest".to_string()
}

fn default_mistral_endpoint() -> String {
    "https://api.mistral.ai".to_string()
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            model: default_mistral_model(),
            endpoint: default_mistral_endpoint(),
            key: ApiKeySource::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctrConfig {
    /// Base URL of the OCR microservice.
    #[serde(default = "default_doctr_url")]
    pub url: String,
}

fn default_doctr_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for DoctrConfig {
    fn default() -> Self {
        Self {
            url: default_doctr_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseractConfig {
    #[serde(default = "default_tesseract_binary")]
    pub binary: String,
    #[serde(default = "default_pdftoppm_binary")]
    pub pdftoppm_binary: String,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_tesseract_binary() -> String {
    "tesseract".to_string()
}

fn default_pdftoppm_binary() -> String {
    "pdftoppm".to_string()
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_dpi() -> u32 {
    300
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: default_tesseract_binary(),
            pdftoppm_binary: default_pdftoppm_binary(),
            languages: default_languages(),
            dpi: default_dpi(),
        }
    }
}

impl TesseractConfig {
    /// Language list in tesseract's `-l` form, e.g. `eng+hin+mar`.
    pub fn language_arg(&self) -> String {
        self.languages.join("+")
    }
}

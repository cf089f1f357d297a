pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_config_from_str, load_config_or_default};
pub use schema::{
    ApiKeySource, Config, DoctrConfig, EnginesConfig, GeminiConfig, MistralConfig,
    TesseractConfig, DEFAULT_MAX_FILE_SIZE_BYTES, GEMINI_API_KEY_ENV_VAR, MISTRAL_API_KEY_ENV_VAR,
};

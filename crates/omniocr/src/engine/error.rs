use thiserror::Error;

use crate::job::OcrEngine;

/// Failure of a recognition call. The display string becomes the job's
/// error message, so variants read as a sentence a user can act on.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{engine} is unavailable: {reason}")]
    Unavailable { engine: OcrEngine, reason: String },

    #[error("no API key configured for provider '{provider}'")]
    MissingCredential { provider: String },

    #[error("{engine} request failed: {message}")]
    Request { engine: OcrEngine, message: String },

    #[error("{engine} API returned HTTP {status}: {message}")]
    Api {
        engine: OcrEngine,
        status: u16,
        message: String,
    },

    #[error("unsupported input: {0}")]
    InvalidInput(String),

    #[error("{engine} did not respond within {secs}s")]
    Timeout { engine: OcrEngine, secs: u64 },

    #[error("engine returned no text")]
    EmptyResult,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no backend registered for engine '{0}'")]
    NotRegistered(OcrEngine),
}

impl EngineError {
    pub(crate) fn request(engine: OcrEngine, err: impl std::fmt::Display) -> Self {
        EngineError::Request {
            engine,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_engine() {
        let err = EngineError::Unavailable {
            engine: OcrEngine::Tesseract,
            reason: "binary not found".to_string(),
        };
        assert_eq!(err.to_string(), "tesseract is unavailable: binary not found");

        let err = EngineError::Timeout {
            engine: OcrEngine::Gemini,
            secs: 30,
        };
        assert_eq!(err.to_string(), "gemini did not respond within 30s");
        assert_eq!(EngineError::EmptyResult.to_string(), "engine returned no text");
    }
}

//! OCR engine backends.
//!
//! Each backend turns document bytes into text. Backends know nothing about
//! jobs; the dispatcher owns status changes.

pub mod doctr;
pub mod error;
pub mod gemini;
pub mod mistral;
pub mod registry;
pub mod tesseract;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::job::OcrEngine;

pub use doctr::DoctrBackend;
pub use error::EngineError;
pub use gemini::GeminiBackend;
pub use mistral::MistralBackend;
pub use registry::EngineRegistry;
pub use tesseract::TesseractBackend;

#[async_trait]
pub trait OcrBackend: Send + Sync {
    fn engine(&self) -> OcrEngine;

    /// Extracts text from `file_bytes`. Hosted engines receive their API key
    /// through `api_key`; local engines ignore it.
    async fn recognize_text(
        &self,
        file_bytes: &[u8],
        mime_type: &str,
        api_key: Option<&SecretString>,
    ) -> Result<String, EngineError>;
}

/// HTTP client shared by the hosted backends.
pub(crate) fn http_client(engine: OcrEngine, timeout: Duration) -> Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EngineError::request(engine, format!("failed to build HTTP client: {}", e)))
}

/// Reads a non-success response into [`EngineError::Api`].
pub(crate) async fn api_error(engine: OcrEngine, response: reqwest::Response) -> EngineError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    EngineError::Api {
        engine,
        status,
        message: truncate(message.trim(), 300),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

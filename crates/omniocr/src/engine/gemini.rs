//! Google Gemini backend.
//!
//! Sends the whole document as base64 inline data to `generateContent`
//! along with an OCR prompt. PDFs and images are both accepted by the API,
//! so nothing is rasterized locally.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::engine::{api_error, http_client, EngineError, OcrBackend};
use crate::job::OcrEngine;

const OCR_PROMPT: &str = "You are a professional OCR engine. Extract all text from this document \
exactly as it appears. Support multiple languages including Marathi/Hindi if present. Maintain \
the structure as much as possible. Return only the extracted text.";

/// Returned when the model answers without any text part.
pub const NO_TEXT_PLACEHOLDER: &str = "No text could be extracted.";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    InlineData { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

pub struct GeminiBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            client: http_client(OcrEngine::Gemini, timeout)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

fn build_request<'a>(file_bytes: &[u8], mime_type: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type,
                        data: base64::engine::general_purpose::STANDARD.encode(file_bytes),
                    },
                },
                Part::Text { text: OCR_PROMPT },
            ],
        }],
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> Result<String, EngineError> {
    if let Some(err) = response.error {
        return Err(EngineError::Request {
            engine: OcrEngine::Gemini,
            message: err.message,
        });
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Ok(NO_TEXT_PLACEHOLDER.to_string())
    } else {
        Ok(text)
    }
}

#[async_trait]
impl OcrBackend for GeminiBackend {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Gemini
    }

    async fn recognize_text(
        &self,
        file_bytes: &[u8],
        mime_type: &str,
        api_key: Option<&SecretString>,
    ) -> Result<String, EngineError> {
        let api_key = api_key.ok_or_else(|| EngineError::MissingCredential {
            provider: "gemini".to_string(),
        })?;

        log::debug!(
            "Gemini: sending {} bytes ({}) to model {}",
            file_bytes.len(),
            mime_type,
            self.model
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&build_request(file_bytes, mime_type))
            .send()
            .await
            .map_err(|e| EngineError::request(OcrEngine::Gemini, e))?;

        if !response.status().is_success() {
            return Err(api_error(OcrEngine::Gemini, response).await);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EngineError::request(OcrEngine::Gemini, format!("invalid response: {}", e)))?;
        extract_text(body)
    }
}

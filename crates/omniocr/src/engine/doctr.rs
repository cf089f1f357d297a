//! docTR backend, served by the OCR microservice over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::config::DoctrConfig;
use crate::engine::{api_error, http_client, EngineError, OcrBackend};
use crate::job::OcrEngine;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    mime_type: &'a str,
    engine: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    text: String,
}

pub struct DoctrBackend {
    client: reqwest::Client,
    url: String,
}

impl DoctrBackend {
    pub fn new(config: &DoctrConfig, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            client: http_client(OcrEngine::Doctr, timeout)?,
            url: format!("{}/ocr/process", config.url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl OcrBackend for DoctrBackend {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Doctr
    }

    async fn recognize_text(
        &self,
        file_bytes: &[u8],
        mime_type: &str,
        _api_key: Option<&SecretString>,
    ) -> Result<String, EngineError> {
        let request = ProcessRequest {
            mime_type,
            engine: OcrEngine::Doctr.as_str(),
            content: base64::engine::general_purpose::STANDARD.encode(file_bytes),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    EngineError::Unavailable {
                        engine: OcrEngine::Doctr,
                        reason: format!("OCR service not reachable at {}", self.url),
                    }
                } else {
                    EngineError::request(OcrEngine::Doctr, e)
                }
            })?;

        if !response.status().is_success() {
            return Err(api_error(OcrEngine::Doctr, response).await);
        }

        let body: ProcessResponse = response.json().await.map_err(|e| {
            EngineError::request(OcrEngine::Doctr, format!("invalid response: {}", e))
        })?;
        Ok(body.text)
    }
}

//! Mistral OCR backend (`/v1/ocr`).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::MistralConfig;
use crate::engine::{api_error, http_client, EngineError, OcrBackend};
use crate::job::OcrEngine;

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: Document,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Document {
    DocumentUrl { document_url: String },
    ImageUrl { image_url: String },
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    markdown: String,
}

pub struct MistralBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl MistralBackend {
    pub fn new(config: &MistralConfig, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            client: http_client(OcrEngine::Mistral, timeout)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

/// Images go in as `image_url`, everything else as `document_url`.
fn document_for(file_bytes: &[u8], mime_type: &str) -> Document {
    let data_url = format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(file_bytes)
    );
    if mime_type.starts_with("image/") {
        Document::ImageUrl {
            image_url: data_url,
        }
    } else {
        Document::DocumentUrl {
            document_url: data_url,
        }
    }
}

fn join_pages(mut response: OcrResponse) -> String {
    response.pages.sort_by_key(|p| p.index);
    response
        .pages
        .into_iter()
        .map(|p| p.markdown)
        .filter(|m| !m.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl OcrBackend for MistralBackend {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Mistral
    }

    async fn recognize_text(
        &self,
        file_bytes: &[u8],
        mime_type: &str,
        api_key: Option<&SecretString>,
    ) -> Result<String, EngineError> {
        let api_key = api_key.ok_or_else(|| EngineError::MissingCredential {
            provider: "mistral".to_string(),
        })?;

        let request = OcrRequest {
            model: &self.model,
            document: document_for(file_bytes, mime_type),
        };

        let response = self
            .client
            .post(format!("{}/v1/ocr", self.endpoint))
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::request(OcrEngine::Mistral, e))?;

        if !response.status().is_success() {
            return Err(api_error(OcrEngine::Mistral, response).await);
        }

        let body: OcrResponse = response.json().await.map_err(|e| {
            EngineError::request(OcrEngine::Mistral, format!("invalid response: {}", e))
        })?;
        log::debug!("Mistral: received {} page(s)", body.pages.len());
        Ok(join_pages(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind_follows_mime_type() {
        let json = serde_json::to_value(document_for(b"x", "image/png")).unwrap();
        assert_eq!(json["type"], "image_url");
        assert_eq!(json["image_url"], "data:image/png;base64,eA==");

        let json = serde_json::to_value(document_for(b"x", "application/pdf")).unwrap();
        assert_eq!(json["type"], "document_url");
        assert_eq!(json["document_url"], "data:application/pdf;base64,eA==");
    }

    #[test]
    fn test_pages_joined_in_order() {
        let response: OcrResponse = serde_json::from_str(
            r##"{"pages":[{"index":1,"markdown":"page two"},{"index":0,"markdown":"# page one"},{"index":2,"markdown":"  "}]}"##,
        )
        .unwrap();
        assert_eq!(join_pages(response), "# page one\n\npage two");
    }

    #[test]
    fn test_no_pages_is_empty() {
        let response: OcrResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(join_pages(response), "");
    }
}

//! Fake OCR backends.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use omniocr::engine::{EngineError, OcrBackend};
use omniocr::OcrEngine;

/// What a [`ScriptedBackend`] answers.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    /// The engine's binary or service is missing.
    Unavailable(String),
}

/// Answers every call with the same reply and records the keys it saw.
pub struct ScriptedBackend {
    engine: OcrEngine,
    reply: Reply,
    seen_keys: Arc<Mutex<Vec<Option<String>>>>,
}

impl ScriptedBackend {
    pub fn text(engine: OcrEngine, text: &str) -> Self {
        Self::new(engine, Reply::Text(text.to_string()))
    }

    pub fn unavailable(engine: OcrEngine, reason: &str) -> Self {
        Self::new(engine, Reply::Unavailable(reason.to_string()))
    }

    fn new(engine: OcrEngine, reply: Reply) -> Self {
        Self {
            engine,
            reply,
            seen_keys: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn seen_keys(&self) -> Arc<Mutex<Vec<Option<String>>>> {
        Arc::clone(&self.seen_keys)
    }
}

#[async_trait]
impl OcrBackend for ScriptedBackend {
    fn engine(&self) -> OcrEngine {
        self.engine
    }

    async fn recognize_text(
        &self,
        _file_bytes: &[u8],
        _mime_type: &str,
        api_key: Option<&SecretString>,
    ) -> Result<String, EngineError> {
        self.seen_keys
            .lock()
            .unwrap()
            .push(api_key.map(|k| k.expose_secret().to_string()));
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Unavailable(reason) => Err(EngineError::Unavailable {
                engine: self.engine,
                reason: reason.clone(),
            }),
        }
    }
}

/// Blocks inside the engine call until the test releases it.
pub struct GatedBackend {
    engine: OcrEngine,
    text: String,
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl GatedBackend {
    pub fn new(engine: OcrEngine, text: &str) -> Self {
        Self {
            engine,
            text: text.to_string(),
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl OcrBackend for GatedBackend {
    fn engine(&self) -> OcrEngine {
        self.engine
    }

    async fn recognize_text(
        &self,
        _file_bytes: &[u8],
        _mime_type: &str,
        _api_key: Option<&SecretString>,
    ) -> Result<String, EngineError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(self.text.clone())
    }
}

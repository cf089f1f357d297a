use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{
    DoctrBackend, EngineError, GeminiBackend, MistralBackend, OcrBackend, TesseractBackend,
};
use crate::job::OcrEngine;

/// Maps each engine to the backend that serves it.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    backends: HashMap<OcrEngine, Arc<dyn OcrBackend>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the four built-in backends from config.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let timeout = config.engine_timeout();
        let engines = &config.engines;

        let mut registry = Self::new();
        registry.register(Arc::new(GeminiBackend::new(&engines.gemini, timeout)?));
        registry.register(Arc::new(MistralBackend::new(&engines.mistral, timeout)?));
        registry.register(Arc::new(DoctrBackend::new(&engines.doctr, timeout)?));
        registry.register(Arc::new(TesseractBackend::new(&engines.tesseract)));
        Ok(registry)
    }

    /// Adds `backend`, replacing any earlier backend for the same engine.
    pub fn register(&mut self, backend: Arc<dyn OcrBackend>) {
        self.backends.insert(backend.engine(), backend);
    }

    pub fn get(&self, engine: OcrEngine) -> Result<Arc<dyn OcrBackend>, EngineError> {
        self.backends
            .get(&engine)
            .cloned()
            .ok_or(EngineError::NotRegistered(engine))
    }

    pub fn engines(&self) -> Vec<OcrEngine> {
        OcrEngine::ALL
            .into_iter()
            .filter(|e| self.backends.contains_key(e))
            .collect()
    }
}

//! Test harness for isolated service instances.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use omniocr::db::Database;
use omniocr::engine::{EngineRegistry, OcrBackend};
use omniocr::{
    Config, LogEntry, MemoryCredentialStore, MemoryJobStore, OcrEngine, OmniOcr, SqliteJobStore,
    Submission,
};

pub struct TestHarness {
    pub service: OmniOcr,
    pub credentials: Arc<MemoryCredentialStore>,
    temp_dir: Option<TempDir>,
}

impl TestHarness {
    /// In-memory service with the given backends and a 5 s engine timeout.
    pub fn in_memory(backends: Vec<Arc<dyn OcrBackend>>) -> Self {
        Self::in_memory_with_config(backends, test_config())
    }

    pub fn in_memory_with_config(backends: Vec<Arc<dyn OcrBackend>>, config: Config) -> Self {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let service = OmniOcr::with_parts(
            &config,
            Arc::new(MemoryJobStore::new()),
            credentials.clone(),
            registry(backends),
        );
        Self {
            service,
            credentials,
            temp_dir: None,
        }
    }

    /// SQLite-backed service over `db_path`.
    pub fn sqlite_at(db_path: &Path, backends: Vec<Arc<dyn OcrBackend>>) -> Self {
        let db = Database::open(db_path).expect("Failed to open test database");
        let credentials = Arc::new(MemoryCredentialStore::new());
        let service = OmniOcr::with_parts(
            &test_config(),
            Arc::new(SqliteJobStore::new(db)),
            credentials.clone(),
            registry(backends),
        );
        Self {
            service,
            credentials,
            temp_dir: None,
        }
    }

    /// SQLite-backed service in a fresh temp directory.
    pub fn sqlite(backends: Vec<Arc<dyn OcrBackend>>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut harness = Self::sqlite_at(&temp_dir.path().join("omniocr.db"), backends);
        harness.temp_dir = Some(temp_dir);
        harness
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("omniocr.db"))
    }

    pub fn messages(&self, job_id: &str) -> Vec<String> {
        self.service
            .get_logs(job_id)
            .unwrap()
            .into_iter()
            .map(|l: LogEntry| l.message)
            .collect()
    }
}

pub fn test_config() -> Config {
    Config {
        engine_timeout_secs: 5,
        ..Config::default()
    }
}

fn registry(backends: Vec<Arc<dyn OcrBackend>>) -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    for backend in backends {
        registry.register(backend);
    }
    registry
}

pub fn submission(file_name: &str, mime_type: &str, engine: OcrEngine) -> Submission {
    Submission::new(b"fake document bytes".to_vec(), file_name, mime_type, engine)
}

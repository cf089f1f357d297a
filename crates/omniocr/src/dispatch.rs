//! Engine dispatch.
//!
//! A dispatched job runs on its own tokio task: QUEUED -> PROCESSING, one
//! backend call bounded by the engine timeout, then COMPLETED or FAILED.
//! The backend call is never aborted. If the job was cancelled meanwhile,
//! the lifecycle manager rejects the late transition and the result is
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::{EnginesConfig, GEMINI_API_KEY_ENV_VAR, MISTRAL_API_KEY_ENV_VAR};
use crate::credentials::CredentialStore;
use crate::engine::{EngineError, EngineRegistry};
use crate::error::JobError;
use crate::job::{Job, OcrEngine, Transition};
use crate::lifecycle::LifecycleManager;

/// How a dispatch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Completed(Job),
    /// The engine failed; the job now carries the error message.
    Failed(Job),
    /// Nothing was recorded, usually because the job was cancelled first.
    Discarded { job_id: String, reason: String },
}

impl DispatchOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            DispatchOutcome::Completed(job) | DispatchOutcome::Failed(job) => &job.id,
            DispatchOutcome::Discarded { job_id, .. } => job_id,
        }
    }
}

/// Handle to a running dispatch. Dropping it does not stop the job.
#[derive(Debug)]
pub struct DispatchHandle {
    job_id: String,
    task: JoinHandle<DispatchOutcome>,
}

impl DispatchHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> DispatchOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Dispatch task for job {} ended abnormally: {}", self.job_id, e);
                DispatchOutcome::Discarded {
                    job_id: self.job_id,
                    reason: format!("dispatch task ended abnormally: {}", e),
                }
            }
        }
    }
}

/// Hands queued jobs to their engine backend.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    lifecycle: Arc<LifecycleManager>,
    registry: EngineRegistry,
    credentials: Arc<dyn CredentialStore>,
    engines: EnginesConfig,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        registry: EngineRegistry,
        credentials: Arc<dyn CredentialStore>,
        engines: EnginesConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                lifecycle,
                registry,
                credentials,
                engines,
                timeout,
            }),
        }
    }

    /// Starts processing `job` in the background. Must be called inside a
    /// tokio runtime.
    pub fn dispatch(&self, job: &Job, file_bytes: Vec<u8>) -> DispatchHandle {
        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("dispatch", job_id = %job.id, engine = %job.engine);
        let job_id = job.id.clone();
        let engine = job.engine;
        let mime_type = job.file_mime_type.clone();

        let task = tokio::spawn(
            {
                let job_id = job_id.clone();
                async move { inner.run(&job_id, engine, &mime_type, &file_bytes).await }
            }
            .instrument(span),
        );

        DispatchHandle { job_id, task }
    }
}

impl DispatcherInner {
    async fn run(
        &self,
        job_id: &str,
        engine: OcrEngine,
        mime_type: &str,
        file_bytes: &[u8],
    ) -> DispatchOutcome {
        match self.lifecycle.transition(job_id, Transition::Start) {
            Ok(_) => {}
            Err(e) => return discarded(job_id, e),
        }

        let recognized = self.recognize(engine, mime_type, file_bytes).await;
        let transition = match recognized {
            Ok(text) => Transition::complete(text),
            Err(e) => {
                log::warn!("Job {} failed on {}: {}", job_id, engine, e);
                Transition::fail(e.to_string())
            }
        };

        match self.lifecycle.transition(job_id, transition) {
            Ok(job) if job.result.is_some() => DispatchOutcome::Completed(job),
            Ok(job) => DispatchOutcome::Failed(job),
            Err(e) => discarded(job_id, e),
        }
    }

    async fn recognize(
        &self,
        engine: OcrEngine,
        mime_type: &str,
        file_bytes: &[u8],
    ) -> Result<String, EngineError> {
        let backend = self.registry.get(engine)?;
        let api_key = self.api_key(engine)?;

        let call = backend.recognize_text(file_bytes, mime_type, api_key.as_ref());
        let text = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    engine,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if text.trim().is_empty() {
            return Err(EngineError::EmptyResult);
        }
        Ok(text)
    }

    /// Stored provider key first, then the configured source.
    fn api_key(&self, engine: OcrEngine) -> Result<Option<SecretString>, EngineError> {
        let Some(provider) = engine.credential_provider() else {
            return Ok(None);
        };

        match self.credentials.get_provider_key(provider) {
            Ok(Some(key)) => return Ok(Some(key)),
            Ok(None) => {}
            Err(e) => log::warn!("Could not read stored key for '{}': {}", provider, e),
        }

        let (source, default_env_var) = match engine {
            OcrEngine::Gemini => (&self.engines.gemini.key, GEMINI_API_KEY_ENV_VAR),
            OcrEngine::Mistral => (&self.engines.mistral.key, MISTRAL_API_KEY_ENV_VAR),
            OcrEngine::Doctr | OcrEngine::Tesseract => return Ok(None),
        };
        source
            .resolve(default_env_var)
            .map_err(|e| EngineError::Unavailable {
                engine,
                reason: format!("API key could not be loaded: {}", e),
            })
    }
}

fn discarded(job_id: &str, err: JobError) -> DispatchOutcome {
    match &err {
        JobError::IllegalTransition { from, .. } => {
            log::info!("Job {} is {}, discarding dispatch", job_id, from)
        }
        other => log::error!("Dispatch of job {} stopped: {}", job_id, other),
    }
    DispatchOutcome::Discarded {
        job_id: job_id.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::broadcast::JobEventBroadcaster;
    use crate::credentials::MemoryCredentialStore;
    use crate::engine::OcrBackend;
    use crate::job::{JobStatus, LogLevel, Submission};
    use crate::store::MemoryJobStore;

    enum Reply {
        Text(&'static str),
        Sleep(Duration),
        Unavailable,
    }

    struct FakeBackend {
        engine: OcrEngine,
        reply: Reply,
    }

    #[async_trait]
    impl OcrBackend for FakeBackend {
        fn engine(&self) -> OcrEngine {
            self.engine
        }

        async fn recognize_text(
            &self,
            _file_bytes: &[u8],
            _mime_type: &str,
            api_key: Option<&SecretString>,
        ) -> Result<String, EngineError> {
            if self.engine.credential_provider().is_some() && api_key.is_none() {
                return Err(EngineError::MissingCredential {
                    provider: self.engine.to_string(),
                });
            }
            match self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Sleep(d) => {
                    tokio::time::sleep(d).await;
                    Ok("late".to_string())
                }
                Reply::Unavailable => Err(EngineError::Unavailable {
                    engine: self.engine,
                    reason: "binary not found".to_string(),
                }),
            }
        }
    }

    struct Harness {
        lifecycle: Arc<LifecycleManager>,
        credentials: Arc<MemoryCredentialStore>,
        dispatcher: Dispatcher,
    }

    fn harness(engine: OcrEngine, reply: Reply, timeout: Duration) -> Harness {
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::new(MemoryJobStore::new()),
            JobEventBroadcaster::new(16),
            1024,
        ));
        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(FakeBackend { engine, reply }));
        let credentials = Arc::new(MemoryCredentialStore::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&lifecycle),
            registry,
            credentials.clone(),
            EnginesConfig::default(),
            timeout,
        );
        Harness {
            lifecycle,
            credentials,
            dispatcher,
        }
    }

    fn submit(h: &Harness, engine: OcrEngine) -> Job {
        h.lifecycle
            .create(&Submission::new(b"doc".to_vec(), "scan.png", "image/png", engine), None)
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_completes_job() {
        let h = harness(OcrEngine::Doctr, Reply::Text("hello"), Duration::from_secs(5));
        let job = submit(&h, OcrEngine::Doctr);

        let outcome = h.dispatcher.dispatch(&job, b"doc".to_vec()).wait().await;
        match outcome {
            DispatchOutcome::Completed(job) => assert_eq!(job.result.as_deref(), Some("hello")),
            other => panic!("unexpected outcome: {:?}", other),
        }

        // queued, processing, completed
        assert_eq!(h.lifecycle.logs(&job.id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stored_key_reaches_backend() {
        let h = harness(OcrEngine::Mistral, Reply::Text("ok"), Duration::from_secs(5));
        h.credentials
            .save_provider_key("mistral", &SecretString::from("m-key"))
            .unwrap();
        let job = submit(&h, OcrEngine::Mistral);

        let outcome = h.dispatcher.dispatch(&job, b"doc".to_vec()).wait().await;
        assert!(matches!(outcome, DispatchOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_engine_error_fails_job() {
        let h = harness(OcrEngine::Tesseract, Reply::Unavailable, Duration::from_secs(5));
        let job = submit(&h, OcrEngine::Tesseract);

        let outcome = h.dispatcher.dispatch(&job, b"doc".to_vec()).wait().await;
        let DispatchOutcome::Failed(failed) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("binary not found"));

        let last = h.lifecycle.logs(&job.id).unwrap().pop().unwrap();
        assert_eq!(last.level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_empty_text_fails_job() {
        let h = harness(OcrEngine::Doctr, Reply::Text("  \n"), Duration::from_secs(5));
        let job = submit(&h, OcrEngine::Doctr);

        let outcome = h.dispatcher.dispatch(&job, b"doc".to_vec()).wait().await;
        let DispatchOutcome::Failed(failed) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failed.error.as_deref(), Some("engine returned no text"));
    }

    #[tokio::test]
    async fn test_timeout_fails_job() {
        let h = harness(
            OcrEngine::Doctr,
            Reply::Sleep(Duration::from_secs(30)),
            Duration::from_millis(50),
        );
        let job = submit(&h, OcrEngine::Doctr);

        let outcome = h.dispatcher.dispatch(&job, b"doc".to_vec()).wait().await;
        let DispatchOutcome::Failed(failed) = outcome else {
            panic!("expected failure");
        };
        assert!(failed.error.unwrap().contains("did not respond"));
    }

    #[tokio::test]
    async fn test_unregistered_engine_fails_job() {
        let h = harness(OcrEngine::Doctr, Reply::Text("x"), Duration::from_secs(5));
        let job = submit(&h, OcrEngine::Tesseract);

        let outcome = h.dispatcher.dispatch(&job, b"doc".to_vec()).wait().await;
        assert!(matches!(outcome, DispatchOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch_is_discarded() {
        let h = harness(OcrEngine::Doctr, Reply::Text("x"), Duration::from_secs(5));
        let job = submit(&h, OcrEngine::Doctr);
        h.lifecycle.cancel(&job.id).unwrap();

        let outcome = h.dispatcher.dispatch(&job, b"doc".to_vec()).wait().await;
        assert!(matches!(outcome, DispatchOutcome::Discarded { .. }));
        assert_eq!(h.lifecycle.get(&job.id).unwrap().status, JobStatus::Cancelled);
        assert_eq!(h.lifecycle.logs(&job.id).unwrap().len(), 2);
    }
}

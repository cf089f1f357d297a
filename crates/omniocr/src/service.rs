//! The `OmniOcr` facade: the surface a front end talks to.
//!
//! It wires the job store, lifecycle manager, engine dispatcher and
//! credential store together. Submitting a job creates it and dispatches
//! it in one call.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::broadcast;

use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::config::Config;
use crate::credentials::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
use crate::db::Database;
use crate::dispatch::{DispatchHandle, Dispatcher};
use crate::engine::EngineRegistry;
use crate::error::{ConfigError, Result};
use crate::job::{Job, JobSnapshot, LogEntry, StatusCounts, Submission};
use crate::lifecycle::{LifecycleManager, ResultArtifact};
use crate::secrets::{KeyCipher, SecretError};
use crate::store::{JobStore, MemoryJobStore, SqliteJobStore};

/// A freshly created job and the handle of its dispatch.
#[derive(Debug)]
pub struct SubmittedJob {
    pub job: Job,
    pub handle: DispatchHandle,
}

pub struct OmniOcr {
    lifecycle: Arc<LifecycleManager>,
    dispatcher: Dispatcher,
    credentials: Arc<dyn CredentialStore>,
    persistent_keys: bool,
}

impl OmniOcr {
    /// Opens the SQLite database named by `config`.
    ///
    /// Other processes may share the database and have jobs in flight, so
    /// opening never touches job status. See [`OmniOcr::recover_interrupted`].
    ///
    /// Provider keys are persisted only when `OMNIOCR_KEY_ENCRYPTION_KEY`
    /// is set; otherwise they live for this process only.
    pub fn open(config: &Config) -> Result<Self> {
        let path = config
            .resolved_database_path()
            .ok_or_else(|| ConfigError::Validation {
                message: "no database_path configured and no home directory found".to_string(),
            })?;
        let db = Database::open(&path)?;

        let (credentials, persistent_keys) = match KeyCipher::from_env() {
            Ok(cipher) => (
                Arc::new(SqliteCredentialStore::new(db.clone(), cipher)) as Arc<dyn CredentialStore>,
                true,
            ),
            Err(SecretError::EnvVarNotSet { name }) => {
                log::warn!("{} is not set; provider keys will not be persisted", name);
                (
                    Arc::new(MemoryCredentialStore::new()) as Arc<dyn CredentialStore>,
                    false,
                )
            }
            Err(e) => return Err(e.into()),
        };

        let registry = EngineRegistry::from_config(config)?;
        let mut service = Self::with_parts(
            config,
            Arc::new(SqliteJobStore::new(db)),
            credentials,
            registry,
        );
        service.persistent_keys = persistent_keys;
        Ok(service)
    }

    /// Everything in memory, with the built-in engine backends.
    pub fn in_memory(config: &Config) -> Result<Self> {
        let registry = EngineRegistry::from_config(config)?;
        Ok(Self::with_parts(
            config,
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryCredentialStore::new()),
            registry,
        ))
    }

    /// Assembles a service from explicit parts, e.g. custom backends.
    pub fn with_parts(
        config: &Config,
        store: Arc<dyn JobStore>,
        credentials: Arc<dyn CredentialStore>,
        registry: EngineRegistry,
    ) -> Self {
        let lifecycle = Arc::new(LifecycleManager::new(
            store,
            JobEventBroadcaster::new(config.event_capacity),
            config.max_file_size_bytes,
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&lifecycle),
            registry,
            Arc::clone(&credentials),
            config.engines.clone(),
            config.engine_timeout(),
        );
        Self {
            lifecycle,
            dispatcher,
            credentials,
            persistent_keys: false,
        }
    }

    /// Creates a QUEUED job and dispatches it to its engine. Must be called
    /// inside a tokio runtime.
    pub fn submit(&self, submission: Submission, owner_id: Option<&str>) -> Result<SubmittedJob> {
        let job = self.lifecycle.create(&submission, owner_id)?;
        let handle = self.dispatcher.dispatch(&job, submission.file_bytes);
        Ok(SubmittedJob { job, handle })
    }

    pub fn get_job(&self, job_id: &str) -> Result<Job> {
        Ok(self.lifecycle.get(job_id)?)
    }

    /// Jobs newest first, optionally restricted to one owner.
    pub fn list_jobs(&self, owner_id: Option<&str>) -> Result<Vec<Job>> {
        Ok(self.lifecycle.list(owner_id)?)
    }

    pub fn get_logs(&self, job_id: &str) -> Result<Vec<LogEntry>> {
        Ok(self.lifecycle.logs(job_id)?)
    }

    pub fn snapshot(&self, job_id: &str) -> Result<JobSnapshot> {
        Ok(self.lifecycle.snapshot(job_id)?)
    }

    pub fn cancel_job(&self, job_id: &str) -> Result<Job> {
        Ok(self.lifecycle.cancel(job_id)?)
    }

    /// The text artifact of a completed job; `None` while not available.
    pub fn download_result(&self, job_id: &str) -> Result<Option<ResultArtifact>> {
        Ok(self.lifecycle.result(job_id)?)
    }

    pub fn counts(&self) -> Result<StatusCounts> {
        Ok(self.lifecycle.counts()?)
    }

    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        Ok(self.lifecycle.delete(job_id)?)
    }

    /// Fails every job left in PROCESSING with "interrupted before
    /// completion".
    ///
    /// Only safe when no other process is still running jobs against the
    /// same database; a live dispatch would lose its result.
    pub fn recover_interrupted(&self) -> Result<Vec<Job>> {
        Ok(self.lifecycle.recover_interrupted()?)
    }

    pub fn save_provider_key(&self, provider: &str, key: &SecretString) -> Result<()> {
        self.credentials.save_provider_key(provider, key)
    }

    pub fn has_provider_key(&self, provider: &str) -> Result<bool> {
        Ok(self.credentials.get_provider_key(provider)?.is_some())
    }

    pub fn delete_provider_key(&self, provider: &str) -> Result<bool> {
        self.credentials.delete_provider_key(provider)
    }

    /// Whether saved provider keys survive a restart.
    pub fn persists_provider_keys(&self) -> bool {
        self.persistent_keys
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.lifecycle.subscribe()
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }
}

pub mod broadcast;
pub mod config;
pub mod credentials;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod logging;
pub mod sanitize;
pub mod secrets;
pub mod service;
pub mod store;

pub use broadcast::{JobEvent, JobEventBroadcaster};
pub use config::{load_config, load_config_or_default, Config};
pub use credentials::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
pub use dispatch::{DispatchHandle, DispatchOutcome, Dispatcher};
pub use engine::{EngineError, EngineRegistry, OcrBackend};
pub use error::{ConfigError, JobError, OmniOcrError, Result, StoreError};
pub use job::{Job, JobSnapshot, JobStatus, LogEntry, LogLevel, OcrEngine, Submission, Transition};
pub use lifecycle::{LifecycleManager, ResultArtifact};
pub use logging::{init_logging, LogFormat};
pub use secrets::{resolve_secret, resolve_secret_optional, KeyCipher, SecretError};
pub use service::{OmniOcr, SubmittedJob};
pub use store::{JobStore, MemoryJobStore, SqliteJobStore};

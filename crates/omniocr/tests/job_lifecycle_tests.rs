//! End-to-end job lifecycle scenarios through the `OmniOcr` facade.
//!
//! `#[tokio::test]` runs on a current-thread runtime, so a dispatch task
//! only starts once the test awaits. Scenarios that cancel "before
//! dispatch" rely on this.

mod common;

use std::sync::Arc;

use secrecy::SecretString;

use common::{submission, test_config, GatedBackend, ScriptedBackend, TestHarness};
use omniocr::{
    Config, DispatchOutcome, JobError, JobStatus, LogLevel, OcrEngine, OmniOcrError,
    Transition,
};

fn assert_logs_ordered(harness: &TestHarness, job_id: &str) {
    let logs = harness.service.get_logs(job_id).unwrap();
    for pair in logs.windows(2) {
        assert!(
            pair[0].created_at <= pair[1].created_at,
            "log timestamps went backwards: {:?}",
            pair
        );
    }
}

#[tokio::test]
async fn invoice_on_gemini_completes_with_text() {
    let backend = Arc::new(ScriptedBackend::text(OcrEngine::Gemini, "Total: $42"));
    let seen_keys = backend.seen_keys();
    let harness = TestHarness::in_memory(vec![backend]);
    harness
        .service
        .save_provider_key("gemini", &SecretString::from("stored-gemini-key"))
        .unwrap();

    let submitted = harness
        .service
        .submit(submission("invoice.pdf", "application/pdf", OcrEngine::Gemini), None)
        .unwrap();
    assert_eq!(submitted.job.status, JobStatus::Queued);
    assert_eq!(submitted.job.owner_id, omniocr::job::GUEST_OWNER_ID);

    let outcome = submitted.handle.wait().await;
    let DispatchOutcome::Completed(job) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.as_deref(), Some("Total: $42"));
    assert!(job.error.is_none());
    assert!(job.finished_at.is_some());

    assert_eq!(
        harness.messages(&job.id),
        vec![
            "Job queued for processing with engine: gemini",
            "Status updated to processing",
            "Status updated to completed (Text extracted)",
        ]
    );
    assert_eq!(
        *seen_keys.lock().unwrap(),
        vec![Some("stored-gemini-key".to_string())]
    );

    let artifact = harness.service.download_result(&job.id).unwrap().unwrap();
    assert_eq!(artifact.file_name, "invoice.txt");
    assert_eq!(artifact.content_type, "text/plain; charset=utf-8");
    assert_eq!(artifact.text, "Total: $42");
    assert_logs_ordered(&harness, &job.id);
}

#[tokio::test]
async fn missing_tesseract_binary_fails_job() {
    let harness = TestHarness::in_memory(vec![Arc::new(ScriptedBackend::unavailable(
        OcrEngine::Tesseract,
        "binary not found",
    ))]);

    let submitted = harness
        .service
        .submit(submission("scan.png", "image/png", OcrEngine::Tesseract), Some("user-7"))
        .unwrap();
    let outcome = submitted.handle.wait().await;
    let DispatchOutcome::Failed(job) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.is_none());
    assert!(job.error.as_deref().unwrap().contains("binary not found"));

    let logs = harness.service.get_logs(&job.id).unwrap();
    let last = logs.last().unwrap();
    assert_eq!(last.level, LogLevel::Error);
    assert!(last.message.contains("binary not found"));
    assert!(harness.service.download_result(&job.id).unwrap().is_none());
}

#[tokio::test]
async fn cancel_before_dispatch_never_processes() {
    let backend = Arc::new(ScriptedBackend::text(OcrEngine::Doctr, "never used"));
    let seen_keys = backend.seen_keys();
    let harness = TestHarness::in_memory(vec![backend]);

    let submitted = harness
        .service
        .submit(submission("scan.png", "image/png", OcrEngine::Doctr), None)
        .unwrap();
    let cancelled = harness.service.cancel_job(&submitted.job.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let outcome = submitted.handle.wait().await;
    assert!(matches!(outcome, DispatchOutcome::Discarded { .. }));
    assert!(seen_keys.lock().unwrap().is_empty());

    assert_eq!(
        harness.messages(&submitted.job.id),
        vec![
            "Job queued for processing with engine: doctr",
            "Status updated to cancelled by user",
        ]
    );
    assert_eq!(
        harness.service.get_job(&submitted.job.id).unwrap().status,
        JobStatus::Cancelled
    );
}

#[tokio::test]
async fn late_result_after_cancel_is_discarded() {
    let backend = Arc::new(GatedBackend::new(OcrEngine::Mistral, "too late"));
    let started = Arc::clone(&backend.started);
    let release = Arc::clone(&backend.release);
    let harness = TestHarness::in_memory(vec![backend]);

    let submitted = harness
        .service
        .submit(submission("letter.jpg", "image/jpeg", OcrEngine::Mistral), None)
        .unwrap();
    let job_id = submitted.job.id.clone();

    started.notified().await;
    assert_eq!(
        harness.service.get_job(&job_id).unwrap().status,
        JobStatus::Processing
    );
    harness.service.cancel_job(&job_id).unwrap();
    release.notify_one();

    let outcome = submitted.handle.wait().await;
    assert!(matches!(outcome, DispatchOutcome::Discarded { .. }));

    let job = harness.service.get_job(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.result.is_none());
    assert_eq!(
        harness.messages(&job_id),
        vec![
            "Job queued for processing with engine: mistral",
            "Status updated to processing",
            "Status updated to cancelled by user",
        ]
    );
    assert_logs_ordered(&harness, &job_id);
}

#[tokio::test]
async fn slow_engine_times_out() {
    let backend = Arc::new(GatedBackend::new(OcrEngine::Doctr, "unused"));
    let config = Config {
        engine_timeout_secs: 1,
        ..test_config()
    };
    let harness = TestHarness::in_memory_with_config(vec![backend], config);

    let submitted = harness
        .service
        .submit(submission("scan.tiff", "image/tiff", OcrEngine::Doctr), None)
        .unwrap();
    let DispatchOutcome::Failed(job) = submitted.handle.wait().await else {
        panic!("expected timeout failure");
    };
    assert_eq!(job.error.as_deref(), Some("doctr did not respond within 1s"));
}

#[tokio::test]
async fn blank_engine_output_fails_job() {
    let harness =
        TestHarness::in_memory(vec![Arc::new(ScriptedBackend::text(OcrEngine::Doctr, " \n\t"))]);

    let submitted = harness
        .service
        .submit(submission("blank.png", "image/png", OcrEngine::Doctr), None)
        .unwrap();
    let DispatchOutcome::Failed(job) = submitted.handle.wait().await else {
        panic!("expected failure");
    };
    assert_eq!(job.error.as_deref(), Some("engine returned no text"));
    assert!(job.result.is_none());
}

#[tokio::test]
async fn terminal_jobs_reject_every_transition() {
    let harness =
        TestHarness::in_memory(vec![Arc::new(ScriptedBackend::text(OcrEngine::Doctr, "ok"))]);
    let submitted = harness
        .service
        .submit(submission("a.png", "image/png", OcrEngine::Doctr), None)
        .unwrap();
    let DispatchOutcome::Completed(done) = submitted.handle.wait().await else {
        panic!("expected completion");
    };
    let before = harness.service.get_logs(&done.id).unwrap().len();

    let lifecycle = harness.service.lifecycle();
    for transition in [
        Transition::Start,
        Transition::complete("again"),
        Transition::fail("nope"),
        Transition::Cancel,
    ] {
        assert!(matches!(
            lifecycle.transition(&done.id, transition),
            Err(JobError::IllegalTransition { .. })
        ));
    }
    assert!(matches!(
        harness.service.cancel_job(&done.id),
        Err(OmniOcrError::Job(JobError::IllegalTransition { .. }))
    ));

    assert_eq!(harness.service.get_job(&done.id).unwrap(), done);
    assert_eq!(harness.service.get_logs(&done.id).unwrap().len(), before);
}

#[tokio::test]
async fn events_follow_the_job() {
    let harness =
        TestHarness::in_memory(vec![Arc::new(ScriptedBackend::text(OcrEngine::Doctr, "hi"))]);
    let mut events = harness.service.subscribe();

    let submitted = harness
        .service
        .submit(submission("a.png", "image/png", OcrEngine::Doctr), None)
        .unwrap();
    submitted.handle.wait().await;

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.job.id, event.log.job_id);
        statuses.push(event.job.status);
    }
    assert_eq!(
        statuses,
        vec![JobStatus::Queued, JobStatus::Processing, JobStatus::Completed]
    );
}

#[tokio::test]
async fn listing_counts_and_deletion() {
    let harness = TestHarness::in_memory(vec![
        Arc::new(ScriptedBackend::text(OcrEngine::Doctr, "text")),
        Arc::new(ScriptedBackend::unavailable(OcrEngine::Tesseract, "binary not found")),
    ]);

    let first = harness
        .service
        .submit(submission("one.png", "image/png", OcrEngine::Doctr), Some("alice"))
        .unwrap();
    first.handle.wait().await;
    let second = harness
        .service
        .submit(submission("two.png", "image/png", OcrEngine::Tesseract), Some("bob"))
        .unwrap();
    second.handle.wait().await;
    let third = harness
        .service
        .submit(submission("three.png", "image/png", OcrEngine::Doctr), Some("alice"))
        .unwrap();

    let all: Vec<String> = harness
        .service
        .list_jobs(None)
        .unwrap()
        .into_iter()
        .map(|j| j.file_name)
        .collect();
    assert_eq!(all, vec!["three.png", "two.png", "one.png"]);
    assert_eq!(harness.service.list_jobs(Some("alice")).unwrap().len(), 2);

    let counts = harness.service.counts().unwrap();
    assert_eq!((counts.queued, counts.completed, counts.failed), (1, 1, 1));

    assert!(matches!(
        harness.service.delete_job(&third.job.id),
        Err(OmniOcrError::Job(JobError::StillActive { .. }))
    ));
    harness.service.delete_job(&first.job.id).unwrap();
    assert!(matches!(
        harness.service.get_logs(&first.job.id),
        Err(OmniOcrError::Job(JobError::NotFound { .. }))
    ));
    third.handle.wait().await;
}

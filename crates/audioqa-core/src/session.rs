//! Single-user analysis session
//!
//! State machine for one dashboard session:
//!
//! ```text
//! Idle --upload--> FileUploaded --run--> Analyzing --+--> Complete
//!   ^                  ^                             |
//!   |                  +-------- upload -------------+--> Failed
//!   +------ clear (from any state but Analyzing) ----+
//! ```
//!
//! A run blocks the caller until all four runners return. The staged
//! temporary file is gone by the time `run` returns, on every path.

use crate::analysis::{run_analysis, Progress, ProgressSink, INITIALIZING_MESSAGE};
use crate::config::ThresholdTable;
use crate::metrics::LazySuite;
use crate::report::ReportTable;
use crate::upload::{UploadError, UploadedAudio};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No file uploaded
    Idle,
    /// File uploaded, no analysis run yet
    FileUploaded,
    /// Runners in progress
    Analyzing,
    /// Last run produced a report
    Complete,
    /// Last run aborted with an error
    Failed,
}

/// What the dashboard shows for a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisFailure {
    /// One-line error message
    pub message: String,
    /// Full error chain (and backtrace when captured)
    pub trace: String,
}

impl AnalysisFailure {
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            trace: format!("{err:?}"),
        }
    }
}

/// Errors returned by session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No audio file uploaded")]
    NoUpload,

    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Session data: the current upload and the outcome of its last run
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    upload: Option<UploadedAudio>,
    report: Option<ReportTable>,
    failure: Option<AnalysisFailure>,
    finished_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            upload: None,
            report: None,
            failure: None,
            finished_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn upload(&self) -> Option<&UploadedAudio> {
        self.upload.as_ref()
    }

    /// Report of the last successful run
    pub fn report(&self) -> Option<&ReportTable> {
        self.report.as_ref()
    }

    /// Error of the last failed run
    pub fn failure(&self) -> Option<&AnalysisFailure> {
        self.failure.as_ref()
    }

    /// When the last run ended, either way
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Accept a new upload, discarding any previous file and results
    pub fn upload_file(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<(), SessionError> {
        let upload = UploadedAudio::new(file_name, bytes)?;
        tracing::info!(file = %upload.file_name(), bytes = upload.len(), "Audio uploaded");

        self.upload = Some(upload);
        self.discard_results();
        self.state = SessionState::FileUploaded;
        Ok(())
    }

    /// Drop the upload and results, returning to Idle
    pub fn clear(&mut self) {
        if let Some(upload) = self.upload.take() {
            tracing::info!(file = %upload.file_name(), "Upload cleared");
        }
        self.discard_results();
        self.state = SessionState::Idle;
    }

    fn discard_results(&mut self) {
        self.report = None;
        self.failure = None;
        self.finished_at = None;
    }

    /// Analyse the current upload, blocking until the run ends
    ///
    /// Returns the resulting state, `Complete` or `Failed`. A panicking
    /// runner is reported as a failure like any other error.
    pub fn run(
        &mut self,
        suite: &mut LazySuite,
        thresholds: &ThresholdTable,
        progress: &dyn ProgressSink,
    ) -> Result<SessionState, SessionError> {
        let upload = self.upload.clone().ok_or(SessionError::NoUpload)?;

        self.discard_results();
        self.state = SessionState::Analyzing;
        tracing::info!(file = %upload.file_name(), "Analysis started");

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            analyze(&upload, suite, thresholds, progress)
        }))
        .unwrap_or_else(|panic| Err(anyhow!("Metric runner panicked: {}", panic_message(&*panic))));

        self.finished_at = Some(Utc::now());
        match outcome {
            Ok(report) => {
                let summary = report.summary();
                tracing::info!(
                    total = summary.total,
                    passed = summary.passed,
                    failed = summary.failed,
                    "Analysis complete"
                );
                self.report = Some(report);
                self.state = SessionState::Complete;
            }
            Err(err) => {
                tracing::error!(error = %err, "Analysis failed");
                self.failure = Some(AnalysisFailure::from_error(&err));
                self.state = SessionState::Failed;
            }
        }
        Ok(self.state)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn analyze(
    upload: &UploadedAudio,
    suite: &mut LazySuite,
    thresholds: &ThresholdTable,
    progress: &dyn ProgressSink,
) -> anyhow::Result<ReportTable> {
    progress.report(Progress::new(0, INITIALIZING_MESSAGE));
    let suite = suite
        .initialize()
        .map_err(|e| anyhow!("Failed to load metric modules: {e}"))?;

    // Removed when `staged` drops, including on error and unwind
    let staged = upload.persist()?;
    run_analysis(suite, staged.path(), thresholds, progress)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

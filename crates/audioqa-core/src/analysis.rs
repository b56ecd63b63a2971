//! Sequential analysis pipeline
//!
//! Runs the four metric runners one after another on the calling thread
//! and aggregates their scores. Progress advances in fixed 25% steps per
//! runner, not in proportion to runtime. The first runner error aborts
//! the remaining steps; no partial report is produced.

use crate::config::ThresholdTable;
use crate::metrics::{MetricOutput, MetricSuite};
use crate::report::ReportTable;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Status line shown while the metric suite loads
pub const INITIALIZING_MESSAGE: &str =
    "Initializing metrics... (This may take a minute on first run to download models)";

/// Status line shown once every runner has returned
pub const COMPLETE_MESSAGE: &str = "Analysis Complete!";

/// Progress reported as each runner starts, in suite order
const RUNNER_PROGRESS: [u8; 4] = [0, 25, 50, 75];

/// Progress step reported to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Percentage complete: 0, 25, 50, 75 or 100
    pub percent: u8,
    /// Status line, e.g. "Running SRMR..."
    pub message: String,
}

impl Progress {
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent,
            message: message.into(),
        }
    }
}

/// Receives progress updates during an analysis
pub trait ProgressSink {
    fn report(&self, progress: Progress);
}

impl<F: Fn(Progress)> ProgressSink for F {
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

/// Score `audio` with every runner in the suite and build the report
pub fn run_analysis(
    suite: &MetricSuite,
    audio: &Path,
    thresholds: &ThresholdTable,
    progress: &dyn ProgressSink,
) -> Result<ReportTable> {
    let mut scores: Vec<(String, Option<f64>)> = Vec::new();

    for (percent, runner) in RUNNER_PROGRESS.into_iter().zip(suite.runners()) {
        progress.report(Progress::new(
            percent,
            format!("Running {}...", runner.name()),
        ));

        let started = std::time::Instant::now();
        let output = runner
            .run(audio)
            .with_context(|| format!("{} metric failed", runner.name()))?;
        tracing::info!(
            metric = runner.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Metric finished"
        );

        match output {
            MetricOutput::Score(score) => scores.push((runner.name().to_string(), score)),
            MetricOutput::SubScores(subs) => scores.extend(subs),
        }
    }

    let report = ReportTable::from_scores(scores, thresholds);
    progress.report(Progress::new(100, COMPLETE_MESSAGE));
    Ok(report)
}

//! Result aggregation and CSV export
//!
//! Joins runner scores with the threshold table into a [`ReportTable`].
//! Pass/fail is decided on the raw score; the stored score is rounded to
//! [`SCORE_DECIMALS`](crate::SCORE_DECIMALS) places and that rounded value
//! is what both the dashboard and the CSV show.

use crate::config::ThresholdTable;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// CSV header row
pub const CSV_COLUMNS: [&str; 5] = ["Metric", "Description", "Your Threshold", "Score", "Result"];

/// Pass/fail verdict for one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
}

impl Status {
    /// A score passes only when both it and a threshold exist and score >= threshold
    pub fn evaluate(score: Option<f64>, threshold: Option<f64>) -> Self {
        match (score, threshold) {
            (Some(s), Some(t)) if s >= t => Status::Pass,
            _ => Status::Fail,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    pub metric: String,
    pub description: String,
    pub threshold: Option<f64>,
    /// Rounded score; `None` when the runner produced no usable value
    pub score: Option<f64>,
    pub status: Status,
}

impl MetricResult {
    /// Evaluate a raw score against the table
    ///
    /// Non-finite scores are treated as absent.
    pub fn evaluate(metric: &str, score: Option<f64>, thresholds: &ThresholdTable) -> Self {
        let score = score.filter(|s| s.is_finite());
        let threshold = thresholds.threshold(metric);
        Self {
            metric: metric.to_string(),
            description: thresholds.description(metric).unwrap_or_default().to_string(),
            threshold,
            score: score.map(round_score),
            status: Status::evaluate(score, threshold),
        }
    }
}

/// Pass/fail counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Ordered report rows, in runner invocation order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportTable {
    rows: Vec<MetricResult>,
}

impl ReportTable {
    /// Build the table from `(metric, raw score)` pairs
    pub fn from_scores<I, S>(scores: I, thresholds: &ThresholdTable) -> Self
    where
        I: IntoIterator<Item = (S, Option<f64>)>,
        S: AsRef<str>,
    {
        let rows = scores
            .into_iter()
            .map(|(metric, score)| MetricResult::evaluate(metric.as_ref(), score, thresholds))
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[MetricResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self) -> Summary {
        let passed = self
            .rows
            .iter()
            .filter(|r| r.status == Status::Pass)
            .count();
        Summary {
            total: self.rows.len(),
            passed,
            failed: self.rows.len() - passed,
        }
    }

    /// Render as UTF-8 CSV with a header row and `\n` line endings
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&CSV_COLUMNS.join(","));
        out.push('\n');

        for row in &self.rows {
            let fields = [
                csv_field(&row.metric),
                csv_field(&row.description),
                Cow::Owned(format_optional(row.threshold)),
                Cow::Owned(format_optional(row.score)),
                Cow::Borrowed(row.status.as_str()),
            ];
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }
}

/// Round to the displayed precision
pub fn round_score(score: f64) -> f64 {
    let scale = 10f64.powi(crate::SCORE_DECIMALS);
    (score * scale).round() / scale
}

/// Shortest round-trip form, always with a fractional part (`8.0`, `0.55`)
pub fn format_score(value: f64) -> String {
    format!("{value:?}")
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_score).unwrap_or_default()
}

/// Quote a field when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

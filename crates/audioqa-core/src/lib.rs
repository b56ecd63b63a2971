//! Audioqa Core - Threshold configuration, metric runners and reporting
//!
//! This library holds everything behind the audio quality dashboard except
//! the web layer: the administrator threshold table, the contract for the
//! external metric programs (SRMR, SigMOS, VQScore, WVMOS), the
//! pass/fail aggregation and CSV export, and the single-session state
//! machine that ties an uploaded file to an analysis run.

pub mod analysis;
pub mod config;
pub mod metrics;
pub mod report;
pub mod session;
pub mod upload;

pub use analysis::{run_analysis, Progress, ProgressSink};
pub use config::{QualityConfig, ThresholdTable};
pub use metrics::{LazySuite, MetricOutput, MetricRunner, MetricSuite, SuiteLoader};
pub use report::{MetricResult, ReportTable, Status, Summary};
pub use session::{Session, SessionState};
pub use upload::{TempAudio, UploadedAudio};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Fixed filename offered for the CSV report download
pub const REPORT_FILE_NAME: &str = "audio_analysis_report.csv";

/// Decimal places kept for displayed and exported scores
pub const SCORE_DECIMALS: i32 = 3;

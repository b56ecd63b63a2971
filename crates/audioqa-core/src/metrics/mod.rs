//! Metric runner contract
//!
//! The quality models themselves are external programs. This module
//! defines what the dashboard expects of them:
//! - [`MetricRunner`]: audio path in, score or named sub-scores out
//! - [`MetricSuite`]: the fixed battery, in invocation order
//! - [`SuiteLoader`] / [`LazySuite`]: the initialization step; success is
//!   kept for the life of the process, failure is retried on the next run
//!
//! The production runners live in [`command`].

pub mod command;

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Row name for the SRMR runner
pub const SRMR: &str = "SRMR";
/// Display name for the multi-output SigMOS runner
pub const SIGMOS: &str = "SigMOS";
/// Row name for the VQScore runner
pub const VQSCORE: &str = "VQScore";
/// Row name for the WVMOS runner
pub const WVMOS: &str = "WVMOS";

/// Output of one metric runner
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutput {
    /// A single score; `None` when the model produced nothing usable
    Score(Option<f64>),
    /// Named sub-scores in the order the model returned them
    SubScores(Vec<(String, Option<f64>)>),
}

/// An external quality model invoked on a file path
pub trait MetricRunner: Send {
    /// Metric name; single-score runners use it as the report row name
    fn name(&self) -> &str;

    /// Score the audio file at `path`
    fn run(&self, path: &Path) -> anyhow::Result<MetricOutput>;
}

/// The four runners, always invoked as SRMR, SigMOS, VQScore, WVMOS
pub struct MetricSuite {
    srmr: Box<dyn MetricRunner>,
    sigmos: Box<dyn MetricRunner>,
    vqscore: Box<dyn MetricRunner>,
    wvmos: Box<dyn MetricRunner>,
}

impl MetricSuite {
    pub fn new(
        srmr: Box<dyn MetricRunner>,
        sigmos: Box<dyn MetricRunner>,
        vqscore: Box<dyn MetricRunner>,
        wvmos: Box<dyn MetricRunner>,
    ) -> Self {
        Self {
            srmr,
            sigmos,
            vqscore,
            wvmos,
        }
    }

    /// Runners in invocation order
    pub fn runners(&self) -> [&dyn MetricRunner; 4] {
        [
            self.srmr.as_ref(),
            self.sigmos.as_ref(),
            self.vqscore.as_ref(),
            self.wvmos.as_ref(),
        ]
    }
}

impl std::fmt::Debug for MetricSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.runners().iter().map(|r| r.name()))
            .finish()
    }
}

/// Errors that stop the metric suite from loading
#[derive(Error, Debug)]
pub enum InitError {
    #[error("{metric} program not found: {program}")]
    ProgramNotFound { metric: String, program: String },

    #[error("Metric working directory does not exist: {0}")]
    WorkingDirMissing(PathBuf),
}

/// Builds a [`MetricSuite`], possibly slowly (model downloads, imports)
pub trait SuiteLoader: Send {
    fn load(&self) -> Result<MetricSuite, InitError>;
}

/// Initialization state reported to the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum InitStatus {
    /// No analysis has been requested yet
    Pending,
    /// All four runners are available
    Ready,
    /// Last load attempt failed; analyses halt before scoring
    Failed(String),
}

/// Metric suite that is loaded on first use
///
/// Loading is deferred so the server starts immediately. A successful
/// load is kept for the life of the process; a failed one is recorded for
/// display and retried on the next call.
pub struct LazySuite {
    loader: Box<dyn SuiteLoader>,
    suite: Option<MetricSuite>,
    last_error: Option<String>,
}

impl LazySuite {
    pub fn new(loader: Box<dyn SuiteLoader>) -> Self {
        Self {
            loader,
            suite: None,
            last_error: None,
        }
    }

    /// Return the loaded suite, loading it if no earlier call succeeded
    pub fn initialize(&mut self) -> Result<&MetricSuite, InitError> {
        let suite = match self.suite.take() {
            Some(suite) => suite,
            None => {
                tracing::info!("Initializing metric runners");
                match self.loader.load() {
                    Ok(suite) => {
                        tracing::info!(runners = ?suite, "Metric runners ready");
                        self.last_error = None;
                        suite
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Metric runners failed to load");
                        self.last_error = Some(e.to_string());
                        return Err(e);
                    }
                }
            }
        };
        Ok(self.suite.insert(suite))
    }

    pub fn status(&self) -> InitStatus {
        match (&self.suite, &self.last_error) {
            (Some(_), _) => InitStatus::Ready,
            (None, Some(error)) => InitStatus::Failed(error.clone()),
            (None, None) => InitStatus::Pending,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runners shared by the core test modules

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Runner returning a fixed output and recording the paths it saw
    pub struct FixedRunner {
        pub name: String,
        pub output: Result<MetricOutput, String>,
        pub seen: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl MetricRunner for FixedRunner {
        fn name(&self) -> &str {
            &self.name
        }

        fn run(&self, path: &Path) -> anyhow::Result<MetricOutput> {
            assert!(path.exists(), "runner called with a missing file");
            self.seen.lock().unwrap().push(path.to_path_buf());
            self.output.clone().map_err(|msg| anyhow::anyhow!(msg))
        }
    }

    pub fn fixed(
        name: &str,
        output: Result<MetricOutput, String>,
        seen: &Arc<Mutex<Vec<PathBuf>>>,
    ) -> Box<dyn MetricRunner> {
        Box::new(FixedRunner {
            name: name.to_string(),
            output,
            seen: Arc::clone(seen),
        })
    }

    /// Suite producing SRMR=9.5, SIGMOS_OVRL=3.2, VQScore=0.55, WVMOS=3.0
    pub fn reference_suite(seen: &Arc<Mutex<Vec<PathBuf>>>) -> MetricSuite {
        MetricSuite::new(
            fixed(SRMR, Ok(MetricOutput::Score(Some(9.5))), seen),
            fixed(
                SIGMOS,
                Ok(MetricOutput::SubScores(vec![(
                    "SIGMOS_OVRL".to_string(),
                    Some(3.2),
                )])),
                seen,
            ),
            fixed(VQSCORE, Ok(MetricOutput::Score(Some(0.55))), seen),
            fixed(WVMOS, Ok(MetricOutput::Score(Some(3.0))), seen),
        )
    }

    /// Suite whose VQScore runner fails
    pub fn failing_suite(seen: &Arc<Mutex<Vec<PathBuf>>>) -> MetricSuite {
        MetricSuite::new(
            fixed(SRMR, Ok(MetricOutput::Score(Some(9.5))), seen),
            fixed(SIGMOS, Ok(MetricOutput::SubScores(Vec::new())), seen),
            fixed(VQSCORE, Err("model weights corrupted".to_string()), seen),
            fixed(WVMOS, Ok(MetricOutput::Score(Some(3.0))), seen),
        )
    }

    /// Loader handing out a fresh suite built by `build`, counting calls
    pub struct FnLoader<F> {
        pub build: F,
        pub calls: Arc<AtomicUsize>,
    }

    impl<F> SuiteLoader for FnLoader<F>
    where
        F: Fn() -> Result<MetricSuite, InitError> + Send,
    {
        fn load(&self) -> Result<MetricSuite, InitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.build)()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_suite_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let suite = reference_suite(&seen);
        let names: Vec<&str> = suite.runners().iter().map(|r| r.name()).collect();
        assert_eq!(names, [SRMR, SIGMOS, VQSCORE, WVMOS]);
        assert_eq!(format!("{suite:?}"), r#"["SRMR", "SigMOS", "VQScore", "WVMOS"]"#);
    }

    #[test]
    fn test_lazy_suite_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let loader = FnLoader {
            build: move || -> Result<MetricSuite, InitError> { Ok(reference_suite(&seen)) },
            calls: Arc::clone(&calls),
        };
        let mut lazy = LazySuite::new(Box::new(loader));

        assert_eq!(lazy.status(), InitStatus::Pending);
        assert!(lazy.initialize().is_ok());
        assert!(lazy.initialize().is_ok());
        assert_eq!(lazy.status(), InitStatus::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_suite_retries_after_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let attempts = Arc::clone(&calls);
        // Fails until the program is "installed" on the second attempt
        let loader = FnLoader {
            build: move || -> Result<MetricSuite, InitError> {
                if attempts.load(Ordering::SeqCst) < 2 {
                    Err(InitError::ProgramNotFound {
                        metric: SRMR.to_string(),
                        program: "srmr-model".to_string(),
                    })
                } else {
                    Ok(reference_suite(&seen))
                }
            },
            calls: Arc::clone(&calls),
        };
        let mut lazy = LazySuite::new(Box::new(loader));

        let err = lazy.initialize().unwrap_err();
        assert_eq!(err.to_string(), "SRMR program not found: srmr-model");
        assert_eq!(
            lazy.status(),
            InitStatus::Failed("SRMR program not found: srmr-model".to_string())
        );

        assert!(lazy.initialize().is_ok());
        assert_eq!(lazy.status(), InitStatus::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Success is kept
        assert!(lazy.initialize().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_init_status_serializes() {
        let json = serde_json::to_string(&InitStatus::Failed("boom".to_string())).unwrap();
        assert_eq!(json, r#"{"state":"failed","error":"boom"}"#);
        let json = serde_json::to_string(&InitStatus::Ready).unwrap();
        assert_eq!(json, r#"{"state":"ready"}"#);
    }
}

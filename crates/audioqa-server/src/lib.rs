//! Audioqa Web Server - Axum + Leptos SSR
//!
//! Serves the audio quality dashboard: upload a recording, run the metric
//! battery, read the pass/fail table and download it as CSV.
//!
//! The session and metric runners are owned by a single analysis thread.
//! Handlers reach it through [`AnalysisHandle`]; commands are served in
//! order, so a request sent during an analysis waits for it to finish.

pub mod api;
pub mod ui;
pub mod ws;

use audioqa_core::config::ThresholdTable;
use audioqa_core::metrics::{InitStatus, LazySuite, SuiteLoader};
use audioqa_core::report::ReportTable;
use audioqa_core::session::{AnalysisFailure, Session, SessionError, SessionState};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use ws::ProgressFeed;

/// Commands sent to the analysis thread
pub enum AnalysisCommand {
    Upload {
        file_name: String,
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<SessionSnapshot, SessionError>>,
    },
    Clear {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Run {
        reply: oneshot::Sender<Result<SessionSnapshot, SessionError>>,
    },
    GetSnapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    GetAudio {
        reply: oneshot::Sender<Option<AudioClip>>,
    },
}

/// Session snapshot (safe to send between threads)
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub file_name: Option<String>,
    pub file_size: usize,
    pub report: Option<ReportTable>,
    pub failure: Option<AnalysisFailure>,
    pub finished_at: Option<DateTime<Utc>>,
    pub metrics: InitStatus,
}

impl SessionSnapshot {
    fn capture(session: &Session, suite: &LazySuite) -> Self {
        Self {
            state: session.state(),
            file_name: session.upload().map(|u| u.file_name().to_string()),
            file_size: session.upload().map(|u| u.len()).unwrap_or(0),
            report: session.report().cloned(),
            failure: session.failure().cloned(),
            finished_at: session.finished_at(),
            metrics: suite.status(),
        }
    }
}

/// Uploaded audio for the browser player
#[derive(Clone, Debug)]
pub struct AudioClip {
    pub mime_type: &'static str,
    pub bytes: Arc<[u8]>,
}

/// Errors returned by [`AnalysisHandle`]
#[derive(Error, Debug)]
pub enum HandleError {
    #[error("Analysis thread died")]
    WorkerGone,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Handle to communicate with the analysis thread
#[derive(Clone)]
pub struct AnalysisHandle {
    tx: mpsc::Sender<AnalysisCommand>,
}

impl AnalysisHandle {
    /// Spawn the analysis thread and return a handle
    pub fn spawn(
        loader: Box<dyn SuiteLoader>,
        thresholds: Arc<ThresholdTable>,
        progress: ProgressFeed,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<AnalysisCommand>(32);

        std::thread::spawn(move || {
            let mut session = Session::new();
            let mut suite = LazySuite::new(loader);

            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    AnalysisCommand::Upload {
                        file_name,
                        bytes,
                        reply,
                    } => {
                        let result = session.upload_file(&file_name, bytes).map(|()| {
                            progress.clear();
                            SessionSnapshot::capture(&session, &suite)
                        });
                        let _ = reply.send(result);
                    }
                    AnalysisCommand::Clear { reply } => {
                        session.clear();
                        progress.clear();
                        let _ = reply.send(SessionSnapshot::capture(&session, &suite));
                    }
                    AnalysisCommand::Run { reply } => {
                        let result = session
                            .run(&mut suite, &thresholds, &progress)
                            .map(|_| SessionSnapshot::capture(&session, &suite));
                        let _ = reply.send(result);
                    }
                    AnalysisCommand::GetSnapshot { reply } => {
                        let _ = reply.send(SessionSnapshot::capture(&session, &suite));
                    }
                    AnalysisCommand::GetAudio { reply } => {
                        let _ = reply.send(session.upload().map(|u| AudioClip {
                            mime_type: u.mime_type(),
                            bytes: u.bytes(),
                        }));
                    }
                }
            }

            tracing::debug!("Analysis thread exiting");
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> AnalysisCommand,
    ) -> Result<T, HandleError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| HandleError::WorkerGone)?;
        rx.await.map_err(|_| HandleError::WorkerGone)
    }

    /// Replace the current upload
    pub async fn upload(
        &self,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<SessionSnapshot, HandleError> {
        Ok(self
            .request(|reply| AnalysisCommand::Upload {
                file_name,
                bytes,
                reply,
            })
            .await??)
    }

    /// Drop the upload and any results
    pub async fn clear(&self) -> Result<SessionSnapshot, HandleError> {
        self.request(|reply| AnalysisCommand::Clear { reply }).await
    }

    /// Run the full analysis; resolves once every runner has returned
    pub async fn run(&self) -> Result<SessionSnapshot, HandleError> {
        Ok(self.request(|reply| AnalysisCommand::Run { reply }).await??)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, HandleError> {
        self.request(|reply| AnalysisCommand::GetSnapshot { reply })
            .await
    }

    pub async fn audio(&self) -> Result<Option<AudioClip>, HandleError> {
        self.request(|reply| AnalysisCommand::GetAudio { reply })
            .await
    }
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the analysis thread
    pub analysis: AnalysisHandle,
    /// Administrator thresholds, read-only
    pub thresholds: Arc<ThresholdTable>,
    /// Progress broadcast for WebSocket clients
    pub progress: ProgressFeed,
    /// Server configuration
    pub config: ServerConfig,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8501,
            bind_addr: "0.0.0.0".to_string(),
        }
    }
}

impl AppState {
    /// Create the state and spawn the analysis thread
    pub fn new(
        loader: Box<dyn SuiteLoader>,
        thresholds: ThresholdTable,
        config: ServerConfig,
    ) -> Self {
        let thresholds = Arc::new(thresholds);
        let progress = ProgressFeed::new();
        let analysis = AnalysisHandle::spawn(loader, Arc::clone(&thresholds), progress.clone());
        Self {
            analysis,
            thresholds,
            progress,
            config,
        }
    }
}

/// Build the Axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Leptos SSR page
        .route("/", get(ui::dashboard::dashboard_page))
        // REST API
        .route("/api/v1/status", get(api::get_status))
        .route("/api/v1/thresholds", get(api::get_thresholds))
        .route(
            "/api/v1/upload",
            post(api::upload_audio).delete(api::clear_upload),
        )
        .route("/api/v1/upload/audio", get(api::get_audio))
        .route("/api/v1/analysis", post(api::run_analysis))
        .route("/api/v1/report", get(api::get_report))
        .route("/api/v1/report.csv", get(api::download_report))
        // WebSocket
        .route("/api/v1/ws", get(ws::ws_handler))
        // No size limit on uploads
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the web server
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind_addr, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Audioqa web server listening");
    serve(listener, state).await
}

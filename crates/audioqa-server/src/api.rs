//! REST API endpoints for audioqa
//!
//! All endpoints are under /api/v1/. Everything returns JSON except the
//! audio playback and CSV download routes.

use crate::{AppState, HandleError, SessionSnapshot};
use audioqa_core::config::MetricStandard;
use audioqa_core::metrics::InitStatus;
use audioqa_core::report::{MetricResult, Summary};
use audioqa_core::session::{SessionError, SessionState};
use audioqa_core::REPORT_FILE_NAME;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

/// Multipart field carrying the audio file
pub const UPLOAD_FIELD: &str = "file";

/// Application status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub build_date: String,
    pub state: SessionState,
    pub file_name: Option<String>,
    pub file_size: usize,
    pub metrics: InitStatus,
    /// Present once a run has produced a report
    pub summary: Option<Summary>,
    /// RFC 3339 time the last run finished
    pub finished_at: Option<String>,
}

impl StatusResponse {
    fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            version: audioqa_core::VERSION.to_string(),
            build_date: audioqa_core::BUILD_DATE.to_string(),
            state: snapshot.state,
            file_name: snapshot.file_name,
            file_size: snapshot.file_size,
            metrics: snapshot.metrics,
            summary: snapshot.report.as_ref().map(|r| r.summary()),
            finished_at: snapshot.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Completed analysis
#[derive(Serialize)]
pub struct ReportResponse {
    pub summary: Summary,
    pub rows: Vec<MetricResult>,
    pub finished_at: Option<String>,
}

/// Failed analysis
#[derive(Serialize)]
pub struct FailureResponse {
    pub message: String,
    pub trace: String,
}

fn handle_error(e: HandleError) -> (StatusCode, String) {
    let status = match &e {
        HandleError::WorkerGone => StatusCode::INTERNAL_SERVER_ERROR,
        HandleError::Session(SessionError::NoUpload) => StatusCode::CONFLICT,
        HandleError::Session(SessionError::Upload(_)) => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}

/// Report body for a snapshot, `None` if the last run produced none
fn report_response(snapshot: &SessionSnapshot) -> Option<ReportResponse> {
    let report = snapshot.report.as_ref()?;
    Some(ReportResponse {
        summary: report.summary(),
        rows: report.rows().to_vec(),
        finished_at: snapshot.finished_at.map(|t| t.to_rfc3339()),
    })
}

/// GET /api/v1/status
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let snapshot = state.analysis.snapshot().await.map_err(handle_error)?;
    Ok(Json(StatusResponse::from_snapshot(snapshot)))
}

/// GET /api/v1/thresholds
pub async fn get_thresholds(State(state): State<AppState>) -> Json<Vec<MetricStandard>> {
    Json(state.thresholds.entries().to_vec())
}

/// POST /api/v1/upload
///
/// Accepts a multipart form with a single `file` field. Replaces any
/// previous upload and discards its results.
pub async fn upload_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e)))?;

        let snapshot = state
            .analysis
            .upload(file_name, bytes.to_vec())
            .await
            .map_err(handle_error)?;
        return Ok(Json(StatusResponse::from_snapshot(snapshot)));
    }

    Err((
        StatusCode::BAD_REQUEST,
        format!("Missing multipart field: {}", UPLOAD_FIELD),
    ))
}

/// DELETE /api/v1/upload
pub async fn clear_upload(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let snapshot = state.analysis.clear().await.map_err(handle_error)?;
    Ok(Json(StatusResponse::from_snapshot(snapshot)))
}

/// GET /api/v1/upload/audio
///
/// Raw bytes of the current upload for the dashboard's audio player.
pub async fn get_audio(State(state): State<AppState>) -> Result<Response, (StatusCode, String)> {
    let clip = state
        .analysis
        .audio()
        .await
        .map_err(handle_error)?
        .ok_or((StatusCode::NOT_FOUND, "No audio file uploaded".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, clip.mime_type),
            (header::CACHE_CONTROL, "no-store"),
        ],
        clip.bytes.to_vec(),
    )
        .into_response())
}

/// POST /api/v1/analysis
///
/// Runs every metric on the current upload and waits for the outcome.
/// Progress is pushed over the WebSocket while this request is pending.
pub async fn run_analysis(State(state): State<AppState>) -> Result<Response, (StatusCode, String)> {
    let snapshot = state.analysis.run().await.map_err(handle_error)?;

    if let Some(report) = report_response(&snapshot) {
        return Ok(Json(report).into_response());
    }

    let failure = snapshot.failure.map_or_else(
        || FailureResponse {
            message: "Analysis produced no report".to_string(),
            trace: String::new(),
        },
        |f| FailureResponse {
            message: f.message,
            trace: f.trace,
        },
    );
    Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(failure)).into_response())
}

/// GET /api/v1/report
pub async fn get_report(
    State(state): State<AppState>,
) -> Result<Json<ReportResponse>, (StatusCode, String)> {
    let snapshot = state.analysis.snapshot().await.map_err(handle_error)?;
    report_response(&snapshot)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "No report available".to_string()))
}

/// GET /api/v1/report.csv
pub async fn download_report(
    State(state): State<AppState>,
) -> Result<Response, (StatusCode, String)> {
    let snapshot = state.analysis.snapshot().await.map_err(handle_error)?;
    let report = snapshot
        .report
        .ok_or((StatusCode::NOT_FOUND, "No report available".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", REPORT_FILE_NAME),
            ),
        ],
        report.to_csv(),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use crate::testing::{MissingLoader, ScriptedLoader};
    use crate::{build_router, AppState, ServerConfig};
    use audioqa_core::config::QualityConfig;
    use audioqa_core::metrics::SuiteLoader;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "audioqa-test-boundary";

    fn app(loader: impl SuiteLoader + 'static) -> Router {
        let state = AppState::new(
            Box::new(loader),
            QualityConfig::default().thresholds,
            ServerConfig::default(),
        );
        build_router(state)
    }

    fn upload_request(file_name: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
        resp.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(resp).await).unwrap()
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let app = app(ScriptedLoader {
            fail_vqscore: false,
        });

        let resp = app
            .oneshot(request(Method::GET, "/api/v1/status"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["state"], "idle");
        assert_eq!(json["metrics"]["state"], "pending");
        assert!(json["file_name"].is_null());
        assert!(json["summary"].is_null());
    }

    #[tokio::test]
    async fn test_thresholds_listed_in_order() {
        let app = app(ScriptedLoader {
            fail_vqscore: false,
        });

        let resp = app
            .oneshot(request(Method::GET, "/api/v1/thresholds"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            [
                "SRMR",
                "SIGMOS_DISC",
                "SIGMOS_OVRL",
                "SIGMOS_REVERB",
                "VQScore",
                "WVMOS"
            ]
        );
        assert_eq!(json[0]["min_score"], 8.0);
    }

    #[tokio::test]
    async fn test_upload_run_and_download() {
        let app = app(ScriptedLoader {
            fail_vqscore: false,
        });

        let resp = app
            .clone()
            .oneshot(upload_request("take1.wav", b"RIFF fake wave"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["state"], "file_uploaded");
        assert_eq!(json["file_name"], "take1.wav");
        assert_eq!(json["file_size"], 14);

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/v1/analysis"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["summary"]["total"], 4);
        assert_eq!(json["summary"]["passed"], 3);
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["rows"][2]["metric"], "VQScore");
        assert_eq!(json["rows"][2]["status"], "FAIL");

        let resp = app
            .clone()
            .oneshot(request(Method::GET, "/api/v1/report.csv"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"audio_analysis_report.csv\""
        );
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
        let csv = String::from_utf8(body_bytes(resp).await).unwrap();
        let expected = "\
Metric,Description,Your Threshold,Score,Result
SRMR,Technical measurement of reverberation and room acoustics,8.0,9.5,PASS
SIGMOS_OVRL,Comprehensive overall audio quality,3.0,3.2,PASS
VQScore,Overall voice quality assessment,0.6,0.55,FAIL
WVMOS,Predicted subjective quality rating,2.5,3.0,PASS
";
        assert_eq!(csv, expected);

        let resp = app
            .oneshot(request(Method::GET, "/api/v1/status"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["state"], "complete");
        assert_eq!(json["metrics"]["state"], "ready");
        assert!(json["finished_at"].is_string());
    }

    #[tokio::test]
    async fn test_run_without_upload_conflicts() {
        let app = app(ScriptedLoader {
            fail_vqscore: false,
        });

        let resp = app
            .oneshot(request(Method::POST, "/api/v1/analysis"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_rejects_unsupported_extension() {
        let app = app(ScriptedLoader {
            fail_vqscore: false,
        });

        let resp = app
            .clone()
            .oneshot(upload_request("notes.txt", b"hello"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(request(Method::GET, "/api/v1/status"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["state"], "idle");
    }

    #[tokio::test]
    async fn test_runner_failure_reports_trace() {
        let app = app(ScriptedLoader { fail_vqscore: true });

        app.clone()
            .oneshot(upload_request("take1.flac", b"fLaC"))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/v1/analysis"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "VQScore metric failed");
        assert!(json["trace"]
            .as_str()
            .unwrap()
            .contains("model weights corrupted"));

        let resp = app
            .clone()
            .oneshot(request(Method::GET, "/api/v1/report"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(request(Method::GET, "/api/v1/report.csv"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_init_failure_is_reported() {
        let app = app(MissingLoader);

        app.clone()
            .oneshot(upload_request("take1.mp3", b"ID3"))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/v1/analysis"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("Failed to load metric modules"));

        let resp = app
            .oneshot(request(Method::GET, "/api/v1/status"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["state"], "failed");
        assert_eq!(json["metrics"]["state"], "failed");
    }

    #[tokio::test]
    async fn test_audio_playback_and_clear() {
        let app = app(ScriptedLoader {
            fail_vqscore: false,
        });

        app.clone()
            .oneshot(upload_request("Take1.WAV", b"RIFF"))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(request(Method::GET, "/api/v1/upload/audio"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "audio/wav");
        assert_eq!(body_bytes(resp).await, b"RIFF");

        let resp = app
            .clone()
            .oneshot(request(Method::DELETE, "/api/v1/upload"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["state"], "idle");

        let resp = app
            .oneshot(request(Method::GET, "/api/v1/upload/audio"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_security_headers() {
        let app = app(ScriptedLoader {
            fail_vqscore: false,
        });

        let resp = app
            .oneshot(request(Method::GET, "/api/v1/status"))
            .await
            .unwrap();
        assert_eq!(resp.headers()[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(resp.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }
}

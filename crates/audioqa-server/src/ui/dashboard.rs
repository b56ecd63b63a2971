//! Dashboard page - Leptos SSR
//!
//! Single page: threshold sidebar, upload and playback, run controls,
//! progress, and the outcome of the last analysis.

use super::components::failure_panel::FailurePanel;
use super::components::results_table::ResultsTable;
use super::components::summary_bar::SummaryBar;
use super::components::threshold_table::ThresholdTable;
use super::{escape_script_tag, DASHBOARD_SCRIPT, DASHBOARD_STYLES};
use crate::{AppState, SessionSnapshot};
use audioqa_core::config::MetricStandard;
use audioqa_core::metrics::InitStatus;
use audioqa_core::upload::ACCEPTED_EXTENSIONS;
use audioqa_core::REPORT_FILE_NAME;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use leptos::prelude::*;
use reactive_graph::owner::Owner;

/// Dashboard page component
#[component]
fn DashboardPage(snapshot: SessionSnapshot, thresholds: Vec<MetricStandard>) -> impl IntoView {
    let SessionSnapshot {
        state,
        file_name,
        file_size,
        report,
        failure,
        finished_at,
        metrics,
    } = snapshot;

    let accept = ACCEPTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",");

    let metrics_warning = match metrics {
        InitStatus::Failed(error) => Some(view! {
            <p class="metrics-warning">{format!("Failed to load metric modules: {error}")}</p>
        }),
        InitStatus::Pending | InitStatus::Ready => None,
    };

    let upload_panel = file_name.map(|name| {
        view! {
            <section class="upload-info" id="upload-info">
                <p class="file-name">
                    <strong>{name}</strong>
                    {format!(" ({} KB)", file_size.div_ceil(1024))}
                </p>
                <audio controls="controls" preload="metadata" src="/api/v1/upload/audio"></audio>
                <div class="controls">
                    <button id="run-btn" class="btn btn-primary">"Run Analysis"</button>
                    <button id="clear-btn" class="btn">"Clear"</button>
                </div>
            </section>
        }
    });

    let results = report.map(|report| {
        let finished = finished_at
            .map(|t| format!("Finished {}", t.format("%Y-%m-%d %H:%M:%S UTC")))
            .unwrap_or_default();
        view! {
            <section class="results" id="results">
                <SummaryBar summary=report.summary()/>
                <h2>"Detailed Analysis"</h2>
                <p class="finished-at">{finished}</p>
                <ResultsTable rows=report.rows().to_vec()/>
                <a
                    id="download-csv"
                    class="btn btn-primary"
                    href="/api/v1/report.csv"
                    download=REPORT_FILE_NAME
                >
                    "Download Report CSV"
                </a>
            </section>
        }
    });

    let failure = failure.map(|failure| view! { <FailurePanel failure=failure/> });

    view! {
        <html lang="en">
            <head>
                <meta charset="utf-8"/>
                <meta name="viewport" content="width=device-width, initial-scale=1.0"/>
                <meta http-equiv="Content-Security-Policy" content="default-src 'self'; script-src 'unsafe-inline'; style-src 'unsafe-inline'; connect-src 'self' ws: wss:; media-src 'self';"/>
                <title>"Audio Quality Analytics"</title>
                <style inner_html=DASHBOARD_STYLES></style>
            </head>
            <body>
                <aside class="sidebar">
                    <h2>"Metric Standards"</h2>
                    <h3>"Passing Criteria"</h3>
                    <p class="info">"These thresholds are set by the administrator."</p>
                    <ThresholdTable entries=thresholds/>
                </aside>
                <main id="main" data-state=format!("{state:?}")>
                    <header class="header">
                        <h1>"Audio Quality Analytics"</h1>
                        <p class="intro">
                            "Upload an audio file to analyze its quality. The system will evaluate it against the "
                            <strong>"Admin Configured Thresholds"</strong>
                            " on the left."
                        </p>
                    </header>
                    {metrics_warning}
                    <section class="upload">
                        <label for="file-input">"Choose an audio file"</label>
                        <input type="file" id="file-input" name="file" accept=accept/>
                        <p class="upload-error" id="upload-error" style="display:none"></p>
                    </section>
                    {upload_panel}
                    <section class="progress" id="progress" style="display:none">
                        <div class="progress-track">
                            <div class="progress-fill" id="progress-fill"></div>
                        </div>
                        <p class="progress-text" id="progress-text"></p>
                    </section>
                    {results}
                    {failure}
                </main>
                <script inner_html=escape_script_tag(DASHBOARD_SCRIPT)></script>
            </body>
        </html>
    }
}

/// Render the page for a snapshot
pub fn render_dashboard(snapshot: SessionSnapshot, thresholds: Vec<MetricStandard>) -> String {
    let owner = Owner::new_root(None);
    let html = owner.with(|| {
        view! { <DashboardPage snapshot=snapshot thresholds=thresholds/> }
            .into_view()
            .to_html()
    });
    format!("<!DOCTYPE html>{html}")
}

/// Axum handler for the dashboard page
pub async fn dashboard_page(
    State(state): State<AppState>,
) -> Result<Html<String>, (StatusCode, String)> {
    let snapshot = state
        .analysis
        .snapshot()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Html(render_dashboard(
        snapshot,
        state.thresholds.entries().to_vec(),
    )))
}

//! Detailed per-metric results

use audioqa_core::report::{format_score, MetricResult, Status};
use leptos::prelude::*;

/// Report rows in runner order; the Result cell is coloured by status
#[component]
pub fn ResultsTable(rows: Vec<MetricResult>) -> impl IntoView {
    let rows = rows
        .into_iter()
        .map(|row| {
            let status_class = match row.status {
                Status::Pass => "result pass",
                Status::Fail => "result fail",
            };
            view! {
                <tr>
                    <td>{row.metric}</td>
                    <td>{row.description}</td>
                    <td class="numeric">{row.threshold.map(format_score).unwrap_or_default()}</td>
                    <td class="numeric">{row.score.map(format_score).unwrap_or_default()}</td>
                    <td class=status_class>{row.status.as_str()}</td>
                </tr>
            }
        })
        .collect_view();

    view! {
        <table class="results-table" id="results-table">
            <thead>
                <tr>
                    <th>"Metric"</th>
                    <th>"Description"</th>
                    <th>"Your Threshold"</th>
                    <th>"Score"</th>
                    <th>"Result"</th>
                </tr>
            </thead>
            <tbody>{rows}</tbody>
        </table>
    }
}

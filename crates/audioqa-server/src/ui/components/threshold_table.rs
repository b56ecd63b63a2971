//! Sidebar table of administrator thresholds

use audioqa_core::config::MetricStandard;
use audioqa_core::report::format_score;
use leptos::prelude::*;

#[component]
pub fn ThresholdTable(entries: Vec<MetricStandard>) -> impl IntoView {
    let rows = entries
        .into_iter()
        .map(|entry| {
            let min_score = entry.min_score.map(format_score).unwrap_or_default();
            view! {
                <tr title=entry.description>
                    <td>{entry.name}</td>
                    <td class="numeric">{min_score}</td>
                </tr>
            }
        })
        .collect_view();

    view! {
        <table class="threshold-table" id="threshold-table">
            <thead>
                <tr>
                    <th>"Metric"</th>
                    <th>"Min Score"</th>
                </tr>
            </thead>
            <tbody>{rows}</tbody>
        </table>
    }
}

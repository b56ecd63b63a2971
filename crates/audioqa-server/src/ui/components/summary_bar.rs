//! Summary bar component showing pass/fail counts

use audioqa_core::report::Summary;
use leptos::prelude::*;

/// Total checks, passed and failed for the last report
#[component]
pub fn SummaryBar(summary: Summary) -> impl IntoView {
    view! {
        <div class="summary-bar" id="summary-bar">
            <div class="metric">
                <span class="metric-label">"Total Checks"</span>
                <span class="metric-value" data-testid="total-value">{summary.total.to_string()}</span>
            </div>
            <div class="metric">
                <span class="metric-label">"Passed"</span>
                <span class="metric-value pass" data-testid="passed-value">{summary.passed.to_string()}</span>
            </div>
            <div class="metric">
                <span class="metric-label">"Failed"</span>
                <span class="metric-value fail" data-testid="failed-value">{summary.failed.to_string()}</span>
            </div>
        </div>
    }
}

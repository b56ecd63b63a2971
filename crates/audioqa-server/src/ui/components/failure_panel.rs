//! Error message and trace for an aborted analysis

use audioqa_core::session::AnalysisFailure;
use leptos::prelude::*;

#[component]
pub fn FailurePanel(failure: AnalysisFailure) -> impl IntoView {
    view! {
        <section class="failure-panel" id="failure-panel" role="alert">
            <p class="failure-message">
                {format!("An error occurred during analysis: {}", failure.message)}
            </p>
            <pre class="failure-trace"><code>{failure.trace}</code></pre>
        </section>
    }
}

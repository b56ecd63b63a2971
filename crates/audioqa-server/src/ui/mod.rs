//! Leptos SSR UI components
//!
//! The dashboard is rendered on the server from the session snapshot.
//! The embedded script only drives uploads, the progress bar and reloads.

pub mod components;
pub mod dashboard;

/// CSS styles for the dashboard
pub const DASHBOARD_STYLES: &str = include_str!("styles/dashboard.css");

/// JavaScript for dashboard interactivity (upload, run, WebSocket progress)
pub const DASHBOARD_SCRIPT: &str = include_str!("scripts/dashboard.js");

/// Escape </script> tags in embedded content
pub fn escape_script_tag(s: &str) -> String {
    s.replace("</script>", r#"<\/script>"#)
}

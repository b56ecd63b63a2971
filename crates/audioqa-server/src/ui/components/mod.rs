//! Reusable dashboard components

pub mod failure_panel;
pub mod results_table;
pub mod summary_bar;
pub mod threshold_table;

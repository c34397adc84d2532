//! Aggregation and reporting for progress-tracker records.
//!
//! Groups learning sessions by topic, computes totals and averages, and
//! renders markdown or terminal reports.

pub mod aggregations;
pub mod reports;

pub use aggregations::{summarize, Analytics, RecentProgress, Summary, TopicStats};
pub use reports::ReportGenerator;

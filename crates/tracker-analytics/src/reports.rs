//! Markdown and plain-text rendering of a [`Summary`].

use crate::aggregations::{format_hours, round_to, Summary};

/// Report generator for creating human-readable summaries.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Full markdown report: overview, recent window, per-topic table.
    pub fn markdown_report(summary: &Summary, precision: u32) -> String {
        let mut report = String::new();

        report.push_str("# Learning Progress Report\n\n");

        report.push_str("## Overview\n\n");
        report.push_str(&format!("- **Sessions:** {}\n", summary.total_entries));
        report.push_str(&format!(
            "- **Total Hours:** {} ({})\n",
            round_to(summary.total_hours, precision),
            format_hours(summary.total_hours)
        ));
        report.push_str(&format!("- **Topics Studied:** {}\n", summary.unique_topics));
        report.push_str(&format!(
            "- **Most Studied:** {}\n\n",
            summary
                .most_studied_topic
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".into())
        ));

        let recent = &summary.recent;
        report.push_str(&format!("## Last {} Days\n\n", recent.window_days));
        report.push_str(&format!("- **Sessions:** {}\n", recent.session_count));
        report.push_str(&format!(
            "- **Hours:** {}\n",
            round_to(recent.total_hours, precision)
        ));
        report.push_str(&format!(
            "- **Avg Understanding:** {}\n\n",
            recent
                .average_understanding
                .map(|v| round_to(v, precision).to_string())
                .unwrap_or_else(|| "-".into())
        ));

        report.push_str("## Topics\n\n");
        if summary.topics.is_empty() {
            report.push_str("No sessions recorded yet.\n");
        } else {
            report.push_str(
                "| Topic | Sessions | Hours | Avg Hours | Avg Understanding | Avg Difficulty | Last Studied |\n",
            );
            report.push_str(
                "|-------|----------|-------|-----------|-------------------|----------------|--------------|\n",
            );
            for stats in &summary.topics {
                report.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {} | {} |\n",
                    stats.topic,
                    stats.session_count,
                    round_to(stats.total_hours, precision),
                    round_to(stats.average_hours_per_session, precision),
                    round_to(stats.average_understanding, precision),
                    round_to(stats.average_difficulty, precision),
                    stats.last_studied.format("%Y-%m-%d"),
                ));
            }
        }

        if summary.skipped_records > 0 {
            report.push_str(&format!(
                "\n> {} record(s) skipped due to invalid data.\n",
                summary.skipped_records
            ));
        }

        report
    }

    /// Compact summary suitable for a terminal.
    pub fn text_summary(summary: &Summary) -> String {
        let mut output = String::new();

        if summary.total_entries == 0 {
            output.push_str("All time: no activity (0 sessions)\n");
            return output;
        }

        output.push_str(&format!(
            "All time: {} across {} sessions, {} topics\n",
            format_hours(summary.total_hours),
            summary.total_entries,
            summary.unique_topics,
        ));
        output.push_str(&format!(
            "Last {} days: {} across {} sessions\n",
            summary.recent.window_days,
            format_hours(summary.recent.total_hours),
            summary.recent.session_count,
        ));
        if let Some(top) = summary.topics.first() {
            output.push_str(&format!(
                "Most studied: {} ({}, avg understanding {:.1}/10)\n",
                top.topic,
                format_hours(top.total_hours),
                top.average_understanding,
            ));
        }

        output
    }
}

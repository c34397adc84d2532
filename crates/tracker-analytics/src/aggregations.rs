//! Per-topic and global aggregations over learning records.
//!
//! Every summary is computed fresh from the store's current contents. All
//! sums and averages keep full precision; rounding is left to whoever
//! renders the result.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracker_core::error::Result;
use tracker_core::types::{validate_difficulty, validate_hours, validate_understanding};
use tracker_core::{LearningRecord, RecordStore, Scope, Topic, UndecodableRecord};

/// Statistics for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicStats {
    pub topic: Topic,
    pub session_count: u32,
    pub total_hours: f64,
    pub average_understanding: f64,
    pub average_difficulty: f64,
    pub average_hours_per_session: f64,
    /// Timestamp of the newest session in the group.
    pub last_studied: DateTime<Utc>,
}

/// Activity inside the trailing window (default 30 days).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentProgress {
    pub window_days: u32,
    pub session_count: u32,
    pub total_hours: f64,
    /// None when the window is empty.
    pub average_understanding: Option<f64>,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_entries: usize,
    pub total_hours: f64,
    pub unique_topics: usize,
    /// Topic with the largest summed hours; None for an empty store.
    pub most_studied_topic: Option<Topic>,
    /// Sorted by total hours descending, then topic name ascending.
    pub topics: Vec<TopicStats>,
    pub recent: RecentProgress,
    /// Rows dropped because they could not be decoded or broke a field invariant.
    pub skipped_records: usize,
}

impl Summary {
    pub fn topic(&self, topic: Topic) -> Option<&TopicStats> {
        self.topics.iter().find(|t| t.topic == topic)
    }
}

#[derive(Debug)]
struct TopicAccumulator {
    sessions: u32,
    hours: f64,
    understanding: f64,
    difficulty: f64,
    last_studied: DateTime<Utc>,
}

/// Accumulates records and produces a [`Summary`].
pub struct Analytics {
    groups: HashMap<Topic, TopicAccumulator>,
    total_entries: usize,
    total_hours: f64,
    skipped_records: usize,
    recent_window_days: u32,
    recent_since: DateTime<Utc>,
    recent_sessions: u32,
    recent_hours: f64,
    recent_understanding: f64,
}

impl Analytics {
    /// `now` anchors the recent-progress window. A window reaching past the
    /// earliest representable time covers every record.
    pub fn new(recent_window_days: u32, now: DateTime<Utc>) -> Self {
        let recent_since = Duration::try_days(i64::from(recent_window_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            groups: HashMap::new(),
            total_entries: 0,
            total_hours: 0.0,
            skipped_records: 0,
            recent_window_days,
            recent_since,
            recent_sessions: 0,
            recent_hours: 0.0,
            recent_understanding: 0.0,
        }
    }

    /// Fold one record into the running totals.
    pub fn process_record(&mut self, record: &LearningRecord) {
        if let Err(e) = check_integrity(record) {
            tracing::warn!(id = record.id, error = %e, "Skipping record with invalid data");
            self.skipped_records += 1;
            return;
        }

        self.total_entries += 1;
        self.total_hours += record.hours_spent;

        let group = self
            .groups
            .entry(record.topic)
            .or_insert_with(|| TopicAccumulator {
                sessions: 0,
                hours: 0.0,
                understanding: 0.0,
                difficulty: 0.0,
                last_studied: record.timestamp,
            });
        group.sessions += 1;
        group.hours += record.hours_spent;
        group.understanding += f64::from(record.understanding_level);
        group.difficulty += f64::from(record.difficulty_level);
        if record.timestamp > group.last_studied {
            group.last_studied = record.timestamp;
        }

        if record.timestamp >= self.recent_since {
            self.recent_sessions += 1;
            self.recent_hours += record.hours_spent;
            self.recent_understanding += f64::from(record.understanding_level);
        }
    }

    /// Count a stored row that never made it to a [`LearningRecord`].
    pub fn skip_undecodable(&mut self, row: &UndecodableRecord) {
        tracing::warn!(id = row.id, reason = %row.reason, "Skipping undecodable record");
        self.skipped_records += 1;
    }

    pub fn process_records(&mut self, records: &[LearningRecord]) {
        for record in records {
            self.process_record(record);
        }
    }

    /// Build the final summary.
    pub fn finish(self) -> Summary {
        let mut topics: Vec<TopicStats> = self
            .groups
            .into_iter()
            .filter(|(_, acc)| acc.sessions > 0)
            .map(|(topic, acc)| {
                let n = f64::from(acc.sessions);
                TopicStats {
                    topic,
                    session_count: acc.sessions,
                    total_hours: acc.hours,
                    average_understanding: acc.understanding / n,
                    average_difficulty: acc.difficulty / n,
                    average_hours_per_session: acc.hours / n,
                    last_studied: acc.last_studied,
                }
            })
            .collect();
        topics.sort_by(|a, b| {
            b.total_hours
                .total_cmp(&a.total_hours)
                .then_with(|| a.topic.as_str().cmp(b.topic.as_str()))
        });

        let recent = RecentProgress {
            window_days: self.recent_window_days,
            session_count: self.recent_sessions,
            total_hours: self.recent_hours,
            average_understanding: (self.recent_sessions > 0)
                .then(|| self.recent_understanding / f64::from(self.recent_sessions)),
        };

        Summary {
            total_entries: self.total_entries,
            total_hours: self.total_hours,
            unique_topics: topics.len(),
            most_studied_topic: topics.first().map(|t| t.topic),
            topics,
            recent,
            skipped_records: self.skipped_records,
        }
    }
}

/// Aggregate everything visible in `scope`.
pub fn summarize(store: &RecordStore, scope: Scope, recent_window_days: u32) -> Result<Summary> {
    let mut analytics = Analytics::new(recent_window_days, Utc::now());
    for row in store.scan(scope)? {
        match row {
            Ok(record) => analytics.process_record(&record),
            Err(bad) => analytics.skip_undecodable(&bad),
        }
    }
    let summary = analytics.finish();
    tracing::debug!(
        entries = summary.total_entries,
        topics = summary.unique_topics,
        skipped = summary.skipped_records,
        "Computed learning summary"
    );
    Ok(summary)
}

fn check_integrity(record: &LearningRecord) -> Result<()> {
    validate_hours(record.hours_spent)?;
    validate_difficulty(record.difficulty_level)?;
    validate_understanding(record.understanding_level)?;
    Ok(())
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Format fractional hours as e.g. "2h 30m".
pub fn format_hours(hours: f64) -> String {
    let total_minutes = (hours * 60.0).round().max(0.0) as u64;
    let h = total_minutes / 60;
    let m = total_minutes % 60;
    if h > 0 {
        format!("{}h {}m", h, m)
    } else {
        format!("{}m", m)
    }
}

use crate::error::{Result, TrackerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exclusive upper bound for `hours_spent`.
pub const MAX_HOURS: f64 = 24.0;
pub const DIFFICULTY_RANGE: std::ops::RangeInclusive<u8> = 1..=5;
pub const UNDERSTANDING_RANGE: std::ops::RangeInclusive<u8> = 1..=10;
pub const MIN_NOTES_CHARS: usize = 10;

/// The closed set of topics a learning session can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Topic {
    #[serde(rename = "Python")]
    Python,
    #[serde(rename = "FastAPI")]
    FastApi,
    #[serde(rename = "Database")]
    Database,
    #[serde(rename = "Docker")]
    Docker,
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "Django")]
    Django,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Python,
        Topic::FastApi,
        Topic::Database,
        Topic::Docker,
        Topic::Ai,
        Topic::Django,
    ];

    /// Canonical spelling, used for storage and output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Python => "Python",
            Topic::FastApi => "FastAPI",
            Topic::Database => "Database",
            Topic::Docker => "Docker",
            Topic::Ai => "AI",
            Topic::Django => "Django",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let known: Vec<&str> = Topic::ALL.iter().map(Topic::as_str).collect();
                TrackerError::validation(
                    "topic",
                    format!("'{}' is not one of: {}", wanted, known.join(", ")),
                )
            })
    }
}

impl TryFrom<String> for Topic {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A stored learning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    pub topic: Topic,
    pub hours_spent: f64,
    pub difficulty_level: u8,
    pub notes: String,
    pub understanding_level: u8,
    #[serde(default)]
    pub questions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Input for creating a record. `id` and `timestamp` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewRecord {
    pub topic: Topic,
    pub hours_spent: f64,
    pub difficulty_level: u8,
    pub notes: String,
    pub understanding_level: u8,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub questions: Vec<String>,
}

impl NewRecord {
    /// Check every field constraint; the first violation wins.
    pub fn validate(&self) -> Result<()> {
        validate_hours(self.hours_spent)?;
        validate_difficulty(self.difficulty_level)?;
        validate_notes(&self.notes)?;
        validate_understanding(self.understanding_level)?;
        Ok(())
    }
}

/// A partial update. Absent (or `null`) fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_spent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub understanding_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<String>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.topic.is_none()
            && self.hours_spent.is_none()
            && self.difficulty_level.is_none()
            && self.notes.is_none()
            && self.understanding_level.is_none()
            && self.questions.is_none()
    }

    /// Validate only the fields that are present.
    pub fn validate(&self) -> Result<()> {
        if let Some(hours) = self.hours_spent {
            validate_hours(hours)?;
        }
        if let Some(level) = self.difficulty_level {
            validate_difficulty(level)?;
        }
        if let Some(notes) = &self.notes {
            validate_notes(notes)?;
        }
        if let Some(level) = self.understanding_level {
            validate_understanding(level)?;
        }
        Ok(())
    }

    /// Apply the present fields to a record in memory.
    pub fn apply_to(&self, record: &mut LearningRecord) {
        if let Some(topic) = self.topic {
            record.topic = topic;
        }
        if let Some(hours) = self.hours_spent {
            record.hours_spent = hours;
        }
        if let Some(level) = self.difficulty_level {
            record.difficulty_level = level;
        }
        if let Some(notes) = &self.notes {
            record.notes = notes.clone();
        }
        if let Some(level) = self.understanding_level {
            record.understanding_level = level;
        }
        if let Some(questions) = &self.questions {
            record.questions = questions.clone();
        }
    }
}

pub fn validate_hours(hours: f64) -> Result<()> {
    if hours.is_finite() && hours > 0.0 && hours < MAX_HOURS {
        Ok(())
    } else {
        Err(TrackerError::validation(
            "hours_spent",
            format!("must be greater than 0 and less than {}, got {}", MAX_HOURS, hours),
        ))
    }
}

pub fn validate_difficulty(level: u8) -> Result<()> {
    if DIFFICULTY_RANGE.contains(&level) {
        Ok(())
    } else {
        Err(TrackerError::validation(
            "difficulty_level",
            format!("must be between 1 and 5, got {}", level),
        ))
    }
}

pub fn validate_understanding(level: u8) -> Result<()> {
    if UNDERSTANDING_RANGE.contains(&level) {
        Ok(())
    } else {
        Err(TrackerError::validation(
            "understanding_level",
            format!("must be between 1 and 10, got {}", level),
        ))
    }
}

pub fn validate_notes(notes: &str) -> Result<()> {
    let len = notes.trim().chars().count();
    if len >= MIN_NOTES_CHARS {
        Ok(())
    } else {
        Err(TrackerError::validation(
            "notes",
            format!("must be at least {} characters, got {}", MIN_NOTES_CHARS, len),
        ))
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

//! Durable CRUD over learning records.

use crate::db::Database;
use crate::error::{Result, TrackerError};
use crate::types::{LearningRecord, NewRecord, RecordPatch, Topic};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;

const COLUMNS: &str = "id, owner_id, topic, hours_spent, difficulty_level, notes, \
                       understanding_level, questions, timestamp";

/// Timestamps written without an offset are read as UTC.
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A stored row whose columns no longer decode into a [`LearningRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct UndecodableRecord {
    pub id: i64,
    pub reason: String,
}

/// One row from [`RecordStore::scan`].
pub type ScannedRecord = std::result::Result<LearningRecord, UndecodableRecord>;

/// Which rows an operation may see.
///
/// With authentication disabled every caller works in `Scope::All`. With it
/// enabled each caller is pinned to its own rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Owner(i64),
}

impl Scope {
    pub fn owner_id(&self) -> Option<i64> {
        match self {
            Scope::All => None,
            Scope::Owner(id) => Some(*id),
        }
    }
}

/// SQLite-backed store for [`LearningRecord`]s.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Validate and persist a new record. `id` and `timestamp` are assigned here.
    pub fn insert(&self, scope: Scope, candidate: &NewRecord) -> Result<LearningRecord> {
        candidate.validate()?;

        let timestamp = Utc::now();
        let questions = serde_json::to_string(&candidate.questions)?;

        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO learning_updates
                (owner_id, topic, hours_spent, difficulty_level, notes,
                 understanding_level, questions, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                scope.owner_id(),
                candidate.topic.as_str(),
                candidate.hours_spent,
                candidate.difficulty_level,
                candidate.notes,
                candidate.understanding_level,
                questions,
                timestamp.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(id, topic = %candidate.topic, "Recorded learning session");

        Ok(LearningRecord {
            id,
            owner_id: scope.owner_id(),
            topic: candidate.topic,
            hours_spent: candidate.hours_spent,
            difficulty_level: candidate.difficulty_level,
            notes: candidate.notes.clone(),
            understanding_level: candidate.understanding_level,
            questions: candidate.questions.clone(),
            timestamp,
        })
    }

    pub fn get(&self, scope: Scope, id: i64) -> Result<LearningRecord> {
        let conn = self.db.lock()?;
        fetch_one(&conn, scope, id)?.ok_or_else(|| not_found(id))
    }

    /// Every visible record in insertion order. Empty is not an error.
    ///
    /// Rows that fail to decode are left out with a warning.
    pub fn list_all(&self, scope: Scope) -> Result<Vec<LearningRecord>> {
        Ok(decodable(self.scan(scope)?))
    }

    /// Every visible row in insertion order, decoded one at a time so a
    /// damaged row is reported instead of failing the whole read.
    pub fn scan(&self, scope: Scope) -> Result<Vec<ScannedRecord>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM learning_updates
             WHERE (?1 IS NULL OR owner_id = ?1)
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![scope.owner_id()], decode_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Records for one topic, newest first, optionally capped to `limit`.
    pub fn list_by_topic(
        &self,
        scope: Scope,
        topic: Topic,
        limit: Option<usize>,
    ) -> Result<Vec<LearningRecord>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit
            .map(|n| i64::try_from(n).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM learning_updates
             WHERE (?1 IS NULL OR owner_id = ?1) AND topic = ?2
             ORDER BY id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![scope.owner_id(), topic.as_str(), limit], decode_row)?;
        Ok(decodable(rows.collect::<rusqlite::Result<Vec<_>>>()?))
    }

    /// Apply a partial update and return the stored result.
    ///
    /// Only whitelisted columns are ever written; `id`, `owner_id` and
    /// `timestamp` are not updatable.
    pub fn patch(&self, scope: Scope, id: i64, patch: &RecordPatch) -> Result<LearningRecord> {
        if patch.is_empty() {
            return Err(TrackerError::NoOp);
        }
        patch.validate()?;

        let mut assignments: Vec<(&'static str, Box<dyn ToSql>)> = Vec::new();
        if let Some(topic) = patch.topic {
            assignments.push(("topic", Box::new(topic.as_str())));
        }
        if let Some(hours) = patch.hours_spent {
            assignments.push(("hours_spent", Box::new(hours)));
        }
        if let Some(level) = patch.difficulty_level {
            assignments.push(("difficulty_level", Box::new(level)));
        }
        if let Some(notes) = &patch.notes {
            assignments.push(("notes", Box::new(notes.clone())));
        }
        if let Some(level) = patch.understanding_level {
            assignments.push(("understanding_level", Box::new(level)));
        }
        if let Some(questions) = &patch.questions {
            assignments.push(("questions", Box::new(serde_json::to_string(questions)?)));
        }

        let set_clause: Vec<String> = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
            .collect();
        let id_param = assignments.len() + 1;
        let owner_param = assignments.len() + 2;
        let sql = format!(
            "UPDATE learning_updates SET {}
             WHERE id = ?{id_param} AND (?{owner_param} IS NULL OR owner_id = ?{owner_param})",
            set_clause.join(", ")
        );

        let owner = scope.owner_id();
        let mut values: Vec<&dyn ToSql> = assignments.iter().map(|(_, v)| v.as_ref()).collect();
        values.push(&id);
        values.push(&owner);

        let conn = self.db.lock()?;
        let changed = conn.execute(&sql, values.as_slice())?;
        if changed == 0 {
            return Err(not_found(id));
        }
        tracing::debug!(id, fields = assignments.len(), "Patched learning session");

        fetch_one(&conn, scope, id)?.ok_or_else(|| not_found(id))
    }

    /// Permanently remove a record, returning its id.
    pub fn delete(&self, scope: Scope, id: i64) -> Result<i64> {
        let conn = self.db.lock()?;
        let changed = conn.execute(
            "DELETE FROM learning_updates WHERE id = ?1 AND (?2 IS NULL OR owner_id = ?2)",
            params![id, scope.owner_id()],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        tracing::info!(id, "Deleted learning session");
        Ok(id)
    }

    pub fn count(&self, scope: Scope) -> Result<usize> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM learning_updates WHERE (?1 IS NULL OR owner_id = ?1)",
            params![scope.owner_id()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn not_found(id: i64) -> TrackerError {
    TrackerError::NotFound(format!("entry {}", id))
}

fn fetch_one(conn: &Connection, scope: Scope, id: i64) -> Result<Option<LearningRecord>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM learning_updates
                 WHERE id = ?1 AND (?2 IS NULL OR owner_id = ?2)"
            ),
            params![id, scope.owner_id()],
            map_row,
        )
        .optional()?;
    Ok(record)
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<ScannedRecord> {
    let id: i64 = row.get(0)?;
    Ok(map_row(row).map_err(|e| UndecodableRecord {
        id,
        reason: e.to_string(),
    }))
}

fn decodable(rows: Vec<ScannedRecord>) -> Vec<LearningRecord> {
    rows.into_iter()
        .filter_map(|row| match row {
            Ok(record) => Some(record),
            Err(bad) => {
                tracing::warn!(id = bad.id, reason = %bad.reason, "Skipping undecodable record");
                None
            }
        })
        .collect()
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<LearningRecord> {
    let topic: String = row.get(2)?;
    let topic = topic
        .parse::<Topic>()
        .map_err(|e| conversion_error(2, Type::Text, e))?;

    let difficulty: i64 = row.get(4)?;
    let difficulty_level =
        u8::try_from(difficulty).map_err(|e| conversion_error(4, Type::Integer, e))?;
    let understanding: i64 = row.get(6)?;
    let understanding_level =
        u8::try_from(understanding).map_err(|e| conversion_error(6, Type::Integer, e))?;

    let questions: String = row.get(7)?;
    let questions: Vec<String> =
        serde_json::from_str(&questions).map_err(|e| conversion_error(7, Type::Text, e))?;

    let timestamp: String = row.get(8)?;
    let timestamp = parse_timestamp(&timestamp).map_err(|e| conversion_error(8, Type::Text, e))?;

    Ok(LearningRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        topic,
        hours_spent: row.get(3)?,
        difficulty_level,
        notes: row.get(5)?,
        understanding_level,
        questions,
        timestamp,
    })
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(e) => NaiveDateTime::parse_from_str(raw, NAIVE_TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|_| e),
    }
}

fn conversion_error<E>(idx: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RecordStore {
        RecordStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn candidate(topic: Topic, hours: f64, understanding: u8) -> NewRecord {
        NewRecord {
            topic,
            hours_spent: hours,
            difficulty_level: 3,
            notes: "Worked through the tutorial".into(),
            understanding_level: understanding,
            questions: vec!["first?".into(), "second?".into()],
        }
    }

    #[test]
    fn test_insert_round_trip() {
        let store = store();
        let input = candidate(Topic::Python, 2.5, 8);
        let rec = store.insert(Scope::All, &input).unwrap();
        assert!(rec.id > 0);
        assert_eq!(rec.topic, input.topic);
        assert_eq!(rec.hours_spent, input.hours_spent);
        assert_eq!(rec.difficulty_level, input.difficulty_level);
        assert_eq!(rec.notes, input.notes);
        assert_eq!(rec.understanding_level, input.understanding_level);
        assert_eq!(rec.questions, input.questions);

        let fetched = store.get(Scope::All, rec.id).unwrap();
        assert_eq!(fetched, rec);
    }

    #[test]
    fn test_invalid_insert_leaves_store_unchanged() {
        let store = store();
        store.insert(Scope::All, &candidate(Topic::Ai, 1.0, 5)).unwrap();

        let mut zero_hours = candidate(Topic::Ai, 0.0, 5);
        assert!(matches!(
            store.insert(Scope::All, &zero_hours),
            Err(TrackerError::Validation { .. })
        ));
        zero_hours.hours_spent = 1.0;
        zero_hours.notes = "tiny".into();
        assert!(matches!(
            store.insert(Scope::All, &zero_hours),
            Err(TrackerError::Validation { .. })
        ));
        assert_eq!(store.count(Scope::All).unwrap(), 1);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let store = store();
        let a = store.insert(Scope::All, &candidate(Topic::Docker, 1.0, 5)).unwrap();
        store.delete(Scope::All, a.id).unwrap();
        let b = store.insert(Scope::All, &candidate(Topic::Docker, 1.0, 5)).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn test_list_all_empty_and_stable() {
        let store = store();
        assert!(store.list_all(Scope::All).unwrap().is_empty());

        for topic in [Topic::Python, Topic::Docker, Topic::Python] {
            store.insert(Scope::All, &candidate(topic, 1.0, 5)).unwrap();
        }
        let first = store.list_all(Scope::All).unwrap();
        let second = store.list_all(Scope::All).unwrap();
        assert_eq!(first, second);
        let ids: Vec<i64> = first.iter().map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_list_by_topic_newest_first_with_limit() {
        let store = store();
        let mut python_ids = Vec::new();
        for i in 0..4 {
            let rec = store
                .insert(Scope::All, &candidate(Topic::Python, 1.0 + i as f64, 5))
                .unwrap();
            python_ids.push(rec.id);
        }
        store.insert(Scope::All, &candidate(Topic::Django, 1.0, 5)).unwrap();

        let all = store.list_by_topic(Scope::All, Topic::Python, None).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].id, *python_ids.last().unwrap());

        let recent = store.list_by_topic(Scope::All, Topic::Python, Some(2)).unwrap();
        let ids: Vec<i64> = recent.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![python_ids[3], python_ids[2]]);
    }

    #[test]
    fn test_list_by_topic_no_matches_is_empty() {
        let store = store();
        store.insert(Scope::All, &candidate(Topic::Python, 1.0, 5)).unwrap();
        assert!(store
            .list_by_topic(Scope::All, Topic::Database, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_patch_changes_only_given_field() {
        let store = store();
        let rec = store.insert(Scope::All, &candidate(Topic::Python, 2.0, 6)).unwrap();

        let patch = RecordPatch {
            hours_spent: Some(3.0),
            ..Default::default()
        };
        let updated = store.patch(Scope::All, rec.id, &patch).unwrap();

        let mut expected = rec.clone();
        expected.hours_spent = 3.0;
        assert_eq!(updated, expected);
        assert_eq!(updated.timestamp, rec.timestamp);
    }

    #[test]
    fn test_patch_every_field() {
        let store = store();
        let rec = store.insert(Scope::All, &candidate(Topic::Python, 2.0, 6)).unwrap();
        let patch = RecordPatch {
            topic: Some(Topic::FastApi),
            hours_spent: Some(4.5),
            difficulty_level: Some(5),
            notes: Some("Rewrote the whole router".into()),
            understanding_level: Some(9),
            questions: Some(vec![]),
        };
        let updated = store.patch(Scope::All, rec.id, &patch).unwrap();
        assert_eq!(updated.topic, Topic::FastApi);
        assert_eq!(updated.difficulty_level, 5);
        assert_eq!(updated.understanding_level, 9);
        assert!(updated.questions.is_empty());
        assert_eq!(updated.id, rec.id);
    }

    #[test]
    fn test_patch_empty_is_noop() {
        let store = store();
        let rec = store.insert(Scope::All, &candidate(Topic::Python, 2.0, 6)).unwrap();
        assert!(matches!(
            store.patch(Scope::All, rec.id, &RecordPatch::default()),
            Err(TrackerError::NoOp)
        ));
        assert_eq!(store.get(Scope::All, rec.id).unwrap(), rec);
    }

    #[test]
    fn test_patch_invalid_and_missing() {
        let store = store();
        let rec = store.insert(Scope::All, &candidate(Topic::Python, 2.0, 6)).unwrap();
        let bad = RecordPatch {
            hours_spent: Some(24.0),
            ..Default::default()
        };
        assert!(matches!(
            store.patch(Scope::All, rec.id, &bad),
            Err(TrackerError::Validation { .. })
        ));
        assert_eq!(store.get(Scope::All, rec.id).unwrap(), rec);

        let ok = RecordPatch {
            hours_spent: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            store.patch(Scope::All, 999, &ok),
            Err(TrackerError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_then_get() {
        let store = store();
        let rec = store.insert(Scope::All, &candidate(Topic::Ai, 1.0, 5)).unwrap();
        assert_eq!(store.delete(Scope::All, rec.id).unwrap(), rec.id);
        assert!(matches!(
            store.get(Scope::All, rec.id),
            Err(TrackerError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(Scope::All, rec.id),
            Err(TrackerError::NotFound(_))
        ));
    }

    #[test]
    fn test_owner_scoping() {
        let store = store();
        let alice = Scope::Owner(1);
        let bob = Scope::Owner(2);
        let rec = store.insert(alice, &candidate(Topic::Python, 1.0, 5)).unwrap();
        store.insert(bob, &candidate(Topic::Python, 2.0, 5)).unwrap();

        assert_eq!(rec.owner_id, Some(1));
        assert_eq!(store.list_all(alice).unwrap().len(), 1);
        assert_eq!(store.list_all(Scope::All).unwrap().len(), 2);
        assert_eq!(store.list_by_topic(bob, Topic::Python, None).unwrap().len(), 1);

        // Bob can neither see nor touch Alice's record.
        assert!(matches!(store.get(bob, rec.id), Err(TrackerError::NotFound(_))));
        let patch = RecordPatch {
            hours_spent: Some(5.0),
            ..Default::default()
        };
        assert!(matches!(
            store.patch(bob, rec.id, &patch),
            Err(TrackerError::NotFound(_))
        ));
        assert!(matches!(store.delete(bob, rec.id), Err(TrackerError::NotFound(_))));
        assert_eq!(store.get(alice, rec.id).unwrap().hours_spent, 1.0);
    }

    #[test]
    fn test_records_survive_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("progress.db");
        let id = {
            let store = RecordStore::new(Arc::new(Database::open(&path).unwrap()));
            store.insert(Scope::All, &candidate(Topic::Database, 1.5, 7)).unwrap().id
        };
        let store = RecordStore::new(Arc::new(Database::open(&path).unwrap()));
        let rec = store.get(Scope::All, id).unwrap();
        assert_eq!(rec.topic, Topic::Database);
        assert_eq!(rec.questions.len(), 2);
    }

    fn insert_raw(store: &RecordStore, difficulty: i64, timestamp: &str) -> i64 {
        let conn = store.db.lock().unwrap();
        conn.execute(
            "INSERT INTO learning_updates
                (topic, hours_spent, difficulty_level, notes, understanding_level, timestamp)
             VALUES ('Python', 2.0, ?1, 'Imported from an older tool', 6, ?2)",
            params![difficulty, timestamp],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_naive_timestamp_is_read_as_utc() {
        let store = store();
        let id = insert_raw(&store, 3, "2024-01-01 10:00:00");
        let rec = store.get(Scope::All, id).unwrap();
        assert_eq!(rec.timestamp.to_rfc3339(), "2024-01-01T10:00:00+00:00");
        assert_eq!(rec.questions, Vec::<String>::new());
    }

    #[test]
    fn test_undecodable_row_does_not_break_listing() {
        let store = store();
        let good = store.insert(Scope::All, &candidate(Topic::Python, 1.0, 5)).unwrap();
        let bad = insert_raw(&store, 300, "2024-01-01T10:00:00Z");
        let garbled = insert_raw(&store, 3, "yesterday");

        let listed = store.list_all(Scope::All).unwrap();
        assert_eq!(listed, vec![good.clone()]);
        assert_eq!(store.list_by_topic(Scope::All, Topic::Python, None).unwrap(), vec![good]);

        let scanned = store.scan(Scope::All).unwrap();
        assert_eq!(scanned.len(), 3);
        let failed: Vec<i64> = scanned
            .iter()
            .filter_map(|row| row.as_ref().err().map(|bad| bad.id))
            .collect();
        assert_eq!(failed, vec![bad, garbled]);
    }
}

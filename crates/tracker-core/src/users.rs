//! Credential records for the optional login layer.

use crate::db::Database;
use crate::error::{Result, TrackerError};
use bcrypt::HashParts;
use rusqlite::{params, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MIN_PASSWORD_CHARS: usize = 8;

/// Lowest bcrypt cost the algorithm allows.
pub const MIN_PASSWORD_COST: u32 = 4;

/// Highest bcrypt cost accepted when hashing or verifying. Stored hashes
/// above it are rejected without running the hash.
pub const MAX_PASSWORD_COST: u32 = 16;

/// An account that can log in and own records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub disabled: bool,
}

#[derive(Clone)]
pub struct UserStore {
    db: Arc<Database>,
    cost: u32,
}

impl UserStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Use `cost` for newly hashed passwords, clamped to bcrypt's valid range.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost.clamp(MIN_PASSWORD_COST, MAX_PASSWORD_COST);
        self
    }

    /// Register a new account. Usernames are unique.
    pub fn create(&self, username: &str, password: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(TrackerError::validation("username", "must not be empty"));
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(TrackerError::validation(
                "password",
                format!("must be at least {} characters", MIN_PASSWORD_CHARS),
            ));
        }

        let hash = hash_password(password, self.cost)?;
        let conn = self.db.lock()?;
        match conn.execute(
            "INSERT INTO users (username, password_hash, disabled) VALUES (?1, ?2, 0)",
            params![username, hash],
        ) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                return Err(TrackerError::validation(
                    "username",
                    format!("'{}' is already taken", username),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        tracing::info!(id, username, "Created user");
        Ok(User {
            id,
            username: username.to_string(),
            disabled: false,
        })
    }

    /// Check a username/password pair. Unknown users, wrong passwords and
    /// disabled accounts all fail with the same message.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let row = {
            let conn = self.db.lock()?;
            conn.query_row(
                "SELECT id, username, password_hash, disabled FROM users WHERE username = ?1",
                params![username.trim()],
                |row| {
                    Ok((
                        User {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            disabled: row.get(3)?,
                        },
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
        };

        match row {
            Some((user, hash)) if verify_password(password, &hash) && !user.disabled => Ok(user),
            _ => Err(TrackerError::Unauthorized(
                "Incorrect username or password".into(),
            )),
        }
    }

    pub fn get(&self, id: i64) -> Result<User> {
        let conn = self.db.lock()?;
        conn.query_row(
            "SELECT id, username, disabled FROM users WHERE id = ?1",
            params![id],
            map_user,
        )
        .optional()?
        .ok_or_else(|| TrackerError::NotFound(format!("user {}", id)))
    }

    pub fn set_disabled(&self, username: &str, disabled: bool) -> Result<User> {
        let conn = self.db.lock()?;
        let changed = conn.execute(
            "UPDATE users SET disabled = ?1 WHERE username = ?2",
            params![disabled, username],
        )?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("user '{}'", username)));
        }
        tracing::info!(username, disabled, "Updated user status");
        conn.query_row(
            "SELECT id, username, disabled FROM users WHERE username = ?1",
            params![username],
            map_user,
        )
        .map_err(Into::into)
    }

    pub fn list(&self) -> Result<Vec<User>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT id, username, disabled FROM users ORDER BY id")?;
        let rows = stmt.query_map([], map_user)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        disabled: row.get(2)?,
    })
}

/// Hash a password with bcrypt and a fresh random salt.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Verify a password against a stored bcrypt hash.
///
/// Malformed hashes and hashes with a cost above [`MAX_PASSWORD_COST`]
/// never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.parse::<HashParts>() {
        Ok(parts) if parts.get_cost() <= MAX_PASSWORD_COST => {
            bcrypt::verify(password, stored).unwrap_or(false)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> UserStore {
        UserStore::new(Arc::new(Database::in_memory().unwrap())).with_cost(MIN_PASSWORD_COST)
    }

    #[test]
    fn test_hash_verify() {
        let hash = hash_password("testpassword", MIN_PASSWORD_COST).unwrap();
        assert!(hash.starts_with("$2b$04$"));
        assert!(verify_password("testpassword", &hash));
        assert!(!verify_password("testpassword2", &hash));
        assert!(!verify_password("testpassword", "garbage"));
    }

    #[test]
    fn test_same_password_different_salt() {
        assert_ne!(
            hash_password("testpassword", MIN_PASSWORD_COST).unwrap(),
            hash_password("testpassword", MIN_PASSWORD_COST).unwrap()
        );
    }

    #[test]
    fn test_excessive_stored_cost_is_rejected() {
        let hash = hash_password("testpassword", MIN_PASSWORD_COST).unwrap();
        let inflated = hash.replacen("$04$", "$31$", 1);
        assert!(!verify_password("testpassword", &inflated));
    }

    #[test]
    fn test_cost_is_clamped() {
        let db = Arc::new(Database::in_memory().unwrap());
        assert_eq!(UserStore::new(Arc::clone(&db)).with_cost(0).cost, MIN_PASSWORD_COST);
        assert_eq!(UserStore::new(db).with_cost(99).cost, MAX_PASSWORD_COST);
    }

    #[test]
    fn test_create_and_authenticate() {
        let users = users();
        let created = users.create("testuser", "testpassword").unwrap();
        let user = users.authenticate("testuser", "testpassword").unwrap();
        assert_eq!(user, created);
        assert!(matches!(
            users.authenticate("testuser", "wrong-password"),
            Err(TrackerError::Unauthorized(_))
        ));
        assert!(matches!(
            users.authenticate("nobody", "testpassword"),
            Err(TrackerError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let users = users();
        users.create("testuser", "testpassword").unwrap();
        assert!(matches!(
            users.create("testuser", "otherpassword"),
            Err(TrackerError::Validation { .. })
        ));
    }

    #[test]
    fn test_short_password_rejected() {
        let users = users();
        assert!(users.create("testuser", "short").is_err());
        assert!(users.list().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_user_cannot_authenticate() {
        let users = users();
        users.create("testuser", "testpassword").unwrap();
        let user = users.set_disabled("testuser", true).unwrap();
        assert!(user.disabled);
        assert!(users.authenticate("testuser", "testpassword").is_err());

        users.set_disabled("testuser", false).unwrap();
        assert!(users.authenticate("testuser", "testpassword").is_ok());
        assert!(matches!(
            users.set_disabled("ghost", true),
            Err(TrackerError::NotFound(_))
        ));
    }
}

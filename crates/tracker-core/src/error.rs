use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No fields to update")]
    NoOp,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable, machine-checkable name for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::NoOp => "no_op",
            Self::Unauthorized(_) => "unauthorized",
            Self::Unavailable(_)
            | Self::Persistence(_)
            | Self::PasswordHash(_)
            | Self::Serialization(_)
            | Self::Io(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(TrackerError::validation("notes", "too short").kind(), "validation");
        assert_eq!(TrackerError::NotFound("entry 3".into()).kind(), "not_found");
        assert_eq!(TrackerError::NoOp.kind(), "no_op");
        assert_eq!(TrackerError::Unavailable("lock poisoned".into()).kind(), "internal");
    }

    #[test]
    fn test_validation_message() {
        let err = TrackerError::validation("hours_spent", "must be between 0 and 24 (exclusive)");
        assert_eq!(
            err.to_string(),
            "Invalid hours_spent: must be between 0 and 24 (exclusive)"
        );
    }
}

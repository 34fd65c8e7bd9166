use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A secondary step failed after the main transaction had committed.
    #[error("Consistency warning: {0}")]
    ConsistencyWarning(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MailError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MailError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, MailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_helper() {
        assert!(MailError::NotFound("message abc".to_string()).is_not_found());
        assert!(!MailError::CorruptPayload("bad frame".to_string()).is_not_found());
    }

    #[test]
    fn test_display_messages() {
        let err = MailError::MalformedInput("empty message".to_string());
        assert_eq!(err.to_string(), "Malformed input: empty message");

        let err = MailError::ConsistencyWarning("vacuum failed".to_string());
        assert_eq!(err.to_string(), "Consistency warning: vacuum failed");
    }
}

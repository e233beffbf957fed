use thiserror::Error;

/// Failures that abort a whole request. Per-record problems never surface
/// here; ingestion counts and skips them instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<rusqlite::Error>() {
            Ok(e) => AppError::Database(e),
            Err(err) => AppError::Internal(err),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_errors_are_database_errors() {
        let err: AppError = anyhow::Error::from(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(matches!(err, AppError::Database(_)));

        let err: AppError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.to_string(), "disk on fire");
    }
}

use crate::application::repos::RepoError;

/// Translate SQLite failures into repository errors.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Duplicate {
            constraint: db
                .constraint()
                .map(str::to_string)
                .or_else(|| unique_columns(db.message()))
                .unwrap_or_else(|| "unknown".to_string()),
        },
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepoError::InvalidInput {
            message: db.message().to_string(),
        },
        sqlx::Error::Database(db) if db.is_check_violation() || db.message().contains("NOT NULL") => {
            RepoError::Integrity {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.message().contains("database is locked") || db.message().contains("busy") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

/// SQLite reports `UNIQUE constraint failed: table.col, table.col`.
fn unique_columns(message: &str) -> Option<String> {
    message
        .split_once("constraint failed:")
        .map(|(_, columns)| columns.trim().to_string())
        .filter(|columns| !columns.is_empty())
}

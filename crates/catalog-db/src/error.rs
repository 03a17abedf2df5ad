//! # Database Error Types
//!
//! Error types for registry operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          CoreError (pure rule failed)      │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ← constraint → DuplicateKey / NotFound          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError::kind() → ErrorKind → HTTP status / CLI exit message          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Uniqueness is never checked before an insert; the constraint fires and
//! the repository attaches the business key with [`DbError::on_unique`].

use catalog_core::{CoreError, ErrorKind, ValidationError};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - Lookup by id / code / SKU / serial returns no rows
    /// - Insert references a parent that does not exist (FK)
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Identity tuple or generated code already taken
    /// - Full SKU collision
    /// - Second listing for the same (variant, platform)
    /// - Duplicate serial number, family id, brand or color
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation the repository could not attribute.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Delete blocked by rows that still reference the target.
    #[error("{entity} {id} is still referenced by {referenced_by}")]
    StillReferenced {
        entity: String,
        id: String,
        referenced_by: String,
    },

    /// CHECK constraint or trigger rejected the row.
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Bundle composition would create a cycle.
    #[error("Adding identity {child_id} to {parent_id} would create a bundle cycle")]
    CycleDetected { parent_id: i64, child_id: i64 },

    /// Input rejected before touching the database.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored value could not be decoded into a domain type.
    #[error("Corrupt {entity} row: {reason}")]
    CorruptRow { entity: String, reason: String },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and key.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl ToString) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Replaces the parsed constraint name with the business key.
    pub fn on_unique(self, field: &str, value: impl ToString) -> Self {
        match self {
            DbError::UniqueViolation { .. } => DbError::duplicate(field, value),
            other => other,
        }
    }

    /// Attributes a foreign key failure to the missing parent.
    pub fn on_foreign_key(self, entity: &str, id: impl ToString) -> Self {
        match self {
            DbError::ForeignKeyViolation { .. } => DbError::not_found(entity, id),
            other => other,
        }
    }

    /// Attributes a restricting foreign key on delete to its referrer.
    pub fn on_restrict(self, entity: &str, id: impl ToString, referenced_by: &str) -> Self {
        match self {
            DbError::ForeignKeyViolation { .. } => DbError::StillReferenced {
                entity: entity.to_string(),
                id: id.to_string(),
                referenced_by: referenced_by.to_string(),
            },
            other => other,
        }
    }

    /// Boundary classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::NotFound { .. } | DbError::ForeignKeyViolation { .. } => ErrorKind::NotFound,
            DbError::UniqueViolation { .. } => ErrorKind::DuplicateKey,
            DbError::Validation(_)
            | DbError::ConstraintViolation { .. }
            | DbError::StillReferenced { .. } => ErrorKind::InvalidField,
            DbError::CycleDetected { .. } => ErrorKind::CycleDetected,
            DbError::ConnectionFailed(_)
            | DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::CorruptRow { .. }
            | DbError::PoolExhausted
            | DbError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → by constraint kind (unique / FK / check)
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: <table>.<column>[, ...]"
                if db_err.is_unique_violation() || msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if db_err.is_foreign_key_violation()
                    || msg.contains("FOREIGN KEY constraint failed")
                {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if db_err.is_check_violation()
                    || msg.contains("CHECK constraint failed")
                    || msg.contains("immutable")
                {
                    DbError::ConstraintViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, key } => DbError::not_found(entity, key),
            CoreError::DuplicateKey { field, value } => DbError::UniqueViolation { field, value },
            CoreError::CycleDetected {
                parent_id,
                child_id,
            } => DbError::CycleDetected {
                parent_id,
                child_id,
            },
            CoreError::Validation(v) => DbError::Validation(v),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

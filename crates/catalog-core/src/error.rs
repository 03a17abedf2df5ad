//! # Error Types
//!
//! Domain-specific error types for catalog-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  catalog-core errors (this file)                                       │
//! │  ├── CoreError        - Registry / composer failures                   │
//! │  ├── ValidationError  - Field-level input failures                     │
//! │  └── ErrorKind        - Boundary classification (HTTP mapping)         │
//! │                                                                         │
//! │  catalog-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ErrorKind → boundary    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Every error names the offending entity, field or key
//! 3. Errors are enum variants, never String
//! 4. Every variant classifies into exactly one [`ErrorKind`]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Kind
// =============================================================================

/// Boundary classification of every failure the catalog can surface.
///
/// The REST layer (and the CLI) only ever needs this plus the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Referenced entity id/key does not exist.
    NotFound,
    /// A uniqueness invariant would be violated.
    DuplicateKey,
    /// A structural precondition failed.
    InvalidField,
    /// Bundle composition would create a cycle.
    CycleDetected,
    /// Storage or infrastructure failure.
    Internal,
}

impl ErrorKind {
    /// HTTP status code the boundary layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::DuplicateKey => 409,
            ErrorKind::InvalidField | ErrorKind::CycleDetected => 400,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether the same call may succeed later without changing its input.
    ///
    /// Only infrastructure failures qualify; every domain failure needs the
    /// caller to fix something first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Internal)
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Registry and composer errors.
///
/// These are raised by pure domain logic and by the persistence layer once it
/// has translated storage failures (see `catalog_db::DbError`).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity does not exist.
    ///
    /// ## When This Occurs
    /// - `createIdentity` for a productId with no family
    /// - `createVariant` for an unknown identity id
    /// - Sync worker reports on a listing that was deleted
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A uniqueness invariant would be violated.
    ///
    /// ## When This Occurs
    /// - Same (productId, type, localComponentIndex) created twice
    /// - Full SKU collision between two variants
    /// - Second listing for the same (variant, platform)
    /// - Family productId or inventory serial reused
    #[error("{field} '{value}' already exists")]
    DuplicateKey { field: String, value: String },

    /// Adding the edge would make a bundle (transitively) contain itself.
    ///
    /// ## User Workflow
    /// ```text
    /// Bundle A contains Kit B
    ///      │
    ///      ▼
    /// addComponent(parent: B, child: A)
    ///      │
    ///      ▼
    /// reachable(A → B) = true
    ///      │
    ///      ▼
    /// CycleDetected { parent_id: B, child_id: A }
    /// ```
    #[error("Adding identity {child_id} to {parent_id} would create a bundle cycle")]
    CycleDetected { parent_id: i64, child_id: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl ToString) -> Self {
        CoreError::DuplicateKey {
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Boundary classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            CoreError::CycleDetected { .. } => ErrorKind::CycleDetected,
            CoreError::Validation(_) => ErrorKind::InvalidField,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur before any write happens; a failed validation never leaves a
/// persisted side effect.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g. lowercase color code, 3-char condition).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not allowed in this position.
    ///
    /// ## When This Occurs
    /// - localComponentIndex given for a non-Part identity
    /// - Bundle component attached to a Product parent
    /// - eBay metadata attached to an Amazon listing
    #[error("{field} is not allowed: {reason}")]
    NotAllowed { field: String, reason: String },

    /// Inventory status change outside the allowed transitions.
    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::duplicate("generated_code", "00845-P-1");
        assert_eq!(err.to_string(), "generated_code '00845-P-1' already exists");

        let err = CoreError::not_found("Identity", "00001-K");
        assert_eq!(err.to_string(), "Identity not found: 00001-K");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "base_name".to_string(),
        };
        assert_eq!(err.to_string(), "base_name is required");

        let err = ValidationError::OutOfRange {
            field: "product_id".to_string(),
            min: 0,
            max: 99999,
        };
        assert_eq!(err.to_string(), "product_id must be between 0 and 99999");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::InvalidField);
    }

    #[test]
    fn test_kind_http_mapping() {
        assert_eq!(CoreError::not_found("Variant", 7).kind().http_status(), 404);
        assert_eq!(CoreError::duplicate("full_sku", "X").kind().http_status(), 409);
        let cycle = CoreError::CycleDetected {
            parent_id: 1,
            child_id: 2,
        };
        assert_eq!(cycle.kind(), ErrorKind::CycleDetected);
        assert_eq!(cycle.kind().http_status(), 400);
        assert!(!cycle.kind().is_retryable());
        assert!(ErrorKind::Internal.is_retryable());
    }
}

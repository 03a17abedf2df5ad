//! # Validation Module
//!
//! Field-level validation for catalog input.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Boundary (REST / CLI)                                        │
//! │  ├── Deserialization into closed enums (type, platform, status)        │
//! │  └── Role check via access::Role::permits                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE + derivation rules                               │
//! │  ├── Ranges (productId, LCI), lengths, code formats                    │
//! │  └── Runs before any write: a failure persists nothing                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (generated_code, full_sku, serial, listing per platform)   │
//! │  ├── CHECK (lci iff Part, quantity > 0)                                │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use catalog_core::validation::{validate_product_id, validate_color_code};
//!
//! validate_product_id(845).unwrap();
//! assert_eq!(validate_color_code(" wy ").unwrap(), "WY");
//! ```

use crate::error::ValidationError;
use crate::{MAX_LCI, MAX_PRODUCT_ID, MIN_LCI};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_LOCATION_LEN: usize = 50;
pub const MAX_SERIAL_LEN: usize = 100;
pub const MAX_EXTERNAL_REF_LEN: usize = 100;
pub const MAX_QUERY_LEN: usize = 100;

// =============================================================================
// Identity Fields
// =============================================================================

/// Validates a family namespace id (five-digit, 0..=99999).
pub fn validate_product_id(product_id: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRODUCT_ID).contains(&product_id) {
        return Err(ValidationError::OutOfRange {
            field: "product_id".to_string(),
            min: 0,
            max: MAX_PRODUCT_ID,
        });
    }
    Ok(())
}

/// Validates a local component index value (1..=99).
///
/// Presence rules (required for Part, forbidden otherwise) live in
/// [`crate::identity::IdentityType::check_lci`].
pub fn validate_lci(lci: i64) -> ValidationResult<()> {
    if !(MIN_LCI..=MAX_LCI).contains(&lci) {
        return Err(ValidationError::OutOfRange {
            field: "local_component_index".to_string(),
            min: MIN_LCI,
            max: MAX_LCI,
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required display name and returns it trimmed.
///
/// ## Example
/// ```rust
/// use catalog_core::validation::validate_name;
///
/// assert_eq!(validate_name("base_name", "  Dock Pro ").unwrap(), "Dock Pro");
/// assert!(validate_name("base_name", "   ").is_err());
/// ```
pub fn validate_name(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(value.to_string())
}

/// Normalizes an optional free-text field: blank becomes `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validates a 2-character color code and returns it uppercased.
///
/// Whether the code exists in the color registry is checked by the
/// variant repository; this only checks the shape.
pub fn validate_color_code(code: &str) -> ValidationResult<String> {
    let code = code.trim().to_ascii_uppercase();

    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "color_code".to_string(),
            reason: "must be exactly 2 letters or digits".to_string(),
        });
    }

    Ok(code)
}

/// Validates a warehouse location code (e.g. `A1-S3`).
pub fn validate_location_code(location: &str) -> ValidationResult<String> {
    let location = location.trim().to_ascii_uppercase();

    if location.is_empty() {
        return Err(ValidationError::Required {
            field: "location_code".to_string(),
        });
    }

    if location.len() > MAX_LOCATION_LEN {
        return Err(ValidationError::TooLong {
            field: "location_code".to_string(),
            max: MAX_LOCATION_LEN,
        });
    }

    Ok(location)
}

/// Validates a manufacturer serial number. Serials are stored as scanned.
pub fn validate_serial_number(serial: &str) -> ValidationResult<String> {
    let serial = serial.trim();

    if serial.is_empty() {
        return Err(ValidationError::Required {
            field: "serial_number".to_string(),
        });
    }

    if serial.len() > MAX_SERIAL_LEN {
        return Err(ValidationError::TooLong {
            field: "serial_number".to_string(),
            max: MAX_SERIAL_LEN,
        });
    }

    if serial.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "serial_number".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(serial.to_string())
}

/// Validates an external marketplace reference id (ASIN, eBay item id...).
pub fn validate_external_ref(reference: &str) -> ValidationResult<String> {
    let reference = reference.trim();

    if reference.is_empty() {
        return Err(ValidationError::Required {
            field: "external_ref_id".to_string(),
        });
    }

    if reference.len() > MAX_EXTERNAL_REF_LEN {
        return Err(ValidationError::TooLong {
            field: "external_ref_id".to_string(),
            max: MAX_EXTERNAL_REF_LEN,
        });
    }

    Ok(reference.to_string())
}

/// Validates a search query. Empty is allowed (matches everything).
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > MAX_QUERY_LEN {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: MAX_QUERY_LEN,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a stored amount (price, override, cost basis). Zero is allowed.
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a bill-of-materials quantity.
pub fn validate_quantity_required(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity_required".to_string(),
        });
    }
    Ok(())
}

/// Validates a physical measurement (dimension or weight).
pub fn validate_measurement(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Clamps a page size into `1..=max`.
pub fn clamp_limit(limit: i64, max: i64) -> i64 {
    limit.clamp(1, max)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_product_id() {
        assert!(validate_product_id(0).is_ok());
        assert!(validate_product_id(845).is_ok());
        assert!(validate_product_id(99_999).is_ok());
        assert!(validate_product_id(100_000).is_err());
        assert!(validate_product_id(-1).is_err());
    }

    #[test]
    fn test_validate_lci() {
        assert!(validate_lci(1).is_ok());
        assert!(validate_lci(99).is_ok());
        assert!(validate_lci(0).is_err());
        assert!(validate_lci(100).is_err());
    }

    #[test]
    fn test_validate_color_code() {
        assert_eq!(validate_color_code("wy").unwrap(), "WY");
        assert_eq!(validate_color_code("B1").unwrap(), "B1");
        assert!(validate_color_code("W").is_err());
        assert!(validate_color_code("WHT").is_err());
        assert!(validate_color_code("W-").is_err());
    }

    #[test]
    fn test_validate_serial_number() {
        assert_eq!(validate_serial_number(" SN123 ").unwrap(), "SN123");
        assert!(validate_serial_number("").is_err());
        assert!(validate_serial_number("SN 123").is_err());
        assert!(validate_serial_number(&"X".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_location_code() {
        assert_eq!(validate_location_code("a1-s3").unwrap(), "A1-S3");
        assert!(validate_location_code("  ").is_err());
    }

    #[test]
    fn test_numeric_validators() {
        assert!(validate_amount_cents("price", 0).is_ok());
        assert!(validate_amount_cents("price", -1).is_err());
        assert!(validate_quantity_required(1).is_ok());
        assert!(matches!(
            validate_quantity_required(0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(validate_measurement("weight", 1.5).is_ok());
        assert!(validate_measurement("weight", 0.0).is_err());
        assert!(validate_measurement("weight", f64::NAN).is_err());
        assert_eq!(clamp_limit(0, 500), 1);
        assert_eq!(clamp_limit(10_000, 500), 500);
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_optional(Some("  ")), None);
        assert_eq!(normalize_optional(Some(" note ")), Some("note".to_string()));
        assert_eq!(normalize_optional(None), None);
    }
}

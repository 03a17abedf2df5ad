//! # Full SKU Composition
//!
//! A Variant's SKU is its Identity's generated code extended with the
//! variant attributes that are present:
//!
//! ```text
//!   "00845-P-1"  +  color "WY"  +  condition N   →  "00845-P-1-WY-N"
//!   "00845-P-1"  +  (none)      +  (none)        →  "00845-P-1"
//!   "00845"      +  (none)      +  condition R   →  "00845-R"
//! ```
//!
//! Absent segments are omitted, never left blank, so a SKU never contains
//! two delimiters in a row.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::{validate_color_code, ValidationResult};
use crate::SKU_DELIMITER;

// =============================================================================
// Condition Code
// =============================================================================

/// Item condition. Absence of a code means Used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum ConditionCode {
    #[serde(rename = "N")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "N"))]
    New,
    #[serde(rename = "R")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "R"))]
    Refurbished,
}

impl ConditionCode {
    pub fn code(&self) -> char {
        match self {
            ConditionCode::New => 'N',
            ConditionCode::Refurbished => 'R',
        }
    }

    /// Label shown on the dashboard; `None` is rendered as "Used".
    pub fn label(code: Option<ConditionCode>) -> &'static str {
        match code {
            Some(ConditionCode::New) => "New",
            Some(ConditionCode::Refurbished) => "Refurbished",
            None => "Used",
        }
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for ConditionCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" => Ok(ConditionCode::New),
            "R" => Ok(ConditionCode::Refurbished),
            other => Err(ValidationError::InvalidFormat {
                field: "condition_code".to_string(),
                reason: format!("unknown condition '{}', expected N or R (omit for Used)", other),
            }),
        }
    }
}

// =============================================================================
// Composition
// =============================================================================

/// Composes the full SKU from an identity code and optional variant segments.
///
/// The color code is validated and uppercased here; registry membership is
/// the caller's concern.
///
/// ## Example
/// ```rust
/// use catalog_core::sku::{full_sku, ConditionCode};
///
/// let sku = full_sku("00845-P-1", Some("wy"), Some(ConditionCode::New)).unwrap();
/// assert_eq!(sku, "00845-P-1-WY-N");
/// ```
pub fn full_sku(
    generated_code: &str,
    color_code: Option<&str>,
    condition: Option<ConditionCode>,
) -> ValidationResult<String> {
    let mut sku = generated_code.trim().to_ascii_uppercase();
    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "generated_code".to_string(),
        });
    }

    if let Some(color) = color_code {
        sku.push(SKU_DELIMITER);
        sku.push_str(&validate_color_code(color)?);
    }

    if let Some(condition) = condition {
        sku.push(SKU_DELIMITER);
        sku.push(condition.code());
    }

    Ok(sku)
}

/// Normalizes a user-typed SKU for lookup (trimmed, uppercase).
pub fn normalize_sku(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sku_with_all_segments() {
        assert_eq!(
            full_sku("00845-P-1", Some("WY"), Some(ConditionCode::New)).unwrap(),
            "00845-P-1-WY-N"
        );
    }

    #[test]
    fn test_full_sku_omits_absent_segments() {
        assert_eq!(full_sku("00845-P-1", None, None).unwrap(), "00845-P-1");
        assert_eq!(
            full_sku("00845", None, Some(ConditionCode::Refurbished)).unwrap(),
            "00845-R"
        );
        assert_eq!(full_sku("00845-B", Some("bk"), None).unwrap(), "00845-B-BK");
    }

    #[test]
    fn test_full_sku_rejects_malformed_color() {
        assert!(matches!(
            full_sku("00845", Some("BLACK"), None),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(full_sku("  ", None, None).is_err());
    }

    #[test]
    fn test_condition_code_parsing() {
        assert_eq!("n".parse::<ConditionCode>().unwrap(), ConditionCode::New);
        assert!("U".parse::<ConditionCode>().is_err());
        assert_eq!(ConditionCode::label(None), "Used");
        let json: ConditionCode = serde_json::from_str("\"R\"").unwrap();
        assert_eq!(json, ConditionCode::Refurbished);
    }

    #[test]
    fn test_normalize_sku() {
        assert_eq!(normalize_sku(" 00845-p-1-wy "), "00845-P-1-WY");
    }
}

//! # Identity Derivation
//!
//! Closed identity/physical-class enums and the two derived identifiers every
//! Identity carries: the human-readable generated code and the signature.
//!
//! ## Derivation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IdentityKey { product_id: 845, type: Part, lci: Some(1), class: E }   │
//! │        │                                                                │
//! │        ├──► generated_code  "00845-P-1"                                 │
//! │        │      Product  → {pid:05}                                       │
//! │        │      Part     → {pid:05}-P-{lci}                               │
//! │        │      others   → {pid:05}-{letter}                              │
//! │        │                                                                │
//! │        └──► signature       "9F2C01AB"                                  │
//! │               SHA-256("00845|Part|1|E")[..4] as uppercase hex           │
//! │                                                                         │
//! │  Both are computed once, before the INSERT, and never again.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this module reads variant or pricing data, so the signature
//! only changes when the identity itself would be a different row.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::{validate_lci, validate_product_id, ValidationResult};
use crate::SKU_DELIMITER;

/// Width of the zero-padded product id in every generated code.
pub const PRODUCT_ID_WIDTH: usize = 5;

/// Signature length in hex characters (32 bits).
pub const SIGNATURE_LEN: usize = 8;

// =============================================================================
// Identity Type
// =============================================================================

/// What kind of thing an Identity describes.
///
/// `Product` is the canonical name for the base identity; older exports call
/// it `"Base"`, which is accepted on input only. The single-letter codes used
/// in generated codes are accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum IdentityType {
    #[serde(alias = "Base")]
    Product,
    #[serde(alias = "P")]
    Part,
    #[serde(alias = "B")]
    Bundle,
    #[serde(alias = "K")]
    Kit,
    #[serde(alias = "S")]
    Service,
}

impl IdentityType {
    pub const ALL: [IdentityType; 5] = [
        IdentityType::Product,
        IdentityType::Part,
        IdentityType::Bundle,
        IdentityType::Kit,
        IdentityType::Service,
    ];

    /// Canonical name, as stored and as fed into the signature.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityType::Product => "Product",
            IdentityType::Part => "Part",
            IdentityType::Bundle => "Bundle",
            IdentityType::Kit => "Kit",
            IdentityType::Service => "Service",
        }
    }

    /// Letter used in the generated code. The base product has none.
    pub fn code_letter(&self) -> Option<char> {
        match self {
            IdentityType::Product => None,
            IdentityType::Part => Some('P'),
            IdentityType::Bundle => Some('B'),
            IdentityType::Kit => Some('K'),
            IdentityType::Service => Some('S'),
        }
    }

    /// Only parts carry a local component index.
    pub fn requires_lci(&self) -> bool {
        matches!(self, IdentityType::Part)
    }

    /// Bundles and kits may own bill-of-materials edges.
    pub fn is_composite(&self) -> bool {
        matches!(self, IdentityType::Bundle | IdentityType::Kit)
    }

    /// Enforces "LCI present iff Part" plus the LCI range.
    pub fn check_lci(&self, lci: Option<i64>) -> ValidationResult<()> {
        match (self.requires_lci(), lci) {
            (true, Some(value)) => validate_lci(value),
            (true, None) => Err(ValidationError::Required {
                field: "local_component_index".to_string(),
            }),
            (false, Some(_)) => Err(ValidationError::NotAllowed {
                field: "local_component_index".to_string(),
                reason: format!("only Part identities carry one, got {}", self),
            }),
            (false, None) => Ok(()),
        }
    }

    fn from_letter(letter: &str) -> Option<Self> {
        IdentityType::ALL
            .into_iter()
            .find(|t| t.code_letter().map(String::from).as_deref() == Some(letter))
    }
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("base") {
            return Ok(IdentityType::Product);
        }
        IdentityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .or_else(|| IdentityType::from_letter(&s.to_ascii_uppercase()))
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "type".to_string(),
                reason: format!("unknown identity type '{}'", s),
            })
    }
}

// =============================================================================
// Physical Class
// =============================================================================

/// Physical classification registry code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum PhysicalClass {
    #[serde(rename = "E")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "E"))]
    Electronics,
    #[serde(rename = "C")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "C"))]
    CoverCase,
    #[serde(rename = "P")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "P"))]
    Peripheral,
    #[serde(rename = "S")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "S"))]
    Speaker,
    #[serde(rename = "W")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "W"))]
    WireCable,
    #[serde(rename = "A")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "A"))]
    Accessory,
}

impl PhysicalClass {
    pub fn code(&self) -> char {
        match self {
            PhysicalClass::Electronics => 'E',
            PhysicalClass::CoverCase => 'C',
            PhysicalClass::Peripheral => 'P',
            PhysicalClass::Speaker => 'S',
            PhysicalClass::WireCable => 'W',
            PhysicalClass::Accessory => 'A',
        }
    }
}

impl FromStr for PhysicalClass {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "E" => Ok(PhysicalClass::Electronics),
            "C" => Ok(PhysicalClass::CoverCase),
            "P" => Ok(PhysicalClass::Peripheral),
            "S" => Ok(PhysicalClass::Speaker),
            "W" => Ok(PhysicalClass::WireCable),
            "A" => Ok(PhysicalClass::Accessory),
            other => Err(ValidationError::InvalidFormat {
                field: "physical_class".to_string(),
                reason: format!("unknown class '{}', expected one of E C P S W A", other),
            }),
        }
    }
}

// =============================================================================
// Derivation
// =============================================================================

/// The signature-bearing fields of an Identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub product_id: i64,
    pub identity_type: IdentityType,
    pub lci: Option<i64>,
    pub physical_class: Option<PhysicalClass>,
}

/// Fields computed from an [`IdentityKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedIdentity {
    pub generated_code: String,
    pub signature: String,
}

impl IdentityKey {
    /// Validates the key and computes both derived fields.
    ///
    /// ## Example
    /// ```rust
    /// use catalog_core::identity::{IdentityKey, IdentityType};
    ///
    /// let key = IdentityKey {
    ///     product_id: 845,
    ///     identity_type: IdentityType::Part,
    ///     lci: Some(1),
    ///     physical_class: None,
    /// };
    /// assert_eq!(key.derive().unwrap().generated_code, "00845-P-1");
    /// ```
    pub fn derive(&self) -> ValidationResult<DerivedIdentity> {
        validate_product_id(self.product_id)?;
        self.identity_type.check_lci(self.lci)?;

        Ok(DerivedIdentity {
            generated_code: generated_code(self.product_id, self.identity_type, self.lci),
            signature: signature(
                self.product_id,
                self.identity_type,
                self.lci,
                self.physical_class,
            ),
        })
    }
}

/// Builds the generated code. Callers validate the inputs first.
pub fn generated_code(product_id: i64, identity_type: IdentityType, lci: Option<i64>) -> String {
    let pid = format!("{:0width$}", product_id, width = PRODUCT_ID_WIDTH);
    match (identity_type.code_letter(), lci) {
        (None, _) => pid,
        (Some(letter), Some(lci)) if identity_type.requires_lci() => {
            format!("{pid}{d}{letter}{d}{lci}", d = SKU_DELIMITER)
        }
        (Some(letter), _) => format!("{pid}{d}{letter}", d = SKU_DELIMITER),
    }
}

/// 32-bit fingerprint of the identity fields as 8 uppercase hex characters.
pub fn signature(
    product_id: i64,
    identity_type: IdentityType,
    lci: Option<i64>,
    physical_class: Option<PhysicalClass>,
) -> String {
    let input = format!(
        "{:0width$}|{}|{}|{}",
        product_id,
        identity_type.as_str(),
        lci.map(|v| v.to_string()).unwrap_or_default(),
        physical_class.map(|c| c.code().to_string()).unwrap_or_default(),
        width = PRODUCT_ID_WIDTH,
    );
    let digest = Sha256::digest(input.as_bytes());
    hex::encode_upper(&digest[..SIGNATURE_LEN / 2])
}

/// Splits a generated code back into (productId, type, lci).
///
/// Used to normalize user-typed codes before lookup; returns `None` for
/// anything [`generated_code`] could not have produced.
pub fn parse_generated_code(code: &str) -> Option<(i64, IdentityType, Option<i64>)> {
    let code = code.trim().to_ascii_uppercase();
    let mut parts = code.split(SKU_DELIMITER);

    let pid_str = parts.next()?;
    if pid_str.len() != PRODUCT_ID_WIDTH || !pid_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let product_id: i64 = pid_str.parse().ok()?;

    let identity_type = match parts.next() {
        None => return Some((product_id, IdentityType::Product, None)),
        Some(letter) => IdentityType::from_letter(letter)?,
    };

    let lci = match (identity_type.requires_lci(), parts.next()) {
        (true, Some(lci)) => Some(lci.parse::<i64>().ok()?),
        (false, None) => None,
        _ => return None,
    };

    if parts.next().is_some() {
        return None;
    }
    identity_type.check_lci(lci).ok()?;
    Some((product_id, identity_type, lci))
}

// =============================================================================
// Unit Tests
// =============================================================================

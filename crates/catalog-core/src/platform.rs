//! # Marketplace Platforms
//!
//! The closed set of external platforms a Variant can be listed on, and the
//! typed per-platform listing attributes.
//!
//! ## Platform Metadata
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Listing(platform = AMAZON_US)                                          │
//! │     metadata: { "platform": "AMAZON_US", "asin": "B0C1234567",          │
//! │                 "fulfillment": "FBA" }                 ✅ accepted      │
//! │                                                                         │
//! │  Listing(platform = AMAZON_US)                                          │
//! │     metadata: { "platform": "EBAY", "category_id": "9355" }             │
//! │                                                        ❌ NotAllowed    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tag inside the JSON must match the listing's platform, so a bag of
//! attributes for one marketplace can never be sent to another.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

// =============================================================================
// Platform
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Platform {
    Zoho,
    AmazonUs,
    AmazonCa,
    Ebay,
    Ecwid,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Zoho,
        Platform::AmazonUs,
        Platform::AmazonCa,
        Platform::Ebay,
        Platform::Ecwid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Zoho => "ZOHO",
            Platform::AmazonUs => "AMAZON_US",
            Platform::AmazonCa => "AMAZON_CA",
            Platform::Ebay => "EBAY",
            Platform::Ecwid => "ECWID",
        }
    }

    /// Zoho Inventory is the system of record; its item id becomes the
    /// Variant's `external_item_id`.
    pub fn anchors_variant(&self) -> bool {
        matches!(self, Platform::Zoho)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "platform".to_string(),
                reason: format!("unknown platform '{}'", s.trim()),
            })
    }
}

// =============================================================================
// Platform Metadata
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum FulfillmentChannel {
    /// Fulfilled by Amazon.
    Fba,
    /// Fulfilled by merchant.
    Fbm,
}

/// Platform-specific listing attributes, tagged by platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "platform", rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PlatformMetadata {
    Zoho {
        #[serde(default)]
        item_group_id: Option<String>,
        #[serde(default)]
        account_code: Option<String>,
    },
    AmazonUs {
        #[serde(default)]
        asin: Option<String>,
        fulfillment: FulfillmentChannel,
    },
    AmazonCa {
        #[serde(default)]
        asin: Option<String>,
        fulfillment: FulfillmentChannel,
    },
    Ebay {
        category_id: String,
        #[serde(default)]
        condition_id: Option<u32>,
    },
    Ecwid {
        #[serde(default)]
        category_ids: Vec<i64>,
        #[serde(default = "default_true")]
        visible: bool,
    },
}

fn default_true() -> bool {
    true
}

impl PlatformMetadata {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformMetadata::Zoho { .. } => Platform::Zoho,
            PlatformMetadata::AmazonUs { .. } => Platform::AmazonUs,
            PlatformMetadata::AmazonCa { .. } => Platform::AmazonCa,
            PlatformMetadata::Ebay { .. } => Platform::Ebay,
            PlatformMetadata::Ecwid { .. } => Platform::Ecwid,
        }
    }

    /// Checks the tag against the listing's platform and the per-platform
    /// field formats.
    pub fn validate_for(&self, platform: Platform) -> ValidationResult<()> {
        if self.platform() != platform {
            return Err(ValidationError::NotAllowed {
                field: "metadata".to_string(),
                reason: format!(
                    "{} metadata on a {} listing",
                    self.platform(),
                    platform
                ),
            });
        }

        match self {
            PlatformMetadata::AmazonUs { asin: Some(asin), .. }
            | PlatformMetadata::AmazonCa { asin: Some(asin), .. } => {
                if asin.len() != 10 || !asin.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(ValidationError::InvalidFormat {
                        field: "metadata.asin".to_string(),
                        reason: "must be 10 letters or digits".to_string(),
                    });
                }
            }
            PlatformMetadata::Ebay { category_id, .. } => {
                if category_id.is_empty() || !category_id.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ValidationError::InvalidFormat {
                        field: "metadata.category_id".to_string(),
                        reason: "must be a numeric eBay category".to_string(),
                    });
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Parses stored JSON and validates it against `platform`.
    pub fn from_json(platform: Platform, json: &str) -> ValidationResult<Self> {
        let metadata: PlatformMetadata =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidFormat {
                field: "metadata".to_string(),
                reason: e.to_string(),
            })?;
        metadata.validate_for(platform)?;
        Ok(metadata)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse_and_display() {
        assert_eq!("amazon-us".parse::<Platform>().unwrap(), Platform::AmazonUs);
        assert_eq!("EBAY".parse::<Platform>().unwrap(), Platform::Ebay);
        assert!("ETSY".parse::<Platform>().is_err());
        assert_eq!(Platform::AmazonCa.to_string(), "AMAZON_CA");
        assert_eq!(
            serde_json::to_string(&Platform::AmazonUs).unwrap(),
            "\"AMAZON_US\""
        );
        assert!(Platform::Zoho.anchors_variant());
        assert!(!Platform::Ecwid.anchors_variant());
    }

    #[test]
    fn test_metadata_tag_must_match_platform() {
        let meta = PlatformMetadata::from_json(
            Platform::AmazonUs,
            r#"{"platform":"AMAZON_US","asin":"B0C1234567","fulfillment":"FBA"}"#,
        )
        .unwrap();
        assert_eq!(meta.platform(), Platform::AmazonUs);

        let err = PlatformMetadata::from_json(
            Platform::AmazonUs,
            r#"{"platform":"EBAY","category_id":"9355"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { .. }));
    }

    #[test]
    fn test_metadata_field_formats() {
        let bad_asin = PlatformMetadata::AmazonCa {
            asin: Some("SHORT".to_string()),
            fulfillment: FulfillmentChannel::Fbm,
        };
        assert!(bad_asin.validate_for(Platform::AmazonCa).is_err());

        let bad_category = PlatformMetadata::Ebay {
            category_id: "phones".to_string(),
            condition_id: None,
        };
        assert!(bad_category.validate_for(Platform::Ebay).is_err());

        assert!(PlatformMetadata::from_json(Platform::Ecwid, "not json").is_err());
    }

    #[test]
    fn test_metadata_defaults() {
        let meta = PlatformMetadata::from_json(Platform::Ecwid, r#"{"platform":"ECWID"}"#).unwrap();
        assert_eq!(
            meta,
            PlatformMetadata::Ecwid {
                category_ids: vec![],
                visible: true
            }
        );
    }
}

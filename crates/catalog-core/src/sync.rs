//! # Sync State Machine
//!
//! Pure transition rules for listings and the Variant aggregate.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Listing (per platform)             Variant (aggregate)                 │
//! │                                                                         │
//! │   createListing ─► PENDING           createVariant ─► PENDING           │
//! │                    │   ▲                                                │
//! │        markSynced  │   │ user edit        ERROR   if any listing ERROR  │
//! │                    ▼   │ (requeue)        PENDING if any listing        │
//! │                  SYNCED                      PENDING (DIRTY once the    │
//! │                    │   ▲                     variant has been synced)   │
//! │        markError   │   │ markSynced       SYNCED  if all SYNCED         │
//! │                    ▼   │                                                │
//! │                  ERROR ┘                  user edit: SYNCED ─► DIRTY    │
//! │                                                                         │
//! │  No terminal states: the worker retries until SYNCED.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function here is total over the enums; the repositories decide
//! *when* to call them and apply the result atomically.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Longest error message kept from a marketplace response.
pub const MAX_SYNC_ERROR_LEN: usize = 1000;

// =============================================================================
// Status Enums
// =============================================================================

/// Variant-level sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Error,
    Dirty,
}

/// Listing-level sync status. DIRTY is expressed as a requeue to PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ListingSyncStatus {
    #[default]
    Pending,
    Synced,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Error => "ERROR",
            SyncStatus::Dirty => "DIRTY",
        }
    }

    /// Status after a user edit to an externally-visible field.
    pub fn after_edit(self) -> SyncStatus {
        match self {
            SyncStatus::Synced => SyncStatus::Dirty,
            other => other,
        }
    }

    /// Whether the worker still has something to push for this variant.
    pub fn needs_sync(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Dirty)
    }
}

impl ListingSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingSyncStatus::Pending => "PENDING",
            ListingSyncStatus::Synced => "SYNCED",
            ListingSyncStatus::Error => "ERROR",
        }
    }

    /// Status after the owning variant was edited.
    ///
    /// Only SYNCED listings are requeued; a listing still waiting or still
    /// failing keeps its state so an outstanding error is not hidden.
    pub fn after_variant_edit(self) -> ListingSyncStatus {
        match self {
            ListingSyncStatus::Synced => ListingSyncStatus::Pending,
            other => other,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ListingSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(SyncStatus::Pending),
            "SYNCED" => Ok(SyncStatus::Synced),
            "ERROR" => Ok(SyncStatus::Error),
            "DIRTY" => Ok(SyncStatus::Dirty),
            other => Err(ValidationError::InvalidFormat {
                field: "sync_status".to_string(),
                reason: format!("unknown status '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Aggregate
// =============================================================================

/// Pessimistic aggregate of a variant's listing statuses.
///
/// `current` only matters for the "something is pending" case: a variant
/// that has been synced before reports DIRTY rather than PENDING. With no
/// listings at all there is nothing published, so the variant is PENDING
/// (or stays DIRTY).
///
/// ## Example
/// ```rust
/// use catalog_core::sync::{aggregate, ListingSyncStatus::*, SyncStatus};
///
/// assert_eq!(aggregate(SyncStatus::Pending, [Synced, Error]), SyncStatus::Error);
/// assert_eq!(aggregate(SyncStatus::Error, [Synced, Synced]), SyncStatus::Synced);
/// ```
pub fn aggregate<I>(current: SyncStatus, listings: I) -> SyncStatus
where
    I: IntoIterator<Item = ListingSyncStatus>,
{
    let mut any = false;
    let mut any_pending = false;
    for status in listings {
        any = true;
        match status {
            ListingSyncStatus::Error => return SyncStatus::Error,
            ListingSyncStatus::Pending => any_pending = true,
            ListingSyncStatus::Synced => {}
        }
    }

    if any_pending || !any {
        match current {
            SyncStatus::Synced | SyncStatus::Dirty => SyncStatus::Dirty,
            SyncStatus::Pending | SyncStatus::Error => SyncStatus::Pending,
        }
    } else {
        SyncStatus::Synced
    }
}

// =============================================================================
// Worker Transitions
// =============================================================================

/// What `markSynced` should do to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncedOutcome {
    /// A repeat of the last applied confirmation; nothing to write.
    Unchanged,
    /// Move to SYNCED.
    Synced,
    /// The confirmed dispatch predates a newer edit: keep the reference but
    /// leave the listing PENDING for re-dispatch.
    Stale,
}

/// The sync-relevant state of a listing when a confirmation arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationState<'a> {
    pub status: ListingSyncStatus,
    pub current_ref: Option<&'a str>,
    /// Variant version recorded by `markDispatched`, cleared by the next
    /// applied confirmation.
    pub dispatched_version: Option<i64>,
    /// Variant version at the last applied confirmation.
    pub confirmed_version: Option<i64>,
}

/// Decides the outcome of `markSynced`.
///
/// A recorded dispatch guards exactly one confirmation: once applied (stale
/// or not) the caller clears `dispatched_version`, so a later confirmation
/// without a new dispatch is taken at face value.
pub fn plan_mark_synced(state: ConfirmationState<'_>, new_ref: &str, variant_version: i64) -> SyncedOutcome {
    if state.current_ref == Some(new_ref) {
        match state.status {
            ListingSyncStatus::Synced => return SyncedOutcome::Unchanged,
            // repeat of a stale confirmation, nothing edited since
            ListingSyncStatus::Pending
                if state.dispatched_version.is_none()
                    && state.confirmed_version == Some(variant_version) =>
            {
                return SyncedOutcome::Unchanged;
            }
            _ => {}
        }
    }
    match state.dispatched_version {
        Some(version) if version < variant_version => SyncedOutcome::Stale,
        _ => SyncedOutcome::Synced,
    }
}

/// Whether `markError` changes anything.
pub fn mark_error_changes(
    status: ListingSyncStatus,
    current_message: Option<&str>,
    new_message: &str,
) -> bool {
    !(status == ListingSyncStatus::Error && current_message == Some(new_message))
}

/// Trims a marketplace error message to the stored length.
pub fn clip_error_message(message: &str) -> String {
    let message = message.trim();
    if message.is_empty() {
        return "unknown error".to_string();
    }
    message.chars().take(MAX_SYNC_ERROR_LEN).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

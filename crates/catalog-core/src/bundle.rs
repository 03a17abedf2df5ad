//! # Bundle / Kit Composition
//!
//! Bill-of-materials rules: which identities may own components, and the
//! reachability check that keeps the component graph acyclic.
//!
//! ## Cycle Check
//! ```text
//!   existing edges:   A ──► B ──► C
//!
//!   addComponent(parent: C, child: A)
//!     walk from A: A → B → C  ── reached parent ──► CycleDetected
//!
//!   addComponent(parent: A, child: C)
//!     walk from C: (no children) ── parent unreachable ──► ok
//! ```
//!
//! The walk keeps a visited set, so a graph that is already inconsistent
//! (an edge added by a concurrent writer) still terminates.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::identity::IdentityType;
use crate::validation::validate_quantity_required;

/// Role a component plays inside its bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum BundleRole {
    #[default]
    Primary,
    Accessory,
    Satellite,
}

impl fmt::Display for BundleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BundleRole::Primary => "Primary",
            BundleRole::Accessory => "Accessory",
            BundleRole::Satellite => "Satellite",
        };
        f.write_str(name)
    }
}

impl FromStr for BundleRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(BundleRole::Primary),
            "accessory" => Ok(BundleRole::Accessory),
            "satellite" => Ok(BundleRole::Satellite),
            other => Err(ValidationError::InvalidFormat {
                field: "role".to_string(),
                reason: format!("unknown bundle role '{}'", other),
            }),
        }
    }
}

/// Structural checks for a new edge, before the graph is consulted.
pub fn check_new_edge(
    parent_id: i64,
    parent_type: IdentityType,
    child_id: i64,
    quantity_required: i64,
) -> CoreResult<()> {
    if !parent_type.is_composite() {
        return Err(ValidationError::NotAllowed {
            field: "parent_identity_id".to_string(),
            reason: format!("{} identities cannot contain components", parent_type),
        }
        .into());
    }
    validate_quantity_required(quantity_required)?;
    if parent_id == child_id {
        return Err(CoreError::CycleDetected {
            parent_id,
            child_id,
        });
    }
    Ok(())
}

/// Adjacency view of the component graph: parent id → child ids.
#[derive(Debug, Default, Clone)]
pub struct ComponentGraph {
    children: HashMap<i64, Vec<i64>>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, parent_id: i64, child_id: i64) {
        self.children.entry(parent_id).or_default().push(child_id);
    }

    /// Whether `target` is reachable from `start` (including `start == target`).
    pub fn reaches(&self, start: i64, target: i64) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            if node == target {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(children) = self.children.get(&node) {
                queue.extend(children.iter().copied().filter(|c| !visited.contains(c)));
            }
        }
        false
    }

    /// Fails with `CycleDetected` if adding `parent → child` closes a loop.
    pub fn check_acyclic(&self, parent_id: i64, child_id: i64) -> CoreResult<()> {
        if self.reaches(child_id, parent_id) {
            return Err(CoreError::CycleDetected {
                parent_id,
                child_id,
            });
        }
        Ok(())
    }
}

impl FromIterator<(i64, i64)> for ComponentGraph {
    fn from_iter<T: IntoIterator<Item = (i64, i64)>>(iter: T) -> Self {
        let mut graph = ComponentGraph::new();
        for (parent, child) in iter {
            graph.add_edge(parent, child);
        }
        graph
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_must_be_composite() {
        let err = check_new_edge(1, IdentityType::Product, 2, 1).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::NotAllowed { .. })));
        assert!(check_new_edge(1, IdentityType::Kit, 2, 1).is_ok());
        assert!(check_new_edge(1, IdentityType::Bundle, 2, 3).is_ok());
    }

    #[test]
    fn test_quantity_must_be_positive() {
        assert!(matches!(
            check_new_edge(1, IdentityType::Bundle, 2, 0),
            Err(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        assert!(matches!(
            check_new_edge(5, IdentityType::Bundle, 5, 1),
            Err(CoreError::CycleDetected { parent_id: 5, child_id: 5 })
        ));
    }

    #[test]
    fn test_transitive_cycle_detected() {
        let graph: ComponentGraph = [(1, 2), (2, 3)].into_iter().collect();
        assert!(matches!(
            graph.check_acyclic(3, 1),
            Err(CoreError::CycleDetected { parent_id: 3, child_id: 1 })
        ));
        assert!(graph.check_acyclic(1, 3).is_ok());
        assert!(graph.check_acyclic(4, 1).is_ok());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let graph: ComponentGraph = [(1, 2), (1, 3), (2, 4), (3, 4)].into_iter().collect();
        assert!(graph.check_acyclic(1, 4).is_ok());
        assert!(graph.check_acyclic(4, 1).is_err());
    }

    #[test]
    fn test_walk_terminates_on_corrupt_graph() {
        let graph: ComponentGraph = [(1, 2), (2, 1), (2, 3)].into_iter().collect();
        assert!(!graph.reaches(1, 99));
        assert!(graph.reaches(1, 3));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("satellite".parse::<BundleRole>().unwrap(), BundleRole::Satellite);
        assert!("spare".parse::<BundleRole>().is_err());
        assert_eq!(BundleRole::default().to_string(), "Primary");
    }
}

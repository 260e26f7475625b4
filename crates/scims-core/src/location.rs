//! Location hierarchy and access scope.
//!
//! Locations form a forest through `parent_location_id` (containment) plus a
//! second kind of edge, `canonical_location_id`, pointing at a shared world
//! location. The combined edge set must stay acyclic. [`LocationGraph`] is an
//! arena keyed by [`LocationId`]; nodes reference each other by ID only.

use std::collections::{BTreeMap, BTreeSet};

use scims_types::{Location, LocationId, UserId};

/// Errors raised when a location write would corrupt the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    /// Following parent and canonical edges from the location leads back to
    /// itself.
    #[error("location {location_id} would create a cycle through {via}")]
    Cycle {
        /// Location being written.
        location_id: LocationId,
        /// Which edge closed the cycle (`"parent"` or `"canonical"`).
        via: &'static str,
    },

    /// The location references a parent or canonical location that does
    /// not exist.
    #[error("location {location_id} references unknown location {reference}")]
    UnknownLocation {
        /// Location being written.
        location_id: LocationId,
        /// Missing referenced location.
        reference: LocationId,
    },
}

/// Arena of every known location.
#[derive(Debug, Clone, Default)]
pub struct LocationGraph {
    nodes: BTreeMap<LocationId, Location>,
}

impl LocationGraph {
    /// Create an empty graph.
    pub const fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    /// Build a graph from persisted rows without validating edges.
    pub fn from_locations<I>(locations: I) -> Self
    where
        I: IntoIterator<Item = Location>,
    {
        Self {
            nodes: locations.into_iter().map(|l| (l.id, l)).collect(),
        }
    }

    /// Number of locations.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a location.
    pub fn get(&self, id: LocationId) -> Option<&Location> {
        self.nodes.get(&id)
    }

    /// Whether `id` exists.
    pub fn contains(&self, id: LocationId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Iterate over all locations in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.nodes.values()
    }

    /// Priority of a location, zero when unknown.
    pub fn priority(&self, id: LocationId) -> i32 {
        self.nodes.get(&id).map_or(0, |l| l.priority)
    }

    /// Check that inserting or replacing `location` keeps the graph valid.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::UnknownLocation`] for dangling edges and
    /// [`LocationError::Cycle`] when the write closes a cycle.
    pub fn validate(&self, location: &Location) -> Result<(), LocationError> {
        let edges = [
            ("parent", location.parent_location_id),
            ("canonical", location.canonical_location_id),
        ];

        for (via, target) in edges {
            let Some(target) = target else { continue };
            if target == location.id {
                return Err(LocationError::Cycle {
                    location_id: location.id,
                    via,
                });
            }
            if !self.nodes.contains_key(&target) {
                return Err(LocationError::UnknownLocation {
                    location_id: location.id,
                    reference: target,
                });
            }
            // The rest of the graph is acyclic, so a cycle must pass
            // through the location being written.
            if self.reaches(target, location.id) {
                return Err(LocationError::Cycle {
                    location_id: location.id,
                    via,
                });
            }
        }
        Ok(())
    }

    /// Validate and store `location`, replacing any previous version.
    ///
    /// # Errors
    ///
    /// See [`LocationGraph::validate`].
    pub fn insert(&mut self, location: Location) -> Result<(), LocationError> {
        self.validate(&location)?;
        self.nodes.insert(location.id, location);
        Ok(())
    }

    /// Direct children (by parent edge) of `id`.
    pub fn children(&self, id: LocationId) -> impl Iterator<Item = &Location> {
        self.nodes
            .values()
            .filter(move |l| l.parent_location_id == Some(id))
    }

    /// Every location contained in `id`, transitively. Excludes `id`.
    pub fn descendants(&self, id: LocationId) -> BTreeSet<LocationId> {
        let mut found = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            for child in self.children(current) {
                if found.insert(child.id) {
                    stack.push(child.id);
                }
            }
        }
        found.remove(&id);
        found
    }

    /// The chain of canonical locations reachable from `id`, nearest first.
    pub fn canonical_chain(&self, id: LocationId) -> Vec<LocationId> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut current = self.nodes.get(&id).and_then(|l| l.canonical_location_id);
        while let Some(next) = current {
            if !seen.insert(next) {
                break;
            }
            chain.push(next);
            current = self.nodes.get(&next).and_then(|l| l.canonical_location_id);
        }
        chain
    }

    /// Locations whose stock `user` may draw on: locations the user owns,
    /// everything nested inside them, and the canonical chain of each.
    pub fn access_scope(&self, user: UserId) -> BTreeSet<LocationId> {
        let mut scope = BTreeSet::new();
        for owned in self.nodes.values().filter(|l| l.is_owned_by(user)) {
            scope.insert(owned.id);
            scope.extend(self.descendants(owned.id));
        }
        let canonical: Vec<LocationId> = scope
            .iter()
            .flat_map(|id| self.canonical_chain(*id))
            .collect();
        scope.extend(canonical);
        scope
    }

    /// Whether `to` is reachable from `from` over parent and canonical edges.
    fn reaches(&self, from: LocationId, to: LocationId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.parent_location_id);
                stack.extend(node.canonical_location_id);
            }
        }
        false
    }
}

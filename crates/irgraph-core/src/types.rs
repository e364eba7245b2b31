//! Identity and record types shared by persistence and querying.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Tenant ────────────────────────────────────────────────────────

/// The project a persisted graph belongs to.
///
/// Stored on every node and relationship as the `projectId` property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ── Identity ──────────────────────────────────────────────────────

/// Dense index of a node inside a [`ProgramGraph`](crate::program::ProgramGraph).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeSlot(pub usize);

/// Globally unique identity assigned to a node when it is persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PersistedId(pub Uuid);

impl PersistedId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PersistedId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PersistedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Slot-indexed mapping from program nodes to their persisted identities.
///
/// Slots of filtered nodes stay `None`.
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    ids: Vec<Option<PersistedId>>,
}

impl IdMap {
    pub fn with_slots(slots: usize) -> Self {
        Self {
            ids: vec![None; slots],
        }
    }

    /// Assign a fresh identity to `slot` and return it.
    pub fn assign(&mut self, slot: NodeSlot) -> PersistedId {
        if slot.0 >= self.ids.len() {
            self.ids.resize(slot.0 + 1, None);
        }
        let id = PersistedId::new();
        self.ids[slot.0] = Some(id);
        id
    }

    pub fn get(&self, slot: NodeSlot) -> Option<PersistedId> {
        self.ids.get(slot.0).copied().flatten()
    }

    pub fn contains(&self, slot: NodeSlot) -> bool {
        self.get(slot).is_some()
    }

    /// Number of slots that received an identity.
    pub fn len(&self) -> usize {
        self.ids.iter().filter(|id| id.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeSlot, PersistedId)> + '_ {
        self.ids
            .iter()
            .enumerate()
            .filter_map(|(i, id)| id.map(|id| (NodeSlot(i), id)))
    }
}

// ── Tags ──────────────────────────────────────────────────────────

/// Extra label attached at persistence time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Tag {
    TrackedVariable,
    MainFunctionDeclaration,
}

impl Tag {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TrackedVariable => "TrackedVariable",
            Self::MainFunctionDeclaration => "MainFunctionDeclaration",
        }
    }
}

// ── Relationships ─────────────────────────────────────────────────

/// A linearized edge ready to be written to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipRecord {
    pub start_id: PersistedId,
    pub end_id: PersistedId,
    pub rel_type: String,
    pub properties: BTreeMap<String, serde_json::Value>,
}

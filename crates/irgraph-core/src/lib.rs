//! irgraph-core: program-graph data model and pure transformations.
//!
//! This crate provides the foundations shared by persistence and querying:
//! - The arena-based program graph with per-kind relationship schemas
//! - Persisted identities, tenant ids, tags, and relationship records
//! - Legacy symbol demangling
//! - Relationship collection
//! - Configuration and pass status types

pub mod config;
pub mod demangle;
pub mod error;
pub mod program;
pub mod relations;
pub mod status;
pub mod types;

pub use demangle::demangle;
pub use error::IrGraphError;
pub use program::{NodeKind, ProgramGraph, ProgramNode, RelationshipValue};
pub use types::{IdMap, NodeSlot, PersistedId, RelationshipRecord, Tag, TenantId};

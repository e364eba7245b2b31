//! irgraph-graph: the single access point to the Neo4j property-graph store.
//!
//! Persistence writes program graphs per tenant, and every read goes
//! through the [`QueryGateway`], which keeps tenants isolated from each
//! other by their `projectId`.

pub mod bolt;
pub mod client;
pub mod gateway;
pub mod mutations;
pub mod persist;
pub mod project;
pub mod queries;
pub mod store;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use gateway::{QueryError, QueryGateway};
pub use persist::{GraphPersister, PassSummary, PersistError, PreparedNodes};
pub use project::{GenericEdge, GenericNode, GraphData, RawValue};
pub use store::{GraphStore, NodeRow};
